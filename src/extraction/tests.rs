use super::*;
use crate::model::{Field, Template};

fn invoice() -> Template {
    Template::text_parser(
        "Invoice",
        vec![Field::text("InvoiceNumber", r"INVOICE\s*#\s*(\w+)")],
    )
}

#[test]
fn invoice_number_is_captured_from_group_one() {
    let values = extract(&invoice(), "INVOICE # A123");
    assert_eq!(values.len(), 1);
    assert_eq!(values["InvoiceNumber"], "A123");
}

#[test]
fn missing_invoice_number_yields_not_found() {
    let values = extract(&invoice(), "no invoice here");
    assert_eq!(values["InvoiceNumber"], NOT_FOUND);
}

#[test]
fn pattern_without_group_returns_trimmed_full_match() {
    let template = Template::text_parser("Dates", vec![Field::text("Date", r"\s\d{2}/\d{2}/\d{4}\s")]);
    let values = extract(&template, "issued 03/11/2024 by clerk");
    assert_eq!(values["Date"], "03/11/2024");
}

#[test]
fn matching_is_case_insensitive_and_dot_spans_lines() {
    let template = Template::text_parser(
        "Letter",
        vec![Field::text("Body", r"subject:(.*?)regards")],
    );
    let values = extract(&template, "SUBJECT: late\npayment\nRegards");
    assert_eq!(values["Body"], "late\npayment");
}

#[test]
fn optional_group_that_did_not_participate_is_not_found() {
    let template = Template::text_parser("Opt", vec![Field::text("Code", r"ref(?:erence)?(:\d+)?")]);
    let values = extract(&template, "reference without code");
    assert_eq!(values["Code"], NOT_FOUND);
}

#[test]
fn malformed_pattern_yields_regex_error_and_other_fields_continue() {
    let template = Template::text_parser(
        "Mixed",
        vec![
            Field::text("Broken", "(unclosed"),
            Field::text("Total", r"total\s*(\d+)"),
        ],
    );
    let values = extract(&template, "Total 42");
    assert_eq!(values["Broken"], REGEX_ERROR);
    assert_eq!(values["Total"], "42");
    assert_eq!(
        values.keys().collect::<Vec<_>>(),
        vec!["Broken", "Total"]
    );
}

#[test]
fn gstr7a_table_values_are_assigned_by_position() {
    let template = Template::text_parser(
        "GSTR-7A",
        vec![
            Field::text("GSTIN", r"GSTIN of the deductor\s*(\S+)"),
            Field::text("Value on which Tax deducted", "unused"),
            Field::text("Amount of Tax Deducted at Source-Integrated Tax", "unused"),
            Field::text("Amount of Tax Deducted at Source-Central Tax", "unused"),
            Field::text("Amount of Tax Deducted at Source-State/UT Tax", "unused"),
        ],
    );
    let text = "GSTIN of the deductor 27ABCDE1234F1Z5\n\
                Value on which Tax deducted (₹) Amount of Tax Deducted at Source (₹)\n\
                Integrated Tax Central Tax State/UT Tax\n\
                1,00,000.00 0.00 1,000.00 1,000.00\n";

    let values = extract(&template, text);
    assert_eq!(values["GSTIN"], "27ABCDE1234F1Z5");
    assert_eq!(values["Value on which Tax deducted"], "1,00,000.00");
    assert_eq!(values["Amount of Tax Deducted at Source-Integrated Tax"], "0.00");
    assert_eq!(values["Amount of Tax Deducted at Source-Central Tax"], "1,000.00");
    assert_eq!(values["Amount of Tax Deducted at Source-State/UT Tax"], "1,000.00");
}

#[test]
fn short_gstr7a_row_leaves_trailing_positions_not_found() {
    let template = Template::text_parser(
        "GSTR-7A",
        vec![
            Field::text("Value on which Tax deducted", "unused"),
            Field::text("Amount of Tax Deducted at Source-State/UT Tax", "unused"),
        ],
    );
    let text = "Value on which Tax deducted (₹) Amount of Tax Deducted at Source (₹)\n\
                Integrated Tax Central Tax State/UT Tax\n\
                5000.00 90.00\n";

    let values = extract(&template, text);
    assert_eq!(values["Value on which Tax deducted"], "5000.00");
    assert_eq!(values["Amount of Tax Deducted at Source-State/UT Tax"], NOT_FOUND);
}

#[test]
fn gstr7_reads_table_three_row_and_collapses_fallback_values() {
    let template = Template::text_parser(
        "GSTR-7",
        vec![
            Field::text("Legal_Name", r"Legal name of the registered person\s*(.*?)\s*3\."),
            Field::text("Table3_No_of_Records", "unused"),
            Field::text("Table3_Total_Amount_Paid_to_Deductees_INR", "unused"),
            Field::text("Table3_Integrated_Tax_INR", "unused"),
            Field::text("Table3_Central_Tax_INR", "unused"),
            Field::text("Table3_State_UT_Tax_INR", "unused"),
        ],
    );
    let text = "Legal name of the registered person ACME   Works\n  Private Limited\n\
                3. Details of the tax deducted at source\n\
                No. of records Total amount paid Integrated Tax Central Tax State/UT Tax\n\
                \n\
                4 2,50,000.00 0.00 2,500.00 2,500.00\n";

    let values = extract(&template, text);
    assert_eq!(values["Legal_Name"], "ACME Works Private Limited");
    assert_eq!(values["Table3_No_of_Records"], "4");
    assert_eq!(values["Table3_Total_Amount_Paid_to_Deductees_INR"], "2,50,000.00");
    assert_eq!(values["Table3_Integrated_Tax_INR"], "0.00");
    assert_eq!(values["Table3_Central_Tax_INR"], "2,500.00");
    assert_eq!(values["Table3_State_UT_Tax_INR"], "2,500.00");
}

#[test]
fn table_without_header_yields_not_found_for_positions() {
    let template = Template::text_parser("GSTR-7", vec![Field::text("Table3_No_of_Records", "x")]);
    let values = extract(&template, "unrelated page text");
    assert_eq!(values["Table3_No_of_Records"], NOT_FOUND);
}

#[test]
fn layouts_are_selected_by_exact_template_name() {
    assert!(table_layout_for("GSTR-7").is_some());
    assert!(table_layout_for("GSTR-7A").is_some());
    assert!(table_layout_for("gstr-7").is_none());
    assert!(table_layout_for("Invoice").is_none());
}

#[test]
fn empty_pattern_selects_whole_text() {
    assert_eq!(
        resolve_pattern("", "  12.50 \n").unwrap(),
        Some("12.50".to_string())
    );
    assert_eq!(resolve_pattern("", "   ").unwrap(), None);
}

#[test]
fn collapse_whitespace_joins_runs() {
    assert_eq!(collapse_whitespace(" a \n\t b  c "), "a b c");
}
