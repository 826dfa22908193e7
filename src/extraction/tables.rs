use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use super::{collapse_whitespace, resolve_field};
use crate::model::{NOT_FOUND, Template};

/// A positional table recognised inside page text. The header locates the
/// table; the numeric tokens of the first row after it are assigned to
/// `columns` by position.
#[derive(Debug)]
pub struct TableLayout {
    pub template_name: &'static str,
    pub columns: &'static [&'static str],
    row: &'static LazyLock<Option<Regex>>,
    collapse_fallback: bool,
}

static GSTR7_ROW: LazyLock<Option<Regex>> = LazyLock::new(|| {
    build_row_regex(
        r"Details\s+of\s+the\s+tax\s+deducted\s+at\s+source[^\n]*(?:\n[ \t]*(?:[^\d\s][^\n]*)?)*",
    )
});

static GSTR7A_ROW: LazyLock<Option<Regex>> = LazyLock::new(|| {
    build_row_regex(
        r"Value on which Tax deducted\s*\(₹\)\s*Amount of Tax Deducted at Source\s*\(₹\)\s*\n\s*Integrated Tax\s*Central Tax\s*State/UT Tax\s*",
    )
});

static LAYOUTS: [TableLayout; 2] = [
    TableLayout {
        template_name: "GSTR-7",
        columns: &[
            "Table3_No_of_Records",
            "Table3_Total_Amount_Paid_to_Deductees_INR",
            "Table3_Integrated_Tax_INR",
            "Table3_Central_Tax_INR",
            "Table3_State_UT_Tax_INR",
        ],
        row: &GSTR7_ROW,
        collapse_fallback: true,
    },
    TableLayout {
        template_name: "GSTR-7A",
        columns: &[
            "Value on which Tax deducted",
            "Amount of Tax Deducted at Source-Integrated Tax",
            "Amount of Tax Deducted at Source-Central Tax",
            "Amount of Tax Deducted at Source-State/UT Tax",
        ],
        row: &GSTR7A_ROW,
        collapse_fallback: false,
    },
];

fn build_row_regex(header: &str) -> Option<Regex> {
    let pattern = format!(r"{header}\n[ \t]*([\d,.]+(?:[ \t]+[\d,.]+)*)");
    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(regex) => Some(regex),
        Err(err) => {
            warn!(error = %err, "table row pattern failed to compile");
            None
        }
    }
}

pub fn table_layout_for(template_name: &str) -> Option<&'static TableLayout> {
    LAYOUTS
        .iter()
        .find(|layout| layout.template_name == template_name)
}

impl TableLayout {
    /// Numeric tokens of the first row following the header, if the header
    /// is present.
    pub fn row_tokens(&self, text: &str) -> Vec<String> {
        let Some(regex) = LazyLock::force(self.row).as_ref() else {
            return Vec::new();
        };
        regex
            .captures(text)
            .and_then(|captures| captures.get(1))
            .map(|row| row.as_str().split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|known| *known == column)
    }
}

pub(super) fn extract_with_layout(
    layout: &TableLayout,
    template: &Template,
    text: &str,
) -> IndexMap<String, String> {
    let tokens = layout.row_tokens(text);
    debug!(
        template = %template.name,
        tokens = tokens.len(),
        "matched positional table row"
    );

    template
        .fields
        .iter()
        .map(|field| {
            let value = match layout.position(&field.column_name) {
                Some(index) => tokens
                    .get(index)
                    .cloned()
                    .unwrap_or_else(|| NOT_FOUND.to_string()),
                None => {
                    let value = resolve_field(&template.name, field, text);
                    if layout.collapse_fallback {
                        collapse_whitespace(&value)
                    } else {
                        value
                    }
                }
            };
            (field.column_name.clone(), value)
        })
        .collect()
}
