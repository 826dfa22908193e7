//! Field extraction: turns a block of page text into one value per template
//! field, in field order.

mod tables;

#[cfg(test)]
mod tests;

use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};
use tracing::{debug, error};

use crate::model::{Field, NOT_FOUND, REGEX_ERROR, Template};

pub use tables::table_layout_for;

pub fn extract(template: &Template, text: &str) -> IndexMap<String, String> {
    debug!(template = %template.name, chars = text.len(), "extracting fields");

    match table_layout_for(&template.name) {
        Some(layout) => tables::extract_with_layout(layout, template, text),
        None => template
            .fields
            .iter()
            .map(|field| {
                (
                    field.column_name.clone(),
                    resolve_field(&template.name, field, text),
                )
            })
            .collect(),
    }
}

/// Resolves one field against `text`, mapping failures to the sentinels.
pub fn resolve_field(template_name: &str, field: &Field, text: &str) -> String {
    match resolve_pattern(&field.pattern, text) {
        Ok(Some(value)) => value,
        Ok(None) => NOT_FOUND.to_string(),
        Err(err) => {
            error!(
                template = %template_name,
                column = %field.column_name,
                error = %err,
                "regex error while extracting field"
            );
            REGEX_ERROR.to_string()
        }
    }
}

/// Applies `pattern` to `text`. With a capturing group the value is group 1,
/// otherwise the whole match; both trimmed. An empty pattern selects the
/// whole text.
pub fn resolve_pattern(pattern: &str, text: &str) -> Result<Option<String>, regex::Error> {
    if pattern.is_empty() {
        let trimmed = text.trim();
        return Ok((!trimmed.is_empty()).then(|| trimmed.to_string()));
    }

    let regex = compile_pattern(pattern)?;
    let Some(captures) = regex.captures(text) else {
        return Ok(None);
    };

    let matched = if regex.captures_len() > 1 {
        captures.get(1)
    } else {
        captures.get(0)
    };
    Ok(matched.map(|value| value.as_str().trim().to_string()))
}

pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
}

/// Collapses every whitespace run to a single space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
