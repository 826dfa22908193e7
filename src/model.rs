use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const NOT_FOUND: &str = "[Not Found]";
pub const REGEX_ERROR: &str = "[Regex Error]";

pub const FILE_COLUMN: &str = "File";
pub const PAGE_COLUMN: &str = "Page";
pub const RESERVED_COLUMNS: [&str; 2] = [FILE_COLUMN, PAGE_COLUMN];

pub const RUN_RECORD_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Visual,
    TextParser,
}

impl TemplateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Visual => "visual",
            Self::TextParser => "text_parser",
        }
    }
}

/// Rectangle in pixels of a page rendered at the configured OCR resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub column_name: String,
    #[serde(default, alias = "regex")]
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
}

impl Field {
    pub fn text(column_name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            pattern: pattern.into(),
            region: None,
        }
    }

    pub fn region(column_name: impl Into<String>, region: Region) -> Self {
        Self {
            column_name: column_name.into(),
            pattern: String::new(),
            region: Some(region),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(alias = "type")]
    pub kind: TemplateKind,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub numeric_optimize: bool,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Template {
    pub fn text_parser(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            kind: TemplateKind::TextParser,
            numeric_optimize: false,
            fields,
        }
    }

    pub fn visual(name: impl Into<String>, numeric_optimize: bool, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            kind: TemplateKind::Visual,
            numeric_optimize,
            fields,
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        let mut columns = vec![FILE_COLUMN.to_string(), PAGE_COLUMN.to_string()];
        columns.extend(self.fields.iter().map(|field| field.column_name.clone()));
        columns
    }
}

/// One extracted row. Serializes as a flat object: `File`, `Page`, then the
/// template columns in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    #[serde(rename = "File")]
    pub file: String,
    #[serde(rename = "Page")]
    pub page: u32,
    #[serde(flatten)]
    pub values: IndexMap<String, String>,
}

impl ResultRow {
    pub fn new(file: impl Into<String>, page: u32, values: IndexMap<String, String>) -> Self {
        Self {
            file: file.into(),
            page,
            values,
        }
    }

    pub fn cells(&self) -> Vec<(String, String)> {
        let mut cells = Vec::with_capacity(self.values.len() + 2);
        cells.push((FILE_COLUMN.to_string(), self.file.clone()));
        cells.push((PAGE_COLUMN.to_string(), self.page.to_string()));
        cells.extend(
            self.values
                .iter()
                .map(|(column, value)| (column.clone(), value.clone())),
        );
        cells
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub name: String,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionManifest {
    pub version: String,
    #[serde(default)]
    pub saved_at: String,
    #[serde(alias = "image_basenames")]
    pub document_names: Vec<String>,
    #[serde(default)]
    pub documents: Vec<SessionDocument>,
    #[serde(default)]
    pub templates: Vec<Template>,
    #[serde(default, alias = "ocr_results")]
    pub rows: Vec<ResultRow>,
    #[serde(default, alias = "ui_settings")]
    pub view_settings: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunWarning {
    pub file: String,
    pub page: Option<u32>,
    pub message: String,
}

/// Outcome of the latest processing run, persisted in the workspace cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub manifest_version: u32,
    pub run_id: String,
    pub engine: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: String,
    pub templates: Vec<String>,
    pub file_count: usize,
    pub row_count: usize,
    pub failed_count: usize,
    pub warnings: Vec<RunWarning>,
    pub rows: Vec<ResultRow>,
}
