use std::path::PathBuf;

use thiserror::Error;

/// Rejections raised at the template store boundary. A rejected template is
/// never partially applied.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template name must not be empty")]
    EmptyName,

    #[error("template '{0}' already exists")]
    DuplicateName(String),

    #[error("text parser template '{template}' must declare at least one field")]
    NoFields { template: String },

    #[error("template '{template}' field #{index} has an empty column name")]
    EmptyColumnName { template: String, index: usize },

    #[error("template '{template}' declares column '{column}' more than once")]
    DuplicateColumn { template: String, column: String },

    #[error("template '{template}' uses reserved column name '{column}'")]
    ReservedColumn { template: String, column: String },

    #[error("text parser template '{template}' field '{column}' has an empty pattern")]
    MissingPattern { template: String, column: String },

    #[error("template '{template}' field '{column}' has an invalid pattern")]
    InvalidPattern {
        template: String,
        column: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to persist template '{name}' at {}", .path.display())]
    Storage {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TemplateError {
    /// True for the validation failures grouped as "invalid template".
    pub fn is_invalid_template(&self) -> bool {
        !matches!(self, TemplateError::Storage { .. })
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("source file does not exist: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("source path has no file name: {}", .0.display())]
    NoFileName(PathBuf),

    #[error("failed to copy {} to {}", .source_path.display(), .destination.display())]
    Copy {
        source_path: PathBuf,
        destination: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine '{engine}' is unavailable")]
    Unavailable { engine: String },

    #[error("OCR engine '{engine}' failed: {message}")]
    Failed { engine: String, message: String },

    #[error("failed to run OCR engine '{engine}'")]
    Io {
        engine: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session archive {}: {message}", .path.display())]
    Format { path: PathBuf, message: String },

    #[error("session I/O failed for {}: {message}", .path.display())]
    Write { path: PathBuf, message: String },
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("{worker} is already running")]
    AlreadyRunning { worker: &'static str },

    #[error("{worker} thread has shut down")]
    Disconnected { worker: &'static str },

    #[error("failed to spawn {worker} thread")]
    Spawn {
        worker: &'static str,
        #[source]
        source: std::io::Error,
    },
}
