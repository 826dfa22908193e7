//! OCR engine adapters and the document reader used by the processing pipeline.

pub mod documents;
pub mod tesseract;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::OcrError;
use crate::extraction::collapse_whitespace;

pub use documents::{DocumentReader, PopplerReader};
pub use tesseract::TesseractEngine;

/// Character set used when an engine is asked for numeric-only output.
pub const NUMERIC_WHITELIST: &str = "0123456789.,$€£¥";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Tesseract,
    /// Operating-system OCR service. No adapter ships for it.
    #[serde(alias = "windows")]
    Platform,
}

impl EngineKind {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Tesseract => "Tesseract",
            Self::Platform => "Platform OCR",
        }
    }

    pub fn unavailable_sentinel(self) -> String {
        format!("[{} N/A]", self.display_name())
    }

    pub fn error_sentinel(self) -> String {
        format!("[{} Error]", self.display_name())
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrOptions {
    pub psm: u8,
    pub oem: u8,
    pub lang: String,
    pub numeric_optimize: bool,
}

impl OcrOptions {
    pub fn with_numeric(&self, numeric_optimize: bool) -> Self {
        Self {
            numeric_optimize,
            ..self.clone()
        }
    }
}

pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    /// Recognises the text in the image stored at `image`.
    fn extract_text(&self, image: &Path, options: &OcrOptions) -> Result<String, OcrError>;
}

/// Engines keyed by kind. A kind without a registered engine is unavailable.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: HashMap<EngineKind, Arc<dyn OcrEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: EngineKind, engine: Arc<dyn OcrEngine>) {
        self.engines.insert(kind, engine);
    }

    pub fn is_available(&self, kind: EngineKind) -> bool {
        self.engines
            .get(&kind)
            .map(|engine| engine.is_available())
            .unwrap_or(false)
    }

    /// Runs `kind` on `image` and collapses the whitespace of the result.
    pub fn recognize(
        &self,
        kind: EngineKind,
        image: &Path,
        options: &OcrOptions,
    ) -> Result<String, OcrError> {
        let engine = self
            .engines
            .get(&kind)
            .filter(|engine| engine.is_available())
            .ok_or_else(|| OcrError::Unavailable {
                engine: kind.display_name().to_string(),
            })?;
        let raw = engine.extract_text(image, options)?;
        Ok(collapse_whitespace(&raw))
    }
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds = self.engines.keys().collect::<Vec<_>>();
        kinds.sort_by_key(|kind| kind.display_name());
        f.debug_struct("EngineRegistry")
            .field("engines", &kinds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedEngine {
        available: bool,
        text: &'static str,
    }

    impl OcrEngine for CannedEngine {
        fn name(&self) -> &str {
            "canned"
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn extract_text(&self, _image: &Path, _options: &OcrOptions) -> Result<String, OcrError> {
            Ok(self.text.to_string())
        }
    }

    fn options() -> OcrOptions {
        OcrOptions {
            psm: 3,
            oem: 3,
            lang: "eng".to_string(),
            numeric_optimize: false,
        }
    }

    #[test]
    fn recognize_collapses_whitespace() {
        let mut registry = EngineRegistry::new();
        registry.register(
            EngineKind::Tesseract,
            Arc::new(CannedEngine {
                available: true,
                text: "Total\n\n  12.00\r\n",
            }),
        );
        let text = registry
            .recognize(EngineKind::Tesseract, Path::new("crop.png"), &options())
            .unwrap();
        assert_eq!(text, "Total 12.00");
    }

    #[test]
    fn unregistered_or_unavailable_engines_are_rejected() {
        let mut registry = EngineRegistry::new();
        registry.register(
            EngineKind::Tesseract,
            Arc::new(CannedEngine {
                available: false,
                text: "",
            }),
        );

        assert!(!registry.is_available(EngineKind::Tesseract));
        assert!(!registry.is_available(EngineKind::Platform));
        assert!(matches!(
            registry.recognize(EngineKind::Platform, Path::new("x.png"), &options()),
            Err(OcrError::Unavailable { .. })
        ));
    }

    #[test]
    fn sentinels_name_the_engine() {
        assert_eq!(EngineKind::Tesseract.unavailable_sentinel(), "[Tesseract N/A]");
        assert_eq!(EngineKind::Tesseract.error_sentinel(), "[Tesseract Error]");
        assert_eq!(EngineKind::Platform.unavailable_sentinel(), "[Platform OCR N/A]");
    }

    #[test]
    fn legacy_windows_engine_name_maps_to_platform() {
        let kind: EngineKind = serde_json::from_str("\"windows\"").unwrap();
        assert_eq!(kind, EngineKind::Platform);
    }
}
