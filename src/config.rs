use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::ocr::{EngineKind, OcrOptions};
use crate::util::{ensure_directory, write_json_pretty};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub workspace_dir: PathBuf,
    pub tesseract_cmd: String,
    pub tesseract_lang: String,
    pub tesseract_psm: u8,
    pub tesseract_oem: u8,
    pub default_ocr_engine: EngineKind,
    pub ocr_dpi: u32,
    pub poppler_path: String,
    pub clear_cache_on_startup: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::from("data"),
            tesseract_cmd: "tesseract".to_string(),
            tesseract_lang: "eng".to_string(),
            tesseract_psm: 3,
            tesseract_oem: 3,
            default_ocr_engine: EngineKind::Tesseract,
            ocr_dpi: 300,
            poppler_path: String::new(),
            clear_cache_on_startup: false,
        }
    }
}

impl AppConfig {
    /// Reads `path`, creating it with defaults when absent. A file that does
    /// not decode is reported and replaced in memory by the defaults.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            write_json_pretty(path, &config)?;
            info!(path = %path.display(), "created default configuration");
            return Ok(config);
        }

        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        match serde_json::from_slice::<Self>(&raw) {
            Ok(config) => Ok(config),
            Err(err) => {
                error!(
                    path = %path.display(),
                    error = %err,
                    "configuration file is not valid JSON; using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    pub fn ocr_options(&self, numeric_optimize: bool) -> OcrOptions {
        OcrOptions {
            psm: self.tesseract_psm,
            oem: self.tesseract_oem,
            lang: self.tesseract_lang.clone(),
            numeric_optimize,
        }
    }

    /// Resolves a Poppler tool name against `poppler_path` when one is set.
    pub fn poppler_program(&self, program: &str) -> PathBuf {
        if self.poppler_path.trim().is_empty() {
            PathBuf::from(program)
        } else {
            Path::new(self.poppler_path.trim()).join(program)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub imports: PathBuf,
    pub exports: PathBuf,
    pub cache: PathBuf,
    pub templates: PathBuf,
    pub samples: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            imports: root.join("imports"),
            exports: root.join("exports"),
            cache: root.join("cache"),
            templates: root.join("templates"),
            samples: root.join("samples"),
            root,
        }
    }

    pub fn ensure(&self) -> Result<()> {
        for dir in [
            &self.root,
            &self.imports,
            &self.exports,
            &self.cache,
            &self.templates,
            &self.samples,
        ] {
            ensure_directory(dir)?;
        }
        Ok(())
    }

    pub fn last_run_path(&self) -> PathBuf {
        self.cache.join("last_run.json")
    }

    /// Removes every file under the cache directory except the last-run record.
    pub fn clear_cache(&self) -> Result<usize> {
        let keep = self.last_run_path();
        let mut removed = 0;
        let entries = fs::read_dir(&self.cache)
            .with_context(|| format!("failed to list {}", self.cache.display()))?;
        for entry in entries {
            let path = entry
                .with_context(|| format!("failed to list {}", self.cache.display()))?
                .path();
            if path == keep || !path.is_file() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) => warn!(path = %path.display(), error = %err, "failed to remove cache file"),
            }
        }
        Ok(removed)
    }

    /// Sorted regular files in the import directory.
    pub fn imported_files(&self) -> Result<Vec<PathBuf>> {
        list_files(&self.imports)
    }
}

pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("failed to list {}", dir.display()))?
            .path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_is_created_with_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("docsnip.json");

        let config = AppConfig::load_or_create(&path).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());

        let reread = AppConfig::load_or_create(&path).unwrap();
        assert_eq!(reread, config);
    }

    #[test]
    fn partial_config_keeps_defaults_for_missing_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("docsnip.json");
        fs::write(&path, r#"{"tesseract_lang": "deu", "tesseract_psm": 6}"#).unwrap();

        let config = AppConfig::load_or_create(&path).unwrap();
        assert_eq!(config.tesseract_lang, "deu");
        assert_eq!(config.tesseract_psm, 6);
        assert_eq!(config.tesseract_oem, 3);
        assert_eq!(config.workspace_dir, PathBuf::from("data"));
        assert_eq!(config.ocr_dpi, 300);
    }

    #[test]
    fn undecodable_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("docsnip.json");
        fs::write(&path, "{ not json").unwrap();

        let config = AppConfig::load_or_create(&path).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn workspace_ensure_creates_layout_and_clear_cache_keeps_last_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(dir.path().join("data"));
        workspace.ensure().unwrap();

        for sub in ["imports", "exports", "cache", "templates", "samples"] {
            assert!(workspace.root.join(sub).is_dir(), "{sub} missing");
        }

        fs::write(workspace.cache.join("crop.png"), b"x").unwrap();
        fs::write(workspace.last_run_path(), b"{}").unwrap();
        assert_eq!(workspace.clear_cache().unwrap(), 1);
        assert!(workspace.last_run_path().exists());
    }
}
