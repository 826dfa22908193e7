use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use tracing::debug;

use super::{NUMERIC_WHITELIST, OcrEngine, OcrOptions};
use crate::error::OcrError;

/// Tesseract driven through its command-line interface.
#[derive(Debug)]
pub struct TesseractEngine {
    program: PathBuf,
    available: OnceLock<bool>,
}

impl TesseractEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let program = if program.as_os_str().is_empty() {
            PathBuf::from("tesseract")
        } else {
            program
        };
        Self {
            program,
            available: OnceLock::new(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command_args(image: &Path, options: &OcrOptions) -> Vec<String> {
        let mut args = vec![
            image.display().to_string(),
            "stdout".to_string(),
            "--psm".to_string(),
            options.psm.to_string(),
            "--oem".to_string(),
            options.oem.to_string(),
            "-l".to_string(),
            options.lang.clone(),
        ];
        if options.numeric_optimize {
            args.push("-c".to_string());
            args.push(format!("tessedit_char_whitelist={NUMERIC_WHITELIST}"));
        }
        args
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| command_available(&self.program))
    }

    fn extract_text(&self, image: &Path, options: &OcrOptions) -> Result<String, OcrError> {
        let args = Self::command_args(image, options);
        debug!(program = %self.program.display(), args = ?args, "running tesseract");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| OcrError::Io {
                engine: self.name().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Failed {
                engine: self.name().to_string(),
                message: format!(
                    "non-zero exit status for {}: {}",
                    image.display(),
                    stderr.trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .replace('\u{0000}', "")
            .trim()
            .to_string())
    }
}

pub fn command_available(program: &Path) -> bool {
    Command::new(program).arg("--version").output().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(numeric_optimize: bool) -> OcrOptions {
        OcrOptions {
            psm: 6,
            oem: 1,
            lang: "eng+deu".to_string(),
            numeric_optimize,
        }
    }

    #[test]
    fn command_args_carry_layout_and_language() {
        let args = TesseractEngine::command_args(Path::new("/tmp/crop.png"), &options(false));
        assert_eq!(
            args,
            vec!["/tmp/crop.png", "stdout", "--psm", "6", "--oem", "1", "-l", "eng+deu"]
        );
    }

    #[test]
    fn numeric_optimize_adds_whitelist() {
        let args = TesseractEngine::command_args(Path::new("crop.png"), &options(true));
        assert_eq!(
            &args[args.len() - 2..],
            &["-c".to_string(), "tessedit_char_whitelist=0123456789.,$€£¥".to_string()]
        );
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let engine = TesseractEngine::new("/nonexistent/docsnip-tesseract");
        assert!(!engine.is_available());
        assert!(matches!(
            engine.extract_text(Path::new("crop.png"), &options(false)),
            Err(OcrError::Io { .. })
        ));
    }

    #[test]
    fn empty_program_defaults_to_tesseract() {
        assert_eq!(TesseractEngine::new("").program(), Path::new("tesseract"));
    }
}
