use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use image::DynamicImage;
use tracing::debug;

use crate::config::AppConfig;
use crate::util::{is_pdf, scratch_path};

/// Source of page text and page images for one document.
pub trait DocumentReader: Send + Sync {
    fn page_count(&self, path: &Path) -> Result<u32>;

    /// Native text layer of a PDF, one entry per page.
    fn page_texts(&self, path: &Path) -> Result<Vec<String>>;

    /// Rasterised image of a 1-based page. Image files have exactly one page.
    fn render_page(&self, path: &Path, page: u32) -> Result<DynamicImage>;
}

/// Reader backed by the Poppler command-line tools and the `image` decoders.
#[derive(Debug, Clone)]
pub struct PopplerReader {
    pdftotext: PathBuf,
    pdftoppm: PathBuf,
    pdfinfo: PathBuf,
    dpi: u32,
    scratch_dir: PathBuf,
}

impl PopplerReader {
    pub fn new(config: &AppConfig, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            pdftotext: config.poppler_program("pdftotext"),
            pdftoppm: config.poppler_program("pdftoppm"),
            pdfinfo: config.poppler_program("pdfinfo"),
            dpi: config.ocr_dpi,
            scratch_dir: scratch_dir.into(),
        }
    }
}

impl DocumentReader for PopplerReader {
    fn page_count(&self, path: &Path) -> Result<u32> {
        if !is_pdf(path) {
            return Ok(1);
        }

        let output = Command::new(&self.pdfinfo)
            .arg(path)
            .output()
            .with_context(|| format!("failed to execute pdfinfo for {}", path.display()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "pdfinfo returned non-zero exit status for {}: {}",
                path.display(),
                stderr.trim()
            );
        }

        parse_pdfinfo_pages(&String::from_utf8_lossy(&output.stdout))
            .with_context(|| format!("pdfinfo reported no page count for {}", path.display()))
    }

    fn page_texts(&self, path: &Path) -> Result<Vec<String>> {
        let output = Command::new(&self.pdftotext)
            .arg("-enc")
            .arg("UTF-8")
            .arg("-layout")
            .arg(path)
            .arg("-")
            .output()
            .with_context(|| format!("failed to execute pdftotext for {}", path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "pdftotext returned non-zero exit status for {}: {}",
                path.display(),
                stderr.trim()
            );
        }

        Ok(split_pdftotext_pages(&String::from_utf8_lossy(&output.stdout)))
    }

    fn render_page(&self, path: &Path, page: u32) -> Result<DynamicImage> {
        if !is_pdf(path) {
            if page != 1 {
                bail!("{} is an image and has no page {}", path.display(), page);
            }
            return image::open(path)
                .with_context(|| format!("failed to decode image {}", path.display()));
        }

        let output_root = scratch_path(&self.scratch_dir, path, &format!("p{page}"), "render");
        let png_path = PathBuf::from(format!("{}.png", output_root.display()));

        debug!(path = %path.display(), page, dpi = self.dpi, "rendering page");
        let output = Command::new(&self.pdftoppm)
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-singlefile")
            .arg("-png")
            .arg(path)
            .arg(&output_root)
            .output()
            .with_context(|| format!("failed to execute pdftoppm for {}", path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "pdftoppm returned non-zero exit status for {} page {}: {}",
                path.display(),
                page,
                stderr.trim()
            );
        }
        if !png_path.exists() {
            bail!(
                "pdftoppm did not produce expected image for {} page {}",
                path.display(),
                page
            );
        }

        let decoded = image::open(&png_path)
            .with_context(|| format!("failed to decode rendered page {}", png_path.display()));
        let _ = fs::remove_file(&png_path);
        decoded
    }
}

fn parse_pdfinfo_pages(stdout: &str) -> Option<u32> {
    stdout.lines().find_map(|line| {
        let rest = line.strip_prefix("Pages:")?;
        rest.trim().parse::<u32>().ok()
    })
}

/// pdftotext ends every page with a form feed, so the chunk after the last one
/// is not a page. Blank pages inside or at the end of the document are kept.
fn split_pdftotext_pages(raw: &str) -> Vec<String> {
    let mut pages: Vec<String> = raw
        .split('\u{000C}')
        .map(|chunk| chunk.replace('\u{0000}', ""))
        .collect();

    if pages.last().is_some_and(|last| last.trim().is_empty()) {
        pages.pop();
    }
    pages
}
