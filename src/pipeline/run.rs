use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::DynamicImage;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{info, warn};

use super::{PipelineEvent, PipelineSettings, RunRequest};
use crate::error::OcrError;
use crate::extraction::{self, resolve_field};
use crate::model::{Field, NOT_FOUND, Region, ResultRow, Template, TemplateKind};
use crate::ocr::{DocumentReader, EngineKind, EngineRegistry, OcrOptions};
use crate::util::{base_name, is_pdf, scratch_path};
use crate::worker::{EventSink, RunContext};

pub(super) struct PipelineRun<'a, S> {
    pub reader: &'a dyn DocumentReader,
    pub engines: &'a EngineRegistry,
    pub settings: &'a PipelineSettings,
    pub sink: &'a S,
    pub rows: &'a Mutex<Vec<ResultRow>>,
    pub context: &'a RunContext,
}

enum Route<'t> {
    NativeText(&'t Template),
    Visual(&'t Template),
    PageOcr(&'t Template),
}

impl<S: EventSink<PipelineEvent>> PipelineRun<'_, S> {
    pub fn execute(&self, request: RunRequest) {
        let total = request.files.len();
        info!(
            files = total,
            templates = request.templates.len(),
            engine = %request.engine,
            "processing run started"
        );

        let mut skipped = false;
        for (index, file) in request.files.iter().enumerate() {
            if self.context.is_cancelled() {
                info!(processed = index, remaining = total - index, "processing run cancelled");
                skipped = true;
                break;
            }

            info!(path = %file.display(), "processing file");
            self.sink.emit(PipelineEvent::Progress {
                current: index + 1,
                total,
            });
            self.process_file(file, &request);
        }

        let rows = self.rows.lock().len();
        let state = self.context.finish(skipped);
        info!(state = state.as_str(), rows, "processing run finished");
        self.sink.emit(PipelineEvent::Finished { state, rows });
    }

    fn process_file(&self, file: &Path, request: &RunRequest) {
        let name = base_name(file);
        let Some(route) = select_route(file, &request.templates) else {
            self.item_failed(&name, None, "no applicable template".to_string());
            return;
        };

        let outcome = match route {
            Route::NativeText(template) => self.process_native_text(file, &name, template, request),
            Route::Visual(template) => self.process_rendered(file, &name, request, |image, page| {
                self.visual_values(file, page, image, template, request.engine)
            }),
            Route::PageOcr(template) => self.process_rendered(file, &name, request, |image, page| {
                self.page_ocr_values(file, page, image, template, request.engine)
            }),
        };

        if let Err(err) = outcome {
            self.item_failed(&name, None, format!("{err:#}"));
        }
    }

    fn process_native_text(
        &self,
        file: &Path,
        name: &str,
        template: &Template,
        request: &RunRequest,
    ) -> Result<()> {
        let texts = self.reader.page_texts(file)?;
        // Pages without a text layer still count and produce a row.
        let count = self.reader.page_count(file)?.max(texts.len() as u32);
        for page in selected_pages(request, file, count) {
            if page == 0 || page > count {
                self.item_failed(name, Some(page), format!("page {page} is out of range"));
                continue;
            }
            let text = texts
                .get(page as usize - 1)
                .map(String::as_str)
                .unwrap_or_default();
            let values = extraction::extract(template, text);
            self.push_row(ResultRow::new(name, page, values));
        }
        Ok(())
    }

    fn process_rendered<F>(
        &self,
        file: &Path,
        name: &str,
        request: &RunRequest,
        mut resolve: F,
    ) -> Result<()>
    where
        F: FnMut(&DynamicImage, u32) -> IndexMap<String, String>,
    {
        let count = self.reader.page_count(file)?;
        for page in selected_pages(request, file, count) {
            if page == 0 || page > count {
                self.item_failed(name, Some(page), format!("page {page} is out of range"));
                continue;
            }
            match self.reader.render_page(file, page) {
                Ok(image) => {
                    let values = resolve(&image, page);
                    self.push_row(ResultRow::new(name, page, values));
                }
                Err(err) => self.item_failed(name, Some(page), format!("{err:#}")),
            }
        }
        Ok(())
    }

    fn visual_values(
        &self,
        file: &Path,
        page: u32,
        image: &DynamicImage,
        template: &Template,
        engine: EngineKind,
    ) -> IndexMap<String, String> {
        let options = self.settings.ocr.with_numeric(template.numeric_optimize);
        template
            .fields
            .iter()
            .map(|field| {
                let value = match crop_region(image, field.region) {
                    Some(crop) => self.field_value(file, page, &crop, template, field, engine, &options),
                    None => {
                        warn!(
                            path = %file.display(),
                            page,
                            column = %field.column_name,
                            "field region lies outside the page"
                        );
                        NOT_FOUND.to_string()
                    }
                };
                (field.column_name.clone(), value)
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn field_value(
        &self,
        file: &Path,
        page: u32,
        crop: &DynamicImage,
        template: &Template,
        field: &Field,
        engine: EngineKind,
        options: &OcrOptions,
    ) -> String {
        match self.recognize(file, page, &field.column_name, crop, engine, options) {
            Ok(text) if field.pattern.is_empty() => {
                if text.is_empty() {
                    NOT_FOUND.to_string()
                } else {
                    text
                }
            }
            Ok(text) => resolve_field(&template.name, field, &text),
            Err(sentinel) => sentinel,
        }
    }

    fn page_ocr_values(
        &self,
        file: &Path,
        page: u32,
        image: &DynamicImage,
        template: &Template,
        engine: EngineKind,
    ) -> IndexMap<String, String> {
        let options = self.settings.ocr.with_numeric(false);
        match self.recognize(file, page, "page", image, engine, &options) {
            Ok(text) => extraction::extract(template, &text),
            Err(sentinel) => template
                .fields
                .iter()
                .map(|field| (field.column_name.clone(), sentinel.clone()))
                .collect(),
        }
    }

    /// OCR text of `image`, or the engine sentinel that replaces it.
    fn recognize(
        &self,
        file: &Path,
        page: u32,
        label: &str,
        image: &DynamicImage,
        engine: EngineKind,
        options: &OcrOptions,
    ) -> Result<String, String> {
        if !self.engines.is_available(engine) {
            return Err(engine.unavailable_sentinel());
        }

        let crop_path = match self.write_scratch_image(file, page, label, image) {
            Ok(path) => path,
            Err(err) => {
                warn!(path = %file.display(), page, error = %format!("{err:#}"), "failed to stage image for OCR");
                return Err(engine.error_sentinel());
            }
        };

        let result = self.engines.recognize(engine, &crop_path, options);
        let _ = fs::remove_file(&crop_path);

        match result {
            Ok(text) => Ok(text),
            Err(OcrError::Unavailable { .. }) => Err(engine.unavailable_sentinel()),
            Err(err) => {
                warn!(path = %file.display(), page, label, error = %err, "OCR failed");
                Err(engine.error_sentinel())
            }
        }
    }

    fn write_scratch_image(
        &self,
        file: &Path,
        page: u32,
        label: &str,
        image: &DynamicImage,
    ) -> Result<PathBuf> {
        let safe_label = label
            .chars()
            .map(|character| {
                if character.is_ascii_alphanumeric() {
                    character
                } else {
                    '_'
                }
            })
            .collect::<String>();
        let path = scratch_path(
            &self.settings.scratch_dir,
            file,
            &format!("p{page}_{safe_label}"),
            "png",
        );
        image
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    fn push_row(&self, row: ResultRow) {
        self.rows.lock().push(row.clone());
        self.sink.emit(PipelineEvent::RowProduced(row));
    }

    fn item_failed(&self, file: &str, page: Option<u32>, message: String) {
        warn!(file, page = ?page, message = %message, "item failed");
        self.sink.emit(PipelineEvent::ItemFailed {
            file: file.to_string(),
            page,
            message,
        });
    }
}

fn select_route<'t>(file: &Path, templates: &'t [Template]) -> Option<Route<'t>> {
    let first_of = |kind: TemplateKind| templates.iter().find(|template| template.kind == kind);
    let text_parser = first_of(TemplateKind::TextParser);
    let visual = first_of(TemplateKind::Visual);

    match (is_pdf(file), text_parser, visual) {
        (true, Some(template), _) => Some(Route::NativeText(template)),
        (_, _, Some(template)) => Some(Route::Visual(template)),
        (_, Some(template), None) => Some(Route::PageOcr(template)),
        (_, None, None) => None,
    }
}

fn selected_pages(request: &RunRequest, file: &Path, count: u32) -> Vec<u32> {
    match request.pages.get(file) {
        Some(pages) => pages.clone(),
        None => (1..=count).collect(),
    }
}

/// Region clamped to the image bounds. A missing region selects the whole
/// page; a region with no overlap yields `None`.
fn crop_region(image: &DynamicImage, region: Option<Region>) -> Option<DynamicImage> {
    let Some(region) = region else {
        return Some(image.clone());
    };
    let (width, height) = (image.width(), image.height());
    if region.x >= width || region.y >= height || region.width == 0 || region.height == 0 {
        return None;
    }
    let crop_width = region.width.min(width - region.x);
    let crop_height = region.height.min(height - region.y);
    Some(image.crop_imm(region.x, region.y, crop_width, crop_height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_prefers_native_text_for_pdfs_with_text_parser() {
        let templates = vec![
            Template::visual("Snips", false, vec![]),
            Template::text_parser("Invoice", vec![Field::text("No", "x")]),
        ];
        assert!(matches!(
            select_route(Path::new("a.pdf"), &templates),
            Some(Route::NativeText(template)) if template.name == "Invoice"
        ));
        assert!(matches!(
            select_route(Path::new("a.png"), &templates),
            Some(Route::Visual(template)) if template.name == "Snips"
        ));
        assert!(matches!(
            select_route(Path::new("a.png"), &templates[1..]),
            Some(Route::PageOcr(_))
        ));
        assert!(select_route(Path::new("a.pdf"), &[]).is_none());
    }

    #[test]
    fn crop_region_clamps_to_image_bounds() {
        let image = DynamicImage::new_rgb8(100, 50);
        let crop = crop_region(
            &image,
            Some(Region {
                x: 80,
                y: 40,
                width: 50,
                height: 50,
            }),
        )
        .unwrap();
        assert_eq!((crop.width(), crop.height()), (20, 10));

        let outside = Region {
            x: 100,
            y: 0,
            width: 5,
            height: 5,
        };
        assert!(crop_region(&image, Some(outside)).is_none());
        assert_eq!(crop_region(&image, None).unwrap().width(), 100);
    }
}
