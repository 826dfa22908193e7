use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{debug, info, warn};

use super::AppContext;
use crate::cli::ProcessArgs;
use crate::model::{RUN_RECORD_VERSION, RunRecord, RunWarning, Template};
use crate::ocr::{EngineKind, EngineRegistry, PopplerReader, TesseractEngine};
use crate::pipeline::{PipelineEvent, PipelineSettings, ProcessingPipeline, RunRequest};
use crate::util::{base_name, now_utc_string, utc_compact_string};

pub fn run(app: &AppContext, args: ProcessArgs) -> Result<()> {
    let store = app.template_store()?;
    let templates = select_templates(store.templates(), &args.templates)?;
    let files = select_files(app.workspace.imported_files()?, &args.files)?;
    let pages = parse_page_selections(&args.pages, &app.workspace.imports)?;
    let engine = args.engine.unwrap_or(app.config.default_ocr_engine);

    let tesseract = TesseractEngine::new(&app.config.tesseract_cmd);
    debug!(program = %tesseract.program().display(), "registering tesseract");
    let mut engines = EngineRegistry::new();
    engines.register(EngineKind::Tesseract, Arc::new(tesseract));
    if !engines.is_available(engine) {
        warn!(engine = %engine, "selected OCR engine is unavailable; OCR fields will hold a placeholder");
    }

    let reader = Arc::new(PopplerReader::new(&app.config, &app.workspace.cache));
    let settings = PipelineSettings {
        ocr: app.config.ocr_options(false),
        scratch_dir: app.workspace.cache.clone(),
    };

    let (sender, events) = mpsc::channel();
    let pipeline = ProcessingPipeline::spawn(reader, engines, settings, sender)
        .context("failed to start processing pipeline")?;

    let started_at = Utc::now();
    let template_names = templates
        .iter()
        .map(|template| template.name.clone())
        .collect::<Vec<_>>();
    let file_count = files.len();
    let mut request = RunRequest::new(files, Arc::from(templates), engine);
    request.pages = pages;
    pipeline.start(request).context("failed to start processing run")?;

    let mut warnings = Vec::new();
    let mut final_state = None;
    for event in events.iter() {
        match event {
            PipelineEvent::Progress { current, total } => {
                info!(current, total, "progress");
            }
            PipelineEvent::RowProduced(row) => {
                debug!(file = %row.file, page = row.page, "row produced");
            }
            PipelineEvent::ItemFailed {
                file,
                page,
                message,
            } => {
                warnings.push(RunWarning {
                    file,
                    page,
                    message,
                });
            }
            PipelineEvent::Finished { state, rows } => {
                info!(state = state.as_str(), rows, "processing finished");
                final_state = Some(state);
                break;
            }
        }
    }
    let Some(state) = final_state else {
        bail!("processing pipeline stopped without reporting completion");
    };

    let rows = pipeline.results();
    let record = RunRecord {
        manifest_version: RUN_RECORD_VERSION,
        run_id: format!("run-{}", utc_compact_string(started_at)),
        engine: engine.display_name().to_string(),
        status: state.as_str().to_string(),
        started_at: started_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        finished_at: now_utc_string(),
        templates: template_names,
        file_count,
        row_count: rows.len(),
        failed_count: warnings.len(),
        warnings,
        rows,
    };
    app.record_run(&record)?;
    info!(
        run_id = %record.run_id,
        rows = record.row_count,
        failed = record.failed_count,
        path = %app.workspace.last_run_path().display(),
        "recorded processing run"
    );

    Ok(())
}

fn select_templates(available: &[Template], names: &[String]) -> Result<Vec<Template>> {
    if available.is_empty() {
        bail!("no templates defined; add one with `docsnip template add`");
    }
    if names.is_empty() {
        return Ok(available.to_vec());
    }
    names
        .iter()
        .map(|name| {
            available
                .iter()
                .find(|template| &template.name == name)
                .cloned()
                .with_context(|| format!("template '{name}' not found"))
        })
        .collect()
}

fn select_files(imported: Vec<PathBuf>, names: &[String]) -> Result<Vec<PathBuf>> {
    if imported.is_empty() {
        bail!("no imported documents; run `docsnip import` first");
    }
    if names.is_empty() {
        return Ok(imported);
    }
    names
        .iter()
        .map(|name| {
            imported
                .iter()
                .find(|path| &base_name(path) == name)
                .cloned()
                .with_context(|| format!("'{name}' has not been imported"))
        })
        .collect()
}

/// Parses `name.pdf:1,3-5` into 1-based page numbers keyed by import path.
fn parse_page_selections(
    selections: &[String],
    imports_dir: &std::path::Path,
) -> Result<HashMap<PathBuf, Vec<u32>>> {
    let mut pages: HashMap<PathBuf, Vec<u32>> = HashMap::new();
    for selection in selections {
        let Some((name, list)) = selection.rsplit_once(':') else {
            bail!("page selection '{selection}' must look like 'file.pdf:1,3-5'");
        };
        let selected = pages.entry(imports_dir.join(name.trim())).or_default();
        for part in list.split(',').map(str::trim).filter(|part| !part.is_empty()) {
            let parse = |value: &str| {
                value
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|page| *page >= 1)
                    .with_context(|| format!("invalid page '{value}' in '{selection}'"))
            };
            match part.split_once('-') {
                Some((start, end)) => {
                    let (start, end) = (parse(start)?, parse(end)?);
                    if end < start {
                        bail!("page range '{part}' in '{selection}' is reversed");
                    }
                    selected.extend(start..=end);
                }
                None => selected.push(parse(part)?),
            }
        }
    }
    for selected in pages.values_mut() {
        selected.sort_unstable();
        selected.dedup();
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::model::Field;

    #[test]
    fn page_selections_expand_ranges_and_merge_per_file() {
        let selections = vec!["a.pdf:1,3-5".to_string(), "a.pdf:2, 4".to_string(), "b.pdf:7".to_string()];
        let pages = parse_page_selections(&selections, Path::new("/ws/imports")).unwrap();
        assert_eq!(pages[&PathBuf::from("/ws/imports/a.pdf")], vec![1, 2, 3, 4, 5]);
        assert_eq!(pages[&PathBuf::from("/ws/imports/b.pdf")], vec![7]);
    }

    #[test]
    fn invalid_page_selections_are_rejected() {
        let imports = Path::new("/ws/imports");
        assert!(parse_page_selections(&["a.pdf".to_string()], imports).is_err());
        assert!(parse_page_selections(&["a.pdf:0".to_string()], imports).is_err());
        assert!(parse_page_selections(&["a.pdf:5-2".to_string()], imports).is_err());
        assert!(parse_page_selections(&["a.pdf:x".to_string()], imports).is_err());
    }

    #[test]
    fn templates_are_selected_in_requested_order() {
        let available = vec![
            Template::text_parser("A", vec![Field::text("x", "x")]),
            Template::visual("B", false, Vec::new()),
        ];
        let chosen = select_templates(&available, &["B".to_string(), "A".to_string()]).unwrap();
        assert_eq!(chosen[0].name, "B");
        assert_eq!(chosen[1].name, "A");
        assert!(select_templates(&available, &["C".to_string()]).is_err());
        assert!(select_templates(&[], &[]).is_err());
    }

    #[test]
    fn files_are_filtered_by_base_name() {
        let imported = vec![PathBuf::from("/i/a.pdf"), PathBuf::from("/i/b.png")];
        let chosen = select_files(imported.clone(), &["b.png".to_string()]).unwrap();
        assert_eq!(chosen, vec![PathBuf::from("/i/b.png")]);
        assert_eq!(select_files(imported.clone(), &[]).unwrap(), imported);
        assert!(select_files(imported, &["c.pdf".to_string()]).is_err());
    }
}
