use anyhow::{Context, Result};
use tracing::{info, warn};

use super::AppContext;
use crate::cli::{SessionCommand, SessionLoadArgs, SessionSaveArgs};
use crate::model::{RUN_RECORD_VERSION, RunRecord, Template};
use crate::session::SessionStore;
use crate::util::{now_utc_string, read_json};

pub fn run(app: &AppContext, command: SessionCommand) -> Result<()> {
    match command {
        SessionCommand::Save(args) => save(app, args),
        SessionCommand::Load(args) => load(app, args),
    }
}

fn save(app: &AppContext, args: SessionSaveArgs) -> Result<()> {
    let documents = app.workspace.imported_files()?;
    let store = app.template_store()?;
    let last_run = app.last_run()?;

    let (templates, rows) = match &last_run {
        Some(record) => {
            let used = store
                .templates()
                .iter()
                .filter(|template| record.templates.contains(&template.name))
                .cloned()
                .collect::<Vec<Template>>();
            (used, record.rows.clone())
        }
        None => (store.templates().to_vec(), Vec::new()),
    };

    let view_settings = match &args.view_settings {
        Some(path) => read_json(path)?,
        None => serde_json::Value::Null,
    };

    let manifest = SessionStore::new(&app.workspace.imports)
        .save(&args.path, &documents, &templates, &rows, &view_settings)
        .context("failed to save session")?;
    info!(
        path = %args.path.display(),
        documents = manifest.document_names.len(),
        templates = manifest.templates.len(),
        rows = manifest.rows.len(),
        "session saved"
    );
    Ok(())
}

fn load(app: &AppContext, args: SessionLoadArgs) -> Result<()> {
    let loaded = SessionStore::new(&app.workspace.imports)
        .load(&args.path)
        .context("failed to load session")?;

    let mut store = app.template_store()?;
    for template in &loaded.manifest.templates {
        if store.find(&template.name).is_some() {
            warn!(name = %template.name, "template already defined; keeping the workspace copy");
            continue;
        }
        match store.add(template.clone()) {
            Ok(()) => info!(name = %template.name, "template restored from session"),
            Err(err) if err.is_invalid_template() => {
                warn!(name = %template.name, error = %err, "session template rejected");
            }
            Err(err) => return Err(err).context("failed to store session template"),
        }
    }

    let restored_at = now_utc_string();
    let record = RunRecord {
        manifest_version: RUN_RECORD_VERSION,
        run_id: format!("session-{}", loaded.manifest.saved_at),
        engine: String::new(),
        status: "restored".to_string(),
        started_at: restored_at.clone(),
        finished_at: restored_at,
        templates: loaded
            .manifest
            .templates
            .iter()
            .map(|template| template.name.clone())
            .collect(),
        file_count: loaded.documents.len(),
        row_count: loaded.manifest.rows.len(),
        failed_count: 0,
        warnings: Vec::new(),
        rows: loaded.manifest.rows.clone(),
    };
    app.record_run(&record)?;

    info!(
        path = %args.path.display(),
        version = %loaded.manifest.version,
        documents = loaded.documents.len(),
        rows = record.row_count,
        "session restored"
    );
    Ok(())
}
