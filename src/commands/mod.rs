pub mod export;
pub mod import;
pub mod process;
pub mod session;
pub mod status;
pub mod template;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::{AppConfig, Workspace};
use crate::model::RunRecord;
use crate::templates::TemplateStore;
use crate::util::{read_json, write_json_pretty};

/// Configuration and workspace shared by every subcommand.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub workspace: Workspace,
}

impl AppContext {
    pub fn prepare(config_path: &Path, workspace_override: Option<&Path>) -> Result<Self> {
        let mut config = AppConfig::load_or_create(config_path)
            .with_context(|| format!("failed to load configuration {}", config_path.display()))?;
        if let Some(dir) = workspace_override {
            config.workspace_dir = dir.to_path_buf();
        }

        let workspace = Workspace::new(&config.workspace_dir);
        workspace.ensure()?;
        if config.clear_cache_on_startup {
            let removed = workspace.clear_cache()?;
            info!(removed, "cleared cache directory");
        }

        Ok(Self { config, workspace })
    }

    pub fn template_store(&self) -> Result<TemplateStore> {
        TemplateStore::load(&self.workspace.templates).context("failed to load templates")
    }

    pub fn last_run(&self) -> Result<Option<RunRecord>> {
        let path = self.workspace.last_run_path();
        if !path.exists() {
            warn!(path = %path.display(), "no processing run recorded yet");
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    pub fn record_run(&self, record: &RunRecord) -> Result<()> {
        write_json_pretty(&self.workspace.last_run_path(), record)
    }
}
