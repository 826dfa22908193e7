use std::sync::mpsc;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use super::AppContext;
use crate::cli::ImportArgs;
use crate::importer::{ImportEvent, ImportWorker};
use crate::worker::RunState;

pub fn run(app: &AppContext, args: ImportArgs) -> Result<()> {
    let (sender, events) = mpsc::channel();
    let importer = ImportWorker::spawn(app.workspace.imports.clone(), sender)
        .context("failed to start file importer")?;

    importer.set_files(args.paths);
    importer.run().context("failed to start import run")?;

    for event in events.iter() {
        match event {
            ImportEvent::Imported { destination, .. } => {
                info!(path = %destination.display(), "file available for processing");
            }
            ImportEvent::ItemFailed { source, message } => {
                warn!(path = %source.display(), reason = %message, "file skipped");
            }
            ImportEvent::Finished {
                state,
                imported,
                failed,
            } => {
                info!(state = state.as_str(), imported, failed, "import finished");
                if imported == 0 && failed > 0 {
                    bail!("none of the {failed} file(s) could be imported");
                }
                if state == RunState::Cancelled {
                    warn!("import was cancelled before every file was copied");
                }
                break;
            }
        }
    }

    Ok(())
}
