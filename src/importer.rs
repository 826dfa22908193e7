use std::fs;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ImportError, WorkerError};
use crate::worker::{CancellationToken, EventSink, RunContext, RunState, Worker};

const WORKER_NAME: &str = "file-importer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportEvent {
    Imported {
        source: PathBuf,
        destination: PathBuf,
    },
    ItemFailed {
        source: PathBuf,
        message: String,
    },
    Finished {
        state: RunState,
        imported: usize,
        failed: usize,
    },
}

/// Copies staged files into the workspace import directory on its own thread.
pub struct ImportWorker {
    worker: Worker<Vec<PathBuf>>,
    staged: Mutex<Vec<PathBuf>>,
}

impl ImportWorker {
    pub fn spawn<S>(imports_dir: PathBuf, sink: S) -> Result<Self, WorkerError>
    where
        S: EventSink<ImportEvent>,
    {
        let worker = Worker::spawn(WORKER_NAME, move |files: Vec<PathBuf>, context| {
            run_batch(&files, &imports_dir, &sink, context);
        })?;
        Ok(Self {
            worker,
            staged: Mutex::new(Vec::new()),
        })
    }

    /// Replaces the batch used by the next `run`.
    pub fn set_files(&self, paths: Vec<PathBuf>) {
        *self.staged.lock() = paths;
    }

    pub fn run(&self) -> Result<(), WorkerError> {
        let files = self.staged.lock().clone();
        self.worker.submit(files)
    }

    pub fn stop(&self) {
        info!("file import stop requested");
        self.worker.stop();
    }

    pub fn state(&self) -> RunState {
        self.worker.state()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.worker.cancellation_token()
    }
}

fn run_batch<S: EventSink<ImportEvent>>(
    files: &[PathBuf],
    imports_dir: &Path,
    sink: &S,
    context: &RunContext,
) {
    info!(files = files.len(), dir = %imports_dir.display(), "file import started");

    let mut imported = 0;
    let mut failed = 0;
    let mut skipped = false;
    for source in files {
        if context.is_cancelled() {
            skipped = true;
            break;
        }

        match import_file(source, imports_dir) {
            Ok(destination) => {
                imported += 1;
                info!(source = %source.display(), destination = %destination.display(), "imported file");
                sink.emit(ImportEvent::Imported {
                    source: source.clone(),
                    destination,
                });
            }
            Err(err) => {
                failed += 1;
                warn!(source = %source.display(), error = %err, "could not import file");
                sink.emit(ImportEvent::ItemFailed {
                    source: source.clone(),
                    message: err.to_string(),
                });
            }
        }
    }

    let state = context.finish(skipped);
    info!(imported, failed, state = state.as_str(), "file import finished");
    sink.emit(ImportEvent::Finished {
        state,
        imported,
        failed,
    });
}

/// Copies `source` into `imports_dir` under its base name, keeping its
/// permissions and access/modification times.
pub fn import_file(source: &Path, imports_dir: &Path) -> Result<PathBuf, ImportError> {
    if !source.is_file() {
        return Err(ImportError::SourceMissing(source.to_path_buf()));
    }
    let Some(file_name) = source.file_name() else {
        return Err(ImportError::NoFileName(source.to_path_buf()));
    };
    let destination = imports_dir.join(file_name);
    let copy_error = |err: std::io::Error| ImportError::Copy {
        source_path: source.to_path_buf(),
        destination: destination.clone(),
        source: err,
    };

    fs::create_dir_all(imports_dir).map_err(copy_error)?;
    if is_same_file(source, &destination) {
        debug!(path = %destination.display(), "file already in the import directory");
        return Ok(destination);
    }
    fs::copy(source, &destination).map_err(copy_error)?;

    let metadata = fs::metadata(source).map_err(copy_error)?;
    filetime::set_file_times(
        &destination,
        FileTime::from_last_access_time(&metadata),
        FileTime::from_last_modification_time(&metadata),
    )
    .map_err(copy_error)?;

    Ok(destination)
}

/// Copying a file onto itself truncates it.
fn is_same_file(source: &Path, destination: &Path) -> bool {
    match (fs::canonicalize(source), fs::canonicalize(destination)) {
        (Ok(source), Ok(destination)) => source == destination,
        _ => false,
    }
}
