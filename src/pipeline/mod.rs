//! Background processing of imported documents into result rows.

mod run;


use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::WorkerError;
use crate::model::{ResultRow, Template};
use crate::ocr::{DocumentReader, EngineKind, EngineRegistry, OcrOptions};
use crate::worker::{EventSink, RunState, Worker};

const WORKER_NAME: &str = "processing-pipeline";

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Progress {
        current: usize,
        total: usize,
    },
    RowProduced(ResultRow),
    ItemFailed {
        file: String,
        page: Option<u32>,
        message: String,
    },
    Finished {
        state: RunState,
        rows: usize,
    },
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub files: Vec<PathBuf>,
    pub templates: Arc<[Template]>,
    pub engine: EngineKind,
    /// 1-based pages to process per file. Files without an entry are
    /// processed in full.
    pub pages: HashMap<PathBuf, Vec<u32>>,
}

impl RunRequest {
    pub fn new(files: Vec<PathBuf>, templates: Arc<[Template]>, engine: EngineKind) -> Self {
        Self {
            files,
            templates,
            engine,
            pages: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub ocr: OcrOptions,
    /// Directory for intermediate crops handed to the OCR engine.
    pub scratch_dir: PathBuf,
}

pub struct ProcessingPipeline {
    worker: Worker<RunRequest>,
    rows: Arc<Mutex<Vec<ResultRow>>>,
}

impl ProcessingPipeline {
    pub fn spawn<S>(
        reader: Arc<dyn DocumentReader>,
        engines: EngineRegistry,
        settings: PipelineSettings,
        sink: S,
    ) -> Result<Self, WorkerError>
    where
        S: EventSink<PipelineEvent>,
    {
        let rows = Arc::new(Mutex::new(Vec::new()));
        let worker_rows = Arc::clone(&rows);
        let worker = Worker::spawn(WORKER_NAME, move |request: RunRequest, context| {
            let run = run::PipelineRun {
                reader: reader.as_ref(),
                engines: &engines,
                settings: &settings,
                sink: &sink,
                rows: &worker_rows,
                context,
            };
            run.execute(request);
        })?;

        Ok(Self { worker, rows })
    }

    /// Starts a run. Rejected while another run is active; the active run is
    /// left untouched. Rows of the previous run are gone once this returns.
    pub fn start(&self, request: RunRequest) -> Result<(), WorkerError> {
        self.worker.submit_with(request, || self.rows.lock().clear())
    }

    pub fn stop(&self) {
        self.worker.stop();
    }

    pub fn state(&self) -> RunState {
        self.worker.state()
    }

    /// Snapshot of the rows accumulated by the current or latest run.
    pub fn results(&self) -> Vec<ResultRow> {
        self.rows.lock().clone()
    }
}
