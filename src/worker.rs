//! Single-thread worker host shared by the import and processing workers.
//!
//! Each worker owns exactly one named OS thread for its lifetime. Jobs are
//! handed over a channel; the run state lives behind a lock so that the
//! transition to `Running` happens in the caller's thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender, SyncSender};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error};

use crate::error::WorkerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Cooperative cancellation flag, checked once per work item.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Receiver side of a worker's event stream.
pub trait EventSink<E>: Send + 'static {
    fn emit(&self, event: E);
}

impl<E: Send + 'static> EventSink<E> for Sender<E> {
    fn emit(&self, event: E) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.send(event);
    }
}

impl<E: Send + 'static> EventSink<E> for SyncSender<E> {
    fn emit(&self, event: E) {
        let _ = self.send(event);
    }
}

/// Handle given to a job handler while it runs.
#[derive(Debug)]
pub struct RunContext {
    state: Arc<Mutex<RunState>>,
    cancel: CancellationToken,
    finished: AtomicBool,
}

impl RunContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Records the terminal state. Must be called before the handler emits
    /// its completion event.
    pub fn finish(&self, cancelled: bool) -> RunState {
        let final_state = if cancelled {
            RunState::Cancelled
        } else {
            RunState::Completed
        };
        *self.state.lock() = final_state;
        self.finished.store(true, Ordering::SeqCst);
        final_state
    }
}

pub struct Worker<J: Send + 'static> {
    name: &'static str,
    jobs: Option<Sender<J>>,
    handle: Option<JoinHandle<()>>,
    state: Arc<Mutex<RunState>>,
    cancel: CancellationToken,
}

impl<J: Send + 'static> Worker<J> {
    pub fn spawn<F>(name: &'static str, mut handler: F) -> Result<Self, WorkerError>
    where
        F: FnMut(J, &RunContext) + Send + 'static,
    {
        let (jobs, receiver) = mpsc::channel::<J>();
        let state = Arc::new(Mutex::new(RunState::Idle));
        let cancel = CancellationToken::new();
        let thread_state = Arc::clone(&state);
        let thread_cancel = cancel.clone();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for job in receiver {
                    let context = RunContext {
                        state: Arc::clone(&thread_state),
                        cancel: thread_cancel.clone(),
                        finished: AtomicBool::new(false),
                    };
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(job, &context)));
                    if outcome.is_err() {
                        error!(worker = name, "job handler panicked");
                    }
                    if !context.finished.load(Ordering::SeqCst) {
                        context.finish(context.is_cancelled());
                    }
                }
                debug!(worker = name, "job channel closed");
            })
            .map_err(|source| WorkerError::Spawn {
                worker: name,
                source,
            })?;

        Ok(Self {
            name,
            jobs: Some(jobs),
            handle: Some(handle),
            state,
            cancel,
        })
    }

    /// Hands `job` to the worker thread. Rejected while a run is in flight.
    pub fn submit(&self, job: J) -> Result<(), WorkerError> {
        self.submit_with(job, || {})
    }

    /// Like `submit`, running `on_accept` once the job is accepted but before
    /// the worker thread can see it.
    pub fn submit_with<F: FnOnce()>(&self, job: J, on_accept: F) -> Result<(), WorkerError> {
        let mut state = self.state.lock();
        if *state == RunState::Running {
            return Err(WorkerError::AlreadyRunning { worker: self.name });
        }
        let Some(jobs) = self.jobs.as_ref() else {
            return Err(WorkerError::Disconnected { worker: self.name });
        };

        let previous = *state;
        self.cancel.reset();
        *state = RunState::Running;
        on_accept();
        if jobs.send(job).is_err() {
            *state = previous;
            return Err(WorkerError::Disconnected { worker: self.name });
        }
        Ok(())
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl<J: Send + 'static> Drop for Worker<J> {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
