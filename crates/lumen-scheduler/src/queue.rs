use crate::panic_message;
use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use tracing::{debug, error, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Msg {
    Run(Job),
    Stop,
}

/// Configuration for [`BackgroundQueue::new`].
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Worker thread name, visible in stack dumps.
    pub name: String,
    /// Run jobs on the calling thread instead of a worker. Panics then
    /// propagate to the caller, which is what tests want.
    pub inline: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "lumen-sync".to_string(),
            inline: false,
        }
    }
}

enum Mode {
    Worker {
        tx: Sender<Msg>,
        handle: Mutex<Option<JoinHandle<()>>>,
    },
    Inline,
}

/// FIFO job queue on one named worker thread.
///
/// Jobs run in submission order, one at a time. A panicking job is contained
/// and logged; the worker keeps serving later jobs. Dropping the queue stops
/// the worker after the jobs already dequeued, discarding the rest.
pub struct BackgroundQueue {
    mode: Mode,
}

impl std::fmt::Debug for BackgroundQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.mode {
            Mode::Worker { .. } => f.write_str("BackgroundQueue::Worker"),
            Mode::Inline => f.write_str("BackgroundQueue::Inline"),
        }
    }
}

impl BackgroundQueue {
    pub fn new(config: QueueConfig) -> Self {
        if config.inline {
            return Self { mode: Mode::Inline };
        }

        let (tx, rx) = unbounded::<Msg>();
        let spawn = std::thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || {
                while let Ok(msg) = rx.recv() {
                    match msg {
                        Msg::Run(job) => run_contained(job),
                        Msg::Stop => break,
                    }
                }
                debug!(target: "lumen.scheduler", "background queue worker stopped");
            });

        match spawn {
            Ok(handle) => Self {
                mode: Mode::Worker {
                    tx,
                    handle: Mutex::new(Some(handle)),
                },
            },
            Err(err) => {
                warn!(
                    target: "lumen.scheduler",
                    error = %err,
                    "failed to spawn background queue worker; falling back to inline execution"
                );
                Self { mode: Mode::Inline }
            }
        }
    }

    /// Queue that runs every job on the calling thread.
    pub fn inline() -> Self {
        Self { mode: Mode::Inline }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.mode, Mode::Inline)
    }

    /// Submits a job. Inline queues run it before returning.
    pub fn push(&self, job: impl FnOnce() + Send + 'static) {
        match &self.mode {
            Mode::Inline => job(),
            Mode::Worker { tx, .. } => {
                if tx.send(Msg::Run(Box::new(job))).is_err() {
                    warn!(
                        target: "lumen.scheduler",
                        "background queue worker is gone; dropping job"
                    );
                }
            }
        }
    }

    /// Blocks until every job submitted before this call has finished.
    pub fn flush(&self) {
        if let Mode::Worker { tx, .. } = &self.mode {
            let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
            let sent = tx
                .send(Msg::Run(Box::new(move || {
                    let _ = ack_tx.send(());
                })))
                .is_ok();
            if sent {
                let _ = ack_rx.recv();
            }
        }
    }
}

impl Drop for BackgroundQueue {
    fn drop(&mut self) {
        if let Mode::Worker { tx, handle } = &self.mode {
            let _ = tx.send(Msg::Stop);
            if let Some(handle) = handle.lock().take() {
                let _ = handle.join();
            }
        }
    }
}

fn run_contained(job: Job) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
        error!(
            target: "lumen.scheduler",
            panic = panic_message(payload.as_ref()),
            "background job panicked"
        );
    }
}
