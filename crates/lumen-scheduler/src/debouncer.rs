use crate::panic_message;
use crossbeam_channel::{after, never, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Cmd<K> {
    Submit {
        key: K,
        deadline: Instant,
        job: Job,
    },
    Cancel(K),
    Flush(Sender<()>),
    Stop,
}

/// Collapses repeated triggers for the same key into one delayed job.
///
/// Re-submitting a key before its deadline replaces the pending job and
/// restarts the delay, so only the latest submission fires. Jobs run on the
/// debouncer's own thread; keep them small (typically: push real work onto a
/// [`crate::BackgroundQueue`]).
pub struct KeyedDebouncer<K: Send + 'static> {
    default_delay: Duration,
    tx: Sender<Cmd<K>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    /// Set when the timing thread could not be spawned; jobs then run
    /// immediately on the submitting thread.
    immediate: bool,
}

impl<K: Send + 'static> std::fmt::Debug for KeyedDebouncer<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedDebouncer")
            .field("default_delay", &self.default_delay)
            .field("immediate", &self.immediate)
            .finish()
    }
}

impl<K> KeyedDebouncer<K>
where
    K: Eq + Hash + Debug + Send + 'static,
{
    pub fn new(name: &str, default_delay: Duration) -> Self {
        let (tx, rx) = unbounded::<Cmd<K>>();
        let spawn = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(rx));

        match spawn {
            Ok(handle) => Self {
                default_delay,
                tx,
                handle: Mutex::new(Some(handle)),
                immediate: false,
            },
            Err(err) => {
                warn!(
                    target: "lumen.scheduler",
                    error = %err,
                    "failed to spawn debouncer thread; firing jobs immediately"
                );
                Self {
                    default_delay,
                    tx,
                    handle: Mutex::new(None),
                    immediate: true,
                }
            }
        }
    }

    /// Schedules `job` for `key` after the default delay, superseding any
    /// pending job for the same key.
    pub fn debounce(&self, key: K, job: impl FnOnce() + Send + 'static) {
        self.debounce_with_delay(key, self.default_delay, job);
    }

    pub fn debounce_with_delay(&self, key: K, delay: Duration, job: impl FnOnce() + Send + 'static) {
        if self.immediate {
            run_contained(&key, Box::new(job));
            return;
        }
        let cmd = Cmd::Submit {
            key,
            deadline: Instant::now() + delay,
            job: Box::new(job),
        };
        if self.tx.send(cmd).is_err() {
            warn!(target: "lumen.scheduler", "debouncer thread is gone; dropping job");
        }
    }

    /// Discards any pending job for `key`.
    pub fn cancel(&self, key: K) {
        let _ = self.tx.send(Cmd::Cancel(key));
    }

    /// Fires every pending job now, regardless of deadline, and waits for
    /// them to finish. Test hook.
    pub fn flush(&self) {
        if self.immediate {
            return;
        }
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if self.tx.send(Cmd::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl<K: Send + 'static> Drop for KeyedDebouncer<K> {
    fn drop(&mut self) {
        let _ = self.tx.send(Cmd::Stop);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

struct Pending {
    deadline: Instant,
    job: Option<Job>,
}

fn worker_loop<K: Eq + Hash + Debug>(rx: Receiver<Cmd<K>>) {
    let mut pending: HashMap<K, Pending> = HashMap::new();
    loop {
        let timer = match pending.values().map(|p| p.deadline).min() {
            Some(deadline) => after(deadline.saturating_duration_since(Instant::now())),
            None => never(),
        };

        crossbeam_channel::select! {
            recv(rx) -> msg => match msg {
                Ok(Cmd::Submit { key, deadline, job }) => {
                    let superseded = pending
                        .insert(key, Pending { deadline, job: Some(job) })
                        .is_some();
                    if superseded {
                        trace!(target: "lumen.scheduler", "superseded pending debounce job");
                    }
                }
                Ok(Cmd::Cancel(key)) => {
                    if pending.remove(&key).is_some() {
                        trace!(target: "lumen.scheduler", key = ?key, "cancelled pending debounce job");
                    }
                }
                Ok(Cmd::Flush(ack)) => {
                    fire(&mut pending, None);
                    let _ = ack.send(());
                }
                Ok(Cmd::Stop) | Err(_) => break,
            },
            recv(timer) -> _ => {
                fire(&mut pending, Some(Instant::now()));
            }
        }
    }
    if !pending.is_empty() {
        debug!(
            target: "lumen.scheduler",
            dropped = pending.len(),
            "debouncer stopped with pending jobs"
        );
    }
}

/// Runs pending jobs whose deadline has passed `now`; `None` fires all.
fn fire<K: Eq + Hash + Debug>(pending: &mut HashMap<K, Pending>, now: Option<Instant>) {
    pending.retain(|key, entry| {
        let due = now.map_or(true, |now| entry.deadline <= now);
        if !due {
            return true;
        }
        if let Some(job) = entry.job.take() {
            run_contained(key, job);
        }
        false
    });
}

fn run_contained<K: Debug>(key: &K, job: Job) {
    trace!(target: "lumen.scheduler", key = ?key, "firing debounced job");
    if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
        error!(
            target: "lumen.scheduler",
            key = ?key,
            panic = panic_message(payload.as_ref()),
            "debounced job panicked"
        );
    }
}
