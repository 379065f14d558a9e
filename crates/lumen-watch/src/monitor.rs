//! Connects watcher events to debounced background re-syncs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel as channel;
use lumen_descriptor::is_descriptor_file;
use lumen_scheduler::{BackgroundQueue, KeyedDebouncer};
use lumen_sync::{RegistryEvent, SyncEngine};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::watch::{FileWatcher, WatchEvent, WatchMessage, WatchMode};

/// Tunables for [`DescriptorMonitor`].
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Quiet period between the last observed descriptor change and the
    /// re-sync it triggers.
    pub debounce: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
        }
    }
}

type SharedWatcher = Arc<Mutex<Box<dyn FileWatcher>>>;

/// Watches tracked descriptor files and schedules re-syncs when they change.
///
/// Registry membership drives the watch set: tracking a project watches its
/// descriptor's directory, untracking unwatches it and cancels any pending
/// re-sync. Changes are debounced per descriptor and the sync itself runs on
/// the shared background queue, so watcher-triggered and caller-triggered
/// syncs never interleave.
pub struct DescriptorMonitor {
    engine: Arc<SyncEngine>,
    queue: Arc<BackgroundQueue>,
    debouncer: Arc<KeyedDebouncer<PathBuf>>,
    watcher: SharedWatcher,
    stop_tx: channel::Sender<()>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl DescriptorMonitor {
    /// Starts monitoring with `watcher` as the event source.
    ///
    /// Projects already tracked at construction time are watched
    /// immediately; later membership changes are picked up through a
    /// registry listener.
    pub fn new(
        engine: Arc<SyncEngine>,
        queue: Arc<BackgroundQueue>,
        watcher: impl FileWatcher + 'static,
        config: MonitorConfig,
    ) -> Self {
        let events_rx = watcher.receiver().clone();
        let watcher: SharedWatcher = Arc::new(Mutex::new(Box::new(watcher)));
        let debouncer = Arc::new(KeyedDebouncer::new("lumen-monitor", config.debounce));
        let (stop_tx, stop_rx) = channel::bounded(1);

        for project in engine.registry().all() {
            watch_descriptor(&watcher, project.descriptor_path());
        }

        let listener_watcher = Arc::downgrade(&watcher);
        let listener_debouncer = Arc::downgrade(&debouncer);
        engine.registry().add_listener(move |event| {
            let (Some(watcher), Some(debouncer)) =
                (listener_watcher.upgrade(), listener_debouncer.upgrade())
            else {
                return;
            };
            match event {
                RegistryEvent::Added(path) => watch_descriptor(&watcher, path),
                RegistryEvent::Removed(path) => {
                    unwatch_descriptor(&watcher, path);
                    debouncer.cancel(path.clone());
                }
            }
        });

        let thread_engine = Arc::clone(&engine);
        let thread_queue = Arc::clone(&queue);
        let thread_debouncer = Arc::clone(&debouncer);
        let thread = std::thread::Builder::new()
            .name("lumen-monitor".to_string())
            .spawn(move || {
                drain_loop(
                    events_rx,
                    stop_rx,
                    thread_engine,
                    thread_queue,
                    thread_debouncer,
                )
            });
        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(
                    target: "lumen.watch",
                    error = %err,
                    "failed to spawn monitor thread; descriptor changes will not be observed"
                );
                None
            }
        };

        Self {
            engine,
            queue,
            debouncer,
            watcher,
            stop_tx,
            thread,
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Blocks until every pending debounce and every queued sync has run.
    pub fn flush(&self) {
        self.debouncer.flush();
        self.queue.flush();
    }
}

impl Drop for DescriptorMonitor {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        // Release the OS watches symmetrically with construction.
        for project in self.engine.registry().all() {
            unwatch_descriptor(&self.watcher, project.descriptor_path());
        }
    }
}

impl std::fmt::Debug for DescriptorMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorMonitor")
            .field("running", &self.thread.is_some())
            .finish_non_exhaustive()
    }
}

/// Watches the descriptor's directory rather than the file: editors often
/// replace files wholesale, which would drop a watch on the file itself.
fn watch_descriptor(watcher: &SharedWatcher, descriptor: &Path) {
    let Some(dir) = descriptor.parent() else {
        return;
    };
    match watcher.lock().watch_path(dir, WatchMode::NonRecursive) {
        Ok(()) => {
            debug!(
                target: "lumen.watch",
                dir = %dir.display(),
                "watching descriptor directory"
            );
        }
        Err(err) => {
            warn!(
                target: "lumen.watch",
                dir = %dir.display(),
                error = %err,
                "failed to watch descriptor directory"
            );
        }
    }
}

fn unwatch_descriptor(watcher: &SharedWatcher, descriptor: &Path) {
    let Some(dir) = descriptor.parent() else {
        return;
    };
    if let Err(err) = watcher.lock().unwatch_path(dir) {
        warn!(
            target: "lumen.watch",
            dir = %dir.display(),
            error = %err,
            "failed to unwatch descriptor directory"
        );
    }
}

fn drain_loop(
    events_rx: channel::Receiver<WatchMessage>,
    stop_rx: channel::Receiver<()>,
    engine: Arc<SyncEngine>,
    queue: Arc<BackgroundQueue>,
    debouncer: Arc<KeyedDebouncer<PathBuf>>,
) {
    loop {
        channel::select! {
            recv(stop_rx) -> _ => break,
            recv(events_rx) -> msg => {
                let Ok(message) = msg else { break };
                match message {
                    Ok(WatchEvent::Changed { paths }) => {
                        for path in paths {
                            handle_change(&engine, &queue, &debouncer, path);
                        }
                    }
                    Ok(WatchEvent::Rescan) => {
                        trace!(target: "lumen.watch", "watcher requested a rescan");
                        for project in engine.registry().all() {
                            schedule_sync(
                                &engine,
                                &queue,
                                &debouncer,
                                project.descriptor_path().to_path_buf(),
                            );
                        }
                    }
                    Err(err) => {
                        warn!(target: "lumen.watch", error = %err, "watcher error");
                    }
                }
            }
        }
    }
}

fn handle_change(
    engine: &Arc<SyncEngine>,
    queue: &Arc<BackgroundQueue>,
    debouncer: &Arc<KeyedDebouncer<PathBuf>>,
    path: PathBuf,
) {
    if !is_descriptor_file(&path) {
        return;
    }
    if !engine.registry().contains(&path) {
        trace!(
            target: "lumen.watch",
            path = %path.display(),
            "ignoring change to untracked descriptor"
        );
        return;
    }
    schedule_sync(engine, queue, debouncer, path);
}

fn schedule_sync(
    engine: &Arc<SyncEngine>,
    queue: &Arc<BackgroundQueue>,
    debouncer: &Arc<KeyedDebouncer<PathBuf>>,
    path: PathBuf,
) {
    trace!(
        target: "lumen.watch",
        descriptor = %path.display(),
        "descriptor changed, debouncing re-sync"
    );
    let engine = Arc::clone(engine);
    let queue = Arc::clone(queue);
    let job_path = path.clone();
    debouncer.debounce(path, move || {
        queue.push(move || {
            // Failures are logged and recorded in the registry by the engine.
            let _ = engine.sync(&job_path);
        });
    });
}
