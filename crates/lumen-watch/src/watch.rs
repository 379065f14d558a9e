//! Watcher backends and the abstraction the monitor consumes.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use crossbeam_channel as channel;

/// An event produced by a file watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// Paths touched on disk. Backends may batch several changes together.
    Changed { paths: Vec<PathBuf> },
    /// The backend dropped events; consumers should re-check every watched
    /// path instead of trusting the stream.
    Rescan,
}

/// Whether a directory watch covers descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchMode {
    Recursive,
    NonRecursive,
}

/// Message type delivered by a [`FileWatcher`]. Backends surface
/// asynchronous errors through the same stream.
pub type WatchMessage = io::Result<WatchEvent>;

/// Event-driven watcher abstraction.
///
/// Events are hints: consumers consult the filesystem for the authoritative
/// state, and backends are free to coalesce.
pub trait FileWatcher: Send {
    /// Begin watching `path`. File paths are treated as non-recursive.
    fn watch_path(&mut self, path: &Path, mode: WatchMode) -> io::Result<()>;

    /// Stop watching `path`.
    fn unwatch_path(&mut self, path: &Path) -> io::Result<()>;

    /// Receiver used to consume watcher events.
    fn receiver(&self) -> &channel::Receiver<WatchMessage>;

    /// Drains pending events without blocking.
    fn poll(&mut self) -> io::Result<Vec<WatchEvent>> {
        let mut out = Vec::new();
        for msg in self.receiver().try_iter() {
            match msg {
                Ok(event) => out.push(event),
                Err(err) => return Err(err),
            }
        }
        Ok(out)
    }
}

const MANUAL_WATCH_QUEUE_CAPACITY: usize = 1024;

/// Deterministic watcher for tests. Never touches the OS; callers inject
/// events through [`ManualFileWatcher::push`] or a [`ManualFileWatcherHandle`].
///
/// Delivery uses a bounded queue; injection is non-blocking and reports
/// [`io::ErrorKind::WouldBlock`] when the queue is full.
#[derive(Debug)]
pub struct ManualFileWatcher {
    tx: channel::Sender<WatchMessage>,
    rx: channel::Receiver<WatchMessage>,
    watch_calls: Vec<(PathBuf, WatchMode)>,
    unwatch_calls: Vec<PathBuf>,
    watched: BTreeSet<PathBuf>,
}

/// Cloneable handle for injecting events after the watcher has been moved
/// into a monitor or another thread.
#[derive(Debug, Clone)]
pub struct ManualFileWatcherHandle {
    tx: channel::Sender<WatchMessage>,
}

impl ManualFileWatcherHandle {
    /// Injects a synthetic watcher event.
    pub fn push(&self, event: WatchEvent) -> io::Result<()> {
        self.send(Ok(event))
    }

    /// Injects an asynchronous watcher error.
    pub fn push_error(&self, error: io::Error) -> io::Result<()> {
        self.send(Err(error))
    }

    fn send(&self, message: WatchMessage) -> io::Result<()> {
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(channel::TrySendError::Full(_)) => Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "watch queue is full",
            )),
            Err(channel::TrySendError::Disconnected(_)) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "watch receiver dropped",
            )),
        }
    }
}

impl Default for ManualFileWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualFileWatcher {
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(MANUAL_WATCH_QUEUE_CAPACITY);
        Self {
            tx,
            rx,
            watch_calls: Vec::new(),
            unwatch_calls: Vec::new(),
            watched: BTreeSet::new(),
        }
    }

    /// Handle that keeps working after the watcher has been moved away.
    pub fn handle(&self) -> ManualFileWatcherHandle {
        ManualFileWatcherHandle {
            tx: self.tx.clone(),
        }
    }

    /// Injects a synthetic watcher event.
    pub fn push(&self, event: WatchEvent) -> io::Result<()> {
        self.handle().push(event)
    }

    /// Injects an asynchronous watcher error.
    pub fn push_error(&self, error: io::Error) -> io::Result<()> {
        self.handle().push_error(error)
    }

    /// Paths passed to [`FileWatcher::watch_path`], in call order.
    pub fn watch_calls(&self) -> &[(PathBuf, WatchMode)] {
        &self.watch_calls
    }

    /// Paths passed to [`FileWatcher::unwatch_path`], in call order.
    pub fn unwatch_calls(&self) -> &[PathBuf] {
        &self.unwatch_calls
    }

    /// Currently watched paths, sorted.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched.iter().cloned().collect()
    }
}

impl FileWatcher for ManualFileWatcher {
    fn watch_path(&mut self, path: &Path, mode: WatchMode) -> io::Result<()> {
        let path = path.to_path_buf();
        self.watch_calls.push((path.clone(), mode));
        self.watched.insert(path);
        Ok(())
    }

    fn unwatch_path(&mut self, path: &Path) -> io::Result<()> {
        let path = path.to_path_buf();
        self.unwatch_calls.push(path.clone());
        self.watched.remove(&path);
        Ok(())
    }

    fn receiver(&self) -> &channel::Receiver<WatchMessage> {
        &self.rx
    }
}

#[cfg(feature = "watch-notify")]
mod notify_impl {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use notify::{RecursiveMode, Watcher};

    const RAW_QUEUE_CAPACITY: usize = 4096;
    const EVENTS_QUEUE_CAPACITY: usize = 1024;
    const OVERFLOW_RETRY_INTERVAL: Duration = Duration::from_millis(50);

    fn notify_error_to_io(err: notify::Error) -> io::Error {
        io::Error::other(err)
    }

    fn requests_rescan(event: &notify::Event) -> bool {
        // `notify` marks dropped or coalesced events with a rescan flag; some
        // backends also emit a path-less `Other` event.
        matches!(event.attrs.flag(), Some(notify::event::Flag::Rescan))
            || (matches!(event.kind, notify::EventKind::Other) && event.paths.is_empty())
    }

    /// OS watcher backed by `notify`.
    ///
    /// Raw backend events flow through a bounded queue into a drain thread
    /// that batches them into [`WatchEvent::Changed`]. Overflow on either
    /// queue degrades to a single [`WatchEvent::Rescan`] once there is room
    /// again, so consumers never miss changes silently.
    pub struct NotifyFileWatcher {
        watcher: notify::RecommendedWatcher,
        events_rx: channel::Receiver<WatchMessage>,
        stop_tx: channel::Sender<()>,
        thread: Option<std::thread::JoinHandle<()>>,
    }

    impl NotifyFileWatcher {
        pub fn new() -> io::Result<Self> {
            let (raw_tx, raw_rx) = channel::bounded(RAW_QUEUE_CAPACITY);
            let (events_tx, events_rx) = channel::bounded(EVENTS_QUEUE_CAPACITY);
            let (stop_tx, stop_rx) = channel::bounded(1);
            let overflowed = Arc::new(AtomicBool::new(false));

            let callback_overflowed = Arc::clone(&overflowed);
            let watcher = notify::recommended_watcher(
                move |res: notify::Result<notify::Event>| match raw_tx.try_send(res) {
                    Ok(()) => {}
                    Err(channel::TrySendError::Full(_)) => {
                        callback_overflowed.store(true, Ordering::Release);
                    }
                    Err(channel::TrySendError::Disconnected(_)) => {}
                },
            )
            .map_err(notify_error_to_io)?;

            let thread = std::thread::Builder::new()
                .name("lumen-watch".to_string())
                .spawn(move || drain_loop(raw_rx, events_tx, stop_rx, overflowed))?;

            Ok(Self {
                watcher,
                events_rx,
                stop_tx,
                thread: Some(thread),
            })
        }
    }

    fn drain_loop(
        raw_rx: channel::Receiver<notify::Result<notify::Event>>,
        events_tx: channel::Sender<WatchMessage>,
        stop_rx: channel::Receiver<()>,
        overflowed: Arc<AtomicBool>,
    ) {
        loop {
            if overflowed.load(Ordering::Acquire) {
                // Anything still queued predates the overflow and may be
                // incomplete; a rescan supersedes it.
                while raw_rx.try_recv().is_ok() {}
                match events_tx.try_send(Ok(WatchEvent::Rescan)) {
                    Ok(()) => overflowed.store(false, Ordering::Release),
                    Err(channel::TrySendError::Full(_)) => {}
                    Err(channel::TrySendError::Disconnected(_)) => break,
                }
            }

            let retry = if overflowed.load(Ordering::Acquire) {
                channel::after(OVERFLOW_RETRY_INTERVAL)
            } else {
                channel::never()
            };

            channel::select! {
                recv(stop_rx) -> _ => break,
                recv(raw_rx) -> msg => {
                    let Ok(res) = msg else { break };
                    match res {
                        Ok(event) => {
                            if requests_rescan(&event) {
                                overflowed.store(true, Ordering::Release);
                                continue;
                            }
                            if event.paths.is_empty() {
                                continue;
                            }
                            match events_tx.try_send(Ok(WatchEvent::Changed { paths: event.paths })) {
                                Ok(()) => {}
                                Err(channel::TrySendError::Full(_)) => {
                                    overflowed.store(true, Ordering::Release);
                                }
                                Err(channel::TrySendError::Disconnected(_)) => break,
                            }
                        }
                        Err(err) => {
                            // Backends use errors to signal lost events too;
                            // forward the error and force a rescan.
                            overflowed.store(true, Ordering::Release);
                            match events_tx.try_send(Err(notify_error_to_io(err))) {
                                Ok(()) | Err(channel::TrySendError::Full(_)) => {}
                                Err(channel::TrySendError::Disconnected(_)) => break,
                            }
                        }
                    }
                }
                recv(retry) -> _ => {}
            }
        }
    }

    impl FileWatcher for NotifyFileWatcher {
        fn watch_path(&mut self, path: &Path, mode: WatchMode) -> io::Result<()> {
            let recursive = match mode {
                WatchMode::Recursive if path.is_dir() => RecursiveMode::Recursive,
                _ => RecursiveMode::NonRecursive,
            };
            self.watcher
                .watch(path, recursive)
                .map_err(notify_error_to_io)
        }

        fn unwatch_path(&mut self, path: &Path) -> io::Result<()> {
            self.watcher.unwatch(path).map_err(notify_error_to_io)
        }

        fn receiver(&self) -> &channel::Receiver<WatchMessage> {
            &self.events_rx
        }
    }

    impl Drop for NotifyFileWatcher {
        fn drop(&mut self) {
            let _ = self.stop_tx.send(());
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        }
    }
}

#[cfg(feature = "watch-notify")]
pub use notify_impl::NotifyFileWatcher;
