//! File watching for tracked build descriptors.
//!
//! [`FileWatcher`] is the backend-neutral watcher abstraction; the OS-backed
//! [`NotifyFileWatcher`] implementation lives behind the `watch-notify`
//! feature so platform watcher dependencies stay out of default builds, and
//! [`ManualFileWatcher`] provides a deterministic in-memory backend for
//! tests. [`DescriptorMonitor`] ties a watcher to the sync engine: registry
//! membership drives the watch set, and observed descriptor changes turn
//! into debounced background re-syncs.

mod monitor;
mod watch;

pub use monitor::{DescriptorMonitor, MonitorConfig};
pub use watch::{
    FileWatcher, ManualFileWatcher, ManualFileWatcherHandle, WatchEvent, WatchMessage, WatchMode,
};

#[cfg(feature = "watch-notify")]
pub use watch::NotifyFileWatcher;
