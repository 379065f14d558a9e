//! Background execution for the sync engine.
//!
//! Two small primitives, both thread-based and runtime-free:
//!
//! - [`BackgroundQueue`]: a single named worker thread executing jobs in
//!   submission order. All syncs in a session go through one queue, which is
//!   what serializes commits against the shared library table. An inline mode
//!   runs jobs on the caller's thread for tests and headless embedding.
//! - [`KeyedDebouncer`]: collapses bursts of triggers for the same key into
//!   one job, fired after a quiet period. Used to coalesce file-watcher
//!   events per descriptor.

mod debouncer;
mod queue;

pub use debouncer::KeyedDebouncer;
pub use queue::{BackgroundQueue, QueueConfig};

use std::any::Any;

/// Renders a panic payload for logging.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}
