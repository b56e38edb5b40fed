//! Controller module for namespace finalization
//!
//! This module contains the supervisor loop, the watch sessions, the
//! finalizer state machine and the worker pool that runs cleanup.

mod dispatcher;
pub mod finalizers;
mod keyed_queue;
pub mod metrics;
mod reconciler;
mod supervisor;
#[cfg(test)]
mod testing;
mod watcher;

pub use dispatcher::{Dispatcher, DEFAULT_WORKERS};
pub use finalizers::{FinalizerAction, FinalizerMarker, FinalizerState, DEFAULT_FINALIZER};
pub use reconciler::{handle_event, ControllerState};
pub use supervisor::{SessionEnd, Supervisor, DEFAULT_RETRY_DELAY, EMPTY_SESSION_PAUSE};
pub use watcher::{session, ExcludedResources, SYSTEM_NAMESPACES};
