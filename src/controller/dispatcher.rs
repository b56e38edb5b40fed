//! Reconciliation dispatcher
//!
//! A fixed number of worker permits bounds how many events are evaluated at
//! once; everything beyond that waits in an unbounded queue. Dispatching never
//! blocks the stream reader.
//!
//! Events are keyed by resource name. One drain task owns a key at a time,
//! so two events for the same resource are never evaluated concurrently, and
//! an event that arrives while its resource is busy replaces any older
//! pending one.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::resource::WatchEvent;

use super::keyed_queue::{KeyedQueue, Push};
use super::reconciler::{handle_event, ControllerState};

/// Worker count when none is configured
pub const DEFAULT_WORKERS: usize = 3;

#[derive(Clone)]
pub struct Dispatcher {
    ctx: Arc<ControllerState>,
    permits: Arc<Semaphore>,
    queue: Arc<KeyedQueue<WatchEvent>>,
    tracker: TaskTracker,
    workers: usize,
}

impl Dispatcher {
    pub fn new(ctx: Arc<ControllerState>, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            ctx,
            permits: Arc::new(Semaphore::new(workers)),
            queue: Arc::new(KeyedQueue::default()),
            tracker: TaskTracker::new(),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Hand an event over for asynchronous evaluation
    pub fn dispatch(&self, event: WatchEvent) {
        let key = event.name().to_string();
        match self.queue.push(&key, event) {
            Push::Owner => {
                let ctx = self.ctx.clone();
                let permits = self.permits.clone();
                let queue = self.queue.clone();
                self.tracker
                    .spawn(async move { drain_key(ctx, permits, queue, key).await });
            }
            Push::Queued => debug!("{} is busy, event queued", key),
            Push::Replaced => debug!("{} is busy, superseded a pending event", key),
        }
    }

    /// Resources with work queued or in progress
    pub fn in_flight(&self) -> usize {
        self.queue.active()
    }

    /// Wait until every dispatched event has been evaluated
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

async fn drain_key(
    ctx: Arc<ControllerState>,
    permits: Arc<Semaphore>,
    queue: Arc<KeyedQueue<WatchEvent>>,
    key: String,
) {
    while let Some(event) = queue.next(&key) {
        let permit = match permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                warn!("Worker pool closed, dropping event for {}: {}", key, e);
                while queue.next(&key).is_some() {}
                return;
            }
        };
        // a panicking capability must not leave the key owned forever
        let outcome = AssertUnwindSafe(handle_event(&ctx, event))
            .catch_unwind()
            .await;
        drop(permit);
        if let Err(panic) = outcome {
            error!(
                "Evaluation of {} panicked, leaving it for its next event: {}",
                key,
                panic_message(panic.as_ref())
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
