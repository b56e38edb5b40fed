//! Resume/retry supervisor
//!
//! Runs watch sessions forever. A failed session is followed by a fixed
//! delay and a credential refresh before the next one starts; there is no
//! backoff growth and no retry limit. The dispatcher and its workers outlive
//! every session.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::resource::ResourceApi;

use super::dispatcher::Dispatcher;
use super::metrics;
use super::reconciler::ControllerState;
use super::watcher::{self, ExcludedResources};

/// Delay between a stream failure and the next session
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Pause before relisting after a session that closed without any event
pub const EMPTY_SESSION_PAUSE: Duration = Duration::from_secs(1);

/// How a watch session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// The server closed the stream after `events` events
    Closed { events: usize },
    /// Reading the stream failed
    Failed(Error),
}

pub struct Supervisor {
    api: Arc<dyn ResourceApi>,
    dispatcher: Dispatcher,
    excluded: Arc<ExcludedResources>,
    retry_delay: Duration,
}

impl Supervisor {
    pub fn new(
        ctx: Arc<ControllerState>,
        workers: usize,
        excluded: ExcludedResources,
        retry_delay: Duration,
    ) -> Self {
        Self {
            api: ctx.api.clone(),
            dispatcher: Dispatcher::new(ctx, workers),
            excluded: Arc::new(excluded),
            retry_delay,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Watch, dispatch and recover until the task is dropped
    pub async fn run(&self) {
        info!(
            "Listening to stream ({} workers, retry delay {:?})",
            self.dispatcher.workers(),
            self.retry_delay
        );

        loop {
            match self.run_session().await {
                SessionEnd::Closed { events: 0 } => {
                    debug!(
                        "Watch stream closed without events, relisting in {:?}",
                        EMPTY_SESSION_PAUSE
                    );
                    tokio::time::sleep(EMPTY_SESSION_PAUSE).await;
                }
                SessionEnd::Closed { events } => {
                    debug!("Watch stream closed by the server after {} events, relisting", events);
                }
                SessionEnd::Failed(e) => {
                    error!("{}", e);
                    metrics::record_stream_restart();
                    tokio::time::sleep(self.retry_delay).await;
                    info!("Retry listening to stream");
                    // Tokens may have rotated while disconnected
                    if let Err(e) = self.api.refresh_credentials().await {
                        warn!("Credential refresh failed, retrying with the current client: {}", e);
                    }
                }
            }
        }
    }

    /// Read one session to its end, dispatching every event in order
    pub async fn run_session(&self) -> SessionEnd {
        let mut events = watcher::session(self.api.as_ref(), self.excluded.clone()).await;
        let mut seen = 0;

        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    seen += 1;
                    self.dispatcher.dispatch(event);
                }
                Err(e) => return SessionEnd::Failed(e),
            }
        }
        SessionEnd::Closed { events: seen }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::finalizers::{FinalizerMarker, DEFAULT_FINALIZER};
    use crate::controller::testing::{eventually, FakeApi, RecordingReconciler};
    use crate::reconcilers::ReconcilerRegistry;

    fn supervisor(api: Arc<FakeApi>, registry: ReconcilerRegistry) -> Arc<Supervisor> {
        let ctx = Arc::new(ControllerState::new(
            api,
            FinalizerMarker::default(),
            registry,
        ));
        Arc::new(Supervisor::new(
            ctx,
            3,
            ExcludedResources::default(),
            DEFAULT_RETRY_DELAY,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_session_retries_after_fixed_delay() {
        let api = Arc::new(FakeApi::new());
        api.fail_next_sessions(2);
        api.create("team-a");
        let supervisor = supervisor(api.clone(), ReconcilerRegistry::default());

        let started = tokio::time::Instant::now();
        let task = tokio::spawn({
            let supervisor = supervisor.clone();
            async move { supervisor.run().await }
        });

        eventually(Duration::from_secs(30), || api.sessions() == 3).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= DEFAULT_RETRY_DELAY * 2, "resumed too early: {:?}", elapsed);
        assert!(elapsed < DEFAULT_RETRY_DELAY * 2 + Duration::from_secs(1));
        assert_eq!(api.refreshes(), 2);

        eventually(Duration::from_secs(5), || {
            api.get("team-a")
                .map(|r| r.has_finalizer(DEFAULT_FINALIZER))
                .unwrap_or(false)
        })
        .await;
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_changes_while_disconnected_are_picked_up_on_relist() {
        let api = Arc::new(FakeApi::new());
        let journal = api.journal();
        api.create("team-a");
        let registry = ReconcilerRegistry::builder()
            .register("cleanup", RecordingReconciler::new("cleanup", journal.clone()))
            .unwrap()
            .build();
        let supervisor = supervisor(api.clone(), registry);
        let task = tokio::spawn({
            let supervisor = supervisor.clone();
            async move { supervisor.run().await }
        });

        eventually(Duration::from_secs(5), || {
            api.get("team-a")
                .map(|r| r.has_finalizer(DEFAULT_FINALIZER))
                .unwrap_or(false)
        })
        .await;

        api.fail_streams("connection reset by peer");
        // nobody is watching while this happens
        api.request_deletion("team-a");
        assert_eq!(journal.count("reconcile:"), 0);

        eventually(Duration::from_secs(30), || api.get("team-a").is_none()).await;
        assert_eq!(api.sessions(), 2);
        assert_eq!(api.refreshes(), 1);
        assert_eq!(
            journal.entries().iter().filter(|e| !e.starts_with("add:")).collect::<Vec<_>>(),
            vec!["reconcile:cleanup:team-a", "remove:team-a"]
        );
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_closed_sessions_do_not_spin() {
        let api = Arc::new(FakeApi::new());
        api.close_next_sessions(3);
        api.create("team-a");
        let supervisor = supervisor(api.clone(), ReconcilerRegistry::default());

        let started = tokio::time::Instant::now();
        let task = tokio::spawn({
            let supervisor = supervisor.clone();
            async move { supervisor.run().await }
        });

        eventually(Duration::from_secs(30), || api.sessions() == 4).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= EMPTY_SESSION_PAUSE * 3, "relisted too fast: {:?}", elapsed);
        assert!(elapsed < DEFAULT_RETRY_DELAY);
        assert_eq!(api.refreshes(), 0);

        eventually(Duration::from_secs(5), || {
            api.get("team-a")
                .map(|r| r.has_finalizer(DEFAULT_FINALIZER))
                .unwrap_or(false)
        })
        .await;
        task.abort();
    }

    #[tokio::test]
    async fn test_session_counts_delivered_events() {
        let api = Arc::new(FakeApi::new());
        api.create("team-a");
        api.create("kube-system");
        let supervisor = supervisor(api.clone(), ReconcilerRegistry::default());

        let session = tokio::spawn({
            let supervisor = supervisor.clone();
            async move { supervisor.run_session().await }
        });
        eventually(Duration::from_secs(5), || api.sessions() == 1).await;
        api.close_streams();

        match session.await.unwrap() {
            SessionEnd::Closed { events } => assert_eq!(events, 1),
            other => panic!("unexpected session end: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_session_reports_stream_failure() {
        let api = Arc::new(FakeApi::new());
        let supervisor = supervisor(api.clone(), ReconcilerRegistry::default());

        let session = tokio::spawn({
            let supervisor = supervisor.clone();
            async move { supervisor.run_session().await }
        });
        eventually(Duration::from_secs(5), || api.sessions() == 1).await;
        api.fail_streams("gone");

        match session.await.unwrap() {
            SessionEnd::Failed(Error::StreamFailure(reason)) => assert_eq!(reason, "gone"),
            other => panic!("unexpected session end: {:?}", other),
        }
    }
}
