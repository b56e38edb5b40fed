//! In-memory orchestrator for controller tests
//!
//! Behaves like the API server where it matters: resourceVersion
//! preconditions, no new finalizers on terminating objects, physical deletion
//! once the last finalizer is gone, and watch fan-out to open sessions.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::{Error, Result};
use crate::reconcilers::Reconciler;
use crate::resource::{with_marker, ResourceApi, ResourceSnapshot, WatchEvent};

/// Ordered record of side effects shared by the fake API and fake capabilities
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

type Subscriber = UnboundedSender<Result<WatchEvent>>;

#[derive(Default)]
struct Cluster {
    objects: BTreeMap<String, ResourceSnapshot>,
    version: u64,
    subscribers: Vec<Subscriber>,
    sessions: usize,
    refreshes: usize,
    failing_sessions: usize,
    closing_sessions: usize,
}

impl Cluster {
    fn bump(&mut self, name: &str) {
        self.version += 1;
        let version = self.version.to_string();
        if let Some(obj) = self.objects.get_mut(name) {
            obj.resource_version = Some(version);
        }
    }

    fn broadcast(&mut self, event: WatchEvent) {
        self.subscribers
            .retain(|tx| tx.unbounded_send(Ok(event.clone())).is_ok());
    }

    fn modified(&mut self, name: &str) {
        if let Some(obj) = self.objects.get(name).cloned() {
            self.broadcast(WatchEvent::modified(obj));
        }
    }

    /// Physically delete a terminating object once nothing holds it
    fn collect(&mut self, name: &str) -> bool {
        let releasable = self
            .objects
            .get(name)
            .map(|obj| obj.deletion_requested() && obj.finalizers.is_empty())
            .unwrap_or(false);
        if releasable {
            if let Some(obj) = self.objects.remove(name) {
                self.broadcast(WatchEvent::deleted(obj));
            }
        }
        releasable
    }
}

#[derive(Default)]
pub struct FakeApi {
    cluster: Mutex<Cluster>,
    journal: Journal,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn cluster(&self) -> MutexGuard<'_, Cluster> {
        self.cluster.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    pub fn create(&self, name: &str) {
        self.insert(ResourceSnapshot::new(name));
    }

    pub fn create_with_finalizer(&self, name: &str, finalizer: &str) {
        let mut obj = ResourceSnapshot::new(name);
        obj.finalizers.push(finalizer.to_string());
        self.insert(obj);
    }

    fn insert(&self, obj: ResourceSnapshot) {
        let mut cluster = self.cluster();
        let name = obj.name.clone();
        cluster.objects.insert(name.clone(), obj);
        cluster.bump(&name);
        if let Some(obj) = cluster.objects.get(&name).cloned() {
            cluster.broadcast(WatchEvent::added(obj));
        }
    }

    /// What a user's delete call does: set the timestamp, delete if unguarded
    pub fn request_deletion(&self, name: &str) {
        let mut cluster = self.cluster();
        let Some(obj) = cluster.objects.get_mut(name) else {
            return;
        };
        if obj.deletion_requested_at.is_none() {
            obj.deletion_requested_at = Some(Utc::now());
        }
        cluster.bump(name);
        if !cluster.collect(name) {
            cluster.modified(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<ResourceSnapshot> {
        self.cluster().objects.get(name).cloned()
    }

    /// Break every open watch session
    pub fn fail_streams(&self, reason: &str) {
        let mut cluster = self.cluster();
        for tx in cluster.subscribers.drain(..) {
            let _ = tx.unbounded_send(Err(Error::StreamFailure(reason.to_string())));
        }
    }

    /// End every open watch session cleanly
    pub fn close_streams(&self) {
        self.cluster().subscribers.clear();
    }

    /// Make the next `count` sessions close immediately without listing
    pub fn close_next_sessions(&self, count: usize) {
        self.cluster().closing_sessions = count;
    }

    /// Make the next `count` sessions fail before listing anything
    pub fn fail_next_sessions(&self, count: usize) {
        self.cluster().failing_sessions = count;
    }

    pub fn sessions(&self) -> usize {
        self.cluster().sessions
    }

    pub fn refreshes(&self) -> usize {
        self.cluster().refreshes
    }
}

#[async_trait]
impl ResourceApi for FakeApi {
    async fn watch(&self) -> BoxStream<'static, Result<WatchEvent>> {
        let mut cluster = self.cluster();
        cluster.sessions += 1;

        if cluster.failing_sessions > 0 {
            cluster.failing_sessions -= 1;
            return stream::once(async {
                Err(Error::StreamFailure("connection refused".to_string()))
            })
            .boxed();
        }

        if cluster.closing_sessions > 0 {
            cluster.closing_sessions -= 1;
            return stream::empty().boxed();
        }

        let (tx, rx) = unbounded();
        for obj in cluster.objects.values() {
            let _ = tx.unbounded_send(Ok(WatchEvent::added(obj.clone())));
        }
        cluster.subscribers.push(tx);
        rx.boxed()
    }

    async fn add_finalizer(&self, resource: &ResourceSnapshot, marker: &str) -> Result<()> {
        self.journal.record(format!("add:{}", resource.name));
        let mut cluster = self.cluster();
        let Some(obj) = cluster.objects.get_mut(&resource.name) else {
            return Err(Error::PatchError {
                operation: "add",
                name: resource.name.clone(),
                message: "not found".to_string(),
            });
        };

        if resource.resource_version.is_some() && resource.resource_version != obj.resource_version
        {
            return Err(Error::Conflict {
                name: resource.name.clone(),
            });
        }
        if obj.deletion_requested() {
            return Err(Error::PatchError {
                operation: "add",
                name: resource.name.clone(),
                message: "no new finalizers can be added if the object is being deleted"
                    .to_string(),
            });
        }

        obj.finalizers = with_marker(&resource.finalizers, marker);
        cluster.bump(&resource.name);
        cluster.modified(&resource.name);
        Ok(())
    }

    async fn remove_finalizer(&self, name: &str, marker: &str) -> Result<()> {
        self.journal.record(format!("remove:{}", name));
        let mut cluster = self.cluster();
        let Some(obj) = cluster.objects.get_mut(name) else {
            return Ok(());
        };
        if !obj.has_finalizer(marker) {
            return Ok(());
        }

        obj.finalizers.retain(|f| f != marker);
        cluster.bump(name);
        if !cluster.collect(name) {
            cluster.modified(name);
        }
        Ok(())
    }

    async fn refresh_credentials(&self) -> Result<()> {
        self.cluster().refreshes += 1;
        Ok(())
    }
}

/// Capability that records its calls and can fail a set number of times
pub struct RecordingReconciler {
    name: String,
    journal: Journal,
    failures: AtomicUsize,
}

impl RecordingReconciler {
    pub fn new(name: impl Into<String>, journal: Journal) -> Self {
        Self {
            name: name.into(),
            journal,
            failures: AtomicUsize::new(0),
        }
    }

    /// Fail the first `count` calls
    pub fn failing(self, count: usize) -> Self {
        self.failures.store(count, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl Reconciler for RecordingReconciler {
    async fn reconcile(&self, resource: &str) -> anyhow::Result<()> {
        self.journal
            .record(format!("reconcile:{}:{}", self.name, resource));
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("{} failed for {}", self.name, resource);
        }
        Ok(())
    }
}

/// Poll `condition` until it holds, failing the test after `within`
pub async fn eventually(within: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + within;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {:?}",
            within
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
