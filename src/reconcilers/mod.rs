//! Pluggable cleanup capabilities
//!
//! A deployment registers one or more [`Reconciler`]s at startup. They run in
//! registration order for every resource whose deletion was requested, before
//! the finalizer is released.

mod example;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};

pub use example::ExampleReconciler;

#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Release whatever is tied to `resource`.
    ///
    /// Must be idempotent: it runs again after any failure in the same pass
    /// and after process restarts.
    async fn reconcile(&self, resource: &str) -> anyhow::Result<()>;
}

/// Ordered, immutable set of named capabilities
#[derive(Clone, Default)]
pub struct ReconcilerRegistry {
    entries: Arc<Vec<(String, Arc<dyn Reconciler>)>>,
}

impl ReconcilerRegistry {
    pub fn builder() -> ReconcilerRegistryBuilder {
        ReconcilerRegistryBuilder::default()
    }

    /// Capabilities in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Reconciler>)> {
        self.entries.iter().map(|(name, r)| (name.as_str(), r))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Default)]
pub struct ReconcilerRegistryBuilder {
    entries: Vec<(String, Arc<dyn Reconciler>)>,
}

impl ReconcilerRegistryBuilder {
    pub fn register(
        self,
        name: impl Into<String>,
        reconciler: impl Reconciler + 'static,
    ) -> Result<Self> {
        self.insert(name.into(), Arc::new(reconciler))
    }

    /// Register an already shared capability
    pub fn register_arc(
        self,
        name: impl Into<String>,
        reconciler: Arc<dyn Reconciler>,
    ) -> Result<Self> {
        self.insert(name.into(), reconciler)
    }

    fn insert(mut self, name: String, reconciler: Arc<dyn Reconciler>) -> Result<Self> {
        if self.entries.iter().any(|(existing, _)| *existing == name) {
            return Err(Error::DuplicateReconciler(name));
        }
        self.entries.push((name, reconciler));
        Ok(self)
    }

    pub fn build(self) -> ReconcilerRegistry {
        ReconcilerRegistry {
            entries: Arc::new(self.entries),
        }
    }
}
