//! Watched resource model
//!
//! The controller never holds authoritative state. It works on
//! [`ResourceSnapshot`]s taken from the watch stream and mutates the cluster
//! only through the patch operations of [`ResourceApi`].

mod api;
mod client;

use std::fmt;

use chrono::{DateTime, Utc};
use kube::api::ObjectMeta;

pub(crate) use api::with_marker;
pub use api::{KubeResourceApi, ResourceApi, FIELD_MANAGER};
pub use client::{ClientHandle, CredentialSource};

/// Point-in-time view of the metadata the finalizer logic depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSnapshot {
    /// Unique, immutable resource name
    pub name: String,

    /// Version of the stored object this snapshot was read from
    pub resource_version: Option<String>,

    /// Finalizer markers currently set on the resource
    pub finalizers: Vec<String>,

    /// Set once deletion was requested, never cleared afterwards
    pub deletion_requested_at: Option<DateTime<Utc>>,
}

impl ResourceSnapshot {
    /// A live resource with no finalizers
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_version: None,
            finalizers: Vec::new(),
            deletion_requested_at: None,
        }
    }

    pub fn from_meta(meta: &ObjectMeta) -> Self {
        Self {
            name: meta.name.clone().unwrap_or_default(),
            resource_version: meta.resource_version.clone(),
            finalizers: meta.finalizers.clone().unwrap_or_default(),
            deletion_requested_at: meta.deletion_timestamp.as_ref().map(|t| t.0),
        }
    }

    pub fn has_finalizer(&self, marker: &str) -> bool {
        self.finalizers.iter().any(|f| f == marker)
    }

    pub fn deletion_requested(&self) -> bool {
        self.deletion_requested_at.is_some()
    }
}

/// Lifecycle change reported by the watch stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Added => "ADDED",
            EventKind::Modified => "MODIFIED",
            EventKind::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single event from the watch stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub resource: ResourceSnapshot,
}

impl WatchEvent {
    pub fn new(kind: EventKind, resource: ResourceSnapshot) -> Self {
        Self { kind, resource }
    }

    pub fn added(resource: ResourceSnapshot) -> Self {
        Self::new(EventKind::Added, resource)
    }

    pub fn modified(resource: ResourceSnapshot) -> Self {
        Self::new(EventKind::Modified, resource)
    }

    pub fn deleted(resource: ResourceSnapshot) -> Self {
        Self::new(EventKind::Deleted, resource)
    }

    /// Name of the resource this event is about
    pub fn name(&self) -> &str {
        &self.resource.name
    }
}
