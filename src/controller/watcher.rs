//! Watch sessions over the resource stream
//!
//! A session is a single list-then-watch run. Events for excluded resources
//! are dropped here, so they never reach the dispatcher. The first error ends
//! the session; the supervisor decides what happens next.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future;
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::Result;
use crate::resource::{ResourceApi, WatchEvent};

/// Names reserved by the cluster itself
pub const SYSTEM_NAMESPACES: [&str; 3] = ["kube-node-lease", "kube-public", "kube-system"];

/// Fixed deny-list of resource names that are never finalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedResources(BTreeSet<String>);

impl ExcludedResources {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    /// System namespaces plus `extra`
    pub fn with_system<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut excluded = Self::default();
        excluded.0.extend(extra.into_iter().map(Into::into));
        excluded
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for ExcludedResources {
    fn default() -> Self {
        Self::new(SYSTEM_NAMESPACES)
    }
}

/// Open a new session, filtered and terminated after its first failure
pub async fn session(
    api: &dyn ResourceApi,
    excluded: Arc<ExcludedResources>,
) -> BoxStream<'static, Result<WatchEvent>> {
    let events = api.watch().await.filter(move |item| {
        future::ready(match item {
            Ok(event) => !excluded.contains(event.name()),
            Err(_) => true,
        })
    });

    // the inner stream is never polled again once it yielded an error
    stream::unfold(Some(events), |state| async move {
        let mut events = state?;
        let item = events.next().await?;
        let next = item.is_ok().then_some(events);
        Some((item, next))
    })
    .boxed()
}
