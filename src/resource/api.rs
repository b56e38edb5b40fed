//! Orchestrator API seam
//!
//! [`ResourceApi`] is everything the controller needs from the cluster: a
//! list-then-watch session, the two finalizer patches and a credential
//! refresh. [`KubeResourceApi`] implements it for built-in cluster-scoped
//! kinds such as `Namespace`.

use std::fmt::Debug;
use std::marker::PhantomData;

use async_trait::async_trait;
use futures::future;
use futures::stream::{BoxStream, StreamExt};
use k8s_openapi::ClusterResourceScope;
use kube::{
    api::{Api, Patch, PatchParams},
    runtime::watcher,
    Resource,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::client::{ClientHandle, CredentialSource};
use super::{ResourceSnapshot, WatchEvent};
use crate::error::{Error, Result};

/// Field manager recorded on every patch this controller issues
pub const FIELD_MANAGER: &str = "namespace-finalizer";

#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// Start a new session: current resources first, then live changes.
    ///
    /// Any error item ends the session; the stream must not be polled after it.
    async fn watch(&self) -> BoxStream<'static, Result<WatchEvent>>;

    /// Append `marker` to the finalizers of the snapshot's resource.
    ///
    /// Fails with [`Error::Conflict`] if the stored object changed since the
    /// snapshot was taken.
    async fn add_finalizer(&self, resource: &ResourceSnapshot, marker: &str) -> Result<()>;

    /// Remove `marker` from the resource. No-op if it is already gone.
    async fn remove_finalizer(&self, name: &str, marker: &str) -> Result<()>;

    /// Rebuild the authenticated client from its credential source
    async fn refresh_credentials(&self) -> Result<()>;
}

/// Finalizer list with `marker` appended once and duplicates dropped
pub(crate) fn with_marker(finalizers: &[String], marker: &str) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(finalizers.len() + 1);
    for finalizer in finalizers.iter().map(String::as_str).chain([marker]) {
        if !merged.iter().any(|f| f == finalizer) {
            merged.push(finalizer.to_string());
        }
    }
    merged
}

/// JSON merge patch adding the marker, guarded by the snapshot's resourceVersion
pub(crate) fn add_finalizer_patch(resource: &ResourceSnapshot, marker: &str) -> Value {
    let mut metadata = json!({ "finalizers": with_marker(&resource.finalizers, marker) });
    if let Some(version) = &resource.resource_version {
        metadata["resourceVersion"] = Value::String(version.clone());
    }
    json!({ "metadata": metadata })
}

/// Strategic merge patch deleting exactly one entry from the finalizer list
///
/// See the `$deleteFromPrimitiveList` directive of strategic merge patch.
pub(crate) fn remove_finalizer_patch(marker: &str) -> Value {
    json!({
        "metadata": {
            "$deleteFromPrimitiveList/finalizers": [marker]
        }
    })
}

fn patch_error(operation: &'static str, name: &str, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(ref response) if response.code == 409 => Error::Conflict {
            name: name.to_string(),
        },
        other => Error::PatchError {
            operation,
            name: name.to_string(),
            message: other.to_string(),
        },
    }
}

/// [`ResourceApi`] backed by the Kubernetes API server
///
/// Marker removal uses a strategic merge patch, which the API server only
/// accepts for built-in kinds. Custom resources answer it with 415.
pub struct KubeResourceApi<K> {
    handle: ClientHandle,
    source: CredentialSource,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeResourceApi<K> {
    pub fn new(handle: ClientHandle, source: CredentialSource) -> Self {
        Self {
            handle,
            source,
            _kind: PhantomData,
        }
    }
}

impl<K> KubeResourceApi<K>
where
    K: Resource<Scope = ClusterResourceScope> + Clone + DeserializeOwned + Debug,
    K::DynamicType: Default,
{
    async fn api(&self) -> Api<K> {
        Api::all(self.handle.snapshot().await)
    }
}

fn into_watch_event<K: Resource>(event: watcher::Event<K>) -> Option<WatchEvent> {
    match event {
        watcher::Event::InitApply(obj) => Some(WatchEvent::added(ResourceSnapshot::from_meta(
            obj.meta(),
        ))),
        watcher::Event::Apply(obj) => Some(WatchEvent::modified(ResourceSnapshot::from_meta(
            obj.meta(),
        ))),
        watcher::Event::Delete(obj) => Some(WatchEvent::deleted(ResourceSnapshot::from_meta(
            obj.meta(),
        ))),
        watcher::Event::Init => {
            debug!("Relist started");
            None
        }
        watcher::Event::InitDone => {
            debug!("Relist complete");
            None
        }
    }
}

#[async_trait]
impl<K> ResourceApi for KubeResourceApi<K>
where
    K: Resource<Scope = ClusterResourceScope>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
    K::DynamicType: Default,
{
    async fn watch(&self) -> BoxStream<'static, Result<WatchEvent>> {
        watcher(self.api().await, watcher::Config::default())
            .filter_map(|item| {
                future::ready(match item {
                    Ok(event) => into_watch_event(event).map(Ok),
                    Err(e) => Some(Err(Error::from(e))),
                })
            })
            .boxed()
    }

    async fn add_finalizer(&self, resource: &ResourceSnapshot, marker: &str) -> Result<()> {
        let patch = add_finalizer_patch(resource, marker);
        self.api()
            .await
            .patch(
                &resource.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| patch_error("add", &resource.name, e))?;
        Ok(())
    }

    async fn remove_finalizer(&self, name: &str, marker: &str) -> Result<()> {
        let patch = remove_finalizer_patch(marker);
        match self
            .api()
            .await
            .patch(
                name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Strategic(&patch),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                debug!("{} already gone, nothing to remove", name);
                Ok(())
            }
            Err(e) => Err(patch_error("remove", name, e)),
        }
    }

    async fn refresh_credentials(&self) -> Result<()> {
        info!("Refreshing credentials from {:?}", self.source);
        let client = self.source.load().await?;
        self.handle.replace(client).await;
        Ok(())
    }
}
