use std::sync::Arc;

use tracing::{debug, error, info, instrument};

use crate::error::{Error, Result};
use crate::reconcilers::ReconcilerRegistry;
use crate::resource::{EventKind, ResourceApi, ResourceSnapshot, WatchEvent};

use super::finalizers::{FinalizerAction, FinalizerMarker, FinalizerState};
use super::metrics;

/// Shared state for the controller
pub struct ControllerState {
    pub api: Arc<dyn ResourceApi>,
    pub marker: FinalizerMarker,
    pub reconcilers: ReconcilerRegistry,
}

impl ControllerState {
    pub fn new(
        api: Arc<dyn ResourceApi>,
        marker: FinalizerMarker,
        reconcilers: ReconcilerRegistry,
    ) -> Self {
        Self {
            api,
            marker,
            reconcilers,
        }
    }
}

/// Evaluate one event and act on it
///
/// Every error stops here: it is logged and the resource is left as it was,
/// to be evaluated again on its next event.
#[instrument(skip(ctx, event), fields(name = %event.name(), kind = %event.kind))]
pub async fn handle_event(ctx: &ControllerState, event: WatchEvent) {
    debug!("Event: {} {}", event.kind, event.name());
    metrics::record_event(event.kind);

    if event.kind == EventKind::Deleted {
        debug!("{} was removed, nothing to do", event.name());
        return;
    }

    if let Err(e) = reconcile(ctx, &event.resource).await {
        if e.is_stale_snapshot() {
            debug!("Skipping stale snapshot of {}: {}", event.name(), e);
        } else {
            error!("{}", e);
        }
    }
}

async fn reconcile(ctx: &ControllerState, resource: &ResourceSnapshot) -> Result<()> {
    let state = FinalizerState::evaluate(resource, &ctx.marker);
    debug!("{} is {:?}", resource.name, state);

    match state.action() {
        FinalizerAction::AddMarker => add_finalizer(ctx, resource).await,
        FinalizerAction::CleanupAndRemoveMarker => cleanup_resource(ctx, resource).await,
        FinalizerAction::None => Ok(()),
    }
}

async fn add_finalizer(ctx: &ControllerState, resource: &ResourceSnapshot) -> Result<()> {
    info!(
        "Adding finalizer {} to namespace {}",
        ctx.marker, resource.name
    );
    let result = ctx.api.add_finalizer(resource, ctx.marker.as_str()).await;
    record_patch("add", &result);
    result
}

async fn remove_finalizer(ctx: &ControllerState, name: &str) -> Result<()> {
    info!("Removing finalizer {} from namespace {}", ctx.marker, name);
    let result = ctx.api.remove_finalizer(name, ctx.marker.as_str()).await;
    record_patch("remove", &result);
    result
}

/// Run every capability in registry order, then release the finalizer.
///
/// The first failing capability aborts the pass and keeps the finalizer.
async fn cleanup_resource(ctx: &ControllerState, resource: &ResourceSnapshot) -> Result<()> {
    let name = resource.name.as_str();
    info!("Cleaning up namespace {}", name);

    for (reconciler, capability) in ctx.reconcilers.iter() {
        debug!("Running {} for namespace {}", reconciler, name);
        match capability.reconcile(name).await {
            Ok(()) => metrics::record_cleanup(reconciler, "success"),
            Err(e) => {
                metrics::record_cleanup(reconciler, "failure");
                return Err(Error::ReconcileError {
                    reconciler: reconciler.to_string(),
                    resource: name.to_string(),
                    message: format!("{:#}", e),
                });
            }
        }
    }

    remove_finalizer(ctx, name).await?;
    info!("Cleanup complete for namespace {}", name);
    Ok(())
}

fn record_patch(operation: &str, result: &Result<()>) {
    let outcome = match result {
        Ok(()) => "success",
        Err(e) => e.metric_label(),
    };
    metrics::record_patch(operation, outcome);
}
