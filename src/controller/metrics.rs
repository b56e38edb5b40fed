//! Prometheus metrics for the namespace finalizer

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

use crate::resource::EventKind;

/// Labels for the watch event counter
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EventLabels {
    pub kind: String,
}

/// Labels for finalizer patches
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PatchLabels {
    pub operation: String,
    pub outcome: String,
}

/// Labels for cleanup capability runs
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CleanupLabels {
    pub reconciler: String,
    pub outcome: String,
}

/// Events handed to the dispatcher, per kind
pub static EVENTS: Lazy<Family<EventLabels, Counter>> = Lazy::new(Family::default);

/// Finalizer add/remove patches, per outcome
pub static PATCHES: Lazy<Family<PatchLabels, Counter>> = Lazy::new(Family::default);

/// Cleanup capability invocations, per outcome
pub static CLEANUPS: Lazy<Family<CleanupLabels, Counter>> = Lazy::new(Family::default);

/// Watch sessions that ended in a failure
pub static STREAM_RESTARTS: Lazy<Counter> = Lazy::new(Counter::default);

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();
    registry.register(
        "namespace_finalizer_events",
        "Watch events dispatched for evaluation",
        EVENTS.clone(),
    );
    registry.register(
        "namespace_finalizer_patches",
        "Finalizer patches issued against the API server",
        PATCHES.clone(),
    );
    registry.register(
        "namespace_finalizer_cleanups",
        "Cleanup capability invocations",
        CLEANUPS.clone(),
    );
    registry.register(
        "namespace_finalizer_stream_restarts",
        "Watch sessions restarted after a stream failure",
        STREAM_RESTARTS.clone(),
    );
    registry
});

pub fn record_event(kind: EventKind) {
    EVENTS
        .get_or_create(&EventLabels {
            kind: kind.as_str().to_string(),
        })
        .inc();
}

pub fn record_patch(operation: &str, outcome: &str) {
    PATCHES
        .get_or_create(&PatchLabels {
            operation: operation.to_string(),
            outcome: outcome.to_string(),
        })
        .inc();
}

pub fn record_cleanup(reconciler: &str, outcome: &str) {
    CLEANUPS
        .get_or_create(&CleanupLabels {
            reconciler: reconciler.to_string(),
            outcome: outcome.to_string(),
        })
        .inc();
}

pub fn record_stream_restart() {
    STREAM_RESTARTS.inc();
}
