//! Central error types for the namespace finalizer
//!
//! Uses `thiserror` for ergonomic, type-safe error handling with
//! automatic `Display` and `Error` trait implementations.

use thiserror::Error;

/// Central error type for the namespace finalizer
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error from kube-rs
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration or credential loading error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The watch stream failed and the session has to be restarted
    #[error("Stream failure: {0}")]
    StreamFailure(String),

    /// A finalizer patch was rejected by the API server
    #[error("Failed to {operation} finalizer on {name}: {message}")]
    PatchError {
        operation: &'static str,
        name: String,
        message: String,
    },

    /// The snapshot used to build a patch is older than the stored object
    #[error("Conflict patching {name}: snapshot is stale")]
    Conflict { name: String },

    /// A cleanup capability failed
    #[error("Reconciler {reconciler} failed for {resource}: {message}")]
    ReconcileError {
        reconciler: String,
        resource: String,
        message: String,
    },

    /// Finalizer marker is not of the form `<domain>/<name>`
    #[error("Invalid finalizer name: {0}")]
    InvalidFinalizer(String),

    /// Two capabilities were registered under the same name
    #[error("Reconciler already registered: {0}")]
    DuplicateReconciler(String),
}

/// Result type alias for controller operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Whether this error only means the observed snapshot was outdated
    pub fn is_stale_snapshot(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Stable, low-cardinality label for metrics
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::SerializationError(_) => "serialization",
            Error::ConfigError(_) => "config",
            Error::StreamFailure(_) => "stream",
            Error::PatchError { .. } => "patch",
            Error::Conflict { .. } => "conflict",
            Error::ReconcileError { .. } => "reconcile",
            Error::InvalidFinalizer(_) => "invalid_finalizer",
            Error::DuplicateReconciler(_) => "duplicate_reconciler",
        }
    }
}

// Watch errors only ever end a session, so they are folded into StreamFailure
impl From<kube::runtime::watcher::Error> for Error {
    fn from(e: kube::runtime::watcher::Error) -> Self {
        Error::StreamFailure(e.to_string())
    }
}
