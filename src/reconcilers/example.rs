use async_trait::async_trait;
use tracing::info;

use super::Reconciler;

/// Placeholder capability that only reports the resource it was asked to clean up.
///
/// Replace or register alongside it with the cleanup a deployment needs.
/// It can also be run by hand, outside the controller (see the
/// `example-reconciler` binary, which reads `NAMESPACE`):
///
/// ```
/// use namespace_finalizer::reconcilers::{ExampleReconciler, Reconciler};
///
/// let runtime = tokio::runtime::Runtime::new().unwrap();
/// runtime.block_on(ExampleReconciler.reconcile("team-a")).unwrap();
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct ExampleReconciler;

impl ExampleReconciler {
    pub const NAME: &'static str = "ExampleReconciler";
}

#[async_trait]
impl Reconciler for ExampleReconciler {
    async fn reconcile(&self, resource: &str) -> anyhow::Result<()> {
        info!("Running ExampleReconciler for namespace {}", resource);
        Ok(())
    }
}
