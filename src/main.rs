use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use k8s_openapi::api::core::v1::Namespace;
use tokio::signal;
use tracing::{error, info, warn};

use namespace_finalizer::config::{Args, ControllerConfig};
use namespace_finalizer::controller::{ControllerState, Supervisor};
use namespace_finalizer::error::Result;
use namespace_finalizer::reconcilers::{ExampleReconciler, ReconcilerRegistry};
use namespace_finalizer::resource::{ClientHandle, CredentialSource, KubeResourceApi};
use namespace_finalizer::{rest_api, telemetry};

/// How long in-flight cleanup may run after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    telemetry::init_logging(&args.log_level, args.log_format)?;
    let config = ControllerConfig::try_from(&args)?;

    info!(
        "Starting namespace finalizer v{} with finalizer {}",
        env!("CARGO_PKG_VERSION"),
        config.marker
    );

    let source = CredentialSource::detect();
    info!("Using {:?} credentials", source);
    let client = source.load().await?;
    let api = Arc::new(KubeResourceApi::<Namespace>::new(
        ClientHandle::new(client),
        source,
    ));

    let reconcilers = ReconcilerRegistry::builder()
        .register(ExampleReconciler::NAME, ExampleReconciler)?
        .build();
    info!("Registered reconcilers: {}", reconcilers.names().join(", "));

    let excluded: Vec<&str> = config.excluded.iter().collect();
    info!("Ignoring namespaces: {}", excluded.join(", "));

    let ctx = Arc::new(ControllerState::new(api, config.marker.clone(), reconcilers));
    let supervisor = Supervisor::new(
        ctx,
        config.workers,
        config.excluded.clone(),
        config.retry_delay,
    );

    let metrics_addr = config.metrics_addr;
    tokio::spawn(async move {
        if let Err(e) = rest_api::run_server(metrics_addr).await {
            error!("Metrics server stopped: {}", e);
        }
    });

    tokio::select! {
        _ = supervisor.run() => {}
        _ = shutdown_signal() => {}
    }

    let dispatcher = supervisor.dispatcher();
    info!(
        "Waiting up to {:?} for {} namespaces in flight",
        SHUTDOWN_GRACE,
        dispatcher.in_flight()
    );
    if tokio::time::timeout(SHUTDOWN_GRACE, dispatcher.drain())
        .await
        .is_err()
    {
        warn!(
            "Shutdown grace period elapsed with {} namespaces in flight",
            dispatcher.in_flight()
        );
    }

    info!("Namespace finalizer stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
