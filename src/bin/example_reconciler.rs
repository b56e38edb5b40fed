//! Run the example cleanup once against a single namespace, without the
//! controller. Useful to check a capability by hand:
//!
//! ```text
//! NAMESPACE=team-a example-reconciler
//! ```

use std::process;

use clap::Parser;

use namespace_finalizer::reconcilers::{ExampleReconciler, Reconciler};
use namespace_finalizer::telemetry::{self, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "example-reconciler")]
#[command(about = "Runs the example cleanup for one namespace", long_about = None)]
struct Cli {
    /// Namespace to clean up
    #[arg(long, env = "NAMESPACE", default_value = "default")]
    namespace: String,

    /// Log level or filter directives (overridden by RUST_LOG)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = telemetry::init_logging(&cli.log_level, LogFormat::Pretty) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    if let Err(e) = ExampleReconciler.reconcile(&cli.namespace).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
