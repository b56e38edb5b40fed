//! Command line arguments and the validated controller configuration

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::controller::{
    ExcludedResources, FinalizerMarker, DEFAULT_FINALIZER, DEFAULT_RETRY_DELAY, DEFAULT_WORKERS,
};
use crate::error::{Error, Result};
use crate::telemetry::LogFormat;

/// Address the health and metrics server binds to by default
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";

#[derive(Parser, Debug, Clone)]
#[command(name = "namespace-finalizer")]
#[command(about = "Runs cleanup routines before Kubernetes namespaces are deleted", long_about = None)]
#[command(version)]
pub struct Args {
    /// Log level or filter directives (overridden by RUST_LOG)
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Number of concurrent reconciliation workers
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Seconds to wait before reopening a failed watch stream
    #[arg(long, default_value_t = DEFAULT_RETRY_DELAY.as_secs())]
    pub retry_delay_secs: u64,

    /// Finalizer this controller owns
    #[arg(long, default_value = DEFAULT_FINALIZER)]
    pub finalizer: String,

    /// Additional namespaces to ignore, on top of the system ones
    #[arg(long = "exclude", value_name = "NAMESPACE")]
    pub exclude: Vec<String>,

    /// Bind address for /health and /metrics
    #[arg(long, default_value = DEFAULT_METRICS_ADDR)]
    pub metrics_addr: SocketAddr,
}

/// Controller settings after validation
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub workers: usize,
    pub retry_delay: Duration,
    pub marker: FinalizerMarker,
    pub excluded: ExcludedResources,
    pub metrics_addr: SocketAddr,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            retry_delay: DEFAULT_RETRY_DELAY,
            marker: FinalizerMarker::default(),
            excluded: ExcludedResources::default(),
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl TryFrom<&Args> for ControllerConfig {
    type Error = Error;

    fn try_from(args: &Args) -> Result<Self> {
        if args.workers == 0 {
            return Err(Error::ConfigError(
                "--workers must be at least 1".to_string(),
            ));
        }
        if args.exclude.iter().any(|name| name.trim().is_empty()) {
            return Err(Error::ConfigError(
                "--exclude needs a namespace name".to_string(),
            ));
        }

        Ok(Self {
            workers: args.workers,
            retry_delay: Duration::from_secs(args.retry_delay_secs),
            marker: args.finalizer.parse()?,
            excluded: ExcludedResources::with_system(args.exclude.iter().cloned()),
            metrics_addr: args.metrics_addr,
        })
    }
}
