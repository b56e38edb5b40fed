//! Authenticated client handle shared by the stream reader and all workers

use std::sync::Arc;

use kube::config::KubeConfigOptions;
use kube::Client;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Where credentials come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Service account token mounted into the pod
    InCluster,
    /// The local kubeconfig (current context)
    Kubeconfig,
}

impl CredentialSource {
    /// In-cluster when the kubelet injected `KUBERNETES_PORT`, local otherwise
    pub fn detect() -> Self {
        Self::from_env(std::env::var_os("KUBERNETES_PORT").is_some())
    }

    fn from_env(kubernetes_port_set: bool) -> Self {
        if kubernetes_port_set {
            CredentialSource::InCluster
        } else {
            CredentialSource::Kubeconfig
        }
    }

    /// Build a fresh client, re-reading tokens and certificates from disk
    pub async fn load(&self) -> Result<Client> {
        debug!("Loading credentials from {:?}", self);
        let config = match self {
            CredentialSource::InCluster => kube::Config::incluster()
                .map_err(|e| Error::ConfigError(format!("in-cluster config: {}", e)))?,
            CredentialSource::Kubeconfig => {
                kube::Config::from_kubeconfig(&KubeConfigOptions::default())
                    .await
                    .map_err(|e| Error::ConfigError(format!("kubeconfig: {}", e)))?
            }
        };
        Client::try_from(config).map_err(Error::KubeError)
    }
}

/// Read-mostly reference to the current client
///
/// Callers take a snapshot per request. A refresh swaps the client for
/// everyone at once; requests already running on the old client finish or
/// fail on their own.
#[derive(Clone)]
pub struct ClientHandle {
    current: Arc<RwLock<Client>>,
}

impl ClientHandle {
    pub fn new(client: Client) -> Self {
        Self {
            current: Arc::new(RwLock::new(client)),
        }
    }

    /// The client to use for the next request
    pub async fn snapshot(&self) -> Client {
        self.current.read().await.clone()
    }

    pub async fn replace(&self, client: Client) {
        *self.current.write().await = client;
        info!("Kubernetes client refreshed");
    }
}
