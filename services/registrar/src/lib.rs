//! Canopy Registrar - Replicated Service Registry
//!
//! Keeps the authoritative table of currently available services while this
//! replica leads, refuses mutations while standing by, and evicts records at
//! their end of validity. All table access is serialized through a single
//! actor task; leader election is plain `/status` polling among the
//! configured peer replicas.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod handlers;
pub mod registry;
pub mod role;
pub mod scheduler;
pub mod server;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use handlers::AppState;
pub use registry::{Registry, RegistryError};
pub use role::{Role, SharedRole};
pub use scheduler::Scheduler;

/// How long shutdown waits for background tasks to drain.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Service configuration
#[derive(Clone)]
pub struct Config {
    /// This system's name; the HTTP surface is nested under it.
    pub system_name: String,
    /// This host's own IP address, used to exclude itself from the peer list.
    pub host_ip: String,
    /// Port the HTTP surface listens on.
    pub http_port: u16,
    /// Base URLs of every configured registrar replica, own one included.
    pub registrar_urls: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ServiceError> {
        let system_name =
            std::env::var("SYSTEM_NAME").unwrap_or_else(|_| "serviceregistrar".to_string());

        let host_ip = std::env::var("HOST_IP").unwrap_or_else(|_| "127.0.0.1".to_string());

        let http_port = std::env::var("HTTP_PORT")
            .unwrap_or_else(|_| "20102".to_string())
            .parse()
            .map_err(|e| ServiceError::Config(format!("HTTP_PORT must be a valid port: {e}")))?;

        let registrar_urls = std::env::var("REGISTRAR_URLS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            system_name,
            host_ip,
            http_port,
            registrar_urls,
        })
    }
}

/// Run the registrar service until shutdown.
pub async fn run(config: Config) -> Result<(), ServiceError> {
    let cancel = CancellationToken::new();

    let (registry, registry_task) = Registry::spawn(cancel.clone());

    let peers = role::registrar_peers(&config)?;
    info!(peer_count = peers.len(), "derived registrar peer list");
    let role = role::shared();
    let poller = tokio::spawn(role::run_role_poller(
        role.clone(),
        peers,
        cancel.clone(),
    ));

    let state = Arc::new(AppState {
        registry,
        role,
        system_name: config.system_name.clone(),
    });

    let result = server::serve(config.http_port, state, cancel.clone()).await;

    cancel.cancel();
    let drain = async {
        let _ = registry_task.await;
        let _ = poller.await;
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        warn!("background tasks did not drain in time");
    }

    result
}
