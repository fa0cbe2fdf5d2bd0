//! Canopy Messenger - Log Aggregation
//!
//! Collects short log bursts from the other systems of the local cloud,
//! keeps a bounded per-system ring of recent messages, serves an HTML
//! dashboard, and periodically announces itself to every system so they
//! know where to ship their logs.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod beacon;
pub mod handlers;
pub mod server;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use handlers::AppState;
pub use store::{Message, MessageStore, MAX_MESSAGES};

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
    pub system_name: String,
    /// This host's own IP address, advertised in the beacon form.
    pub host_ip: String,
    pub http_port: u16,
    /// 0 when TLS is not set up; the beacon then advertises plain http.
    pub https_port: u16,
    /// Base URLs of the configured registrar replicas.
    pub registrar_urls: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ServiceError> {
        let system_name = std::env::var("SYSTEM_NAME").unwrap_or_else(|_| "messenger".to_string());

        let host_ip = std::env::var("HOST_IP").unwrap_or_else(|_| "127.0.0.1".to_string());

        let http_port = std::env::var("HTTP_PORT")
            .unwrap_or_else(|_| "20106".to_string())
            .parse()
            .map_err(|e| ServiceError::Config(format!("HTTP_PORT must be a valid port: {e}")))?;

        let https_port = std::env::var("HTTPS_PORT")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .map_err(|e| ServiceError::Config(format!("HTTPS_PORT must be a valid port: {e}")))?;

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
            https_port,
            registrar_urls,
        })
    }
}

/// Run the messenger service until shutdown.
pub async fn run(config: Config) -> Result<(), ServiceError> {
    let cancel = CancellationToken::new();

    let registration = beacon::registration_form(&config)?;
    let beacon_task = tokio::spawn(beacon::run_beacon(
        config.clone(),
        registration,
        cancel.clone(),
    ));

    let state = Arc::new(AppState {
        store: MessageStore::new(),
        system_name: config.system_name.clone(),
    });

    let result = server::serve(config.http_port, state, cancel.clone()).await;

    cancel.cancel();
    if tokio::time::timeout(DRAIN_TIMEOUT, beacon_task).await.is_err() {
        warn!("beacon did not drain in time");
    }

    result
}
