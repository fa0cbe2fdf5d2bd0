//! Canopy Orchestrator - Service Resolution
//!
//! Given a service quest, asks the currently leading registry for the
//! matching records and reduces them to one selected provider (or returns
//! the full list). Keeps no state beyond the cached leader URL.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod handlers;
pub mod resolver;
pub mod server;

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use handlers::AppState;
pub use resolver::{select_service, ResolveError, Resolver};

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
    pub http_port: u16,
    /// Base URLs of the configured registrar replicas.
    pub registrar_urls: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ServiceError> {
        let system_name =
            std::env::var("SYSTEM_NAME").unwrap_or_else(|_| "orchestrator".to_string());

        let http_port = std::env::var("HTTP_PORT")
            .unwrap_or_else(|_| "20103".to_string())
            .parse()
            .map_err(|e| ServiceError::Config(format!("HTTP_PORT must be a valid port: {e}")))?;

        let registrar_urls: Vec<String> = std::env::var("REGISTRAR_URLS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        if registrar_urls.is_empty() {
            return Err(ServiceError::Config(
                "REGISTRAR_URLS is required - the orchestrator cannot resolve services without a registry".to_string(),
            ));
        }

        Ok(Self {
            system_name,
            http_port,
            registrar_urls,
        })
    }
}

/// Run the orchestrator service until shutdown.
pub async fn run(config: Config) -> Result<(), ServiceError> {
    let cancel = CancellationToken::new();
    let state = Arc::new(AppState {
        resolver: Resolver::new(config.registrar_urls.clone()),
    });

    server::serve(config.http_port, &config.system_name, state, cancel).await
}
