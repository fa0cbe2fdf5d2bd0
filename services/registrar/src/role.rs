//! Leader election among registrar replicas
//!
//! No consensus protocol: every replica polls its peers' `/status` in
//! enumeration order once per 5 s. The first peer answering 200 is adopted
//! as leader and this replica stands by; when no peer answers 200 the
//! replica takes the lead itself. Split brain during partitions is tolerated
//! and heals through the short record TTLs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use tokio::sync::RwLock;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::{Config, ServiceError};

const POLL_PERIOD: Duration = Duration::from_secs(5);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
pub struct Role {
    pub leading: bool,
    pub leading_since: Option<DateTime<Utc>>,
    /// URL of the peer currently adopted as leader, when standing by.
    pub leading_registrar: Option<String>,
}

pub type SharedRole = Arc<RwLock<Role>>;

pub fn shared() -> SharedRole {
    Arc::new(RwLock::new(Role::default()))
}

/// The other registrar replicas in the local cloud: every configured
/// registrar URL whose host:port is not this process's own.
pub fn registrar_peers(config: &Config) -> Result<Vec<String>, ServiceError> {
    let mut peers = Vec::new();
    for raw in &config.registrar_urls {
        let parsed = Url::parse(raw)
            .map_err(|e| ServiceError::Config(format!("invalid registrar URL {raw}: {e}")))?;
        let host = parsed.host_str().unwrap_or_default();
        let is_own_host = host == config.host_ip || host == "localhost";
        if is_own_host && parsed.port_or_known_default() == Some(config.http_port) {
            continue;
        }
        peers.push(raw.trim_end_matches('/').to_string());
    }
    Ok(peers)
}

/// Poll the peers every 5 s and keep the shared role current. Polls are
/// serialized; one cycle finishes before the next starts.
pub async fn run_role_poller(role: SharedRole, peers: Vec<String>, cancel: CancellationToken) {
    let client = reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .unwrap_or_default();

    let mut ticker = interval(POLL_PERIOD);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => return,
        }

        let mut found_leader: Option<String> = None;
        for peer in &peers {
            match client.get(format!("{peer}/status")).send().await {
                Ok(response) => match response.status() {
                    StatusCode::OK => {
                        found_leader = Some(peer.clone());
                        break;
                    }
                    StatusCode::SERVICE_UNAVAILABLE => {} // peer is standing by too
                    status => {
                        warn!(peer = %peer, %status, "unexpected status from peer registrar");
                    }
                },
                Err(_) => {} // peer is not up, keep scanning
            }
        }

        let mut state = role.write().await;
        match found_leader {
            Some(url) => {
                if state.leading {
                    info!(leader = %url, "standing down, peer registrar leads");
                }
                state.leading = false;
                state.leading_since = None;
                state.leading_registrar = Some(url);
            }
            None => {
                if !state.leading {
                    let since = Utc::now();
                    state.leading = true;
                    state.leading_since = Some(since);
                    state.leading_registrar = None;
                    info!(%since, "taking the service registry lead");
                }
            }
        }
    }
}
