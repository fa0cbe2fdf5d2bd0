//! Periodic self-announcement to peer systems
//!
//! Every 30 seconds the messenger fetches the registrar's system list and
//! posts its own registration form to each system, so they know where to
//! ship their logs. Cycles are serialized; send failures are expected
//! (systems may be down or simply not accept registrations) and swallowed.

use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use canopy::{
    find_leading_registrar, pack, CanopyError, Form, MessengerRegistration, RegistrarClient,
};

use crate::{Config, ServiceError};

const BEACON_PERIOD: Duration = Duration::from_secs(30);
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Build and pack this messenger's registration form once, to be sent on
/// every beacon cycle. Prefers the https port, falls back to http, and
/// fails when neither is configured.
pub fn registration_form(config: &Config) -> Result<Vec<u8>, ServiceError> {
    let (scheme, port) = if config.https_port > 0 {
        ("https", config.https_port)
    } else if config.http_port > 0 {
        ("http", config.http_port)
    } else {
        return Err(ServiceError::Config(
            "no http(s) port defined in conf".to_string(),
        ));
    };
    let url = format!(
        "{}://{}:{}/{}",
        scheme, config.host_ip, port, config.system_name
    );
    let form = Form::MessengerRegistration(MessengerRegistration { url });
    pack(&form).map_err(|e| ServiceError::Config(format!("cannot pack registration form: {e}")))
}

/// Run the beacon until cancelled.
pub async fn run_beacon(config: Config, registration: Vec<u8>, cancel: CancellationToken) {
    let client = reqwest::Client::builder()
        .timeout(SEND_TIMEOUT)
        .build()
        .unwrap_or_default();

    info!("starting messenger beacon");
    let mut ticker = interval(BEACON_PERIOD);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => return,
        }

        let systems = match fetch_systems(&config.registrar_urls).await {
            Ok(systems) => systems,
            Err(e) => {
                info!("error fetching system list: {e}");
                continue;
            }
        };
        notify_systems(&client, &systems, &config.system_name, &registration).await;
    }
}

/// Ask a live registrar for the list of online systems.
async fn fetch_systems(registrar_urls: &[String]) -> Result<Vec<String>, CanopyError> {
    let registrar = find_leading_registrar(registrar_urls)
        .await
        .ok_or(CanopyError::NoLeadingRegistrar)?;
    RegistrarClient::new(&registrar).syslist().await
}

/// Send the pre-packed registration form to each listed system. Systems with
/// unparseable URLs, this messenger itself, and other messengers are skipped.
async fn notify_systems(
    client: &reqwest::Client,
    systems: &[String],
    own_name: &str,
    registration: &[u8],
) {
    let own_prefix = format!("/{own_name}");
    for system in systems {
        let parsed = match Url::parse(system) {
            Ok(url) => url,
            Err(_) => continue, // skip misconfigured systems
        };
        if parsed.path().starts_with(&own_prefix) {
            continue; // skip itself and other messengers
        }
        if let Err(e) = client
            .post(format!("{system}/msg"))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(registration.to_vec())
            .send()
            .await
        {
            debug!(system = %system, "beacon send failed: {e}");
        }
    }
}
