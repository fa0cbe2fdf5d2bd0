//! Leading-registrar resolution and provider selection
//!
//! The resolver caches the leading registrar's URL between calls. Any
//! transport failure clears the cache so the next call rediscovers; the
//! failed call itself is not retried.

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use canopy::{
    find_leading_registrar, CanopyError, RegistrarClient, ServicePoint, ServiceQuest,
    ServiceRecord,
};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("no reachable leading registrar")]
    NoRegistrar,
    #[error("unable to locate any such service: {0}")]
    NoSuchService(String),
    #[error(transparent)]
    Canopy(#[from] CanopyError),
}

pub struct Resolver {
    registrar_urls: Vec<String>,
    leading: Mutex<Option<String>>,
}

impl Resolver {
    pub fn new(registrar_urls: Vec<String>) -> Self {
        Self {
            registrar_urls,
            leading: Mutex::new(None),
        }
    }

    /// Run the quest against the leading registrar and return the matching
    /// records. Fails with `NoSuchService` when the answer is empty.
    pub async fn query(&self, quest: &ServiceQuest) -> Result<Vec<ServiceRecord>, ResolveError> {
        let registrar = self.leading_registrar().await?;

        let records = match RegistrarClient::new(&registrar).query(quest).await {
            Ok(records) => records,
            Err(e @ CanopyError::Http(_)) => {
                // The cached leader is gone; rediscover on the next call.
                warn!(registrar = %registrar, "query transport failure: {e}");
                self.leading.lock().await.take();
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        if records.is_empty() {
            return Err(ResolveError::NoSuchService(
                quest.service_definition.clone(),
            ));
        }
        Ok(records)
    }

    async fn leading_registrar(&self) -> Result<String, ResolveError> {
        let mut cached = self.leading.lock().await;
        if let Some(url) = cached.as_ref() {
            return Ok(url.clone());
        }
        let url = find_leading_registrar(&self.registrar_urls)
            .await
            .ok_or(ResolveError::NoRegistrar)?;
        debug!(registrar = %url, "discovered leading registrar");
        *cached = Some(url.clone());
        Ok(url)
    }
}

/// Selection policy: the first record in list order. The output shape
/// already carries the fields a cost- or location-based policy would need.
pub fn select_service(records: &[ServiceRecord]) -> Option<ServicePoint> {
    let record = records.first()?;
    let ip = record.ip_addresses.first().map(String::as_str).unwrap_or("");
    let port = record.proto_port.get("http").copied().unwrap_or(0);
    Some(ServicePoint {
        provider_name: record.system_name.clone(),
        service_definition: record.service_definition.clone(),
        details: record.details.clone(),
        serv_location: format!(
            "http://{}:{}/{}/{}",
            ip, port, record.system_name, record.sub_path
        ),
        serv_node: record.service_node.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record(name: &str, ip: &str, port: u16, sub_path: &str) -> ServiceRecord {
        ServiceRecord {
            service_definition: "temperature".to_string(),
            system_name: name.to_string(),
            service_node: "node".to_string(),
            sub_path: sub_path.to_string(),
            ip_addresses: vec![ip.to_string()],
            proto_port: BTreeMap::from([("http".to_string(), port)]),
            ..Default::default()
        }
    }

    // ==================== Selection ====================

    #[test]
    fn test_select_service_takes_first_record() {
        let records = vec![
            record("sensor1", "10.0.0.1", 8081, "temp"),
            record("sensor2", "10.0.0.2", 8082, "temp"),
        ];
        let point = select_service(&records).unwrap();
        assert_eq!(point.provider_name, "sensor1");
        assert_eq!(point.serv_location, "http://10.0.0.1:8081/sensor1/temp");
        assert_eq!(point.service_definition, "temperature");
    }

    #[test]
    fn test_select_service_on_empty_list() {
        assert!(select_service(&[]).is_none());
    }

    // ==================== Errors ====================

    #[test]
    fn test_no_such_service_names_the_definition() {
        let err = ResolveError::NoSuchService("temperature".to_string());
        let msg = err.to_string();
        assert!(msg.contains("unable to locate"));
        assert!(msg.contains("temperature"));
    }

    #[tokio::test]
    async fn test_resolver_without_registrars() {
        let resolver = Resolver::new(Vec::new());
        let err = resolver.query(&ServiceQuest::default()).await.unwrap_err();
        assert!(matches!(err, ResolveError::NoRegistrar));
    }
}
