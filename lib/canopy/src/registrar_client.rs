//! Registrar API client for registration, discovery, and leader probing.

use std::time::Duration;

use crate::error::CanopyError;
use crate::forms::{pack, unpack, Form, ServiceQuest, ServiceRecord};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Client for one registrar replica's HTTP surface.
#[derive(Clone)]
pub struct RegistrarClient {
    client: reqwest::Client,
    base_url: String,
}

impl RegistrarClient {
    /// Create a client for the registrar at `base_url` (the URL up to and
    /// including the registrar's system name).
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// True iff this replica currently answers 200 on `/status`, i.e. leads.
    pub async fn is_leading(&self) -> Result<bool, CanopyError> {
        let response = self
            .client
            .get(format!("{}/status", self.base_url))
            .send()
            .await?;

        Ok(response.status().is_success())
    }

    /// Register a service record, or renew it when it carries a live id.
    /// Returns the record as stored, with registry-stamped fields.
    pub async fn register(&self, record: ServiceRecord) -> Result<ServiceRecord, CanopyError> {
        let body = pack(&Form::ServiceRecord(record))?;
        let response = self
            .client
            .post(format!("{}/register", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(CanopyError::Registrar { status, message });
        }

        match unpack(&response.bytes().await?)? {
            Form::ServiceRecord(stored) => Ok(stored),
            other => Err(CanopyError::UnexpectedForm {
                expected: "ServiceRecord_v1",
                got: other.tag(),
            }),
        }
    }

    /// Unregister a record by id. Unknown ids are a no-op on the registrar.
    pub async fn unregister(&self, id: u64) -> Result<(), CanopyError> {
        let response = self
            .client
            .delete(format!("{}/unregister/{}", self.base_url, id))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            Err(CanopyError::Registrar { status, message })
        }
    }

    /// Run a filtered discovery query. The returned list may be empty.
    pub async fn query(&self, quest: &ServiceQuest) -> Result<Vec<ServiceRecord>, CanopyError> {
        let body = pack(&Form::ServiceQuest(quest.clone()))?;
        let response = self
            .client
            .post(format!("{}/query", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(CanopyError::Registrar { status, message });
        }

        match unpack(&response.bytes().await?)? {
            Form::ServiceRecordList(list) => Ok(list.list),
            other => Err(CanopyError::UnexpectedForm {
                expected: "ServiceRecordList_v1",
                got: other.tag(),
            }),
        }
    }

    /// Fetch the unique base URLs of all known provider systems.
    pub async fn syslist(&self) -> Result<Vec<String>, CanopyError> {
        let response = self
            .client
            .get(format!("{}/syslist", self.base_url))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(CanopyError::Registrar { status, message });
        }

        match unpack(&response.bytes().await?)? {
            Form::SystemRecordList(list) => Ok(list.system_urls),
            other => Err(CanopyError::UnexpectedForm {
                expected: "SystemRecordList_v1",
                got: other.tag(),
            }),
        }
    }
}

/// Probe the configured registrar replicas in order and return the first one
/// answering 200 on `/status`. Unreachable and standby replicas are skipped.
pub async fn find_leading_registrar(registrar_urls: &[String]) -> Option<String> {
    for url in registrar_urls {
        match RegistrarClient::new(url).is_leading().await {
            Ok(true) => return Some(url.clone()),
            Ok(false) | Err(_) => continue,
        }
    }
    None
}
