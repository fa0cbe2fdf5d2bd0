//! Service records and derived lists

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One service offered by one provider, as stored by the registry.
///
/// `created`, `updated` and `endOfValidity` are stamped by the registry and
/// travel as RFC3339 timestamps on the wire. `(systemName, subPath,
/// serviceDefinition, created)` is the record's immutable identity: a renewal
/// that disagrees with any of them is refused. An `id` of 0 means the record
/// has not been assigned one yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceRecord {
    pub id: u64,
    pub service_definition: String,
    pub system_name: String,
    pub service_node: String,
    pub sub_path: String,
    pub ip_addresses: Vec<String>,
    pub proto_port: BTreeMap<String, u16>,
    pub details: BTreeMap<String, Vec<String>>,
    pub certificate: String,
    /// Requested lifetime in seconds.
    pub reg_life: i64,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub end_of_validity: Option<DateTime<Utc>>,
    pub subscribe_able: bool,
    pub a_cost: f64,
    pub c_unit: String,
}

impl ServiceRecord {
    /// Base URL of the providing system, preferring http over https.
    /// Returns `None` when neither protocol has a port configured.
    pub fn system_url(&self) -> Option<String> {
        let ip = self.ip_addresses.first()?;
        for scheme in ["http", "https"] {
            match self.proto_port.get(scheme) {
                Some(port) if *port > 0 => {
                    return Some(format!("{}://{}:{}/{}", scheme, ip, port, self.system_name));
                }
                _ => {}
            }
        }
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceRecordList {
    pub list: Vec<ServiceRecord>,
}

/// Unique base URLs of all known provider systems.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemRecordList {
    #[serde(rename = "systemurl")]
    pub system_urls: Vec<String>,
}
