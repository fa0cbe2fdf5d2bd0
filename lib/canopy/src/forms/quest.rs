//! Discovery requests and their answers

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A discovery request: the desired service definition, an optional protocol
/// preference, and an optional details filter. Empty fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceQuest {
    pub sys_id: u64,
    pub requester_name: String,
    pub service_definition: String,
    pub protocol: String,
    pub details: BTreeMap<String, Vec<String>>,
}

/// A single selected provider, reduced to a URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServicePoint {
    pub provider_name: String,
    pub service_definition: String,
    pub details: BTreeMap<String, Vec<String>>,
    pub serv_location: String,
    pub serv_node: String,
}
