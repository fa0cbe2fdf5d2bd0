//! Version-tagged wire forms
//!
//! Every JSON body in the local cloud carries a `"version"` string naming its
//! form (e.g. `"ServiceRecord_v1"`). The forms are modeled as one internally
//! tagged enum so that decoding dispatches on the tag in a single place and
//! unknown tags are rejected up front.

mod message;
mod quest;
mod record;
mod signal;

pub use message::{MessageLevel, MessengerRegistration, SystemMessage};
pub use quest::{ServicePoint, ServiceQuest};
pub use record::{ServiceRecord, ServiceRecordList, SystemRecordList};
pub use signal::SignalA;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum Form {
    #[serde(rename = "ServiceRecord_v1")]
    ServiceRecord(ServiceRecord),
    #[serde(rename = "ServiceQuest_v1")]
    ServiceQuest(ServiceQuest),
    #[serde(rename = "ServiceRecordList_v1")]
    ServiceRecordList(ServiceRecordList),
    #[serde(rename = "ServicePoint_v1")]
    ServicePoint(ServicePoint),
    #[serde(rename = "SystemMessage_v1")]
    SystemMessage(SystemMessage),
    #[serde(rename = "MessengerRegistration_v1")]
    MessengerRegistration(MessengerRegistration),
    #[serde(rename = "SystemRecordList_v1")]
    SystemRecordList(SystemRecordList),
    #[serde(rename = "SignalA_v1a")]
    SignalA(SignalA),
}

impl Form {
    /// The wire tag this form carries.
    pub fn tag(&self) -> &'static str {
        match self {
            Form::ServiceRecord(_) => "ServiceRecord_v1",
            Form::ServiceQuest(_) => "ServiceQuest_v1",
            Form::ServiceRecordList(_) => "ServiceRecordList_v1",
            Form::ServicePoint(_) => "ServicePoint_v1",
            Form::SystemMessage(_) => "SystemMessage_v1",
            Form::MessengerRegistration(_) => "MessengerRegistration_v1",
            Form::SystemRecordList(_) => "SystemRecordList_v1",
            Form::SignalA(_) => "SignalA_v1a",
        }
    }
}

/// Serialize a form to its JSON wire shape.
pub fn pack(form: &Form) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(form)
}

/// Decode a JSON body into a form, dispatching on the `"version"` tag.
/// Unknown tags and malformed bodies fail here.
pub fn unpack(bytes: &[u8]) -> Result<Form, serde_json::Error> {
    serde_json::from_slice(bytes)
}
