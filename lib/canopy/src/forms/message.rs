//! Log messages and the messenger's self-announcement

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl MessageLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageLevel::Debug => "DEBUG",
            MessageLevel::Info => "INFO",
            MessageLevel::Warn => "WARN",
            MessageLevel::Error => "ERROR",
        }
    }
}

/// A short log event shipped from one system to the messenger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemMessage {
    pub level: MessageLevel,
    pub system: String,
    pub body: String,
}

/// The messenger's beacon payload: where to ship logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessengerRegistration {
    pub url: String,
}
