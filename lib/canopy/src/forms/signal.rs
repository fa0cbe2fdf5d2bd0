//! Plain measurement signal
//!
//! Device-side systems exchange their readings in this form. The core never
//! interprets it, but the decoder must know the tag, and it doubles as the
//! canonical known-tag-wrong-kind rejection case in tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignalA {
    pub value: f64,
    pub unit: String,
    pub timestamp: Option<DateTime<Utc>>,
}
