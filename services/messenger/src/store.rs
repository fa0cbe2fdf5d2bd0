//! Per-system bounded message log

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use canopy::{MessageLevel, SystemMessage};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Each system keeps only its most recent messages; older ones fall off.
pub const MAX_MESSAGES: usize = 10;

#[derive(Debug, Clone)]
pub struct Message {
    pub time: DateTime<Utc>,
    pub level: MessageLevel,
    pub system: String,
    pub body: String,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {}: {}",
            self.system,
            self.time.format("%Y-%m-%d %H:%M:%S"),
            self.level.as_str(),
            self.body
        )
    }
}

/// Views computed from one snapshot of the log.
pub struct LogViews {
    /// Most recent error per system.
    pub errors: BTreeMap<String, Message>,
    /// Most recent warning per system.
    pub warnings: BTreeMap<String, Message>,
    /// Every retained message, newest first.
    pub all: Vec<Message>,
}

#[derive(Default)]
pub struct MessageStore {
    messages: RwLock<HashMap<String, VecDeque<Message>>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to its system's ring, stamping the arrival time, and
    /// drop the oldest entry once the ring exceeds [`MAX_MESSAGES`].
    pub async fn add(&self, msg: SystemMessage) {
        let mut messages = self.messages.write().await;
        let ring = messages.entry(msg.system.clone()).or_default();
        ring.push_back(Message {
            time: Utc::now(),
            level: msg.level,
            system: msg.system,
            body: msg.body,
        });
        if ring.len() > MAX_MESSAGES {
            ring.pop_front();
        }
    }

    /// The retained messages for one system, oldest first.
    pub async fn system_log(&self, system: &str) -> Vec<Message> {
        let messages = self.messages.read().await;
        messages
            .get(system)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Compute the dashboard views from one snapshot under the read lock.
    /// Rings are chronological, so the last error/warning seen per system is
    /// the most recent one.
    pub async fn filter_logs(&self) -> LogViews {
        let mut errors = BTreeMap::new();
        let mut warnings = BTreeMap::new();
        let mut all = Vec::new();
        {
            let messages = self.messages.read().await;
            for (system, ring) in messages.iter() {
                for msg in ring {
                    all.push(msg.clone());
                    match msg.level {
                        MessageLevel::Error => {
                            errors.insert(system.clone(), msg.clone());
                        }
                        MessageLevel::Warn => {
                            warnings.insert(system.clone(), msg.clone());
                        }
                        _ => {}
                    }
                }
            }
        }
        all.sort_by(|a, b| b.time.cmp(&a.time));
        LogViews {
            errors,
            warnings,
            all,
        }
    }
}
