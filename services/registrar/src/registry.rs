//! Registry actor owning the service table
//!
//! All reads and writes of the table pass through a single-consumer command
//! channel. The consumer task owns the table and the expiration scheduler
//! exclusively and fully processes each command before the next, so an add
//! and its timer arming (or a delete and its timer cancel) are atomic
//! without any locking around the table itself.

use std::collections::HashMap;
use std::time::Duration;

use canopy::{ServiceQuest, ServiceRecord};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::scheduler::Scheduler;

/// How long a caller waits for the actor's reply before giving up.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("record {id} conflicts with an existing registration")]
    Conflict { id: u64 },
    #[error("registry is shut down")]
    Closed,
    #[error("registry did not reply in time")]
    Timeout,
}

enum Command {
    Add {
        record: ServiceRecord,
        reply: oneshot::Sender<Result<ServiceRecord, RegistryError>>,
    },
    Read {
        quest: Option<ServiceQuest>,
        reply: oneshot::Sender<Result<Vec<ServiceRecord>, RegistryError>>,
    },
    Delete {
        id: u64,
        reply: oneshot::Sender<Result<(), RegistryError>>,
    },
    /// Sent by expiration timers; carries no reply.
    Expire { id: u64 },
}

/// Clone-able handle submitting commands to the registry actor.
#[derive(Clone)]
pub struct Registry {
    tx: mpsc::UnboundedSender<Command>,
}

impl Registry {
    /// Spawn the actor task and return a handle to it. The actor exits when
    /// `cancel` fires, stopping all armed timers on the way out.
    pub fn spawn(cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = Actor {
            table: HashMap::new(),
            scheduler: Scheduler::new(),
            rec_count: 1,
            expire_tx: tx.clone(),
        };
        let task = tokio::spawn(actor.run(rx, cancel));
        (Self { tx }, task)
    }

    /// Insert a new record or renew an existing one. Returns the record as
    /// stored, with its assigned id and registry-stamped timestamps.
    pub async fn add(&self, record: ServiceRecord) -> Result<ServiceRecord, RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Add { record, reply }, rx).await
    }

    /// Snapshot the table, optionally filtered by a quest, in id order.
    pub async fn read(
        &self,
        quest: Option<ServiceQuest>,
    ) -> Result<Vec<ServiceRecord>, RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Read { quest, reply }, rx).await
    }

    /// Remove a record and disarm its timer. Unknown ids are a no-op.
    pub async fn delete(&self, id: u64) -> Result<(), RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Delete { id, reply }, rx).await
    }

    async fn submit<T>(
        &self,
        command: Command,
        rx: oneshot::Receiver<Result<T, RegistryError>>,
    ) -> Result<T, RegistryError> {
        self.tx.send(command).map_err(|_| RegistryError::Closed)?;
        match tokio::time::timeout(REPLY_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RegistryError::Closed),
            Err(_) => Err(RegistryError::Timeout),
        }
    }
}

struct Actor {
    table: HashMap<u64, ServiceRecord>,
    scheduler: Scheduler,
    /// Lowest id the free-id scan starts from; ids are reused after deletion.
    rec_count: u64,
    expire_tx: mpsc::UnboundedSender<Command>,
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = cancel.cancelled() => break,
            }
        }
        let stopped = self.scheduler.stop();
        debug!(stopped, "registry actor stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Add { record, reply } => {
                let _ = reply.send(self.add(record));
            }
            Command::Read { quest, reply } => {
                let _ = reply.send(Ok(self.read(quest.as_ref())));
            }
            Command::Delete { id, reply } => {
                self.delete(id);
                let _ = reply.send(Ok(()));
            }
            Command::Expire { id } => self.expire(id),
        }
    }

    fn add(&mut self, mut record: ServiceRecord) -> Result<ServiceRecord, RegistryError> {
        let now = Utc::now();

        let stored = match self.table.get(&record.id) {
            Some(existing) => {
                // Renewal: the identity fields must match what was stored.
                if existing.system_name != record.system_name
                    || existing.service_definition != record.service_definition
                    || existing.sub_path != record.sub_path
                    || existing.created != record.created
                {
                    warn!(
                        id = record.id,
                        definition = %record.service_definition,
                        "refusing renewal with mismatching identity"
                    );
                    return Err(RegistryError::Conflict { id: record.id });
                }
                let mut renewed = existing.clone();
                renewed.updated = Some(now);
                renewed.end_of_validity = Some(now + chrono::Duration::seconds(renewed.reg_life));
                self.table.insert(renewed.id, renewed.clone());
                debug!(id = renewed.id, definition = %renewed.service_definition, "renewed service");
                renewed
            }
            None => {
                record.id = self.next_free_id();
                record.created.get_or_insert(now);
                record.updated = Some(now);
                record.end_of_validity = Some(now + chrono::Duration::seconds(record.reg_life));
                self.table.insert(record.id, record.clone());
                info!(id = record.id, definition = %record.service_definition, "registered service");
                record
            }
        };

        if let Some(deadline) = stored.end_of_validity {
            self.arm(stored.id, deadline);
        }
        Ok(stored)
    }

    /// Scan upward from `rec_count` for the first unused id. Deleted ids are
    /// reused, keeping the id space compact; clients treat ids as opaque.
    fn next_free_id(&self) -> u64 {
        let mut id = self.rec_count.max(1);
        while self.table.contains_key(&id) {
            id += 1;
        }
        id
    }

    fn arm(&self, id: u64, deadline: DateTime<Utc>) {
        let tx = self.expire_tx.clone();
        self.scheduler.add_task(
            deadline,
            move || {
                let _ = tx.send(Command::Expire { id });
            },
            id,
        );
    }

    fn read(&self, quest: Option<&ServiceQuest>) -> Vec<ServiceRecord> {
        let mut records: Vec<ServiceRecord> = match quest {
            Some(quest) => self
                .table
                .values()
                .filter(|record| matches_quest(record, quest))
                .cloned()
                .collect(),
            None => self.table.values().cloned().collect(),
        };
        records.sort_by_key(|record| record.id);
        records
    }

    fn delete(&mut self, id: u64) {
        self.scheduler.remove_task(id);
        if self.table.remove(&id).is_some() {
            info!(id, "unregistered service");
        }
    }

    /// A timer fired for `id`. Remove the record only if it is still past its
    /// end of validity; a renewal may have raced the timer.
    fn expire(&mut self, id: u64) {
        let Some(record) = self.table.get(&id) else {
            return;
        };
        match record.end_of_validity {
            Some(end) if end <= Utc::now() => {
                self.table.remove(&id);
                info!(id, "service registration expired");
            }
            _ => {}
        }
    }
}

/// True iff the record satisfies the quest: equal service definition (when
/// the quest names one), and every quest detail key present in the record
/// with at least one value in common.
fn matches_quest(record: &ServiceRecord, quest: &ServiceQuest) -> bool {
    if !quest.service_definition.is_empty()
        && record.service_definition != quest.service_definition
    {
        return false;
    }
    quest.details.iter().all(|(key, wanted)| {
        record.details.get(key).is_some_and(|have| {
            wanted.is_empty() || wanted.iter().any(|value| have.contains(value))
        })
    })
}
