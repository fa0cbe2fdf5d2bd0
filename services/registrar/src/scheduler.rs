//! One-shot expiration timers
//!
//! A set of timers keyed by record id. Adding a task for an id that already
//! has one replaces the old timer; a fired task drops its own map entry, so a
//! later add for the same id behaves like a fresh insert. Jobs run outside
//! the lock and may call back into the scheduler.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

struct Task {
    generation: u64,
    handle: JoinHandle<()>,
}

struct State {
    tasks: HashMap<u64, Task>,
    next_generation: u64,
}

#[derive(Clone)]
pub struct Scheduler {
    state: Arc<Mutex<State>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                tasks: HashMap::new(),
                next_generation: 0,
            })),
        }
    }

    /// Arm a one-shot timer that runs `job` once `deadline` has passed,
    /// replacing any timer already armed for `id`. Callers promise not to
    /// pass deadlines in the past; a past deadline makes the job run
    /// promptly rather than fail.
    pub fn add_task<F>(&self, deadline: DateTime<Utc>, job: F, id: u64)
    where
        F: FnOnce() + Send + 'static,
    {
        let wait = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = state.next_generation;
        state.next_generation += 1;

        let shared = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            // Drop this task's own entry before running the job, so the job
            // may re-add under the same id. A replacement under the same id
            // carries a newer generation and is left alone.
            {
                let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
                if state
                    .tasks
                    .get(&id)
                    .is_some_and(|t| t.generation == generation)
                {
                    state.tasks.remove(&id);
                }
            }
            job();
        });

        if let Some(old) = state.tasks.insert(id, Task { generation, handle }) {
            old.handle.abort();
        }
    }

    /// Stop and forget the timer for `id`. True iff one was armed. If its
    /// job has already begun it still runs to completion.
    pub fn remove_task(&self, id: u64) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.tasks.remove(&id) {
            Some(task) => {
                task.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Stop all timers, clear the map, and return how many were stopped.
    pub fn stop(&self) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let count = state.tasks.len();
        for (_, task) in state.tasks.drain() {
            task.handle.abort();
        }
        count
    }
}
