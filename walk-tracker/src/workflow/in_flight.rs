//! Per-checkpoint in-flight task tracking
//!
//! At most one task per checkpoint id per stage. Each launch gets a fresh
//! ticket; a completion is applied only if its ticket still matches, so a
//! result from a task that was cancelled and superseded is dropped.

use std::collections::HashMap;
use tokio::task::AbortHandle;
use uuid::Uuid;

/// Identifies one launch of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

#[derive(Debug, Default)]
pub struct InFlightTasks {
    tasks: HashMap<Uuid, (Ticket, AbortHandle)>,
    next_ticket: u64,
}

impl InFlightTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn issue_ticket(&mut self) -> Ticket {
        self.next_ticket += 1;
        Ticket(self.next_ticket)
    }

    /// Record a launched task. Any task already tracked for `id` is aborted.
    pub fn register(&mut self, id: Uuid, ticket: Ticket, handle: AbortHandle) {
        if let Some((_, previous)) = self.tasks.insert(id, (ticket, handle)) {
            previous.abort();
        }
    }

    /// Mark the task for `id` finished. Returns false when `ticket` is not
    /// the current one, in which case the result must be discarded.
    pub fn complete(&mut self, id: Uuid, ticket: Ticket) -> bool {
        match self.tasks.get(&id) {
            Some((current, _)) if *current == ticket => {
                self.tasks.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Abort every tracked task, returning how many were aborted
    pub fn cancel_all(&mut self) -> usize {
        let count = self.tasks.len();
        for (_, (_, handle)) in self.tasks.drain() {
            handle.abort();
        }
        count
    }
}
