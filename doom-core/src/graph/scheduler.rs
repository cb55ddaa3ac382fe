//! Update Scheduler
//!
//! The scheduler holds the scopes waiting to re-run and decides which one
//! runs next. It ensures upstream scopes run before downstream ones where it
//! can tell them apart.
//!
//! # Algorithm
//!
//! 1. A signal write enqueues every subscriber scope. The queue is keyed by
//!    scope ID, so a scope reached through two paths (a diamond) is queued
//!    once.
//! 2. The runtime pops scopes one at a time until the queue is empty. A
//!    popped scope may enqueue more scopes; they join the same flush.
//! 3. Pop order is lowest height first, then insertion order. A scope's
//!    height is one more than the highest signal it read on its last run,
//!    so derives run before the effects reading them.
//!
//! Heights come from the previous run. When a flush changes the topology,
//! the order is an approximation: every pending scope still runs, but a
//! scope may observe a dependency that has not yet been refreshed in that
//! flush.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::reactive::{Reactive, SubscriberId};

/// Flush state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    /// No flush in progress.
    Idle,

    /// Draining the queue.
    Flushing,
}

/// Pending scope queue with set semantics.
pub struct UpdateScheduler {
    pending: IndexMap<SubscriberId, Arc<dyn Reactive>>,
    state: FlushState,
}

impl UpdateScheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self {
            pending: IndexMap::new(),
            state: FlushState::Idle,
        }
    }

    pub fn state(&self) -> FlushState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == FlushState::Idle
    }

    /// Idle -> Flushing. Returns false if a flush is already running.
    pub fn begin_flush(&mut self) -> bool {
        if self.state == FlushState::Flushing {
            return false;
        }
        self.state = FlushState::Flushing;
        true
    }

    /// Flushing -> Idle.
    pub fn end_flush(&mut self) {
        self.state = FlushState::Idle;
    }

    /// Queue a scope. Returns false if it was already queued.
    pub fn enqueue(&mut self, scope: Arc<dyn Reactive>) -> bool {
        let id = scope.subscriber_id();
        if self.pending.contains_key(&id) {
            return false;
        }
        scope.mark_pending();
        self.pending.insert(id, scope);
        true
    }

    /// Remove the next scope to run: lowest height, earliest insertion.
    pub fn pop_next(&mut self) -> Option<Arc<dyn Reactive>> {
        let index = self
            .pending
            .values()
            .enumerate()
            .min_by_key(|(index, scope)| (scope.height(), *index))
            .map(|(index, _)| index)?;

        self.pending.shift_remove_index(index).map(|(_, scope)| scope)
    }

    /// Drop a scope from the queue without running it.
    pub fn remove(&mut self, id: SubscriberId) -> Option<Arc<dyn Reactive>> {
        let scope = self.pending.shift_remove(&id)?;
        scope.clear_pending();
        Some(scope)
    }

    /// Drop every queued scope. Used when a flush is aborted.
    pub fn clear(&mut self) -> Vec<Arc<dyn Reactive>> {
        self.pending
            .drain(..)
            .map(|(_, scope)| {
                scope.clear_pending();
                scope
            })
            .collect()
    }

    pub fn is_queued(&self, id: SubscriberId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Number of queued scopes.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new()
    }
}
