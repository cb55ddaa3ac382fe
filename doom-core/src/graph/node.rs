//! Graph Nodes
//!
//! This module defines the type-erased half of a signal: the part of the
//! dependency graph that scopes subscribe to, independent of the value type.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use indexmap::IndexSet;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::reactive::SubscriberId;

/// Unique identifier for a signal node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// The kind of signal node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A primary signal written by external callers. Height is always 0.
    Source,

    /// The output of a derive. Only its owning scope writes it, and it
    /// inherits that scope's height.
    Derived,
}

/// Snapshot of a node's subscribers, taken before notifying so no lock is
/// held while scopes run.
pub type SubscriberSnapshot = SmallVec<[SubscriberId; 8]>;

/// A signal's position in the dependency graph.
///
/// Subscribers are stored by id only; the runtime owns the scopes
/// themselves. The set is insertion ordered so notification order is
/// deterministic.
#[derive(Debug)]
pub struct SignalNode {
    id: NodeId,
    kind: NodeKind,
    owner: Option<SubscriberId>,
    height: AtomicU32,
    subscribers: Mutex<IndexSet<SubscriberId>>,
}

impl SignalNode {
    /// Create a source node.
    pub fn source() -> Self {
        Self {
            id: NodeId::new(),
            kind: NodeKind::Source,
            owner: None,
            height: AtomicU32::new(0),
            subscribers: Mutex::new(IndexSet::new()),
        }
    }

    /// Create a node written exclusively by `owner`.
    pub fn derived(owner: SubscriberId) -> Self {
        Self {
            id: NodeId::new(),
            kind: NodeKind::Derived,
            owner: Some(owner),
            height: AtomicU32::new(0),
            subscribers: Mutex::new(IndexSet::new()),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// The scope allowed to write this node, for derived nodes.
    pub fn owner(&self) -> Option<SubscriberId> {
        self.owner
    }

    /// Rank used by the scheduler to run upstream scopes first.
    pub fn height(&self) -> u32 {
        self.height.load(Ordering::Relaxed)
    }

    /// Update the rank of a derived node. Source nodes stay at 0.
    pub fn set_height(&self, height: u32) {
        if self.kind == NodeKind::Derived {
            self.height.store(height, Ordering::Relaxed);
        }
    }

    /// Add a subscriber. Returns false if it was already present.
    pub fn subscribe(&self, subscriber: SubscriberId) -> bool {
        self.subscribers.lock().insert(subscriber)
    }

    /// Remove a subscriber. Returns false if it was not present.
    pub fn unsubscribe(&self, subscriber: SubscriberId) -> bool {
        self.subscribers.lock().shift_remove(&subscriber)
    }

    pub fn is_subscribed(&self, subscriber: SubscriberId) -> bool {
        self.subscribers.lock().contains(&subscriber)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Copy the current subscribers out of the lock.
    pub fn snapshot(&self) -> SubscriberSnapshot {
        self.subscribers.lock().iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn source_node_has_no_owner() {
        let node = SignalNode::source();
        assert_eq!(node.kind(), NodeKind::Source);
        assert!(node.owner().is_none());
        assert_eq!(node.height(), 0);
    }

    #[test]
    fn source_height_is_pinned() {
        let node = SignalNode::source();
        node.set_height(4);
        assert_eq!(node.height(), 0);

        let derived = SignalNode::derived(SubscriberId::new());
        derived.set_height(4);
        assert_eq!(derived.height(), 4);
    }

    #[test]
    fn subscriber_membership_is_a_set() {
        let node = SignalNode::source();
        let a = SubscriberId::new();
        let b = SubscriberId::new();

        assert!(node.subscribe(a));
        assert!(!node.subscribe(a));
        assert!(node.subscribe(b));
        assert_eq!(node.subscriber_count(), 2);
        assert_eq!(node.snapshot().as_slice(), &[a, b]);

        assert!(node.unsubscribe(a));
        assert!(!node.unsubscribe(a));
        assert!(!node.is_subscribed(a));
        assert!(node.is_subscribed(b));
    }
}
