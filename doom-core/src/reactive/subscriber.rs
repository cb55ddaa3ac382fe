//! Subscriber identity for the reactive system.
//!
//! A subscriber is any reactive scope that depends on signals: an effect or
//! the recomputation half of a derive. Signals store subscribers by id only.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a subscriber.
///
/// Scopes take an ID at creation and keep it for life. IDs increase
/// monotonically, so they also order scopes by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn subscriber_ids_are_unique() {
        let ids: HashSet<SubscriberId> = (0..64).map(|_| SubscriberId::new()).collect();
        assert_eq!(ids.len(), 64);
    }

    #[test]
    fn subscriber_ids_are_monotonic() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        assert!(id1 < id2);
        assert_eq!(id1.to_string(), format!("scope#{}", id1.raw()));
    }
}
