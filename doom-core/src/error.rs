//! Error Types
//!
//! Every fallible engine operation returns [`ReactiveError`]. Errors are
//! surfaced synchronously to whoever performed the write (or created the
//! scope) that led to them; the engine never retries a failed run.

use thiserror::Error;

use crate::graph::NodeId;
use crate::reactive::SubscriberId;

/// Boxed error produced by a fallible effect body or derive reducer.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the reactive engine.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A signal owned by a derive was written from outside that derive's
    /// recomputation. Only the owning scope may write its output.
    #[error("signal {signal:?} is owned by scope {owner:?} and cannot be written from {writer:?}")]
    TrackingViolation {
        signal: NodeId,
        owner: SubscriberId,
        writer: Option<SubscriberId>,
    },

    /// A scope's body returned an error. The scope keeps the subscriptions
    /// of its last successful run.
    #[error("scope {scope:?} failed: {source}")]
    BodyExecutionFailure {
        scope: SubscriberId,
        #[source]
        source: BoxError,
    },

    /// A flush ran more scopes than the configured limit. This happens when
    /// scopes keep writing signals they (transitively) depend on.
    #[error("flush exceeded {limit} scope runs, last scheduled scope {scope:?}; dependency cycle suspected")]
    CyclicDependencyStall { scope: SubscriberId, limit: usize },
}

impl ReactiveError {
    /// The scope the error is attributed to, if any.
    pub fn scope(&self) -> Option<SubscriberId> {
        match self {
            Self::TrackingViolation { writer, .. } => *writer,
            Self::BodyExecutionFailure { scope, .. } | Self::CyclicDependencyStall { scope, .. } => {
                Some(*scope)
            }
        }
    }
}

/// Convenience alias used across the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn errors_report_their_scope() {
        let scope = SubscriberId::new();

        let failure = ReactiveError::BodyExecutionFailure {
            scope,
            source: "bad input".into(),
        };
        assert_eq!(failure.scope(), Some(scope));
        assert_eq!(failure.source().map(|s| s.to_string()), Some("bad input".to_string()));

        let violation = ReactiveError::TrackingViolation {
            signal: NodeId::new(),
            owner: scope,
            writer: None,
        };
        assert_eq!(violation.scope(), None);
    }

    #[test]
    fn stall_message_names_the_limit() {
        let err = ReactiveError::CyclicDependencyStall {
            scope: SubscriberId::new(),
            limit: 42,
        };
        assert!(err.to_string().contains("42 scope runs"));
    }
}
