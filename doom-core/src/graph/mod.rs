//! Dependency Graph
//!
//! This module holds the graph side of the engine: the type-erased signal
//! nodes scopes subscribe to, and the scheduler that drains pending scopes.
//!
//! # Overview
//!
//! - Nodes are signals. Each node keeps the set of scopes subscribed to it.
//! - Scopes are the other end of each edge. A scope keeps the nodes it read
//!   on its last successful run and replaces that set wholesale after every
//!   run.
//!
//! When a signal changes, its subscribers are queued in the
//! [`UpdateScheduler`] and the runtime drains the queue, lowest height first.

mod node;
mod scheduler;

pub use node::{NodeId, NodeKind, SignalNode, SubscriberSnapshot};
pub use scheduler::{FlushState, UpdateScheduler};
