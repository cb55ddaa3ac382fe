//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, effects and
//! derives, plus the runtime that propagates changes between them.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal is read inside
//! a running scope (an effect or a derive), the scope records it as a
//! dependency. When the signal is written with a different value, every
//! dependent scope re-runs.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs once on creation and
//! again whenever its dependencies change. Effects synchronize reactive
//! state with the outside world: patching a node tree, logging, and so on.
//!
//! ## Derives
//!
//! A Derive is a readable value recomputed by a reducer over its previous
//! output. It is eager: it recomputes as soon as an input changes, and its
//! output can be read and tracked like any signal.
//!
//! # Propagation
//!
//! Writes queue subscribers with the scheduler; the runtime then flushes,
//! running each queued scope once, upstream first. An unbatched write has
//! fully propagated when it returns. [`batch`] defers the flush to the end
//! of a closure so several writes produce one update.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to detect
//! dependencies automatically. Each scope run pushes a frame, reads land in
//! the top frame, and the scope replaces its subscriptions with that set
//! when the run succeeds.

mod context;
mod derive;
mod effect;
mod runtime;
mod scope;
mod signal;
mod subscriber;

pub use context::{Dependencies, ReactiveContext};
pub use derive::{create_derive, Derive};
pub use effect::{create_effect, Effect};
pub use runtime::{batch, untrack, Reactive, Runtime, RuntimeConfig, DEFAULT_MAX_FLUSH_RUNS};
pub use signal::{create_signal, ReadSignal, Signal, WriteSignal};
pub use subscriber::SubscriberId;
