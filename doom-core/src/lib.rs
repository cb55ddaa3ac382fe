//! Doom Core
//!
//! This crate provides the reactive state engine behind doom. It
//! implements:
//!
//! - Reactive primitives (signals, effects, derives)
//! - Automatic, per-run dependency tracking
//! - A glitch-free propagation scheduler with optional batching
//!
//! Tree construction and child reconciliation are left to callers; they
//! consume the engine through reads, writes and effects.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Reactive primitives, dependency tracking and the runtime
//! - `graph`: Signal nodes and the update scheduler
//! - `error`: Error taxonomy shared by every fallible operation
//!
//! # Example
//!
//! ```rust
//! use doom_core::{create_derive, create_effect, create_signal};
//!
//! let (count, set_count) = create_signal(0);
//!
//! let source = count.clone();
//! let doubled = create_derive(0, move |_| source.get() * 2)?;
//!
//! let (read_count, read_doubled) = (count.clone(), doubled.clone());
//! create_effect(move || {
//!     println!("Count: {}, Doubled: {}", read_count.get(), read_doubled.get());
//! })?;
//!
//! // The effect runs once, after the derive, and prints "Count: 5, Doubled: 10"
//! set_count.set(5)?;
//! assert_eq!(doubled.get(), 10);
//! # Ok::<(), doom_core::ReactiveError>(())
//! ```

pub mod error;
pub mod graph;
pub mod reactive;

pub use error::{BoxError, ReactiveError, Result};
pub use reactive::{
    batch, create_derive, create_effect, create_signal, untrack, Derive, Effect, ReadSignal,
    Runtime, RuntimeConfig, Signal, WriteSignal,
};
