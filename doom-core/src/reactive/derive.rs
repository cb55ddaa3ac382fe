//! Derive Implementation
//!
//! A Derive is a readable value computed by folding a reducer over its own
//! previous output. It pairs an owned signal (the output) with a scope (the
//! recomputation):
//!
//! - The scope reads the previous output untracked, calls the reducer and
//!   writes the result into the output.
//! - Signals the reducer reads become dependencies of the scope, so the
//!   derive recomputes eagerly whenever one of them changes.
//! - Scopes reading the output depend on the derive exactly as they would on
//!   a plain signal. The output is ranked one above the derive's own inputs,
//!   so a flush refreshes it before they run.
//!
//! Only the recomputation scope can write the output; callers only ever get
//! a [`ReadSignal`]. The output write also never re-queues the derive
//! itself, even if the reducer reads its own output.
//!
//! If the reducer fails, the output keeps the value of the last successful
//! run.

use std::convert::Infallible;
use std::fmt::Debug;
use std::sync::Arc;

use super::runtime::Reactive;
use super::scope::{Body, Scope};
use super::signal::{ReadSignal, Signal};
use super::subscriber::SubscriberId;
use crate::error::{BoxError, Result};
use crate::graph::NodeId;

/// A computed value folded from its previous output.
///
/// # Example
///
/// ```rust
/// use doom_core::reactive::{Derive, Signal};
///
/// let count = Signal::new(0);
///
/// let source = count.clone();
/// let history = Derive::new(Vec::new(), move |mut previous: Vec<i32>| {
///     previous.insert(0, source.get());
///     previous
/// })
/// .unwrap();
///
/// count.set(1).unwrap();
/// assert_eq!(history.get(), vec![1, 0]);
/// ```
pub struct Derive<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    output: ReadSignal<T>,
    scope: Arc<Scope>,
}

impl<T> Derive<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a derive seeded with `initial` and run the reducer once.
    pub fn new<F>(initial: T, reducer: F) -> Result<Self>
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        Self::try_new(initial, move |previous| Ok::<T, Infallible>(reducer(previous)))
    }

    /// Create a derive whose reducer can fail.
    ///
    /// If the first run or the flush after it fails, the derive is disposed
    /// and the error returned.
    pub fn try_new<F, E>(initial: T, reducer: F) -> Result<Self>
    where
        F: Fn(T) -> std::result::Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let id = SubscriberId::new();
        let output = Signal::owned_by(initial, id);

        let writer = output.clone();
        let body: Body = Box::new(move || -> std::result::Result<(), BoxError> {
            let previous = writer.get_untracked();
            let next = reducer(previous).map_err(Into::<BoxError>::into)?;
            writer.set(next)?;
            Ok(())
        });

        let scope = Scope::new(id, body, Some(Arc::clone(output.node())));
        scope.start()?;

        Ok(Self {
            output: output.read_only(),
            scope,
        })
    }

    /// Tracked read of the current output.
    pub fn get(&self) -> T {
        self.output.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.output.with(f)
    }

    pub fn get_untracked(&self) -> T {
        self.output.get_untracked()
    }

    /// ID of the output signal.
    pub fn id(&self) -> NodeId {
        self.output.id()
    }

    /// ID of the recomputation scope.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.scope.id()
    }

    /// A read handle to the output.
    pub fn read_signal(&self) -> ReadSignal<T> {
        self.output.clone()
    }

    pub fn into_read_signal(self) -> ReadSignal<T> {
        self.output
    }

    /// Number of successful recomputations, the initial one included.
    pub fn run_count(&self) -> usize {
        self.scope.run_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.scope.dependency_count()
    }

    /// Rank of the output in the flush order.
    pub fn height(&self) -> u32 {
        self.output.node().height()
    }

    /// Stop recomputing. The output keeps its last value.
    pub fn dispose(&self) {
        self.scope.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.scope.is_disposed()
    }

    pub fn is_pending(&self) -> bool {
        self.scope.is_pending()
    }
}

impl<T> Clone for Derive<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            output: self.output.clone(),
            scope: Arc::clone(&self.scope),
        }
    }
}

impl<T> Debug for Derive<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Derive")
            .field("id", &self.id())
            .field("value", &self.get_untracked())
            .field("run_count", &self.run_count())
            .field("height", &self.height())
            .finish()
    }
}

/// Create a derive and return only its read handle.
pub fn create_derive<T, F>(initial: T, reducer: F) -> Result<ReadSignal<T>>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn(T) -> T + Send + Sync + 'static,
{
    Derive::new(initial, reducer).map(Derive::into_read_signal)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn derive_computes_on_creation() {
        let signal = Signal::new(21);
        let source = signal.clone();
        let doubled = Derive::new(0, move |_| source.get() * 2).unwrap();

        assert_eq!(doubled.get(), 42);
        assert_eq!(doubled.run_count(), 1);
        assert_eq!(doubled.dependency_count(), 1);
    }

    #[test]
    fn derive_recomputes_once_per_write() {
        let signal = Signal::new(1);
        let calls = Arc::new(AtomicI32::new(0));

        let source = signal.clone();
        let calls_clone = calls.clone();
        let derive = Derive::new(0, move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            source.get() + 1
        })
        .unwrap();

        signal.set(5).unwrap();
        assert_eq!(derive.get(), 6);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn derive_reducer_sees_previous_output() {
        let signal = Signal::new(1);
        let source = signal.clone();
        let sum = Derive::new(0, move |previous| previous + source.get()).unwrap();

        signal.set(2).unwrap();
        signal.set(3).unwrap();
        assert_eq!(sum.get(), 6);
    }

    #[test]
    fn derive_output_ranks_above_inputs() {
        let signal = Signal::new(1);
        let source = signal.clone();
        let first = Derive::new(0, move |_| source.get()).unwrap();

        let upstream = first.read_signal();
        let second = Derive::new(0, move |_| upstream.get()).unwrap();

        assert_eq!(first.height(), 1);
        assert_eq!(second.height(), 2);
    }

    #[test]
    fn failing_reducer_keeps_last_output() {
        let signal = Signal::new(1);
        let source = signal.clone();
        let derive = Derive::try_new(0, move |_| {
            let value = source.get();
            if value < 0 {
                return Err(format!("negative input {value}"));
            }
            Ok(value * 10)
        })
        .unwrap();

        assert!(signal.set(-1).is_err());
        assert_eq!(derive.get(), 10);

        signal.set(2).unwrap();
        assert_eq!(derive.get(), 20);
    }

    #[test]
    fn disposed_derive_freezes() {
        let signal = Signal::new(1);
        let source = signal.clone();
        let derive = Derive::new(0, move |_| source.get()).unwrap();

        derive.dispose();
        signal.set(9).unwrap();
        assert_eq!(derive.get(), 1);
        assert!(derive.is_disposed());
    }

    #[test]
    fn effect_reads_derive_output() {
        let signal = Signal::new(2);
        let source = signal.clone();
        let squared = create_derive(0, move |_| {
            let v = source.get();
            v * v
        })
        .unwrap();

        let seen = Arc::new(AtomicI32::new(0));
        let seen_clone = seen.clone();
        let reader = squared.clone();
        Effect::new(move || seen_clone.store(reader.get(), Ordering::SeqCst)).unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 4);
        signal.set(3).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 9);
    }
}
