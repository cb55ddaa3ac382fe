//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which scopes depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read inside a running scope, the read is recorded in
//!    that scope's tracking frame. The scope subscribes once its run
//!    succeeds.
//!
//! 2. When a signal is written with a value that differs from the current
//!    one, every subscriber is queued and the runtime flushes.
//!
//! 3. Writes compare values with `PartialEq`. Writing an equal value is a
//!    no-op. [`Signal::update`] always notifies, so a container edited in
//!    place is never mistaken for an unchanged value.
//!
//! # Memory Layout
//!
//! Each signal consists of:
//! - A type-erased [`SignalNode`] (ID, height, subscriber IDs)
//! - The value behind an `RwLock`
//!
//! Both are shared, so clones of a handle observe the same cell.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, trace};

use super::context::ReactiveContext;
use super::runtime::Runtime;
use super::SubscriberId;
use crate::error::{ReactiveError, Result};
use crate::graph::{NodeId, SignalNode};

/// A reactive signal holding a value of type T.
///
/// # Type Parameters
///
/// - `T`: The type of value stored in the signal. `PartialEq` decides
///   whether a write is a change.
///
/// # Example
///
/// ```rust
/// use doom_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies subscribers)
/// count.set(5).unwrap();
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    node: Arc<SignalNode>,
    value: Arc<RwLock<T>>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self::with_node(value, SignalNode::source())
    }

    /// Create a signal that only `owner` may write.
    pub(crate) fn owned_by(value: T, owner: SubscriberId) -> Self {
        Self::with_node(value, SignalNode::derived(owner))
    }

    fn with_node(value: T, node: SignalNode) -> Self {
        Self {
            node: Arc::new(node),
            value: Arc::new(RwLock::new(value)),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    pub(crate) fn node(&self) -> &Arc<SignalNode> {
        &self.node
    }

    /// Get the current value.
    ///
    /// If called within a running scope, this also records the signal as a
    /// dependency of that scope.
    pub fn get(&self) -> T {
        self.track();
        self.value.read().clone()
    }

    /// Borrow the current value, tracking the read like [`Signal::get`].
    ///
    /// The value stays locked while `f` runs; `f` must not write this
    /// signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.value.read())
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.value.read().clone()
    }

    fn track(&self) {
        if ReactiveContext::track_dependency(&self.node) {
            trace!(
                signal = ?self.node.id(),
                scope = ?ReactiveContext::current_subscriber(),
                "dependency recorded"
            );
        }
    }

    /// Set a new value and propagate the change.
    ///
    /// Equal values are ignored. Otherwise every subscriber re-runs before
    /// this returns, unless a flush or [`crate::batch`] is already in
    /// progress. Errors from those runs are returned here.
    pub fn set(&self, value: T) -> Result<()> {
        self.check_writer()?;

        {
            let mut guard = self.value.write();
            if *guard == value {
                trace!(signal = ?self.node.id(), "write of equal value ignored");
                return Ok(());
            }
            *guard = value;
        }

        Runtime::notify_signal_change(&self.node)
    }

    /// Mutate a copy of the value, store it and propagate unconditionally.
    ///
    /// The lock is not held while `f` runs, so `f` may read this signal; it
    /// sees the value from before the update.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut T),
    {
        self.check_writer()?;

        let mut next = self.value.read().clone();
        f(&mut next);
        *self.value.write() = next;

        Runtime::notify_signal_change(&self.node)
    }

    /// Owned signals accept writes only from their owning scope.
    fn check_writer(&self) -> Result<()> {
        let Some(owner) = self.node.owner() else {
            return Ok(());
        };

        let writer = ReactiveContext::running_scope();
        if writer == Some(owner) {
            return Ok(());
        }

        error!(
            signal = ?self.node.id(),
            owner = %owner,
            writer = ?writer,
            "write to an owned signal from outside its owner"
        );
        Err(ReactiveError::TrackingViolation {
            signal: self.node.id(),
            owner,
            writer,
        })
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.node.subscriber_count()
    }

    /// A read-only handle to the same cell.
    pub fn read_only(&self) -> ReadSignal<T> {
        ReadSignal { inner: self.clone() }
    }

    /// A write-only handle to the same cell.
    pub fn write_only(&self) -> WriteSignal<T> {
        WriteSignal { inner: self.clone() }
    }

    /// Split into read and write handles.
    pub fn split(self) -> (ReadSignal<T>, WriteSignal<T>) {
        (self.read_only(), WriteSignal { inner: self })
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            value: Arc::clone(&self.value),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id())
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Read half of a signal. This is also what a derive hands out, so its
/// output cannot be written by callers.
pub struct ReadSignal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Signal<T>,
}

impl<T> ReadSignal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Tracked read. See [`Signal::get`].
    pub fn get(&self) -> T {
        self.inner.get()
    }

    /// Tracked borrow. See [`Signal::with`].
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.with(f)
    }

    pub fn get_untracked(&self) -> T {
        self.inner.get_untracked()
    }

    pub fn id(&self) -> NodeId {
        self.inner.id()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }

    pub(crate) fn node(&self) -> &Arc<SignalNode> {
        self.inner.node()
    }
}

impl<T> Clone for ReadSignal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Debug for ReadSignal<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ReadSignal").field(&self.inner).finish()
    }
}

/// Write half of a signal.
pub struct WriteSignal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Signal<T>,
}

impl<T> WriteSignal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// See [`Signal::set`].
    pub fn set(&self, value: T) -> Result<()> {
        self.inner.set(value)
    }

    /// See [`Signal::update`].
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut T),
    {
        self.inner.update(f)
    }

    pub fn id(&self) -> NodeId {
        self.inner.id()
    }
}

impl<T> Clone for WriteSignal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Debug for WriteSignal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteSignal").field("id", &self.id()).finish()
    }
}

/// Create a signal and return its read and write halves.
pub fn create_signal<T>(initial: T) -> (ReadSignal<T>, WriteSignal<T>)
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    Signal::new(initial).split()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
