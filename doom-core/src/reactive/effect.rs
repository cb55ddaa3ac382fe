//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever the
//! signals it read on its last run change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies (and initial output, e.g. a rendered node).
//!
//! 2. When any dependency changes, the effect is queued and re-runs once per
//!    flush, no matter how many of its dependencies changed. A write the
//!    effect makes to a signal it depends on does not recurse: the effect
//!    runs once more after the current run.
//!
//! 3. Each run records a fresh dependency set and replaces the old one, so
//!    branches not taken stop triggering re-runs.
//!
//! # Lifetime
//!
//! Effects are fire-and-forget: the thread's runtime keeps them alive.
//! Dropping the returned [`Effect`] does nothing; call [`Effect::dispose`]
//! to stop one.

use std::convert::Infallible;
use std::sync::Arc;

use super::scope::{Body, Scope};
use super::runtime::Reactive;
use super::subscriber::SubscriberId;
use crate::error::{BoxError, Result};
use crate::graph::NodeId;

/// Handle to a side-effecting computation.
///
/// # Example
///
/// ```rust
/// use doom_core::reactive::{Effect, Signal};
///
/// let count = Signal::new(0);
///
/// let reader = count.clone();
/// let effect = Effect::new(move || {
///     println!("Count is: {}", reader.get());
/// })
/// .unwrap();
///
/// count.set(5).unwrap(); // Prints: "Count is: 5"
/// assert_eq!(effect.run_count(), 2);
/// ```
#[derive(Clone)]
pub struct Effect {
    scope: Arc<Scope>,
}

impl Effect {
    /// Create an effect and run it once.
    pub fn new<F>(run: F) -> Result<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::try_new(move || {
            run();
            Ok::<(), Infallible>(())
        })
    }

    /// Create an effect whose body can fail.
    ///
    /// A failing run is reported as
    /// [`BodyExecutionFailure`](crate::ReactiveError::BodyExecutionFailure)
    /// to whoever triggered it, and the effect keeps the dependencies of
    /// its last successful run. If the very first run fails, no effect is
    /// created.
    ///
    /// An error can also come from the flush that follows the first run,
    /// when the body wrote signals that other scopes (or the effect itself)
    /// depend on. The effect is disposed in that case too.
    pub fn try_new<F, E>(run: F) -> Result<Self>
    where
        F: Fn() -> std::result::Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let body: Body = Box::new(move || run().map_err(Into::<BoxError>::into));
        let scope = Scope::new(SubscriberId::new(), body, None);
        scope.start()?;
        Ok(Self { scope })
    }

    /// Get the subscriber ID for this effect.
    pub fn id(&self) -> SubscriberId {
        self.scope.id()
    }

    /// Number of successful runs, the creation run included.
    pub fn run_count(&self) -> usize {
        self.scope.run_count()
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.scope.dependency_count()
    }

    /// IDs of the signals read on the last successful run.
    pub fn dependencies(&self) -> Vec<NodeId> {
        self.scope.dependency_ids()
    }

    pub fn depends_on(&self, signal: NodeId) -> bool {
        self.scope.depends_on(signal)
    }

    /// Whether the effect is queued for a re-run.
    pub fn is_pending(&self) -> bool {
        self.scope.is_pending()
    }

    /// Stop the effect: it unsubscribes from everything and never runs
    /// again.
    pub fn dispose(&self) {
        self.scope.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.scope.is_disposed()
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Create an effect. See [`Effect::new`].
pub fn create_effect<F>(body: F) -> Result<Effect>
where
    F: Fn() + Send + Sync + 'static,
{
    Effect::new(body)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;
    use crate::reactive::{Runtime, Signal};
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn effect_runs_on_creation() {
        let run_count = Arc::new(AtomicI32::new(0));
        let run_count_clone = run_count.clone();

        let effect = Effect::new(move || {
            run_count_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        assert_eq!(run_count.load(Ordering::SeqCst), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_when_dependency_changes() {
        let signal = Signal::new(0);
        let seen = Arc::new(AtomicI32::new(-1));

        let reader = signal.clone();
        let seen_clone = seen.clone();
        let effect = Effect::new(move || {
            seen_clone.store(reader.get(), Ordering::SeqCst);
        })
        .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert!(effect.depends_on(signal.id()));

        signal.set(42).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 42);
        assert_eq!(effect.run_count(), 2);
        assert!(!effect.is_pending());
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let signal = Signal::new(0);
        let run_count = Arc::new(AtomicI32::new(0));

        let reader = signal.clone();
        let run_count_clone = run_count.clone();
        let effect = Effect::new(move || {
            reader.get();
            run_count_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        effect.dispose();
        assert!(effect.is_disposed());
        assert_eq!(signal.subscriber_count(), 0);
        assert!(!Runtime::is_registered(effect.id()));

        signal.set(1).unwrap();
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_first_run_creates_nothing() {
        let signal = Signal::new(0);

        let reader = signal.clone();
        let err = Effect::try_new(move || {
            reader.get();
            Err("boom")
        })
        .unwrap_err();

        assert!(matches!(err, ReactiveError::BodyExecutionFailure { .. }));
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn effect_clone_shares_state() {
        let effect1 = Effect::new(|| {}).unwrap();
        let effect2 = effect1.clone();

        assert_eq!(effect1.id(), effect2.id());
        assert_eq!(effect2.run_count(), 1);

        effect1.dispose();
        assert!(effect2.is_disposed());
    }
}
