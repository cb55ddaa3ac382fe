//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, effects
//! and derives. It owns every live scope and drives the flush that re-runs
//! them when signals change.
//!
//! # How It Works
//!
//! 1. When a scope finishes its first run, it registers with the runtime.
//!    Signals only store scope IDs; the runtime resolves them.
//!
//! 2. When a signal's value changes, the runtime:
//!    a. Looks up each subscriber other than the scope doing the write
//!    b. Marks it pending and queues it with the [`UpdateScheduler`]
//!    c. Flags the writing scope for one more run if it depends on the
//!       signal, unless the signal is its own derive output
//!    d. Starts a flush, unless one is running or a batch is open
//!
//! 3. The flush runs queued scopes one at a time until the queue is empty.
//!    Writes made by those runs join the same flush.
//!
//! # Threading
//!
//! All runtime state is thread-local. A write only reaches scopes
//! registered on the thread performing it, so reactive graphs must be
//! confined to one thread or serialized by the caller.

use std::cell::RefCell;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, error, trace, warn};

use super::context::ReactiveContext;
use super::subscriber::SubscriberId;
use crate::error::{ReactiveError, Result};
use crate::graph::{SignalNode, UpdateScheduler};

/// Default cap on scope runs within a single flush.
pub const DEFAULT_MAX_FLUSH_RUNS: usize = 10_000;

/// A re-runnable unit the scheduler can drive.
pub trait Reactive: Send + Sync {
    /// Get the subscriber ID for this reactive scope.
    fn subscriber_id(&self) -> SubscriberId;

    /// Rank used to order a flush, upstream first.
    fn height(&self) -> u32;

    /// Flag the scope as waiting for a run.
    fn mark_pending(&self);

    /// Clear the pending flag without running.
    fn clear_pending(&self);

    fn is_pending(&self) -> bool;

    /// Whether the scope's body is currently on the stack.
    fn is_running(&self) -> bool;

    /// Re-run the scope.
    fn run(&self) -> Result<()>;
}

/// Per-thread runtime settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Scope runs allowed in one flush before it is aborted with
    /// [`ReactiveError::CyclicDependencyStall`].
    pub max_flush_runs: usize,
}

impl RuntimeConfig {
    pub fn with_max_flush_runs(mut self, max_flush_runs: usize) -> Self {
        self.max_flush_runs = max_flush_runs;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_runs: DEFAULT_MAX_FLUSH_RUNS,
        }
    }
}

thread_local! {
    static RUNTIME: RefCell<Runtime> = RefCell::new(Runtime::new());
}

/// The thread-local reactive runtime.
///
/// All access goes through associated functions; the state itself is never
/// borrowed while a scope body runs.
pub struct Runtime {
    scopes: IndexMap<SubscriberId, Arc<dyn Reactive>>,
    scheduler: UpdateScheduler,
    batch_depth: usize,
    config: RuntimeConfig,
}

impl Runtime {
    fn new() -> Self {
        Self {
            scopes: IndexMap::new(),
            scheduler: UpdateScheduler::new(),
            batch_depth: 0,
            config: RuntimeConfig::default(),
        }
    }

    fn with<R>(f: impl FnOnce(&mut Runtime) -> R) -> R {
        RUNTIME.with(|runtime| f(&mut runtime.borrow_mut()))
    }

    /// Replace this thread's configuration.
    pub fn configure(config: RuntimeConfig) {
        debug!(?config, "runtime configured");
        Self::with(|rt| rt.config = config);
    }

    /// This thread's configuration.
    pub fn config() -> RuntimeConfig {
        Self::with(|rt| rt.config)
    }

    /// Take ownership of a scope so signals can reach it by ID.
    pub fn register(reactive: Arc<dyn Reactive>) {
        let id = reactive.subscriber_id();
        trace!(scope = %id, "scope registered");
        Self::with(|rt| rt.scopes.insert(id, reactive));
    }

    /// Release a scope. It is also dropped from the pending queue.
    pub fn unregister(id: SubscriberId) -> Option<Arc<dyn Reactive>> {
        Self::with(|rt| {
            rt.scheduler.remove(id);
            rt.scopes.shift_remove(&id)
        })
    }

    pub fn is_registered(id: SubscriberId) -> bool {
        Self::with(|rt| rt.scopes.contains_key(&id))
    }

    /// Number of live scopes on this thread.
    pub fn scope_count() -> usize {
        Self::with(|rt| rt.scopes.len())
    }

    /// Queue a registered scope for a re-run.
    ///
    /// Returns false if the scope is unknown or already queued.
    pub fn schedule(id: SubscriberId) -> bool {
        Self::with(|rt| {
            let Some(scope) = rt.scopes.get(&id).cloned() else {
                trace!(scope = %id, "skipping unregistered subscriber");
                return false;
            };
            if scope.is_running() {
                debug!(scope = %id, "re-entrant trigger coalesced into a later run");
            }
            rt.scheduler.enqueue(scope)
        })
    }

    /// Queue every subscriber of a changed signal and flush if nothing else
    /// is driving propagation.
    ///
    /// A derive writing its own output never re-triggers itself. Any other
    /// scope writing a signal it depends on is not queued while running; it
    /// runs again once the current run has finished.
    pub fn notify_signal_change(node: &SignalNode) -> Result<()> {
        let writer = ReactiveContext::running_scope();
        let owned_by_writer = writer.is_some() && node.owner() == writer;

        let subscribers = node.snapshot();
        let mut self_triggered = false;
        let mut scheduled = 0usize;

        for id in subscribers {
            if Some(id) == writer {
                self_triggered = !owned_by_writer;
                continue;
            }
            if Self::schedule(id) {
                scheduled += 1;
            }
        }

        // Reads from the current run are not subscribed yet.
        if !owned_by_writer && !self_triggered {
            self_triggered = ReactiveContext::running_scope_reads(node.id());
        }

        if owned_by_writer {
            trace!(signal = ?node.id(), "self-write suppressed");
        } else if self_triggered {
            if let Some(id) = ReactiveContext::request_rerun() {
                debug!(scope = %id, signal = ?node.id(), "re-entrant trigger coalesced into a later run");
            }
        }

        trace!(signal = ?node.id(), scheduled, "signal change queued");

        if scheduled == 0 {
            return Ok(());
        }
        Self::flush_if_idle()
    }

    /// Flush the queue unless a flush is in progress or a batch is open.
    pub fn flush_if_idle() -> Result<()> {
        let ready = Self::with(|rt| rt.batch_depth == 0 && rt.scheduler.is_idle());
        if ready {
            Self::flush()
        } else {
            Ok(())
        }
    }

    fn flush() -> Result<()> {
        if !Self::with(|rt| rt.scheduler.begin_flush()) {
            return Ok(());
        }
        let _flushing = FlushGuard;

        let limit = Self::config().max_flush_runs;
        let mut runs = 0usize;
        let mut failure: Option<ReactiveError> = None;

        debug!(pending = Self::pending_count(), "flush started");

        while let Some(scope) = Self::with(|rt| rt.scheduler.pop_next()) {
            let id = scope.subscriber_id();

            if runs >= limit {
                scope.clear_pending();
                let dropped = Self::with(|rt| rt.scheduler.clear()).len();
                error!(scope = %id, limit, dropped, "flush aborted: dependency cycle suspected");
                return Err(ReactiveError::CyclicDependencyStall { scope: id, limit });
            }
            runs += 1;

            if let Err(err) = scope.run() {
                if failure.is_none() {
                    failure = Some(err);
                } else {
                    warn!(scope = %id, error = %err, "additional scope failure in flush");
                }
            }
        }

        debug!(runs, failed = failure.is_some(), "flush completed");
        failure.map_or(Ok(()), Err)
    }

    /// Run `f` with flushing deferred until the outermost batch closes.
    pub fn batch<R>(f: impl FnOnce() -> R) -> Result<R> {
        let (value, flushed) = Self::batch_with(f);
        flushed.map(|()| value)
    }

    /// Like [`Runtime::batch`], but hands back `f`'s value even when the
    /// closing flush fails.
    pub(crate) fn batch_with<R>(f: impl FnOnce() -> R) -> (R, Result<()>) {
        let value = {
            let _batch = BatchGuard::enter();
            f()
        };
        (value, Self::flush_if_idle())
    }

    pub fn is_batching() -> bool {
        Self::with(|rt| rt.batch_depth > 0)
    }

    pub fn is_flushing() -> bool {
        Self::with(|rt| !rt.scheduler.is_idle())
    }

    /// Number of scopes waiting in the queue.
    pub fn pending_count() -> usize {
        Self::with(|rt| rt.scheduler.pending_count())
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if reads are currently being tracked.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }
}

/// Returns the scheduler to Idle; on unwind, also drops whatever was queued.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let panicking = std::thread::panicking();
        let dropped = Runtime::with(|rt| {
            rt.scheduler.end_flush();
            if panicking {
                rt.scheduler.clear()
            } else {
                Vec::new()
            }
        });
        if panicking {
            warn!(dropped = dropped.len(), "flush unwound by a panicking scope");
        }
    }
}

struct BatchGuard;

impl BatchGuard {
    fn enter() -> Self {
        Runtime::with(|rt| rt.batch_depth += 1);
        Self
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        Runtime::with(|rt| rt.batch_depth = rt.batch_depth.saturating_sub(1));
    }
}

/// Apply several writes as one update: subscribers run once, after `f`
/// returns, against the final values.
pub fn batch<R>(f: impl FnOnce() -> R) -> Result<R> {
    Runtime::batch(f)
}

/// Run `f` without recording any signal reads in the current scope.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _untracked = ReactiveContext::untracked();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

    struct MockReactive {
        id: SubscriberId,
        height: u32,
        pending: AtomicBool,
        runs: AtomicI32,
        fail: bool,
        reschedule_self: bool,
    }

    impl MockReactive {
        fn new(height: u32) -> Arc<Self> {
            Self::build(height, false, false)
        }

        fn build(height: u32, fail: bool, reschedule_self: bool) -> Arc<Self> {
            let reactive = Arc::new(Self {
                id: SubscriberId::new(),
                height,
                pending: AtomicBool::new(false),
                runs: AtomicI32::new(0),
                fail,
                reschedule_self,
            });
            Runtime::register(reactive.clone());
            reactive
        }

        fn runs(&self) -> i32 {
            self.runs.load(Ordering::SeqCst)
        }
    }

    impl Reactive for MockReactive {
        fn subscriber_id(&self) -> SubscriberId {
            self.id
        }

        fn height(&self) -> u32 {
            self.height
        }

        fn mark_pending(&self) {
            self.pending.store(true, Ordering::SeqCst);
        }

        fn clear_pending(&self) {
            self.pending.store(false, Ordering::SeqCst);
        }

        fn is_pending(&self) -> bool {
            self.pending.load(Ordering::SeqCst)
        }

        fn is_running(&self) -> bool {
            false
        }

        fn run(&self) -> Result<()> {
            self.clear_pending();
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.reschedule_self {
                Runtime::schedule(self.id);
            }
            if self.fail {
                return Err(ReactiveError::BodyExecutionFailure {
                    scope: self.id,
                    source: "mock failure".into(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn runtime_registers_and_unregisters() {
        let reactive = MockReactive::new(0);
        assert!(Runtime::is_registered(reactive.id));

        assert!(Runtime::unregister(reactive.id).is_some());
        assert!(!Runtime::is_registered(reactive.id));
        assert!(!Runtime::schedule(reactive.id));
    }

    #[test]
    fn runtime_notifies_subscribers_once() {
        let a = MockReactive::new(1);
        let b = MockReactive::new(1);
        let node = SignalNode::source();
        node.subscribe(a.id);
        node.subscribe(b.id);

        Runtime::notify_signal_change(&node).unwrap();

        assert_eq!(a.runs(), 1);
        assert_eq!(b.runs(), 1);
        assert!(!a.is_pending());
        assert!(!Runtime::is_flushing());
    }

    #[test]
    fn batch_defers_flush() {
        let a = MockReactive::new(1);
        let node = SignalNode::source();
        node.subscribe(a.id);

        let value = Runtime::batch(|| {
            Runtime::notify_signal_change(&node).unwrap();
            Runtime::notify_signal_change(&node).unwrap();
            assert!(Runtime::is_batching());
            assert_eq!(a.runs(), 0);
            7
        })
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(a.runs(), 1);
        assert!(!Runtime::is_batching());
    }

    #[test]
    fn failing_scope_does_not_stop_the_flush() {
        let failing = MockReactive::build(1, true, false);
        let healthy = MockReactive::new(1);
        let node = SignalNode::source();
        node.subscribe(failing.id);
        node.subscribe(healthy.id);

        let err = Runtime::notify_signal_change(&node).unwrap_err();

        assert!(matches!(err, ReactiveError::BodyExecutionFailure { scope, .. } if scope == failing.id));
        assert_eq!(healthy.runs(), 1);
    }

    #[test]
    fn runaway_flush_is_stopped() {
        Runtime::configure(RuntimeConfig::default().with_max_flush_runs(25));
        let looping = MockReactive::build(0, false, true);
        let node = SignalNode::source();
        node.subscribe(looping.id);

        let err = Runtime::notify_signal_change(&node).unwrap_err();
        Runtime::configure(RuntimeConfig::default());

        assert!(matches!(err, ReactiveError::CyclicDependencyStall { limit: 25, .. }));
        assert_eq!(looping.runs(), 25);
        assert_eq!(Runtime::pending_count(), 0);
        assert!(!looping.is_pending());
        assert!(!Runtime::is_flushing());
    }

    #[test]
    fn untrack_hides_reads() {
        let id = SubscriberId::new();
        let ctx = ReactiveContext::enter(id);
        assert!(Runtime::is_tracking());

        untrack(|| {
            assert!(!Runtime::is_tracking());
            assert_eq!(Runtime::current_subscriber(), None);
        });

        assert_eq!(Runtime::current_subscriber(), Some(id));
        drop(ctx);
    }
}
