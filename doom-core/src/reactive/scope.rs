//! Reactive Scope
//!
//! A scope is the re-runnable unit behind both effects and derives. Each run
//! follows the same protocol:
//!
//! 1. Push a tracking frame and run the body.
//! 2. Pop the frame, collecting every signal the body read.
//! 3. On success, diff the new set against the old one: unsubscribe from
//!    signals no longer read, subscribe to newly read ones. The old set stays
//!    in place until the new one is known, so a signal read on both runs is
//!    never dropped in between.
//!
//! A failed run commits nothing. The scope keeps the subscriptions of its
//! last successful run, so it will be retried the next time one of those
//! signals changes. This favors availability over precision: the body may
//! have read different signals before failing, and those reads are lost.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, trace_span};

use super::context::{Dependencies, ReactiveContext};
use super::runtime::{Reactive, Runtime};
use super::subscriber::SubscriberId;
use crate::error::{BoxError, ReactiveError, Result};
use crate::graph::{NodeId, SignalNode};

pub(crate) type Body = Box<dyn Fn() -> std::result::Result<(), BoxError> + Send + Sync>;

pub(crate) struct Scope {
    id: SubscriberId,
    body: Body,

    /// Signals read on the last successful run.
    dependencies: Mutex<Dependencies>,

    /// Output node of a derive; inherits this scope's height.
    output: Option<Arc<SignalNode>>,

    height: AtomicU32,
    pending: AtomicBool,
    running: AtomicBool,
    disposed: AtomicBool,
    run_count: AtomicUsize,
}

impl Scope {
    pub(crate) fn new(id: SubscriberId, body: Body, output: Option<Arc<SignalNode>>) -> Arc<Self> {
        Arc::new(Self {
            id,
            body,
            dependencies: Mutex::new(Dependencies::new()),
            output,
            height: AtomicU32::new(0),
            pending: AtomicBool::new(false),
            running: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        })
    }

    /// Run the scope for the first time and hand it to the runtime.
    ///
    /// The run is wrapped in a batch, so writes made by the body are
    /// flushed only after the scope has committed its subscriptions. On any
    /// error, from the body or from that flush, the scope is disposed: the
    /// caller gets no handle to it.
    pub(crate) fn start(self: &Arc<Self>) -> Result<()> {
        let (ran, flushed) = Runtime::batch_with(|| {
            let ran = self.run_tracked();
            if ran.is_ok() && !self.is_disposed() {
                Runtime::register(self.clone());
                self.reschedule_if_pending();
            } else {
                self.clear_pending();
            }
            ran
        });

        let outcome = match (ran, flushed) {
            (Err(err), Err(flush_err)) => {
                debug!(scope = %self.id, error = %flush_err, "flush after failed creation also failed");
                Err(err)
            }
            (ran, flushed) => ran.and(flushed),
        };
        if outcome.is_err() {
            self.dispose();
        }
        outcome
    }

    /// One run of the body. A trigger coalesced while it was running
    /// queues the scope again once it has finished.
    fn execute(&self) -> Result<()> {
        let outcome = self.run_tracked();
        self.reschedule_if_pending();
        outcome
    }

    fn reschedule_if_pending(&self) {
        if self.is_pending() && !self.is_disposed() {
            Runtime::schedule(self.id);
        }
    }

    /// One tracked run of the body, committing its reads on success.
    fn run_tracked(&self) -> Result<()> {
        let span = trace_span!("scope_run", scope = %self.id);
        let _entered = span.enter();

        let _running = RunningGuard::enter(&self.running);
        self.pending.store(false, Ordering::SeqCst);

        let ctx = ReactiveContext::enter(self.id);
        let outcome = (self.body)();
        let rerun = ctx.rerun_requested();
        let dependencies = ctx.finish();

        match outcome {
            Ok(()) if self.is_disposed() => {
                trace!(scope = %self.id, "scope disposed during its run; nothing committed");
                Ok(())
            }
            Ok(()) => {
                self.commit(dependencies);
                self.run_count.fetch_add(1, Ordering::SeqCst);
                if rerun {
                    self.mark_pending();
                }
                Ok(())
            }
            Err(source) => {
                debug!(scope = %self.id, error = %source, "scope body failed; keeping previous subscriptions");
                Err(ReactiveError::BodyExecutionFailure {
                    scope: self.id,
                    source,
                })
            }
        }
    }

    fn commit(&self, next: Dependencies) {
        let mut current = self.dependencies.lock();

        for (id, node) in current.iter() {
            if !next.contains_key(id) {
                node.unsubscribe(self.id);
                trace!(scope = %self.id, signal = ?id, "dependency dropped");
            }
        }
        for (id, node) in next.iter() {
            if !current.contains_key(id) {
                node.subscribe(self.id);
                trace!(scope = %self.id, signal = ?id, "dependency added");
            }
        }

        // A derive that reads its own output must not rank itself above it.
        let height = next
            .values()
            .filter(|node| node.owner() != Some(self.id))
            .map(|node| node.height() + 1)
            .max()
            .unwrap_or(0);
        self.height.store(height, Ordering::Relaxed);
        if let Some(output) = &self.output {
            output.set_height(height);
        }

        *current = next;
    }

    /// Unsubscribe from everything and leave the runtime.
    pub(crate) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        for node in self.dependencies.lock().drain(..).map(|(_, node)| node) {
            node.unsubscribe(self.id);
        }
        Runtime::unregister(self.id);
        debug!(scope = %self.id, "scope disposed");
    }

    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn run_count(&self) -> usize {
        self.run_count.load(Ordering::SeqCst)
    }

    pub(crate) fn dependency_ids(&self) -> Vec<NodeId> {
        self.dependencies.lock().keys().copied().collect()
    }

    pub(crate) fn dependency_count(&self) -> usize {
        self.dependencies.lock().len()
    }

    pub(crate) fn depends_on(&self, node: NodeId) -> bool {
        self.dependencies.lock().contains_key(&node)
    }
}

impl Reactive for Scope {
    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    fn height(&self) -> u32 {
        self.height.load(Ordering::Relaxed)
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
        self.running.load(Ordering::SeqCst)
    }

    fn run(&self) -> Result<()> {
        if self.is_disposed() {
            self.clear_pending();
            return Ok(());
        }
        if self.is_running() {
            // Stays pending; the scheduler picks it up after the current run.
            self.mark_pending();
            debug!(scope = %self.id, "re-entrant run suppressed");
            return Ok(());
        }
        self.execute()
    }
}

/// Holds a scope's `running` flag for the duration of a run, unwinding
/// included.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
