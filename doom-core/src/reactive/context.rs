//! Reactive Context
//!
//! The reactive context tracks which scope is currently running. This
//! enables automatic dependency tracking: when a signal is read, it is
//! recorded in the frame of the innermost running scope.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Running a scope pushes a tracking
//! frame; the returned guard pops it, either explicitly through
//! [`ReactiveContext::finish`] (which hands back the collected dependencies)
//! or on drop, which also covers unwinding out of a panicking body.
//!
//! Only the top frame accepts registrations. An untracked frame on top
//! (see [`crate::untrack`]) shadows the scope below it, so reads inside it
//! create no edges.

use std::cell::RefCell;
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::SubscriberId;
use crate::graph::{NodeId, SignalNode};

/// Signals read during one scope run, deduplicated, in first-read order.
pub type Dependencies = IndexMap<NodeId, Arc<SignalNode>>;

thread_local! {
    static CONTEXT_STACK: RefCell<SmallVec<[Frame; 4]>> = RefCell::new(SmallVec::new());
}

/// An entry in the reactive context stack.
#[derive(Debug)]
struct Frame {
    /// The scope whose run pushed this frame; `None` for untracked frames.
    subscriber_id: Option<SubscriberId>,
    dependencies: Dependencies,
    /// Set when the scope wrote a signal it depends on during this run.
    rerun: bool,
}

/// Guard that pops its frame when finished or dropped.
#[must_use = "dropping the context immediately ends tracking"]
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
    popped: bool,
}

impl ReactiveContext {
    /// Enter a tracking frame for the given subscriber.
    pub fn enter(subscriber_id: SubscriberId) -> Self {
        Self::push(Some(subscriber_id))
    }

    /// Enter a frame that records nothing.
    pub fn untracked() -> Self {
        Self::push(None)
    }

    fn push(subscriber_id: Option<SubscriberId>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(Frame {
                subscriber_id,
                dependencies: Dependencies::new(),
                rerun: false,
            });
        });

        Self {
            subscriber_id,
            popped: false,
        }
    }

    /// Pop the frame and return the dependencies it collected.
    pub fn finish(mut self) -> Dependencies {
        self.popped = true;
        self.pop().map(|frame| frame.dependencies).unwrap_or_default()
    }

    fn pop(&self) -> Option<Frame> {
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());

        if let Some(frame) = &popped {
            debug_assert_eq!(
                frame.subscriber_id, self.subscriber_id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.subscriber_id, frame.subscriber_id
            );
        }
        popped
    }

    /// Check if the top frame is recording reads.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// The subscriber of the top frame, if it is tracking.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|frame| frame.subscriber_id))
    }

    /// The innermost running scope, looking through untracked frames.
    pub fn running_scope() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .rev()
                .find_map(|frame| frame.subscriber_id)
        })
    }

    /// Whether the innermost running scope has read `node` in this run.
    pub fn running_scope_reads(node: NodeId) -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .rev()
                .find(|frame| frame.subscriber_id.is_some())
                .is_some_and(|frame| frame.dependencies.contains_key(&node))
        })
    }

    /// Ask for the innermost running scope to run again once its current
    /// run has finished. Returns the scope, if any.
    pub fn request_rerun() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let frame = stack
                .iter_mut()
                .rev()
                .find(|frame| frame.subscriber_id.is_some())?;
            frame.rerun = true;
            frame.subscriber_id
        })
    }

    /// Whether a re-run was requested for this frame.
    pub fn rerun_requested(&self) -> bool {
        CONTEXT_STACK.with(|stack| stack.borrow().last().is_some_and(|frame| frame.rerun))
    }

    /// Number of frames on this thread's stack.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }

    /// Record a read of `node` in the top frame.
    ///
    /// Returns true if the read created a new edge for this run.
    pub fn track_dependency(node: &Arc<SignalNode>) -> bool {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            match stack.last_mut() {
                Some(frame) if frame.subscriber_id.is_some() => frame
                    .dependencies
                    .insert(node.id(), Arc::clone(node))
                    .is_none(),
                _ => false,
            }
        })
    }

    /// IDs of the dependencies collected so far in the top frame.
    pub fn get_dependencies() -> Vec<NodeId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|frame| frame.dependencies.keys().copied().collect())
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if !self.popped {
            self.popped = true;
            self.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> Arc<SignalNode> {
        Arc::new(SignalNode::source())
    }

    #[test]
    fn context_tracks_subscriber() {
        let id = SubscriberId::new();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(id);

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        }

        assert!(!ReactiveContext::is_active());
        assert_eq!(ReactiveContext::depth(), 0);
    }

    #[test]
    fn context_deduplicates_dependencies() {
        let id = SubscriberId::new();
        let (a, b) = (node(), node());
        let ctx = ReactiveContext::enter(id);

        assert!(ReactiveContext::track_dependency(&a));
        assert!(ReactiveContext::track_dependency(&b));
        assert!(!ReactiveContext::track_dependency(&a));

        assert_eq!(ReactiveContext::get_dependencies(), vec![a.id(), b.id()]);

        let deps = ctx.finish();
        assert_eq!(deps.len(), 2);
        assert_eq!(ReactiveContext::depth(), 0);
    }

    #[test]
    fn nested_contexts() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let (outer_node, inner_node) = (node(), node());

        let outer = ReactiveContext::enter(id1);
        ReactiveContext::track_dependency(&outer_node);

        {
            let inner = ReactiveContext::enter(id2);
            assert_eq!(ReactiveContext::current_subscriber(), Some(id2));
            ReactiveContext::track_dependency(&inner_node);

            let inner_deps = inner.finish();
            assert!(inner_deps.contains_key(&inner_node.id()));
            assert!(!inner_deps.contains_key(&outer_node.id()));
        }

        assert_eq!(ReactiveContext::current_subscriber(), Some(id1));
        let outer_deps = outer.finish();
        assert_eq!(outer_deps.len(), 1);
        assert!(outer_deps.contains_key(&outer_node.id()));
    }

    #[test]
    fn untracked_frame_shadows_scope() {
        let id = SubscriberId::new();
        let n = node();
        let ctx = ReactiveContext::enter(id);

        {
            let _untracked = ReactiveContext::untracked();
            assert!(!ReactiveContext::is_active());
            assert_eq!(ReactiveContext::running_scope(), Some(id));
            assert!(!ReactiveContext::track_dependency(&n));
        }

        assert!(ctx.finish().is_empty());
    }

    #[test]
    fn rerun_request_reaches_running_scope() {
        let id = SubscriberId::new();
        let n = node();
        let ctx = ReactiveContext::enter(id);
        ReactiveContext::track_dependency(&n);
        assert!(ReactiveContext::running_scope_reads(n.id()));
        assert!(!ctx.rerun_requested());

        {
            let _untracked = ReactiveContext::untracked();
            assert_eq!(ReactiveContext::request_rerun(), Some(id));
        }

        assert!(ctx.rerun_requested());
        drop(ctx);
        assert_eq!(ReactiveContext::request_rerun(), None);
    }

    #[test]
    fn reads_outside_any_scope_are_ignored() {
        assert!(!ReactiveContext::track_dependency(&node()));
        assert!(ReactiveContext::get_dependencies().is_empty());
    }
}
