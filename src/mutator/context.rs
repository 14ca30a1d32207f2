use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Mutator, ProbabilityTable};
use crate::collection::CollectionHooks;
use crate::runtime::Runtime;
use crate::util::ObjectReference;

/// One activation: the objects it holds in local variables.
#[derive(Debug, Default, Clone)]
pub struct LocalFrame {
    pub(crate) locals: BTreeSet<ObjectReference>,
}

impl LocalFrame {
    pub fn locals(&self) -> &BTreeSet<ObjectReference> {
        &self.locals
    }
}

/// A mutator's call stack. The root frame at depth 0 is never popped.
#[derive(Debug, Clone)]
pub struct FrameStack {
    frames: Vec<LocalFrame>,
}

impl Default for FrameStack {
    fn default() -> Self {
        FrameStack {
            frames: vec![LocalFrame::default()],
        }
    }
}

impl FrameStack {
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    pub fn current(&self) -> &LocalFrame {
        &self.frames[self.frames.len() - 1]
    }

    pub(crate) fn current_mut(&mut self) -> &mut LocalFrame {
        let top = self.frames.len() - 1;
        &mut self.frames[top]
    }

    pub(crate) fn push(&mut self) {
        self.frames.push(LocalFrame::default());
    }

    /// Pop the current frame. Returns false, and does nothing, at the root frame.
    pub(crate) fn pop(&mut self) -> bool {
        if self.frames.len() == 1 {
            return false;
        }
        self.frames.pop();
        true
    }

    /// Frames from the root up.
    pub fn frames(&self) -> &[LocalFrame] {
        &self.frames
    }

    fn splice(&mut self, old: ObjectReference, new: ObjectReference) {
        for frame in &mut self.frames {
            if frame.locals.remove(&old) {
                frame.locals.insert(new);
            }
        }
    }
}

/// Everything the collector sees as roots.
#[derive(Debug, Default)]
pub(crate) struct RootSet {
    pub(crate) statics: BTreeSet<ObjectReference>,
    pub(crate) stacks: BTreeMap<usize, FrameStack>,
}

impl RootSet {
    pub(crate) fn stack_mut(&mut self, mutator: usize) -> &mut FrameStack {
        self.stacks.entry(mutator).or_default()
    }

    fn roots(&self) -> Vec<ObjectReference> {
        self.stacks
            .values()
            .flat_map(|stack| stack.frames().iter())
            .flat_map(|frame| frame.locals.iter())
            .chain(self.statics.iter())
            .copied()
            .collect()
    }

    fn splice(&mut self, old: ObjectReference, new: ObjectReference) {
        if self.statics.remove(&old) {
            self.statics.insert(new);
        }
        for stack in self.stacks.values_mut() {
            stack.splice(old, new);
        }
        #[cfg(feature = "extreme_assertions")]
        assert!(
            old == new || !self.roots().contains(&old),
            "{} is still a root after being spliced",
            old
        );
    }
}

/// Shared state of all mutators of one runtime: the static roots and every mutator's frames,
/// behind one lock. Collection sessions read and splice roots under the same lock.
pub struct MutatorContext {
    runtime: Arc<Runtime>,
    roots: Mutex<RootSet>,
    next_id: AtomicUsize,
}

impl MutatorContext {
    /// Create the context and make it the runtime's root provider.
    pub fn new(runtime: Arc<Runtime>) -> Arc<Self> {
        let context = Arc::new(MutatorContext {
            runtime: runtime.clone(),
            roots: Mutex::new(RootSet::default()),
            next_id: AtomicUsize::new(0),
        });
        let weak = Arc::downgrade(&context);
        runtime.attach_roots(weak);
        context
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn create_mutator(self: &Arc<Self>, seed: u64, table: ProbabilityTable) -> Mutator {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().stack_mut(id);
        debug!("Created mutator {} ({})", id, table);
        Mutator::new(id, self.clone(), seed, table)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, RootSet> {
        self.roots.lock().unwrap()
    }

    /// Forget a mutator's frames. Runs from `Drop`, possibly while unwinding, so a poisoned
    /// lock is taken over instead of panicking again.
    pub(crate) fn release(&self, mutator: usize) {
        self.roots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stacks
            .remove(&mutator);
    }

    /// Snapshot of the static roots.
    pub fn statics(&self) -> Vec<ObjectReference> {
        self.lock().statics.iter().copied().collect()
    }
}

impl CollectionHooks for MutatorContext {
    fn roots(&self) -> Vec<ObjectReference> {
        self.lock().roots()
    }

    fn splice(&self, old: ObjectReference, new: ObjectReference) {
        self.lock().splice(old, new);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutator::EvaluationMode;
    use crate::plan::PlanSelector;
    use crate::util::test_util::small_runtime;
    use crate::util::Address;

    fn object(raw: usize) -> ObjectReference {
        ObjectReference::from_raw_address(unsafe { Address::from_usize(raw) })
    }

    #[test]
    fn dropping_a_mutator_after_the_root_lock_is_poisoned() {
        let context = MutatorContext::new(small_runtime(PlanSelector::NoGC));
        let mutator = context.create_mutator(1, ProbabilityTable::preset(EvaluationMode::Flat));
        let id = mutator.id();

        let holder = context.clone();
        let result = std::thread::spawn(move || {
            let _roots = holder.lock();
            panic!("panicking while holding the root lock");
        })
        .join();
        assert!(result.is_err());
        assert!(context.roots.is_poisoned());

        drop(mutator);
        let roots = context.roots.lock().unwrap_or_else(PoisonError::into_inner);
        assert!(!roots.stacks.contains_key(&id));
    }

    #[test]
    fn root_frame_is_never_popped() {
        let mut stack = FrameStack::default();
        assert_eq!(stack.depth(), 0);
        assert!(!stack.pop());
        assert_eq!(stack.depth(), 0);
        stack.current_mut().locals.insert(object(0x10));

        stack.push();
        stack.push();
        assert_eq!(stack.depth(), 2);
        assert!(stack.pop());
        assert!(stack.pop());
        assert!(!stack.pop());
        assert_eq!(stack.depth(), 0);
        assert!(stack.current().locals().contains(&object(0x10)));
    }

    #[test]
    fn splice_replaces_every_occurrence() {
        let mut roots = RootSet::default();
        roots.statics.insert(object(0x10));
        roots.statics.insert(object(0x20));
        let stack = roots.stack_mut(0);
        stack.current_mut().locals.insert(object(0x10));
        stack.push();
        stack.current_mut().locals.insert(object(0x10));
        stack.current_mut().locals.insert(object(0x30));
        roots.stack_mut(1).current_mut().locals.insert(object(0x10));

        assert_eq!(roots.roots().len(), 6);
        roots.splice(object(0x10), object(0x40));

        let after = roots.roots();
        assert!(!after.contains(&object(0x10)));
        assert_eq!(after.iter().filter(|o| **o == object(0x40)).count(), 4);
        assert!(after.contains(&object(0x20)));
        assert!(after.contains(&object(0x30)));
    }

    #[test]
    fn roots_list_locals_before_statics() {
        let mut roots = RootSet::default();
        roots.statics.insert(object(0x08));
        roots.stack_mut(0).current_mut().locals.insert(object(0x50));
        assert_eq!(roots.roots(), vec![object(0x50), object(0x08)]);
    }
}
