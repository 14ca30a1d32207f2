//! Stopping the mutators and handing their roots to a collector.
//!
//! [`RunGate`] is the stop-the-world primitive. Mutators pass through it between steps; a
//! collector closes it, waits until every attached mutator is parked, runs a
//! [`CollectionSession`], and the session reopens the gate when it is dropped.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::util::ObjectReference;

/// The roots and relocation target of a collection.
///
/// A session exists only while the mutators are stopped. Dropping it lets them continue.
pub trait CollectionSession: Send {
    /// Number of root priority levels. The harness has a single level, `0`.
    fn root_priorities_count(&self) -> usize;

    /// Snapshot of the roots at the given priority: the locals of every frame of every
    /// attached mutator, then the static roots. An object may appear more than once.
    fn get_roots(&self, priority: usize) -> Vec<ObjectReference>;

    /// Replace every root occurrence of `old` with `new`. Done once this returns.
    fn splice_object_ref(&self, old: ObjectReference, new: ObjectReference);
}

/// The runtime side of a collection session: whoever owns the roots.
pub trait CollectionHooks: Send + Sync {
    fn roots(&self) -> Vec<ObjectReference>;

    fn splice(&self, old: ObjectReference, new: ObjectReference);
}

#[derive(Default, Debug)]
struct GateState {
    closed: bool,
    /// Mutators inside their run loop.
    attached: usize,
    /// Attached mutators waiting at the gate.
    parked: usize,
}

impl GateState {
    fn running(&self) -> usize {
        self.attached - self.parked
    }
}

/// A gate mutators pass between steps, closed by a collector to stop them.
#[derive(Default)]
pub struct RunGate {
    state: Mutex<GateState>,
    cvar: Condvar,
}

impl RunGate {
    pub fn new() -> Arc<Self> {
        Arc::new(RunGate::default())
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap()
    }

    /// Stop requested: mutators park at their next [`pass`](RunGate::pass).
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        debug!(
            "Run gate closed ({} attached, {} parked)",
            state.attached, state.parked
        );
    }

    /// Stop released: parked mutators resume.
    pub fn open(&self) {
        let mut state = self.lock();
        state.closed = false;
        self.cvar.notify_all();
        debug!("Run gate opened");
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Is any attached mutator neither parked nor finished?
    pub fn is_running(&self) -> bool {
        self.lock().running() > 0
    }

    /// Register a mutator that is about to start stepping.
    pub fn enter(&self) {
        let mut state = self.lock();
        state.attached += 1;
    }

    /// Unregister a mutator that stopped stepping.
    pub fn leave(&self) {
        let mut state = self.lock();
        debug_assert!(state.attached > state.parked);
        state.attached -= 1;
        // A collector may be waiting for this mutator.
        self.cvar.notify_all();
    }

    /// Called by an attached mutator between steps. Returns at once while the gate is open,
    /// otherwise parks until it opens.
    pub fn pass(&self) {
        let mut state = self.lock();
        if !state.closed {
            return;
        }
        state.parked += 1;
        trace!("Mutator parked ({} of {})", state.parked, state.attached);
        self.cvar.notify_all();
        while state.closed {
            state = self.cvar.wait(state).unwrap();
        }
        state.parked -= 1;
    }

    /// Block until no attached mutator is running. Returns early if the gate is reopened.
    pub fn wait_until_stopped(&self) {
        let mut state = self.lock();
        while state.closed && state.running() > 0 {
            state = self.cvar.wait(state).unwrap();
        }
    }

    /// [`enter`](RunGate::enter) now and [`leave`](RunGate::leave) when the returned guard drops.
    pub fn attach(self: &Arc<Self>) -> GateAttachment {
        self.enter();
        GateAttachment { gate: self.clone() }
    }
}

/// An attached mutator's hold on a [`RunGate`].
pub struct GateAttachment {
    gate: Arc<RunGate>,
}

impl GateAttachment {
    pub fn pass(&self) {
        self.gate.pass()
    }
}

impl Drop for GateAttachment {
    fn drop(&mut self) {
        self.gate.leave();
    }
}

/// The session the runtime hands to collectors.
pub(crate) struct RuntimeCollectionSession {
    gate: Arc<RunGate>,
    hooks: Option<Arc<dyn CollectionHooks>>,
}

impl RuntimeCollectionSession {
    pub(crate) fn new(gate: Arc<RunGate>, hooks: Option<Arc<dyn CollectionHooks>>) -> Self {
        debug!("Collection session opened");
        RuntimeCollectionSession { gate, hooks }
    }
}

impl CollectionSession for RuntimeCollectionSession {
    fn root_priorities_count(&self) -> usize {
        1
    }

    fn get_roots(&self, priority: usize) -> Vec<ObjectReference> {
        if priority != 0 {
            warn!("Roots requested at unknown priority {}", priority);
            return vec![];
        }
        self.hooks
            .as_ref()
            .map(|hooks| hooks.roots())
            .unwrap_or_default()
    }

    fn splice_object_ref(&self, old: ObjectReference, new: ObjectReference) {
        trace!("Splice {} -> {}", old, new);
        if let Some(hooks) = &self.hooks {
            hooks.splice(old, new);
        }
    }
}

impl Drop for RuntimeCollectionSession {
    fn drop(&mut self) {
        debug!("Collection session closed");
        self.gate.open();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_util::panic_after;
    use crate::util::Address;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn object(raw: usize) -> ObjectReference {
        ObjectReference::from_raw_address(unsafe { Address::from_usize(raw) })
    }

    #[derive(Default)]
    struct FixedRoots(Mutex<Vec<ObjectReference>>);

    impl CollectionHooks for FixedRoots {
        fn roots(&self) -> Vec<ObjectReference> {
            self.0.lock().unwrap().clone()
        }

        fn splice(&self, old: ObjectReference, new: ObjectReference) {
            for root in self.0.lock().unwrap().iter_mut() {
                if *root == old {
                    *root = new;
                }
            }
        }
    }

    #[test]
    fn open_gate_does_not_block() {
        let gate = RunGate::new();
        let attachment = gate.attach();
        assert!(gate.is_running());
        attachment.pass();
        drop(attachment);
        assert!(!gate.is_running());
    }

    #[test]
    fn wait_until_stopped_without_mutators() {
        panic_after(1000, || {
            let gate = RunGate::new();
            gate.close();
            gate.wait_until_stopped();
            assert!(!gate.is_running());
        })
    }

    #[test]
    fn closed_gate_parks_mutator() {
        panic_after(5000, || {
            let gate = RunGate::new();
            let steps = Arc::new(AtomicUsize::new(0));
            gate.close();

            let mutator = {
                let gate = gate.clone();
                let steps = steps.clone();
                let attachment = gate.attach();
                thread::spawn(move || {
                    for _ in 0..3 {
                        attachment.pass();
                        steps.fetch_add(1, Ordering::SeqCst);
                    }
                })
            };

            gate.wait_until_stopped();
            assert!(!gate.is_running());
            assert_eq!(steps.load(Ordering::SeqCst), 0);

            gate.open();
            mutator.join().unwrap();
            assert_eq!(steps.load(Ordering::SeqCst), 3);
            assert!(!gate.is_running());
        })
    }

    #[test]
    fn session_releases_gate_on_drop() {
        let gate = RunGate::new();
        let hooks = Arc::new(FixedRoots::default());
        hooks.0.lock().unwrap().extend([object(0x10), object(0x20), object(0x10)]);

        gate.close();
        let session = RuntimeCollectionSession::new(gate.clone(), Some(hooks.clone()));
        assert_eq!(session.root_priorities_count(), 1);
        assert_eq!(session.get_roots(0).len(), 3);
        assert!(session.get_roots(1).is_empty());

        session.splice_object_ref(object(0x10), object(0x30));
        assert_eq!(
            session.get_roots(0),
            vec![object(0x30), object(0x20), object(0x30)]
        );
        assert!(gate.is_closed());
        drop(session);
        assert!(!gate.is_closed());
    }

    #[test]
    fn session_without_hooks_has_no_roots() {
        let gate = RunGate::new();
        let session = RuntimeCollectionSession::new(gate, None);
        assert!(session.get_roots(0).is_empty());
        session.splice_object_ref(object(0x10), object(0x20));
    }
}
