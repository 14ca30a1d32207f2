//! The randomized mutator.
//!
//! A [`Mutator`] keeps a stack of frames of local object references and shares a set of
//! static references with every other mutator of its [`MutatorContext`]. Each step it looks
//! up the [`ProbabilityTable`] at its current stack depth, draws a set of [`ActionKind`]s and
//! applies them in order: calling and returning, allocating, and rewiring static roots and
//! reference fields. Everything it holds is visible to the collector as a root, and every
//! object it touches is reachable from one.

mod actions;
mod context;
mod params;

pub use self::actions::{ActionKind, ActionSet};
pub use self::context::{FrameStack, LocalFrame, MutatorContext};
pub use self::params::{EvaluationMode, ProbabilityEntries, ProbabilityEntry, ProbabilityTable};

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crossbeam::channel::Sender;
use rand::seq::{IndexedRandom, IteratorRandom};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use self::context::RootSet;
use crate::error::HarnessError;
use crate::layout::FieldDescriptor;
use crate::runtime::Runtime;
use crate::util::constants::MAX_DEEP_TARGET_HOPS;
use crate::util::ObjectReference;

/// What one applied action did. `object` is the allocated, moved, replaced-into or modified
/// object, or null when the action had nothing to work on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MutatorEvent {
    pub mutator: usize,
    pub kind: ActionKind,
    pub object: ObjectReference,
}

impl fmt::Display for MutatorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.mutator, self.kind, self.object)
    }
}

pub struct Mutator {
    id: usize,
    context: Arc<MutatorContext>,
    table: ProbabilityTable,
    rng: ChaCha8Rng,
}

impl Mutator {
    pub(crate) fn new(
        id: usize,
        context: Arc<MutatorContext>,
        seed: u64,
        table: ProbabilityTable,
    ) -> Self {
        Mutator {
            id,
            context,
            table,
            // Different mutators of one context draw different streams from the same seed.
            rng: ChaCha8Rng::seed_from_u64(seed.wrapping_add(id as u64)),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn context(&self) -> &Arc<MutatorContext> {
        &self.context
    }

    pub fn depth(&self) -> usize {
        self.context.lock().stack_mut(self.id).depth()
    }

    /// The locals of the current frame.
    pub fn locals(&self) -> Vec<ObjectReference> {
        self.context
            .lock()
            .stack_mut(self.id)
            .current()
            .locals()
            .iter()
            .copied()
            .collect()
    }

    /// Draw and apply one step's actions.
    pub fn step(&mut self) -> Result<Vec<MutatorEvent>, HarnessError> {
        let actions = self.table.draw(self.depth(), &mut self.rng);
        let mut events = Vec::with_capacity(actions.len());
        for kind in actions.iter() {
            let object = self.apply(kind)?;
            events.push(MutatorEvent {
                mutator: self.id,
                kind,
                object,
            });
        }
        Ok(events)
    }

    /// Apply a single action.
    pub fn apply(&mut self, kind: ActionKind) -> Result<ObjectReference, HarnessError> {
        let Mutator {
            id, context, rng, ..
        } = self;
        let id = *id;
        let runtime = context.runtime();

        // Allocate before taking the root lock.
        let allocated = match kind {
            ActionKind::Newobj => Some(runtime.allocate_random_object(rng)?),
            _ => None,
        };

        let mut roots = context.lock();
        let RootSet { statics, stacks } = &mut *roots;
        let stack = stacks.entry(id).or_default();

        let object = match kind {
            ActionKind::Call => {
                stack.push();
                ObjectReference::NULL
            }
            ActionKind::Return => {
                stack.pop();
                ObjectReference::NULL
            }
            ActionKind::Newobj => match allocated {
                Some(object) => {
                    stack.current_mut().locals.insert(object);
                    object
                }
                None => ObjectReference::NULL,
            },
            ActionKind::PutStatic => {
                let locals = &mut stack.current_mut().locals;
                match locals.iter().copied().choose(rng) {
                    Some(object) => {
                        locals.remove(&object);
                        statics.insert(object);
                        object
                    }
                    None => ObjectReference::NULL,
                }
            }
            ActionKind::ChangeStatic => {
                let locals = &stack.current().locals;
                if statics.is_empty() || locals.is_empty() {
                    ObjectReference::NULL
                } else {
                    let removed = statics.iter().copied().choose(rng);
                    let added = locals.iter().copied().choose(rng);
                    match (removed, added) {
                        (Some(removed), Some(added)) => {
                            statics.remove(&removed);
                            statics.insert(added);
                            added
                        }
                        _ => ObjectReference::NULL,
                    }
                }
            }
            ActionKind::EraseStatic => match statics.iter().copied().choose(rng) {
                Some(object) => {
                    statics.remove(&object);
                    object
                }
                None => ObjectReference::NULL,
            },
            ActionKind::PutRef | ActionKind::ChangeRef => {
                let locals = &stack.current().locals;
                let target = deep_target(runtime, locals, statics, rng)?;
                let value = locals.iter().copied().choose(rng);
                match (target.is_null(), value) {
                    (false, Some(value)) => {
                        let fields = runtime.reference_fields(target)?;
                        let field = if kind == ActionKind::PutRef {
                            first_null_field(runtime, target, &fields)
                                .or_else(|| fields.choose(rng).copied())
                        } else {
                            fields.choose(rng).copied()
                        };
                        match field {
                            Some(field) => {
                                runtime.write_reference(target, field, value);
                                target
                            }
                            None => ObjectReference::NULL,
                        }
                    }
                    _ => ObjectReference::NULL,
                }
            }
            ActionKind::EraseRef => {
                let target = deep_target(runtime, &stack.current().locals, statics, rng)?;
                if target.is_null() {
                    ObjectReference::NULL
                } else {
                    let fields = runtime.reference_fields(target)?;
                    match fields
                        .iter()
                        .find(|f| !runtime.read_reference(target, f).is_null())
                    {
                        Some(field) => {
                            runtime.write_reference(target, field, ObjectReference::NULL);
                            target
                        }
                        None => ObjectReference::NULL,
                    }
                }
            }
        };
        Ok(object)
    }

    /// Step until `limit` steps are done (or forever), stopping at the run gate whenever a
    /// collector asks. Events go to `sink`; a disconnected sink is ignored. Returns the
    /// number of steps taken.
    pub fn run(&mut self, limit: Option<u64>, sink: &Sender<MutatorEvent>) -> Result<u64, HarnessError> {
        let attachment = self.context.runtime().gate().attach();
        let mut steps = 0u64;
        info!("Mutator {} started", self.id);
        while limit.map_or(true, |limit| steps < limit) {
            attachment.pass();
            for event in self.step()? {
                let _ = sink.send(event);
            }
            steps += 1;
        }
        info!(
            "Mutator {} finished after {} steps at depth {}",
            self.id,
            steps,
            self.depth()
        );
        Ok(steps)
    }
}

impl Drop for Mutator {
    fn drop(&mut self) {
        self.context.release(self.id);
    }
}

fn first_null_field<'a>(
    runtime: &Runtime,
    object: ObjectReference,
    fields: &[&'a FieldDescriptor],
) -> Option<&'a FieldDescriptor> {
    fields
        .iter()
        .find(|f| runtime.read_reference(object, f).is_null())
        .copied()
}

/// Pick a local or static object, then follow random reference fields while they are non-null.
fn deep_target(
    runtime: &Runtime,
    locals: &BTreeSet<ObjectReference>,
    statics: &BTreeSet<ObjectReference>,
    rng: &mut ChaCha8Rng,
) -> Result<ObjectReference, HarnessError> {
    let Some(mut current) = locals.union(statics).copied().choose(rng) else {
        return Ok(ObjectReference::NULL);
    };
    for _ in 0..MAX_DEEP_TARGET_HOPS {
        let fields = runtime.reference_fields(current)?;
        let Some(field) = fields.choose(rng) else {
            break;
        };
        let next = runtime.read_reference(current, field);
        if next.is_null() {
            break;
        }
        current = next;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanSelector;
    use crate::util::test_util::small_runtime;

    fn mutator() -> Mutator {
        let context = MutatorContext::new(small_runtime(PlanSelector::NoGC));
        context.create_mutator(7, ProbabilityTable::preset(EvaluationMode::Sequence))
    }

    fn shut_down(mutator: Mutator) {
        let context = mutator.context().clone();
        drop(mutator);
        let runtime = context.runtime().clone();
        drop(context);
        Arc::try_unwrap(runtime)
            .ok()
            .expect("runtime still shared")
            .dispose()
            .unwrap();
    }

    #[test]
    fn static_actions_without_candidates_do_nothing() {
        let mut m = mutator();
        assert!(m.apply(ActionKind::EraseStatic).unwrap().is_null());
        assert!(m.apply(ActionKind::PutStatic).unwrap().is_null());
        assert!(m.apply(ActionKind::ChangeStatic).unwrap().is_null());
        assert!(m.context().statics().is_empty());
        shut_down(m);
    }

    #[test]
    fn reference_actions_without_candidates_do_nothing() {
        let mut m = mutator();
        assert!(m.apply(ActionKind::PutRef).unwrap().is_null());
        assert!(m.apply(ActionKind::ChangeRef).unwrap().is_null());
        assert!(m.apply(ActionKind::EraseRef).unwrap().is_null());
        shut_down(m);
    }

    #[test]
    fn newobj_adds_a_local() {
        let mut m = mutator();
        let object = m.apply(ActionKind::Newobj).unwrap();
        assert!(!object.is_null());
        assert_eq!(m.locals(), vec![object]);
        let type_id = unsafe {
            let model = m.context().runtime().object_model();
            model.type_id_of(model.object_to_block(object))
        };
        assert!((1..16).contains(&type_id));
        shut_down(m);
    }

    #[test]
    fn call_and_return() {
        let mut m = mutator();
        assert_eq!(m.depth(), 0);
        m.apply(ActionKind::Call).unwrap();
        m.apply(ActionKind::Call).unwrap();
        assert_eq!(m.depth(), 2);
        let inner = m.apply(ActionKind::Newobj).unwrap();
        assert_eq!(m.locals(), vec![inner]);
        m.apply(ActionKind::Return).unwrap();
        assert!(m.locals().is_empty());
        m.apply(ActionKind::Return).unwrap();
        m.apply(ActionKind::Return).unwrap();
        assert_eq!(m.depth(), 0);
        shut_down(m);
    }

    #[test]
    fn put_static_moves_the_local() {
        let mut m = mutator();
        let object = m.apply(ActionKind::Newobj).unwrap();
        assert_eq!(m.apply(ActionKind::PutStatic).unwrap(), object);
        assert!(m.locals().is_empty());
        assert_eq!(m.context().statics(), vec![object]);

        let other = m.apply(ActionKind::Newobj).unwrap();
        assert_eq!(m.apply(ActionKind::ChangeStatic).unwrap(), other);
        assert_eq!(m.context().statics(), vec![other]);
        assert_eq!(m.locals(), vec![other]);

        assert_eq!(m.apply(ActionKind::EraseStatic).unwrap(), other);
        assert!(m.context().statics().is_empty());
        shut_down(m);
    }

    #[test]
    fn put_ref_fills_the_first_null_field() {
        let mut m = mutator();
        let object = m.apply(ActionKind::Newobj).unwrap();
        // The only candidate is the object itself, so it ends up referring to itself.
        assert_eq!(m.apply(ActionKind::PutRef).unwrap(), object);
        let runtime = m.context().runtime().clone();
        let fields = runtime.reference_fields(object).unwrap();
        assert_eq!(runtime.read_reference(object, fields[0]), object);
        for field in &fields[1..] {
            assert!(runtime.read_reference(object, field).is_null());
        }

        assert_eq!(m.apply(ActionKind::EraseRef).unwrap(), object);
        assert!(runtime.read_reference(object, fields[0]).is_null());
        // Nothing left to erase.
        assert!(m.apply(ActionKind::EraseRef).unwrap().is_null());
        drop(fields);
        drop(runtime);
        shut_down(m);
    }

    #[test]
    fn steps_are_deterministic() {
        fn trace(seed: u64) -> Vec<(ActionKind, bool)> {
            let context = MutatorContext::new(small_runtime(PlanSelector::NoGC));
            let mut m = context.create_mutator(seed, ProbabilityTable::preset(EvaluationMode::Flat));
            drop(context);
            let mut trace = vec![];
            for _ in 0..200 {
                for event in m.step().unwrap() {
                    trace.push((event.kind, event.object.is_null()));
                }
            }
            shut_down(m);
            trace
        }
        assert_eq!(trace(42), trace(42));
        assert_ne!(trace(42), trace(43));
    }

    #[test]
    fn every_step_does_something() {
        let mut m = mutator();
        for _ in 0..100 {
            let events = m.step().unwrap();
            assert!(!events.is_empty());
            assert!(events.iter().all(|e| e.mutator == m.id()));
        }
        shut_down(m);
    }

    #[test]
    fn run_reports_events() {
        let mut m = mutator();
        let (sender, receiver) = crossbeam::channel::unbounded();
        assert_eq!(m.run(Some(50), &sender).unwrap(), 50);
        drop(sender);
        let events: Vec<MutatorEvent> = receiver.iter().collect();
        assert!(events.len() >= 50);
        assert!(!m.context().runtime().gate().is_running());
        shut_down(m);
    }

    #[test]
    fn event_display() {
        let event = MutatorEvent {
            mutator: 3,
            kind: ActionKind::Newobj,
            object: ObjectReference::NULL,
        };
        assert_eq!(event.to_string(), format!("[3] Newobj {}", ObjectReference::NULL));
    }
}
