//! The built-in collectors.
//!
//! Each plan is a [`CollectionPolicy`]: the header fields it needs and what it does while the
//! mutators are stopped. The shared machinery in `global` turns a policy into a
//! [`GcPlugin`] whose manager tracks its blocks, triggers collections by allocation volume and
//! runs them on a controller thread.

mod controller;
mod global;
mod marksweep;
mod nogc;
mod semispace;

use strum::IntoEnumIterator;

use self::global::{CollectionContext, Plan};
use crate::error::HarnessError;
use crate::gc::GcPlugin;
use crate::layout::{StructureBuilder, StructureLayout};
use crate::util::options::Options;
use crate::util::{Address, ObjectReference};

pub use crate::util::options::PlanSelector;

/// Outcome of one collection.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectionStats {
    /// Objects that survived.
    pub live: usize,
    /// Blocks returned to the underlying memory manager.
    pub freed: usize,
    /// Objects copied to a new block.
    pub moved: usize,
}

pub(crate) trait CollectionPolicy: Sized + Send + Sync + 'static {
    const NAME: &'static str;

    /// Contribute header fields.
    fn augment_object_layout(_header: &mut StructureBuilder) {}

    /// Build the policy once the header layout is known.
    fn new(header: &StructureLayout) -> Result<Self, HarnessError>;

    /// Initialize the policy's header fields in a freshly allocated block.
    fn initialize_header(&self, _block: Address) {}

    fn on_write_ref_member(&self, _block: Address, _reference: ObjectReference) {}

    /// Collect. The mutators are stopped and the session is open.
    fn collect(&self, ctx: &CollectionContext<'_>) -> Result<CollectionStats, HarnessError>;
}

/// Create the plugin for a plan.
pub fn create(selector: PlanSelector, options: &Options) -> Box<dyn GcPlugin> {
    let stress_factor = options.stress_factor;
    match selector {
        PlanSelector::NoGC => Box::new(Plan::<nogc::NoGC>::new(stress_factor)),
        PlanSelector::MarkSweep => Box::new(Plan::<marksweep::MarkSweep>::new(stress_factor)),
        PlanSelector::SemiSpace => Box::new(Plan::<semispace::SemiSpace>::new(stress_factor)),
    }
}

/// Every built-in plan, in registration order.
pub fn available(options: &Options) -> Vec<Box<dyn GcPlugin>> {
    PlanSelector::iter()
        .map(|selector| create(selector, options))
        .collect()
}

/// Look a plan up by name, ignoring case.
pub fn find(name: &str, options: &Options) -> Result<Box<dyn GcPlugin>, HarnessError> {
    name.parse::<PlanSelector>()
        .map(|selector| create(selector, options))
        .map_err(|_| HarnessError::UnknownPlan {
            name: name.to_string(),
            available: PlanSelector::iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", "),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionHooks;
    use crate::mutator::{EvaluationMode, Mutator, MutatorContext, ProbabilityTable};
    use crate::util::constants::BYTES_IN_KBYTE;
    use crate::util::test_util::{panic_after, small_options, small_runtime};
    use crate::Runtime;
    use std::collections::HashSet;
    use std::sync::Arc;

    /// Shape of the object graph reachable from the roots, independent of addresses: per
    /// reachable object its type and the types its reference fields point to, sorted.
    fn reachable_shape(context: &MutatorContext) -> Vec<(usize, Vec<Option<usize>>)> {
        let runtime = context.runtime();
        let model = runtime.object_model();
        let type_of = |object: ObjectReference| unsafe {
            model.type_id_of(model.object_to_block(object))
        };
        let mut seen = HashSet::new();
        let mut worklist = context.roots();
        let mut shape = vec![];
        while let Some(object) = worklist.pop() {
            if !seen.insert(object) {
                continue;
            }
            let mut children = vec![];
            for field in runtime.reference_fields(object).unwrap() {
                let child = runtime.read_reference(object, field);
                if child.is_null() {
                    children.push(None);
                } else {
                    children.push(Some(type_of(child)));
                    worklist.push(child);
                }
            }
            shape.push((type_of(object), children));
        }
        shape.sort();
        shape
    }

    fn mutate(mutator: &mut Mutator, steps: usize) {
        for _ in 0..steps {
            mutator.step().unwrap();
        }
    }

    fn shut_down(mutator: Mutator) {
        let context = mutator.context().clone();
        drop(mutator);
        let runtime = context.runtime().clone();
        drop(context);
        let runtime: Runtime = Arc::try_unwrap(runtime).ok().expect("runtime still shared");
        runtime.dispose().unwrap();
    }

    fn collection_preserves_reachable_graph(plan: PlanSelector) {
        let context = MutatorContext::new(small_runtime(plan));
        let mut mutator =
            context.create_mutator(11, ProbabilityTable::preset(EvaluationMode::Flat));
        drop(context);
        mutate(&mut mutator, 500);

        let context = mutator.context().clone();
        let before = reachable_shape(&context);
        assert!(!before.is_empty());
        context.runtime().force_collection(1);
        assert_eq!(reachable_shape(&context), before);

        // Keep mutating the collected heap, and collect again.
        mutate(&mut mutator, 500);
        let before = reachable_shape(&context);
        context.runtime().force_collection(2);
        assert_eq!(reachable_shape(&context), before);

        let (outstanding, _) = context.runtime().system().outstanding();
        if plan == PlanSelector::NoGC {
            assert!(outstanding >= before.len());
        } else {
            assert_eq!(outstanding, before.len());
        }
        drop(context);
        shut_down(mutator);
    }

    #[test]
    fn nogc_keeps_everything() {
        collection_preserves_reachable_graph(PlanSelector::NoGC);
    }

    #[test]
    fn marksweep_frees_only_garbage() {
        collection_preserves_reachable_graph(PlanSelector::MarkSweep);
    }

    #[test]
    fn semispace_copies_the_reachable_graph() {
        collection_preserves_reachable_graph(PlanSelector::SemiSpace);
    }

    #[test]
    fn semispace_splices_roots() {
        let context = MutatorContext::new(small_runtime(PlanSelector::SemiSpace));
        let mut mutator =
            context.create_mutator(5, ProbabilityTable::preset(EvaluationMode::Sequence));
        mutate(&mut mutator, 200);
        let before: HashSet<_> = context.roots().into_iter().collect();
        assert!(!before.is_empty());
        context.runtime().force_collection(0);
        let after: HashSet<_> = context.roots().into_iter().collect();
        assert_eq!(after.len(), before.len());
        assert!(after.is_disjoint(&before));
        drop(context);
        shut_down(mutator);
    }

    #[test]
    fn collecting_an_empty_heap() {
        for plan in PlanSelector::iter() {
            let context = MutatorContext::new(small_runtime(plan));
            let mutator = context.create_mutator(1, ProbabilityTable::preset(EvaluationMode::Flat));
            context.runtime().force_collection(0);
            assert_eq!(context.runtime().system().outstanding(), (0, 0));
            drop(context);
            shut_down(mutator);
        }
    }

    #[test]
    fn stress_collections_while_mutating() {
        for plan in [PlanSelector::MarkSweep, PlanSelector::SemiSpace] {
            panic_after(60_000, move || {
                let mut options = small_options(plan);
                options.stress_factor = 4 * BYTES_IN_KBYTE;
                let plugin = create(plan, &options);
                let runtime = Arc::new(Runtime::new(plugin.as_ref(), &options).unwrap());
                let context = MutatorContext::new(runtime);
                let mut mutator =
                    context.create_mutator(3, ProbabilityTable::preset(EvaluationMode::Sequence));
                let (sender, receiver) = crossbeam::channel::unbounded();
                let worker = std::thread::spawn(move || {
                    mutator.run(Some(2_000), &sender).unwrap();
                    mutator
                });
                let mutator = worker.join().unwrap();
                assert!(receiver.try_iter().count() >= 2_000);

                // Drain stress collections still queued on the controller.
                context.runtime().force_collection(0);
                let before = reachable_shape(&context);
                context.runtime().force_collection(0);
                assert_eq!(reachable_shape(&context), before);
                drop(context);
                shut_down(mutator);
            });
        }
    }

    #[test]
    fn registration_table() {
        let options = Options::builtin();
        let names: Vec<_> = available(&options).iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["NoGC", "MarkSweep", "SemiSpace"]);
    }

    #[test]
    fn find_by_name() {
        let options = Options::builtin();
        assert_eq!(find("marksweep", &options).unwrap().name(), "MarkSweep");
        assert_eq!(find("SEMISPACE", &options).unwrap().name(), "SemiSpace");
        match find("Immix", &options) {
            Err(HarnessError::UnknownPlan { name, available }) => {
                assert_eq!(name, "Immix");
                assert!(available.contains("NoGC"));
            }
            _ => panic!("Immix is not a built-in plan"),
        }
    }
}
