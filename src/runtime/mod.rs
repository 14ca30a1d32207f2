//! The runtime: owns the object model, allocates through the collector, and serves the
//! collector's callbacks.

mod accessor;
mod system;

pub use self::accessor::RuntimeAccessor;
pub use self::system::SystemMemoryManager;

use std::sync::{Arc, Weak};

use rand::Rng;

use crate::collection::{CollectionHooks, CollectionSession, RunGate};
use crate::error::HarnessError;
use crate::gc::{AutoMemoryManager, GcPlugin, ManagementContext, RuntimeContextAccessor};
use crate::layout::{FieldDescriptor, LayoutContext};
use crate::object_model::ObjectModel;
use crate::util::options::Options;
use crate::util::ObjectReference;

pub struct Runtime {
    // Field order is drop order: the manager returns its blocks before the system allocator goes.
    manager: Box<dyn AutoMemoryManager>,
    context: Box<dyn ManagementContext>,
    accessor: Arc<RuntimeAccessor>,
    model: Arc<ObjectModel>,
    system: Arc<SystemMemoryManager>,
    plan: &'static str,
}

impl Runtime {
    pub fn new(plugin: &dyn GcPlugin, options: &Options) -> Result<Self, HarnessError> {
        let layout_context = LayoutContext::new();
        let accessor = Arc::new(RuntimeAccessor::new(layout_context.clone()));
        let context = plugin.create_management_context(accessor.clone());

        let model = Arc::new(ObjectModel::new(
            layout_context,
            |header| context.augment_object_layout(header),
            options.type_count,
            options.max_fields,
            options.seed,
        )?);
        accessor.install_model(model.clone());

        let system = Arc::new(SystemMemoryManager::new());
        let manager = context.create_manager(system.clone(), accessor.clone())?;
        info!(
            "Runtime initialized with {} {} ({} types)",
            plugin.name(),
            plugin.version(),
            model.type_count()
        );
        Ok(Runtime {
            manager,
            context,
            accessor,
            model,
            system,
            plan: plugin.name(),
        })
    }

    pub fn plan_name(&self) -> &'static str {
        self.plan
    }

    pub fn object_model(&self) -> &ObjectModel {
        &self.model
    }

    pub fn accessor(&self) -> &Arc<RuntimeAccessor> {
        &self.accessor
    }

    pub fn gate(&self) -> &Arc<RunGate> {
        self.accessor.gate()
    }

    pub fn system(&self) -> &SystemMemoryManager {
        &self.system
    }

    pub fn manager(&self) -> &dyn AutoMemoryManager {
        self.manager.as_ref()
    }

    /// Allocate an object of the given type through the collector.
    pub fn allocate(&self, type_id: usize) -> Result<ObjectReference, HarnessError> {
        let layout = self.model.layout_of(type_id)?;
        let block = self.manager.alloc(layout.aligned_size())?;
        // SAFETY: the manager just handed out `aligned_size` bytes at `block`.
        let object = unsafe { self.model.initialize(block, type_id)? };
        trace!("Allocated {} of type {} in block {}", object, type_id, block);
        Ok(object)
    }

    /// Allocate an object of a uniformly chosen type.
    pub fn allocate_random_object<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<ObjectReference, HarnessError> {
        let type_id = rng.random_range(1..self.model.type_count());
        self.allocate(type_id)
    }

    // The accessors below are only called with objects the mutator holds, which the collector
    // sees as roots or reaches from roots, so the blocks are live.

    pub(crate) fn reference_fields(
        &self,
        object: ObjectReference,
    ) -> Result<Vec<&FieldDescriptor>, HarnessError> {
        Ok(unsafe { self.model.reference_fields(object)? })
    }

    pub(crate) fn read_reference(
        &self,
        object: ObjectReference,
        field: &FieldDescriptor,
    ) -> ObjectReference {
        unsafe { self.model.read_reference(object, field) }
    }

    /// Store a reference and run the collector's write barrier.
    pub(crate) fn write_reference(
        &self,
        object: ObjectReference,
        field: &FieldDescriptor,
        value: ObjectReference,
    ) {
        unsafe { self.model.write_reference(object, field, value) };
        self.manager
            .on_write_ref_member(self.model.object_to_block(object), value);
    }

    /// Run a collection and wait for it. Must not be called by an attached mutator.
    pub fn force_collection(&self, generation: usize) {
        self.manager.force_collection(generation);
    }

    pub fn request_stop(&self, callback: &mut dyn FnMut()) {
        self.accessor.request_stop(callback);
    }

    pub fn begin_collection(&self) -> Box<dyn CollectionSession> {
        self.accessor.begin_collection()
    }

    /// Make `hooks` the source of roots for every later collection session.
    pub fn attach_roots(&self, hooks: Weak<dyn CollectionHooks>) {
        self.accessor.attach_hooks(hooks);
    }

    /// Shut the collector down and check that it returned every block.
    pub fn dispose(self) -> Result<(), HarnessError> {
        let Runtime {
            manager,
            context,
            accessor,
            model,
            system,
            plan,
        } = self;
        drop(manager);
        drop(context);
        drop(accessor);
        drop(model);
        info!("{} shut down", plan);
        system.dispose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::plan::{self, PlanSelector};
    use crate::util::test_util::{small_options, small_runtime};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn runtime_without_allocatable_types_is_rejected() {
        let mut options = small_options(PlanSelector::NoGC);
        options.type_count = 1;
        let plugin = plan::create(options.plan, &options);
        assert!(matches!(
            Runtime::new(plugin.as_ref(), &options),
            Err(HarnessError::Config(ConfigError::TooFewTypes { type_count: 1 }))
        ));
    }

    #[test]
    fn random_objects_never_use_the_header_type() {
        let runtime = small_runtime(PlanSelector::NoGC);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..200 {
            let object = runtime.allocate_random_object(&mut rng).unwrap();
            let block = runtime.object_model().object_to_block(object);
            let type_id = unsafe { runtime.object_model().type_id_of(block) };
            assert!((1..runtime.object_model().type_count()).contains(&type_id));
        }
        Arc::try_unwrap(runtime).ok().unwrap().dispose().unwrap();
    }
}
