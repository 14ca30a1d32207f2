use std::sync::{Arc, OnceLock, RwLock, Weak};

use crate::collection::{CollectionHooks, CollectionSession, RunGate, RuntimeCollectionSession};
use crate::error::ObjectModelError;
use crate::gc::{RuntimeContextAccessor, RuntimeGlobalAccessor};
use crate::layout::{LayoutContext, StructureLayout};
use crate::object_model::ObjectModel;
use crate::util::{Address, ObjectReference};

/// What the runtime hands to collectors. Owned jointly by the runtime and the collector.
pub struct RuntimeAccessor {
    layout_context: Arc<LayoutContext>,
    model: OnceLock<Arc<ObjectModel>>,
    gate: Arc<RunGate>,
    // Weak: the hooks own an Arc of the runtime.
    hooks: RwLock<Option<Weak<dyn CollectionHooks>>>,
}

impl RuntimeAccessor {
    pub(crate) fn new(layout_context: Arc<LayoutContext>) -> Self {
        RuntimeAccessor {
            layout_context,
            model: OnceLock::new(),
            gate: RunGate::new(),
            hooks: RwLock::new(None),
        }
    }

    pub(crate) fn install_model(&self, model: Arc<ObjectModel>) {
        if self.model.set(model).is_err() {
            warn!("Object model installed twice; keeping the first one");
        }
    }

    fn model(&self) -> Result<&ObjectModel, ObjectModelError> {
        self.model
            .get()
            .map(|m| m.as_ref())
            .ok_or(ObjectModelError::NotInitialized)
    }

    pub fn gate(&self) -> &Arc<RunGate> {
        &self.gate
    }

    pub(crate) fn attach_hooks(&self, hooks: Weak<dyn CollectionHooks>) {
        *self.hooks.write().unwrap() = Some(hooks);
    }

    fn hooks(&self) -> Option<Arc<dyn CollectionHooks>> {
        self.hooks.read().unwrap().as_ref().and_then(Weak::upgrade)
    }
}

impl RuntimeContextAccessor for RuntimeAccessor {
    fn is_running(&self) -> bool {
        self.gate.is_running()
    }

    fn request_stop(&self, callback: &mut dyn FnMut()) {
        self.gate.close();
        callback();
    }

    fn wait_until_stopped(&self) {
        self.gate.wait_until_stopped();
    }

    fn begin_collection(&self) -> Box<dyn CollectionSession> {
        if self.gate.is_running() {
            warn!("Collection session opened while a mutator is still running");
        }
        Box::new(RuntimeCollectionSession::new(
            self.gate.clone(),
            self.hooks(),
        ))
    }
}

impl RuntimeGlobalAccessor for RuntimeAccessor {
    unsafe fn layout_for(&self, block: Address) -> Result<&StructureLayout, ObjectModelError> {
        self.model()?.layout_for(block)
    }

    fn default_layout(&self) -> Result<&StructureLayout, ObjectModelError> {
        Ok(self.model()?.header())
    }

    fn object_to_block(&self, object: ObjectReference) -> Address {
        object.to_raw_address() - self.layout_context.obj_ref_diff()
    }

    fn block_to_object(&self, block: Address) -> ObjectReference {
        ObjectReference::from_raw_address(block + self.layout_context.obj_ref_diff())
    }
}
