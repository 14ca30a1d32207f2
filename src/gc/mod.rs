//! The contract between the harness and a garbage collector.
//!
//! A collector is a [`GcPlugin`]. The runtime asks it for a [`ManagementContext`], lets the
//! context contribute header fields, and then asks it for an [`AutoMemoryManager`] that
//! allocates on top of the harness's own [`MemoryManager`]. While it runs, the collector talks
//! back to the harness through [`RuntimeContextAccessor`] (stopping mutators, opening
//! [`CollectionSession`]s) and [`RuntimeGlobalAccessor`] (object layouts and pointer
//! conversions).
//!
//! The block/object distinction matters throughout: managers hand out and take back *block*
//! addresses ([`Address`]), the mutator and the root set speak *object* references
//! ([`ObjectReference`]), and reference fields hold object references in memory.

use std::sync::Arc;

use crate::error::{AllocationError, HarnessError, ObjectModelError};
use crate::layout::{StructureBuilder, StructureLayout};
use crate::util::{Address, ObjectReference};

pub use crate::collection::CollectionSession;

/// A collector implementation that can be selected by name.
pub trait GcPlugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn version(&self) -> &'static str {
        "0.0.0"
    }

    /// Create the per-runtime context. The accessor is usable for pointer conversions right
    /// away; layouts become available once the object model is built, which happens before
    /// [`ManagementContext::create_manager`] is called.
    fn create_management_context(
        &self,
        runtime: Arc<dyn RuntimeGlobalAccessor>,
    ) -> Box<dyn ManagementContext>;
}

pub trait ManagementContext: Send + Sync {
    /// Add collector-owned fields to the object header. Called exactly once, before any
    /// object type is laid out. The fields end up before `typeId`, at negative offsets from
    /// the object pointer.
    fn augment_object_layout(&self, _header: &mut StructureBuilder) {}

    /// Create the memory manager objects are allocated from. `underlying` is where the
    /// manager gets its raw blocks; every block it takes from there must be given back before
    /// the manager is dropped.
    fn create_manager(
        &self,
        underlying: Arc<dyn MemoryManager>,
        runtime: Arc<dyn RuntimeContextAccessor>,
    ) -> Result<Box<dyn AutoMemoryManager>, HarnessError>;
}

/// Raw block allocation.
pub trait MemoryManager: Send + Sync {
    /// Allocate a block of at least `size` bytes. The contents are unspecified.
    fn alloc(&self, size: usize) -> Result<Address, AllocationError>;

    fn free(&self, block: Address);
}

/// A memory manager that reclaims memory on its own.
pub trait AutoMemoryManager: MemoryManager {
    /// Write barrier. Called after `reference` was stored into a reference field of the
    /// object in `block`.
    fn on_write_ref_member(&self, _block: Address, _reference: ObjectReference) {}

    /// Run a collection and wait for it to finish.
    ///
    /// Must not be called from a mutator attached to the run gate: the collection waits
    /// for that mutator to park.
    fn force_collection(&self, generation: usize);
}

/// Services the runtime offers a collector for stopping the world.
pub trait RuntimeContextAccessor: Send + Sync {
    /// Is any attached mutator currently running (neither parked nor finished)?
    fn is_running(&self) -> bool;

    /// Ask every mutator to stop at its next safepoint. The callback runs synchronously once
    /// the request is posted; this call does not wait for the mutators to park.
    fn request_stop(&self, callback: &mut dyn FnMut());

    /// Block until no attached mutator is running.
    fn wait_until_stopped(&self);

    /// Open a collection session. Dropping the session releases the mutators.
    fn begin_collection(&self) -> Box<dyn CollectionSession>;
}

/// Services that need the object model.
pub trait RuntimeGlobalAccessor: RuntimeContextAccessor {
    /// The layout of the object stored in `block`, found through its `typeId` header field.
    ///
    /// # Safety
    /// `block` must be a live object block.
    unsafe fn layout_for(&self, block: Address) -> Result<&StructureLayout, ObjectModelError>;

    /// The header layout shared by every object type.
    fn default_layout(&self) -> Result<&StructureLayout, ObjectModelError>;

    fn object_to_block(&self, object: ObjectReference) -> Address;

    fn block_to_object(&self, block: Address) -> ObjectReference;
}
