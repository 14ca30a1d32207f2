//! Machinery shared by the built-in plans: block bookkeeping, the plugin and context
//! wrappers, and the manager that drives a [`CollectionPolicy`].

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::controller::GCController;
use super::{CollectionPolicy, CollectionStats};
use crate::collection::CollectionSession;
use crate::error::{AllocationError, HarnessError};
use crate::gc::{
    AutoMemoryManager, GcPlugin, ManagementContext, MemoryManager, RuntimeContextAccessor,
    RuntimeGlobalAccessor,
};
use crate::layout::StructureBuilder;
use crate::util::{Address, ObjectReference};

/// Blocks a plan took from the underlying memory manager and has not returned yet.
pub(crate) struct Heap {
    underlying: Arc<dyn MemoryManager>,
    blocks: spin::Mutex<HashMap<Address, usize>>,
    allocation_volume: AtomicUsize,
}

impl Heap {
    pub(crate) fn new(underlying: Arc<dyn MemoryManager>) -> Self {
        Heap {
            underlying,
            blocks: spin::Mutex::new(HashMap::new()),
            allocation_volume: AtomicUsize::new(0),
        }
    }

    pub(crate) fn alloc(&self, size: usize) -> Result<Address, AllocationError> {
        let block = self.underlying.alloc(size)?;
        self.blocks.lock().insert(block, size);
        self.allocation_volume.fetch_add(size, Ordering::Relaxed);
        Ok(block)
    }

    pub(crate) fn free(&self, block: Address) -> Result<(), AllocationError> {
        if self.blocks.lock().remove(&block).is_none() {
            return Err(AllocationError::UnknownBlock { block });
        }
        self.underlying.free(block);
        Ok(())
    }

    pub(crate) fn contains(&self, block: Address) -> bool {
        self.blocks.lock().contains_key(&block)
    }

    /// Snapshot of the live blocks, in address order.
    pub(crate) fn blocks(&self) -> Vec<Address> {
        let mut blocks: Vec<Address> = self.blocks.lock().keys().copied().collect();
        blocks.sort_unstable();
        blocks
    }

    pub(crate) fn live_blocks(&self) -> usize {
        self.blocks.lock().len()
    }

    pub(crate) fn live_bytes(&self) -> usize {
        self.blocks.lock().values().sum()
    }

    /// Bytes allocated since the last call.
    fn take_allocation_volume(&self) -> usize {
        self.allocation_volume.swap(0, Ordering::Relaxed)
    }

    fn allocation_volume(&self) -> usize {
        self.allocation_volume.load(Ordering::Relaxed)
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        let blocks = std::mem::take(&mut *self.blocks.lock());
        debug!("Releasing {} block(s) on shutdown", blocks.len());
        for block in blocks.into_keys() {
            self.underlying.free(block);
        }
    }
}

/// What a policy gets to work with during a collection.
pub(crate) struct CollectionContext<'a> {
    pub heap: &'a Heap,
    pub session: &'a dyn CollectionSession,
    pub runtime: &'a dyn RuntimeGlobalAccessor,
}

impl CollectionContext<'_> {
    /// Every non-null root of every priority.
    pub(crate) fn roots(&self) -> Vec<ObjectReference> {
        (0..self.session.root_priorities_count())
            .flat_map(|priority| self.session.get_roots(priority))
            .filter(|root| !root.is_null())
            .collect()
    }
}

/// The state a plan manager shares with its controller thread.
pub(crate) struct PlanState<P: CollectionPolicy> {
    policy: P,
    heap: Heap,
    global: Arc<dyn RuntimeGlobalAccessor>,
    runtime: Arc<dyn RuntimeContextAccessor>,
    collections: AtomicUsize,
}

impl<P: CollectionPolicy> PlanState<P> {
    pub(crate) fn name(&self) -> &'static str {
        P::NAME
    }

    /// Stop the mutators, run the policy, and release the mutators.
    pub(crate) fn collect(&self, generation: usize) {
        let count = self.collections.fetch_add(1, Ordering::Relaxed) + 1;
        let mut on_stop = || debug!("{}: stop requested for collection #{}", P::NAME, count);
        self.runtime.request_stop(&mut on_stop);
        self.runtime.wait_until_stopped();

        let before = self.heap.live_bytes();
        let session = self.runtime.begin_collection();
        let result = self.policy.collect(&CollectionContext {
            heap: &self.heap,
            session: session.as_ref(),
            runtime: self.global.as_ref(),
        });
        drop(session);
        self.heap.take_allocation_volume();

        match result {
            Ok(stats) => info!(
                "{}: collection #{} (generation {}) done: {} live, {} freed, {} moved, {} -> {} bytes",
                P::NAME,
                count,
                generation,
                stats.live,
                stats.freed,
                stats.moved,
                before,
                self.heap.live_bytes()
            ),
            Err(e) => error!("{}: collection #{} failed: {}", P::NAME, count, e),
        }
    }

    pub(crate) fn collections(&self) -> usize {
        self.collections.load(Ordering::Relaxed)
    }
}

/// The manager handed to the runtime.
pub(crate) struct PlanManager<P: CollectionPolicy> {
    // Declared first so the controller thread is joined before the state goes.
    controller: GCController,
    state: Arc<PlanState<P>>,
    stress_factor: usize,
}

impl<P: CollectionPolicy> MemoryManager for PlanManager<P> {
    fn alloc(&self, size: usize) -> Result<Address, AllocationError> {
        let block = self.state.heap.alloc(size)?;
        self.state.policy.initialize_header(block);
        if self.stress_factor > 0 && self.state.heap.allocation_volume() >= self.stress_factor {
            self.state.heap.take_allocation_volume();
            trace!("{}: stress collection requested", P::NAME);
            self.controller.request(0);
        }
        Ok(block)
    }

    fn free(&self, block: Address) {
        if let Err(e) = self.state.heap.free(block) {
            warn!("{}: {}", P::NAME, e);
        }
    }
}

impl<P: CollectionPolicy> AutoMemoryManager for PlanManager<P> {
    fn on_write_ref_member(&self, block: Address, reference: ObjectReference) {
        #[cfg(feature = "extreme_assertions")]
        assert!(
            self.state.heap.contains(block),
            "{}: write barrier on unknown block {}",
            P::NAME,
            block
        );
        self.state.policy.on_write_ref_member(block, reference);
    }

    fn force_collection(&self, generation: usize) {
        self.controller.request_and_wait(generation);
    }
}

impl<P: CollectionPolicy> Drop for PlanManager<P> {
    fn drop(&mut self) {
        info!(
            "{}: shutting down after {} collection(s), {} block(s) still live",
            P::NAME,
            self.state.collections(),
            self.state.heap.live_blocks()
        );
    }
}

/// The management context of a built-in plan.
pub(crate) struct PlanContext<P: CollectionPolicy> {
    global: Arc<dyn RuntimeGlobalAccessor>,
    stress_factor: usize,
    _policy: PhantomData<fn() -> P>,
}

impl<P: CollectionPolicy> ManagementContext for PlanContext<P> {
    fn augment_object_layout(&self, header: &mut StructureBuilder) {
        P::augment_object_layout(header);
    }

    fn create_manager(
        &self,
        underlying: Arc<dyn MemoryManager>,
        runtime: Arc<dyn RuntimeContextAccessor>,
    ) -> Result<Box<dyn AutoMemoryManager>, HarnessError> {
        let policy = P::new(self.global.default_layout()?)?;
        let state = Arc::new(PlanState {
            policy,
            heap: Heap::new(underlying),
            global: self.global.clone(),
            runtime,
            collections: AtomicUsize::new(0),
        });
        let controller = GCController::spawn(state.clone())?;
        Ok(Box::new(PlanManager {
            controller,
            state,
            stress_factor: self.stress_factor,
        }))
    }
}

/// A built-in plan as a [`GcPlugin`].
pub(crate) struct Plan<P: CollectionPolicy> {
    stress_factor: usize,
    _policy: PhantomData<fn() -> P>,
}

impl<P: CollectionPolicy> Plan<P> {
    /// `stress_factor` is the allocation volume in bytes between two triggered collections.
    /// Zero never triggers.
    pub(crate) fn new(stress_factor: usize) -> Self {
        Plan {
            stress_factor,
            _policy: PhantomData,
        }
    }
}

impl<P: CollectionPolicy> GcPlugin for Plan<P> {
    fn name(&self) -> &'static str {
        P::NAME
    }

    fn version(&self) -> &'static str {
        crate::build_info::PKG_VERSION
    }

    fn create_management_context(
        &self,
        runtime: Arc<dyn RuntimeGlobalAccessor>,
    ) -> Box<dyn ManagementContext> {
        Box::new(PlanContext::<P> {
            global: runtime,
            stress_factor: self.stress_factor,
            _policy: PhantomData,
        })
    }
}
