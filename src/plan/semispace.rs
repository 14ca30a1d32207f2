use std::collections::HashSet;

use super::global::CollectionContext;
use super::{CollectionPolicy, CollectionStats};
use crate::error::{HarnessError, ObjectModelError};
use crate::layout::{FieldDescriptor, StructureBuilder, StructureLayout};
use crate::util::constants::BYTES_IN_ADDRESS;
use crate::util::{memory, Address};

const FORWARD_FIELD: &str = "gcForward";

/// A copying collector. Every reachable object is copied into a fresh block, every root is
/// spliced to its copy, and all blocks that existed before the collection are freed.
///
/// The pointer-width `gcForward` header word is zero in a live object and holds the new
/// block address in an object that has been copied.
pub(crate) struct SemiSpace {
    forward: FieldDescriptor,
}

/// Per-collection copying state.
struct Copier<'a, 'c> {
    ctx: &'a CollectionContext<'c>,
    forward: &'a FieldDescriptor,
    from_space: HashSet<Address>,
    scan: Vec<Address>,
    moved: usize,
}

impl Copier<'_, '_> {
    fn forwarding_address(&self, block: Address) -> Option<Address> {
        let raw = unsafe { self.forward.load::<usize>(block) };
        (raw != 0).then(|| unsafe { Address::from_usize(raw) })
    }

    /// Copy `block` unless it already was. Returns the block the object lives in now.
    fn forward(&mut self, block: Address) -> Result<Address, HarnessError> {
        if !self.from_space.contains(&block) {
            // Already a copy, or not ours.
            return Ok(block);
        }
        if let Some(new_block) = self.forwarding_address(block) {
            return Ok(new_block);
        }
        let size = unsafe { self.ctx.runtime.layout_for(block)? }.aligned_size();
        let new_block = self.ctx.heap.alloc(size)?;
        unsafe {
            memory::copy(block, new_block, size);
            self.forward.store::<usize>(new_block, 0);
            self.forward.store::<usize>(block, new_block.as_usize());
        }
        trace!("SemiSpace: {} -> {} ({} bytes)", block, new_block, size);
        self.scan.push(new_block);
        self.moved += 1;
        Ok(new_block)
    }

    /// Rewrite the reference fields of every copy, copying their targets on the way.
    fn scan(&mut self) -> Result<(), HarnessError> {
        while let Some(block) = self.scan.pop() {
            let layout = unsafe { self.ctx.runtime.layout_for(block)? };
            for field in layout.reference_fields() {
                let child = unsafe { field.load_reference(block) };
                if child.is_zero() {
                    continue;
                }
                let new_child = self.forward(child)?;
                if new_child != child {
                    unsafe { field.store_reference(block, new_child) };
                }
            }
        }
        Ok(())
    }
}

impl CollectionPolicy for SemiSpace {
    const NAME: &'static str = "SemiSpace";

    fn augment_object_layout(header: &mut StructureBuilder) {
        header.define_field(FORWARD_FIELD).set_size(BYTES_IN_ADDRESS);
    }

    fn new(header: &StructureLayout) -> Result<Self, HarnessError> {
        let forward = header
            .field_by_name(FORWARD_FIELD)
            .cloned()
            .ok_or_else(|| ObjectModelError::MissingHeaderField(FORWARD_FIELD.to_string()))?;
        Ok(SemiSpace { forward })
    }

    fn initialize_header(&self, block: Address) {
        unsafe { self.forward.store::<usize>(block, 0) }
    }

    fn collect(&self, ctx: &CollectionContext<'_>) -> Result<CollectionStats, HarnessError> {
        let from_space: Vec<Address> = ctx.heap.blocks();
        let mut copier = Copier {
            ctx,
            forward: &self.forward,
            from_space: from_space.iter().copied().collect(),
            scan: vec![],
            moved: 0,
        };

        for root in ctx.roots() {
            let block = ctx.runtime.object_to_block(root);
            let new_block = copier.forward(block)?;
            if new_block != block {
                ctx.session
                    .splice_object_ref(root, ctx.runtime.block_to_object(new_block));
            }
            copier.scan()?;
        }

        for block in &from_space {
            ctx.heap.free(*block)?;
        }
        Ok(CollectionStats {
            live: copier.moved,
            freed: from_space.len(),
            moved: copier.moved,
        })
    }
}
