use super::global::CollectionContext;
use super::{CollectionPolicy, CollectionStats};
use crate::error::{HarnessError, ObjectModelError};
use crate::layout::{FieldDescriptor, StructureBuilder, StructureLayout};
use crate::util::Address;

const MARK_FIELD: &str = "gcMark";

/// A non-moving tracing collector with a one-bit mark in the object header.
pub(crate) struct MarkSweep {
    mark: FieldDescriptor,
}

impl MarkSweep {
    fn is_marked(&self, block: Address) -> bool {
        unsafe { self.mark.load_bits(block) != 0 }
    }

    fn set_mark(&self, block: Address, marked: bool) {
        unsafe { self.mark.store_bits(block, marked as u64) }
    }

    /// Mark everything reachable from the roots. Returns the number of marked objects.
    fn mark(&self, ctx: &CollectionContext<'_>) -> Result<usize, HarnessError> {
        let mut worklist: Vec<Address> = ctx
            .roots()
            .into_iter()
            .map(|root| ctx.runtime.object_to_block(root))
            .collect();
        let mut marked = 0;
        while let Some(block) = worklist.pop() {
            if !ctx.heap.contains(block) {
                warn!("MarkSweep: {} is not a block of this heap; ignoring", block);
                continue;
            }
            if self.is_marked(block) {
                continue;
            }
            self.set_mark(block, true);
            marked += 1;
            let layout = unsafe { ctx.runtime.layout_for(block)? };
            for field in layout.reference_fields() {
                let child = unsafe { field.load_reference(block) };
                if !child.is_zero() {
                    worklist.push(child);
                }
            }
        }
        Ok(marked)
    }

    /// Free unmarked blocks and clear the marks of the rest. Returns the number freed.
    fn sweep(&self, ctx: &CollectionContext<'_>) -> Result<usize, HarnessError> {
        let mut freed = 0;
        for block in ctx.heap.blocks() {
            if self.is_marked(block) {
                self.set_mark(block, false);
            } else {
                ctx.heap.free(block)?;
                freed += 1;
            }
        }
        Ok(freed)
    }
}

impl CollectionPolicy for MarkSweep {
    const NAME: &'static str = "MarkSweep";

    fn augment_object_layout(header: &mut StructureBuilder) {
        header.define_field(MARK_FIELD).set_bits(1, 1);
    }

    fn new(header: &StructureLayout) -> Result<Self, HarnessError> {
        let mark = header
            .field_by_name(MARK_FIELD)
            .cloned()
            .ok_or_else(|| ObjectModelError::MissingHeaderField(MARK_FIELD.to_string()))?;
        Ok(MarkSweep { mark })
    }

    fn initialize_header(&self, block: Address) {
        self.set_mark(block, false);
    }

    fn collect(&self, ctx: &CollectionContext<'_>) -> Result<CollectionStats, HarnessError> {
        let live = self.mark(ctx)?;
        let freed = self.sweep(ctx)?;
        Ok(CollectionStats {
            live,
            freed,
            moved: 0,
        })
    }
}
