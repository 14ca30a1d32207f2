use super::global::CollectionContext;
use super::{CollectionPolicy, CollectionStats};
use crate::error::HarnessError;
use crate::layout::StructureLayout;

/// Never reclaims anything. Blocks are returned when the manager shuts down.
pub(crate) struct NoGC;

impl CollectionPolicy for NoGC {
    const NAME: &'static str = "NoGC";

    fn new(_header: &StructureLayout) -> Result<Self, HarnessError> {
        Ok(NoGC)
    }

    fn collect(&self, ctx: &CollectionContext<'_>) -> Result<CollectionStats, HarnessError> {
        debug!("NoGC: collection requested, nothing to do");
        Ok(CollectionStats {
            live: ctx.heap.live_blocks(),
            ..Default::default()
        })
    }
}
