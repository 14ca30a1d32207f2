use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{AllocationError, HarnessError};
use crate::gc::MemoryManager;
use crate::util::{malloc, Address};

#[derive(Debug, Clone, Copy)]
struct Allocation {
    sequence: usize,
    size: usize,
}

/// The raw allocator underneath every collector. It keeps a ledger of live blocks so that a
/// collector that forgets to return memory is caught when the runtime is disposed.
#[derive(Default)]
pub struct SystemMemoryManager {
    live: spin::Mutex<HashMap<Address, Allocation>>,
    sequence: AtomicUsize,
}

impl SystemMemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks and bytes currently handed out.
    pub fn outstanding(&self) -> (usize, usize) {
        let live = self.live.lock();
        (live.len(), live.values().map(|a| a.size).sum())
    }

    /// Total number of allocations ever made.
    pub fn allocations(&self) -> usize {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Leak check: fails if any block is still outstanding.
    pub fn dispose(&self) -> Result<(), HarnessError> {
        let (count, bytes) = self.outstanding();
        if count > 0 {
            let live = self.live.lock();
            let mut oldest: Vec<_> = live.iter().map(|(b, a)| (a.sequence, *b, a.size)).collect();
            oldest.sort_unstable();
            for (sequence, block, size) in oldest.iter().take(8) {
                error!("Leaked block {} ({} bytes, allocation #{})", block, size, sequence);
            }
            return Err(HarnessError::Leak { count, bytes });
        }
        info!(
            "System memory manager disposed cleanly after {} allocations",
            self.allocations()
        );
        Ok(())
    }
}

impl MemoryManager for SystemMemoryManager {
    fn alloc(&self, size: usize) -> Result<Address, AllocationError> {
        let block = malloc::malloc(size.max(1));
        if block.is_zero() {
            return Err(AllocationError::OutOfMemory { size });
        }
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.live.lock().insert(block, Allocation { sequence, size });
        Ok(block)
    }

    fn free(&self, block: Address) {
        if self.live.lock().remove(&block).is_none() {
            warn!("Ignoring free of unknown block {}", block);
            return;
        }
        malloc::free(block);
    }
}

impl Drop for SystemMemoryManager {
    fn drop(&mut self) {
        let live = std::mem::take(&mut *self.live.lock());
        if !live.is_empty() {
            warn!(
                "System memory manager dropped with {} live block(s); releasing them",
                live.len()
            );
            for block in live.into_keys() {
                malloc::free(block);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_and_frees() {
        let system = SystemMemoryManager::new();
        let a = system.alloc(24).unwrap();
        let b = system.alloc(40).unwrap();
        assert_eq!(system.outstanding(), (2, 64));
        system.free(a);
        assert_eq!(system.outstanding(), (1, 40));
        system.free(b);
        assert!(system.dispose().is_ok());
        assert_eq!(system.allocations(), 2);
    }

    #[test]
    fn dispose_reports_leaks() {
        let system = SystemMemoryManager::new();
        let _leaked = system.alloc(16).unwrap();
        match system.dispose() {
            Err(HarnessError::Leak { count, bytes }) => {
                assert_eq!(count, 1);
                assert_eq!(bytes, 16);
            }
            other => panic!("expected a leak, got {:?}", other),
        }
    }

    #[test]
    fn unknown_free_is_ignored() {
        let system = SystemMemoryManager::new();
        let block = system.alloc(8).unwrap();
        system.free(block);
        system.free(block);
        assert_eq!(system.outstanding(), (0, 0));
    }
}
