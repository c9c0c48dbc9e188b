//! # Locked Allocator
//!
//! The allocator itself takes no locks. Kernels that share it between CPUs
//! wrap it here: one spinlock covers the whole ledger, and `alloc_core`
//! holds it across the choose/commit pair so no other caller can grab the
//! chosen core in between.

use spin::{Mutex, MutexGuard};
use static_assertions::assert_impl_all;

use crate::allocator::CoreAllocator;
use crate::types::{CoreId, ProcId};

/// Core allocator behind a single coarse spinlock
#[derive(Debug)]
pub struct LockedCoreAllocator {
    inner: Mutex<CoreAllocator>,
}

assert_impl_all!(LockedCoreAllocator: Send, Sync);

impl LockedCoreAllocator {
    pub fn new(allocator: CoreAllocator) -> Self {
        Self {
            inner: Mutex::new(allocator),
        }
    }

    /// Take the lock for a sequence of operations
    pub fn lock(&self) -> MutexGuard<'_, CoreAllocator> {
        self.inner.lock()
    }

    /// Choose and commit one core for `p` atomically
    pub fn alloc_core(&self, p: ProcId) -> Option<CoreId> {
        let mut allocator = self.inner.lock();
        let core = allocator.choose_core(p)?;
        allocator.commit_alloc(p, core);
        Some(core)
    }

    /// Give `core` back to the idle pool
    pub fn free_core(&self, p: ProcId, core: CoreId) {
        self.inner.lock().commit_dealloc(p, core);
    }

    pub fn into_inner(self) -> CoreAllocator {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreAllocConfig;
    use crate::topology::CpuTopologyInfo;

    #[test]
    fn test_alloc_and_free() {
        let info = CpuTopologyInfo::uniform(2, 2, 1, 2);
        let locked = LockedCoreAllocator::new(
            CoreAllocator::new(&info, CoreAllocConfig::new().with_validation(true)).unwrap(),
        );
        let p = ProcId(1);
        locked.lock().register_proc(p).unwrap();

        assert_eq!(locked.alloc_core(p), Some(4));
        assert_eq!(locked.alloc_core(p), Some(5));
        locked.free_core(p, 4);

        let allocator = locked.into_inner();
        assert_eq!(allocator.proc_data(p).unwrap().allocated().to_vec(), alloc::vec![5]);
        assert!(allocator.idle_cores().contains(4));
    }

    #[test]
    fn test_shared_between_threads() {
        use std::sync::Arc;
        use std::thread;
        use std::vec::Vec;

        let info = CpuTopologyInfo::uniform(2, 2, 2, 2);
        let locked = Arc::new(LockedCoreAllocator::new(
            CoreAllocator::new(&info, CoreAllocConfig::new().with_validation(true)).unwrap(),
        ));
        for pid in 1..=3 {
            locked.lock().register_proc(ProcId(pid)).unwrap();
        }

        let handles: Vec<_> = (1..=3)
            .map(|pid| {
                let locked = Arc::clone(&locked);
                thread::spawn(move || {
                    let mut got = Vec::new();
                    while let Some(core) = locked.alloc_core(ProcId(pid)) {
                        got.push(core);
                    }
                    got
                })
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap().len()).sum();
        // 16 cores, one kept by the kernel.
        assert_eq!(total, 15);
        assert!(locked.lock().check_invariants().is_ok());
    }
}
