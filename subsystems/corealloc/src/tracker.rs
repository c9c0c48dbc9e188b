//! # Allocation Tracker
//!
//! Commits placement decisions: core ownership, list membership and the
//! topology refcounts all change here and nowhere else.
//!
//! ```text
//!            commit_alloc(p)                 commit_dealloc(p)
//!   Idle ───────────────────▶ Allocated(p) ───────────────────▶ Idle
//!
//!   Allocated(q), provisioned to p ── commit_alloc(p) ──▶ Allocated(p)
//!                                    (q loses the core: victim transfer)
//! ```

use crate::allocator::{record_mut, CoreAllocator};
use crate::types::{CoreId, CoreOwner, ProcId, KERNEL_CORE};

impl CoreAllocator {
    /// Hand `core` to `p`
    ///
    /// Allocating a core `p` already owns means the ledger is corrupt and
    /// is fatal, as is taking a core from another process that is not
    /// provisioned to `p`.
    pub fn commit_alloc(&mut self, p: ProcId, core: CoreId) {
        let entry = self.cores.pcore_for_id(core);
        let owner = entry.alloc_proc;
        let provisioned_to_p = entry.prov_proc == Some(p);

        match owner {
            Some(CoreOwner::Process(q)) if q == p => {
                log::error!("corealloc: double allocation of core {} to {}", core, p);
                panic!("core {} is already allocated to {}", core, p);
            },
            Some(CoreOwner::Kernel) => {
                panic!("core {} is reserved for the kernel", core);
            },
            Some(CoreOwner::Process(q)) if !provisioned_to_p => {
                log::error!("corealloc: core {} held by {} requested by {}", core, q, p);
                panic!("core {} is allocated to {} and not provisioned to {}", core, q, p);
            },
            _ => {},
        }

        if provisioned_to_p {
            let data = record_mut(&mut self.procs, p);
            data.prov_unallocated.remove(core);
            data.prov_allocated.push_front(core);

            if let Some(CoreOwner::Process(victim)) = owner {
                match self.procs.get_mut(&victim) {
                    Some(data) => {
                        data.allocated.remove(core);
                    },
                    None => log::warn!("corealloc: victim {} of core {} is gone", victim, core),
                }
                log::debug!("corealloc: core {} taken back from {} for {}", core, victim, p);
            }
        }

        record_mut(&mut self.procs, p).allocated.push_back(core);
        self.cores.pcore_for_id_mut(core).alloc_proc = Some(CoreOwner::Process(p));
        self.cores.take_idle(core);
        self.tree.incref(core);

        log::debug!("corealloc: core {} allocated to {}", core, p);
        self.after_mutation();
    }

    /// Take `core` back from `p` and return it to the idle pool
    ///
    /// The kernel core is never released. A core still provisioned to `p`
    /// goes to the head of its `prov_unallocated` list so it is offered to
    /// `p` first next time.
    pub fn commit_dealloc(&mut self, p: ProcId, core: CoreId) {
        if core == KERNEL_CORE {
            return;
        }

        let entry = self.cores.pcore_for_id_mut(core);
        if entry.alloc_proc != Some(CoreOwner::Process(p)) {
            log::error!(
                "corealloc: {} frees core {} owned by {:?}",
                p,
                core,
                entry.alloc_proc
            );
            panic!("core {} is not allocated to {}", core, p);
        }
        entry.alloc_proc = None;
        let still_provisioned = entry.prov_proc == Some(p);

        let data = record_mut(&mut self.procs, p);
        data.allocated.remove(core);
        if still_provisioned {
            data.prov_allocated.remove(core);
            data.prov_unallocated.push_front(core);
        }

        self.cores.release_idle(core);
        self.tree.decref(core);

        log::debug!("corealloc: core {} released by {}", core, p);
        self.after_mutation();
    }
}

#[cfg(test)]
mod tests {
    use crate::allocator::CoreAllocator;
    use crate::config::CoreAllocConfig;
    use crate::topology::CpuTopologyInfo;
    use crate::types::{CoreOwner, NodeType, ProcId, KERNEL_CORE};

    const P1: ProcId = ProcId(1);
    const P2: ProcId = ProcId(2);

    fn toy() -> CoreAllocator {
        let info = CpuTopologyInfo::uniform(2, 2, 1, 2);
        let mut alloc =
            CoreAllocator::new(&info, CoreAllocConfig::new().with_validation(true)).unwrap();
        alloc.register_proc(P1).unwrap();
        alloc.register_proc(P2).unwrap();
        alloc
    }

    #[test]
    fn test_alloc_moves_core() {
        let mut alloc = toy();
        alloc.commit_alloc(P1, 5);

        assert_eq!(alloc.alloc_proc(5), Some(CoreOwner::Process(P1)));
        assert!(!alloc.idle_cores().contains(5));
        assert_eq!(alloc.proc_data(P1).unwrap().allocated().to_vec(), alloc::vec![5]);

        let numa1 = alloc.tree().node_by_id(NodeType::Numa, 1);
        assert_eq!(numa1.refcount(NodeType::Core), 1);
        assert_eq!(numa1.refcount(NodeType::Numa), 1);
    }

    #[test]
    fn test_round_trip() {
        let mut alloc = toy();
        let before = alloc.proc_data(P1).unwrap().clone();

        alloc.commit_alloc(P1, 6);
        let core = alloc.core_id_of(alloc.entry_of(6));
        alloc.commit_dealloc(P1, core);

        assert_eq!(alloc.proc_data(P1).unwrap(), &before);
        assert_eq!(alloc.alloc_proc(6), None);
        assert!(alloc.idle_cores().contains(6));
        let machine = alloc.tree().node(alloc.tree().machine());
        // Only the kernel core remains counted.
        assert_eq!(machine.refcount(NodeType::Core), 1);
    }

    #[test]
    fn test_provisioned_alloc_and_dealloc() {
        let mut alloc = toy();
        alloc.provision(Some(P1), 3);
        alloc.provision(Some(P1), 7);

        alloc.commit_alloc(P1, 7);
        let data = alloc.proc_data(P1).unwrap();
        assert_eq!(data.provisioned_allocated().to_vec(), alloc::vec![7]);
        assert_eq!(data.provisioned_unallocated().to_vec(), alloc::vec![3]);

        alloc.commit_dealloc(P1, 7);
        let data = alloc.proc_data(P1).unwrap();
        assert!(data.provisioned_allocated().is_empty());
        // Freed provisioned core is offered first next time.
        assert_eq!(data.provisioned_unallocated().to_vec(), alloc::vec![7, 3]);
        assert_eq!(alloc.prov_proc(7), Some(P1));
    }

    #[test]
    fn test_victim_transfer() {
        let mut alloc = toy();
        alloc.commit_alloc(P2, 4);
        alloc.provision(Some(P1), 4);

        alloc.commit_alloc(P1, 4);

        assert_eq!(alloc.alloc_proc(4), Some(CoreOwner::Process(P1)));
        assert!(alloc.proc_data(P2).unwrap().allocated().is_empty());
        assert_eq!(
            alloc.proc_data(P1).unwrap().provisioned_allocated().to_vec(),
            alloc::vec![4]
        );
        // Still one allocated core under numa 1.
        let numa1 = alloc.tree().node_by_id(NodeType::Numa, 1);
        assert_eq!(numa1.refcount(NodeType::Core), 1);
    }

    #[test]
    fn test_dealloc_kernel_core_is_noop() {
        let mut alloc = toy();
        alloc.commit_dealloc(P1, KERNEL_CORE);
        assert_eq!(alloc.alloc_proc(KERNEL_CORE), Some(CoreOwner::Kernel));
        assert!(!alloc.idle_cores().contains(KERNEL_CORE));
    }

    #[test]
    #[should_panic(expected = "already allocated")]
    fn test_double_alloc() {
        let mut alloc = toy();
        alloc.commit_alloc(P1, 2);
        alloc.commit_alloc(P1, 2);
    }

    #[test]
    #[should_panic(expected = "not provisioned")]
    fn test_steal_unprovisioned_core() {
        let mut alloc = toy();
        alloc.commit_alloc(P1, 2);
        alloc.commit_alloc(P2, 2);
    }

    #[test]
    #[should_panic(expected = "reserved for the kernel")]
    fn test_alloc_kernel_core() {
        let mut alloc = toy();
        alloc.commit_alloc(P1, KERNEL_CORE);
    }

    #[test]
    #[should_panic(expected = "not allocated to")]
    fn test_dealloc_foreign_core() {
        let mut alloc = toy();
        alloc.commit_alloc(P1, 2);
        alloc.commit_dealloc(P2, 2);
    }
}
