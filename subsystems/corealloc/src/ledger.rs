//! # Provisioning Ledger
//!
//! Provisioning reserves a specific core for a process independently of
//! who currently holds it. The last writer wins; permission checks belong
//! to whoever calls in here.
//!
//! A provisioned core sits on exactly one of its provisioned owner's lists:
//!
//! ```text
//!   alloc_proc == prov_proc  ──▶  prov_allocated
//!   anything else            ──▶  prov_unallocated   (idle, or a victim)
//! ```

use crate::allocator::{record_mut, CoreAllocator};
use crate::types::{CoreId, CoreOwner, ProcId, KERNEL_CORE};

impl CoreAllocator {
    /// Provision `core` to `p`, or clear its provisioning when `p` is `None`
    pub fn provision(&mut self, p: Option<ProcId>, core: CoreId) {
        assert_ne!(core, KERNEL_CORE, "core {} is reserved for the kernel", KERNEL_CORE);
        if let Some(p) = p {
            assert!(
                self.procs.contains_key(&p),
                "{} is not registered with the core allocator",
                p
            );
        }

        let entry = self.cores.pcore_for_id(core);
        let alloc = entry.alloc_proc;
        let previous = entry.prov_proc;

        if let Some(prev) = previous {
            match self.procs.get_mut(&prev) {
                Some(data) if alloc == Some(CoreOwner::Process(prev)) => {
                    data.prov_allocated.remove(core);
                },
                Some(data) => {
                    data.prov_unallocated.remove(core);
                },
                None => log::warn!(
                    "corealloc: core {} was provisioned to unregistered {}",
                    core,
                    prev
                ),
            }
        }

        if let Some(p) = p {
            let data = record_mut(&mut self.procs, p);
            if alloc == Some(CoreOwner::Process(p)) {
                data.prov_allocated.push_back(core);
            } else {
                data.prov_unallocated.push_back(core);
            }
        }

        self.cores.pcore_for_id_mut(core).prov_proc = p;

        match (previous, p) {
            (Some(prev), Some(p)) if prev != p => {
                log::debug!("corealloc: core {} reprovisioned {} -> {}", core, prev, p)
            },
            (_, Some(p)) => log::debug!("corealloc: core {} provisioned to {}", core, p),
            (Some(prev), None) => log::debug!("corealloc: core {} unprovisioned from {}", core, prev),
            (None, None) => {},
        }

        self.after_mutation();
    }

    /// Clear every provisioning held by `p` (process teardown)
    pub fn unprovision_all(&mut self, p: ProcId) {
        let data = record_mut(&mut self.procs, p);
        let prov_allocated = data.prov_allocated.take();
        let prov_unallocated = data.prov_unallocated.take();

        for core in prov_allocated.iter().chain(prov_unallocated.iter()) {
            self.cores.pcore_for_id_mut(core).prov_proc = None;
        }

        log::debug!(
            "corealloc: unprovisioned {} cores from {}",
            prov_allocated.len() + prov_unallocated.len(),
            p
        );
        self.after_mutation();
    }
}
