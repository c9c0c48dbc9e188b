//! # Placement
//!
//! Picks the next core for a process without changing any state; the
//! caller commits the decision through [`CoreAllocator::commit_alloc`].
//!
//! ## Packed policy
//!
//! ```text
//!   owns nothing ──▶ head of prov_unallocated
//!                    └─▶ walk down from the machine, always into the least
//!                        crowded child that still has room
//!
//!   owns cores   ──▶ closest core in prov_unallocated
//!                    └─▶ closest idle core among the siblings of owned
//!                        cores, widening Cpu → Socket → Numa → Machine
//! ```
//!
//! "Closest" is the sum of topology distances to every owned core.
//!
//! ## FCFS policy
//!
//! Head of `prov_unallocated`, else head of the idle pool.

use crate::allocator::{CoreAllocator, ProcCoreData};
use crate::config::PlacementPolicy;
use crate::list::CoreList;
use crate::types::{CoreId, NodeType, ProcId, KERNEL_CORE};

impl CoreAllocator {
    /// Choose a core for `p`, or `None` when nothing is available
    pub fn choose_core(&self, p: ProcId) -> Option<CoreId> {
        let data = self.record(p);

        let choice = match self.config.policy {
            PlacementPolicy::Packed if data.allocated.is_empty() => self.find_first_core(data),
            PlacementPolicy::Packed => self.find_best_core(data),
            PlacementPolicy::Fcfs => data
                .prov_unallocated
                .front()
                .or_else(|| self.cores.any_idle_core()),
        };

        match choice {
            Some(core) if core == KERNEL_CORE => {
                log::error!("corealloc: placement offered kernel core to {}", p);
                panic!("core {} is reserved for the kernel", KERNEL_CORE);
            },
            Some(core) => log::trace!("corealloc: chose core {} for {}", core, p),
            None => log::warn!("corealloc: no core available for {}", p),
        }

        choice
    }

    /// First core of a process that owns none
    ///
    /// Descends from the machine node. At each level a child with no
    /// allocated core is taken at once; otherwise the child with the lowest
    /// core refcount wins, skipping children that are already full.
    fn find_first_core(&self, data: &ProcCoreData) -> Option<CoreId> {
        if let Some(core) = data.prov_unallocated.front() {
            return Some(core);
        }

        let tree = &self.tree;
        let machine = tree.machine();
        let mut siblings = machine..machine + 1;
        let mut level = NodeType::Machine;

        loop {
            let capacity = tree.descendants(level, NodeType::Core);
            let mut best_refcount = 0;
            let mut best = None;

            for n in siblings {
                let refcount = tree.node(n).refcount(NodeType::Core);
                if refcount == 0 {
                    return Some(tree.first_core(n));
                }
                if best_refcount == 0 {
                    best_refcount = refcount;
                }
                if refcount <= best_refcount && refcount < capacity {
                    best_refcount = refcount;
                    best = Some(n);
                }
            }

            let best = best?;
            match level.child() {
                None => return tree.node(best).core(),
                Some(child) => {
                    siblings = tree.node(best).children();
                    level = child;
                },
            }
        }
    }

    /// Provisioned, unallocated core closest to what `p` already owns
    ///
    /// Ties go to the core listed first.
    fn find_best_core_provision(&self, data: &ProcCoreData) -> Option<CoreId> {
        let mut best: Option<(CoreId, u32)> = None;
        for core in data.prov_unallocated.iter() {
            let d = self.distance_to(&data.allocated, core);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((core, d));
            }
        }
        best.map(|(core, _)| core)
    }

    /// Next core of a process that owns at least one
    fn find_best_core(&self, data: &ProcCoreData) -> Option<CoreId> {
        if let Some(core) = self.find_best_core_provision(data) {
            return Some(core);
        }

        let tree = &self.tree;
        for level in [NodeType::Cpu, NodeType::Socket, NodeType::Numa, NodeType::Machine] {
            let mut best: Option<(CoreId, u32)> = None;

            for owned in data.allocated.iter() {
                for sib in tree.core_range(tree.ancestor(owned, level)) {
                    let entry = self.cores.pcore_for_id(sib);
                    if !entry.is_idle() {
                        continue;
                    }

                    let d = self.distance_to(&data.allocated, sib);
                    let better = match best {
                        None => true,
                        Some((_, bd)) if d < bd => true,
                        // Leave cores provisioned to others for their owners.
                        Some((bc, bd)) if d == bd => {
                            self.cores.pcore_for_id(bc).prov_proc.is_some()
                                && entry.prov_proc.is_none()
                        },
                        Some(_) => false,
                    };
                    if better {
                        best = Some((sib, d));
                    }
                }
            }

            if let Some((core, _)) = best {
                return Some(core);
            }
        }

        None
    }

    /// Sum of the distances from `core` to every core in `cores`
    fn distance_to(&self, cores: &CoreList, core: CoreId) -> u32 {
        cores
            .iter()
            .map(|other| self.tree.distance(core, other).index() as u32)
            .sum()
    }
}
