//! # Invariant Checker
//!
//! Walks the whole ledger and reports the first broken invariant. Runs
//! after every mutation when validation is enabled, and from tests.
//!
//! Checked, in order:
//!
//! 1. The kernel core is owned by the kernel, never idle, never provisioned.
//! 2. A core is on the idle list iff nobody owns it; the list has no repeats.
//! 3. Every process list is repeat-free and agrees with the core map.
//! 4. Every owned or provisioned core sits on its owner's lists.
//! 5. `refcount[L]` of every node equals the occupied level-`L` nodes
//!    beneath it.

use alloc::format;
use alloc::string::String;

use crate::allocator::CoreAllocator;
use crate::error::{AllocResult, CoreAllocError};
use crate::list::CoreList;
use crate::types::{CoreId, CoreOwner, NodeIndex, NodeType, ProcId, KERNEL_CORE};

fn violation(what: String) -> AllocResult<()> {
    Err(CoreAllocError::InvariantViolation(what))
}

fn check_unique(list: &CoreList, name: &str) -> AllocResult<()> {
    for (i, core) in list.iter().enumerate() {
        if list.iter().skip(i + 1).any(|c| c == core) {
            return violation(format!("core {} listed twice in {}", core, name));
        }
    }
    Ok(())
}

impl CoreAllocator {
    /// Verify every ledger invariant, reporting the first violation
    pub fn check_invariants(&self) -> AllocResult<()> {
        self.check_kernel_core()?;
        self.check_idle_pool()?;
        for p in self.procs() {
            self.check_proc(p)?;
        }
        self.check_core_owners()?;
        self.check_refcounts()
    }

    fn check_kernel_core(&self) -> AllocResult<()> {
        let entry = self.cores.pcore_for_id(KERNEL_CORE);
        if entry.alloc_proc != Some(CoreOwner::Kernel) {
            return violation(format!("kernel core owned by {:?}", entry.alloc_proc));
        }
        if let Some(p) = entry.prov_proc {
            return violation(format!("kernel core provisioned to {}", p));
        }
        Ok(())
    }

    fn check_idle_pool(&self) -> AllocResult<()> {
        let idle = self.cores.idle();
        check_unique(idle, "the idle pool")?;

        for entry in self.cores.iter() {
            let id = entry.core_id();
            if entry.alloc_proc == Some(CoreOwner::Kernel) && id != KERNEL_CORE {
                return violation(format!("core {} owned by the kernel", id));
            }
            match (entry.is_idle(), idle.contains(id)) {
                (true, false) => {
                    return violation(format!("unowned core {} missing from the idle pool", id))
                },
                (false, true) => {
                    return violation(format!("owned core {} on the idle pool", id))
                },
                _ => {},
            }
        }
        Ok(())
    }

    fn check_proc(&self, p: ProcId) -> AllocResult<()> {
        let data = self.record(p);
        let owner = Some(CoreOwner::Process(p));

        check_unique(&data.allocated, "an allocated list")?;
        check_unique(&data.prov_allocated, "a provisioned-allocated list")?;
        check_unique(&data.prov_unallocated, "a provisioned-unallocated list")?;

        for core in data.allocated.iter() {
            if self.cores.pcore_for_id(core).alloc_proc != owner {
                return violation(format!("{} lists core {} it does not own", p, core));
            }
        }
        for core in data.prov_allocated.iter() {
            let entry = self.cores.pcore_for_id(core);
            if entry.prov_proc != Some(p) || entry.alloc_proc != owner {
                return violation(format!(
                    "core {} on {}'s provisioned-allocated list is {:?}/{:?}",
                    core, p, entry.alloc_proc, entry.prov_proc
                ));
            }
        }
        for core in data.prov_unallocated.iter() {
            let entry = self.cores.pcore_for_id(core);
            if entry.prov_proc != Some(p) || entry.alloc_proc == owner {
                return violation(format!(
                    "core {} on {}'s provisioned-unallocated list is {:?}/{:?}",
                    core, p, entry.alloc_proc, entry.prov_proc
                ));
            }
        }
        Ok(())
    }

    fn check_core_owners(&self) -> AllocResult<()> {
        for entry in self.cores.iter() {
            let id = entry.core_id();

            if let Some(CoreOwner::Process(p)) = entry.alloc_proc {
                match self.procs.get(&p) {
                    Some(data) if data.allocated.contains(id) => {},
                    Some(_) => {
                        return violation(format!("core {} owned by {} but not listed", id, p))
                    },
                    None => {
                        return violation(format!("core {} owned by unregistered {}", id, p))
                    },
                }
            }

            if let Some(p) = entry.prov_proc {
                let Some(data) = self.procs.get(&p) else {
                    return violation(format!("core {} provisioned to unregistered {}", id, p));
                };
                let listed = if entry.alloc_proc == Some(CoreOwner::Process(p)) {
                    data.prov_allocated.contains(id)
                } else {
                    data.prov_unallocated.contains(id)
                };
                if !listed {
                    return violation(format!("core {} provisioned to {} but not listed", id, p));
                }
            }
        }
        Ok(())
    }

    fn check_refcounts(&self) -> AllocResult<()> {
        let tree = &self.tree;
        for index in 0..tree.total_nodes() {
            let node = tree.node(index);
            for level in NodeType::ALL {
                let expected = if level > node.node_type() {
                    0
                } else {
                    tree.descendant_range(index, level)
                        .filter(|&n| self.is_occupied(n))
                        .count() as u32
                };
                if node.refcount(level) != expected {
                    return violation(format!(
                        "{} {} refcount[{}] is {}, expected {}",
                        node.node_type(),
                        node.id(),
                        level,
                        node.refcount(level),
                        expected
                    ));
                }
            }
        }
        Ok(())
    }

    /// Any core beneath the node is allocated (kernel included)
    fn is_occupied(&self, index: NodeIndex) -> bool {
        self.tree
            .core_range(index)
            .any(|core: CoreId| !self.cores.pcore_for_id(core).is_idle())
    }
}
