//! # Core Registry
//!
//! The flat table of per-core allocation state and the idle pool.
//!
//! ```text
//!   core map                                 idle pool (FIFO)
//!   ┌────┬──────────┬──────────┐
//!   │ id │ alloc    │ prov     │             head ─▶ 2 ─▶ 3 ─▶ 6 ─▶ 1 ◀─ tail
//!   ├────┼──────────┼──────────┤                     ▲                ▲
//!   │ 0  │ kernel   │ -        │          any_idle ──┘     freed ─────┘
//!   │ 1  │ -        │ proc 2   │
//!   │ 4  │ proc 1   │ proc 1   │
//!   │ 5  │ proc 3   │ proc 1   │  ◀── victim: provisioned to 1, held by 3
//!   └────┴──────────┴──────────┘
//! ```

use alloc::vec::Vec;

use bitflags::bitflags;

use crate::error::AllocResult;
use crate::list::CoreList;
use crate::topology::{CoreInfo, CpuTopologyInfo};
use crate::tree::TopologyTree;
use crate::types::{CoreId, CoreOwner, NodeIndex, ProcId, KERNEL_CORE};

bitflags! {
    /// Combined allocation/provisioning state of a core
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CoreFlags: u8 {
        /// Owned by a process or the kernel
        const ALLOCATED = 1 << 0;
        /// Provisioned to a process
        const PROVISIONED = 1 << 1;
        /// Reserved for the kernel
        const KERNEL = 1 << 2;
    }
}

// =============================================================================
// Core Entry
// =============================================================================

/// Allocation state of one physical core
#[derive(Debug, Clone)]
pub struct CoreEntry {
    node: NodeIndex,
    info: CoreInfo,
    pub(crate) alloc_proc: Option<CoreOwner>,
    pub(crate) prov_proc: Option<ProcId>,
}

impl CoreEntry {
    /// Core id
    pub fn core_id(&self) -> CoreId {
        self.info.core_id
    }

    /// Leaf node of this core in the topology tree
    pub fn node(&self) -> NodeIndex {
        self.node
    }

    /// Locality record from topology discovery
    pub fn info(&self) -> &CoreInfo {
        &self.info
    }

    /// Who the core is allocated to
    pub fn alloc_proc(&self) -> Option<CoreOwner> {
        self.alloc_proc
    }

    /// Who the core is provisioned to
    pub fn prov_proc(&self) -> Option<ProcId> {
        self.prov_proc
    }

    /// Not allocated to anyone
    pub fn is_idle(&self) -> bool {
        self.alloc_proc.is_none()
    }

    pub fn flags(&self) -> CoreFlags {
        let mut flags = CoreFlags::empty();
        if self.alloc_proc.is_some() {
            flags |= CoreFlags::ALLOCATED;
        }
        if self.alloc_proc == Some(CoreOwner::Kernel) {
            flags |= CoreFlags::KERNEL;
        }
        if self.prov_proc.is_some() {
            flags |= CoreFlags::PROVISIONED;
        }
        flags
    }
}

// =============================================================================
// Core Map
// =============================================================================

/// Per-core table plus the global idle list
#[derive(Debug)]
pub struct CoreMap {
    entries: Vec<CoreEntry>,
    idle: CoreList,
}

impl CoreMap {
    /// Build the table with core 0 owned by the kernel and every other core idle
    pub(crate) fn new(tree: &TopologyTree, info: &CpuTopologyInfo) -> AllocResult<Self> {
        let mut entries = Vec::new();
        entries.try_reserve_exact(info.core_list.len())?;

        for core_info in &info.core_list {
            let id = core_info.core_id;
            entries.push(CoreEntry {
                node: tree.core_node(id),
                info: *core_info,
                alloc_proc: (id == KERNEL_CORE).then_some(CoreOwner::Kernel),
                prov_proc: None,
            });
        }

        let idle = entries
            .iter()
            .map(CoreEntry::core_id)
            .filter(|&id| id != KERNEL_CORE)
            .collect();

        Ok(Self { entries, idle })
    }

    /// Number of cores
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for a core id
    ///
    /// An out-of-range id is a caller bug and panics.
    pub fn pcore_for_id(&self, id: CoreId) -> &CoreEntry {
        match self.entries.get(id as usize) {
            Some(entry) => entry,
            None => panic!("core {} out of range ({} cores)", id, self.entries.len()),
        }
    }

    pub(crate) fn pcore_for_id_mut(&mut self, id: CoreId) -> &mut CoreEntry {
        let len = self.entries.len();
        match self.entries.get_mut(id as usize) {
            Some(entry) => entry,
            None => panic!("core {} out of range ({} cores)", id, len),
        }
    }

    /// Id of an entry
    pub fn id_for_pcore(&self, entry: &CoreEntry) -> CoreId {
        entry.core_id()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CoreEntry> + '_ {
        self.entries.iter()
    }

    /// The idle pool, oldest first
    pub fn idle(&self) -> &CoreList {
        &self.idle
    }

    /// Head of the idle pool
    pub fn any_idle_core(&self) -> Option<CoreId> {
        self.idle.front()
    }

    /// Pull a core out of the idle pool, wherever it sits
    pub(crate) fn take_idle(&mut self, core: CoreId) -> bool {
        self.idle.remove(core)
    }

    /// Return a core to the tail of the idle pool
    pub(crate) fn release_idle(&mut self, core: CoreId) {
        debug_assert_ne!(core, KERNEL_CORE, "kernel core cannot become idle");
        self.idle.push_back(core);
    }

    #[cfg(test)]
    pub(crate) fn idle_mut(&mut self) -> &mut CoreList {
        &mut self.idle
    }
}
