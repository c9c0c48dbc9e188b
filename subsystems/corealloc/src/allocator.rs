//! # Core Allocator
//!
//! The single context value that owns the topology tree, the core map and
//! every registered process's allocation record. It is created once at boot
//! by [`nodes_init`] and threaded by `&mut` into every operation; callers
//! serialise access with their own coarse lock (see [`crate::sync`]).
//!
//! The operations themselves are split by concern:
//!
//! - [`crate::ledger`]: `provision`, `unprovision_all`
//! - [`crate::placement`]: `choose_core`
//! - [`crate::tracker`]: `commit_alloc`, `commit_dealloc`
//! - [`crate::validate`]: `check_invariants`
//! - [`crate::debug`]: diagnostic dumps

use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::config::CoreAllocConfig;
use crate::core_map::{CoreEntry, CoreMap};
use crate::error::{AllocResult, CoreAllocError};
use crate::list::CoreList;
use crate::topology::{CpuTopologyInfo, TopologySource};
use crate::tree::TopologyTree;
use crate::types::{CoreId, CoreOwner, NodeType, ProcId, KERNEL_CORE};

// =============================================================================
// Per-Process Record
// =============================================================================

/// Cores held or reserved by one process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcCoreData {
    /// Every core currently allocated to the process
    pub(crate) allocated: CoreList,
    /// Provisioned to the process and allocated to it
    pub(crate) prov_allocated: CoreList,
    /// Provisioned to the process but idle or held by someone else
    pub(crate) prov_unallocated: CoreList,
}

impl ProcCoreData {
    pub fn allocated(&self) -> &CoreList {
        &self.allocated
    }

    pub fn provisioned_allocated(&self) -> &CoreList {
        &self.prov_allocated
    }

    pub fn provisioned_unallocated(&self) -> &CoreList {
        &self.prov_unallocated
    }
}

/// Look up a record, treating an unknown process as a caller bug
pub(crate) fn record_mut(
    procs: &mut HashMap<ProcId, ProcCoreData>,
    p: ProcId,
) -> &mut ProcCoreData {
    match procs.get_mut(&p) {
        Some(data) => data,
        None => {
            log::error!("corealloc: {} is not registered", p);
            panic!("{} is not registered with the core allocator", p);
        },
    }
}

// =============================================================================
// Core Allocator
// =============================================================================

/// Physical core allocator and provisioning ledger
#[derive(Debug)]
pub struct CoreAllocator {
    pub(crate) config: CoreAllocConfig,
    pub(crate) tree: TopologyTree,
    pub(crate) cores: CoreMap,
    pub(crate) procs: HashMap<ProcId, ProcCoreData>,
}

impl CoreAllocator {
    /// Build the tree, the core map and the distance table
    ///
    /// Core 0 comes out owned by the kernel and already counted in the
    /// refcounts of its ancestors.
    pub fn new(info: &CpuTopologyInfo, config: CoreAllocConfig) -> AllocResult<Self> {
        let mut tree = TopologyTree::build(info)?;
        let cores = CoreMap::new(&tree, info)?;
        tree.incref(KERNEL_CORE);

        log::info!(
            "corealloc: {} ({} policy), core {} reserved for the kernel",
            tree,
            config.policy.name(),
            KERNEL_CORE
        );

        let allocator = Self {
            config,
            tree,
            cores,
            procs: HashMap::new(),
        };

        #[cfg(feature = "debug")]
        allocator.dump_nodes();

        Ok(allocator)
    }

    /// Build from a topology discovery source
    pub fn from_source<S: TopologySource + ?Sized>(
        source: &S,
        config: CoreAllocConfig,
    ) -> AllocResult<Self> {
        Self::new(&source.topology(), config)
    }

    pub fn config(&self) -> &CoreAllocConfig {
        &self.config
    }

    pub fn tree(&self) -> &TopologyTree {
        &self.tree
    }

    pub fn cores(&self) -> &CoreMap {
        &self.cores
    }

    pub fn num_cores(&self) -> usize {
        self.cores.len()
    }

    // -------------------------------------------------------------------------
    // Process lifecycle
    // -------------------------------------------------------------------------

    /// Create the (empty) allocation record of a new process
    pub fn register_proc(&mut self, p: ProcId) -> AllocResult<()> {
        if self.procs.contains_key(&p) {
            return Err(CoreAllocError::ProcessAlreadyRegistered(p));
        }
        self.procs.insert(p, ProcCoreData::default());
        log::debug!("corealloc: registered {}", p);
        Ok(())
    }

    pub fn is_registered(&self, p: ProcId) -> bool {
        self.procs.contains_key(&p)
    }

    /// Tear down a process: drop its provisioning, free its cores, forget it
    pub fn destroy_proc(&mut self, p: ProcId) -> AllocResult<()> {
        if !self.procs.contains_key(&p) {
            return Err(CoreAllocError::ProcessNotRegistered(p));
        }

        self.unprovision_all(p);
        let owned = record_mut(&mut self.procs, p).allocated.to_vec();
        for core in owned {
            self.commit_dealloc(p, core);
        }

        self.procs.remove(&p);
        log::debug!("corealloc: destroyed {}", p);
        self.after_mutation();
        Ok(())
    }

    /// Allocate up to `amount` cores, stopping when placement runs dry
    pub fn request_cores(&mut self, p: ProcId, amount: usize) -> Vec<CoreId> {
        let mut granted = Vec::with_capacity(amount.min(self.num_cores()));
        while granted.len() < amount {
            let Some(core) = self.choose_core(p) else {
                break;
            };
            self.commit_alloc(p, core);
            granted.push(core);
        }
        granted
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    /// Allocation record of a process
    pub fn proc_data(&self, p: ProcId) -> Option<&ProcCoreData> {
        self.procs.get(&p)
    }

    pub fn allocated(&self, p: ProcId) -> Option<&CoreList> {
        self.procs.get(&p).map(ProcCoreData::allocated)
    }

    pub fn provisioned_allocated(&self, p: ProcId) -> Option<&CoreList> {
        self.procs.get(&p).map(ProcCoreData::provisioned_allocated)
    }

    pub fn provisioned_unallocated(&self, p: ProcId) -> Option<&CoreList> {
        self.procs.get(&p).map(ProcCoreData::provisioned_unallocated)
    }

    /// `refcount[level]` of the `id`-th node at `level`
    pub fn refcount(&self, level: NodeType, id: u32) -> u32 {
        self.tree.node_by_id(level, id).refcount(level)
    }

    /// Lowest level shared by two cores
    pub fn distance(&self, a: CoreId, b: CoreId) -> NodeType {
        self.tree.distance(a, b)
    }

    /// Record of a registered process; panics otherwise
    pub(crate) fn record(&self, p: ProcId) -> &ProcCoreData {
        match self.procs.get(&p) {
            Some(data) => data,
            None => panic!("{} is not registered with the core allocator", p),
        }
    }

    /// Entry for a core id
    pub fn entry_of(&self, core: CoreId) -> &CoreEntry {
        self.cores.pcore_for_id(core)
    }

    /// Core id of an entry
    pub fn core_id_of(&self, entry: &CoreEntry) -> CoreId {
        self.cores.id_for_pcore(entry)
    }

    pub fn alloc_proc(&self, core: CoreId) -> Option<CoreOwner> {
        self.entry_of(core).alloc_proc()
    }

    pub fn prov_proc(&self, core: CoreId) -> Option<ProcId> {
        self.entry_of(core).prov_proc()
    }

    /// Head of the idle pool
    pub fn any_idle_core(&self) -> Option<CoreId> {
        self.cores.any_idle_core()
    }

    pub fn idle_cores(&self) -> &CoreList {
        self.cores.idle()
    }

    /// Registered processes, lowest pid first
    pub fn procs(&self) -> Vec<ProcId> {
        let mut procs: Vec<ProcId> = self.procs.keys().copied().collect();
        procs.sort_unstable();
        procs
    }

    /// Run the invariant checker when validation is on
    pub(crate) fn after_mutation(&self) {
        if !self.config.validate {
            return;
        }
        if let Err(err) = self.check_invariants() {
            log::error!("corealloc: {}", err);
            panic!("core allocator ledger corrupted: {}", err);
        }
    }
}

// =============================================================================
// Boot Entry Points
// =============================================================================

/// Build the allocator from topology discovery, reporting failures
pub fn try_nodes_init<S: TopologySource + ?Sized>(
    source: &S,
    config: CoreAllocConfig,
) -> AllocResult<CoreAllocator> {
    CoreAllocator::from_source(source, config)
}

/// Build the allocator at boot; the kernel cannot continue without it
pub fn nodes_init<S: TopologySource + ?Sized>(source: &S, config: CoreAllocConfig) -> CoreAllocator {
    match try_nodes_init(source, config) {
        Ok(allocator) => allocator,
        Err(err) => {
            log::error!("corealloc: boot failed: {}", err);
            panic!("core allocator initialization failed: {}", err);
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlacementPolicy;

    fn toy() -> CoreAllocator {
        let info = CpuTopologyInfo::uniform(2, 2, 1, 2);
        CoreAllocator::new(&info, CoreAllocConfig::new().with_validation(true)).unwrap()
    }

    #[test]
    fn test_boot_state() {
        let alloc = toy();
        assert_eq!(alloc.num_cores(), 8);
        assert_eq!(alloc.alloc_proc(KERNEL_CORE), Some(CoreOwner::Kernel));
        assert_eq!(alloc.any_idle_core(), Some(1));
        assert_eq!(alloc.idle_cores().len(), 7);
        assert_eq!(alloc.refcount(NodeType::Numa, 0), 1);
        assert_eq!(alloc.refcount(NodeType::Numa, 1), 0);
        assert_eq!(alloc.distance(1, 2), NodeType::Numa);
        assert_eq!(alloc.allocated(ProcId(1)), None);
        assert!(alloc.check_invariants().is_ok());
    }

    #[test]
    fn test_register_twice() {
        let mut alloc = toy();
        alloc.register_proc(ProcId(1)).unwrap();
        assert_eq!(
            alloc.register_proc(ProcId(1)),
            Err(CoreAllocError::ProcessAlreadyRegistered(ProcId(1)))
        );
        assert_eq!(alloc.procs(), alloc::vec![ProcId(1)]);
    }

    #[test]
    fn test_request_cores() {
        let mut alloc = toy();
        let p = ProcId(1);
        alloc.register_proc(p).unwrap();

        let granted = alloc.request_cores(p, 3);
        assert_eq!(granted.len(), 3);
        assert_eq!(alloc.proc_data(p).unwrap().allocated().to_vec(), granted);

        // Only 7 usable cores exist.
        let more = alloc.request_cores(p, 10);
        assert_eq!(more.len(), 4);
        assert_eq!(alloc.any_idle_core(), None);
        assert_eq!(alloc.choose_core(p), None);
    }

    #[test]
    fn test_request_more_than_machine() {
        let mut alloc = toy();
        let p = ProcId(1);
        alloc.register_proc(p).unwrap();

        let granted = alloc.request_cores(p, usize::MAX);
        assert_eq!(granted.len(), 7);
        assert!(!granted.contains(&KERNEL_CORE));
    }

    #[test]
    fn test_destroy_proc() {
        let mut alloc = toy();
        let (p1, p2) = (ProcId(1), ProcId(2));
        alloc.register_proc(p1).unwrap();
        alloc.register_proc(p2).unwrap();

        alloc.provision(Some(p1), 3);
        alloc.provision(Some(p1), 5);
        let granted = alloc.request_cores(p1, 2);
        assert!(granted.contains(&3));

        alloc.destroy_proc(p1).unwrap();
        assert!(!alloc.is_registered(p1));
        assert_eq!(alloc.idle_cores().len(), 7);
        assert_eq!(alloc.prov_proc(3), None);
        assert_eq!(alloc.prov_proc(5), None);
        assert_eq!(
            alloc.destroy_proc(p1),
            Err(CoreAllocError::ProcessNotRegistered(p1))
        );
        assert!(alloc.check_invariants().is_ok());
    }

    #[test]
    fn test_nodes_init_from_source() {
        let info = CpuTopologyInfo::uniform(1, 1, 2, 2);
        let alloc = nodes_init(&info, CoreAllocConfig::new().with_policy(PlacementPolicy::Fcfs));
        assert_eq!(alloc.config().policy, PlacementPolicy::Fcfs);
        assert_eq!(alloc.num_cores(), 4);
    }

    #[test]
    fn test_try_nodes_init_rejects_empty() {
        let info = CpuTopologyInfo::default();
        assert!(matches!(
            try_nodes_init(&info, CoreAllocConfig::new()),
            Err(CoreAllocError::InvalidTopology(_))
        ));
    }

    #[test]
    #[should_panic(expected = "initialization failed")]
    fn test_nodes_init_fatal() {
        let info = CpuTopologyInfo::uniform(1, 1, 1, 0);
        let _ = nodes_init(&info, CoreAllocConfig::new());
    }
}
