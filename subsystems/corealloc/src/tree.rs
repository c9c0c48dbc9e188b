//! # Topology Tree
//!
//! Boot-time arena mirroring the hardware hierarchy. Nodes are stored level
//! by level in one flat vector; children are addressed by index ranges and
//! parents by index, so the tree holds no owning pointers.
//!
//! ```text
//! nodes: [ core 0 .. core N | cpu 0 .. | socket 0 .. | numa 0 .. | machine ]
//!          ▲                  ▲          ▲             ▲           ▲
//!          lookup[CORE]       lookup[CPU] lookup[SOCKET] lookup[NUMA] lookup[MACHINE]
//! ```
//!
//! ## Reference Counts
//!
//! `refcount[L]` of a node counts the occupied level-`L` nodes in its
//! subtree, where a node is occupied when at least one core beneath it is
//! allocated. A core node therefore has `refcount[CORE]` of 0 or 1, a CPU
//! node has the number of allocated cores in `refcount[CORE]` and 0 or 1 in
//! `refcount[CPU]`, and so on up to the machine.

use alloc::vec::Vec;
use core::fmt;
use core::ops::Range;

use arrayvec::ArrayVec;

use crate::error::{AllocResult, CoreAllocError};
use crate::topology::CpuTopologyInfo;
use crate::types::{CoreId, NodeIndex, NodeType, NUM_NODE_TYPES};

// =============================================================================
// Topology Node
// =============================================================================

/// One element of the hardware hierarchy
#[derive(Debug, Clone)]
pub struct PNode {
    id: u32,
    node_type: NodeType,
    refcount: [u32; NUM_NODE_TYPES],
    parent: Option<NodeIndex>,
    children: Range<NodeIndex>,
    core: Option<CoreId>,
}

impl PNode {
    /// Index of the node within its level
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Level of the node
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Occupied level-`level` nodes beneath this one
    pub fn refcount(&self, level: NodeType) -> u32 {
        self.refcount[level.index()]
    }

    /// Parent node, `None` for the machine
    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    /// Arena range of the direct children
    pub fn children(&self) -> Range<NodeIndex> {
        self.children.clone()
    }

    /// Core backing a core-level node
    pub fn core(&self) -> Option<CoreId> {
        self.core
    }
}

// =============================================================================
// Topology Tree
// =============================================================================

/// Flat arena of topology nodes plus the derived lookup tables
#[derive(Debug)]
pub struct TopologyTree {
    nodes: Vec<PNode>,
    /// First arena index of every level
    lookup: [NodeIndex; NUM_NODE_TYPES],
    /// Node count of every level
    num_nodes: [u32; NUM_NODE_TYPES],
    /// `descendants[level][sub_level]`: sub-level nodes beneath one level node
    descendants: [[u32; NUM_NODE_TYPES]; NUM_NODE_TYPES],
    /// Row-major `num_cores * num_cores` table of lowest shared levels
    distance: Vec<NodeType>,
    num_cores: usize,
}

impl TopologyTree {
    /// Build the tree and its tables from validated topology counts
    pub fn build(info: &CpuTopologyInfo) -> AllocResult<Self> {
        info.validate()?;

        let num_nodes = [
            info.num_cores,
            info.num_cpus,
            info.num_sockets,
            info.num_numa,
            1,
        ];

        let mut descendants = [[0u32; NUM_NODE_TYPES]; NUM_NODE_TYPES];
        for level in NodeType::ALL {
            descendants[level.index()][level.index()] = 1;
        }
        descendants[NodeType::Cpu.index()][NodeType::Core.index()] = info.cores_per_cpu;
        descendants[NodeType::Socket.index()][NodeType::Core.index()] = info.cores_per_socket;
        descendants[NodeType::Socket.index()][NodeType::Cpu.index()] = info.cpus_per_socket;
        descendants[NodeType::Numa.index()][NodeType::Core.index()] = info.cores_per_numa;
        descendants[NodeType::Numa.index()][NodeType::Cpu.index()] = info.cpus_per_numa;
        descendants[NodeType::Numa.index()][NodeType::Socket.index()] = info.sockets_per_numa;
        descendants[NodeType::Machine.index()][NodeType::Core.index()] = info.num_cores;
        descendants[NodeType::Machine.index()][NodeType::Cpu.index()] = info.num_cpus;
        descendants[NodeType::Machine.index()][NodeType::Socket.index()] = info.num_sockets;
        descendants[NodeType::Machine.index()][NodeType::Numa.index()] = info.num_numa;

        let mut lookup = [0; NUM_NODE_TYPES];
        let mut total_nodes = 0usize;
        for level in NodeType::ALL {
            lookup[level.index()] = total_nodes;
            total_nodes += num_nodes[level.index()] as usize;
        }

        let mut nodes = Vec::new();
        nodes.try_reserve_exact(total_nodes)?;

        for level in NodeType::ALL {
            let nchildren = level
                .child()
                .map_or(0, |child| descendants[level.index()][child.index()] as usize);
            for id in 0..num_nodes[level.index()] {
                let children = match level.child() {
                    Some(child) => {
                        let first = lookup[child.index()] + id as usize * nchildren;
                        first..first + nchildren
                    },
                    None => 0..0,
                };
                let parent = level.parent().map(|up| {
                    let per_parent = descendants[up.index()][level.index()];
                    lookup[up.index()] + (id / per_parent) as usize
                });
                nodes.push(PNode {
                    id,
                    node_type: level,
                    refcount: [0; NUM_NODE_TYPES],
                    parent,
                    children,
                    core: (level == NodeType::Core).then_some(id),
                });
            }
        }

        let num_cores = info.num_cores as usize;
        let cells = num_cores
            .checked_mul(num_cores)
            .ok_or(CoreAllocError::OutOfMemory)?;
        let mut distance = Vec::new();
        distance.try_reserve_exact(cells)?;
        for i in 0..info.num_cores {
            for j in 0..info.num_cores {
                let shared = NodeType::ALL
                    .into_iter()
                    .find(|level| {
                        let span = descendants[level.index()][NodeType::Core.index()];
                        i / span == j / span
                    })
                    .unwrap_or(NodeType::Machine);
                distance.push(shared);
            }
        }

        Ok(Self {
            nodes,
            lookup,
            num_nodes,
            descendants,
            distance,
            num_cores,
        })
    }

    /// Total number of nodes, machine included
    pub fn total_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of nodes at a level
    pub fn num_nodes(&self, level: NodeType) -> u32 {
        self.num_nodes[level.index()]
    }

    /// Number of cores covered by the tree
    pub fn num_cores(&self) -> usize {
        self.num_cores
    }

    /// `sub_level` nodes beneath a single `level` node
    pub fn descendants(&self, level: NodeType, sub_level: NodeType) -> u32 {
        self.descendants[level.index()][sub_level.index()]
    }

    /// Arena index of the `id`-th node of `level`
    pub fn index_of(&self, level: NodeType, id: u32) -> NodeIndex {
        assert!(
            id < self.num_nodes[level.index()],
            "{} {} out of range",
            level,
            id
        );
        self.lookup[level.index()] + id as usize
    }

    /// Node stored at an arena index
    pub fn node(&self, index: NodeIndex) -> &PNode {
        &self.nodes[index]
    }

    /// Node looked up by level and id
    pub fn node_by_id(&self, level: NodeType, id: u32) -> &PNode {
        self.node(self.index_of(level, id))
    }

    /// The single machine node
    pub fn machine(&self) -> NodeIndex {
        self.lookup[NodeType::Machine.index()]
    }

    /// Arena index of a core's leaf node
    pub fn core_node(&self, core: CoreId) -> NodeIndex {
        self.index_of(NodeType::Core, core)
    }

    /// Lowest level at which two cores share an ancestor
    pub fn distance(&self, a: CoreId, b: CoreId) -> NodeType {
        let (a, b) = (a as usize, b as usize);
        assert!(a < self.num_cores && b < self.num_cores, "core out of range");
        self.distance[a * self.num_cores + b]
    }

    /// First core beneath a node
    pub fn first_core(&self, index: NodeIndex) -> CoreId {
        let mut node = &self.nodes[index];
        while node.node_type != NodeType::Core {
            node = &self.nodes[node.children.start];
        }
        node.id
    }

    /// Contiguous run of core ids beneath a node
    pub fn core_range(&self, index: NodeIndex) -> Range<CoreId> {
        let node = &self.nodes[index];
        let span = self.descendants(node.node_type, NodeType::Core);
        node.id * span..(node.id + 1) * span
    }

    /// Arena range of the `level` nodes beneath a node
    pub fn descendant_range(&self, index: NodeIndex, level: NodeType) -> Range<NodeIndex> {
        let node = &self.nodes[index];
        let span = self.descendants(node.node_type, level) as usize;
        let first = self.lookup[level.index()] + node.id as usize * span;
        first..first + span
    }

    /// Ancestor of a core at the given level
    pub fn ancestor(&self, core: CoreId, level: NodeType) -> NodeIndex {
        let span = self.descendants(level, NodeType::Core);
        self.index_of(level, core / span)
    }

    /// A node followed by all of its ancestors up to the machine
    pub fn lineage(&self, index: NodeIndex) -> ArrayVec<NodeIndex, NUM_NODE_TYPES> {
        let mut chain = ArrayVec::new();
        let mut cur = Some(index);
        while let Some(n) = cur {
            chain.push(n);
            cur = self.nodes[n].parent;
        }
        chain
    }

    /// Mark a core occupied and bubble the change up
    ///
    /// At every level on the way up, the level's own counter only goes
    /// from 0 to 1; when it does, every ancestor's counter for that level
    /// is bumped too. Calling it for an already occupied core is a no-op.
    pub(crate) fn incref(&mut self, core: CoreId) {
        let leaf = self.core_node(core);
        for n in self.lineage(leaf) {
            let level = self.nodes[n].node_type.index();
            if self.nodes[n].refcount[level] == 0 {
                for a in self.lineage(n) {
                    self.nodes[a].refcount[level] += 1;
                }
            }
        }
    }

    /// Mark a core free and bubble the change up
    ///
    /// A node above the core level drops its own counter only once every
    /// child below it is unoccupied.
    pub(crate) fn decref(&mut self, core: CoreId) {
        let leaf = self.core_node(core);
        for n in self.lineage(leaf) {
            let node_type = self.nodes[n].node_type;
            let emptied = match node_type.child() {
                None => true,
                Some(child) => self.nodes[n].refcount[child.index()] == 0,
            };
            if !emptied {
                continue;
            }
            let level = node_type.index();
            for a in self.lineage(n) {
                let count = &mut self.nodes[a].refcount[level];
                assert!(*count > 0, "refcount underflow releasing core {}", core);
                *count -= 1;
            }
        }
    }
}

impl fmt::Display for TopologyTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cores, {} cpus, {} sockets, {} numa",
            self.num_nodes(NodeType::Core),
            self.num_nodes(NodeType::Cpu),
            self.num_nodes(NodeType::Socket),
            self.num_nodes(NodeType::Numa)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> TopologyTree {
        TopologyTree::build(&CpuTopologyInfo::uniform(2, 2, 1, 2)).unwrap()
    }

    #[test]
    fn test_build_layout() {
        let tree = toy();
        assert_eq!(tree.total_nodes(), 8 + 4 + 4 + 2 + 1);
        assert_eq!(tree.num_nodes(NodeType::Machine), 1);

        let machine = tree.node(tree.machine());
        assert_eq!(machine.node_type(), NodeType::Machine);
        assert_eq!(machine.parent(), None);
        assert_eq!(machine.children().len(), 2);

        for i in 0..8 {
            let core = tree.node_by_id(NodeType::Core, i);
            assert_eq!(core.core(), Some(i));
            let cpu = tree.node(core.parent().unwrap());
            assert_eq!(cpu.node_type(), NodeType::Cpu);
            assert_eq!(cpu.id(), i / 2);
        }
    }

    #[test]
    fn test_parent_child_agree() {
        let tree = toy();
        for index in 0..tree.total_nodes() {
            for child in tree.node(index).children() {
                assert_eq!(tree.node(child).parent(), Some(index));
            }
        }
    }

    #[test]
    fn test_descendants_table() {
        let tree = toy();
        assert_eq!(tree.descendants(NodeType::Cpu, NodeType::Core), 2);
        assert_eq!(tree.descendants(NodeType::Socket, NodeType::Cpu), 1);
        assert_eq!(tree.descendants(NodeType::Numa, NodeType::Core), 4);
        assert_eq!(tree.descendants(NodeType::Machine, NodeType::Numa), 2);
        assert_eq!(tree.descendants(NodeType::Core, NodeType::Core), 1);
    }

    #[test]
    fn test_distance_table() {
        let tree = toy();
        assert_eq!(tree.distance(3, 3), NodeType::Core);
        assert_eq!(tree.distance(6, 7), NodeType::Cpu);
        assert_eq!(tree.distance(4, 7), NodeType::Numa);
        assert_eq!(tree.distance(0, 7), NodeType::Machine);
        assert_eq!(tree.distance(7, 0), NodeType::Machine);

        let tree = TopologyTree::build(&CpuTopologyInfo::uniform(1, 2, 2, 2)).unwrap();
        assert_eq!(tree.distance(0, 2), NodeType::Socket);
    }

    #[test]
    fn test_ranges() {
        let tree = toy();
        let numa1 = tree.index_of(NodeType::Numa, 1);
        assert_eq!(tree.core_range(numa1), 4..8);
        assert_eq!(tree.first_core(numa1), 4);
        assert_eq!(tree.descendant_range(numa1, NodeType::Socket).len(), 2);
        assert_eq!(tree.ancestor(5, NodeType::Socket), tree.index_of(NodeType::Socket, 2));
        assert_eq!(tree.lineage(tree.core_node(5)).len(), NUM_NODE_TYPES);
    }

    #[test]
    fn test_refcount_occupancy() {
        let mut tree = toy();
        tree.incref(4);
        tree.incref(5);

        let cpu = tree.node_by_id(NodeType::Cpu, 2);
        assert_eq!(cpu.refcount(NodeType::Core), 2);
        assert_eq!(cpu.refcount(NodeType::Cpu), 1);

        let machine = tree.node(tree.machine());
        assert_eq!(machine.refcount(NodeType::Core), 2);
        assert_eq!(machine.refcount(NodeType::Cpu), 1);
        assert_eq!(machine.refcount(NodeType::Numa), 1);
        assert_eq!(machine.refcount(NodeType::Machine), 1);

        tree.decref(4);
        let machine = tree.node(tree.machine());
        assert_eq!(machine.refcount(NodeType::Core), 1);
        assert_eq!(machine.refcount(NodeType::Numa), 1);

        tree.decref(5);
        let machine = tree.node(tree.machine());
        for level in NodeType::ALL {
            assert_eq!(machine.refcount(level), 0);
        }
    }

    #[test]
    fn test_incref_idempotent() {
        let mut tree = toy();
        tree.incref(2);
        tree.incref(2);
        assert_eq!(tree.node(tree.machine()).refcount(NodeType::Core), 1);
    }

    #[test]
    fn test_invalid_topology() {
        let info = CpuTopologyInfo::uniform(1, 0, 1, 1);
        assert!(TopologyTree::build(&info).is_err());
    }
}
