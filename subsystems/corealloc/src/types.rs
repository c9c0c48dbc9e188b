//! Identifier and ownership types shared by every part of the allocator.

use core::fmt;

use static_assertions::const_assert_eq;

// =============================================================================
// Identifiers
// =============================================================================

/// Physical core identifier (index into the core map)
pub type CoreId = u32;

/// Index of a node inside the topology arena
pub type NodeIndex = usize;

/// The core permanently owned by the kernel
pub const KERNEL_CORE: CoreId = 0;

/// Number of levels in the topology hierarchy
pub const NUM_NODE_TYPES: usize = 5;

/// Process identifier as seen by the allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcId(pub u32);

impl ProcId {
    /// Raw pid value
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proc{}", self.raw())
    }
}

// =============================================================================
// Node Types
// =============================================================================

/// Level of a node in the hardware hierarchy, leaves first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum NodeType {
    /// A single physical core
    Core    = 0,
    /// A CPU (core complex)
    Cpu     = 1,
    /// A socket
    Socket  = 2,
    /// A NUMA node
    Numa    = 3,
    /// The whole machine
    Machine = 4,
}

const_assert_eq!(NodeType::Machine as usize + 1, NUM_NODE_TYPES);

impl NodeType {
    /// All levels, leaves first
    pub const ALL: [NodeType; NUM_NODE_TYPES] = [
        NodeType::Core,
        NodeType::Cpu,
        NodeType::Socket,
        NodeType::Numa,
        NodeType::Machine,
    ];

    /// Position of this level in per-level tables
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Level directly below this one
    pub const fn child(self) -> Option<NodeType> {
        match self {
            NodeType::Core => None,
            NodeType::Cpu => Some(NodeType::Core),
            NodeType::Socket => Some(NodeType::Cpu),
            NodeType::Numa => Some(NodeType::Socket),
            NodeType::Machine => Some(NodeType::Numa),
        }
    }

    /// Level directly above this one
    pub const fn parent(self) -> Option<NodeType> {
        match self {
            NodeType::Core => Some(NodeType::Cpu),
            NodeType::Cpu => Some(NodeType::Socket),
            NodeType::Socket => Some(NodeType::Numa),
            NodeType::Numa => Some(NodeType::Machine),
            NodeType::Machine => None,
        }
    }

    /// Human-readable label used in dumps
    pub const fn label(self) -> &'static str {
        match self {
            NodeType::Core => "CORE",
            NodeType::Cpu => "CPU",
            NodeType::Socket => "SOCKET",
            NodeType::Numa => "NUMA",
            NodeType::Machine => "MACHINE",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Ownership
// =============================================================================

/// Current allocation owner of a core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreOwner {
    /// Reserved for the kernel (core 0)
    Kernel,
    /// Allocated to a process
    Process(ProcId),
}

impl CoreOwner {
    /// Process owning the core, if any
    pub const fn process(self) -> Option<ProcId> {
        match self {
            CoreOwner::Kernel => None,
            CoreOwner::Process(p) => Some(p),
        }
    }
}

impl fmt::Display for CoreOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreOwner::Kernel => f.write_str("kernel"),
            CoreOwner::Process(p) => write!(f, "{}", p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_chain() {
        assert_eq!(NodeType::Core.child(), None);
        assert_eq!(NodeType::Machine.parent(), None);
        for level in NodeType::ALL {
            if let Some(child) = level.child() {
                assert_eq!(child.parent(), Some(level));
                assert_eq!(child.index() + 1, level.index());
            }
        }
    }

    #[test]
    fn test_proc_id_display() {
        let p = ProcId(12);
        assert_eq!(p.raw(), 12);
        assert_eq!(alloc::format!("{}", p), "proc12");
        assert_eq!(alloc::format!("{}", CoreOwner::Process(p)), "proc12");
    }

    #[test]
    fn test_owner_process() {
        assert_eq!(CoreOwner::Kernel.process(), None);
        assert_eq!(CoreOwner::Process(ProcId(3)).process(), Some(ProcId(3)));
    }
}
