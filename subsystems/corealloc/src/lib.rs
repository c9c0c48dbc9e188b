//! # Helix Core Allocator
//!
//! Topology-aware allocation of physical cores to processes, plus the
//! provisioning ledger that lets a process reserve specific cores ahead of
//! time.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                         CORE ALLOCATOR                                │
//! │                                                                       │
//! │   topology discovery ──▶ nodes_init() ──▶ CoreAllocator               │
//! │                                                                       │
//! │   ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐  │
//! │   │  TopologyTree    │   │  CoreMap         │   │  ProcCoreData    │  │
//! │   │  machine         │   │  alloc_proc      │   │  allocated       │  │
//! │   │  └ numa          │   │  prov_proc       │   │  prov_allocated  │  │
//! │   │    └ socket      │   │  idle pool       │   │  prov_unallocated│  │
//! │   │      └ cpu       │   │                  │   │  (per process)   │  │
//! │   │        └ core    │   │                  │   │                  │  │
//! │   │  refcounts       │   │                  │   │                  │  │
//! │   │  distance table  │   │                  │   │                  │  │
//! │   └────────▲─────────┘   └────────▲─────────┘   └────────▲─────────┘  │
//! │            │                      │                      │            │
//! │      choose_core ───────▶ commit_alloc / commit_dealloc ─┤            │
//! │      (read only)            (only writer of ownership)   │            │
//! │                                                          │            │
//! │      provision / unprovision_all ────────────────────────┘            │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut cores = nodes_init(&topology, CoreAllocConfig::default());
//! cores.register_proc(pid)?;
//! cores.provision(Some(pid), 7);
//!
//! if let Some(core) = cores.choose_core(pid) {
//!     cores.commit_alloc(pid, core);
//! }
//! ```
//!
//! The allocator takes no locks of its own; callers hold one coarse lock
//! across `choose_core` and `commit_alloc`, or use [`LockedCoreAllocator`].
//!
//! ## Invariants
//!
//! 1. **Exclusivity**: a core is on at most one process's allocated list,
//!    and on the idle pool iff nobody owns it.
//! 2. **Provisioning partition**: a core provisioned to `p` is on exactly
//!    one of `p`'s two provisioning lists, chosen by whether `p` owns it.
//! 3. **Refcounts**: every node counts the occupied nodes beneath it, per
//!    level.
//! 4. **Kernel core**: core 0 belongs to the kernel forever.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================

/// Allocator context and process lifecycle
pub mod allocator;

/// Runtime configuration
pub mod config;

/// Per-core state and idle pool
pub mod core_map;

/// Diagnostic dumps
pub mod debug;

/// Error types
pub mod error;

/// Provisioning ledger
pub mod ledger;

/// Core id lists
pub mod list;

/// Core selection
pub mod placement;

/// Spinlock wrapper
pub mod sync;

/// Topology discovery input
pub mod topology;

/// Allocation tracking
pub mod tracker;

/// Topology tree, refcounts and distances
pub mod tree;

/// Shared identifiers
pub mod types;

/// Invariant checker
pub mod validate;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use allocator::{nodes_init, try_nodes_init, CoreAllocator, ProcCoreData};
pub use config::{CoreAllocConfig, PlacementPolicy};
pub use core_map::{CoreEntry, CoreFlags, CoreMap};
pub use error::{AllocResult, CoreAllocError};
pub use list::CoreList;
pub use sync::LockedCoreAllocator;
pub use topology::{CoreInfo, CpuTopologyInfo, TopologySource};
pub use tree::{PNode, TopologyTree};
pub use types::{CoreId, CoreOwner, NodeIndex, NodeType, ProcId, KERNEL_CORE, NUM_NODE_TYPES};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
