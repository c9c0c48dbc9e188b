//! # CPU Topology Information
//!
//! Counts and per-core locality records handed over by the platform's
//! topology discovery at boot. The allocator only reads them.
//!
//! ```text
//!                      MACHINE
//!                 ┌───────┴───────┐
//!               NUMA 0          NUMA 1          num_numa
//!             ┌───┴───┐       ┌───┴───┐
//!           SOCK 0  SOCK 1  SOCK 2  SOCK 3      sockets_per_numa
//!             │       │       │       │
//!           CPU 0   CPU 1   CPU 2   CPU 3       cpus_per_socket
//!           ┌─┴─┐   ┌─┴─┐   ┌─┴─┐   ┌─┴─┐
//!           0   1   2   3   4   5   6   7       cores_per_cpu
//! ```
//!
//! Cores are numbered depth-first, so every subtree owns a contiguous run
//! of core ids.

use alloc::vec::Vec;

use crate::error::{AllocResult, CoreAllocError};
use crate::types::CoreId;

// =============================================================================
// Core Info
// =============================================================================

/// Locality record for one physical core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoreInfo {
    /// Core id
    pub core_id: CoreId,
    /// CPU containing the core
    pub cpu_id: u32,
    /// Socket containing the core
    pub socket_id: u32,
    /// NUMA node containing the core
    pub numa_id: u32,
}

// =============================================================================
// Topology Info
// =============================================================================

/// Hardware topology counts
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuTopologyInfo {
    pub num_cores: u32,
    pub num_cpus: u32,
    pub num_sockets: u32,
    pub num_numa: u32,
    pub cores_per_cpu: u32,
    pub cores_per_socket: u32,
    pub cores_per_numa: u32,
    pub cpus_per_socket: u32,
    pub cpus_per_numa: u32,
    pub sockets_per_numa: u32,
    /// One record per core, indexed by core id
    pub core_list: Vec<CoreInfo>,
}

impl CpuTopologyInfo {
    /// Build a symmetric topology from per-parent branching factors
    ///
    /// Panics if the resulting counts overflow `u32`.
    pub fn uniform(
        num_numa: u32,
        sockets_per_numa: u32,
        cpus_per_socket: u32,
        cores_per_cpu: u32,
    ) -> Self {
        let cores_per_socket = cpus_per_socket * cores_per_cpu;
        let cores_per_numa = sockets_per_numa * cores_per_socket;
        let num_cores = num_numa * cores_per_numa;

        let core_list = (0..num_cores)
            .map(|core_id| CoreInfo {
                core_id,
                cpu_id: core_id / cores_per_cpu,
                socket_id: core_id / cores_per_socket,
                numa_id: core_id / cores_per_numa,
            })
            .collect();

        Self {
            num_cores,
            num_cpus: num_numa * sockets_per_numa * cpus_per_socket,
            num_sockets: num_numa * sockets_per_numa,
            num_numa,
            cores_per_cpu,
            cores_per_socket,
            cores_per_numa,
            cpus_per_socket,
            cpus_per_numa: sockets_per_numa * cpus_per_socket,
            sockets_per_numa,
            core_list,
        }
    }

    /// Check that counts are nonzero and agree with each other
    pub fn validate(&self) -> AllocResult<()> {
        let counts = [
            self.num_cores,
            self.num_cpus,
            self.num_sockets,
            self.num_numa,
            self.cores_per_cpu,
            self.cores_per_socket,
            self.cores_per_numa,
            self.cpus_per_socket,
            self.cpus_per_numa,
            self.sockets_per_numa,
        ];
        if counts.contains(&0) {
            return Err(CoreAllocError::InvalidTopology("zero count"));
        }

        let product = |a: u32, b: u32| {
            a.checked_mul(b)
                .ok_or(CoreAllocError::InvalidTopology("count overflow"))
        };
        let consistent = self.cores_per_socket == product(self.cpus_per_socket, self.cores_per_cpu)?
            && self.cpus_per_numa == product(self.sockets_per_numa, self.cpus_per_socket)?
            && self.cores_per_numa == product(self.sockets_per_numa, self.cores_per_socket)?
            && self.num_sockets == product(self.num_numa, self.sockets_per_numa)?
            && self.num_cpus == product(self.num_sockets, self.cpus_per_socket)?
            && self.num_cores == product(self.num_cpus, self.cores_per_cpu)?;
        if !consistent {
            return Err(CoreAllocError::InvalidTopology("inconsistent counts"));
        }

        if self.core_list.len() != self.num_cores as usize {
            return Err(CoreAllocError::InvalidTopology("core list length mismatch"));
        }

        for (i, info) in self.core_list.iter().enumerate() {
            let i = i as u32;
            if info.core_id != i
                || info.cpu_id != i / self.cores_per_cpu
                || info.socket_id != i / self.cores_per_socket
                || info.numa_id != i / self.cores_per_numa
            {
                return Err(CoreAllocError::InvalidTopology("core numbering is not depth-first"));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Topology Source
// =============================================================================

/// Platform topology discovery, queried once at boot
pub trait TopologySource {
    /// Report the machine topology
    fn topology(&self) -> CpuTopologyInfo;
}

impl TopologySource for CpuTopologyInfo {
    fn topology(&self) -> CpuTopologyInfo {
        self.clone()
    }
}
