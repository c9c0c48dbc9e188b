//! Runtime configuration for the core allocator.

// =============================================================================
// Placement Policy
// =============================================================================

/// Strategy used by `choose_core` to pick the next core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementPolicy {
    /// Topology-aware: spread first cores, pack later ones close together
    #[default]
    Packed,
    /// First come first served: provisioned head, then idle head
    Fcfs,
}

impl PlacementPolicy {
    /// Short name used in logs
    pub const fn name(self) -> &'static str {
        match self {
            PlacementPolicy::Packed => "packed",
            PlacementPolicy::Fcfs => "fcfs",
        }
    }
}

// =============================================================================
// Allocator Configuration
// =============================================================================

/// Allocator configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreAllocConfig {
    /// Placement policy
    pub policy: PlacementPolicy,
    /// Run the invariant checker after every mutation
    pub validate: bool,
}

impl CoreAllocConfig {
    /// Create the default configuration
    pub const fn new() -> Self {
        Self {
            policy: PlacementPolicy::Packed,
            validate: cfg!(feature = "validation"),
        }
    }

    /// Set the placement policy
    pub const fn with_policy(mut self, policy: PlacementPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enable or disable post-mutation validation
    ///
    /// The `validation` feature keeps it on regardless.
    pub const fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate || cfg!(feature = "validation");
        self
    }
}

impl Default for CoreAllocConfig {
    fn default() -> Self {
        Self::new()
    }
}
