//! # Allocator Errors
//!
//! Only boot-time construction and process registration can fail with a
//! recoverable error. Ledger corruption (double allocation, out-of-range core
//! ids, the kernel core leaking into placement) is fatal and panics at the
//! point of detection instead of being reported here.
//!
//! | Error | Raised by | Recoverable |
//! |-------|-----------|-------------|
//! | `InvalidTopology` | `CoreAllocator::new` | No (boot aborts) |
//! | `OutOfMemory` | `CoreAllocator::new` | No (boot aborts) |
//! | `ProcessAlreadyRegistered` | `register_proc` | Yes |
//! | `ProcessNotRegistered` | `destroy_proc` | Yes |
//! | `InvariantViolation` | `check_invariants` | No |

use alloc::string::String;
use core::fmt;

use crate::types::ProcId;

/// Result type for allocator operations
pub type AllocResult<T> = Result<T, CoreAllocError>;

/// Core allocator error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreAllocError {
    /// Topology counts are zero or inconsistent
    InvalidTopology(&'static str),
    /// Backing storage for the tree or tables could not be obtained
    OutOfMemory,
    /// The process already has an allocation record
    ProcessAlreadyRegistered(ProcId),
    /// The process has no allocation record
    ProcessNotRegistered(ProcId),
    /// A ledger invariant does not hold
    InvariantViolation(String),
}

impl CoreAllocError {
    /// Check if the error leaves the allocator unusable
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            CoreAllocError::InvalidTopology(_)
                | CoreAllocError::OutOfMemory
                | CoreAllocError::InvariantViolation(_)
        )
    }
}

impl fmt::Display for CoreAllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreAllocError::InvalidTopology(reason) => write!(f, "invalid topology: {}", reason),
            CoreAllocError::OutOfMemory => f.write_str("out of memory"),
            CoreAllocError::ProcessAlreadyRegistered(p) => write!(f, "{} already registered", p),
            CoreAllocError::ProcessNotRegistered(p) => write!(f, "{} not registered", p),
            CoreAllocError::InvariantViolation(what) => write!(f, "invariant violation: {}", what),
        }
    }
}

impl From<alloc::collections::TryReserveError> for CoreAllocError {
    fn from(_: alloc::collections::TryReserveError) -> Self {
        CoreAllocError::OutOfMemory
    }
}
