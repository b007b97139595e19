//! Replication run state types.
//!
//! Defines the state machine for one replication run.
//!
//! # State Transitions
//!
//! ```text
//!            run()
//! Created ──────────┬──────────────────────→ Replicating
//!                   │ (copy_security)            ↑   │
//!                   ↓                            │   ├──→ Completed
//!             CopyingSecurity ───────────────────┘   │
//!                   │                                ├──→ Failed
//!                   └──────────→ Failed / Cancelled  │
//!                                                    └──→ Cancelled
//! ```
//!
//! # State Descriptions
//!
//! - **Created**: Initial state after `Replicator::new()`. Nothing has been read.
//! - **CopyingSecurity**: Copying the source's security object to the target.
//! - **Replicating**: The four pipeline stages are running.
//! - **Completed**: Every missing revision was written.
//! - **Failed**: A stage returned an error. The run cannot be resumed.
//! - **Cancelled**: The caller's shutdown signal fired.

/// State of a replication run.
///
/// See module docs for the state transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationState {
    /// Created but not run.
    ///
    /// Call [`run()`](super::Replicator::run) to start.
    Created,

    /// Copying the security object before any document moves.
    CopyingSecurity,

    /// Pipeline running.
    Replicating,

    /// Finished without error.
    Completed,

    /// Stopped by an error.
    ///
    /// The error and partial counts were returned from `run()`.
    Failed,

    /// Stopped by the caller.
    Cancelled,
}

impl ReplicationState {
    /// Whether the run is over.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReplicationState::Completed | ReplicationState::Failed | ReplicationState::Cancelled
        )
    }
}

impl std::fmt::Display for ReplicationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplicationState::Created => write!(f, "Created"),
            ReplicationState::CopyingSecurity => write!(f, "CopyingSecurity"),
            ReplicationState::Replicating => write!(f, "Replicating"),
            ReplicationState::Completed => write!(f, "Completed"),
            ReplicationState::Failed => write!(f, "Failed"),
            ReplicationState::Cancelled => write!(f, "Cancelled"),
        }
    }
}
