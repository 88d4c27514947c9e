//! Error types for forkline.
//!
//! Errors are strongly typed per layer using thiserror:
//! structural tree errors, job table errors, step failures and
//! validation errors all roll up into [`ForklineError`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::Clock;
use crate::crunching::JobId;
use crate::tree::{BlockId, NodeId};

/// Validation errors that occur while checking configuration or arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid configuration field '{field}': {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Invalid step arguments: {reason}")]
    InvalidStepArgs {
        reason: String,
    },

    #[error("Invalid crunching target: {reason}")]
    InvalidTarget {
        reason: String,
    },
}

/// Structural errors raised by the history tree.
///
/// These are reported synchronously and never leave the tree in a
/// partially mutated state.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TreeError {
    #[error("Node not found: {node}")]
    UnknownNode {
        node: NodeId,
    },

    #[error("Block not found: {block}")]
    UnknownBlock {
        block: BlockId,
    },

    #[error("State is already recorded in this tree at {node}")]
    StateAlreadyInTree {
        node: NodeId,
    },

    #[error("Index {index} is out of range for {block} of length {len}")]
    BlockIndexOutOfRange {
        block: BlockId,
        index: usize,
        len: usize,
    },

    #[error("Clock would move backwards under {parent}: parent at {parent_clock}, child at {child_clock}")]
    ClockRegression {
        parent: NodeId,
        parent_clock: Clock,
        child_clock: Clock,
    },
}

/// Errors raised by the crunching manager's job table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrunchError {
    #[error("{node} is already being crunched by job {job}")]
    NodeAlreadyCrunched {
        node: NodeId,
        job: JobId,
    },

    #[error("Job not found: {job}")]
    UnknownJob {
        job: JobId,
    },

    #[error("Job {job} is no longer active")]
    JobNotActive {
        job: JobId,
    },

    #[error("Active job limit reached (max: {limit})")]
    TooManyJobs {
        limit: usize,
    },

    #[error("Failed to spawn cruncher: {reason}")]
    SpawnFailed {
        reason: String,
    },
}

/// Failure raised by a step function.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum StepError {
    #[error("Step function '{function}' failed: {message}")]
    Failed {
        function: String,
        message: String,
    },

    #[error("Step function '{function}' panicked: {message}")]
    Panicked {
        function: String,
        message: String,
    },
}

impl StepError {
    /// Creates a failure for the named step function.
    #[must_use]
    pub fn failed(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Name of the step function that failed.
    #[must_use]
    pub fn function(&self) -> &str {
        match self {
            Self::Failed { function, .. } | Self::Panicked { function, .. } => function,
        }
    }
}

/// Top-level error type for forkline.
#[derive(Debug, Error)]
pub enum ForklineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Crunching error: {0}")]
    Crunch(#[from] CrunchError),

    #[error("Step error: {0}")]
    Step(#[from] StepError),

    #[error("Poisoned lock: {context}")]
    LockPoisoned {
        context: &'static str,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl ForklineError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a structural tree error.
    #[must_use]
    pub const fn is_tree(&self) -> bool {
        matches!(self, Self::Tree(_))
    }

    /// Returns true if this is a job table error.
    #[must_use]
    pub const fn is_crunch(&self) -> bool {
        matches!(self, Self::Crunch(_))
    }

    /// Returns true if this is a step function failure.
    #[must_use]
    pub const fn is_step(&self) -> bool {
        matches!(self, Self::Step(_))
    }

    /// Returns true if re-issuing the same call may succeed.
    ///
    /// Nothing inside forkline retries on its own; this only informs callers.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Crunch(e) => matches!(
                e,
                CrunchError::TooManyJobs { .. } | CrunchError::SpawnFailed { .. }
            ),
            Self::Validation(_)
            | Self::Tree(_)
            | Self::Step(_)
            | Self::LockPoisoned { .. }
            | Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for forkline operations.
pub type ForklineResult<T> = Result<T, ForklineError>;
