//! Job records held by the crunching manager.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{StepError, TreeError, ValidationError};
use crate::step::StepProfileKey;
use crate::tree::NodeId;

/// Stable identifier for a crunching job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Create a new random job ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How far a job should extend its frontier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrunchTarget {
    /// Stop once the frontier clock reaches this value.
    Clock(Clock),
    /// Stop after this many harvested states.
    Steps(u64),
    /// Never stop on its own; run until cancelled or an end state.
    Forever,
}

impl CrunchTarget {
    /// Checks the target is attainable.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Clock(clock) if !clock.value().is_finite() => Err(ValidationError::InvalidTarget {
                reason: format!("clock target must be finite, got {clock}"),
            }),
            _ => Ok(()),
        }
    }

    /// Returns true once a chain at `clock`, `steps` states past its origin,
    /// satisfies this target.
    #[must_use]
    pub fn is_reached(&self, clock: Clock, steps: u64) -> bool {
        match *self {
            Self::Clock(target) => clock >= target,
            Self::Steps(target) => steps >= target,
            Self::Forever => false,
        }
    }

    /// The same target seen by a chain that has already taken `done` steps.
    #[must_use]
    pub fn remaining_after(&self, done: u64) -> Self {
        match *self {
            Self::Steps(target) => Self::Steps(target.saturating_sub(done)),
            other => other,
        }
    }
}

impl fmt::Display for CrunchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clock(clock) => write!(f, "clock {clock}"),
            Self::Steps(steps) => write!(f, "{steps} steps"),
            Self::Forever => f.write_str("forever"),
        }
    }
}

/// Why a job failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobFailure {
    /// The step function returned an error or panicked.
    Step(StepError),
    /// The cruncher stopped without reporting why.
    CruncherDied,
    /// A harvested state could not be recorded.
    Tree(TreeError),
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step(e) => write!(f, "{e}"),
            Self::CruncherDied => f.write_str("cruncher died unexpectedly"),
            Self::Tree(e) => write!(f, "{e}"),
        }
    }
}

/// Job lifecycle: `Pending -> Running -> {Completed, Failed, Cancelled}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    /// Recorded, cruncher not yet started.
    Pending,
    /// A cruncher is producing states.
    Running,
    /// The target or an end state was reached.
    Completed,
    /// The job stopped with an error.
    Failed {
        /// What went wrong.
        failure: JobFailure,
    },
    /// The job was cancelled by its owner.
    Cancelled,
}

impl JobStatus {
    /// Returns true for `Completed`, `Failed` and `Cancelled`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. } | Self::Cancelled)
    }
}

/// A snapshot of one job's bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job identity.
    pub id: JobId,
    /// Node the job started from.
    pub origin: NodeId,
    /// Leaf the job is extending; equals `origin` until the first harvest.
    pub frontier: NodeId,
    /// Where the job stops.
    pub target: CrunchTarget,
    /// States appended to the tree so far.
    pub steps_harvested: u64,
    /// Lifecycle state.
    pub status: JobStatus,
    /// Key of the step profile the cruncher runs.
    pub profile_key: StepProfileKey,
    /// When the job was begun.
    pub started_at: DateTime<Utc>,
    /// When the job reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub(crate) fn new(origin: NodeId, target: CrunchTarget, profile_key: StepProfileKey) -> Self {
        Self {
            id: JobId::new(),
            origin,
            frontier: origin,
            target,
            steps_harvested: 0,
            status: JobStatus::Pending,
            profile_key,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Returns true while the job is pending or running.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    pub(crate) fn finish(&mut self, status: JobStatus) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}
