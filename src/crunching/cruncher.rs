//! The cruncher contract.
//!
//! A cruncher advances a state in some execution context the manager does not
//! see into: a thread, a process, anything that can hand back states. The
//! manager only ever calls the non-blocking methods on [`Cruncher`].

use std::sync::Arc;

use crate::error::{ForklineResult, StepError};
use crate::step::StepProfile;

use super::job::CrunchTarget;

/// Why a cruncher stopped producing states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrunchOutcome {
    /// The target it was last given is met.
    ReachedTarget,
    /// The last produced state is an end state.
    ReachedEnd,
    /// The step function failed; nothing further will be produced.
    Failed(StepError),
    /// It stopped because it was retired.
    Retired,
}

/// States drained from a cruncher in one call.
#[derive(Debug)]
pub struct Harvest<S> {
    /// Produced states in production order.
    pub states: Vec<Arc<S>>,
    /// Set once the cruncher has stopped. Reported exactly once.
    pub outcome: Option<CrunchOutcome>,
}

impl<S> Harvest<S> {
    /// A harvest with nothing in it.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            states: Vec::new(),
            outcome: None,
        }
    }

    /// Returns true if neither states nor an outcome were collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty() && self.outcome.is_none()
    }
}

impl<S> Default for Harvest<S> {
    fn default() -> Self {
        Self::empty()
    }
}

/// A background producer of states.
///
/// Implementations must never block in any of these methods.
pub trait Cruncher<S>: Send {
    /// Drains everything produced since the last call.
    ///
    /// After [`Cruncher::retire`] returns, no further states are delivered.
    fn retrieve_available(&mut self) -> Harvest<S>;

    /// Returns true while the execution context is still running.
    fn is_alive(&self) -> bool;

    /// Requests a cooperative stop between steps. Idempotent.
    fn retire(&self);

    /// Replaces the target; taken into account before the next step.
    ///
    /// Step targets count from the cruncher's own start state.
    fn update_target(&self, target: CrunchTarget);
}

/// Everything a cruncher needs to start.
pub struct CrunchSeed<S> {
    /// State to advance from.
    pub start: Arc<S>,
    /// States from the root down to, excluding, `start`. Empty unless the
    /// step function reads history.
    pub ancestors: Vec<Arc<S>>,
    /// Step profile to run.
    pub profile: StepProfile<S>,
    /// Where to stop.
    pub target: CrunchTarget,
}

/// Spawns crunchers in a particular kind of execution context.
pub trait CruncherFactory<S>: Send + Sync {
    /// Starts a cruncher running from `seed`.
    fn spawn(&self, seed: CrunchSeed<S>) -> ForklineResult<Box<dyn Cruncher<S>>>;
}
