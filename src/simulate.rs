//! Synchronous simulation on the calling thread.
//!
//! Nothing here touches a tree: states are produced and handed back.
//! Simulation ends early at an end state (see [`State::is_end`]).

use std::iter::FusedIterator;
use std::sync::Arc;

use crate::error::StepError;
use crate::state::State;
use crate::step::{StepProfile, Stepper};

/// Advances `state` by up to `steps` steps and returns the last state.
pub fn simulate<S: State>(profile: &StepProfile<S>, state: impl Into<Arc<S>>, steps: u64) -> Result<Arc<S>, StepError> {
    let mut iter = iter_simulate(profile, state, steps);
    let mut last = iter.stepper.current().clone();
    for next in iter.by_ref().skip(1) {
        last = next?;
    }
    Ok(last)
}

/// Returns the chain from `state` onward: the start plus one state per step.
///
/// The result has `steps + 1` states unless an end state is reached first.
pub fn list_simulate<S: State>(
    profile: &StepProfile<S>,
    state: impl Into<Arc<S>>,
    steps: u64,
) -> Result<Vec<Arc<S>>, StepError> {
    iter_simulate(profile, state, steps).collect()
}

/// Lazily yields the same chain as [`list_simulate`].
///
/// The iterator is single-pass; call again for a fresh run. After a step
/// fails, the error is yielded once and the iterator ends.
pub fn iter_simulate<S: State>(profile: &StepProfile<S>, state: impl Into<Arc<S>>, steps: u64) -> SimulationIter<S> {
    SimulationIter {
        stepper: Stepper::new(profile.clone(), state.into()),
        remaining: steps,
        started: false,
        done: false,
    }
}

/// Iterator returned by [`iter_simulate`].
#[derive(Debug)]
pub struct SimulationIter<S: State> {
    stepper: Stepper<S>,
    remaining: u64,
    started: bool,
    done: bool,
}

impl<S: State> SimulationIter<S> {
    /// Steps still allowed.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl<S: State> Iterator for SimulationIter<S> {
    type Item = Result<Arc<S>, StepError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(Ok(Arc::clone(self.stepper.current())));
        }
        if self.remaining == 0 || self.stepper.current().is_end() {
            self.done = true;
            return None;
        }
        self.remaining -= 1;
        match self.stepper.step() {
            Ok(next) => Some(Ok(next)),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let pending = usize::try_from(self.remaining).ok().map(|r| r + usize::from(!self.started));
        (usize::from(!self.started), pending)
    }
}

impl<S: State> FusedIterator for SimulationIter<S> {}
