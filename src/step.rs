//! Step functions and step profiles.
//!
//! A simpack advances its state through a step function. Step functions come
//! in a closed set of shapes, each invoked uniformly through a [`Stepper`]:
//!
//! - `Simple`: `&S -> S`
//! - `InPlace`: mutates a state the engine owns privately
//! - `HistoryDependent`: sees every state from the root up to the current one
//! - `Randomized`: receives a seeded random number generator
//!
//! A [`StepProfile`] binds a step function to its arguments and has a stable,
//! hashable [`StepProfileKey`].

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{StepError, ValidationError};
use crate::state::State;

/// Argument key that seeds `Randomized` step functions.
pub const SEED_ARG: &str = "seed";

type SimpleFn<S> = dyn Fn(&S, &StepArgs) -> Result<S, StepError> + Send + Sync;
type InPlaceFn<S> = dyn Fn(&mut S, &StepArgs) -> Result<(), StepError> + Send + Sync;
type HistoryFn<S> = dyn Fn(&History<S>, &StepArgs) -> Result<S, StepError> + Send + Sync;
type RandomizedFn<S> =
    dyn Fn(&S, &StepArgs, &mut ChaCha8Rng) -> Result<S, StepError> + Send + Sync;

/// Named arguments bound to a step invocation.
///
/// Keys are kept sorted so the canonical encoding is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepArgs(BTreeMap<String, serde_json::Value>);

impl StepArgs {
    /// Creates an empty argument set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts or replaces an argument.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Looks up an argument.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Looks up a numeric argument.
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(serde_json::Value::as_f64)
    }

    /// Looks up an unsigned integer argument.
    #[must_use]
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(serde_json::Value::as_u64)
    }

    /// Seed bound through [`SEED_ARG`], if any.
    #[must_use]
    pub fn seed(&self) -> Option<u64> {
        self.get_u64(SEED_ARG)
    }

    /// Number of bound arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no arguments are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses arguments from a JSON object.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ValidationError> {
        serde_json::from_value(value).map_err(|e| ValidationError::InvalidStepArgs {
            reason: format!("expected a JSON object: {e}"),
        })
    }

    fn canonical_json(&self) -> String {
        // BTreeMap ordering makes this stable
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

/// The calling convention of a step function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepShape {
    /// `&S -> S`.
    Simple,
    /// Mutates a private copy of the state.
    InPlace,
    /// Reads the full history up to the current state.
    HistoryDependent,
    /// Draws from a random number generator.
    Randomized,
}

impl StepShape {
    const fn tag(self) -> u8 {
        match self {
            Self::Simple => 0,
            Self::InPlace => 1,
            Self::HistoryDependent => 2,
            Self::Randomized => 3,
        }
    }
}

/// Whether repeating a step invocation reproduces the same output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Determinism {
    /// Same input and profile always give the same output.
    Deterministic,
    /// Output may differ between invocations.
    NonDeterministic,
}

impl Determinism {
    /// Returns true for [`Determinism::Deterministic`].
    #[must_use]
    pub const fn is_deterministic(self) -> bool {
        matches!(self, Self::Deterministic)
    }
}

/// A step function in one of the supported shapes.
pub enum StepFunction<S> {
    /// Produces the next state from the current one.
    Simple {
        /// Stable name, part of the profile key.
        name: String,
        /// The step callable.
        step: Arc<SimpleFn<S>>,
    },
    /// Advances a state in place.
    InPlace {
        /// Stable name, part of the profile key.
        name: String,
        /// The step callable.
        step: Arc<InPlaceFn<S>>,
    },
    /// Produces the next state from the whole history.
    HistoryDependent {
        /// Stable name, part of the profile key.
        name: String,
        /// The step callable.
        step: Arc<HistoryFn<S>>,
    },
    /// Produces the next state using a random number generator.
    Randomized {
        /// Stable name, part of the profile key.
        name: String,
        /// The step callable.
        step: Arc<RandomizedFn<S>>,
    },
}

impl<S> StepFunction<S> {
    /// Wraps a `&S -> S` step.
    pub fn simple<F>(name: impl Into<String>, step: F) -> Self
    where
        F: Fn(&S, &StepArgs) -> Result<S, StepError> + Send + Sync + 'static,
    {
        Self::Simple {
            name: name.into(),
            step: Arc::new(step),
        }
    }

    /// Wraps an in-place step.
    pub fn in_place<F>(name: impl Into<String>, step: F) -> Self
    where
        F: Fn(&mut S, &StepArgs) -> Result<(), StepError> + Send + Sync + 'static,
    {
        Self::InPlace {
            name: name.into(),
            step: Arc::new(step),
        }
    }

    /// Wraps a history-dependent step.
    pub fn history_dependent<F>(name: impl Into<String>, step: F) -> Self
    where
        F: Fn(&History<S>, &StepArgs) -> Result<S, StepError> + Send + Sync + 'static,
    {
        Self::HistoryDependent {
            name: name.into(),
            step: Arc::new(step),
        }
    }

    /// Wraps a randomized step.
    pub fn randomized<F>(name: impl Into<String>, step: F) -> Self
    where
        F: Fn(&S, &StepArgs, &mut ChaCha8Rng) -> Result<S, StepError> + Send + Sync + 'static,
    {
        Self::Randomized {
            name: name.into(),
            step: Arc::new(step),
        }
    }

    /// The function's stable name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Simple { name, .. }
            | Self::InPlace { name, .. }
            | Self::HistoryDependent { name, .. }
            | Self::Randomized { name, .. } => name,
        }
    }

    /// The function's calling convention.
    #[must_use]
    pub const fn shape(&self) -> StepShape {
        match self {
            Self::Simple { .. } => StepShape::Simple,
            Self::InPlace { .. } => StepShape::InPlace,
            Self::HistoryDependent { .. } => StepShape::HistoryDependent,
            Self::Randomized { .. } => StepShape::Randomized,
        }
    }

    /// Returns true if invoking this function requires the state history.
    #[must_use]
    pub const fn needs_history(&self) -> bool {
        matches!(self, Self::HistoryDependent { .. })
    }

    /// Determinism implied by the shape and the bound arguments.
    ///
    /// Randomized steps are deterministic only when a seed is bound.
    #[must_use]
    pub fn determinism(&self, args: &StepArgs) -> Determinism {
        match self {
            Self::Randomized { .. } if args.seed().is_none() => Determinism::NonDeterministic,
            _ => Determinism::Deterministic,
        }
    }
}

impl<S> Clone for StepFunction<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Simple { name, step } => Self::Simple {
                name: name.clone(),
                step: Arc::clone(step),
            },
            Self::InPlace { name, step } => Self::InPlace {
                name: name.clone(),
                step: Arc::clone(step),
            },
            Self::HistoryDependent { name, step } => Self::HistoryDependent {
                name: name.clone(),
                step: Arc::clone(step),
            },
            Self::Randomized { name, step } => Self::Randomized {
                name: name.clone(),
                step: Arc::clone(step),
            },
        }
    }
}

impl<S> fmt::Debug for StepFunction<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepFunction")
            .field("name", &self.name())
            .field("shape", &self.shape())
            .finish_non_exhaustive()
    }
}

/// Stable identity of a step profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepProfileKey([u8; 32]);

impl StepProfileKey {
    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for StepProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", blake3::Hash::from(self.0).to_hex())
    }
}

/// A step function together with the arguments it is invoked with.
pub struct StepProfile<S> {
    /// The step function.
    pub function: StepFunction<S>,
    /// Arguments passed on every invocation.
    pub args: StepArgs,
}

impl<S> StepProfile<S> {
    /// Binds arguments to a step function.
    #[must_use]
    pub fn new(function: StepFunction<S>, args: StepArgs) -> Self {
        Self { function, args }
    }

    /// Profile of a step function invoked without arguments.
    #[must_use]
    pub fn bare(function: StepFunction<S>) -> Self {
        Self::new(function, StepArgs::new())
    }

    /// Stable digest of the function name, shape and canonical arguments.
    #[must_use]
    pub fn key(&self) -> StepProfileKey {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.function.name().as_bytes());
        hasher.update(&[0, self.function.shape().tag()]);
        hasher.update(self.args.canonical_json().as_bytes());
        StepProfileKey(*hasher.finalize().as_bytes())
    }

    /// Determinism implied by the function shape and arguments.
    #[must_use]
    pub fn determinism(&self) -> Determinism {
        self.function.determinism(&self.args)
    }
}

impl<S> Clone for StepProfile<S> {
    fn clone(&self) -> Self {
        Self {
            function: self.function.clone(),
            args: self.args.clone(),
        }
    }
}

impl<S> fmt::Debug for StepProfile<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepProfile")
            .field("function", &self.function)
            .field("args", &self.args)
            .finish()
    }
}

/// The chain of states from a root up to the state being stepped.
#[derive(Debug)]
pub struct History<S> {
    states: Vec<Arc<S>>,
}

impl<S: State> History<S> {
    fn new(ancestors: Vec<Arc<S>>, current: Arc<S>) -> Self {
        let mut states = ancestors;
        states.push(current);
        Self { states }
    }

    /// The most recent state. Never absent.
    #[must_use]
    pub fn current(&self) -> &S {
        // History::new always pushes the current state
        &self.states[self.states.len() - 1]
    }

    /// Number of states in the history, current included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Always false; a history holds at least the current state.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// State at a position counted from the root.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&S> {
        self.states.get(index).map(|s| &**s)
    }

    /// State `generations` steps before the current one.
    #[must_use]
    pub fn ancestor(&self, generations: usize) -> Option<&S> {
        let index = self.states.len().checked_sub(generations + 1)?;
        self.get(index)
    }

    /// Latest state whose clock is at or before `clock`.
    #[must_use]
    pub fn state_at_clock(&self, clock: Clock) -> Option<&S> {
        let end = self.states.partition_point(|s| s.clock() <= clock);
        end.checked_sub(1).and_then(|i| self.get(i))
    }

    /// Iterates states from the root.
    pub fn iter(&self) -> impl Iterator<Item = &S> {
        self.states.iter().map(|s| &**s)
    }

    fn push(&mut self, state: Arc<S>) {
        self.states.push(state);
    }
}

/// Advances a chain of states with a fixed step profile.
///
/// The stepper owns everything a step needs: the current state, a private
/// copy for in-place steps, the history for history-dependent steps and the
/// generator for randomized ones. Panics in the step function are caught and
/// reported as [`StepError::Panicked`].
pub struct Stepper<S: State> {
    profile: StepProfile<S>,
    current: Arc<S>,
    scratch: Option<S>,
    history: Option<History<S>>,
    rng: Option<ChaCha8Rng>,
}

impl<S: State> Stepper<S> {
    /// Creates a stepper starting at `start` with no recorded ancestors.
    #[must_use]
    pub fn new(profile: StepProfile<S>, start: Arc<S>) -> Self {
        Self::with_ancestors(profile, Vec::new(), start)
    }

    /// Creates a stepper whose history begins with `ancestors` (root first).
    ///
    /// Ancestors are only retained for history-dependent step functions.
    #[must_use]
    pub fn with_ancestors(profile: StepProfile<S>, ancestors: Vec<Arc<S>>, start: Arc<S>) -> Self {
        let history = profile
            .function
            .needs_history()
            .then(|| History::new(ancestors, Arc::clone(&start)));
        let rng = match profile.function {
            StepFunction::Randomized { .. } => Some(match profile.args.seed() {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::seed_from_u64(rand::random()),
            }),
            _ => None,
        };
        Self {
            profile,
            current: start,
            scratch: None,
            history,
            rng,
        }
    }

    /// The most recently produced state (or the start state).
    #[must_use]
    pub fn current(&self) -> &Arc<S> {
        &self.current
    }

    /// The profile this stepper invokes.
    #[must_use]
    pub fn profile(&self) -> &StepProfile<S> {
        &self.profile
    }

    /// Computes the next state and makes it current.
    pub fn step(&mut self) -> Result<Arc<S>, StepError> {
        let args = &self.profile.args;
        let current: &S = &self.current;
        let scratch = &mut self.scratch;
        let history = self.history.as_ref();
        let rng = &mut self.rng;
        let function = &self.profile.function;

        let outcome = catch_unwind(AssertUnwindSafe(|| match function {
            StepFunction::Simple { step, .. } => step(current, args),
            StepFunction::InPlace { step, .. } => {
                let state = scratch.get_or_insert_with(|| S::clone(current));
                step(state, args).map(|()| state.clone())
            }
            StepFunction::HistoryDependent { step, name } => match history {
                Some(history) => step(history, args),
                None => Err(StepError::failed(name.clone(), "history was not captured")),
            },
            StepFunction::Randomized { step, .. } => {
                let rng = rng.get_or_insert_with(|| ChaCha8Rng::seed_from_u64(rand::random()));
                step(current, args, rng)
            }
        }));

        let next = match outcome {
            Ok(Ok(next)) => next,
            Ok(Err(err)) => {
                // The private copy may be half-mutated.
                self.scratch = None;
                return Err(err);
            }
            Err(payload) => {
                self.scratch = None;
                return Err(StepError::Panicked {
                    function: self.profile.function.name().to_string(),
                    message: panic_message(payload.as_ref()),
                });
            }
        };

        let next = Arc::new(next);
        if let Some(history) = self.history.as_mut() {
            history.push(Arc::clone(&next));
        }
        self.current = Arc::clone(&next);
        Ok(next)
    }
}

impl<S: State> fmt::Debug for Stepper<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stepper")
            .field("profile", &self.profile)
            .field("clock", &self.current.clock())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
