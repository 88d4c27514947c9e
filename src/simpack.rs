//! The simpack contract.
//!
//! A simpack is a pluggable simulation: a state type plus the step functions
//! that advance it. The engine consumes a simpack only through the
//! capabilities on [`Simpack`]; how a simpack defines its steps is its own
//! business.

use crate::state::State;
use crate::step::{Determinism, StepArgs, StepFunction, StepProfile};

/// A pluggable simulation definition.
///
/// # Examples
///
/// ```
/// use forkline::{Clock, Simpack, State, StepArgs, StepFunction};
///
/// #[derive(Clone)]
/// struct Tick(u32);
///
/// impl State for Tick {
///     fn clock(&self) -> Clock {
///         Clock::from(self.0)
///     }
/// }
///
/// struct Ticker;
///
/// impl Simpack for Ticker {
///     type State = Tick;
///
///     fn name(&self) -> &str {
///         "ticker"
///     }
///
///     fn default_step_function(&self) -> StepFunction<Tick> {
///         StepFunction::simple("tick", |s: &Tick, _: &StepArgs| Ok(Tick(s.0 + 1)))
///     }
/// }
///
/// let profile = Ticker.build_step_profile(StepArgs::new());
/// assert_eq!(profile.function.name(), "tick");
/// assert!(Ticker.determinism_function(&profile).is_deterministic());
/// ```
pub trait Simpack: Send + Sync + 'static {
    /// The simulation's state type.
    type State: State;

    /// Human-readable simpack name, used in logs.
    fn name(&self) -> &str;

    /// The canonical step function.
    fn default_step_function(&self) -> StepFunction<Self::State>;

    /// Binds arguments to the default step function.
    fn build_step_profile(&self, args: StepArgs) -> StepProfile<Self::State> {
        StepProfile::new(self.default_step_function(), args)
    }

    /// Reports whether invoking `profile` repeatedly reproduces the same output.
    ///
    /// Defaults to what the step function's shape implies.
    fn determinism_function(&self, profile: &StepProfile<Self::State>) -> Determinism {
        profile.determinism()
    }
}
