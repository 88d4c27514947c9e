//! The simpack-defined state contract.

use crate::clock::Clock;

/// A single moment of a simulation.
///
/// The engine treats states as opaque apart from their clock. Once a state
/// is recorded in a tree it is shared as an `Arc<S>` and never mutated; a
/// step function that works in place is handed the engine's own private copy.
///
/// # Examples
///
/// ```
/// use forkline::{Clock, State};
///
/// #[derive(Clone)]
/// struct Counter {
///     clock: u32,
/// }
///
/// impl State for Counter {
///     fn clock(&self) -> Clock {
///         Clock::from(self.clock)
///     }
/// }
///
/// assert_eq!(Counter { clock: 3 }.clock(), Clock::from(3u32));
/// assert!(!Counter { clock: 3 }.is_end());
/// ```
pub trait State: Clone + Send + Sync + 'static {
    /// Progress marker of this state. Must not decrease from parent to child.
    fn clock(&self) -> Clock;

    /// Whether the simulation has ended at this state.
    ///
    /// Crunching and synchronous simulation stop after producing an end state.
    fn is_end(&self) -> bool {
        false
    }
}
