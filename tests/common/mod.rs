//! Sample simpacks shared by the integration tests.

#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};

use forkline::{Clock, History, Project, Simpack, State, StepArgs, StepError, StepFunction};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// A counter advancing its clock by one per step.
#[derive(Debug, Clone, PartialEq)]
pub struct Counter {
    pub clock: u32,
    pub value: i64,
    pub end_at: Option<u32>,
}

impl Counter {
    pub fn zero() -> Self {
        Self {
            clock: 0,
            value: 0,
            end_at: None,
        }
    }

    pub fn ending_at(end_at: u32) -> Self {
        Self {
            end_at: Some(end_at),
            ..Self::zero()
        }
    }
}

impl State for Counter {
    fn clock(&self) -> Clock {
        Clock::from(self.clock)
    }

    fn is_end(&self) -> bool {
        self.end_at.is_some_and(|end| self.clock >= end)
    }
}

fn next(s: &Counter, delta: i64) -> Counter {
    Counter {
        clock: s.clock + 1,
        value: s.value + delta,
        end_at: s.end_at,
    }
}

/// Adds `delta` (default 1) every step.
#[derive(Debug, Default)]
pub struct CounterPack;

impl Simpack for CounterPack {
    type State = Counter;

    fn name(&self) -> &str {
        "counter"
    }

    fn default_step_function(&self) -> StepFunction<Counter> {
        StepFunction::simple("add", |s: &Counter, args: &StepArgs| {
            let delta = args.get_f64("delta").unwrap_or(1.0);
            #[allow(clippy::cast_possible_truncation)]
            Ok(next(s, delta as i64))
        })
    }
}

/// Fails once the clock reaches `fail_at`.
#[derive(Debug)]
pub struct FailingPack {
    pub fail_at: u32,
}

impl Simpack for FailingPack {
    type State = Counter;

    fn name(&self) -> &str {
        "failing"
    }

    fn default_step_function(&self) -> StepFunction<Counter> {
        let fail_at = self.fail_at;
        StepFunction::simple("fragile", move |s: &Counter, _: &StepArgs| {
            if s.clock >= fail_at {
                return Err(StepError::failed("fragile", format!("refused to leave clock {}", s.clock)));
            }
            Ok(next(s, 1))
        })
    }
}

/// Value is the sum of every earlier value plus one.
#[derive(Debug, Default)]
pub struct AccumulatorPack;

impl Simpack for AccumulatorPack {
    type State = Counter;

    fn name(&self) -> &str {
        "accumulator"
    }

    fn default_step_function(&self) -> StepFunction<Counter> {
        StepFunction::history_dependent("accumulate", |h: &History<Counter>, _: &StepArgs| {
            let total: i64 = h.iter().map(|s| s.value).sum();
            Ok(Counter {
                clock: h.current().clock + 1,
                value: total + 1,
                end_at: None,
            })
        })
    }
}

/// A random walk.
#[derive(Debug, Default)]
pub struct WalkPack;

impl Simpack for WalkPack {
    type State = Counter;

    fn name(&self) -> &str {
        "walk"
    }

    fn default_step_function(&self) -> StepFunction<Counter> {
        StepFunction::randomized("walk", |s: &Counter, _: &StepArgs, rng: &mut ChaCha8Rng| {
            Ok(next(s, rng.gen_range(-5..=5)))
        })
    }
}

/// Syncs until no job is active. Returns the total number of nodes added.
pub fn drain<P: Simpack>(project: &mut Project<P>) -> usize {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut total = 0;
    while project.crunching_manager().has_active_jobs() {
        total += project.sync_crunchers().unwrap();
        assert!(Instant::now() < deadline, "crunching did not finish in time");
        thread::sleep(Duration::from_millis(1));
    }
    total
}
