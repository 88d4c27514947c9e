//! Crunchers backed by OS threads.
//!
//! Each cruncher owns one named worker thread. Produced states flow back over
//! a bounded channel; when it is full the worker waits, re-checking its stop
//! flag every `send_poll_interval_ms`. Target updates travel the other way on
//! a control channel and are read between steps.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, SendTimeoutError, Sender, TryRecvError};
use tracing::{debug, warn};

use crate::config::CrunchingConfig;
use crate::error::{CrunchError, ForklineResult};
use crate::state::State;
use crate::step::Stepper;

use super::cruncher::{CrunchOutcome, CrunchSeed, Cruncher, CruncherFactory, Harvest};
use super::job::CrunchTarget;

enum Message<S> {
    State(Arc<S>),
    Stopped(CrunchOutcome),
}

/// A cruncher running on a dedicated thread.
///
/// Dropping it retires the worker and detaches the thread.
pub struct ThreadCruncher<S> {
    rx: Receiver<Message<S>>,
    control_tx: Sender<CrunchTarget>,
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
    disconnected: bool,
    outcome_reported: bool,
}

impl<S: State> ThreadCruncher<S> {
    /// Spawns a worker thread advancing from `seed`.
    pub fn spawn(seed: CrunchSeed<S>, config: &CrunchingConfig, thread_name: String) -> ForklineResult<Self> {
        let (tx, rx) = bounded::<Message<S>>(config.buffer_capacity.max(1));
        let (control_tx, control_rx) = unbounded::<CrunchTarget>();
        let stop = Arc::new(AtomicBool::new(false));
        let poll = Duration::from_millis(config.send_poll_interval_ms.max(1));

        let worker_stop = Arc::clone(&stop);
        let join = thread::Builder::new()
            .name(thread_name)
            .spawn(move || worker_loop(seed, &tx, &control_rx, &worker_stop, poll))
            .map_err(|e| CrunchError::SpawnFailed { reason: e.to_string() })?;

        Ok(Self {
            rx,
            control_tx,
            stop,
            join: Some(join),
            disconnected: false,
            outcome_reported: false,
        })
    }

    fn is_retired(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

impl<S: State> Cruncher<S> for ThreadCruncher<S> {
    fn retrieve_available(&mut self) -> Harvest<S> {
        let mut harvest = Harvest::empty();
        if self.outcome_reported && self.disconnected {
            return harvest;
        }
        let retired = self.is_retired();

        loop {
            match self.rx.try_recv() {
                Ok(Message::State(state)) => {
                    if !retired {
                        harvest.states.push(state);
                    }
                }
                Ok(Message::Stopped(outcome)) => {
                    if !self.outcome_reported {
                        self.outcome_reported = true;
                        harvest.outcome = Some(if retired { CrunchOutcome::Retired } else { outcome });
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }
        // A retired worker may exit without getting its last message through.
        if retired && self.disconnected && !self.outcome_reported {
            self.outcome_reported = true;
            harvest.outcome = Some(CrunchOutcome::Retired);
        }
        harvest
    }

    fn is_alive(&self) -> bool {
        // Disconnection is only observed once every message is drained.
        !self.disconnected
    }

    fn retire(&self) {
        self.stop.store(true, Ordering::Release);
    }

    fn update_target(&self, target: CrunchTarget) {
        // The worker may already have exited; the manager handles that.
        let _ = self.control_tx.send(target);
    }
}

impl<S> Drop for ThreadCruncher<S> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        // Detach: the worker notices the flag or the dropped receiver.
        drop(self.join.take());
    }
}

fn worker_loop<S: State>(
    seed: CrunchSeed<S>,
    tx: &Sender<Message<S>>,
    control_rx: &Receiver<CrunchTarget>,
    stop: &AtomicBool,
    poll: Duration,
) {
    let CrunchSeed {
        start,
        ancestors,
        profile,
        mut target,
    } = seed;
    let function = profile.function.name().to_string();
    let mut stepper = Stepper::with_ancestors(profile, ancestors, start);
    let mut steps: u64 = 0;

    debug!(function = %function, target = %target, "cruncher started");

    let outcome = loop {
        while let Ok(updated) = control_rx.try_recv() {
            target = updated;
        }
        if stop.load(Ordering::Acquire) {
            break CrunchOutcome::Retired;
        }
        let current = stepper.current();
        if current.is_end() {
            break CrunchOutcome::ReachedEnd;
        }
        if target.is_reached(current.clock(), steps) {
            break CrunchOutcome::ReachedTarget;
        }
        match stepper.step() {
            Ok(next) => {
                steps += 1;
                if !deliver(tx, Message::State(next), stop, poll) {
                    break CrunchOutcome::Retired;
                }
            }
            Err(err) => {
                warn!(function = %function, error = %err, "step failed in cruncher");
                break CrunchOutcome::Failed(err);
            }
        }
    };

    debug!(function = %function, steps = steps, outcome = ?outcome, "cruncher exiting");
    deliver(tx, Message::Stopped(outcome), stop, poll);
}

/// Sends `msg`, giving up if the stop flag is raised while the buffer is full
/// or the receiving side is gone.
fn deliver<S>(tx: &Sender<Message<S>>, mut msg: Message<S>, stop: &AtomicBool, poll: Duration) -> bool {
    loop {
        match tx.send_timeout(msg, poll) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(back)) => {
                if stop.load(Ordering::Acquire) {
                    return false;
                }
                msg = back;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

/// Spawns [`ThreadCruncher`]s with a shared configuration.
#[derive(Debug)]
pub struct ThreadCruncherFactory {
    config: CrunchingConfig,
    spawned: AtomicU64,
}

impl ThreadCruncherFactory {
    /// Creates a factory using `config` for buffer sizes and thread names.
    #[must_use]
    pub fn new(config: CrunchingConfig) -> Self {
        Self {
            config,
            spawned: AtomicU64::new(0),
        }
    }

    /// Number of crunchers spawned so far.
    #[must_use]
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl<S: State> CruncherFactory<S> for ThreadCruncherFactory {
    fn spawn(&self, seed: CrunchSeed<S>) -> ForklineResult<Box<dyn Cruncher<S>>> {
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{n}", self.config.thread_name_prefix);
        let cruncher = ThreadCruncher::spawn(seed, &self.config, name)?;
        Ok(Box::new(cruncher))
    }
}
