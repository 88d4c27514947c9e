//! The crunching manager: job table plus harvesting.
//!
//! The manager never waits on a cruncher. [`CrunchingManager::sync_crunchers`]
//! takes the tree's write lock once, drains every cruncher while holding it
//! and appends each job's states under its frontier in production order.
//! Draining never blocks, so the lock is held only for the append work.
//! States are never drained while the lock is unavailable, so a failed
//! sync loses nothing.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::CrunchingConfig;
use crate::error::{CrunchError, ForklineResult, TreeError};
use crate::state::State;
use crate::step::StepProfile;
use crate::tree::{NodeId, Tree, TreeLock};

use super::cruncher::{CrunchOutcome, CrunchSeed, Cruncher, CruncherFactory, Harvest};
use super::job::{CrunchTarget, Job, JobFailure, JobId, JobStatus};
use super::thread::ThreadCruncherFactory;

struct ActiveJob<S> {
    job: Job,
    cruncher: Box<dyn Cruncher<S>>,
    profile: StepProfile<S>,
    /// `steps_harvested` when the current cruncher was spawned.
    spawn_offset: u64,
}

impl<S: State> ActiveJob<S> {
    fn cruncher_target(&self) -> CrunchTarget {
        self.job.target.remaining_after(self.spawn_offset)
    }

    fn target_reached(&self, tree: &Tree<S>) -> bool {
        tree.get(self.job.frontier)
            .is_some_and(|n| self.job.target.is_reached(n.clock(), self.job.steps_harvested))
    }
}

/// Owns every crunching job of one tree.
pub struct CrunchingManager<S: State> {
    tree: TreeLock<S>,
    config: CrunchingConfig,
    factory: Arc<dyn CruncherFactory<S>>,
    active: Vec<ActiveJob<S>>,
    finished: Vec<Job>,
}

impl<S: State> CrunchingManager<S> {
    /// Creates a manager that runs crunchers on threads.
    #[must_use]
    pub fn new(tree: TreeLock<S>, config: CrunchingConfig) -> Self {
        let factory = Arc::new(ThreadCruncherFactory::new(config.clone()));
        Self::with_factory(tree, config, factory)
    }

    /// Creates a manager that spawns crunchers through `factory`.
    #[must_use]
    pub fn with_factory(tree: TreeLock<S>, config: CrunchingConfig, factory: Arc<dyn CruncherFactory<S>>) -> Self {
        Self {
            tree,
            config,
            factory,
            active: Vec::new(),
            finished: Vec::new(),
        }
    }

    /// The tree this manager harvests into.
    #[must_use]
    pub fn tree(&self) -> &TreeLock<S> {
        &self.tree
    }

    /// Starts a job extending `node` toward `target` with `profile`.
    ///
    /// Fails with [`CrunchError::NodeAlreadyCrunched`] if an active job's
    /// frontier is `node`, and with [`CrunchError::TooManyJobs`] at the
    /// configured limit.
    pub fn begin_crunching(&mut self, node: NodeId, target: CrunchTarget, profile: StepProfile<S>) -> ForklineResult<JobId> {
        target.validate()?;
        if let Some(existing) = self.active.iter().find(|a| a.job.frontier == node) {
            return Err(CrunchError::NodeAlreadyCrunched {
                node,
                job: existing.job.id,
            }
            .into());
        }
        if self.active.len() >= self.config.max_active_jobs {
            return Err(CrunchError::TooManyJobs {
                limit: self.config.max_active_jobs,
            }
            .into());
        }

        let mut job = Job::new(node, target, profile.key());
        let seed = {
            let tree = self.tree.read()?;
            seed_for(&tree, node, &profile, target)?
        };
        let cruncher = self.factory.spawn(seed)?;
        job.status = JobStatus::Running;

        info!(job = %job.id, node = %node, target = %target, profile = %job.profile_key, "began crunching");
        let id = job.id;
        self.active.push(ActiveJob {
            job,
            cruncher,
            profile,
            spawn_offset: 0,
        });
        Ok(id)
    }

    /// Harvests every cruncher's available output into the tree.
    ///
    /// Returns the number of nodes added. Never blocks on cruncher progress.
    /// Jobs that complete, fail or lose their frontier leave the active set
    /// and become visible through [`CrunchingManager::finished_jobs`].
    pub fn sync_crunchers(&mut self) -> ForklineResult<usize> {
        if self.active.is_empty() {
            return Ok(0);
        }
        let tree_lock = self.tree.clone();
        let mut tree = tree_lock.write()?;

        let harvests: Vec<Harvest<S>> = self
            .active
            .iter_mut()
            .map(|a| a.cruncher.retrieve_available())
            .collect();

        if harvests.iter().all(Harvest::is_empty) {
            drop(tree);
            for active in &mut self.active {
                if !active.cruncher.is_alive() {
                    active.job.finish(JobStatus::Failed {
                        failure: JobFailure::CruncherDied,
                    });
                }
            }
            self.retire_terminal();
            return Ok(0);
        }

        let mut added = 0;
        for (active, harvest) in self.active.iter_mut().zip(harvests) {
            added += apply_harvest(&mut tree, self.factory.as_ref(), active, harvest);
        }
        drop(tree);
        self.retire_terminal();

        if added > 0 {
            debug!(added = added, active = self.active.len(), "synced crunchers");
        }
        Ok(added)
    }

    /// Replaces a job's target.
    ///
    /// A target the frontier already meets completes the job immediately.
    pub fn update_target(&mut self, job: JobId, target: CrunchTarget) -> ForklineResult<()> {
        target.validate()?;
        let index = self.active_index(job)?;
        let reached = {
            let active = &mut self.active[index];
            active.job.target = target;
            let tree = self.tree.read()?;
            active.target_reached(&tree)
        };
        if reached {
            self.active[index].job.finish(JobStatus::Completed);
            self.retire_terminal();
        } else {
            let active = &self.active[index];
            active.cruncher.update_target(active.cruncher_target());
            debug!(job = %job, target = %target, "updated crunching target");
        }
        Ok(())
    }

    /// Cancels an active job and returns its final record.
    ///
    /// Output the cruncher produces afterwards is discarded.
    pub fn cancel(&mut self, job: JobId) -> ForklineResult<Job> {
        let index = self.active_index(job)?;
        self.active[index].job.finish(JobStatus::Cancelled);
        self.retire_terminal();
        self.finished
            .iter()
            .rev()
            .find(|j| j.id == job)
            .cloned()
            .ok_or_else(|| CrunchError::UnknownJob { job }.into())
    }

    /// Cancels every active job whose frontier is `node` or lies below it.
    pub fn cancel_jobs_under(&mut self, node: NodeId) -> ForklineResult<Vec<JobId>> {
        let doomed: Vec<JobId> = {
            let tree = self.tree.read()?;
            tree.node(node)?;
            let mut doomed = Vec::new();
            for active in &self.active {
                let frontier = active.job.frontier;
                // A frontier pruned earlier is cancelled at the next sync.
                if frontier == node || matches!(tree.is_ancestor(node, frontier), Ok(true)) {
                    doomed.push(active.job.id);
                }
            }
            doomed
        };
        for &id in &doomed {
            self.cancel(id)?;
        }
        Ok(doomed)
    }

    /// Cancels every active job.
    pub fn retire_all(&mut self) {
        for active in &mut self.active {
            active.job.finish(JobStatus::Cancelled);
        }
        self.retire_terminal();
    }

    /// Currently active jobs.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> + '_ {
        self.active.iter().map(|a| &a.job)
    }

    /// Number of active jobs.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Returns true while any job is active.
    #[must_use]
    pub fn has_active_jobs(&self) -> bool {
        !self.active.is_empty()
    }

    /// Looks up a job, active or finished.
    #[must_use]
    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs()
            .find(|j| j.id == id)
            .or_else(|| self.finished.iter().find(|j| j.id == id))
    }

    /// The active job whose frontier is `node`.
    #[must_use]
    pub fn job_for_node(&self, node: NodeId) -> Option<&Job> {
        self.jobs().find(|j| j.frontier == node)
    }

    /// Jobs that reached a terminal status, oldest first.
    #[must_use]
    pub fn finished_jobs(&self) -> &[Job] {
        &self.finished
    }

    /// Removes and returns the finished jobs.
    pub fn take_finished(&mut self) -> Vec<Job> {
        std::mem::take(&mut self.finished)
    }

    fn active_index(&self, job: JobId) -> Result<usize, CrunchError> {
        match self.active.iter().position(|a| a.job.id == job) {
            Some(index) => Ok(index),
            None if self.finished.iter().any(|j| j.id == job) => Err(CrunchError::JobNotActive { job }),
            None => Err(CrunchError::UnknownJob { job }),
        }
    }

    fn retire_terminal(&mut self) {
        let mut i = 0;
        while i < self.active.len() {
            if !self.active[i].job.status.is_terminal() {
                i += 1;
                continue;
            }
            let active = self.active.remove(i);
            active.cruncher.retire();
            let job = active.job;
            match &job.status {
                JobStatus::Failed { failure } => {
                    warn!(job = %job.id, frontier = %job.frontier, failure = %failure, "crunching job failed");
                }
                status => {
                    info!(job = %job.id, frontier = %job.frontier, steps = job.steps_harvested, status = ?status, "crunching job finished");
                }
            }
            self.finished.push(job);
        }
    }
}

impl<S: State> Drop for CrunchingManager<S> {
    fn drop(&mut self) {
        for active in &self.active {
            active.cruncher.retire();
        }
    }
}

impl<S: State> std::fmt::Debug for CrunchingManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrunchingManager")
            .field("active", &self.active.len())
            .field("finished", &self.finished.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builds the seed for a cruncher starting at `node`.
fn seed_for<S: State>(
    tree: &Tree<S>,
    node: NodeId,
    profile: &StepProfile<S>,
    target: CrunchTarget,
) -> Result<CrunchSeed<S>, TreeError> {
    let start = Arc::clone(tree.node(node)?.state());
    let ancestors = if profile.function.needs_history() {
        tree.history_before(node)?
    } else {
        Vec::new()
    };
    Ok(CrunchSeed {
        start,
        ancestors,
        profile: profile.clone(),
        target,
    })
}

/// Appends one job's harvest and settles its status. Returns nodes added.
fn apply_harvest<S: State>(
    tree: &mut Tree<S>,
    factory: &dyn CruncherFactory<S>,
    active: &mut ActiveJob<S>,
    harvest: Harvest<S>,
) -> usize {
    let mut added = 0;

    for state in harvest.states {
        if active.target_reached(tree) {
            active.job.finish(JobStatus::Completed);
            return added;
        }
        let is_end = state.is_end();
        match tree.add_child(active.job.frontier, state) {
            Ok(id) => {
                active.job.frontier = id;
                active.job.steps_harvested += 1;
                added += 1;
            }
            Err(TreeError::UnknownNode { node }) => {
                debug!(job = %active.job.id, node = %node, "frontier vanished; cancelling job");
                active.job.finish(JobStatus::Cancelled);
                return added;
            }
            Err(err) => {
                active.job.finish(JobStatus::Failed {
                    failure: JobFailure::Tree(err),
                });
                return added;
            }
        }
        if is_end {
            active.job.finish(JobStatus::Completed);
            return added;
        }
    }

    if active.target_reached(tree) {
        active.job.finish(JobStatus::Completed);
        return added;
    }

    match harvest.outcome {
        Some(CrunchOutcome::ReachedEnd) => active.job.finish(JobStatus::Completed),
        Some(CrunchOutcome::Failed(err)) => active.job.finish(JobStatus::Failed {
            failure: JobFailure::Step(err),
        }),
        Some(CrunchOutcome::Retired) => active.job.finish(JobStatus::Cancelled),
        Some(CrunchOutcome::ReachedTarget) => {
            // The cruncher met a target that has since been raised.
            let target = active.job.target.remaining_after(active.job.steps_harvested);
            let respawned = seed_for(tree, active.job.frontier, &active.profile, target)
                .map_err(Into::into)
                .and_then(|seed| factory.spawn(seed));
            match respawned {
                Ok(cruncher) => {
                    info!(job = %active.job.id, frontier = %active.job.frontier, target = %active.job.target, "respawned cruncher");
                    active.cruncher = cruncher;
                    active.spawn_offset = active.job.steps_harvested;
                }
                Err(err) => {
                    warn!(job = %active.job.id, error = %err, "could not respawn cruncher");
                    active.job.finish(JobStatus::Failed {
                        failure: JobFailure::CruncherDied,
                    });
                }
            }
        }
        None if !active.cruncher.is_alive() => active.job.finish(JobStatus::Failed {
            failure: JobFailure::CruncherDied,
        }),
        None => {}
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

    use tracing_test::traced_test;

    use crate::clock::Clock;
    use crate::error::{ForklineError, StepError};
    use crate::step::{StepArgs, StepFunction};

    #[derive(Debug, Clone)]
    struct Tick(u32);

    impl State for Tick {
        fn clock(&self) -> Clock {
            Clock::from(self.0)
        }
    }

    fn increment() -> StepProfile<Tick> {
        StepProfile::bare(StepFunction::simple("increment", |s: &Tick, _: &StepArgs| Ok(Tick(s.0 + 1))))
    }

    /// A cruncher replaying canned harvests, then going quiet or dying.
    struct Scripted {
        script: VecDeque<Harvest<Tick>>,
        dies: bool,
        delivered: Arc<AtomicUsize>,
    }

    impl Cruncher<Tick> for Scripted {
        fn retrieve_available(&mut self) -> Harvest<Tick> {
            match self.script.pop_front() {
                Some(harvest) => {
                    self.delivered.fetch_add(1, Ordering::SeqCst);
                    harvest
                }
                None => Harvest::empty(),
            }
        }

        fn is_alive(&self) -> bool {
            !(self.dies && self.script.is_empty())
        }

        fn retire(&self) {}

        fn update_target(&self, _target: CrunchTarget) {}
    }

    /// Spawns scripted crunchers; each spawn consumes the next script.
    struct ScriptedFactory {
        scripts: Mutex<VecDeque<(Vec<Harvest<Tick>>, bool)>>,
        seeds: Mutex<Vec<(u32, CrunchTarget)>>,
        /// Scripted harvests handed out so far, across every spawn.
        delivered: Arc<AtomicUsize>,
    }

    impl ScriptedFactory {
        fn new(scripts: Vec<(Vec<Harvest<Tick>>, bool)>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                seeds: Mutex::new(Vec::new()),
                delivered: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    impl CruncherFactory<Tick> for ScriptedFactory {
        fn spawn(&self, seed: CrunchSeed<Tick>) -> ForklineResult<Box<dyn Cruncher<Tick>>> {
            self.seeds.lock().unwrap().push((seed.start.0, seed.target));
            let (script, dies) = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| CrunchError::SpawnFailed {
                    reason: "script exhausted".to_string(),
                })?;
            Ok(Box::new(Scripted {
                script: script.into(),
                dies,
                delivered: Arc::clone(&self.delivered),
            }))
        }
    }

    fn states(clocks: &[u32]) -> Harvest<Tick> {
        Harvest {
            states: clocks.iter().map(|&c| Arc::new(Tick(c))).collect(),
            outcome: None,
        }
    }

    fn with_outcome(mut harvest: Harvest<Tick>, outcome: CrunchOutcome) -> Harvest<Tick> {
        harvest.outcome = Some(outcome);
        harvest
    }

    fn rooted() -> (TreeLock<Tick>, NodeId) {
        let lock = TreeLock::default();
        let root = lock.write().unwrap().root_this_state(Tick(0)).unwrap();
        (lock, root)
    }

    fn drain(manager: &mut CrunchingManager<Tick>) -> usize {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut total = 0;
        while manager.has_active_jobs() {
            total += manager.sync_crunchers().unwrap();
            assert!(Instant::now() < deadline, "jobs never finished");
            thread::sleep(Duration::from_millis(1));
        }
        total
    }

    #[test]
    fn threaded_job_reaches_clock_target() {
        let (tree, root) = rooted();
        let mut manager = CrunchingManager::new(tree.clone(), CrunchingConfig::default());
        let job = manager
            .begin_crunching(root, CrunchTarget::Clock(Clock::new(4.0)), increment())
            .unwrap();

        assert_eq!(drain(&mut manager), 4);
        assert_eq!(manager.sync_crunchers().unwrap(), 0);

        let tree = tree.read().unwrap();
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.all_possible_paths().len(), 1);
        let finished = manager.job(job).unwrap();
        assert_eq!(finished.status, JobStatus::Completed);
        assert_eq!(finished.steps_harvested, 4);
        assert!(finished.finished_at.is_some());
    }

    #[test]
    fn double_begin_is_rejected() {
        let (tree, root) = rooted();
        let factory = ScriptedFactory::new(vec![(vec![], false)]);
        let mut manager = CrunchingManager::with_factory(tree, CrunchingConfig::default(), factory);
        let first = manager.begin_crunching(root, CrunchTarget::Forever, increment()).unwrap();

        let err = manager.begin_crunching(root, CrunchTarget::Forever, increment()).unwrap_err();
        assert!(matches!(
            err,
            ForklineError::Crunch(CrunchError::NodeAlreadyCrunched { job, .. }) if job == first
        ));
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn job_limit_is_enforced() {
        let (tree, root) = rooted();
        let other = tree.write().unwrap().root_this_state(Tick(0)).unwrap();
        let config = CrunchingConfig {
            max_active_jobs: 1,
            ..CrunchingConfig::default()
        };
        let factory = ScriptedFactory::new(vec![(vec![], false), (vec![], false)]);
        let mut manager = CrunchingManager::with_factory(tree, config, factory);
        manager.begin_crunching(root, CrunchTarget::Forever, increment()).unwrap();

        let err = manager.begin_crunching(other, CrunchTarget::Forever, increment()).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn step_failure_keeps_earlier_states() {
        let (tree, root) = rooted();
        let failure = StepError::failed("increment", "second step");
        let factory = ScriptedFactory::new(vec![(
            vec![with_outcome(states(&[1]), CrunchOutcome::Failed(failure.clone()))],
            false,
        )]);
        let mut manager = CrunchingManager::with_factory(tree.clone(), CrunchingConfig::default(), factory);
        let job = manager.begin_crunching(root, CrunchTarget::Steps(4), increment()).unwrap();

        assert_eq!(manager.sync_crunchers().unwrap(), 1);
        assert!(!manager.has_active_jobs());
        assert_eq!(
            manager.job(job).unwrap().status,
            JobStatus::Failed {
                failure: JobFailure::Step(failure)
            }
        );
        assert_eq!(tree.read().unwrap().len(), 2);
    }

    #[test]
    fn clock_regression_fails_job_and_keeps_earlier_states() {
        let (tree, root) = rooted();
        let factory = ScriptedFactory::new(vec![(vec![states(&[1, 2, 1, 3])], false)]);
        let mut manager = CrunchingManager::with_factory(tree.clone(), CrunchingConfig::default(), factory);
        let job = manager.begin_crunching(root, CrunchTarget::Forever, increment()).unwrap();

        assert_eq!(manager.sync_crunchers().unwrap(), 2);
        assert!(!manager.has_active_jobs());

        let record = manager.job(job).unwrap();
        assert_eq!(record.steps_harvested, 2);
        let JobStatus::Failed {
            failure: JobFailure::Tree(TreeError::ClockRegression {
                parent,
                parent_clock,
                child_clock,
            }),
        } = &record.status
        else {
            panic!("expected a clock regression, got {:?}", record.status);
        };
        assert_eq!(*parent, record.frontier);
        assert_eq!(*parent_clock, Clock::from(2u32));
        assert_eq!(*child_clock, Clock::from(1u32));

        let tree = tree.read().unwrap();
        assert_eq!(tree.len(), 3);
        let clocks: Vec<u32> = tree.all_possible_paths()[0]
            .iter()
            .map(|id| tree.node(id).unwrap().state().0)
            .collect();
        assert_eq!(clocks, vec![0, 1, 2]);
    }

    #[test]
    fn poisoned_tree_leaves_output_undrained() {
        let (tree, root) = rooted();
        let factory = ScriptedFactory::new(vec![(vec![states(&[1, 2])], false)]);
        let delivered = Arc::clone(&factory.delivered);
        let mut manager = CrunchingManager::with_factory(tree.clone(), CrunchingConfig::default(), factory);
        let job = manager.begin_crunching(root, CrunchTarget::Forever, increment()).unwrap();

        let poisoner = tree.clone();
        let outcome = thread::spawn(move || {
            let _guard = poisoner.write().unwrap();
            panic!("writer crashed while holding the tree");
        })
        .join();
        assert!(outcome.is_err());

        let err = manager.sync_crunchers().unwrap_err();
        assert!(matches!(err, ForklineError::LockPoisoned { .. }));
        assert_eq!(delivered.load(Ordering::SeqCst), 0);

        let record = manager.job(job).unwrap();
        assert_eq!(record.status, JobStatus::Running);
        assert_eq!(record.frontier, root);
        assert_eq!(record.steps_harvested, 0);
    }

    #[test]
    fn silent_death_is_reported() {
        let (tree, root) = rooted();
        let factory = ScriptedFactory::new(vec![(vec![states(&[1, 2])], true)]);
        let mut manager = CrunchingManager::with_factory(tree, CrunchingConfig::default(), factory);
        let job = manager.begin_crunching(root, CrunchTarget::Forever, increment()).unwrap();

        assert_eq!(manager.sync_crunchers().unwrap(), 2);
        assert_eq!(manager.sync_crunchers().unwrap(), 0);
        assert_eq!(
            manager.job(job).unwrap().status,
            JobStatus::Failed {
                failure: JobFailure::CruncherDied
            }
        );
    }

    #[test]
    fn overshoot_is_discarded_at_target() {
        let (tree, root) = rooted();
        let factory = ScriptedFactory::new(vec![(vec![states(&[1, 2, 3, 4, 5])], false)]);
        let mut manager = CrunchingManager::with_factory(tree.clone(), CrunchingConfig::default(), factory);
        manager.begin_crunching(root, CrunchTarget::Steps(3), increment()).unwrap();

        assert_eq!(manager.sync_crunchers().unwrap(), 3);
        assert!(!manager.has_active_jobs());
        assert_eq!(tree.read().unwrap().len(), 4);
    }

    #[test]
    fn stale_target_respawns_from_frontier() {
        let (tree, root) = rooted();
        let factory = ScriptedFactory::new(vec![
            (vec![with_outcome(states(&[1, 2]), CrunchOutcome::ReachedTarget)], false),
            (vec![with_outcome(states(&[3, 4]), CrunchOutcome::ReachedTarget)], false),
        ]);
        let mut manager =
            CrunchingManager::with_factory(tree.clone(), CrunchingConfig::default(), factory.clone());
        let job = manager.begin_crunching(root, CrunchTarget::Steps(2), increment()).unwrap();
        manager.update_target(job, CrunchTarget::Steps(4)).unwrap();

        assert_eq!(manager.sync_crunchers().unwrap(), 2);
        assert!(manager.has_active_jobs());
        assert_eq!(manager.sync_crunchers().unwrap(), 2);
        assert_eq!(manager.job(job).unwrap().status, JobStatus::Completed);

        let seeds = factory.seeds.lock().unwrap().clone();
        assert_eq!(seeds, vec![(0, CrunchTarget::Steps(2)), (2, CrunchTarget::Steps(2))]);
        assert_eq!(tree.read().unwrap().len(), 5);
    }

    #[test]
    fn lowering_target_below_frontier_completes() {
        let (tree, root) = rooted();
        let factory = ScriptedFactory::new(vec![(vec![states(&[1, 2, 3])], false)]);
        let mut manager = CrunchingManager::with_factory(tree, CrunchingConfig::default(), factory);
        let job = manager.begin_crunching(root, CrunchTarget::Forever, increment()).unwrap();
        manager.sync_crunchers().unwrap();

        manager.update_target(job, CrunchTarget::Clock(Clock::new(2.0))).unwrap();
        assert_eq!(manager.job(job).unwrap().status, JobStatus::Completed);
        assert!(matches!(
            manager.update_target(job, CrunchTarget::Forever).unwrap_err(),
            ForklineError::Crunch(CrunchError::JobNotActive { .. })
        ));
    }

    #[test]
    fn cancel_moves_job_to_finished() {
        let (tree, root) = rooted();
        let factory = ScriptedFactory::new(vec![(vec![Harvest::empty(), states(&[1])], false)]);
        let mut manager = CrunchingManager::with_factory(tree.clone(), CrunchingConfig::default(), factory);
        let job = manager.begin_crunching(root, CrunchTarget::Forever, increment()).unwrap();

        let record = manager.cancel(job).unwrap();
        assert_eq!(record.status, JobStatus::Cancelled);
        assert_eq!(manager.sync_crunchers().unwrap(), 0);
        assert_eq!(tree.read().unwrap().len(), 1);
        assert_eq!(manager.take_finished().len(), 1);
        assert!(matches!(
            manager.cancel(JobId::new()).unwrap_err(),
            ForklineError::Crunch(CrunchError::UnknownJob { .. })
        ));
    }

    #[test]
    fn pruned_frontier_cancels_job() {
        let (tree, root) = rooted();
        let factory = ScriptedFactory::new(vec![(vec![states(&[1]), states(&[2])], false)]);
        let mut manager = CrunchingManager::with_factory(tree.clone(), CrunchingConfig::default(), factory);
        let job = manager.begin_crunching(root, CrunchTarget::Forever, increment()).unwrap();
        manager.sync_crunchers().unwrap();

        let frontier = manager.job(job).unwrap().frontier;
        tree.write().unwrap().prune(frontier).unwrap();

        assert_eq!(manager.sync_crunchers().unwrap(), 0);
        assert_eq!(manager.job(job).unwrap().status, JobStatus::Cancelled);
    }

    #[test]
    fn cancel_jobs_under_subtree() {
        let (tree, root) = rooted();
        let factory = ScriptedFactory::new(vec![(vec![states(&[1])], false), (vec![], false)]);
        let mut manager = CrunchingManager::with_factory(tree.clone(), CrunchingConfig::default(), factory);
        let deep = manager.begin_crunching(root, CrunchTarget::Forever, increment()).unwrap();
        manager.sync_crunchers().unwrap();
        let other_root = tree.write().unwrap().root_this_state(Tick(0)).unwrap();
        let elsewhere = manager.begin_crunching(other_root, CrunchTarget::Forever, increment()).unwrap();

        assert_eq!(manager.cancel_jobs_under(root).unwrap(), vec![deep]);
        assert_eq!(manager.jobs().map(|j| j.id).collect::<Vec<_>>(), vec![elsewhere]);
    }

    #[traced_test]
    #[test]
    fn logs_job_lifecycle() {
        let (tree, root) = rooted();
        let factory = ScriptedFactory::new(vec![(vec![with_outcome(states(&[1]), CrunchOutcome::ReachedEnd)], false)]);
        let mut manager = CrunchingManager::with_factory(tree, CrunchingConfig::default(), factory);
        manager.begin_crunching(root, CrunchTarget::Forever, increment()).unwrap();
        manager.sync_crunchers().unwrap();

        assert!(logs_contain("began crunching"));
        assert!(logs_contain("crunching job finished"));
    }
}
