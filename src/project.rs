//! The project facade.
//!
//! A [`Project`] binds a simpack to a tree and a crunching manager. It is the
//! entry point most callers need: synchronous simulation, background
//! crunching and tree maintenance all go through it.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::ProfileCache;
use crate::config::ProjectConfig;
use crate::crunching::{CrunchTarget, CruncherFactory, CrunchingManager, Job, JobId};
use crate::error::ForklineResult;
use crate::simpack::Simpack;
use crate::simulate::{self, SimulationIter};
use crate::state::State;
use crate::step::{Determinism, StepArgs, StepProfile, Stepper};
use crate::tree::{NodeId, TreeLock};

type StateOf<P> = <P as Simpack>::State;

/// One simulation history and the machinery that grows it.
///
/// # Examples
///
/// ```
/// use forkline::{Clock, CrunchTarget, Project, Simpack, State, StepFunction};
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
///         StepFunction::simple("tick", |s: &Tick, _| Ok(Tick(s.0 + 1)))
///     }
/// }
///
/// let mut project = Project::new(Ticker);
/// let root = project.root_this_state(Tick(0)).unwrap();
/// let last = project.simulate_node(root, 3).unwrap();
/// assert_eq!(project.tree().read().unwrap().node(last).unwrap().state().0, 3);
///
/// project.begin_crunching(last, CrunchTarget::Steps(2)).unwrap();
/// while project.crunching_manager().has_active_jobs() {
///     project.sync_crunchers().unwrap();
/// }
/// assert_eq!(project.tree().read().unwrap().len(), 6);
/// ```
pub struct Project<P: Simpack> {
    simpack: Arc<P>,
    tree: TreeLock<StateOf<P>>,
    crunching_manager: CrunchingManager<StateOf<P>>,
    default_profile: StepProfile<StateOf<P>>,
    determinism_cache: ProfileCache<Determinism>,
    config: ProjectConfig,
}

impl<P: Simpack> Project<P> {
    /// Creates a project with the default configuration and thread crunchers.
    #[must_use]
    pub fn new(simpack: P) -> Self {
        let config = ProjectConfig::default();
        let tree = TreeLock::default();
        let crunching_manager = CrunchingManager::new(tree.clone(), config.crunching.clone());
        Self::assemble(simpack, config, tree, crunching_manager)
    }

    /// Creates a project with a validated configuration.
    pub fn with_config(simpack: P, config: ProjectConfig) -> ForklineResult<Self> {
        config.validate()?;
        let tree = TreeLock::default();
        let crunching_manager = CrunchingManager::new(tree.clone(), config.crunching.clone());
        Ok(Self::assemble(simpack, config, tree, crunching_manager))
    }

    /// Creates a project whose crunchers come from `factory`.
    pub fn with_factory(
        simpack: P,
        config: ProjectConfig,
        factory: Arc<dyn CruncherFactory<StateOf<P>>>,
    ) -> ForklineResult<Self> {
        config.validate()?;
        let tree = TreeLock::default();
        let crunching_manager = CrunchingManager::with_factory(tree.clone(), config.crunching.clone(), factory);
        Ok(Self::assemble(simpack, config, tree, crunching_manager))
    }

    fn assemble(
        simpack: P,
        config: ProjectConfig,
        tree: TreeLock<StateOf<P>>,
        crunching_manager: CrunchingManager<StateOf<P>>,
    ) -> Self {
        let default_profile = simpack.build_step_profile(StepArgs::new());
        info!(simpack = simpack.name(), step = default_profile.function.name(), "created project");
        Self {
            simpack: Arc::new(simpack),
            tree,
            crunching_manager,
            default_profile,
            determinism_cache: ProfileCache::new(),
            config,
        }
    }

    /// The simpack this project runs.
    #[must_use]
    pub fn simpack(&self) -> &Arc<P> {
        &self.simpack
    }

    /// Shared handle to the history tree.
    #[must_use]
    pub fn tree(&self) -> &TreeLock<StateOf<P>> {
        &self.tree
    }

    /// The crunching manager.
    #[must_use]
    pub fn crunching_manager(&self) -> &CrunchingManager<StateOf<P>> {
        &self.crunching_manager
    }

    /// Mutable access to the crunching manager.
    pub fn crunching_manager_mut(&mut self) -> &mut CrunchingManager<StateOf<P>> {
        &mut self.crunching_manager
    }

    /// The configuration this project was built with.
    #[must_use]
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Profile of the simpack's default step function, without arguments.
    #[must_use]
    pub fn default_profile(&self) -> &StepProfile<StateOf<P>> {
        &self.default_profile
    }

    /// Builds a profile for the default step function with `args`.
    #[must_use]
    pub fn build_step_profile(&self, args: StepArgs) -> StepProfile<StateOf<P>> {
        self.simpack.build_step_profile(args)
    }

    /// Whether `profile` reproduces its output, as the simpack reports it.
    /// Answers are cached per profile key.
    pub fn determinism(&self, profile: &StepProfile<StateOf<P>>) -> ForklineResult<Determinism> {
        self.determinism_cache
            .get_or_insert_with(profile.key(), || self.simpack.determinism_function(profile))
    }

    /// The cache behind [`Project::determinism`].
    #[must_use]
    pub fn determinism_cache(&self) -> &ProfileCache<Determinism> {
        &self.determinism_cache
    }

    /// Records `state` as a new root.
    pub fn root_this_state(&self, state: impl Into<Arc<StateOf<P>>>) -> ForklineResult<NodeId> {
        let node = self.tree.write()?.root_this_state(state)?;
        debug!(node = %node, "rooted state");
        Ok(node)
    }

    /// Starts crunching from `node` with the default step profile.
    pub fn begin_crunching(&mut self, node: NodeId, target: CrunchTarget) -> ForklineResult<JobId> {
        let profile = self.default_profile.clone();
        self.crunching_manager.begin_crunching(node, target, profile)
    }

    /// Starts crunching from `node` with an explicit step profile.
    pub fn begin_crunching_with_profile(
        &mut self,
        node: NodeId,
        target: CrunchTarget,
        profile: StepProfile<StateOf<P>>,
    ) -> ForklineResult<JobId> {
        self.crunching_manager.begin_crunching(node, target, profile)
    }

    /// Harvests crunched states into the tree. Returns the number of nodes added.
    pub fn sync_crunchers(&mut self) -> ForklineResult<usize> {
        self.crunching_manager.sync_crunchers()
    }

    /// Cancels a crunching job.
    pub fn cancel_job(&mut self, job: JobId) -> ForklineResult<Job> {
        self.crunching_manager.cancel(job)
    }

    /// Advances `state` by `steps` with the default profile; returns the last state.
    pub fn simulate(&self, state: impl Into<Arc<StateOf<P>>>, steps: u64) -> ForklineResult<Arc<StateOf<P>>> {
        Ok(simulate::simulate(&self.default_profile, state, steps)?)
    }

    /// The chain from `state` onward, start included.
    pub fn list_simulate(
        &self,
        state: impl Into<Arc<StateOf<P>>>,
        steps: u64,
    ) -> ForklineResult<Vec<Arc<StateOf<P>>>> {
        Ok(simulate::list_simulate(&self.default_profile, state, steps)?)
    }

    /// Lazy form of [`Project::list_simulate`].
    pub fn iter_simulate(&self, state: impl Into<Arc<StateOf<P>>>, steps: u64) -> SimulationIter<StateOf<P>> {
        simulate::iter_simulate(&self.default_profile, state, steps)
    }

    /// Advances from `node` on the calling thread and records every state as
    /// a chain below it. Returns the last recorded node.
    ///
    /// Stops early at an end state. If a step fails nothing is recorded.
    pub fn simulate_node(&self, node: NodeId, steps: u64) -> ForklineResult<NodeId> {
        let profile = self.default_profile.clone();
        let (start, ancestors) = {
            let tree = self.tree.read()?;
            let start = Arc::clone(tree.node(node)?.state());
            let ancestors = if profile.function.needs_history() {
                tree.history_before(node)?
            } else {
                Vec::new()
            };
            (start, ancestors)
        };

        let mut stepper = Stepper::with_ancestors(profile, ancestors, start);
        let mut produced = Vec::new();
        for _ in 0..steps {
            if stepper.current().is_end() {
                break;
            }
            produced.push(stepper.step()?);
        }

        let mut tree = self.tree.write()?;
        let mut cursor = node;
        for state in produced {
            cursor = tree.add_child(cursor, state)?;
        }
        debug!(from = %node, to = %cursor, "simulated node");
        Ok(cursor)
    }

    /// Makes sure the default path through `node` extends at least
    /// `clock_buffer` past `node`'s clock.
    ///
    /// Starts a job on the path's leaf, or raises the target of the job
    /// already extending it. Returns that job, or `None` if the path is
    /// already long enough or ends in an end state.
    pub fn ensure_buffer(&mut self, node: NodeId, clock_buffer: f64) -> ForklineResult<Option<JobId>> {
        let (leaf, wanted, satisfied) = {
            let tree = self.tree.read()?;
            let wanted = tree.node(node)?.clock().advanced_by(clock_buffer);
            let path = tree.default_path_through(node)?;
            let leaf = path.last().unwrap_or(node);
            let leaf_node = tree.node(leaf)?;
            (leaf, wanted, leaf_node.clock() >= wanted || leaf_node.state().is_end())
        };
        if satisfied {
            return Ok(None);
        }

        let target = CrunchTarget::Clock(wanted);
        if let Some(job) = self.crunching_manager.job_for_node(leaf) {
            let id = job.id;
            let covered = match job.target {
                CrunchTarget::Forever => true,
                CrunchTarget::Clock(clock) => clock >= wanted,
                CrunchTarget::Steps(_) => false,
            };
            if !covered {
                self.crunching_manager.update_target(id, target)?;
            }
            return Ok(Some(id));
        }
        self.begin_crunching(leaf, target).map(Some)
    }

    /// Removes `node` and its subtree, cancelling jobs that were extending it.
    /// Returns the number of nodes removed.
    pub fn prune(&mut self, node: NodeId) -> ForklineResult<usize> {
        let cancelled = self.crunching_manager.cancel_jobs_under(node)?;
        let removed = self.tree.write()?.prune(node)?;
        info!(node = %node, removed = removed, cancelled = cancelled.len(), "pruned history");
        Ok(removed)
    }
}

impl<P: Simpack> fmt::Debug for Project<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("simpack", &self.simpack.name())
            .field("default_profile", &self.default_profile)
            .field("crunching_manager", &self.crunching_manager)
            .finish_non_exhaustive()
    }
}
