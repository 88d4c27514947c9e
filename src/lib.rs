//! # Forkline - Branching Simulation Histories
//!
//! Forkline records every state a simulation produces in a branching history
//! tree, and can grow that tree in the background while the caller keeps
//! reading it.
//!
//! ## Core Concepts
//!
//! - **Simpack**: a pluggable simulation, a state type plus step functions
//! - **Tree**: every recorded state, with forks where histories diverge and
//!   blocks compressing long unforked runs
//! - **Cruncher**: a background worker repeatedly applying a step function
//! - **CrunchingManager**: the job table that harvests cruncher output into
//!   the tree
//! - **Project**: the facade binding a simpack to a tree and a manager
//!
//! ## Usage
//!
//! ```rust,ignore
//! use forkline::{CrunchTarget, Project};
//!
//! let mut project = Project::new(MySimpack::default());
//! let root = project.root_this_state(MyState::initial())?;
//!
//! // Grow the history on a background thread
//! project.begin_crunching(root, CrunchTarget::Steps(100))?;
//! while project.crunching_manager().has_active_jobs() {
//!     let added = project.sync_crunchers()?;
//!     // ... render, inspect, fork ...
//! }
//!
//! // Or synchronously, without touching the tree
//! let last = project.simulate(MyState::initial(), 10)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod clock;
pub mod error;
pub mod state;
pub mod step;

// Simpack contract and configuration
pub mod cache;
pub mod config;
pub mod simpack;

// History and crunching
pub mod crunching;
pub mod project;
pub mod simulate;
pub mod tree;

// Re-export primary types at crate root for convenience
pub use cache::ProfileCache;
pub use clock::Clock;
pub use config::{CrunchingConfig, ProjectConfig};
pub use crunching::{
    CrunchOutcome, CrunchSeed, CrunchTarget, Cruncher, CruncherFactory, CrunchingManager, Harvest, Job,
    JobFailure, JobId, JobStatus, ThreadCruncher, ThreadCruncherFactory,
};
pub use error::{CrunchError, ForklineError, ForklineResult, StepError, TreeError, ValidationError};
pub use project::Project;
pub use simpack::Simpack;
pub use simulate::{iter_simulate, list_simulate, simulate, SimulationIter};
pub use state::State;
pub use step::{
    Determinism, History, StepArgs, StepFunction, StepProfile, StepProfileKey, StepShape, Stepper, SEED_ARG,
};
pub use tree::{Block, BlockId, Node, NodeId, Path, Tree, TreeLock, TreeMember, TreeMembers};
