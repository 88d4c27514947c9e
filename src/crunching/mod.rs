//! Background crunching.
//!
//! A [`CrunchingManager`] owns a table of [`Job`]s. Each job drives one
//! [`Cruncher`], which advances a state off the caller's thread and buffers
//! what it produces. [`CrunchingManager::sync_crunchers`] moves buffered
//! states into the tree.

mod cruncher;
mod job;
mod manager;
mod thread;

pub use cruncher::{CrunchOutcome, CrunchSeed, Cruncher, CruncherFactory, Harvest};
pub use job::{CrunchTarget, Job, JobFailure, JobId, JobStatus};
pub use manager::CrunchingManager;
pub use thread::{ThreadCruncher, ThreadCruncherFactory};
