//! In-memory, single-flight job scheduler.
//!
//! This crate provides:
//! - A scheduler actor that runs queued jobs one at a time, in FIFO order
//! - A cloneable request/reply handle for submitting, canceling and
//!   removing jobs and for taking queue snapshots
//! - The `JobRunner` trait the scheduler hands each job to

pub mod error;
pub mod runner;
pub mod scheduler;

pub use error::{QueueError, QueueResult};
pub use runner::{JobRunner, ProgressReporter, RunContext};
pub use scheduler::{JobScheduler, SchedulerHandle};
