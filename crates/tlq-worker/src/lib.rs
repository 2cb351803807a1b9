//! Timelapse conversion worker.
//!
//! Wires the frame pipeline and encoder driver into a [`tlq_queue::JobRunner`],
//! plus rename-only jobs, job files and environment configuration.

pub mod config;
pub mod convert;
pub mod error;
pub mod jobfile;
pub mod rename;

pub use config::WorkerConfig;
pub use convert::{build_pipeline, ConvertRunner, EncoderCommand};
pub use error::{WorkerError, WorkerResult};
pub use jobfile::{load_job, JobFile, PreparedJob};
pub use rename::{rename_sequence, target_name};
