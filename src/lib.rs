//! Quality Jobs - lifecycle and scheduling of data-quality measure jobs
//!
//! A job binds a measure to a recurring trigger. Each firing opens an
//! instance that waits for its upstream data through a predicate job before
//! the remote measurement session is launched.

pub mod application;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{JobContext, JobDependencies, JobService};
pub use error::{AppError, JobErrorCode, Result};
