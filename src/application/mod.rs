//! Entry points of the job subsystem

pub mod context;
pub mod services;

pub use context::{JobContext, JobDependencies};
pub use services::{JobAction, JobService, JobView};
