//! Core job scheduling logic
//!
//! `scheduler` wraps the trigger engine, `jobs` holds the lifecycle of
//! measure jobs on top of it.

pub mod jobs;
pub mod logging;
pub mod scheduler;

pub use jobs::{JobExecutor, JobHealth, JobOperator, JobState};
pub use scheduler::{InMemoryTriggerEngine, TriggerAdapter, TriggerDispatcher, TriggerEngine};
