//! Measure job lifecycle
//!
//! Admission checks, lifecycle transitions, predicate gating, instance
//! tracking and the execution of fired units.

pub mod executor;
pub mod instances;
pub mod locks;
pub mod operator;
pub mod predicate;
pub mod session;
pub mod unit_of_work;
pub mod validation;

pub use executor::JobExecutor;
pub use instances::{HealthPolicy, JobInstanceTracker, LatestInstanceNotFailed, LatestInstanceSucceeded};
pub use locks::JobLocks;
pub use operator::{JobHealth, JobOperator, JobState};
pub use predicate::PredicateJobManager;
pub use session::{DataReadinessProbe, SessionHandle, SessionLauncher};
pub use unit_of_work::UnitOfWork;
