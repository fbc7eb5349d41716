pub mod job_service;

pub use job_service::{JobAction, JobService, JobView};
