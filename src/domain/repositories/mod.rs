pub mod job;

pub use job::{JobInstanceRepository, JobRepository, MeasureProvider};
