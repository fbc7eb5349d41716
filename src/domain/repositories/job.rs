//! Repository interfaces for measure jobs
//!
//! These are the persistence contracts the job subsystem depends on. Storage
//! mechanics live in `infrastructure::repositories`.

use async_trait::async_trait;

use crate::domain::entities::{
    InstanceId, JobDefinition, JobId, JobInstance, JobType, Measure, MeasureId,
};
use crate::error::Result;

/// Repository interface for job definitions
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert or replace a job definition
    async fn save(&self, job: &JobDefinition) -> Result<JobDefinition>;

    /// Physically remove a job definition. Only used to undo an admission
    /// that never became visible.
    async fn remove(&self, job_id: JobId) -> Result<()>;

    /// Find a job by ID, including soft-deleted ones
    async fn find_by_id(&self, job_id: JobId) -> Result<Option<JobDefinition>>;

    /// Find a job by ID if it is not soft deleted
    async fn find_alive_by_id(&self, job_id: JobId) -> Result<Option<JobDefinition>>;

    /// Find all alive jobs with the given name
    async fn find_alive_by_name(&self, job_name: &str) -> Result<Vec<JobDefinition>>;

    /// Find alive jobs, optionally restricted to one type
    async fn find_alive(&self, job_type: Option<JobType>) -> Result<Vec<JobDefinition>>;

    /// Count alive jobs with the given name
    async fn count_alive_by_name(&self, job_name: &str) -> Result<u64>;
}

/// Repository interface for job instances
#[async_trait]
pub trait JobInstanceRepository: Send + Sync {
    /// Insert or replace an instance
    async fn save(&self, instance: &JobInstance) -> Result<JobInstance>;

    async fn find_by_id(&self, instance_id: InstanceId) -> Result<Option<JobInstance>>;

    /// All instances of a job, newest first
    async fn find_by_job_id(&self, job_id: JobId) -> Result<Vec<JobInstance>>;

    /// One page of a job's instances, newest first
    async fn find_page(&self, job_id: JobId, page: usize, size: usize) -> Result<Vec<JobInstance>>;

    /// Most recent instance of a job
    async fn find_latest(&self, job_id: JobId) -> Result<Option<JobInstance>>;

    /// Instances whose remote session is still active
    async fn find_active(&self) -> Result<Vec<JobInstance>>;
}

/// Resolves measures owned by the measure subsystem
#[async_trait]
pub trait MeasureProvider: Send + Sync {
    async fn find_measure(&self, measure_id: MeasureId) -> Result<Option<Measure>>;
}
