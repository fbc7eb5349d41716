//! In-process repositories for embedding and tests

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::entities::{
    InstanceId, JobDefinition, JobId, JobInstance, JobType, Measure, MeasureId,
};
use crate::domain::repositories::{JobInstanceRepository, JobRepository, MeasureProvider};
use crate::error::Result;

#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<JobId, JobDefinition>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored job, soft-deleted ones included
    pub async fn all(&self) -> Vec<JobDefinition> {
        self.jobs.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn save(&self, job: &JobDefinition) -> Result<JobDefinition> {
        debug!(job_id = %job.id, "Saving job");
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(job.clone())
    }

    async fn remove(&self, job_id: JobId) -> Result<()> {
        self.jobs.write().await.remove(&job_id);
        Ok(())
    }

    async fn find_by_id(&self, job_id: JobId) -> Result<Option<JobDefinition>> {
        Ok(self.jobs.read().await.get(&job_id).cloned())
    }

    async fn find_alive_by_id(&self, job_id: JobId) -> Result<Option<JobDefinition>> {
        Ok(self
            .jobs
            .read()
            .await
            .get(&job_id)
            .filter(|job| job.is_alive())
            .cloned())
    }

    async fn find_alive_by_name(&self, job_name: &str) -> Result<Vec<JobDefinition>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.is_alive() && job.job_name == job_name)
            .cloned()
            .collect())
    }

    async fn find_alive(&self, job_type: Option<JobType>) -> Result<Vec<JobDefinition>> {
        let mut jobs: Vec<JobDefinition> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.is_alive())
            .filter(|job| job_type.map_or(true, |t| job.job_type() == t))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    async fn count_alive_by_name(&self, job_name: &str) -> Result<u64> {
        Ok(self.find_alive_by_name(job_name).await?.len() as u64)
    }
}

#[derive(Default)]
pub struct InMemoryJobInstanceRepository {
    instances: RwLock<HashMap<InstanceId, JobInstance>>,
}

impl InMemoryJobInstanceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobInstanceRepository for InMemoryJobInstanceRepository {
    async fn save(&self, instance: &JobInstance) -> Result<JobInstance> {
        debug!(instance_id = %instance.id, state = %instance.state, "Saving job instance");
        self.instances
            .write()
            .await
            .insert(instance.id, instance.clone());
        Ok(instance.clone())
    }

    async fn find_by_id(&self, instance_id: InstanceId) -> Result<Option<JobInstance>> {
        Ok(self.instances.read().await.get(&instance_id).cloned())
    }

    async fn find_by_job_id(&self, job_id: JobId) -> Result<Vec<JobInstance>> {
        let mut instances: Vec<JobInstance> = self
            .instances
            .read()
            .await
            .values()
            .filter(|instance| instance.job_id == job_id)
            .cloned()
            .collect();
        instances.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(instances)
    }

    async fn find_page(&self, job_id: JobId, page: usize, size: usize) -> Result<Vec<JobInstance>> {
        Ok(self
            .find_by_job_id(job_id)
            .await?
            .into_iter()
            .skip(page.saturating_mul(size))
            .take(size)
            .collect())
    }

    async fn find_latest(&self, job_id: JobId) -> Result<Option<JobInstance>> {
        Ok(self.find_by_job_id(job_id).await?.into_iter().next())
    }

    async fn find_active(&self) -> Result<Vec<JobInstance>> {
        Ok(self
            .instances
            .read()
            .await
            .values()
            .filter(|instance| instance.state.is_active())
            .cloned()
            .collect())
    }
}

/// Measures registered up front, standing in for the measure subsystem
#[derive(Default)]
pub struct InMemoryMeasureProvider {
    measures: RwLock<HashMap<MeasureId, Measure>>,
}

impl InMemoryMeasureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, measure: Measure) {
        self.measures.write().await.insert(measure.id, measure);
    }
}

#[async_trait]
impl MeasureProvider for InMemoryMeasureProvider {
    async fn find_measure(&self, measure_id: MeasureId) -> Result<Option<Measure>> {
        Ok(self
            .measures
            .read()
            .await
            .get(&measure_id)
            .filter(|measure| !measure.deleted)
            .cloned())
    }
}
