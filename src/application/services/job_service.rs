use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    core::jobs::{JobHealth, JobInstanceTracker, JobOperator, JobState},
    domain::{
        entities::{JobDefinition, JobId, JobInstance, JobType},
        repositories::{JobRepository, MeasureProvider},
    },
    error::{AppError, JobErrorCode, Result},
};

/// Lifecycle action requested on an existing job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobAction {
    Start,
    Stop,
}

impl FromStr for JobAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(JobAction::Start),
            "stop" => Ok(JobAction::Stop),
            _ => Err(AppError::BadRequest(JobErrorCode::NoSuchJobAction)),
        }
    }
}

impl JobAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobAction::Start => "start",
            JobAction::Stop => "stop",
        }
    }
}

/// A job together with its derived trigger state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub job: JobDefinition,
    pub state: Option<JobState>,
}

/// Resolves jobs by id or name and drives them through the operator
pub struct JobService {
    operator: Arc<JobOperator>,
    jobs: Arc<dyn JobRepository>,
    measures: Arc<dyn MeasureProvider>,
    tracker: Arc<JobInstanceTracker>,
}

impl JobService {
    pub fn new(
        operator: Arc<JobOperator>,
        jobs: Arc<dyn JobRepository>,
        measures: Arc<dyn MeasureProvider>,
        tracker: Arc<JobInstanceTracker>,
    ) -> Self {
        Self {
            operator,
            jobs,
            measures,
            tracker,
        }
    }

    pub async fn get_alive_jobs(&self, job_type: Option<JobType>) -> Result<Vec<JobView>> {
        let jobs = self.jobs.find_alive(job_type).await?;
        let mut views = Vec::with_capacity(jobs.len());
        for job in jobs {
            let state = self.operator.get_state(&job, "query").await?;
            views.push(JobView { job, state });
        }
        Ok(views)
    }

    pub async fn add_job(&self, job: JobDefinition) -> Result<JobDefinition> {
        let measure = self
            .measures
            .find_measure(job.measure_id)
            .await?
            .ok_or_else(|| {
                warn!(measure_id = %job.measure_id, "The measure id does not exist.");
                AppError::NotFound(JobErrorCode::MeasureIdDoesNotExist)
            })?;
        self.operator.add(job, &measure).await
    }

    pub async fn get_job_config(&self, job_id: JobId) -> Result<JobDefinition> {
        self.find_alive(job_id).await
    }

    pub async fn on_action(&self, job_id: JobId, action: &str) -> Result<JobView> {
        let action = JobAction::from_str(action)?;
        let job = self.find_alive(job_id).await?;
        let job = match action {
            JobAction::Start => {
                self.operator.start(&job).await?;
                job
            }
            JobAction::Stop => self.operator.stop(&job).await?,
        };
        let state = self.operator.get_state(&job, action.as_str()).await?;
        info!(%job_id, action = action.as_str(), "Applied job action");
        Ok(JobView { job, state })
    }

    pub async fn delete_job_by_id(&self, job_id: JobId) -> Result<()> {
        let job = self.find_alive(job_id).await?;
        self.operator.delete(&job).await?;
        Ok(())
    }

    /// Delete every alive job carrying `job_name`
    pub async fn delete_job_by_name(&self, job_name: &str) -> Result<()> {
        let jobs = self.jobs.find_alive_by_name(job_name).await?;
        if jobs.is_empty() {
            warn!(job_name, "There is no job with this name.");
            return Err(AppError::NotFound(JobErrorCode::JobNameDoesNotExist));
        }
        for job in &jobs {
            self.operator.delete(job).await?;
        }
        Ok(())
    }

    /// Instances of a job, newest first. Instances of soft-deleted jobs
    /// stay readable.
    pub async fn find_instances_of_job(
        &self,
        job_id: JobId,
        page: usize,
        size: usize,
    ) -> Result<Vec<JobInstance>> {
        if self.jobs.find_by_id(job_id).await?.is_none() {
            return Err(AppError::NotFound(JobErrorCode::JobIdDoesNotExist));
        }
        self.tracker.instances_of_job(job_id, page, size).await
    }

    pub async fn get_health_info(&self) -> Result<JobHealth> {
        let mut health = JobHealth::default();
        for job in self.jobs.find_alive(None).await? {
            health = self.operator.get_health(health, &job).await?;
        }
        Ok(health)
    }

    pub async fn trigger_once(&self, job_id: JobId) -> Result<()> {
        let job = self.find_alive(job_id).await?;
        self.operator.one(&job).await
    }

    async fn find_alive(&self, job_id: JobId) -> Result<JobDefinition> {
        self.jobs.find_alive_by_id(job_id).await?.ok_or_else(|| {
            warn!(%job_id, "The job id does not exist.");
            AppError::NotFound(JobErrorCode::JobIdDoesNotExist)
        })
    }
}
