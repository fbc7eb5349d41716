//! Lifecycle transitions of measure jobs
//!
//! The operator keeps three state machines in step: the trigger registered
//! for a job, the predicate units gating its instances, and the persisted
//! job record. Every transition touching more than one of them runs as a
//! [`UnitOfWork`]; transitions on the same job are serialized by name.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::instances::JobInstanceTracker;
use super::locks::JobLocks;
use super::predicate::PredicateJobManager;
use super::unit_of_work::UnitOfWork;
use super::validation;
use crate::core::scheduler::{TriggerAdapter, TriggerState};
use crate::domain::entities::{JobDefinition, Measure};
use crate::domain::repositories::{JobInstanceRepository, JobRepository};
use crate::error::{AppError, JobErrorCode, Result};

/// Derived, read-only view of a job's trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    pub state: String,
    pub can_start: bool,
    pub can_stop: bool,
    /// Epoch millis, -1 when absent
    pub next_fire_time: i64,
    /// Epoch millis, -1 when absent
    pub previous_fire_time: i64,
}

impl JobState {
    pub fn from_trigger_state(state: TriggerState) -> Self {
        Self {
            state: state.to_string(),
            can_start: state == TriggerState::Paused,
            can_stop: matches!(state, TriggerState::Normal | TriggerState::Blocked),
            next_fire_time: -1,
            previous_fire_time: -1,
        }
    }
}

/// Fleet health counters, recomputed on every read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHealth {
    pub job_count: u64,
    pub healthy_job_count: u64,
}

/// Log and wrap an infrastructure failure; client errors pass through
fn service_error(message: &str, err: AppError) -> AppError {
    if err.is_client_error() {
        return err;
    }
    error!(cause = %err, "{}", message);
    AppError::service(message, err)
}

pub struct JobOperator {
    adapter: TriggerAdapter,
    jobs: Arc<dyn JobRepository>,
    instances: Arc<dyn JobInstanceRepository>,
    predicates: Arc<PredicateJobManager>,
    tracker: Arc<JobInstanceTracker>,
    locks: Arc<JobLocks>,
}

impl JobOperator {
    pub fn new(
        adapter: TriggerAdapter,
        jobs: Arc<dyn JobRepository>,
        instances: Arc<dyn JobInstanceRepository>,
        predicates: Arc<PredicateJobManager>,
        tracker: Arc<JobInstanceTracker>,
        locks: Arc<JobLocks>,
    ) -> Self {
        Self {
            adapter,
            jobs,
            instances,
            predicates,
            tracker,
            locks,
        }
    }

    fn begin(&self, label: &'static str) -> UnitOfWork {
        UnitOfWork::begin(
            label,
            self.adapter.clone(),
            self.jobs.clone(),
            self.instances.clone(),
        )
    }

    /// Admit a job: validate it, give it a scheduler identity, persist it
    /// and register its trigger.
    pub async fn add(&self, mut job: JobDefinition, measure: &Measure) -> Result<JobDefinition> {
        validation::validate(&job, measure)?;
        let _guard = self.locks.acquire(&job.job_name).await;

        if self.jobs.count_alive_by_name(&job.job_name).await? > 0 {
            warn!(job_name = %job.job_name, "Job name already in use.");
            return Err(AppError::BadRequest(JobErrorCode::InvalidJobName));
        }

        let name = format!("{}_{}", job.job_name, Utc::now().timestamp_millis());
        let group = job.job_type().name().to_string();
        if self.adapter.exists(&name, &group).await? {
            warn!("Job({},{}) has already been scheduled.", group, name);
            return Err(AppError::Conflict(JobErrorCode::JobAlreadyScheduled));
        }

        job.trigger_name = Some(name);
        job.trigger_group = Some(group);
        if job.metric_name.is_none() {
            job.metric_name = Some(job.job_name.clone());
        }
        job.deleted = false;
        job.updated_at = Utc::now();

        let mut uow = self.begin("add job");
        uow.stage_job(job.clone());
        if let Err(e) = uow.schedule(&job).await {
            uow.rollback().await;
            return Err(service_error("Failed to add job.", e));
        }
        uow.commit()
            .await
            .map_err(|e| service_error("Failed to add job.", e))?;

        info!(job_id = %job.id, job_name = %job.job_name, "Job added");
        Ok(job)
    }

    /// Resume a paused job
    pub async fn start(&self, job: &JobDefinition) -> Result<()> {
        let (name, group) = job
            .scheduler_identity()
            .ok_or(AppError::BadRequest(JobErrorCode::JobIsNotScheduled))?;
        let _guard = self.locks.acquire(&job.job_name).await;

        let state = self
            .adapter
            .current_state(name, group)
            .await
            .map_err(|e| service_error("Failed to start job.", e))?;
        match state {
            None => return Err(AppError::BadRequest(JobErrorCode::JobIsNotScheduled)),
            Some(TriggerState::Paused) => {}
            Some(state) => {
                debug!(job_id = %job.id, %state, "Job cannot be started");
                return Err(AppError::BadRequest(JobErrorCode::JobIsNotInPausedStatus));
            }
        }

        self.adapter
            .resume(name, group)
            .await
            .map_err(|e| service_error("Failed to start job.", e))?;
        info!(job_id = %job.id, "Job started");
        Ok(())
    }

    /// Pause a job and close its pending predicates
    pub async fn stop(&self, job: &JobDefinition) -> Result<JobDefinition> {
        self.pause_job(job, false).await
    }

    /// Pause a job, close its pending predicates and soft delete it
    pub async fn delete(&self, job: &JobDefinition) -> Result<JobDefinition> {
        self.pause_job(job, true).await
    }

    async fn pause_job(&self, job: &JobDefinition, delete: bool) -> Result<JobDefinition> {
        let _guard = self.locks.acquire(&job.job_name).await;
        let mut updated = match self.jobs.find_by_id(job.id).await {
            Ok(Some(stored)) => stored,
            Ok(None) => job.clone(),
            Err(e) => return Err(service_error("Job schedule happens exception.", e)),
        };
        let mut uow = self.begin(if delete { "delete job" } else { "stop job" });

        match self.pause_steps(&mut uow, &mut updated, delete).await {
            Ok(true) => {}
            Ok(false) => {
                uow.commit().await?;
                return Ok(updated);
            }
            Err(e) => {
                uow.rollback().await;
                return Err(service_error("Job schedule happens exception.", e));
            }
        }
        uow.commit()
            .await
            .map_err(|e| service_error("Job schedule happens exception.", e))?;

        info!(job_id = %job.id, deleted = delete, "Job paused");
        Ok(updated)
    }

    /// Returns `false` when a stop found nothing to pause
    async fn pause_steps(
        &self,
        uow: &mut UnitOfWork,
        job: &mut JobDefinition,
        delete: bool,
    ) -> Result<bool> {
        if let Some((name, group)) = job.scheduler_identity() {
            if !uow.pause(name, group).await? {
                if delete {
                    warn!("Job({},{}) does not exist.", group, name);
                    return Err(AppError::NotFound(JobErrorCode::JobKeyDoesNotExist));
                }
                info!("Job({},{}) does not exist, nothing to stop.", group, name);
                return Ok(false);
            }
        }

        let closed = self.predicates.close_predicates(uow, job.id).await?;
        debug!(job_id = %job.id, closed, "Closed pending predicates");

        job.deleted = delete;
        job.updated_at = Utc::now();
        uow.stage_job(job.clone());
        Ok(true)
    }

    /// Fire the job's unit once, now, without touching its own schedule
    pub async fn one(&self, job: &JobDefinition) -> Result<()> {
        let (name, group) = job
            .scheduler_identity()
            .ok_or(AppError::NotFound(JobErrorCode::JobKeyDoesNotExist))?;
        self.adapter.schedule_once(name, group, job.job_type()).await
    }

    /// UI-facing state of a job, `None` when it has no scheduler identity
    pub async fn get_state(&self, job: &JobDefinition, action: &str) -> Result<Option<JobState>> {
        let Some((name, group)) = job.scheduler_identity() else {
            return Ok(None);
        };

        let trigger_state = self.adapter.state(name, group).await?;
        let mut state = JobState::from_trigger_state(trigger_state);
        if let Some((next, previous)) = self.adapter.fire_times(name, group).await? {
            state.next_fire_time = next.map(|t| t.timestamp_millis()).unwrap_or(-1);
            state.previous_fire_time = previous.map(|t| t.timestamp_millis()).unwrap_or(-1);
        }
        debug!(job_id = %job.id, action, state = %state.state, "Resolved job state");
        Ok(Some(state))
    }

    /// Fold one job into the fleet health counters
    pub async fn get_health(&self, mut health: JobHealth, job: &JobDefinition) -> Result<JobHealth> {
        let Some((name, group)) = job.scheduler_identity() else {
            return Ok(health);
        };
        if self.adapter.triggers(name, group).await?.is_empty() {
            return Ok(health);
        }
        health.job_count += 1;
        if self.tracker.is_job_healthy(job.id).await? {
            health.healthy_job_count += 1;
        }
        Ok(health)
    }
}
