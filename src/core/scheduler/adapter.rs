//! Maps job definitions onto trigger engine primitives

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    JobDetail, JobKey, ScheduledUnit, Trigger, TriggerEngine, TriggerKey, TriggerState, UnitKind,
};
use crate::domain::entities::{JobDefinition, JobInstance, JobKind, JobType};
use crate::error::{AppError, JobErrorCode, Result};

/// Thin wrapper over a [`TriggerEngine`] speaking in (name, group) pairs
#[derive(Clone)]
pub struct TriggerAdapter {
    engine: Arc<dyn TriggerEngine>,
}

impl TriggerAdapter {
    pub fn new(engine: Arc<dyn TriggerEngine>) -> Self {
        Self { engine }
    }

    /// Key of the ad-hoc trigger used for manual runs of a job type
    pub fn one_shot_key(job_type: JobType) -> TriggerKey {
        let identity = format!("{}oneJob", job_type);
        TriggerKey::new(identity.clone(), identity)
    }

    /// Register the recurring trigger of an admitted job
    pub async fn schedule(&self, job: &JobDefinition) -> Result<TriggerKey> {
        let (name, group) = job.scheduler_identity().ok_or_else(|| {
            AppError::SchedulerError(format!("Job {} has no scheduler identity", job.id))
        })?;
        let job_key = JobKey::new(name, group);
        let trigger_key = TriggerKey::for_job(&job_key);

        let trigger = match &job.kind {
            JobKind::Simple(schedule) => Trigger::simple(
                trigger_key.clone(),
                job_key.clone(),
                schedule.start_at.unwrap_or_else(Utc::now),
                schedule
                    .interval()
                    .ok_or(AppError::BadRequest(JobErrorCode::InvalidJobSchedule))?,
                schedule.repeat_count,
            ),
        };
        let detail = JobDetail {
            key: job_key,
            kind: UnitKind::Measure { job_id: job.id },
            durable: true,
        };

        self.engine.schedule_job(detail, trigger).await?;
        info!(job_id = %job.id, trigger = %trigger_key, "Scheduled measure job");
        Ok(trigger_key)
    }

    /// Register the polling trigger gating one instance
    pub async fn schedule_predicate(
        &self,
        instance: &JobInstance,
        start_at: DateTime<Utc>,
        interval: ChronoDuration,
        repeat_count: u32,
    ) -> Result<TriggerKey> {
        let job_key = JobKey::new(&instance.predicate_name, &instance.predicate_group);
        let trigger_key = TriggerKey::for_job(&job_key);
        let trigger = Trigger::simple(
            trigger_key.clone(),
            job_key.clone(),
            start_at,
            interval,
            Some(repeat_count),
        );
        let detail = JobDetail {
            key: job_key,
            kind: UnitKind::Predicate {
                job_id: instance.job_id,
                instance_id: instance.id,
            },
            durable: false,
        };

        self.engine.schedule_job(detail, trigger).await?;
        debug!(instance_id = %instance.id, trigger = %trigger_key, "Scheduled predicate job");
        Ok(trigger_key)
    }

    pub async fn exists(&self, name: &str, group: &str) -> Result<bool> {
        self.engine.check_exists(&JobKey::new(name, group)).await
    }

    /// Pause a job. Returns `false` when the job is not registered.
    pub async fn pause(&self, name: &str, group: &str) -> Result<bool> {
        let key = JobKey::new(name, group);
        if !self.engine.check_exists(&key).await? {
            return Ok(false);
        }
        self.engine.pause_job(&key).await?;
        Ok(true)
    }

    pub async fn resume(&self, name: &str, group: &str) -> Result<()> {
        self.engine.resume_job(&JobKey::new(name, group)).await
    }

    /// Delete a job. A missing job is a logged no-op.
    pub async fn delete(&self, name: &str, group: &str) -> Result<Option<ScheduledUnit>> {
        let key = JobKey::new(name, group);
        if !self.engine.check_exists(&key).await? {
            info!("Job({},{}) does not exist.", group, name);
            return Ok(None);
        }
        self.engine.delete_job(&key).await
    }

    pub async fn restore(&self, unit: ScheduledUnit) -> Result<()> {
        self.engine.restore_unit(unit).await
    }

    pub async fn triggers(&self, name: &str, group: &str) -> Result<Vec<Trigger>> {
        self.engine.triggers_of_job(&JobKey::new(name, group)).await
    }

    /// State of the job's first trigger, `None` when it has no trigger at all
    pub async fn current_state(&self, name: &str, group: &str) -> Result<Option<TriggerState>> {
        let triggers = self.triggers(name, group).await?;
        match triggers.first() {
            Some(trigger) => Ok(Some(self.engine.trigger_state(&trigger.key).await?)),
            None => Ok(None),
        }
    }

    /// State of the trigger sharing the job's identity
    pub async fn state(&self, name: &str, group: &str) -> Result<TriggerState> {
        self.engine
            .trigger_state(&TriggerKey::new(name, group))
            .await
    }

    /// Next and previous fire time of the job's first trigger
    pub async fn fire_times(
        &self,
        name: &str,
        group: &str,
    ) -> Result<Option<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)>> {
        let triggers = self.triggers(name, group).await?;
        Ok(triggers
            .first()
            .map(|t| (t.next_fire_time, t.previous_fire_time)))
    }

    /// Fire the job's unit once, right now, outside of its own schedule
    pub async fn schedule_once(&self, name: &str, group: &str, job_type: JobType) -> Result<()> {
        let job_key = JobKey::new(name, group);
        let detail = self.engine.job_detail(&job_key).await?.ok_or_else(|| {
            warn!("Job({},{}) does not exist.", group, name);
            AppError::NotFound(JobErrorCode::JobKeyDoesNotExist)
        })?;

        let trigger = Trigger::once(Self::one_shot_key(job_type), detail.key, Utc::now());
        self.engine.schedule_trigger(trigger).await?;
        info!(job = %job_key, "Scheduled one-shot run");
        Ok(())
    }
}
