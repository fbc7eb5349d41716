//! Predicate jobs gating a measurement until its upstream data is available
//!
//! Every firing of a measure job opens one instance in `FINDING` together
//! with a short-lived polling unit. The unit is torn down once data was
//! found, once its last repeat ran out, or when the owning job is paused.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::unit_of_work::UnitOfWork;
use crate::config::{InstanceConfig, PredicateConfig};
use crate::core::scheduler::{Firing, TriggerAdapter};
use crate::domain::entities::{JobDefinition, JobId, JobInstance};
use crate::domain::repositories::JobInstanceRepository;
use crate::error::{AppError, Result};

pub struct PredicateJobManager {
    adapter: TriggerAdapter,
    instances: Arc<dyn JobInstanceRepository>,
    predicate: PredicateConfig,
    expire_after: Option<ChronoDuration>,
}

impl PredicateJobManager {
    pub fn new(
        adapter: TriggerAdapter,
        instances: Arc<dyn JobInstanceRepository>,
        predicate: PredicateConfig,
        instance_config: &InstanceConfig,
    ) -> Self {
        Self {
            adapter,
            instances,
            predicate,
            expire_after: instance_config.expire_after(),
        }
    }

    /// Open an instance for a firing of `job` and register its polling unit.
    /// When registration fails the instance is kept as a closed record.
    pub async fn create_predicate(&self, job: &JobDefinition, firing: &Firing) -> Result<JobInstance> {
        let now = Utc::now();
        let interval = self.predicate.interval().ok_or_else(|| {
            AppError::ConfigError(format!(
                "Invalid predicate interval of {} seconds",
                self.predicate.interval_seconds
            ))
        })?;
        let expire_at = self
            .expire_after
            .and_then(|expire_after| now.checked_add_signed(expire_after))
            .ok_or_else(|| AppError::ConfigError("Invalid instance expiry".to_string()))?;

        let mut instance = JobInstance::new(
            job.id,
            &job.job_name,
            String::new(),
            &self.predicate.group,
            expire_at,
        );
        instance.predicate_name = format!("{}_{}", job.job_name, instance.id.simple());
        instance.trigger_key = Some(firing.trigger_key.to_string());
        self.instances.save(&instance).await?;

        let scheduled = self
            .adapter
            .schedule_predicate(
                &instance,
                now,
                interval,
                self.predicate.repeat_count,
            )
            .await;

        if let Err(e) = scheduled {
            error!(instance_id = %instance.id, "Failed to schedule predicate job: {}", e);
            instance.close_predicate();
            self.instances.save(&instance).await?;
            return Err(e);
        }

        info!(
            job_id = %job.id,
            instance_id = %instance.id,
            predicate = %instance.predicate_name,
            "Created predicate job"
        );
        Ok(instance)
    }

    /// Tear down the polling unit of one instance and persist it
    pub async fn delete_predicate(&self, instance: &mut JobInstance) -> Result<()> {
        if !instance.predicate_deleted {
            self.adapter
                .delete(&instance.predicate_name, &instance.predicate_group)
                .await?;
            instance.close_predicate();
        }
        self.instances.save(instance).await?;
        debug!(instance_id = %instance.id, state = %instance.state, "Predicate job deleted");
        Ok(())
    }

    /// Instances of a job whose polling unit has not been torn down yet
    pub async fn pending_predicates(&self, job_id: JobId) -> Result<Vec<JobInstance>> {
        Ok(self
            .instances
            .find_by_job_id(job_id)
            .await?
            .into_iter()
            .filter(|instance| !instance.predicate_deleted)
            .collect())
    }

    /// Tear down every pending polling unit of a job inside `uow`. The
    /// closed instances are staged and reach storage on commit.
    pub async fn close_predicates(&self, uow: &mut UnitOfWork, job_id: JobId) -> Result<usize> {
        let pending = self.pending_predicates(job_id).await?;
        let count = pending.len();
        for mut instance in pending {
            uow.delete_scheduled(&instance.predicate_name, &instance.predicate_group)
                .await?;
            instance.close_predicate();
            uow.stage_instance(instance);
        }
        Ok(count)
    }
}
