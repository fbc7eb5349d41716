//! Execution of fired units
//!
//! A measure unit firing opens an instance gated by a predicate unit. Each
//! predicate firing probes the job's segments; once every segment is ready
//! the predicate is torn down and the remote session is launched. A
//! predicate whose last repeat finds no data closes its instance as
//! `NOT_FOUND`.
//!
//! Firings hold the same per-job lock as lifecycle transitions while they
//! write, and re-read the instance and the job under it. A stop or delete
//! that lands while a probe is in flight therefore wins.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::instances::JobInstanceTracker;
use super::locks::JobLocks;
use super::predicate::PredicateJobManager;
use super::session::{DataReadinessProbe, SessionLauncher};
use crate::core::scheduler::{Firing, FiringHandler, UnitKind};
use crate::domain::entities::{InstanceId, JobDefinition, JobId, JobInstance, SessionState};
use crate::domain::repositories::JobRepository;
use crate::error::{AppError, Result};

pub struct JobExecutor {
    jobs: Arc<dyn JobRepository>,
    predicates: Arc<PredicateJobManager>,
    tracker: Arc<JobInstanceTracker>,
    probe: Arc<dyn DataReadinessProbe>,
    launcher: Arc<dyn SessionLauncher>,
    locks: Arc<JobLocks>,
}

impl JobExecutor {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        predicates: Arc<PredicateJobManager>,
        tracker: Arc<JobInstanceTracker>,
        probe: Arc<dyn DataReadinessProbe>,
        launcher: Arc<dyn SessionLauncher>,
        locks: Arc<JobLocks>,
    ) -> Self {
        Self {
            jobs,
            predicates,
            tracker,
            probe,
            launcher,
            locks,
        }
    }

    async fn on_measure_fired(&self, job_id: JobId, firing: &Firing) -> Result<()> {
        let Some(job) = self.jobs.find_alive_by_id(job_id).await? else {
            warn!(%job_id, "Fired job no longer exists, skipping");
            return Ok(());
        };
        let _guard = self.locks.acquire(&job.job_name).await;
        let Some(job) = self.jobs.find_alive_by_id(job_id).await? else {
            warn!(%job_id, "Job was deleted while firing, skipping");
            return Ok(());
        };

        let instance = self.predicates.create_predicate(&job, firing).await?;
        debug!(job_id = %job.id, instance_id = %instance.id, "Measure job fired");
        Ok(())
    }

    /// Instance still waiting for upstream data, `None` once resolved
    async fn pending_instance(&self, instance_id: InstanceId) -> Result<Option<JobInstance>> {
        let instance = self.tracker.find(instance_id).await?.ok_or_else(|| {
            AppError::InternalServerError(format!("Instance {} does not exist", instance_id))
        })?;
        if instance.predicate_deleted || !instance.state.is_predicate_phase() {
            debug!(%instance_id, state = %instance.state, "Predicate already resolved");
            return Ok(None);
        }
        Ok(Some(instance))
    }

    async fn on_predicate_fired(
        &self,
        job_id: JobId,
        instance_id: InstanceId,
        firing: &Firing,
    ) -> Result<()> {
        let Some(instance) = self.pending_instance(instance_id).await? else {
            return Ok(());
        };

        let ready = match self.jobs.find_alive_by_id(job_id).await? {
            Some(job) => self.is_data_ready(&job, firing).await?,
            None => false,
        };

        let _guard = self.locks.acquire(&instance.job_name).await;
        let Some(mut instance) = self.pending_instance(instance_id).await? else {
            return Ok(());
        };
        let Some(job) = self.jobs.find_alive_by_id(job_id).await? else {
            self.predicates.delete_predicate(&mut instance).await?;
            return Ok(());
        };

        if ready {
            instance.state = SessionState::Found;
            self.predicates.delete_predicate(&mut instance).await?;
            info!(%instance_id, "Upstream data found");
            self.launch(&job, &mut instance).await
        } else if firing.is_last {
            self.predicates.delete_predicate(&mut instance).await?;
            info!(%instance_id, state = %instance.state, "Upstream data not found");
            Ok(())
        } else {
            debug!(%instance_id, times_fired = firing.times_fired, "Upstream data not ready yet");
            Ok(())
        }
    }

    async fn is_data_ready(&self, job: &JobDefinition, firing: &Firing) -> Result<bool> {
        for segment in &job.segments {
            if !self
                .probe
                .is_ready(job, segment, firing.scheduled_fire_time)
                .await?
            {
                debug!(job_id = %job.id, connector = %segment.data_connector_name, "Segment not ready");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn launch(&self, job: &JobDefinition, instance: &mut JobInstance) -> Result<()> {
        match self.launcher.launch(job, instance).await {
            Ok(handle) => self.tracker.attach_session(instance, handle).await,
            Err(e) => {
                warn!(instance_id = %instance.id, "Failed to launch session: {}", e);
                self.tracker.update_state(instance, SessionState::Error).await
            }
        }
    }
}

#[async_trait]
impl FiringHandler for JobExecutor {
    async fn handle(&self, firing: &Firing) -> Result<()> {
        match firing.detail.kind {
            UnitKind::Measure { job_id } => self.on_measure_fired(job_id, firing).await,
            UnitKind::Predicate {
                job_id,
                instance_id,
            } => self.on_predicate_fired(job_id, instance_id, firing).await,
        }
    }

    async fn maintain(&self) -> Result<()> {
        let changed = self.tracker.sync_sessions(self.launcher.as_ref()).await?;
        if changed > 0 {
            debug!(changed, "Synchronized session states");
        }
        Ok(())
    }
}
