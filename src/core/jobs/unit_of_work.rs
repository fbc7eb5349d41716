//! Unit of work spanning the trigger engine and the repositories
//!
//! Scheduler calls are applied immediately and each one records how to undo
//! it. Repository writes are only staged and reach storage on `commit`, after
//! every scheduler call has succeeded. When a staged write fails, the writes
//! already flushed are reverted to their previous version and the scheduler
//! calls are compensated in reverse order.

use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::core::scheduler::{ScheduledUnit, TriggerAdapter, TriggerState};
use crate::domain::entities::{JobDefinition, JobInstance};
use crate::domain::repositories::{JobInstanceRepository, JobRepository};
use crate::error::Result;

#[derive(Debug)]
enum Compensation {
    Unschedule { name: String, group: String },
    Resume { name: String, group: String },
    Restore(ScheduledUnit),
}

#[derive(Debug)]
enum StagedWrite {
    Job(JobDefinition),
    Instance(JobInstance),
}

#[derive(Debug)]
enum FlushedWrite {
    Job {
        job: JobDefinition,
        previous: Option<JobDefinition>,
    },
    Instance {
        instance: JobInstance,
        previous: Option<JobInstance>,
    },
}

pub struct UnitOfWork {
    label: &'static str,
    adapter: TriggerAdapter,
    jobs: Arc<dyn JobRepository>,
    instances: Arc<dyn JobInstanceRepository>,
    staged: Vec<StagedWrite>,
    compensations: Vec<Compensation>,
    finished: bool,
}

impl UnitOfWork {
    pub fn begin(
        label: &'static str,
        adapter: TriggerAdapter,
        jobs: Arc<dyn JobRepository>,
        instances: Arc<dyn JobInstanceRepository>,
    ) -> Self {
        debug!(unit = label, "Beginning unit of work");
        Self {
            label,
            adapter,
            jobs,
            instances,
            staged: Vec::new(),
            compensations: Vec::new(),
            finished: false,
        }
    }

    pub fn stage_job(&mut self, job: JobDefinition) {
        self.staged.push(StagedWrite::Job(job));
    }

    pub fn stage_instance(&mut self, instance: JobInstance) {
        self.staged.push(StagedWrite::Instance(instance));
    }

    /// Register the job's trigger; undone by unscheduling it
    pub async fn schedule(&mut self, job: &JobDefinition) -> Result<()> {
        let trigger_key = self.adapter.schedule(job).await?;
        self.compensations.push(Compensation::Unschedule {
            name: trigger_key.name,
            group: trigger_key.group,
        });
        Ok(())
    }

    /// Pause a job; undone by resuming it unless it was paused already.
    /// Returns `false` when the job is not registered.
    pub async fn pause(&mut self, name: &str, group: &str) -> Result<bool> {
        let was_paused = self.adapter.current_state(name, group).await? == Some(TriggerState::Paused);
        if !self.adapter.pause(name, group).await? {
            return Ok(false);
        }
        if !was_paused {
            self.compensations.push(Compensation::Resume {
                name: name.to_string(),
                group: group.to_string(),
            });
        }
        Ok(true)
    }

    /// Delete a scheduled unit; undone by restoring the removed snapshot.
    /// Returns `false` when there was nothing to delete.
    pub async fn delete_scheduled(&mut self, name: &str, group: &str) -> Result<bool> {
        match self.adapter.delete(name, group).await? {
            Some(unit) => {
                self.compensations.push(Compensation::Restore(unit));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Flush staged writes. On failure everything performed by this unit is
    /// reverted and the original error is returned.
    pub async fn commit(mut self) -> Result<()> {
        self.finished = true;
        let staged = std::mem::take(&mut self.staged);
        let mut flushed = Vec::with_capacity(staged.len());

        for write in staged {
            if let Err(e) = self.flush(write, &mut flushed).await {
                error!(unit = self.label, "Commit failed, rolling back: {}", e);
                self.revert_writes(flushed).await;
                self.compensate().await;
                return Err(e);
            }
        }

        debug!(unit = self.label, "Committed unit of work");
        Ok(())
    }

    /// Discard staged writes and undo the scheduler calls already performed
    pub async fn rollback(mut self) {
        warn!(unit = self.label, "Rolling back unit of work");
        self.finished = true;
        self.staged.clear();
        self.compensate().await;
    }

    async fn flush(&self, write: StagedWrite, flushed: &mut Vec<FlushedWrite>) -> Result<()> {
        match write {
            StagedWrite::Job(job) => {
                let previous = self.jobs.find_by_id(job.id).await?;
                self.jobs.save(&job).await?;
                flushed.push(FlushedWrite::Job { job, previous });
            }
            StagedWrite::Instance(instance) => {
                let previous = self.instances.find_by_id(instance.id).await?;
                self.instances.save(&instance).await?;
                flushed.push(FlushedWrite::Instance { instance, previous });
            }
        }
        Ok(())
    }

    async fn revert_writes(&self, flushed: Vec<FlushedWrite>) {
        for write in flushed.into_iter().rev() {
            let result = match write {
                FlushedWrite::Job {
                    previous: Some(previous),
                    ..
                } => self.jobs.save(&previous).await.map(|_| ()),
                FlushedWrite::Job { job, previous: None } => self.jobs.remove(job.id).await,
                FlushedWrite::Instance {
                    previous: Some(previous),
                    ..
                } => self.instances.save(&previous).await.map(|_| ()),
                FlushedWrite::Instance {
                    instance,
                    previous: None,
                } => {
                    warn!(instance_id = %instance.id, "Cannot revert creation of instance");
                    Ok(())
                }
            };
            if let Err(e) = result {
                error!(unit = self.label, "Failed to revert write: {}", e);
            }
        }
    }

    async fn compensate(&mut self) {
        while let Some(compensation) = self.compensations.pop() {
            let result = match &compensation {
                Compensation::Unschedule { name, group } => {
                    self.adapter.delete(name, group).await.map(|_| ())
                }
                Compensation::Resume { name, group } => self.adapter.resume(name, group).await,
                Compensation::Restore(unit) => self.adapter.restore(unit.clone()).await,
            };
            if let Err(e) = result {
                error!(unit = self.label, ?compensation, "Compensation failed: {}", e);
            }
        }
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if !self.finished && (!self.staged.is_empty() || !self.compensations.is_empty()) {
            warn!(
                unit = self.label,
                "Unit of work dropped without commit or rollback"
            );
        }
    }
}
