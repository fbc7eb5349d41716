//! In-memory trigger engine
//!
//! Keeps units and triggers in a single lock-protected store. A unit that is
//! executing blocks its triggers until `complete_firing` is called, so at most
//! one execution per unit runs at any time. A trigger that fell behind, for
//! example while paused, fires once for its latest missed slot and then
//! continues on schedule.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{
    Firing, JobDetail, JobKey, ScheduledTrigger, ScheduledUnit, Trigger, TriggerEngine,
    TriggerKey, TriggerState,
};
use crate::error::{AppError, Result};

#[derive(Default)]
struct EngineState {
    jobs: HashMap<JobKey, JobDetail>,
    triggers: HashMap<TriggerKey, ScheduledTrigger>,
    executing: HashSet<JobKey>,
}

impl EngineState {
    fn sorted_triggers(&self, key: &JobKey) -> Vec<&ScheduledTrigger> {
        let own = TriggerKey::for_job(key);
        let mut triggers: Vec<&ScheduledTrigger> = self
            .triggers
            .values()
            .filter(|t| &t.trigger.job_key == key)
            .collect();
        triggers.sort_by(|a, b| {
            let a_own = a.trigger.key != own;
            let b_own = b.trigger.key != own;
            a_own.cmp(&b_own).then_with(|| a.trigger.key.cmp(&b.trigger.key))
        });
        triggers
    }

    fn remove_if_orphaned(&mut self, key: &JobKey) {
        let has_triggers = self.triggers.values().any(|t| &t.trigger.job_key == key);
        let durable = self.jobs.get(key).map(|d| d.durable).unwrap_or(true);
        if !has_triggers && !durable && !self.executing.contains(key) {
            self.jobs.remove(key);
            debug!(job = %key, "Removed unit without remaining triggers");
        }
    }
}

/// Trigger engine that lives entirely in process memory
#[derive(Default)]
pub struct InMemoryTriggerEngine {
    state: RwLock<EngineState>,
}

impl InMemoryTriggerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered units
    pub async fn job_count(&self) -> usize {
        self.state.read().await.jobs.len()
    }
}

#[async_trait]
impl TriggerEngine for InMemoryTriggerEngine {
    async fn schedule_job(&self, detail: JobDetail, trigger: Trigger) -> Result<()> {
        let mut state = self.state.write().await;
        if state.jobs.contains_key(&detail.key) {
            return Err(AppError::SchedulerError(format!(
                "Unable to store job {}, because one already exists with this identification",
                detail.key
            )));
        }
        if state.triggers.contains_key(&trigger.key) {
            return Err(AppError::SchedulerError(format!(
                "Unable to store trigger {}, because one already exists with this identification",
                trigger.key
            )));
        }
        if trigger.job_key != detail.key {
            return Err(AppError::SchedulerError(format!(
                "Trigger {} does not reference job {}",
                trigger.key, detail.key
            )));
        }

        debug!(job = %detail.key, trigger = %trigger.key, "Scheduling job");
        state.jobs.insert(detail.key.clone(), detail);
        state.triggers.insert(
            trigger.key.clone(),
            ScheduledTrigger {
                trigger,
                paused: false,
            },
        );
        Ok(())
    }

    async fn schedule_trigger(&self, trigger: Trigger) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.jobs.contains_key(&trigger.job_key) {
            return Err(AppError::SchedulerError(format!(
                "The job {} referenced by trigger {} does not exist",
                trigger.job_key, trigger.key
            )));
        }
        if state.triggers.contains_key(&trigger.key) {
            return Err(AppError::SchedulerError(format!(
                "Unable to store trigger {}, because one already exists with this identification",
                trigger.key
            )));
        }

        debug!(job = %trigger.job_key, trigger = %trigger.key, "Scheduling trigger");
        state.triggers.insert(
            trigger.key.clone(),
            ScheduledTrigger {
                trigger,
                paused: false,
            },
        );
        Ok(())
    }

    async fn pause_job(&self, key: &JobKey) -> Result<()> {
        let mut state = self.state.write().await;
        for scheduled in state
            .triggers
            .values_mut()
            .filter(|t| &t.trigger.job_key == key)
        {
            scheduled.paused = true;
        }
        debug!(job = %key, "Paused job");
        Ok(())
    }

    async fn resume_job(&self, key: &JobKey) -> Result<()> {
        let mut state = self.state.write().await;
        for scheduled in state
            .triggers
            .values_mut()
            .filter(|t| &t.trigger.job_key == key)
        {
            scheduled.paused = false;
        }
        debug!(job = %key, "Resumed job");
        Ok(())
    }

    async fn delete_job(&self, key: &JobKey) -> Result<Option<ScheduledUnit>> {
        let mut state = self.state.write().await;
        let Some(detail) = state.jobs.remove(key) else {
            return Ok(None);
        };

        let trigger_keys: Vec<TriggerKey> = state
            .triggers
            .values()
            .filter(|t| &t.trigger.job_key == key)
            .map(|t| t.trigger.key.clone())
            .collect();
        let triggers = trigger_keys
            .iter()
            .filter_map(|k| state.triggers.remove(k))
            .collect();

        info!(job = %key, "Deleted job");
        Ok(Some(ScheduledUnit { detail, triggers }))
    }

    async fn restore_unit(&self, unit: ScheduledUnit) -> Result<()> {
        let mut state = self.state.write().await;
        if state.jobs.contains_key(&unit.detail.key) {
            return Err(AppError::SchedulerError(format!(
                "Cannot restore job {}, it already exists",
                unit.detail.key
            )));
        }

        debug!(job = %unit.detail.key, "Restoring job");
        for scheduled in unit.triggers {
            state.triggers.insert(scheduled.trigger.key.clone(), scheduled);
        }
        state.jobs.insert(unit.detail.key.clone(), unit.detail);
        Ok(())
    }

    async fn check_exists(&self, key: &JobKey) -> Result<bool> {
        Ok(self.state.read().await.jobs.contains_key(key))
    }

    async fn trigger_state(&self, key: &TriggerKey) -> Result<TriggerState> {
        let state = self.state.read().await;
        let Some(scheduled) = state.triggers.get(key) else {
            return Ok(TriggerState::None);
        };

        let trigger_state = if scheduled.paused {
            TriggerState::Paused
        } else if scheduled.trigger.next_fire_time.is_none() {
            TriggerState::Complete
        } else if state.executing.contains(&scheduled.trigger.job_key) {
            TriggerState::Blocked
        } else {
            TriggerState::Normal
        };
        Ok(trigger_state)
    }

    async fn triggers_of_job(&self, key: &JobKey) -> Result<Vec<Trigger>> {
        let state = self.state.read().await;
        Ok(state
            .sorted_triggers(key)
            .into_iter()
            .map(|t| t.trigger.clone())
            .collect())
    }

    async fn job_detail(&self, key: &JobKey) -> Result<Option<JobDetail>> {
        Ok(self.state.read().await.jobs.get(key).cloned())
    }

    async fn fire_due(&self, now: DateTime<Utc>) -> Result<Vec<Firing>> {
        let mut state = self.state.write().await;

        let mut due: Vec<(DateTime<Utc>, TriggerKey)> = state
            .triggers
            .values()
            .filter(|t| !t.paused)
            .filter_map(|t| {
                t.trigger
                    .next_fire_time
                    .filter(|next| *next <= now)
                    .map(|next| (next, t.trigger.key.clone()))
            })
            .collect();
        due.sort();

        let mut firings = Vec::new();
        let mut completed = Vec::new();
        for (scheduled_fire_time, trigger_key) in due {
            let EngineState {
                jobs,
                triggers,
                executing,
            } = &mut *state;

            let Some(scheduled) = triggers.get_mut(&trigger_key) else {
                continue;
            };
            let job_key = scheduled.trigger.job_key.clone();
            if executing.contains(&job_key) {
                debug!(trigger = %trigger_key, "Trigger blocked by running execution");
                continue;
            }
            let Some(detail) = jobs.get(&job_key).cloned() else {
                continue;
            };

            let skipped = scheduled.trigger.skip_missed(now);
            if skipped > 0 {
                debug!(trigger = %trigger_key, skipped, "Skipped misfired slots");
            }
            let scheduled_fire_time = scheduled
                .trigger
                .next_fire_time
                .unwrap_or(scheduled_fire_time);
            let is_last = scheduled.trigger.is_final_firing();
            scheduled.trigger.advance();
            executing.insert(job_key);
            if scheduled.trigger.next_fire_time.is_none() {
                completed.push(trigger_key.clone());
            }

            firings.push(Firing {
                trigger_key,
                detail,
                scheduled_fire_time,
                fired_at: now,
                times_fired: scheduled.trigger.times_fired,
                is_last,
            });
        }

        for trigger_key in completed {
            state.triggers.remove(&trigger_key);
        }
        Ok(firings)
    }

    async fn complete_firing(&self, firing: &Firing) -> Result<()> {
        let mut state = self.state.write().await;
        state.executing.remove(&firing.detail.key);
        state.remove_if_orphaned(&firing.detail.key);
        Ok(())
    }
}
