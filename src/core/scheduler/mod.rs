//! Trigger-based scheduling primitives
//!
//! The job subsystem does not own a scheduling algorithm. It talks to a
//! trigger engine through [`TriggerEngine`] and maps job definitions onto it
//! through [`TriggerAdapter`]. [`InMemoryTriggerEngine`] implements the
//! engine contract for embedding and tests; [`TriggerDispatcher`] drives
//! firings from any engine.

pub mod adapter;
pub mod dispatcher;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::entities::{InstanceId, JobId};
use crate::error::Result;

pub use adapter::TriggerAdapter;
pub use dispatcher::{FiringHandler, TriggerDispatcher};
pub use memory::InMemoryTriggerEngine;

/// Identity of an executable unit inside the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub name: String,
    pub group: String,
}

impl JobKey {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// Identity of a trigger inside the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TriggerKey {
    pub name: String,
    pub group: String,
}

impl TriggerKey {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }

    /// The trigger that shares its identity with a job
    pub fn for_job(job_key: &JobKey) -> Self {
        Self::new(job_key.name.clone(), job_key.group.clone())
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// Lifecycle state of a trigger as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerState {
    Normal,
    Paused,
    Complete,
    Error,
    Blocked,
    None,
}

impl TriggerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerState::Normal => "NORMAL",
            TriggerState::Paused => "PAUSED",
            TriggerState::Complete => "COMPLETE",
            TriggerState::Error => "ERROR",
            TriggerState::Blocked => "BLOCKED",
            TriggerState::None => "NONE",
        }
    }
}

impl fmt::Display for TriggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an executable unit does when it fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnitKind {
    /// Launch the measurement of a job
    Measure { job_id: JobId },
    /// Poll upstream data readiness for one instance of a job
    Predicate {
        job_id: JobId,
        instance_id: InstanceId,
    },
}

/// Executable unit registered in the engine
#[derive(Debug, Clone, PartialEq)]
pub struct JobDetail {
    pub key: JobKey,
    pub kind: UnitKind,
    /// Durable units survive the completion of their last trigger
    pub durable: bool,
}

/// Interval trigger with an optional repeat limit
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub key: TriggerKey,
    pub job_key: JobKey,
    pub start_at: DateTime<Utc>,
    pub interval: ChronoDuration,
    /// Repeats after the first firing, `None` repeats forever
    pub repeat_count: Option<u32>,
    pub times_fired: u32,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub previous_fire_time: Option<DateTime<Utc>>,
}

impl Trigger {
    pub fn simple(
        key: TriggerKey,
        job_key: JobKey,
        start_at: DateTime<Utc>,
        interval: ChronoDuration,
        repeat_count: Option<u32>,
    ) -> Self {
        Self {
            key,
            job_key,
            start_at,
            interval,
            repeat_count,
            times_fired: 0,
            next_fire_time: Some(start_at),
            previous_fire_time: None,
        }
    }

    /// Fires once at `at`, no repeats
    pub fn once(key: TriggerKey, job_key: JobKey, at: DateTime<Utc>) -> Self {
        Self::simple(key, job_key, at, ChronoDuration::seconds(1), Some(0))
    }

    /// Whether the firing about to happen is the last one
    pub fn is_final_firing(&self) -> bool {
        self.repeat_count
            .map(|repeats| self.times_fired >= repeats)
            .unwrap_or(false)
    }

    /// Skips the slots missed before `now`, for instance while the trigger
    /// was paused, so that the backlog fires once. Skipped slots count
    /// against the repeat limit. Returns how many slots were skipped.
    pub fn skip_missed(&mut self, now: DateTime<Utc>) -> u32 {
        let Some(next) = self.next_fire_time else {
            return 0;
        };
        let interval_ms = self.interval.num_milliseconds();
        if next >= now || interval_ms <= 0 {
            return 0;
        }

        let behind_ms = (now - next).num_milliseconds();
        let mut missed = u32::try_from(behind_ms / interval_ms).unwrap_or(u32::MAX);
        if let Some(repeats) = self.repeat_count {
            missed = missed.min(repeats.saturating_sub(self.times_fired));
        }
        if missed == 0 {
            return 0;
        }

        let skipped = ChronoDuration::milliseconds(interval_ms * i64::from(missed));
        self.next_fire_time = next.checked_add_signed(skipped);
        self.times_fired = self.times_fired.saturating_add(missed);
        missed
    }

    /// Records a firing of the scheduled time and computes the next one
    pub fn advance(&mut self) {
        let Some(scheduled) = self.next_fire_time else {
            return;
        };
        let last = self.is_final_firing();
        self.times_fired += 1;
        self.previous_fire_time = Some(scheduled);
        self.next_fire_time = if last {
            None
        } else {
            scheduled.checked_add_signed(self.interval)
        };
    }
}

/// Trigger together with its paused flag, as stored by an engine
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTrigger {
    pub trigger: Trigger,
    pub paused: bool,
}

/// Snapshot of a unit and its triggers, used to undo a deletion
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledUnit {
    pub detail: JobDetail,
    pub triggers: Vec<ScheduledTrigger>,
}

/// One firing handed out by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct Firing {
    pub trigger_key: TriggerKey,
    pub detail: JobDetail,
    pub scheduled_fire_time: DateTime<Utc>,
    pub fired_at: DateTime<Utc>,
    /// 1-based count of firings of this trigger, this one included
    pub times_fired: u32,
    /// No further firing of this trigger will follow
    pub is_last: bool,
}

/// Trigger engine contract
#[async_trait]
pub trait TriggerEngine: Send + Sync {
    /// Register a unit together with its first trigger
    async fn schedule_job(&self, detail: JobDetail, trigger: Trigger) -> Result<()>;

    /// Add a trigger to an already registered unit
    async fn schedule_trigger(&self, trigger: Trigger) -> Result<()>;

    /// Pause every trigger of a unit
    async fn pause_job(&self, key: &JobKey) -> Result<()>;

    /// Resume every trigger of a unit
    async fn resume_job(&self, key: &JobKey) -> Result<()>;

    /// Remove a unit and its triggers, returning what was removed
    async fn delete_job(&self, key: &JobKey) -> Result<Option<ScheduledUnit>>;

    /// Put back a unit previously returned by `delete_job`
    async fn restore_unit(&self, unit: ScheduledUnit) -> Result<()>;

    async fn check_exists(&self, key: &JobKey) -> Result<bool>;

    /// State of one trigger, `TriggerState::None` when it does not exist
    async fn trigger_state(&self, key: &TriggerKey) -> Result<TriggerState>;

    /// Triggers of a unit; the trigger sharing the unit's identity comes first
    async fn triggers_of_job(&self, key: &JobKey) -> Result<Vec<Trigger>>;

    async fn job_detail(&self, key: &JobKey) -> Result<Option<JobDetail>>;

    /// Hand out every due firing whose unit is not already executing
    async fn fire_due(&self, now: DateTime<Utc>) -> Result<Vec<Firing>>;

    /// Release the unit of a firing once its execution has finished
    async fn complete_firing(&self, firing: &Firing) -> Result<()>;
}
