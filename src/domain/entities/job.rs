//! Measure job definitions
//!
//! A job binds a measure to a recurring schedule. The scheduler-side identity
//! (`trigger_name`, `trigger_group`) is assigned on admission and stays stable
//! for the whole life of the job, including after it has been soft deleted.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AppError, JobErrorCode};

/// Unique identifier for a job definition
pub type JobId = Uuid;

/// Unique identifier for a measure
pub type MeasureId = Uuid;

/// Discriminator of the job variants, also used to derive the scheduler group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Simple,
}

impl JobType {
    pub fn name(&self) -> &'static str {
        match self {
            JobType::Simple => "simple",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for JobType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simple" => Ok(JobType::Simple),
            _ => Err(AppError::BadRequest(JobErrorCode::InvalidJobType)),
        }
    }
}

/// Recurring schedule of a simple job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleSchedule {
    /// Seconds between two firings
    pub interval_seconds: u64,
    /// Number of repeats after the first firing, `None` repeats forever
    pub repeat_count: Option<u32>,
    /// First firing, `None` starts immediately
    pub start_at: Option<DateTime<Utc>>,
}

impl SimpleSchedule {
    /// Repeat interval as a duration. `None` when it is zero or too large
    /// to be represented.
    pub fn interval(&self) -> Option<ChronoDuration> {
        positive_seconds(self.interval_seconds)
    }
}

/// Positive duration of `seconds`, `None` when zero or out of range
pub fn positive_seconds(seconds: u64) -> Option<ChronoDuration> {
    if seconds == 0 {
        return None;
    }
    ChronoDuration::try_seconds(i64::try_from(seconds).ok()?)
}

impl Default for SimpleSchedule {
    fn default() -> Self {
        Self {
            interval_seconds: 3600,
            repeat_count: None,
            start_at: None,
        }
    }
}

/// Job variants, each carrying only its own scheduling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "job_type", rename_all = "snake_case")]
pub enum JobKind {
    Simple(SimpleSchedule),
}

impl JobKind {
    pub fn job_type(&self) -> JobType {
        match self {
            JobKind::Simple(_) => JobType::Simple,
        }
    }
}

/// Time window of a segment relative to the firing time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRange {
    /// Offset from the firing time, e.g. "-1h"
    pub begin: String,
    /// Window length, e.g. "1h"
    pub length: String,
}

/// One data-source binding of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDataSegment {
    pub data_connector_name: String,
    /// Marks the segment used as timestamp reference of the measurement
    pub as_baseline: bool,
    pub segment_range: Option<SegmentRange>,
}

impl JobDataSegment {
    pub fn new(data_connector_name: impl Into<String>, as_baseline: bool) -> Self {
        Self {
            data_connector_name: data_connector_name.into(),
            as_baseline,
            segment_range: None,
        }
    }
}

/// Persisted job definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub id: JobId,
    pub job_name: String,
    pub measure_id: MeasureId,
    /// Name of the metric the measurement results are reported under
    pub metric_name: Option<String>,
    pub trigger_name: Option<String>,
    pub trigger_group: Option<String>,
    pub segments: Vec<JobDataSegment>,
    pub deleted: bool,
    pub kind: JobKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobDefinition {
    pub fn new(
        job_name: impl Into<String>,
        measure_id: MeasureId,
        segments: Vec<JobDataSegment>,
        kind: JobKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_name: job_name.into(),
            measure_id,
            metric_name: None,
            trigger_name: None,
            trigger_group: None,
            segments,
            deleted: false,
            kind,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn job_type(&self) -> JobType {
        self.kind.job_type()
    }

    /// Scheduler identity as (name, group), if the job has been admitted
    pub fn scheduler_identity(&self) -> Option<(&str, &str)> {
        match (self.trigger_name.as_deref(), self.trigger_group.as_deref()) {
            (Some(name), Some(group)) if !name.is_empty() && !group.is_empty() => {
                Some((name, group))
            }
            _ => None,
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.deleted
    }
}
