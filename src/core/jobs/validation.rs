//! Admission checks of a job definition against its measure

use std::collections::HashSet;
use tracing::warn;

use crate::domain::entities::{JobDataSegment, JobDefinition, JobKind, Measure};
use crate::error::{AppError, JobErrorCode, Result};

/// Characters the scheduler reserves for its own key notation
const RESERVED_NAME_CHARS: [char; 3] = ['.', ':', '/'];

/// Validate a job against the measure it references. The first failing rule
/// wins; nothing is mutated.
pub fn validate(job: &JobDefinition, measure: &Measure) -> Result<()> {
    if !is_valid_job_name(&job.job_name) {
        return Err(AppError::BadRequest(JobErrorCode::InvalidJobName));
    }
    if !has_baseline(&job.segments) {
        return Err(AppError::BadRequest(JobErrorCode::MissingBaselineConfig));
    }
    let names = connector_names(measure);
    if !are_valid_connector_names(&job.segments, &names) {
        return Err(AppError::BadRequest(JobErrorCode::InvalidConnectorName));
    }
    if !has_valid_schedule(&job.kind) {
        return Err(AppError::BadRequest(JobErrorCode::InvalidJobSchedule));
    }
    Ok(())
}

/// Syntactic check of a job name
pub fn is_valid_job_name(name: &str) -> bool {
    if name.trim().is_empty() {
        warn!("Job name cannot be empty.");
        return false;
    }
    if name
        .chars()
        .any(|c| c.is_control() || RESERVED_NAME_CHARS.contains(&c))
    {
        warn!(job_name = name, "Job name contains reserved characters.");
        return false;
    }
    true
}

fn has_baseline(segments: &[JobDataSegment]) -> bool {
    if segments.iter().any(|segment| segment.as_baseline) {
        return true;
    }
    warn!("Please set segment timestamp baseline in as_baseline field.");
    false
}

fn has_valid_schedule(kind: &JobKind) -> bool {
    match kind {
        JobKind::Simple(schedule) => {
            if schedule.interval().is_some() {
                return true;
            }
            warn!(
                interval_seconds = schedule.interval_seconds,
                "Repeat interval must be positive and within range."
            );
            false
        }
    }
}

/// De-duplicated connector names declared by the measure. A measure that
/// repeats a connector name yields no names at all.
pub fn connector_names(measure: &Measure) -> HashSet<String> {
    let declared: Vec<&str> = measure.connector_names().collect();
    let names: HashSet<String> = declared.iter().map(|name| name.to_string()).collect();
    if names.len() < declared.len() {
        warn!(measure_id = %measure.id, "Connector names cannot be repeated.");
        return HashSet::new();
    }
    names
}

fn are_valid_connector_names(segments: &[JobDataSegment], names: &HashSet<String>) -> bool {
    let mut seen = HashSet::new();
    for segment in segments {
        let name = segment.data_connector_name.as_str();
        if !names.contains(name) {
            warn!(
                "Param {} is a illegal string. Please input one of strings in {:?}.",
                name, names
            );
            return false;
        }
        if !seen.insert(name) {
            warn!("Connector names in job data segment cannot duplicate.");
            return false;
        }
    }
    true
}
