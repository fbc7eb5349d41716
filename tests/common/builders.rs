use chrono::{DateTime, Utc};
use quality_jobs::domain::entities::{
    JobDataSegment, JobDefinition, JobKind, MeasureId, SimpleSchedule,
};
use uuid::Uuid;

/// Builder for job definitions
pub struct JobBuilder {
    name: String,
    measure_id: MeasureId,
    segments: Vec<JobDataSegment>,
    schedule: SimpleSchedule,
}

impl JobBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            measure_id: Uuid::new_v4(),
            segments: vec![
                JobDataSegment::new("src", true),
                JobDataSegment::new("tgt", false),
            ],
            schedule: SimpleSchedule::default(),
        }
    }

    pub fn measure(mut self, measure_id: MeasureId) -> Self {
        self.measure_id = measure_id;
        self
    }

    pub fn segments(mut self, segments: &[(&str, bool)]) -> Self {
        self.segments = segments
            .iter()
            .map(|(name, baseline)| JobDataSegment::new(*name, *baseline))
            .collect();
        self
    }

    pub fn interval_seconds(mut self, seconds: u64) -> Self {
        self.schedule.interval_seconds = seconds;
        self
    }

    pub fn start_at(mut self, start_at: DateTime<Utc>) -> Self {
        self.schedule.start_at = Some(start_at);
        self
    }

    pub fn build(self) -> JobDefinition {
        JobDefinition::new(
            self.name,
            self.measure_id,
            self.segments,
            JobKind::Simple(self.schedule),
        )
    }
}
