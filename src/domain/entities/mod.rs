pub mod instance;
pub mod job;
pub mod measure;

pub use instance::{InstanceId, JobInstance, SessionState};
pub use job::{
    positive_seconds, JobDataSegment, JobDefinition, JobId, JobKind, JobType, MeasureId,
    SegmentRange, SimpleSchedule,
};
pub use measure::{DataConnector, DataSource, Measure};
