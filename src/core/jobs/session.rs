//! Collaborators consumed by job execution
//!
//! The remote computation protocol and the upstream data checks are not part
//! of this crate; they are reached through these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entities::{JobDataSegment, JobDefinition, JobInstance, SessionState};
use crate::error::Result;

/// Remote session created for an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHandle {
    pub session_id: i64,
    pub app_id: Option<String>,
    pub app_uri: Option<String>,
    pub state: SessionState,
}

/// Launches and observes remote measurement sessions
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self, job: &JobDefinition, instance: &JobInstance) -> Result<SessionHandle>;

    async fn session_state(&self, session_id: i64) -> Result<SessionState>;
}

/// Decides whether the upstream data of a segment is available
#[async_trait]
pub trait DataReadinessProbe: Send + Sync {
    async fn is_ready(
        &self,
        job: &JobDefinition,
        segment: &JobDataSegment,
        fire_time: DateTime<Utc>,
    ) -> Result<bool>;
}
