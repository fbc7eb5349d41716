//! Job instances and remote session states

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::job::JobId;

/// Unique identifier for a job instance
pub type InstanceId = Uuid;

/// State of the remote computation session correlated with an instance.
///
/// `Finding`, `NotFound` and `Found` are local states covering the predicate
/// phase, before any remote session exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    NotStarted,
    Starting,
    Recovering,
    Idle,
    Running,
    Busy,
    ShuttingDown,
    Error,
    Dead,
    Killed,
    Success,
    Unknown,
    Stopped,
    Finding,
    NotFound,
    Found,
}

impl SessionState {
    /// Whether the session may still change state on its own
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::NotStarted
                | SessionState::Starting
                | SessionState::Recovering
                | SessionState::Idle
                | SessionState::Running
                | SessionState::Busy
                | SessionState::ShuttingDown
        )
    }

    /// Whether the instance is waiting for upstream data
    pub fn is_predicate_phase(&self) -> bool {
        matches!(self, SessionState::Finding)
    }

    /// Terminal failure; never true for an active state
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SessionState::Error | SessionState::Dead | SessionState::Killed | SessionState::NotFound
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::NotStarted => "NOT_STARTED",
            SessionState::Starting => "STARTING",
            SessionState::Recovering => "RECOVERING",
            SessionState::Idle => "IDLE",
            SessionState::Running => "RUNNING",
            SessionState::Busy => "BUSY",
            SessionState::ShuttingDown => "SHUTTING_DOWN",
            SessionState::Error => "ERROR",
            SessionState::Dead => "DEAD",
            SessionState::Killed => "KILLED",
            SessionState::Success => "SUCCESS",
            SessionState::Unknown => "UNKNOWN",
            SessionState::Stopped => "STOPPED",
            SessionState::Finding => "FINDING",
            SessionState::NotFound => "NOT_FOUND",
            SessionState::Found => "FOUND",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One firing of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInstance {
    pub id: InstanceId,
    /// Back-pointer to the owning job definition
    pub job_id: JobId,
    pub job_name: String,
    pub session_id: Option<i64>,
    pub app_id: Option<String>,
    pub app_uri: Option<String>,
    pub state: SessionState,
    pub predicate_name: String,
    pub predicate_group: String,
    pub predicate_deleted: bool,
    /// Trigger that fired this instance, as "group.name"
    pub trigger_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
}

impl JobInstance {
    pub fn new(
        job_id: JobId,
        job_name: impl Into<String>,
        predicate_name: impl Into<String>,
        predicate_group: impl Into<String>,
        expire_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            job_name: job_name.into(),
            session_id: None,
            app_id: None,
            app_uri: None,
            state: SessionState::Finding,
            predicate_name: predicate_name.into(),
            predicate_group: predicate_group.into(),
            predicate_deleted: false,
            trigger_key: None,
            created_at: Utc::now(),
            expire_at,
        }
    }

    /// Marks the predicate gate as torn down. An instance still looking for
    /// data can never find it afterwards.
    pub fn close_predicate(&mut self) {
        self.predicate_deleted = true;
        if self.state == SessionState::Finding {
            self.state = SessionState::NotFound;
        }
    }
}
