use std::fmt;

/// Stable, client-facing reasons attached to request-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobErrorCode {
    MeasureIdDoesNotExist,
    JobIdDoesNotExist,
    JobNameDoesNotExist,
    NoSuchJobAction,
    JobKeyDoesNotExist,
    InvalidJobName,
    MissingBaselineConfig,
    InvalidConnectorName,
    JobIsNotScheduled,
    JobIsNotInPausedStatus,
    JobAlreadyScheduled,
    InvalidJobType,
    InvalidJobSchedule,
}

impl JobErrorCode {
    pub fn code(&self) -> u32 {
        match self {
            JobErrorCode::MeasureIdDoesNotExist => 40401,
            JobErrorCode::JobIdDoesNotExist => 40402,
            JobErrorCode::JobNameDoesNotExist => 40403,
            JobErrorCode::NoSuchJobAction => 40004,
            JobErrorCode::JobKeyDoesNotExist => 40405,
            JobErrorCode::InvalidJobName => 40006,
            JobErrorCode::MissingBaselineConfig => 40007,
            JobErrorCode::InvalidConnectorName => 40008,
            JobErrorCode::JobIsNotScheduled => 40009,
            JobErrorCode::JobIsNotInPausedStatus => 40010,
            JobErrorCode::JobAlreadyScheduled => 40901,
            JobErrorCode::InvalidJobType => 40011,
            JobErrorCode::InvalidJobSchedule => 40012,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            JobErrorCode::MeasureIdDoesNotExist => "Measure id does not exist",
            JobErrorCode::JobIdDoesNotExist => "Job id does not exist",
            JobErrorCode::JobNameDoesNotExist => "Job name does not exist",
            JobErrorCode::NoSuchJobAction => "No such job action",
            JobErrorCode::JobKeyDoesNotExist => "Job key which consists of group and name does not exist",
            JobErrorCode::InvalidJobName => "Job name is invalid or already in use",
            JobErrorCode::MissingBaselineConfig => "Please set a timestamp baseline on one of the job segments",
            JobErrorCode::InvalidConnectorName => "Connector names must be unique and declared by the measure",
            JobErrorCode::JobIsNotScheduled => "The job is not scheduled",
            JobErrorCode::JobIsNotInPausedStatus => "The job is not in paused status",
            JobErrorCode::JobAlreadyScheduled => "A scheduled job with the same key already exists",
            JobErrorCode::InvalidJobType => "Unknown job type",
            JobErrorCode::InvalidJobSchedule => "The repeat interval must be a positive number of seconds within range",
        }
    }
}

impl fmt::Display for JobErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(JobErrorCode),

    #[error("Not found: {0}")]
    NotFound(JobErrorCode),

    #[error("Conflict: {0}")]
    Conflict(JobErrorCode),

    #[error("{message}")]
    ServiceError {
        message: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("Scheduler error: {0}")]
    SchedulerError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl AppError {
    /// Wraps an infrastructure failure that interrupted a multi-step transition.
    pub fn service(message: impl Into<String>, source: AppError) -> Self {
        AppError::ServiceError {
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// Errors the caller can correct; these are surfaced verbatim and never wrapped.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::BadRequest(_) | AppError::NotFound(_) | AppError::Conflict(_)
        )
    }

    pub fn error_code(&self) -> Option<JobErrorCode> {
        match self {
            AppError::BadRequest(code) | AppError::NotFound(code) | AppError::Conflict(code) => {
                Some(*code)
            }
            _ => None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalServerError(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InternalServerError(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::ConfigError(format!("YAML error: {}", err))
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
