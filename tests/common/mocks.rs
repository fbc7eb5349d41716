use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quality_jobs::core::jobs::{DataReadinessProbe, SessionHandle, SessionLauncher};
use quality_jobs::core::scheduler::{
    Firing, InMemoryTriggerEngine, JobDetail, JobKey, ScheduledUnit, Trigger, TriggerEngine,
    TriggerKey, TriggerState,
};
use quality_jobs::domain::entities::{
    JobDataSegment, JobDefinition, JobId, JobInstance, JobType, SessionState,
};
use quality_jobs::domain::repositories::JobRepository;
use quality_jobs::infrastructure::repositories::InMemoryJobRepository;
use quality_jobs::{AppError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use tokio::sync::{Notify, RwLock};

/// Trigger engine operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    ScheduleJob,
    ScheduleTrigger,
    PauseJob,
    ResumeJob,
    DeleteJob,
}

/// In-memory engine with switchable failures
#[derive(Default)]
pub struct FlakyTriggerEngine {
    pub inner: InMemoryTriggerEngine,
    failing: RwLock<HashSet<EngineOp>>,
}

impl FlakyTriggerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail(&self, op: EngineOp) {
        self.failing.write().await.insert(op);
    }

    pub async fn heal(&self) {
        self.failing.write().await.clear();
    }

    async fn check(&self, op: EngineOp) -> Result<()> {
        if self.failing.read().await.contains(&op) {
            return Err(AppError::SchedulerError(format!("{:?} failed", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl TriggerEngine for FlakyTriggerEngine {
    async fn schedule_job(&self, detail: JobDetail, trigger: Trigger) -> Result<()> {
        self.check(EngineOp::ScheduleJob).await?;
        self.inner.schedule_job(detail, trigger).await
    }

    async fn schedule_trigger(&self, trigger: Trigger) -> Result<()> {
        self.check(EngineOp::ScheduleTrigger).await?;
        self.inner.schedule_trigger(trigger).await
    }

    async fn pause_job(&self, key: &JobKey) -> Result<()> {
        self.check(EngineOp::PauseJob).await?;
        self.inner.pause_job(key).await
    }

    async fn resume_job(&self, key: &JobKey) -> Result<()> {
        self.check(EngineOp::ResumeJob).await?;
        self.inner.resume_job(key).await
    }

    async fn delete_job(&self, key: &JobKey) -> Result<Option<ScheduledUnit>> {
        self.check(EngineOp::DeleteJob).await?;
        self.inner.delete_job(key).await
    }

    async fn restore_unit(&self, unit: ScheduledUnit) -> Result<()> {
        self.inner.restore_unit(unit).await
    }

    async fn check_exists(&self, key: &JobKey) -> Result<bool> {
        self.inner.check_exists(key).await
    }

    async fn trigger_state(&self, key: &TriggerKey) -> Result<TriggerState> {
        self.inner.trigger_state(key).await
    }

    async fn triggers_of_job(&self, key: &JobKey) -> Result<Vec<Trigger>> {
        self.inner.triggers_of_job(key).await
    }

    async fn job_detail(&self, key: &JobKey) -> Result<Option<JobDetail>> {
        self.inner.job_detail(key).await
    }

    async fn fire_due(&self, now: DateTime<Utc>) -> Result<Vec<Firing>> {
        self.inner.fire_due(now).await
    }

    async fn complete_firing(&self, firing: &Firing) -> Result<()> {
        self.inner.complete_firing(firing).await
    }
}

/// In-memory job repository whose saves can be made to fail
#[derive(Default)]
pub struct FlakyJobRepository {
    pub inner: InMemoryJobRepository,
    fail_saves: AtomicBool,
}

impl FlakyJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobRepository for FlakyJobRepository {
    async fn save(&self, job: &JobDefinition) -> Result<JobDefinition> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError("connection reset".to_string()));
        }
        self.inner.save(job).await
    }

    async fn remove(&self, job_id: JobId) -> Result<()> {
        self.inner.remove(job_id).await
    }

    async fn find_by_id(&self, job_id: JobId) -> Result<Option<JobDefinition>> {
        self.inner.find_by_id(job_id).await
    }

    async fn find_alive_by_id(&self, job_id: JobId) -> Result<Option<JobDefinition>> {
        self.inner.find_alive_by_id(job_id).await
    }

    async fn find_alive_by_name(&self, job_name: &str) -> Result<Vec<JobDefinition>> {
        self.inner.find_alive_by_name(job_name).await
    }

    async fn find_alive(&self, job_type: Option<JobType>) -> Result<Vec<JobDefinition>> {
        self.inner.find_alive(job_type).await
    }

    async fn count_alive_by_name(&self, job_name: &str) -> Result<u64> {
        self.inner.count_alive_by_name(job_name).await
    }
}

/// Readiness probe answering from a switch. While held, a call parks
/// until `release` so a firing can be caught mid-flight.
#[derive(Default)]
pub struct ScriptedProbe {
    ready: AtomicBool,
    calls: AtomicUsize,
    held: AtomicBool,
    entered: Notify,
    released: Notify,
}

impl ScriptedProbe {
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    /// Wait until a call is parked on the hold
    pub async fn wait_for_call(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.released.notify_one();
    }
}

#[async_trait]
impl DataReadinessProbe for ScriptedProbe {
    async fn is_ready(
        &self,
        _job: &JobDefinition,
        _segment: &JobDataSegment,
        _fire_time: DateTime<Utc>,
    ) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.held.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.released.notified().await;
        }
        Ok(self.ready.load(Ordering::SeqCst))
    }
}

/// Session launcher keeping sessions in a map
pub struct ScriptedLauncher {
    fail_launch: AtomicBool,
    next_session_id: AtomicI64,
    sessions: RwLock<HashMap<i64, SessionState>>,
}

impl Default for ScriptedLauncher {
    fn default() -> Self {
        Self {
            fail_launch: AtomicBool::new(false),
            next_session_id: AtomicI64::new(100),
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl ScriptedLauncher {
    pub fn fail_launch(&self, fail: bool) {
        self.fail_launch.store(fail, Ordering::SeqCst);
    }

    pub async fn set_state(&self, session_id: i64, state: SessionState) {
        self.sessions.write().await.insert(session_id, state);
    }

    pub async fn launched(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionLauncher for ScriptedLauncher {
    async fn launch(&self, job: &JobDefinition, instance: &JobInstance) -> Result<SessionHandle> {
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(AppError::InternalServerError("session server down".to_string()));
        }
        let session_id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        self.sessions
            .write()
            .await
            .insert(session_id, SessionState::Starting);
        Ok(SessionHandle {
            session_id,
            app_id: Some(format!("application_{}_{}", job.job_name, session_id)),
            app_uri: Some(format!("http://sessions.local/{}", instance.id)),
            state: SessionState::Starting,
        })
    }

    async fn session_state(&self, session_id: i64) -> Result<SessionState> {
        Ok(self
            .sessions
            .read()
            .await
            .get(&session_id)
            .copied()
            .unwrap_or(SessionState::Unknown))
    }
}
