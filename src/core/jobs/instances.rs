//! Job instance tracking and health judgement

use std::sync::Arc;
use tracing::{debug, warn};

use super::session::{SessionHandle, SessionLauncher};
use crate::domain::entities::{InstanceId, JobId, JobInstance, SessionState};
use crate::domain::repositories::JobInstanceRepository;
use crate::error::Result;

/// Decides whether a job is healthy from its most recent instance
pub trait HealthPolicy: Send + Sync {
    fn is_healthy(&self, latest: Option<&JobInstance>) -> bool;
}

/// Healthy when the most recent instance completed successfully
#[derive(Debug, Default, Clone, Copy)]
pub struct LatestInstanceSucceeded;

impl HealthPolicy for LatestInstanceSucceeded {
    fn is_healthy(&self, latest: Option<&JobInstance>) -> bool {
        matches!(latest, Some(instance) if instance.state == SessionState::Success)
    }
}

/// Healthy unless the most recent instance ended in a failure state.
/// A job that never ran counts as healthy.
#[derive(Debug, Default, Clone, Copy)]
pub struct LatestInstanceNotFailed;

impl HealthPolicy for LatestInstanceNotFailed {
    fn is_healthy(&self, latest: Option<&JobInstance>) -> bool {
        latest.map(|instance| !instance.state.is_failure()).unwrap_or(true)
    }
}

pub struct JobInstanceTracker {
    instances: Arc<dyn JobInstanceRepository>,
    policy: Arc<dyn HealthPolicy>,
    max_page_size: usize,
}

impl JobInstanceTracker {
    pub fn new(
        instances: Arc<dyn JobInstanceRepository>,
        policy: Arc<dyn HealthPolicy>,
        max_page_size: usize,
    ) -> Self {
        Self {
            instances,
            policy,
            max_page_size: max_page_size.max(1),
        }
    }

    pub async fn record(&self, instance: &JobInstance) -> Result<JobInstance> {
        self.instances.save(instance).await
    }

    pub async fn find(&self, instance_id: InstanceId) -> Result<Option<JobInstance>> {
        self.instances.find_by_id(instance_id).await
    }

    /// One page of instances, newest first. The page size is clamped to
    /// `1..=max_page_size`.
    pub async fn instances_of_job(
        &self,
        job_id: JobId,
        page: usize,
        size: usize,
    ) -> Result<Vec<JobInstance>> {
        let size = size.clamp(1, self.max_page_size);
        self.instances.find_page(job_id, page, size).await
    }

    pub async fn latest(&self, job_id: JobId) -> Result<Option<JobInstance>> {
        self.instances.find_latest(job_id).await
    }

    pub async fn is_job_healthy(&self, job_id: JobId) -> Result<bool> {
        let latest = self.latest(job_id).await?;
        Ok(self.policy.is_healthy(latest.as_ref()))
    }

    /// Correlate an instance with the remote session launched for it
    pub async fn attach_session(
        &self,
        instance: &mut JobInstance,
        handle: SessionHandle,
    ) -> Result<()> {
        instance.session_id = Some(handle.session_id);
        instance.app_id = handle.app_id;
        instance.app_uri = handle.app_uri;
        instance.state = handle.state;
        self.instances.save(instance).await?;
        debug!(
            instance_id = %instance.id,
            session_id = handle.session_id,
            state = %instance.state,
            "Attached remote session"
        );
        Ok(())
    }

    pub async fn update_state(&self, instance: &mut JobInstance, state: SessionState) -> Result<()> {
        if instance.state != state {
            debug!(instance_id = %instance.id, from = %instance.state, to = %state, "Instance state changed");
            instance.state = state;
        }
        self.instances.save(instance).await?;
        Ok(())
    }

    /// Refresh every active instance from its remote session. Returns the
    /// number of instances whose state changed.
    pub async fn sync_sessions(&self, launcher: &dyn SessionLauncher) -> Result<usize> {
        let mut changed = 0;
        for mut instance in self.instances.find_active().await? {
            let Some(session_id) = instance.session_id else {
                continue;
            };
            match launcher.session_state(session_id).await {
                Ok(state) if state != instance.state => {
                    self.update_state(&mut instance, state).await?;
                    changed += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(instance_id = %instance.id, session_id, "Failed to sync session state: {}", e);
                }
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::InMemoryJobInstanceRepository;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn instance(job_id: JobId, state: SessionState, age_secs: i64) -> JobInstance {
        let mut instance = JobInstance::new(job_id, "orders", "orders_p", "PG", Utc::now());
        instance.state = state;
        instance.created_at = Utc::now() - Duration::seconds(age_secs);
        instance
    }

    #[test]
    fn test_health_policies() {
        let job_id = Uuid::new_v4();
        let success = instance(job_id, SessionState::Success, 0);
        let dead = instance(job_id, SessionState::Dead, 0);
        let running = instance(job_id, SessionState::Running, 0);

        assert!(LatestInstanceSucceeded.is_healthy(Some(&success)));
        assert!(!LatestInstanceSucceeded.is_healthy(Some(&running)));
        assert!(!LatestInstanceSucceeded.is_healthy(None));

        assert!(LatestInstanceNotFailed.is_healthy(Some(&running)));
        assert!(!LatestInstanceNotFailed.is_healthy(Some(&dead)));
        assert!(LatestInstanceNotFailed.is_healthy(None));
    }

    #[tokio::test]
    async fn test_health_follows_latest_instance() {
        let repo = Arc::new(InMemoryJobInstanceRepository::new());
        let tracker = JobInstanceTracker::new(repo, Arc::new(LatestInstanceSucceeded), 10);
        let job_id = Uuid::new_v4();

        tracker.record(&instance(job_id, SessionState::Dead, 60)).await.unwrap();
        tracker.record(&instance(job_id, SessionState::Success, 0)).await.unwrap();
        assert!(tracker.is_job_healthy(job_id).await.unwrap());

        tracker.record(&instance(job_id, SessionState::Killed, -5)).await.unwrap();
        assert!(!tracker.is_job_healthy(job_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_page_size_is_clamped() {
        let repo = Arc::new(InMemoryJobInstanceRepository::new());
        let tracker = JobInstanceTracker::new(repo, Arc::new(LatestInstanceSucceeded), 2);
        let job_id = Uuid::new_v4();
        for age in 0..5 {
            tracker
                .record(&instance(job_id, SessionState::Success, age))
                .await
                .unwrap();
        }

        assert_eq!(tracker.instances_of_job(job_id, 0, 100).await.unwrap().len(), 2);
        assert_eq!(tracker.instances_of_job(job_id, 0, 0).await.unwrap().len(), 1);
        assert_eq!(tracker.instances_of_job(job_id, 2, 2).await.unwrap().len(), 1);
    }
}
