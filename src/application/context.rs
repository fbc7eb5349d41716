//! Wiring of the job subsystem

use std::sync::Arc;
use tracing::info;

use crate::{
    config::AppConfiguration,
    core::{
        jobs::{
            DataReadinessProbe, HealthPolicy, JobExecutor, JobInstanceTracker, JobLocks, JobOperator,
            LatestInstanceSucceeded, PredicateJobManager, SessionLauncher,
        },
        scheduler::{InMemoryTriggerEngine, TriggerAdapter, TriggerDispatcher, TriggerEngine},
    },
    domain::repositories::{JobInstanceRepository, JobRepository, MeasureProvider},
    error::Result,
    infrastructure::repositories::{InMemoryJobInstanceRepository, InMemoryJobRepository},
};

use super::services::JobService;

/// Collaborators the job subsystem is assembled from
pub struct JobDependencies {
    pub engine: Arc<dyn TriggerEngine>,
    pub jobs: Arc<dyn JobRepository>,
    pub instances: Arc<dyn JobInstanceRepository>,
    pub measures: Arc<dyn MeasureProvider>,
    pub probe: Arc<dyn DataReadinessProbe>,
    pub launcher: Arc<dyn SessionLauncher>,
    pub health_policy: Arc<dyn HealthPolicy>,
}

impl JobDependencies {
    /// In-memory engine and repositories around the given collaborators
    pub fn in_memory(
        measures: Arc<dyn MeasureProvider>,
        probe: Arc<dyn DataReadinessProbe>,
        launcher: Arc<dyn SessionLauncher>,
    ) -> Self {
        Self {
            engine: Arc::new(InMemoryTriggerEngine::new()),
            jobs: Arc::new(InMemoryJobRepository::new()),
            instances: Arc::new(InMemoryJobInstanceRepository::new()),
            measures,
            probe,
            launcher,
            health_policy: Arc::new(LatestInstanceSucceeded),
        }
    }
}

/// Fully wired job subsystem
pub struct JobContext {
    pub service: Arc<JobService>,
    pub operator: Arc<JobOperator>,
    pub executor: Arc<JobExecutor>,
    pub tracker: Arc<JobInstanceTracker>,
    pub predicates: Arc<PredicateJobManager>,
    pub adapter: TriggerAdapter,
    pub dispatcher: TriggerDispatcher,
}

impl JobContext {
    pub fn new(config: &AppConfiguration, deps: JobDependencies) -> Self {
        let adapter = TriggerAdapter::new(deps.engine.clone());
        let tracker = Arc::new(JobInstanceTracker::new(
            deps.instances.clone(),
            deps.health_policy,
            config.instances.max_page_size,
        ));
        let predicates = Arc::new(PredicateJobManager::new(
            adapter.clone(),
            deps.instances.clone(),
            config.predicate.clone(),
            &config.instances,
        ));
        let locks = Arc::new(JobLocks::new());
        let operator = Arc::new(JobOperator::new(
            adapter.clone(),
            deps.jobs.clone(),
            deps.instances,
            predicates.clone(),
            tracker.clone(),
            locks.clone(),
        ));
        let executor = Arc::new(JobExecutor::new(
            deps.jobs.clone(),
            predicates.clone(),
            tracker.clone(),
            deps.probe,
            deps.launcher,
            locks,
        ));
        let dispatcher = TriggerDispatcher::new(
            deps.engine,
            executor.clone(),
            config.scheduler.tick_interval(),
            config.scheduler.session_sync_interval(),
        );
        let service = Arc::new(JobService::new(
            operator.clone(),
            deps.jobs,
            deps.measures,
            tracker.clone(),
        ));

        Self {
            service,
            operator,
            executor,
            tracker,
            predicates,
            adapter,
            dispatcher,
        }
    }

    /// Start dispatching firings in the background
    pub async fn start(&self) -> Result<()> {
        self.dispatcher.start().await?;
        info!("Job subsystem started");
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.dispatcher.stop().await;
        info!("Job subsystem stopped");
    }
}
