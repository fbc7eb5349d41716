#![allow(dead_code)]

use quality_jobs::config::AppConfiguration;
use quality_jobs::domain::entities::{JobDefinition, Measure};
use quality_jobs::domain::repositories::JobRepository;
use quality_jobs::infrastructure::repositories::{
    InMemoryJobInstanceRepository, InMemoryMeasureProvider,
};
use quality_jobs::core::jobs::LatestInstanceSucceeded;
use quality_jobs::{JobContext, JobDependencies};
use std::sync::Arc;

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;

/// Job subsystem wired to fakes, with handles on every collaborator
pub struct TestEnvironment {
    pub config: AppConfiguration,
    pub engine: Arc<FlakyTriggerEngine>,
    pub jobs: Arc<FlakyJobRepository>,
    pub instances: Arc<InMemoryJobInstanceRepository>,
    pub measures: Arc<InMemoryMeasureProvider>,
    pub probe: Arc<ScriptedProbe>,
    pub launcher: Arc<ScriptedLauncher>,
    pub context: JobContext,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self::with_config(AppConfiguration::default())
    }

    pub fn with_config(config: AppConfiguration) -> Self {
        let engine = Arc::new(FlakyTriggerEngine::new());
        let jobs = Arc::new(FlakyJobRepository::new());
        let instances = Arc::new(InMemoryJobInstanceRepository::new());
        let measures = Arc::new(InMemoryMeasureProvider::new());
        let probe = Arc::new(ScriptedProbe::default());
        let launcher = Arc::new(ScriptedLauncher::default());

        let context = JobContext::new(
            &config,
            JobDependencies {
                engine: engine.clone(),
                jobs: jobs.clone(),
                instances: instances.clone(),
                measures: measures.clone(),
                probe: probe.clone(),
                launcher: launcher.clone(),
                health_policy: Arc::new(LatestInstanceSucceeded),
            },
        );

        Self {
            config,
            engine,
            jobs,
            instances,
            measures,
            probe,
            launcher,
            context,
        }
    }

    /// Register a measure declaring one connector per name
    pub async fn measure(&self, connectors: &[&str]) -> Measure {
        let measure = Measure::with_connectors("orders_measure", connectors);
        self.measures.insert(measure.clone()).await;
        measure
    }

    /// Add a job with `src`/`tgt` segments against a fresh measure
    pub async fn add_job(&self, name: &str) -> JobDefinition {
        let measure = self.measure(&["src", "tgt"]).await;
        self.context
            .service
            .add_job(JobBuilder::new(name).measure(measure.id).build())
            .await
            .unwrap()
    }

    /// Persisted version of a job, soft-deleted ones included
    pub async fn stored_job(&self, job: &JobDefinition) -> JobDefinition {
        self.jobs.find_by_id(job.id).await.unwrap().unwrap()
    }
}
