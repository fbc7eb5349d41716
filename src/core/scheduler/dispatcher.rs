//! Background loop turning due triggers into executions

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Firing, TriggerEngine};
use crate::error::{AppError, Result};

/// Executes the unit behind a firing
#[async_trait]
pub trait FiringHandler: Send + Sync {
    async fn handle(&self, firing: &Firing) -> Result<()>;

    /// Periodic housekeeping between firings
    async fn maintain(&self) -> Result<()> {
        Ok(())
    }
}

/// Tick loop polling the engine for due firings. Each firing runs on its own
/// task; the engine keeps the unit blocked until the task completes it.
pub struct TriggerDispatcher {
    engine: Arc<dyn TriggerEngine>,
    handler: Arc<dyn FiringHandler>,
    tick_interval: Duration,
    maintenance_interval: Duration,
    shutdown: Arc<Notify>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TriggerDispatcher {
    pub fn new(
        engine: Arc<dyn TriggerEngine>,
        handler: Arc<dyn FiringHandler>,
        tick_interval: Duration,
        maintenance_interval: Duration,
    ) -> Self {
        Self {
            engine,
            handler,
            tick_interval,
            maintenance_interval,
            shutdown: Arc::new(Notify::new()),
            worker: Mutex::new(None),
        }
    }

    /// Hand out every currently due firing and run them to completion
    pub async fn dispatch_due(&self) -> Result<usize> {
        let firings = self.engine.fire_due(Utc::now()).await?;
        let count = firings.len();
        let mut tasks = Vec::with_capacity(count);
        for firing in firings {
            tasks.push(Self::spawn_firing(
                self.engine.clone(),
                self.handler.clone(),
                firing,
            ));
        }
        for task in tasks {
            if let Err(e) = task.await {
                error!("Firing task panicked: {}", e);
            }
        }
        Ok(count)
    }

    fn spawn_firing(
        engine: Arc<dyn TriggerEngine>,
        handler: Arc<dyn FiringHandler>,
        firing: Firing,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            debug!(trigger = %firing.trigger_key, job = %firing.detail.key, "Firing trigger");
            if let Err(e) = handler.handle(&firing).await {
                error!(trigger = %firing.trigger_key, "Job execution failed: {}", e);
            }
            if let Err(e) = engine.complete_firing(&firing).await {
                error!(trigger = %firing.trigger_key, "Failed to complete firing: {}", e);
            }
        })
    }

    /// Start the background loop
    pub async fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return Err(AppError::SchedulerError(
                "Trigger dispatcher is already running".to_string(),
            ));
        }

        let engine = self.engine.clone();
        let handler = self.handler.clone();
        let shutdown = self.shutdown.clone();
        let tick_interval = self.tick_interval;
        let maintenance_interval = self.maintenance_interval;

        *worker = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(tick_interval);
            let mut maintenance = tokio::time::interval(maintenance_interval);
            loop {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    _ = tick.tick() => {
                        match engine.fire_due(Utc::now()).await {
                            Ok(firings) => {
                                for firing in firings {
                                    Self::spawn_firing(engine.clone(), handler.clone(), firing);
                                }
                            }
                            Err(e) => error!("Error polling due triggers: {}", e),
                        }
                    }
                    _ = maintenance.tick() => {
                        if let Err(e) = handler.maintain().await {
                            warn!("Scheduler maintenance failed: {}", e);
                        }
                    }
                }
            }
        }));

        info!("Trigger dispatcher started");
        Ok(())
    }

    /// Stop the background loop; firings already spawned run to completion
    pub async fn stop(&self) {
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            self.shutdown.notify_one();
            if let Err(e) = handle.await {
                error!("Trigger dispatcher task failed: {}", e);
            }
            info!("Trigger dispatcher stopped");
        }
    }
}
