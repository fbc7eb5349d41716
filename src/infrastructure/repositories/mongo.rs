//! MongoDB-backed repositories
//!
//! Entities are stored whole in a `body` field. The fields the queries
//! filter and sort on are copied next to it.

use async_trait::async_trait;
use mongodb::{
    bson::{doc, Document},
    options::{FindOptions, IndexOptions, ReplaceOptions},
    Client, Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::domain::entities::{InstanceId, JobDefinition, JobId, JobInstance, JobType};
use crate::domain::repositories::{JobInstanceRepository, JobRepository};
use crate::error::{AppError, Result};

/// Open the configured database
pub async fn connect(config: &DatabaseConfig) -> Result<Database> {
    let client = Client::with_uri_str(&config.mongodb_uri)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to connect to MongoDB: {}", e)))?;
    info!(database = %config.database_name, "Connected to MongoDB");
    Ok(client.database(&config.database_name))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobDocument {
    #[serde(rename = "_id")]
    id: String,
    job_name: String,
    job_type: String,
    deleted: bool,
    created_at_ms: i64,
    body: JobDefinition,
}

impl From<&JobDefinition> for JobDocument {
    fn from(job: &JobDefinition) -> Self {
        Self {
            id: job.id.to_string(),
            job_name: job.job_name.clone(),
            job_type: job.job_type().name().to_string(),
            deleted: job.deleted,
            created_at_ms: job.created_at.timestamp_millis(),
            body: job.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InstanceDocument {
    #[serde(rename = "_id")]
    id: String,
    job_id: String,
    state: String,
    active: bool,
    created_at_ms: i64,
    body: JobInstance,
}

impl From<&JobInstance> for InstanceDocument {
    fn from(instance: &JobInstance) -> Self {
        Self {
            id: instance.id.to_string(),
            job_id: instance.job_id.to_string(),
            state: instance.state.to_string(),
            active: instance.state.is_active(),
            created_at_ms: instance.created_at.timestamp_millis(),
            body: instance.clone(),
        }
    }
}

async fn collect_bodies<T, U>(
    collection: &Collection<T>,
    filter: Document,
    options: Option<FindOptions>,
    into_body: fn(T) -> U,
) -> Result<Vec<U>>
where
    T: serde::de::DeserializeOwned + Unpin + Send + Sync,
{
    let mut cursor = collection
        .find(filter, options)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Query failed: {}", e)))?;

    let mut results = Vec::new();
    while cursor
        .advance()
        .await
        .map_err(|e| AppError::DatabaseError(format!("Cursor error: {}", e)))?
    {
        let document = cursor
            .deserialize_current()
            .map_err(|e| AppError::DatabaseError(format!("Failed to deserialize document: {}", e)))?;
        results.push(into_body(document));
    }
    Ok(results)
}

pub struct MongoJobRepository {
    collection: Collection<JobDocument>,
}

impl MongoJobRepository {
    pub fn new(database: &Database, config: &DatabaseConfig) -> Self {
        Self {
            collection: database.collection::<JobDocument>(&config.job_collection),
        }
    }

    pub async fn create_indexes(&self) -> Result<()> {
        let indexes = vec![
            IndexModel::builder()
                .keys(doc! { "job_name": 1, "deleted": 1 })
                .options(
                    IndexOptions::builder()
                        .name("job_name_deleted_idx".to_string())
                        .build(),
                )
                .build(),
            IndexModel::builder()
                .keys(doc! { "job_type": 1, "deleted": 1 })
                .build(),
        ];

        self.collection
            .create_indexes(indexes, None)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create indexes: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl JobRepository for MongoJobRepository {
    async fn save(&self, job: &JobDefinition) -> Result<JobDefinition> {
        let document = JobDocument::from(job);
        let options = ReplaceOptions::builder().upsert(true).build();
        self.collection
            .replace_one(doc! { "_id": document.id.clone() }, &document, options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to save job: {}", e)))?;
        debug!(job_id = %job.id, "Saved job");
        Ok(job.clone())
    }

    async fn remove(&self, job_id: JobId) -> Result<()> {
        self.collection
            .delete_one(doc! { "_id": job_id.to_string() }, None)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to remove job: {}", e)))?;
        Ok(())
    }

    async fn find_by_id(&self, job_id: JobId) -> Result<Option<JobDefinition>> {
        let document = self
            .collection
            .find_one(doc! { "_id": job_id.to_string() }, None)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to find job by id: {}", e)))?;
        Ok(document.map(|d| d.body))
    }

    async fn find_alive_by_id(&self, job_id: JobId) -> Result<Option<JobDefinition>> {
        let document = self
            .collection
            .find_one(doc! { "_id": job_id.to_string(), "deleted": false }, None)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to find job by id: {}", e)))?;
        Ok(document.map(|d| d.body))
    }

    async fn find_alive_by_name(&self, job_name: &str) -> Result<Vec<JobDefinition>> {
        collect_bodies(
            &self.collection,
            doc! { "job_name": job_name, "deleted": false },
            None,
            |d: JobDocument| d.body,
        )
        .await
    }

    async fn find_alive(&self, job_type: Option<JobType>) -> Result<Vec<JobDefinition>> {
        let mut filter = doc! { "deleted": false };
        if let Some(job_type) = job_type {
            filter.insert("job_type", job_type.name());
        }
        let options = FindOptions::builder()
            .sort(doc! { "created_at_ms": 1 })
            .build();
        collect_bodies(&self.collection, filter, Some(options), |d: JobDocument| d.body).await
    }

    async fn count_alive_by_name(&self, job_name: &str) -> Result<u64> {
        self.collection
            .count_documents(doc! { "job_name": job_name, "deleted": false }, None)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to count jobs: {}", e)))
    }
}

pub struct MongoJobInstanceRepository {
    collection: Collection<InstanceDocument>,
}

impl MongoJobInstanceRepository {
    pub fn new(database: &Database, config: &DatabaseConfig) -> Self {
        Self {
            collection: database.collection::<InstanceDocument>(&config.instance_collection),
        }
    }

    pub async fn create_indexes(&self) -> Result<()> {
        let indexes = vec![
            IndexModel::builder()
                .keys(doc! { "job_id": 1, "created_at_ms": -1 })
                .options(
                    IndexOptions::builder()
                        .name("job_created_idx".to_string())
                        .build(),
                )
                .build(),
            IndexModel::builder().keys(doc! { "active": 1 }).build(),
        ];

        self.collection
            .create_indexes(indexes, None)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create indexes: {}", e)))?;
        Ok(())
    }

    fn newest_first() -> FindOptions {
        FindOptions::builder()
            .sort(doc! { "created_at_ms": -1 })
            .build()
    }
}

#[async_trait]
impl JobInstanceRepository for MongoJobInstanceRepository {
    async fn save(&self, instance: &JobInstance) -> Result<JobInstance> {
        let document = InstanceDocument::from(instance);
        let options = ReplaceOptions::builder().upsert(true).build();
        self.collection
            .replace_one(doc! { "_id": document.id.clone() }, &document, options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to save job instance: {}", e)))?;
        debug!(instance_id = %instance.id, state = %instance.state, "Saved job instance");
        Ok(instance.clone())
    }

    async fn find_by_id(&self, instance_id: InstanceId) -> Result<Option<JobInstance>> {
        let document = self
            .collection
            .find_one(doc! { "_id": instance_id.to_string() }, None)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to find job instance by id: {}", e))
            })?;
        Ok(document.map(|d| d.body))
    }

    async fn find_by_job_id(&self, job_id: JobId) -> Result<Vec<JobInstance>> {
        collect_bodies(
            &self.collection,
            doc! { "job_id": job_id.to_string() },
            Some(Self::newest_first()),
            |d: InstanceDocument| d.body,
        )
        .await
    }

    async fn find_page(&self, job_id: JobId, page: usize, size: usize) -> Result<Vec<JobInstance>> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at_ms": -1 })
            .skip(page.saturating_mul(size) as u64)
            .limit(size as i64)
            .build();
        collect_bodies(
            &self.collection,
            doc! { "job_id": job_id.to_string() },
            Some(options),
            |d: InstanceDocument| d.body,
        )
        .await
    }

    async fn find_latest(&self, job_id: JobId) -> Result<Option<JobInstance>> {
        let options = mongodb::options::FindOneOptions::builder()
            .sort(doc! { "created_at_ms": -1 })
            .build();
        let document = self
            .collection
            .find_one(doc! { "job_id": job_id.to_string() }, options)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to find latest job instance: {}", e))
            })?;
        Ok(document.map(|d| d.body))
    }

    async fn find_active(&self) -> Result<Vec<JobInstance>> {
        collect_bodies(
            &self.collection,
            doc! { "active": true },
            None,
            |d: InstanceDocument| d.body,
        )
        .await
    }
}
