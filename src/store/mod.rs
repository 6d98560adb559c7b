//! Store module for ifc-converter
//!
//! Provides the document store (Firestore) holding conversion tasks and the
//! object store (Cloud Storage) holding source models and converted output.

pub mod auth;
pub mod config;
pub mod firestore;
pub mod models;
pub mod storage;

pub use auth::{Credentials, TokenProvider};
pub use config::StoreConfig;
pub use firestore::FirestoreClient;
pub use models::*;
pub use storage::CloudStorage;

use crate::error::{ConverterError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Queryable store of task documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All tasks whose `field` equals `value`, in store order
    async fn query_by_field(&self, field: &str, value: &str) -> Result<Vec<Task>>;

    /// Write a terminal status on a task, into the `status_field` the
    /// pending query matches on
    async fn update_task(
        &self,
        task_id: &str,
        status_field: &str,
        update: &TaskUpdate,
    ) -> Result<()>;

    /// Create a new task document and return its id
    async fn create_task(&self, task: &NewTask) -> Result<String>;
}

/// Blob storage addressed by path
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download the object at `path` to `destination`.
    ///
    /// Returns `ConverterError::ObjectNotFound` when there is no such object.
    async fn download(&self, path: &str, destination: &Path) -> Result<()>;

    /// Upload the local file `source` to `path`
    async fn upload(&self, source: &Path, path: &str) -> Result<()>;
}

/// Clients for both stores, sharing one token provider
pub struct StoreClients {
    pub documents: Arc<FirestoreClient>,
    pub objects: Arc<CloudStorage>,
}

/// Build both store clients from configuration
///
/// # Example
/// ```ignore
/// let clients = connect(&StoreConfig::from_env()?)?;
/// ```
pub fn connect(config: &StoreConfig) -> Result<StoreClients> {
    let client = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .build()
        .map_err(|e| ConverterError::ConfigError(format!("HTTP client: {}", e)))?;

    let tokens = Arc::new(TokenProvider::new(
        client.clone(),
        config.credentials.clone(),
    ));

    Ok(StoreClients {
        documents: Arc::new(FirestoreClient::new(
            client.clone(),
            config.clone(),
            Arc::clone(&tokens),
        )),
        objects: Arc::new(CloudStorage::new(client, config.clone(), tokens)),
    })
}

/// Map a non-success response into `HttpStatusError`
pub(crate) async fn check_response(
    response: reqwest::Response,
    url: &str,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ConverterError::HttpStatusError {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}
