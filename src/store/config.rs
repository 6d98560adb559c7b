//! Store configuration

use crate::error::{ConverterError, Result};
use crate::store::auth::Credentials;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_STORAGE_URL: &str = "https://storage.googleapis.com";
pub const DEFAULT_DATABASE: &str = "(default)";
pub const DEFAULT_COLLECTION: &str = "tasks";

/// Environment variable names read by `StoreConfig::from_env`
pub mod env {
    pub const PROJECT_ID: &str = "FIREBASE_PROJECT_ID";
    pub const BUCKET: &str = "FIREBASE_STORAGE_BUCKET";
    pub const DATABASE: &str = "FIRESTORE_DATABASE";
    pub const COLLECTION: &str = "TASKS_COLLECTION";
    pub const CREDENTIALS_FILE: &str = "GOOGLE_APPLICATION_CREDENTIALS";
    pub const ACCESS_TOKEN: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";
    pub const FIRESTORE_EMULATOR_HOST: &str = "FIRESTORE_EMULATOR_HOST";
    pub const STORAGE_EMULATOR_HOST: &str = "FIREBASE_STORAGE_EMULATOR_HOST";
}

/// Configuration for the Firestore and Cloud Storage clients
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Google Cloud project owning the Firestore database
    pub project_id: String,

    /// Firestore database id
    pub database: String,

    /// Collection holding task documents
    pub collection: String,

    /// Storage bucket holding uploads and processed output
    pub bucket: String,

    /// Firestore REST base URL (ends in `/v1`)
    pub firestore_url: String,

    /// Cloud Storage base URL
    pub storage_url: String,

    /// Connection timeout for both clients
    pub connect_timeout: Duration,

    pub credentials: Credentials,
}

impl StoreConfig {
    pub fn new(
        project_id: impl Into<String>,
        bucket: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            bucket: bucket.into(),
            firestore_url: DEFAULT_FIRESTORE_URL.to_string(),
            storage_url: DEFAULT_STORAGE_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            credentials,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Emulator hosts, when set, replace the production endpoints and allow
    /// running without credentials.
    pub fn from_env() -> Result<Self> {
        let project_id = required_var(env::PROJECT_ID)?;
        let bucket = required_var(env::BUCKET)?;

        let firestore_emulator = optional_var(env::FIRESTORE_EMULATOR_HOST);
        let storage_emulator = optional_var(env::STORAGE_EMULATOR_HOST);

        let credentials = Credentials::resolve(
            optional_var(env::ACCESS_TOKEN),
            optional_var(env::CREDENTIALS_FILE).map(PathBuf::from),
            firestore_emulator.is_some() || storage_emulator.is_some(),
        )?;

        let mut config = Self::new(project_id, bucket, credentials);
        if let Some(database) = optional_var(env::DATABASE) {
            config.database = database;
        }
        if let Some(collection) = optional_var(env::COLLECTION) {
            config.collection = collection;
        }
        if let Some(host) = firestore_emulator {
            config.firestore_url = emulator_firestore_url(&host);
        }
        if let Some(host) = storage_emulator {
            config.storage_url = emulator_storage_url(&host);
        }

        Ok(config)
    }
}

/// Firestore REST base URL for an emulator `host:port`
pub fn emulator_firestore_url(host: &str) -> String {
    format!("http://{}/v1", host.trim_end_matches('/'))
}

/// Storage base URL for an emulator `host:port`
pub fn emulator_storage_url(host: &str) -> String {
    format!("http://{}", host.trim_end_matches('/'))
}

fn required_var(name: &str) -> Result<String> {
    optional_var(name).ok_or_else(|| ConverterError::ConfigError(format!("{} not set", name)))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
