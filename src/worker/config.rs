//! Worker configuration

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between poll cycles
    pub poll_interval: Duration,

    /// Field matched when looking for pending tasks
    pub status_field: String,

    /// Value of `status_field` that marks a task as pending
    pub pending_value: String,

    /// Object store prefix for converted output
    pub processed_prefix: String,

    /// Parent directory for per-task workspaces (system temp dir if unset)
    pub workspace_root: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            status_field: "status".to_string(),
            pending_value: "pending".to_string(),
            processed_prefix: "processed".to_string(),
            workspace_root: None,
        }
    }
}

impl WorkerConfig {
    /// Create a new config builder
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }

    /// Object path for the converted output of `task_id` with `extension`
    pub fn processed_path(&self, task_id: &str, extension: &str) -> String {
        let prefix = self.processed_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            format!("{}.{}", task_id, extension)
        } else {
            format!("{}/{}.{}", prefix, task_id, extension)
        }
    }
}

/// Builder for WorkerConfig
#[derive(Default)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    /// Set poll interval
    pub fn poll_interval(mut self, duration: Duration) -> Self {
        self.config.poll_interval = duration;
        self
    }

    /// Set poll interval in seconds
    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.poll_interval = Duration::from_secs(secs);
        self
    }

    /// Set the query predicate selecting pending tasks
    pub fn pending_predicate(mut self, field: &str, value: &str) -> Self {
        self.config.status_field = field.to_string();
        self.config.pending_value = value.to_string();
        self
    }

    /// Set processed output prefix
    pub fn processed_prefix(mut self, prefix: &str) -> Self {
        self.config.processed_prefix = prefix.to_string();
        self
    }

    /// Set workspace parent directory
    pub fn workspace_root(mut self, root: Option<PathBuf>) -> Self {
        self.config.workspace_root = root;
        self
    }

    /// Build the config
    pub fn build(self) -> WorkerConfig {
        self.config
    }
}
