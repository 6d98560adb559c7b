//! Task runner - main worker loop

use crate::error::{ConverterError, Result};
use crate::store::{DocumentStore, Task, TaskStatus, TaskUpdate};
use crate::worker::{TaskProcessor, WorkerConfig};
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Task runner that polls the document store and processes pending tasks
pub struct TaskRunner {
    documents: Arc<dyn DocumentStore>,
    config: WorkerConfig,
    processor: TaskProcessor,
    shutdown: CancellationToken,
}

impl TaskRunner {
    /// Create a new task runner
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        config: WorkerConfig,
        processor: TaskProcessor,
    ) -> Self {
        Self {
            documents,
            config,
            processor,
            shutdown: CancellationToken::new(),
        }
    }

    /// Get a handle to signal shutdown
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Main worker loop
    ///
    /// Polls for pending tasks and processes them until shutdown is signaled.
    /// Shutdown is observed between poll cycles, never in the middle of a task.
    pub async fn run(&self) -> Result<()> {
        info!("Starting IFC conversion worker...");
        info!("Poll interval: {:?}", self.config.poll_interval);
        info!(
            "Pending predicate: {} == {}",
            self.config.status_field, self.config.pending_value
        );

        loop {
            if self.shutdown.is_cancelled() {
                info!("Shutdown signal received, stopping worker...");
                break;
            }

            match self.run_once().await {
                Ok(0) => {
                    info!(
                        "No pending tasks, sleeping for {:?}",
                        self.config.poll_interval
                    );
                }
                Ok(count) => {
                    info!(
                        "Processed {} task(s), sleeping for {:?}",
                        count, self.config.poll_interval
                    );
                }
                Err(e) => {
                    error!("Main loop error: {}", e);
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping worker...");
                    break;
                }
                _ = sleep(self.config.poll_interval) => {}
            }
        }

        info!("Worker stopped");
        Ok(())
    }

    /// Run a single poll cycle (useful for testing with --once flag)
    ///
    /// Returns the number of tasks that were attempted.
    pub async fn run_once(&self) -> Result<usize> {
        let tasks = self
            .documents
            .query_by_field(&self.config.status_field, &self.config.pending_value)
            .await
            .map_err(|e| ConverterError::PollError(Box::new(e)))?;

        for task in &tasks {
            info!("Processing task: {}", task.id);
            let status = self.process_task(task).await;
            debug_assert!(status.is_terminal(), "task {} left {}", task.id, status);
        }

        Ok(tasks.len())
    }

    /// Drive one task to a terminal status
    ///
    /// Never fails: processing errors become an `error` status, and a failed
    /// status write is logged.
    pub async fn process_task(&self, task: &Task) -> TaskStatus {
        let failure = match self.processor.process(task).await {
            Ok(processed_path) => {
                let update = TaskUpdate::Processed { processed_path };
                match self.finalize(task, &update).await {
                    Ok(()) => {
                        info!("Task {} completed successfully", task.id);
                        return TaskStatus::Processed;
                    }
                    Err(e) => e,
                }
            }
            Err(e) => e,
        };

        error!("Error processing task {}: {}", task.id, failure);
        if let Some(stderr) = failure.diagnostics() {
            error!("Blender error output: {}", stderr);
        }

        let update = TaskUpdate::Error {
            message: failure.to_string(),
        };
        if let Err(e) = self.finalize(task, &update).await {
            error!("{}", e);
        }
        TaskStatus::Error
    }

    async fn finalize(&self, task: &Task, update: &TaskUpdate) -> Result<()> {
        self.documents
            .update_task(&task.id, &self.config.status_field, update)
            .await
            .map_err(|e| {
                warn!("Status write for task {} failed", task.id);
                ConverterError::FinalizeError {
                    task_id: task.id.clone(),
                    source: Box::new(e),
                }
            })
    }
}

/// Setup signal handlers for graceful shutdown
pub fn setup_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => {
                info!("Received shutdown signal, shutting down gracefully...");
                shutdown.cancel();
            }
            Err(e) => {
                error!("Failed to listen for shutdown signals: {}", e);
            }
        }
    });
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
