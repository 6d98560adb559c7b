//! Task processor for handling individual conversion tasks

use crate::converter::{ConversionJob, Converter, SIDECAR_EXTENSION};
use crate::error::{ConverterError, Result};
use crate::store::{fields, ObjectStore, Task};
use crate::worker::WorkerConfig;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Extension of the primary converted artifact
const TARGET_EXTENSION: &str = "gltf";

/// Task processor that fetches, converts and stores one model
pub struct TaskProcessor {
    config: WorkerConfig,
    objects: Arc<dyn ObjectStore>,
    converter: Arc<dyn Converter>,
}

impl TaskProcessor {
    /// Create a new task processor
    pub fn new(
        config: WorkerConfig,
        objects: Arc<dyn ObjectStore>,
        converter: Arc<dyn Converter>,
    ) -> Self {
        Self {
            config,
            objects,
            converter,
        }
    }

    /// Process a single task
    ///
    /// Returns the object path of the converted model on success. The task's
    /// workspace is removed before this returns, whatever the outcome.
    pub async fn process(&self, task: &Task) -> Result<String> {
        let workspace = self.create_workspace()?;
        debug!("Workspace for task {}: {}", task.id, workspace.path().display());

        let result = self.process_in(task, workspace.path()).await;

        let path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            warn!("Failed to remove workspace {}: {}", path.display(), e);
        }

        result
    }

    fn create_workspace(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("ifc-task-");
        let dir = match &self.config.workspace_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    async fn process_in(&self, task: &Task, workspace: &Path) -> Result<String> {
        let job = ConversionJob::in_workspace(workspace);

        // Step 1: Fetch the source model
        self.fetch(task, &job).await?;

        // Step 2: Convert
        self.convert(&job).await?;

        // Step 3: Store the converted model
        let processed_path = self.config.processed_path(&task.id, TARGET_EXTENSION);
        self.objects
            .upload(&job.target_file, &processed_path)
            .await
            .map_err(|e| ConverterError::StoreError {
                path: processed_path.clone(),
                source: Box::new(e),
            })?;

        // Step 4: Store the buffer file when the export produced one
        self.store_sidecar(task, &job).await;

        Ok(processed_path)
    }

    async fn fetch(&self, task: &Task, job: &ConversionJob) -> Result<()> {
        let file_path = task
            .file_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ConverterError::FetchError {
                path: format!("for task {}", task.id),
                source: Box::new(ConverterError::MissingField(fields::FILE_PATH)),
            })?;

        let fetch_error = |source: ConverterError| ConverterError::FetchError {
            path: file_path.to_string(),
            source: Box::new(source),
        };

        self.objects
            .download(file_path, &job.source_file)
            .await
            .map_err(fetch_error)?;

        let downloaded = tokio::fs::try_exists(&job.source_file)
            .await
            .map_err(|e| fetch_error(e.into()))?;
        if !downloaded {
            return Err(fetch_error(ConverterError::FsError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no local file at {} after download", job.source_file.display()),
            ))));
        }

        info!("File downloaded to: {}", job.source_file.display());
        Ok(())
    }

    async fn convert(&self, job: &ConversionJob) -> Result<()> {
        let output = self.converter.convert(job).await.map_err(|e| match e {
            ConverterError::ConversionError { .. } => e,
            other => ConverterError::ConversionError {
                reason: other.to_string(),
                stderr: None,
                source: Some(Box::new(other)),
            },
        })?;

        // A zero exit status does not guarantee output was written
        let generated = tokio::fs::try_exists(&job.target_file)
            .await
            .map_err(|e| ConverterError::ConversionError {
                reason: format!("Cannot check {}: {}", job.target_file.display(), e),
                stderr: Some(output.stderr.clone()),
                source: Some(Box::new(e.into())),
            })?;
        if !generated {
            return Err(ConverterError::ConversionError {
                reason: format!("GLTF not generated at {}", job.target_file.display()),
                stderr: Some(output.stderr),
                source: None,
            });
        }

        info!("Converted model written to: {}", job.target_file.display());
        Ok(())
    }

    async fn store_sidecar(&self, task: &Task, job: &ConversionJob) {
        let sidecar = job.sidecar_file();
        match tokio::fs::try_exists(&sidecar).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("No sidecar file for task {}", task.id);
                return;
            }
            Err(e) => {
                warn!("Cannot check sidecar {}: {}", sidecar.display(), e);
                return;
            }
        }

        let sidecar_path = self.config.processed_path(&task.id, SIDECAR_EXTENSION);
        if let Err(e) = self.objects.upload(&sidecar, &sidecar_path).await {
            warn!("Sidecar upload to {} failed: {}", sidecar_path, e);
        }
    }
}
