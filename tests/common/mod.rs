//! In-memory stand-ins for Firestore, Cloud Storage and Blender

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ifc_converter::converter::{ConversionJob, ConversionOutput, Converter};
use ifc_converter::error::{ConverterError, Result};
use ifc_converter::store::{
    fields, DocumentStore, NewTask, ObjectStore, Task, TaskStatus, TaskUpdate,
};
use ifc_converter::worker::{TaskProcessor, TaskRunner, WorkerConfig, WorkerConfigBuilder};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const GLTF_BODY: &str = r#"{"asset":{"version":"2.0"},"buffers":[{"uri":"model.bin"}]}"#;
pub const BIN_BODY: &[u8] = &[0, 1, 2, 3, 4, 5, 6, 7];
pub const IFC_BODY: &str = "ISO-10303-21;\nHEADER;\nENDSEC;\nDATA;\nENDSEC;\nEND-ISO-10303-21;\n";

// ============================================================================
// Document store
// ============================================================================

/// Task documents as raw field maps, the way Firestore holds them
type Document = BTreeMap<String, String>;

#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<Vec<(String, Document)>>,
    updates: Mutex<Vec<(String, TaskUpdate)>>,
    queries: AtomicUsize,
    fail_queries: AtomicBool,
    fail_updates: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            documents: Mutex::new(
                tasks
                    .iter()
                    .map(|task| (task.id.clone(), document_from_task(task)))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    /// A store holding one document with exactly `values` as its fields
    pub fn with_document(id: &str, values: &[(&str, &str)]) -> Self {
        let document = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            documents: Mutex::new(vec![(id.to_string(), document)]),
            ..Default::default()
        }
    }

    pub fn task(&self, id: &str) -> Task {
        task_from_document(id, &self.document(id))
    }

    pub fn document(&self, id: &str) -> Document {
        self.documents
            .lock()
            .unwrap()
            .iter()
            .find(|(doc_id, _)| doc_id == id)
            .map(|(_, doc)| doc.clone())
            .unwrap_or_else(|| panic!("no task {}", id))
    }

    pub fn updates(&self) -> Vec<(String, TaskUpdate)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

fn document_from_task(task: &Task) -> Document {
    let mut doc = Document::new();
    doc.insert(fields::STATUS.to_string(), task.status.to_string());
    let optional = [
        (fields::FILE_PATH, task.file_path.clone()),
        (fields::FILE_NAME, task.file_name.clone()),
        (fields::PROCESSED_PATH, task.processed_path.clone()),
        (fields::ERROR, task.error.clone()),
        (fields::TIMESTAMP, task.timestamp.map(|t| t.to_rfc3339())),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            doc.insert(name.to_string(), value);
        }
    }
    doc
}

fn task_from_document(id: &str, doc: &Document) -> Task {
    let get = |name: &str| doc.get(name).cloned();
    Task {
        id: id.to_string(),
        status: TaskStatus::from(get(fields::STATUS).unwrap_or_default()),
        file_path: get(fields::FILE_PATH),
        file_name: get(fields::FILE_NAME),
        processed_path: get(fields::PROCESSED_PATH),
        error: get(fields::ERROR),
        timestamp: get(fields::TIMESTAMP)
            .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
            .map(|t| t.with_timezone(&Utc)),
    }
}

fn unavailable(url: &str) -> ConverterError {
    ConverterError::HttpStatusError {
        url: url.to_string(),
        status: 503,
        body: "unavailable".to_string(),
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn query_by_field(&self, field: &str, value: &str) -> Result<Vec<Task>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(unavailable("memory://documents:runQuery"));
        }

        Ok(self
            .documents
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, doc)| doc.get(field).map(String::as_str) == Some(value))
            .map(|(id, doc)| task_from_document(id, doc))
            .collect())
    }

    async fn update_task(
        &self,
        task_id: &str,
        status_field: &str,
        update: &TaskUpdate,
    ) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(unavailable(&format!("memory://documents/tasks/{}", task_id)));
        }

        let mut documents = self.documents.lock().unwrap();
        let (_, doc) = documents
            .iter_mut()
            .find(|(id, _)| id == task_id)
            .ok_or_else(|| ConverterError::InvalidDocument(task_id.to_string()))?;

        // Masked fields missing from the values are deleted
        for field in update.field_mask(status_field) {
            doc.remove(field);
        }
        for (field, value) in update.values(status_field) {
            doc.insert(field.to_string(), value);
        }

        self.updates
            .lock()
            .unwrap()
            .push((task_id.to_string(), update.clone()));
        Ok(())
    }

    async fn create_task(&self, new_task: &NewTask) -> Result<String> {
        let mut documents = self.documents.lock().unwrap();
        let id = format!("T{}", documents.len() + 1);
        let task = Task {
            id: id.clone(),
            status: TaskStatus::Pending,
            file_path: Some(new_task.file_path.clone()),
            file_name: new_task.file_name.clone(),
            processed_path: None,
            error: None,
            timestamp: Some(new_task.timestamp),
        };
        documents.push((id.clone(), document_from_task(&task)));
        Ok(id)
    }
}

// ============================================================================
// Object store
// ============================================================================

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    downloads: Mutex<Vec<String>>,
    uploads: Mutex<Vec<String>>,
    fail_uploads_ending_with: Mutex<Option<String>>,
}

impl MemoryObjectStore {
    pub fn with_object(path: &str, contents: &[u8]) -> Self {
        let store = Self::default();
        store
            .objects
            .lock()
            .unwrap()
            .insert(path.to_string(), contents.to_vec());
        store
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(path).cloned()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn fail_uploads_ending_with(&self, suffix: &str) {
        *self.fail_uploads_ending_with.lock().unwrap() = Some(suffix.to_string());
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn download(&self, path: &str, destination: &Path) -> Result<()> {
        self.downloads.lock().unwrap().push(path.to_string());
        let contents = self
            .object(path)
            .ok_or_else(|| ConverterError::ObjectNotFound(path.to_string()))?;
        tokio::fs::write(destination, contents).await?;
        Ok(())
    }

    async fn upload(&self, source: &Path, path: &str) -> Result<()> {
        let failing = self.fail_uploads_ending_with.lock().unwrap().clone();
        if let Some(suffix) = failing {
            if path.ends_with(&suffix) {
                return Err(unavailable(&format!("memory://upload/{}", path)));
            }
        }

        let contents = tokio::fs::read(source).await?;
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), contents);
        self.uploads.lock().unwrap().push(path.to_string());
        Ok(())
    }
}

// ============================================================================
// Converter
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    /// Write the .gltf, and the .bin buffer when `sidecar` is set
    Succeed { sidecar: bool },
    /// Exit 0 without writing anything
    ExitZeroWithoutOutput,
    /// Exit non-zero
    Fail,
    /// Exit 0 after replacing the workspace directory with a plain file, so
    /// the output cannot even be looked up
    ClobberWorkspace,
}

pub struct FakeConverter {
    behaviour: Behaviour,
    jobs: Mutex<Vec<ConversionJob>>,
    sources_seen: Mutex<Vec<Vec<u8>>>,
}

impl FakeConverter {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            jobs: Mutex::new(Vec::new()),
            sources_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn jobs(&self) -> Vec<ConversionJob> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn sources_seen(&self) -> Vec<Vec<u8>> {
        self.sources_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Converter for FakeConverter {
    async fn convert(&self, job: &ConversionJob) -> Result<ConversionOutput> {
        self.jobs.lock().unwrap().push(job.clone());
        let source = tokio::fs::read(&job.source_file).await?;
        self.sources_seen.lock().unwrap().push(source);

        match self.behaviour {
            Behaviour::Succeed { sidecar } => {
                tokio::fs::write(&job.target_file, GLTF_BODY).await?;
                if sidecar {
                    tokio::fs::write(job.sidecar_file(), BIN_BODY).await?;
                }
                Ok(ConversionOutput {
                    exit_code: Some(0),
                    stdout: "Finished glTF 2.0 export".to_string(),
                    stderr: String::new(),
                })
            }
            Behaviour::ExitZeroWithoutOutput => Ok(ConversionOutput {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: "Error: Python: bim add-on not registered".to_string(),
            }),
            Behaviour::ClobberWorkspace => {
                tokio::fs::remove_dir_all(&job.workspace).await?;
                tokio::fs::write(&job.workspace, b"not a directory").await?;
                Ok(ConversionOutput {
                    exit_code: Some(0),
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
            Behaviour::Fail => Err(ConverterError::ConversionError {
                reason: "Blender exited with status 1".to_string(),
                stderr: Some("Traceback (most recent call last): ...".to_string()),
                source: None,
            }),
        }
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub struct Harness {
    pub documents: Arc<MemoryDocumentStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub converter: Arc<FakeConverter>,
    pub workspace_root: tempfile::TempDir,
    pub runner: TaskRunner,
}

impl Harness {
    pub fn new(
        documents: MemoryDocumentStore,
        objects: MemoryObjectStore,
        behaviour: Behaviour,
    ) -> Self {
        Self::with_interval(documents, objects, behaviour, Duration::from_secs(10))
    }

    pub fn with_interval(
        documents: MemoryDocumentStore,
        objects: MemoryObjectStore,
        behaviour: Behaviour,
        poll_interval: Duration,
    ) -> Self {
        Self::with_config(documents, objects, behaviour, |builder| {
            builder.poll_interval(poll_interval)
        })
    }

    /// Harness whose worker config is adjusted by `configure`; the workspace
    /// root is always a fresh temp dir
    pub fn with_config(
        documents: MemoryDocumentStore,
        objects: MemoryObjectStore,
        behaviour: Behaviour,
        configure: impl FnOnce(WorkerConfigBuilder) -> WorkerConfigBuilder,
    ) -> Self {
        let documents = Arc::new(documents);
        let objects = Arc::new(objects);
        let converter = Arc::new(FakeConverter::new(behaviour));
        let workspace_root = tempfile::tempdir().expect("workspace root");

        let config = configure(WorkerConfig::builder())
            .workspace_root(Some(workspace_root.path().to_path_buf()))
            .build();

        let processor = TaskProcessor::new(
            config.clone(),
            objects.clone(),
            converter.clone(),
        );
        let runner = TaskRunner::new(documents.clone(), config, processor);

        Self {
            documents,
            objects,
            converter,
            workspace_root,
            runner,
        }
    }

    /// Entries left under the workspace root
    pub fn leftover_workspaces(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.workspace_root.path())
            .expect("read workspace root")
            .map(|entry| entry.expect("dir entry").path())
            .collect()
    }
}
