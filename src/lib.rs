//! IFC Converter - a worker that turns uploaded IFC building models into GLTF
//!
//! The worker polls a Firestore collection for tasks whose status is
//! `pending`, downloads the referenced IFC file from Cloud Storage, converts
//! it with Blender running in background mode, uploads the `.gltf` (and its
//! `.bin` buffer) under `processed/`, and writes the outcome back on the task.
//!
//! Each collaborator sits behind a trait so the runner can be driven by fakes:
//! - [`store::DocumentStore`] - task documents
//! - [`store::ObjectStore`] - source and converted files
//! - [`converter::Converter`] - the external conversion tool

pub mod converter;
pub mod error;
pub mod store;
pub mod worker;

pub use converter::{BlenderConverter, ConversionJob, Converter, ConverterConfig};
pub use error::{ConverterError, Result};
pub use store::{DocumentStore, ObjectStore, StoreConfig, Task, TaskStatus, TaskUpdate};
pub use worker::{TaskProcessor, TaskRunner, WorkerConfig};
