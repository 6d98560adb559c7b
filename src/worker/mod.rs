//! Worker module for polling and processing conversion tasks
//!
//! This module provides:
//! - TaskRunner: Main worker loop that polls for pending tasks
//! - TaskProcessor: Processes individual tasks (download + convert + upload)
//! - WorkerConfig: Configuration for the worker

pub mod config;
pub mod processor;
pub mod task_runner;

pub use config::{WorkerConfig, WorkerConfigBuilder};
pub use processor::TaskProcessor;
pub use task_runner::{setup_signal_handler, TaskRunner};
