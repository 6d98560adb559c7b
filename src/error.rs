//! Error types for ifc-converter

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConverterError {
    #[error("Failed to fetch source file {path}: {source}")]
    FetchError {
        path: String,
        #[source]
        source: Box<ConverterError>,
    },

    #[error("Conversion failed: {reason}")]
    ConversionError {
        reason: String,
        /// Captured stderr of the converter process, if it ran
        stderr: Option<String>,
        #[source]
        source: Option<Box<ConverterError>>,
    },

    #[error("Failed to store {path}: {source}")]
    StoreError {
        path: String,
        #[source]
        source: Box<ConverterError>,
    },

    #[error("Failed to finalize task {task_id}: {source}")]
    FinalizeError {
        task_id: String,
        #[source]
        source: Box<ConverterError>,
    },

    #[error("Failed to poll pending tasks: {0}")]
    PollError(#[source] Box<ConverterError>),

    #[error("task has no {0}")]
    MissingField(&'static str),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("HTTP error {status} for URL: {url}: {body}")]
    HttpStatusError {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Request failed: {url}")]
    RequestError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FsError(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("Token signing error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl ConverterError {
    /// Diagnostic output captured from the converter, when there is any
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            ConverterError::ConversionError {
                stderr: Some(stderr),
                ..
            } if !stderr.trim().is_empty() => Some(stderr),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConverterError>;
