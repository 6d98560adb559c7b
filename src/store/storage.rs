//! Cloud Storage client for source models and converted output

use crate::error::{ConverterError, Result};
use crate::store::{check_response, ObjectStore, StoreConfig, TokenProvider};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

/// Cloud Storage JSON API client bound to one bucket
pub struct CloudStorage {
    client: reqwest::Client,
    config: StoreConfig,
    tokens: Arc<TokenProvider>,
}

impl CloudStorage {
    pub fn new(client: reqwest::Client, config: StoreConfig, tokens: Arc<TokenProvider>) -> Self {
        Self {
            client,
            config,
            tokens,
        }
    }

    /// Media download URL; the object name is a single encoded segment
    fn download_url(&self, path: &str) -> Result<Url> {
        let mut url = self.base_url()?;
        url.path_segments_mut()
            .map_err(|_| self.invalid_base())?
            .pop_if_empty()
            .extend(["storage", "v1", "b", self.config.bucket.as_str(), "o", path]);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    /// Simple (single request) media upload URL
    fn upload_url(&self, path: &str) -> Result<Url> {
        let mut url = self.base_url()?;
        url.path_segments_mut()
            .map_err(|_| self.invalid_base())?
            .pop_if_empty()
            .extend(["upload", "storage", "v1", "b", self.config.bucket.as_str(), "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", path);
        Ok(url)
    }

    fn base_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.config.storage_url)?)
    }

    fn invalid_base(&self) -> ConverterError {
        ConverterError::ConfigError(format!("Invalid storage URL: {}", self.config.storage_url))
    }
}

#[async_trait]
impl ObjectStore for CloudStorage {
    async fn download(&self, path: &str, destination: &Path) -> Result<()> {
        let url = self.download_url(path)?;
        let token = self.tokens.token().await?;

        let response = self
            .client
            .get(url.clone())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ConverterError::RequestError {
                url: url.to_string(),
                source: e,
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ConverterError::ObjectNotFound(path.to_string()));
        }
        let mut response = check_response(response, url.as_str()).await?;

        let mut file = tokio::fs::File::create(destination).await?;
        let mut written = 0usize;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ConverterError::RequestError {
                url: url.to_string(),
                source: e,
            })?
        {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;

        info!("Downloaded {} ({} bytes) to {}", path, written, destination.display());
        Ok(())
    }

    async fn upload(&self, source: &Path, path: &str) -> Result<()> {
        let url = self.upload_url(path)?;
        let body = tokio::fs::read(source).await?;
        let size = body.len();
        let token = self.tokens.token().await?;

        let response = self
            .client
            .post(url.clone())
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, content_type(path))
            .body(body)
            .send()
            .await
            .map_err(|e| ConverterError::RequestError {
                url: url.to_string(),
                source: e,
            })?;
        check_response(response, url.as_str()).await?;

        debug!("Uploaded {} bytes from {}", size, source.display());
        info!("Uploaded {}", path);
        Ok(())
    }
}

/// Content type stored with an uploaded object
pub fn content_type(path: &str) -> &'static str {
    match Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("gltf") => "model/gltf+json",
        Some("glb") => "model/gltf-binary",
        Some("ifc") => "application/x-step",
        _ => "application/octet-stream",
    }
}
