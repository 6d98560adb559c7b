//! Firestore REST client for task documents

use crate::error::{ConverterError, Result};
use crate::store::models::{fields, NewTask, Task, TaskStatus, TaskUpdate};
use crate::store::{check_response, DocumentStore, StoreConfig, TokenProvider};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Firestore client scoped to one project, database and collection
pub struct FirestoreClient {
    client: reqwest::Client,
    config: StoreConfig,
    tokens: Arc<TokenProvider>,
}

/// A document as returned by the REST API
#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

/// One element of a `runQuery` response stream
#[derive(Debug, Deserialize)]
struct RunQueryItem {
    #[serde(default)]
    document: Option<Document>,
}

impl FirestoreClient {
    pub fn new(client: reqwest::Client, config: StoreConfig, tokens: Arc<TokenProvider>) -> Self {
        Self {
            client,
            config,
            tokens,
        }
    }

    /// `{base}/projects/{project}/databases/{database}/{segments...}`
    fn database_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.config.firestore_url)?;
        url.path_segments_mut()
            .map_err(|_| {
                ConverterError::ConfigError(format!(
                    "Invalid Firestore URL: {}",
                    self.config.firestore_url
                ))
            })?
            .pop_if_empty()
            .extend([
                "projects",
                self.config.project_id.as_str(),
                "databases",
                self.config.database.as_str(),
            ])
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &Url) -> Result<reqwest::Response> {
        let token = self.tokens.token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ConverterError::RequestError {
                url: url.to_string(),
                source: e,
            })?;
        check_response(response, url.as_str()).await
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn query_by_field(&self, field: &str, value: &str) -> Result<Vec<Task>> {
        let url = self.database_url(&["documents:runQuery"])?;
        let body = equality_query(&self.config.collection, field, value);

        let response = self
            .send(self.client.post(url.clone()).json(&body), &url)
            .await?;
        let items: Vec<RunQueryItem> = response
            .json()
            .await
            .map_err(|e| ConverterError::RequestError {
                url: url.to_string(),
                source: e,
            })?;

        let tasks = items
            .into_iter()
            .filter_map(|item| item.document)
            .map(|doc| task_from_document(&doc))
            .collect::<Result<Vec<_>>>()?;

        debug!("Query {} == {} returned {} task(s)", field, value, tasks.len());
        Ok(tasks)
    }

    async fn update_task(
        &self,
        task_id: &str,
        status_field: &str,
        update: &TaskUpdate,
    ) -> Result<()> {
        let collection = self.config.collection.as_str();
        let mut url = self.database_url(&["documents", collection, task_id])?;
        {
            let mut query = url.query_pairs_mut();
            for field in update.field_mask(status_field) {
                query.append_pair("updateMask.fieldPaths", field);
            }
            query.append_pair("currentDocument.exists", "true");
        }

        let body = json!({ "fields": encode_fields(&update.values(status_field)) });
        self.send(self.client.patch(url.clone()).json(&body), &url)
            .await?;

        debug!("Task {} updated to {}", task_id, update.status());
        Ok(())
    }

    async fn create_task(&self, task: &NewTask) -> Result<String> {
        let url = self.database_url(&["documents", self.config.collection.as_str()])?;

        let mut values = vec![
            (fields::FILE_PATH, task.file_path.clone()),
            (fields::STATUS, TaskStatus::Pending.to_string()),
        ];
        if let Some(name) = &task.file_name {
            values.push((fields::FILE_NAME, name.clone()));
        }
        let mut encoded = encode_fields(&values);
        encoded.insert(
            fields::TIMESTAMP.to_string(),
            json!({ "timestampValue": task.timestamp.to_rfc3339() }),
        );

        let response = self
            .send(
                self.client
                    .post(url.clone())
                    .json(&json!({ "fields": encoded })),
                &url,
            )
            .await?;
        let doc: Document = response
            .json()
            .await
            .map_err(|e| ConverterError::RequestError {
                url: url.to_string(),
                source: e,
            })?;

        Ok(document_id(&doc.name).to_string())
    }
}

/// `runQuery` body selecting documents where `field == value`
fn equality_query(collection: &str, field: &str, value: &str) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": field },
                    "op": "EQUAL",
                    "value": { "stringValue": value }
                }
            }
        }
    })
}

fn encode_fields(values: &[(&str, String)]) -> Map<String, Value> {
    values
        .iter()
        .map(|(name, value)| (name.to_string(), json!({ "stringValue": value })))
        .collect()
}

/// Last path segment of a document name
fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn string_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields
        .get(name)
        .and_then(|v| v.get("stringValue"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn timestamp_field(fields: &Map<String, Value>, name: &str) -> Option<DateTime<Utc>> {
    fields
        .get(name)
        .and_then(|v| v.get("timestampValue"))
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn task_from_document(doc: &Document) -> Result<Task> {
    let id = document_id(&doc.name);
    if id.is_empty() {
        return Err(ConverterError::InvalidDocument(format!(
            "document without id: {}",
            doc.name
        )));
    }

    let status = string_field(&doc.fields, fields::STATUS)
        .map(TaskStatus::from)
        .unwrap_or_else(|| TaskStatus::Other(String::new()));

    Ok(Task {
        id: id.to_string(),
        status,
        file_path: string_field(&doc.fields, fields::FILE_PATH),
        file_name: string_field(&doc.fields, fields::FILE_NAME),
        processed_path: string_field(&doc.fields, fields::PROCESSED_PATH),
        error: string_field(&doc.fields, fields::ERROR),
        timestamp: timestamp_field(&doc.fields, fields::TIMESTAMP),
    })
}
