//! Typesense-compatible REST client.

use std::time::Duration;

use serde_json::Value;

use super::{CollectionSchema, ImportStatus, SearchClient, SearchQuery};
use crate::common::error::{PipelineError, Result};

pub struct HttpSearchClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

const API_KEY_HEADER: &str = "X-TYPESENSE-API-KEY";

impl HttpSearchClient {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::SearchIndex {
                message: format!("building search client: {e}"),
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn check(&self, response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(PipelineError::SearchIndex {
            message: format!("{context}: HTTP {status}: {body}"),
        })
    }

    fn transport(context: &str, err: reqwest::Error) -> PipelineError {
        PipelineError::SearchIndex {
            message: format!("{context}: {err}"),
        }
    }
}

#[async_trait::async_trait]
impl SearchClient for HttpSearchClient {
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let response = self
            .client
            .get(self.url(&format!("/collections/{name}")))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| Self::transport("retrieve collection", e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        self.check(response, "retrieve collection").await?;
        Ok(true)
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()> {
        let response = self
            .client
            .post(self.url("/collections"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(schema)
            .send()
            .await
            .map_err(|e| Self::transport("create collection", e))?;
        self.check(response, "create collection").await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/collections/{name}")))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| Self::transport("delete collection", e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        self.check(response, "delete collection").await?;
        Ok(())
    }

    async fn import_documents(
        &self,
        collection: &str,
        documents: Vec<Value>,
    ) -> Result<Vec<ImportStatus>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let mut body = String::new();
        for document in &documents {
            body.push_str(&serde_json::to_string(document)?);
            body.push('\n');
        }
        let response = self
            .client
            .post(self.url(&format!(
                "/collections/{collection}/documents/import?action=upsert"
            )))
            .header(API_KEY_HEADER, &self.api_key)
            .body(body)
            .send()
            .await
            .map_err(|e| Self::transport("import documents", e))?;
        let response = self.check(response, "import documents").await?;
        let text = response
            .text()
            .await
            .map_err(|e| Self::transport("import response", e))?;
        // One JSON status object per line, in submission order.
        let mut statuses = Vec::with_capacity(documents.len());
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let status: ImportStatus =
                serde_json::from_str(line).unwrap_or_else(|_| ImportStatus {
                    success: false,
                    error: Some(format!("unparseable import status: {line}")),
                });
            statuses.push(status);
        }
        Ok(statuses)
    }

    async fn upsert_document(&self, collection: &str, document: Value) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/collections/{collection}/documents?action=upsert")))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&document)
            .send()
            .await
            .map_err(|e| Self::transport("upsert document", e))?;
        self.check(response, "upsert document").await?;
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/collections/{collection}/documents/{id}")))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| Self::transport("delete document", e))?;
        // Missing documents are already in the desired state.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        self.check(response, "delete document").await?;
        Ok(())
    }

    async fn query(&self, collection: &str, query: &SearchQuery) -> Result<Value> {
        let response = self
            .client
            .get(self.url(&format!("/collections/{collection}/documents/search")))
            .header(API_KEY_HEADER, &self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| Self::transport("query", e))?;
        let response = self.check(response, "query").await?;
        response
            .json()
            .await
            .map_err(|e| Self::transport("query response", e))
    }

    async fn health(&self) -> Result<bool> {
        let response = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(|e| Self::transport("health", e))?;
        Ok(response.status().is_success())
    }
}
