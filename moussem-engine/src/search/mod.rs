//! Search engine integration.
//!
//! The engine daemon (a Typesense-compatible server) lives behind the
//! [`SearchClient`] trait: collection management, batch import with
//! per-document status, single-document upsert/delete, query and health.
//! The synchronizer in [`sync`] is the only writer to the collection.

pub mod document;
pub mod http;
pub mod memory;
pub mod schema;
pub mod sync;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::error::Result;

pub use document::EventDocument;
pub use http::HttpSearchClient;
pub use memory::InMemorySearchClient;
pub use schema::{events_schema, CollectionSchema, FieldSchema, COLLECTION_NAME};
pub use sync::{ProjectionOp, ProjectionSynchronizer, RebuildOutcome};

/// Per-document outcome of a batch import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportStatus {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Query surface the read API consumes. The pipeline itself never queries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchQuery {
    pub q: String,
    pub query_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facet_by: Option<String>,
    pub page: u32,
    pub per_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight_full_fields: Option<String>,
}

#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn collection_exists(&self, name: &str) -> Result<bool>;
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()>;
    /// Dropping a collection that does not exist is not an error.
    async fn delete_collection(&self, name: &str) -> Result<()>;
    /// Batch upsert; returns one status per submitted document, in order.
    async fn import_documents(
        &self,
        collection: &str,
        documents: Vec<serde_json::Value>,
    ) -> Result<Vec<ImportStatus>>;
    async fn upsert_document(&self, collection: &str, document: serde_json::Value) -> Result<()>;
    /// Deleting a missing document is not an error.
    async fn delete_document(&self, collection: &str, id: &str) -> Result<()>;
    async fn query(&self, collection: &str, query: &SearchQuery) -> Result<serde_json::Value>;
    async fn health(&self) -> Result<bool>;
}
