//! In-memory stand-in for the search daemon, used by the test suite.
//! Supports per-document failure injection so batch error paths get
//! exercised.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde_json::{json, Value};

use super::{CollectionSchema, ImportStatus, SearchClient, SearchQuery};
use crate::common::error::{PipelineError, Result};

#[derive(Default)]
pub struct InMemorySearchClient {
    collections: Mutex<HashMap<String, HashMap<String, Value>>>,
    fail_ids: Mutex<HashSet<String>>,
}

impl InMemorySearchClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any upsert or import of a document with this id will fail.
    pub fn fail_document(&self, id: &str) {
        self.fail_ids.lock().expect("lock").insert(id.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_ids.lock().expect("lock").clear();
    }

    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .expect("lock")
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    pub fn contains(&self, collection: &str, id: &str) -> bool {
        self.collections
            .lock()
            .expect("lock")
            .get(collection)
            .map(|docs| docs.contains_key(id))
            .unwrap_or(false)
    }

    pub fn document(&self, collection: &str, id: &str) -> Option<Value> {
        self.collections
            .lock()
            .expect("lock")
            .get(collection)
            .and_then(|docs| docs.get(id).cloned())
    }

    fn doc_id(document: &Value) -> Result<String> {
        document
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or(PipelineError::SearchIndex {
                message: "document without id".to_string(),
            })
    }
}

#[async_trait::async_trait]
impl SearchClient for InMemorySearchClient {
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.lock().expect("lock").contains_key(name))
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()> {
        self.collections
            .lock()
            .expect("lock")
            .entry(schema.name.clone())
            .or_default();
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections.lock().expect("lock").remove(name);
        Ok(())
    }

    async fn import_documents(
        &self,
        collection: &str,
        documents: Vec<Value>,
    ) -> Result<Vec<ImportStatus>> {
        let mut statuses = Vec::with_capacity(documents.len());
        for document in documents {
            let id = Self::doc_id(&document)?;
            if self.fail_ids.lock().expect("lock").contains(&id) {
                statuses.push(ImportStatus {
                    success: false,
                    error: Some(format!("injected failure for {id}")),
                });
                continue;
            }
            self.collections
                .lock()
                .expect("lock")
                .entry(collection.to_string())
                .or_default()
                .insert(id, document);
            statuses.push(ImportStatus {
                success: true,
                error: None,
            });
        }
        Ok(statuses)
    }

    async fn upsert_document(&self, collection: &str, document: Value) -> Result<()> {
        let id = Self::doc_id(&document)?;
        if self.fail_ids.lock().expect("lock").contains(&id) {
            return Err(PipelineError::SearchIndex {
                message: format!("injected failure for {id}"),
            });
        }
        self.collections
            .lock()
            .expect("lock")
            .entry(collection.to_string())
            .or_default()
            .insert(id, document);
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        if let Some(docs) = self.collections.lock().expect("lock").get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn query(&self, collection: &str, query: &SearchQuery) -> Result<Value> {
        let collections = self.collections.lock().expect("lock");
        let docs = collections.get(collection).cloned().unwrap_or_default();
        let needle = query.q.to_lowercase();
        let hits: Vec<Value> = docs
            .values()
            .filter(|doc| {
                needle.is_empty()
                    || needle == "*"
                    || doc
                        .get("name")
                        .and_then(|n| n.as_str())
                        .map(|n| n.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            })
            .map(|doc| json!({ "document": doc }))
            .collect();
        Ok(json!({ "found": hits.len(), "hits": hits }))
    }

    async fn health(&self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn import_reports_per_document_status_in_order() {
        let client = InMemorySearchClient::new();
        client.fail_document("2");
        let statuses = client
            .import_documents(
                "events",
                vec![
                    json!({"id": "1", "name": "Gnaoua"}),
                    json!({"id": "2", "name": "Timitar"}),
                    json!({"id": "3", "name": "Tanjazz"}),
                ],
            )
            .await
            .unwrap();
        assert_eq!(
            statuses.iter().map(|s| s.success).collect::<Vec<_>>(),
            vec![true, false, true]
        );
        assert_eq!(client.document_count("events"), 2);
    }

    #[tokio::test]
    async fn query_matches_on_name_and_delete_is_idempotent() {
        let client = InMemorySearchClient::new();
        client
            .upsert_document("events", json!({"id": "1", "name": "Festival Gnaoua"}))
            .await
            .unwrap();
        let result = client
            .query(
                "events",
                &SearchQuery {
                    q: "gnaoua".to_string(),
                    query_by: "name".to_string(),
                    page: 1,
                    per_page: 10,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(result["found"], 1);

        client.delete_document("events", "1").await.unwrap();
        client.delete_document("events", "1").await.unwrap();
        assert_eq!(client.document_count("events"), 0);
    }
}
