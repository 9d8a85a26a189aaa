//! Search projection synchronizer.
//!
//! Sole writer to the `events` collection. Keeps the projection aligned with
//! the catalog: incremental per-event upsert/delete after each commit, and a
//! destructive full rebuild as the recovery path. Never reads the collection
//! to make decisions about the authoritative store.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use moussem_core::catalog::{events, Catalog};
use moussem_core::domain::EventStatus;

use super::{events_schema, EventDocument, SearchClient, COLLECTION_NAME};
use crate::common::error::Result;
use crate::observability::metrics;

/// Statuses that belong in the search index.
pub const INDEXABLE_STATUSES: &[EventStatus] = &[EventStatus::Announced, EventStatus::Confirmed];

const BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionOp {
    Upsert(i64),
    Delete(i64),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RebuildOutcome {
    pub indexed: usize,
    pub errors: usize,
}

pub struct ProjectionSynchronizer {
    catalog: Arc<Catalog>,
    client: Arc<dyn SearchClient>,
    rebuild_in_progress: AtomicBool,
    /// Ops deferred while a rebuild runs, plus failed post-commit hooks
    /// waiting for a retry.
    pending: Mutex<VecDeque<ProjectionOp>>,
}

impl ProjectionSynchronizer {
    pub fn new(catalog: Arc<Catalog>, client: Arc<dyn SearchClient>) -> Self {
        Self {
            catalog,
            client,
            rebuild_in_progress: AtomicBool::new(false),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Create the collection with the declared schema if it is missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        if !self.client.collection_exists(COLLECTION_NAME).await? {
            info!("search collection missing, creating it");
            self.client.create_collection(&events_schema()).await?;
        }
        Ok(())
    }

    /// Drop, recreate and stream every indexable event back in. Incremental
    /// ops arriving meanwhile are parked and replayed afterwards so they are
    /// not clobbered by the snapshot.
    pub async fn full_rebuild(&self, cancel: &CancellationToken) -> Result<RebuildOutcome> {
        self.rebuild_in_progress.store(true, Ordering::SeqCst);
        let outcome = self.rebuild_inner(cancel).await;
        self.rebuild_in_progress.store(false, Ordering::SeqCst);
        if outcome.is_ok() {
            let replayed = self.flush_pending().await?;
            if replayed > 0 {
                debug!(replayed, "replayed projection ops parked during rebuild");
            }
        }
        outcome
    }

    async fn rebuild_inner(&self, cancel: &CancellationToken) -> Result<RebuildOutcome> {
        self.client.delete_collection(COLLECTION_NAME).await?;
        self.client.create_collection(&events_schema()).await?;

        let ids = self
            .catalog
            .with_conn(|conn| events::list_ids_with_status(conn, INDEXABLE_STATUSES))?;
        info!(total = ids.len(), "starting full projection rebuild");

        let mut outcome = RebuildOutcome::default();
        for chunk in ids.chunks(BATCH_SIZE) {
            if cancel.is_cancelled() {
                info!("rebuild cancelled at batch boundary");
                break;
            }
            let mut documents = Vec::with_capacity(chunk.len());
            for &id in chunk {
                match self.catalog.with_conn(|conn| events::load_record(conn, id))? {
                    Some(record) if record.event.status.is_indexable() => {
                        documents.push(EventDocument::from_record(&record).to_value());
                    }
                    _ => {}
                }
            }
            let statuses = self
                .client
                .import_documents(COLLECTION_NAME, documents)
                .await?;
            for status in statuses {
                if status.success {
                    outcome.indexed += 1;
                } else {
                    outcome.errors += 1;
                    warn!(
                        error = status.error.as_deref().unwrap_or("unknown"),
                        "document rejected during rebuild"
                    );
                }
            }
        }
        metrics::projection::rebuild_finished(outcome.indexed, outcome.errors);
        info!(
            indexed = outcome.indexed,
            errors = outcome.errors,
            "full projection rebuild finished"
        );
        Ok(outcome)
    }

    /// Align the document for one event with its catalog row: upsert when
    /// indexable, delete otherwise. Idempotent either way.
    pub async fn upsert_event(&self, event_id: i64) -> Result<()> {
        if self.rebuild_in_progress.load(Ordering::SeqCst) {
            self.enqueue(ProjectionOp::Upsert(event_id));
            return Ok(());
        }
        let record = self
            .catalog
            .with_conn(|conn| events::load_record(conn, event_id))?;
        match record {
            Some(record) if record.event.status.is_indexable() => {
                let document = EventDocument::from_record(&record).to_value();
                self.client.upsert_document(COLLECTION_NAME, document).await?;
                metrics::projection::document_upserted();
            }
            _ => {
                self.client
                    .delete_document(COLLECTION_NAME, &event_id.to_string())
                    .await?;
                metrics::projection::document_deleted();
            }
        }
        Ok(())
    }

    pub async fn delete_event(&self, event_id: i64) -> Result<()> {
        if self.rebuild_in_progress.load(Ordering::SeqCst) {
            self.enqueue(ProjectionOp::Delete(event_id));
            return Ok(());
        }
        self.client
            .delete_document(COLLECTION_NAME, &event_id.to_string())
            .await?;
        metrics::projection::document_deleted();
        Ok(())
    }

    /// Post-commit hook: projection failures must never fail the catalog
    /// transaction that already committed, so errors park the op for retry —
    /// the next flush or full rebuild reconciles.
    pub async fn project_event(&self, event_id: i64) {
        if let Err(e) = self.upsert_event(event_id).await {
            warn!(event_id, error = %e, "projection upsert failed, queued for retry");
            metrics::projection::retry_enqueued();
            self.enqueue(ProjectionOp::Upsert(event_id));
        }
    }

    pub async fn project_delete(&self, event_id: i64) {
        if let Err(e) = self.delete_event(event_id).await {
            warn!(event_id, error = %e, "projection delete failed, queued for retry");
            metrics::projection::retry_enqueued();
            self.enqueue(ProjectionOp::Delete(event_id));
        }
    }

    pub fn enqueue(&self, op: ProjectionOp) {
        self.pending.lock().expect("pending lock").push_back(op);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("pending lock").len()
    }

    /// Apply every parked op. Ops that fail again go back to the queue.
    pub async fn flush_pending(&self) -> Result<usize> {
        let ops: Vec<ProjectionOp> = {
            let mut pending = self.pending.lock().expect("pending lock");
            pending.drain(..).collect()
        };
        let mut applied = 0;
        for op in ops {
            let result = match op {
                ProjectionOp::Upsert(id) => self.upsert_event(id).await,
                ProjectionOp::Delete(id) => self.delete_event(id).await,
            };
            match result {
                Ok(()) => applied += 1,
                Err(e) => {
                    warn!(error = %e, "projection retry failed, keeping op queued");
                    self.enqueue(op);
                }
            }
        }
        Ok(applied)
    }
}
