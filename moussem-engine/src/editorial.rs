//! Editorial command handler: the six human-initiated mutations, each
//! applied in one transaction with an append-only audit row, followed by
//! the matching projection update.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::info;

use moussem_core::catalog::{audit, events, fingerprints, sources as source_rows, Catalog};
use moussem_core::domain::{Event, EventStatus};
use moussem_core::CatalogError;

use crate::common::error::{PipelineError, Result};
use crate::confidence::ConfidenceScorer;
use crate::observability::metrics;
use crate::search::ProjectionSynchronizer;

pub struct EditorialHandler {
    catalog: Arc<Catalog>,
    sync: Arc<ProjectionSynchronizer>,
    /// Actors allowed to issue commands. Empty means unrestricted (dev).
    allowlist: Vec<String>,
}

impl EditorialHandler {
    pub fn new(
        catalog: Arc<Catalog>,
        sync: Arc<ProjectionSynchronizer>,
        allowlist: Vec<String>,
    ) -> Self {
        Self {
            catalog,
            sync,
            allowlist,
        }
    }

    fn authorize(&self, actor: &str) -> Result<()> {
        if actor.trim().is_empty() {
            return Err(PipelineError::Validation {
                message: "actor is required".to_string(),
            });
        }
        if !self.allowlist.is_empty() && !self.allowlist.iter().any(|a| a == actor) {
            return Err(PipelineError::Validation {
                message: format!("actor '{actor}' is not on the admin allowlist"),
            });
        }
        Ok(())
    }

    fn load_event(conn: &rusqlite::Connection, event_id: i64) -> Result<Event> {
        events::get(conn, event_id)?
            .ok_or_else(|| CatalogError::NotFound(format!("event {event_id}")).into())
    }

    pub async fn verify(
        &self,
        event_id: i64,
        flag: bool,
        actor: &str,
        notes: Option<String>,
    ) -> Result<()> {
        self.authorize(actor)?;
        let now = Utc::now();
        self.catalog.with_tx(|tx| {
            Self::load_event(tx, event_id)?;
            events::set_verified(tx, event_id, flag, now)?;
            audit::insert_action(
                tx,
                "verify",
                event_id,
                actor,
                &json!({ "is_verified": flag, "notes": notes }),
                now,
            )?;
            Ok::<_, PipelineError>(())
        })?;
        metrics::editorial::action("verify");
        self.sync.project_event(event_id).await;
        Ok(())
    }

    pub async fn pin(
        &self,
        event_id: i64,
        flag: bool,
        actor: &str,
        reason: Option<String>,
    ) -> Result<()> {
        self.authorize(actor)?;
        let now = Utc::now();
        self.catalog.with_tx(|tx| {
            Self::load_event(tx, event_id)?;
            events::set_pinned(tx, event_id, flag, now)?;
            audit::insert_action(
                tx,
                "pin",
                event_id,
                actor,
                &json!({ "is_pinned": flag, "reason": reason }),
                now,
            )?;
            Ok::<_, PipelineError>(())
        })?;
        metrics::editorial::action("pin");
        self.sync.project_event(event_id).await;
        Ok(())
    }

    pub async fn set_significance(&self, event_id: i64, score: u8, actor: &str) -> Result<()> {
        self.authorize(actor)?;
        if score > 10 {
            return Err(PipelineError::Validation {
                message: format!("cultural significance {score} is outside 0..=10"),
            });
        }
        let now = Utc::now();
        self.catalog.with_tx(|tx| {
            Self::load_event(tx, event_id)?;
            events::set_significance(tx, event_id, score, now)?;
            audit::insert_action(
                tx,
                "set_significance",
                event_id,
                actor,
                &json!({ "cultural_significance": score }),
                now,
            )?;
            Ok::<_, PipelineError>(())
        })?;
        metrics::editorial::action("set_significance");
        self.sync.project_event(event_id).await;
        Ok(())
    }

    pub async fn update_status(
        &self,
        event_id: i64,
        status: EventStatus,
        actor: &str,
        source_url: Option<String>,
    ) -> Result<()> {
        self.authorize(actor)?;
        let now = Utc::now();
        self.catalog.with_tx(|tx| {
            Self::load_event(tx, event_id)?;
            events::set_status(tx, event_id, status, now)?;
            audit::insert_action(
                tx,
                "update_status",
                event_id,
                actor,
                &json!({ "status": status.as_str(), "source_url": source_url }),
                now,
            )?;
            Ok::<_, PipelineError>(())
        })?;
        metrics::editorial::action("update_status");
        // Upsert-or-delete matches the new status's indexability.
        self.sync.project_event(event_id).await;
        info!(event_id, status = status.as_str(), actor, "status updated");
        Ok(())
    }

    /// Merge two events that editors judged to be the same: snapshot the
    /// loser, move its provenance and links onto the keeper, remove it.
    pub async fn merge(&self, keep_id: i64, lose_id: i64, actor: &str) -> Result<()> {
        self.authorize(actor)?;
        if keep_id == lose_id {
            return Err(PipelineError::Validation {
                message: "cannot merge an event into itself".to_string(),
            });
        }
        let now = Utc::now();
        let scorer = ConfidenceScorer::new();
        self.catalog.with_tx(|tx| {
            // Fixed read order, lower id first.
            let (first, second) = if keep_id < lose_id {
                (keep_id, lose_id)
            } else {
                (lose_id, keep_id)
            };
            Self::load_event(tx, first)?;
            Self::load_event(tx, second)?;
            let loser = Self::load_event(tx, lose_id)?;

            audit::insert_snapshot(tx, &loser, &format!("merged into {keep_id}"), now)?;
            let moved = source_rows::relink(tx, lose_id, keep_id)?;
            events::relink_artists(tx, lose_id, keep_id)?;
            events::relink_genres(tx, lose_id, keep_id)?;
            fingerprints::delete_for_event(tx, lose_id)?;
            events::delete(tx, lose_id)?;
            scorer.recompute(tx, keep_id, now)?;
            audit::insert_action(
                tx,
                "merge",
                keep_id,
                actor,
                &json!({ "kept": keep_id, "removed": lose_id, "sources_moved": moved }),
                now,
            )?;
            Ok::<_, PipelineError>(())
        })?;
        metrics::editorial::action("merge");
        self.sync.project_event(keep_id).await;
        self.sync.project_delete(lose_id).await;
        info!(keep_id, lose_id, actor, "events merged");
        Ok(())
    }

    pub async fn archive(&self, event_id: i64, actor: &str, reason: Option<String>) -> Result<()> {
        self.authorize(actor)?;
        let now = Utc::now();
        self.catalog.with_tx(|tx| {
            Self::load_event(tx, event_id)?;
            events::set_status(tx, event_id, EventStatus::Archived, now)?;
            audit::insert_action(
                tx,
                "archive",
                event_id,
                actor,
                &json!({ "reason": reason }),
                now,
            )?;
            Ok::<_, PipelineError>(())
        })?;
        metrics::editorial::action("archive");
        self.sync.project_delete(event_id).await;
        Ok(())
    }
}
