use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Aggregated outcome of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub sources: Vec<SourceReport>,
}

impl IngestionReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            sources: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn total_fetched(&self) -> usize {
        self.sources.iter().map(|s| s.fetched).sum()
    }

    pub fn total_created(&self) -> usize {
        self.sources.iter().map(|s| s.created).sum()
    }

    pub fn total_merged(&self) -> usize {
        self.sources.iter().map(|s| s.merged).sum()
    }

    pub fn total_review_needed(&self) -> usize {
        self.sources.iter().map(|s| s.review_needed).sum()
    }

    pub fn has_errors(&self) -> bool {
        self.sources.iter().any(|s| !s.errors.is_empty())
    }
}

impl Default for IngestionReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-source counters and errors for one run.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub fetched: usize,
    pub created: usize,
    pub merged: usize,
    pub review_needed: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// False when the fetch stage hit a retriable error — the cursor stays
    /// put so the next run re-covers the window.
    pub cursor_advanced: bool,
}

impl SourceReport {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            fetched: 0,
            created: 0,
            merged: 0,
            review_needed: 0,
            skipped: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            cursor_advanced: false,
        }
    }
}
