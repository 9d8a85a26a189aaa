//! Source adapters and their registry.
//!
//! Each upstream producer is described by a JSON spec in the registry
//! directory. The factory builds the matching adapter; every adapter speaks
//! the same two-operation contract: fetch raw records, normalize one raw
//! record into a candidate draft. Adapters are idempotent on re-fetch — the
//! same upstream record yields an identical draft modulo fetched_at.

pub mod api;
pub mod html;
pub mod manual;
pub mod sheet;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use moussem_core::catalog::{refs, sources as source_rows, Catalog};
use moussem_core::domain::{Candidate, EventType, Source, SourceType};

use crate::common::error::{PipelineError, Result};
use crate::normalize::{
    normalize, FuzzyMatcher, CITY_LEVENSHTEIN_CEILING, GENRE_LEVENSHTEIN_CEILING,
};

/// One raw upstream record, prior to normalization.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub external_id: String,
    pub source_url: Option<String>,
    pub payload: RawPayload,
    pub fetched_at: DateTime<Utc>,
}

/// Payload variants per source family. Spreadsheet rows are untyped maps and
/// stay a distinct variant rather than being coerced into API JSON.
#[derive(Debug, Clone)]
pub enum RawPayload {
    Json(serde_json::Value),
    Html(String),
    Row(HashMap<String, serde_json::Value>),
}

impl RawPayload {
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            RawPayload::Json(value) => value.clone(),
            RawPayload::Html(html) => serde_json::Value::String(html.clone()),
            RawPayload::Row(row) => serde_json::json!(row),
        }
    }
}

/// A normalized inbound record, ready to stage as a candidate.
#[derive(Debug, Clone)]
pub struct CandidateDraft {
    pub external_id: Option<String>,
    pub source_url: Option<String>,
    pub raw_payload: serde_json::Value,
    pub raw_name: String,
    pub normalized_name: String,
    pub event_type: EventType,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub raw_city: Option<String>,
    pub city_id: Option<i64>,
    pub venue_name: Option<String>,
    pub organizer_name: Option<String>,
    pub description: Option<String>,
    pub official_website: Option<String>,
    pub ticket_url: Option<String>,
    pub genres: Vec<String>,
    pub artists: Vec<String>,
}

impl CandidateDraft {
    pub fn into_candidate(self, source_id: i64, now: DateTime<Utc>) -> Candidate {
        Candidate {
            id: None,
            source_id,
            external_id: self.external_id,
            source_url: self.source_url,
            raw_payload: self.raw_payload,
            raw_name: self.raw_name,
            normalized_name: self.normalized_name,
            event_type: self.event_type,
            start_date: self.start_date,
            end_date: self.end_date,
            raw_city: self.raw_city,
            city_id: self.city_id,
            venue_name: self.venue_name,
            organizer_name: self.organizer_name,
            description: self.description,
            official_website: self.official_website,
            ticket_url: self.ticket_url,
            genres: self.genres,
            artists: self.artists,
            processed: false,
            outcome: None,
            matched_event_id: None,
            match_confidence: None,
            ingested_at: now,
            processed_at: None,
        }
    }
}

/// Fuzzy reference matchers, rebuilt from the catalog at the start of every
/// run so the pipeline always reads fresh reference rows.
pub struct NormalizerContext {
    pub cities: FuzzyMatcher,
    pub genres: FuzzyMatcher,
}

impl NormalizerContext {
    pub fn load(catalog: &Catalog) -> Result<Self> {
        let city_variants = catalog.with_conn(refs::list_city_name_variants)?;
        let genre_variants = catalog.with_conn(refs::list_genre_name_variants)?;
        Ok(Self {
            cities: FuzzyMatcher::new(city_variants, CITY_LEVENSHTEIN_CEILING),
            genres: FuzzyMatcher::new(genre_variants, GENRE_LEVENSHTEIN_CEILING),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEndpoint {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Field paths into an API record. Dot-separated paths into the JSON object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiFieldMap {
    pub external_id: Option<String>,
    pub name: Option<String>,
    pub event_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub city: Option<String>,
    pub venue: Option<String>,
    pub organizer: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub tickets: Option<String>,
    pub url: Option<String>,
    pub genres: Option<String>,
    pub artists: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiMapping {
    /// Dot path to the record array inside the response; the whole body when
    /// absent.
    pub records_path: Option<String>,
    /// Query parameter carrying the incremental cursor, when the API has one.
    pub since_param: Option<String>,
    #[serde(default)]
    pub fields: ApiFieldMap,
}

/// CSS selectors into a scraped page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeMapping {
    pub record_selector: String,
    pub name_selector: String,
    pub date_selector: String,
    pub city_selector: Option<String>,
    pub venue_selector: Option<String>,
    pub url_selector: Option<String>,
    /// Fallback city when the page covers a single location.
    pub default_city: Option<String>,
    pub default_event_type: Option<EventType>,
}

/// One registry entry, loaded from `<registry_dir>/<name>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub source_type: SourceType,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Reliability override; the source-type bucket applies when absent.
    pub reliability: Option<f64>,
    #[serde(default)]
    pub endpoints: Vec<SourceEndpoint>,
    /// Per-request deadline; 30 seconds when unset.
    pub timeout_secs: Option<u64>,
    /// Environment variable holding the bearer token, when the source wants
    /// one.
    pub auth_env: Option<String>,
    pub api: Option<ApiMapping>,
    pub scrape: Option<ScrapeMapping>,
    pub default_event_type: Option<EventType>,
}

impl SourceSpec {
    pub fn reliability_score(&self) -> f64 {
        self.reliability
            .unwrap_or_else(|| self.source_type.default_reliability())
            .clamp(0.0, 1.0)
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs.unwrap_or(30))
    }

    pub fn to_source_row(&self) -> Source {
        Source {
            id: None,
            name: self.name.clone(),
            source_type: self.source_type,
            reliability_score: self.reliability_score(),
            is_active: self.enabled,
            last_fetch_at: None,
            accuracy_score: None,
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn spec(&self) -> &SourceSpec;

    /// Fetch raw records changed since the cursor. Sources that cannot
    /// filter server-side return everything; staging is append-only and the
    /// resolver dedups downstream.
    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<Vec<RawRecord>>;

    /// Normalize one raw record. Pure given the adapter's context.
    fn normalize(&self, raw: &RawRecord) -> Result<CandidateDraft>;
}

pub struct AdapterRegistry {
    specs: HashMap<String, SourceSpec>,
    data_dir: PathBuf,
}

impl AdapterRegistry {
    /// Load all source specs from the registry directory.
    pub fn load_from_directory<P: AsRef<Path>>(registry_dir: P, data_dir: PathBuf) -> Result<Self> {
        let dir_path = registry_dir.as_ref();
        let mut specs = HashMap::new();
        if !dir_path.exists() {
            return Err(PipelineError::Validation {
                message: format!("registry directory does not exist: {}", dir_path.display()),
            });
        }
        for entry in fs::read_dir(dir_path)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            let spec: SourceSpec =
                serde_json::from_str(&content).map_err(|e| PipelineError::Validation {
                    message: format!("bad source spec {}: {e}", path.display()),
                })?;
            specs.insert(spec.name.clone(), spec);
        }
        Ok(Self { specs, data_dir })
    }

    pub fn empty(data_dir: PathBuf) -> Self {
        Self {
            specs: HashMap::new(),
            data_dir,
        }
    }

    pub fn get(&self, name: &str) -> Option<&SourceSpec> {
        self.specs.get(name)
    }

    pub fn enabled_specs(&self) -> Vec<&SourceSpec> {
        let mut specs: Vec<&SourceSpec> = self.specs.values().filter(|s| s.enabled).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Upsert every spec into the sources table; returns name → row id.
    pub fn sync_catalog(&self, catalog: &Catalog) -> Result<HashMap<String, i64>> {
        let mut ids = HashMap::new();
        catalog.with_conn(|conn| {
            for spec in self.specs.values() {
                let id = source_rows::upsert(conn, &spec.to_source_row())?;
                ids.insert(spec.name.clone(), id);
            }
            Ok::<_, PipelineError>(())
        })?;
        Ok(ids)
    }

    /// Build the adapter for a spec. Manual sources have no poll adapter —
    /// their payloads arrive through the importer and wait in the candidate
    /// store.
    pub fn build_adapter(
        &self,
        spec: &SourceSpec,
        context: Arc<NormalizerContext>,
    ) -> Result<Box<dyn SourceAdapter>> {
        match spec.source_type {
            SourceType::Api => Ok(Box::new(api::ApiAdapter::new(spec.clone(), context)?)),
            SourceType::Scrape => Ok(Box::new(html::ScrapeAdapter::new(spec.clone(), context)?)),
            SourceType::Sheet => Ok(Box::new(sheet::SheetAdapter::new(
                spec.clone(),
                context,
                self.data_dir.clone(),
            ))),
            SourceType::Manual => Err(PipelineError::Validation {
                message: format!("manual source '{}' is not polled", spec.name),
            }),
        }
    }
}

/// Shared by adapters: resolve the city and produce the normalized name.
pub(crate) fn finish_draft(
    context: &NormalizerContext,
    mut draft: CandidateDraft,
) -> CandidateDraft {
    draft.normalized_name = normalize(&draft.raw_name);
    draft.city_id = draft
        .raw_city
        .as_deref()
        .and_then(|city| context.cities.lookup(city));
    draft
}
