//! Manual import: a payload of events plus a source block, validated
//! per-record. Accepted records are staged as unprocessed candidates; the
//! hourly queue run resolves them like any other inbound record.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use moussem_core::catalog::{candidates, sources as source_rows, Catalog};
use moussem_core::domain::{EventType, Source, SourceType};

use super::{CandidateDraft, NormalizerContext};
use crate::common::error::{PipelineError, Result};
use crate::normalize::normalize;

const MAX_NAME_LEN: usize = 300;

#[derive(Debug, Clone, Deserialize)]
pub struct ManualImportPayload {
    pub source: ManualSourceBlock,
    pub events: Vec<ManualEventRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManualSourceBlock {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub name: String,
    pub reliability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualEventRecord {
    /// Upstream identifier, when the submitter has one.
    pub external_id: Option<String>,
    pub name: String,
    pub event_type: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub city: String,
    pub venue: Option<String>,
    pub organizer: Option<String>,
    pub description: Option<String>,
    pub official_website: Option<String>,
    pub ticket_url: Option<String>,
    pub source_url: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub artists: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedRecord {
    pub index: usize,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub source: String,
    pub staged: usize,
    pub rejected: Vec<RejectedRecord>,
}

pub struct ManualImporter {
    catalog: Arc<Catalog>,
    context: Arc<NormalizerContext>,
}

impl ManualImporter {
    pub fn new(catalog: Arc<Catalog>, context: Arc<NormalizerContext>) -> Self {
        Self { catalog, context }
    }

    /// Validate and stage a payload. Invalid records are rejected one by one
    /// with their error; valid ones wait in the candidate store for the next
    /// queue run.
    pub fn import(&self, payload: &ManualImportPayload) -> Result<ImportSummary> {
        if payload.source.name.trim().is_empty() {
            return Err(PipelineError::Validation {
                message: "source block has no name".to_string(),
            });
        }
        let source_row = Source {
            id: None,
            name: payload.source.name.clone(),
            source_type: payload.source.source_type,
            reliability_score: payload.source.reliability.clamp(0.0, 1.0),
            is_active: true,
            last_fetch_at: None,
            accuracy_score: None,
        };
        let source_id = self
            .catalog
            .with_conn(|conn| source_rows::upsert(conn, &source_row))?;

        let now = Utc::now();
        let mut staged = 0;
        let mut rejected = Vec::new();
        for (index, record) in payload.events.iter().enumerate() {
            match self.validate(record) {
                Ok(draft) => {
                    self.catalog.with_conn(|conn| {
                        candidates::insert(conn, &draft.clone().into_candidate(source_id, now))
                    })?;
                    staged += 1;
                }
                Err(error) => rejected.push(RejectedRecord {
                    index,
                    name: record.name.clone(),
                    error: error.to_string(),
                }),
            }
        }
        info!(
            source = %payload.source.name,
            staged,
            rejected = rejected.len(),
            "manual import staged"
        );
        Ok(ImportSummary {
            source: payload.source.name.clone(),
            staged,
            rejected,
        })
    }

    fn validate(&self, record: &ManualEventRecord) -> Result<CandidateDraft> {
        let name = record.name.trim();
        if name.is_empty() {
            return Err(PipelineError::Validation {
                message: "name is required".to_string(),
            });
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(PipelineError::Validation {
                message: format!("name exceeds {MAX_NAME_LEN} characters"),
            });
        }
        let event_type: EventType =
            record
                .event_type
                .parse()
                .map_err(|_| PipelineError::Validation {
                    message: format!("unknown event_type '{}'", record.event_type),
                })?;
        let start_date = NaiveDate::parse_from_str(record.start_date.trim(), "%Y-%m-%d").map_err(
            |_| PipelineError::Validation {
                message: format!("start_date '{}' is not ISO 8601", record.start_date),
            },
        )?;
        let end_date = record
            .end_date
            .as_deref()
            .map(|raw| {
                NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
                    PipelineError::Validation {
                        message: format!("end_date '{raw}' is not ISO 8601"),
                    }
                })
            })
            .transpose()?;
        if let Some(end) = end_date {
            if end < start_date {
                return Err(PipelineError::Validation {
                    message: "end_date precedes start_date".to_string(),
                });
            }
        }
        let city_id =
            self.context
                .cities
                .lookup(&record.city)
                .ok_or_else(|| PipelineError::UnknownCity {
                    name: record.city.clone(),
                })?;
        let source_url = record
            .source_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| PipelineError::Validation {
                message: "source_url is required".to_string(),
            })?;

        Ok(CandidateDraft {
            external_id: record.external_id.clone(),
            source_url: Some(source_url.to_string()),
            raw_payload: serde_json::to_value(record)?,
            raw_name: name.to_string(),
            normalized_name: normalize(name),
            event_type,
            start_date: Some(start_date),
            end_date,
            raw_city: Some(record.city.clone()),
            city_id: Some(city_id),
            venue_name: record.venue.clone(),
            organizer_name: record.organizer.clone(),
            description: record.description.clone(),
            official_website: record.official_website.clone(),
            ticket_url: record.ticket_url.clone(),
            genres: record.genres.clone(),
            artists: record.artists.clone(),
        })
    }
}
