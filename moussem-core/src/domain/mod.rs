use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::common::error::CatalogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Festival,
    Concert,
    Showcase,
    Ritual,
    Conference,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Festival => "festival",
            EventType::Concert => "concert",
            EventType::Showcase => "showcase",
            EventType::Ritual => "ritual",
            EventType::Conference => "conference",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "festival" => Ok(EventType::Festival),
            "concert" => Ok(EventType::Concert),
            "showcase" => Ok(EventType::Showcase),
            "ritual" => Ok(EventType::Ritual),
            "conference" => Ok(EventType::Conference),
            other => Err(CatalogError::Invalid {
                field: "event_type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Announced,
    Confirmed,
    Cancelled,
    Postponed,
    Archived,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Announced => "announced",
            EventStatus::Confirmed => "confirmed",
            EventStatus::Cancelled => "cancelled",
            EventStatus::Postponed => "postponed",
            EventStatus::Archived => "archived",
        }
    }

    /// Only announced and confirmed events are projected into the search index.
    pub fn is_indexable(&self) -> bool {
        matches!(self, EventStatus::Announced | EventStatus::Confirmed)
    }
}

impl std::str::FromStr for EventStatus {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "announced" => Ok(EventStatus::Announced),
            "confirmed" => Ok(EventStatus::Confirmed),
            "cancelled" => Ok(EventStatus::Cancelled),
            "postponed" => Ok(EventStatus::Postponed),
            "archived" => Ok(EventStatus::Archived),
            other => Err(CatalogError::Invalid {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Option<i64>,
    pub slug: String,
    pub name: String,
    pub event_type: EventType,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub city_id: i64,
    pub region_id: i64,
    pub venue_id: Option<i64>,
    pub organizer_id: Option<i64>,
    pub description: Option<String>,
    pub official_website: Option<String>,
    pub ticket_url: Option<String>,
    pub status: EventStatus,
    pub is_verified: bool,
    pub is_pinned: bool,
    pub cultural_significance: u8,
    pub confidence_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_verified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct City {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub region_id: i64,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Venue {
    pub id: Option<i64>,
    pub name: String,
    pub slug: String,
    pub city_id: i64,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organizer {
    pub id: Option<i64>,
    pub name: String,
    pub slug: String,
    pub website: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genre {
    pub id: Option<i64>,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub id: Option<i64>,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Api,
    Scrape,
    Sheet,
    Manual,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Api => "api",
            SourceType::Scrape => "scrape",
            SourceType::Sheet => "sheet",
            SourceType::Manual => "manual",
        }
    }

    /// Reliability bucket when a source spec does not supply its own score.
    pub fn default_reliability(&self) -> f64 {
        match self {
            SourceType::Api => 0.8,
            SourceType::Scrape => 0.5,
            SourceType::Sheet => 0.5,
            SourceType::Manual => 0.7,
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(SourceType::Api),
            "scrape" => Ok(SourceType::Scrape),
            "sheet" => Ok(SourceType::Sheet),
            "manual" => Ok(SourceType::Manual),
            other => Err(CatalogError::Invalid {
                field: "source_type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Option<i64>,
    pub name: String,
    pub source_type: SourceType,
    pub reliability_score: f64,
    pub is_active: bool,
    pub last_fetch_at: Option<DateTime<Utc>>,
    /// Long-term accuracy of the source; None until enough history exists.
    pub accuracy_score: Option<f64>,
}

/// Provenance linkage between an event and the source record that fed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSource {
    pub id: Option<i64>,
    pub event_id: i64,
    pub source_id: i64,
    pub external_id: Option<String>,
    pub source_url: Option<String>,
    pub raw_payload: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
    /// Normalized values as reported by this source, kept for agreement scoring.
    pub reported_start_date: Option<NaiveDate>,
    pub reported_venue: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOutcome {
    Created,
    Merged,
    Review,
    Error,
}

impl CandidateOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateOutcome::Created => "created",
            CandidateOutcome::Merged => "merged",
            CandidateOutcome::Review => "review",
            CandidateOutcome::Error => "error",
        }
    }
}

impl std::str::FromStr for CandidateOutcome {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(CandidateOutcome::Created),
            "merged" => Ok(CandidateOutcome::Merged),
            "review" => Ok(CandidateOutcome::Review),
            "error" => Ok(CandidateOutcome::Error),
            other => Err(CatalogError::Invalid {
                field: "outcome",
                value: other.to_string(),
            }),
        }
    }
}

/// A staged, normalized inbound record awaiting resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: Option<i64>,
    pub source_id: i64,
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
    pub processed: bool,
    pub outcome: Option<CandidateOutcome>,
    pub matched_event_id: Option<i64>,
    pub match_confidence: Option<f64>,
    pub ingested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintKind {
    Exact,
    FuzzyName,
    DateLocation,
    WeekLocation,
}

impl FingerprintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FingerprintKind::Exact => "exact",
            FingerprintKind::FuzzyName => "fuzzy_name",
            FingerprintKind::DateLocation => "date_location",
            FingerprintKind::WeekLocation => "week_location",
        }
    }
}

impl std::str::FromStr for FingerprintKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(FingerprintKind::Exact),
            "fuzzy_name" => Ok(FingerprintKind::FuzzyName),
            "date_location" => Ok(FingerprintKind::DateLocation),
            "week_location" => Ok(FingerprintKind::WeekLocation),
            other => Err(CatalogError::Invalid {
                field: "fingerprint_kind",
                value: other.to_string(),
            }),
        }
    }
}

/// A content-addressed duplicate lookup key owned by an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub kind: FingerprintKind,
    pub hash: String,
    pub event_id: i64,
}

/// Append-only audit record of a human-initiated mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorialAction {
    pub id: Option<i64>,
    pub action_type: String,
    pub event_id: i64,
    pub actor: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
