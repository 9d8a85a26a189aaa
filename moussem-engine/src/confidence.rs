//! Per-event confidence scoring.
//!
//! confidence = 0.35·R + 0.25·C + 0.20·A + 0.10·T + 0.10·H
//!
//! Recomputed inside the same transaction as every source-set mutation, so
//! the stored score never lags the provenance that explains it.

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use moussem_core::catalog::{events, sources};
use moussem_core::domain::{EventSource, Source};
use moussem_core::CatalogError;

use crate::common::error::Result;
use crate::normalize::normalize;

const WEIGHT_RELIABILITY: f64 = 0.35;
const WEIGHT_COMPLETENESS: f64 = 0.25;
const WEIGHT_AGREEMENT: f64 = 0.20;
const WEIGHT_RECENCY: f64 = 0.10;
const WEIGHT_HISTORY: f64 = 0.10;

/// Reliability floor for an event with no provenance at all (editorially
/// created rows).
const NO_SOURCE_RELIABILITY: f64 = 0.3;

/// Accuracy assumed for a source without enough history to have one.
const UNKNOWN_ACCURACY: f64 = 0.5;

const RECENCY_WINDOW_DAYS: f64 = 90.0;

#[derive(Debug, Clone, Copy)]
pub struct ConfidenceBreakdown {
    pub reliability: f64,
    pub completeness: f64,
    pub agreement: f64,
    pub recency: f64,
    pub history: f64,
    pub score: f64,
}

#[derive(Default)]
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self
    }

    /// Recompute and persist the event's confidence. Also bumps
    /// last_verified_at — scoring is the moment the catalog looked at the
    /// event's evidence.
    pub fn recompute(
        &self,
        conn: &Connection,
        event_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ConfidenceBreakdown> {
        let event = events::get(conn, event_id)?
            .ok_or_else(|| CatalogError::NotFound(format!("event {event_id}")))?;
        let links = sources::for_event(conn, event_id)?;

        let reliability = links
            .iter()
            .map(|(_, source)| source.reliability_score)
            .fold(f64::NAN, f64::max);
        let reliability = if reliability.is_nan() {
            NO_SOURCE_RELIABILITY
        } else {
            reliability
        };

        let required_present = [
            !event.name.is_empty(),
            true, // start_date is non-optional by construction
            event.city_id > 0,
            true, // status likewise
        ]
        .iter()
        .filter(|present| **present)
        .count();
        let optional_present = [
            event.end_date.is_some(),
            event.venue_id.is_some(),
            event.description.is_some(),
            event.official_website.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();
        let completeness = 0.7 * (required_present as f64 / 4.0)
            + 0.3 * (optional_present as f64 / 4.0);

        let agreement = agreement_score(&links);

        let last_verified = event.last_verified_at.unwrap_or(event.created_at);
        let days_since = (now - last_verified).num_days().max(0) as f64;
        let recency = (1.0 - days_since / RECENCY_WINDOW_DAYS).max(0.0);

        let history = primary_source(&links)
            .and_then(|source| source.accuracy_score)
            .unwrap_or(UNKNOWN_ACCURACY);

        let score = (WEIGHT_RELIABILITY * reliability
            + WEIGHT_COMPLETENESS * completeness
            + WEIGHT_AGREEMENT * agreement
            + WEIGHT_RECENCY * recency
            + WEIGHT_HISTORY * history)
            .clamp(0.0, 1.0);

        events::set_confidence(conn, event_id, score, now)?;
        crate::observability::metrics::confidence::recomputed(score);

        Ok(ConfidenceBreakdown {
            reliability,
            completeness,
            agreement,
            recency,
            history,
            score,
        })
    }
}

/// Agreement over {start date, venue name}: 1 per attribute when every
/// reporting source agrees, 0 otherwise, averaged over attributes at least
/// two distinct sources carry. A single distinct source scores a neutral
/// 0.5.
fn agreement_score(links: &[(EventSource, Source)]) -> f64 {
    let mut distinct: Vec<i64> = links.iter().map(|(link, _)| link.source_id).collect();
    distinct.sort_unstable();
    distinct.dedup();
    if distinct.len() < 2 {
        return 0.5;
    }

    let mut scored_attributes = 0usize;
    let mut agreeing = 0usize;

    let dates: Vec<_> = links
        .iter()
        .filter_map(|(link, _)| link.reported_start_date)
        .collect();
    if dates.len() >= 2 {
        scored_attributes += 1;
        if dates.windows(2).all(|pair| pair[0] == pair[1]) {
            agreeing += 1;
        }
    }

    let venues: Vec<String> = links
        .iter()
        .filter_map(|(link, _)| link.reported_venue.as_deref().map(normalize))
        .collect();
    if venues.len() >= 2 {
        scored_attributes += 1;
        if venues.windows(2).all(|pair| pair[0] == pair[1]) {
            agreeing += 1;
        }
    }

    if scored_attributes == 0 {
        0.5
    } else {
        agreeing as f64 / scored_attributes as f64
    }
}

/// The source whose long-term accuracy stands in for the event: highest
/// reliability, earliest linkage on ties.
fn primary_source(links: &[(EventSource, Source)]) -> Option<&Source> {
    links
        .iter()
        .max_by(|(link_a, source_a), (link_b, source_b)| {
            source_a
                .reliability_score
                .partial_cmp(&source_b.reliability_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(link_b.id.cmp(&link_a.id))
        })
        .map(|(_, source)| source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use moussem_core::catalog::{refs, Catalog};
    use moussem_core::domain::{Event, EventStatus, EventType, SourceType};
    use moussem_core::CatalogError;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seed_event(catalog: &Catalog, city_id: i64) -> i64 {
        catalog
            .with_tx::<_, CatalogError>(|tx| {
                let now = Utc::now();
                let city = refs::get_city(tx, city_id)?;
                events::insert(
                    tx,
                    &Event {
                        id: None,
                        slug: "test-event-2025".to_string(),
                        name: "Test Event".to_string(),
                        event_type: EventType::Festival,
                        start_date: day(2025, 6, 26),
                        end_date: None,
                        city_id,
                        region_id: city.region_id,
                        venue_id: None,
                        organizer_id: None,
                        description: None,
                        official_website: None,
                        ticket_url: None,
                        status: EventStatus::Announced,
                        is_verified: false,
                        is_pinned: false,
                        cultural_significance: 0,
                        confidence_score: 0.0,
                        created_at: now,
                        updated_at: now,
                        last_verified_at: None,
                    },
                )
            })
            .unwrap()
    }

    fn link_source(
        catalog: &Catalog,
        event_id: i64,
        name: &str,
        reliability: f64,
        reported_date: NaiveDate,
    ) {
        catalog
            .with_tx::<_, CatalogError>(|tx| {
                let source_id = sources::upsert(
                    tx,
                    &Source {
                        id: None,
                        name: name.to_string(),
                        source_type: SourceType::Api,
                        reliability_score: reliability,
                        is_active: true,
                        last_fetch_at: None,
                        accuracy_score: None,
                    },
                )?;
                sources::insert_event_source(
                    tx,
                    &EventSource {
                        id: None,
                        event_id,
                        source_id,
                        external_id: None,
                        source_url: None,
                        raw_payload: serde_json::json!({}),
                        fetched_at: Utc::now(),
                        reported_start_date: Some(reported_date),
                        reported_venue: None,
                    },
                )?;
                Ok::<_, CatalogError>(())
            })
            .unwrap()
    }

    #[test]
    fn single_source_event_scores_the_neutral_formula() {
        let catalog = Catalog::open_in_memory().unwrap();
        let event_id = seed_event(&catalog, 25);
        link_source(&catalog, event_id, "api-a", 0.8, day(2025, 6, 26));

        let scorer = ConfidenceScorer::new();
        let breakdown = catalog
            .with_tx(|tx| scorer.recompute(tx, event_id, Utc::now()))
            .unwrap();

        // 0.35*0.8 + 0.25*0.7 + 0.20*0.5 + 0.10*1.0 + 0.10*0.5
        assert!((breakdown.score - 0.705).abs() < 1e-9, "{breakdown:?}");
        assert!((breakdown.agreement - 0.5).abs() < 1e-9);
        assert!((breakdown.history - 0.5).abs() < 1e-9);
    }

    #[test]
    fn agreeing_sources_lift_the_score() {
        let catalog = Catalog::open_in_memory().unwrap();
        let event_id = seed_event(&catalog, 25);
        link_source(&catalog, event_id, "api-a", 0.8, day(2025, 6, 26));
        link_source(&catalog, event_id, "official-b", 1.0, day(2025, 6, 26));

        let scorer = ConfidenceScorer::new();
        let breakdown = catalog
            .with_tx(|tx| scorer.recompute(tx, event_id, Utc::now()))
            .unwrap();
        assert!((breakdown.reliability - 1.0).abs() < 1e-9);
        assert!((breakdown.agreement - 1.0).abs() < 1e-9);
        assert!(breakdown.score > 0.705);
    }

    #[test]
    fn disagreeing_sources_zero_the_agreement_term() {
        let catalog = Catalog::open_in_memory().unwrap();
        let event_id = seed_event(&catalog, 25);
        link_source(&catalog, event_id, "api-a", 0.8, day(2025, 6, 26));
        link_source(&catalog, event_id, "api-c", 0.8, day(2025, 6, 27));

        let scorer = ConfidenceScorer::new();
        let breakdown = catalog
            .with_tx(|tx| scorer.recompute(tx, event_id, Utc::now()))
            .unwrap();
        assert!((breakdown.agreement - 0.0).abs() < 1e-9);
    }

    #[test]
    fn score_stays_in_bounds_and_is_persisted() {
        let catalog = Catalog::open_in_memory().unwrap();
        let event_id = seed_event(&catalog, 25);
        let scorer = ConfidenceScorer::new();
        let breakdown = catalog
            .with_tx(|tx| scorer.recompute(tx, event_id, Utc::now()))
            .unwrap();
        assert!((0.0..=1.0).contains(&breakdown.score));

        let stored = catalog
            .with_conn(|conn| events::get(conn, event_id))
            .unwrap()
            .unwrap();
        assert!((stored.confidence_score - breakdown.score).abs() < 1e-9);
        assert!(stored.last_verified_at.is_some());
    }
}
