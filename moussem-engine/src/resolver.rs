//! Deduplication resolver: maps a staged candidate to create, merge or
//! review against the authoritative catalog. Read-only — every write happens
//! in the merge writer.
//!
//! Bucket discovery runs over the fingerprint index. The exact pass uses the
//! `exact` kind; the weighted pass unions the `fuzzy_name` and
//! `date_location` buckets (a renamed edition on the same day must still
//! land next to the original); the review pass widens to `week_location` so
//! the same festival reported one day apart is caught for a human decision.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use strsim::jaro_winkler;

use moussem_core::catalog::{events, fingerprints, refs, sources};
use moussem_core::domain::{Candidate, Event, FingerprintKind};

use crate::common::error::Result;
use crate::fingerprint::{self, FingerprintInput};
use crate::normalize::normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionAction {
    Create,
    Merge,
    Review,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Exact,
    FuzzyName,
    DateLocation,
    None,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::FuzzyName => "fuzzy_name",
            MatchType::DateLocation => "date_location",
            MatchType::None => "none",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeduplicationResult {
    pub action: ResolutionAction,
    pub existing_event_id: Option<i64>,
    pub confidence: f64,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolverConfig {
    /// Weighted similarity at or above which a fuzzy match merges.
    pub merge_similarity: f64,
    /// Name similarity at or above which a same-week match goes to review.
    pub review_similarity: f64,
    /// Confidence assigned to exact fingerprint hits.
    pub exact_confidence: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            merge_similarity: 0.85,
            review_similarity: 0.70,
            exact_confidence: 0.95,
        }
    }
}

const WEIGHT_NAME: f64 = 0.40;
const WEIGHT_DATE: f64 = 0.30;
const WEIGHT_LOCATION: f64 = 0.20;
const WEIGHT_VENUE: f64 = 0.10;

#[derive(Default)]
pub struct Resolver {
    config: ResolverConfig,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn resolve(&self, conn: &Connection, candidate: &Candidate) -> Result<DeduplicationResult> {
        // Without a recognized city there is nothing to match against; the
        // candidate surfaces for editorial attention instead.
        if candidate.city_id.is_none() {
            return Ok(DeduplicationResult {
                action: ResolutionAction::Create,
                existing_event_id: None,
                confidence: 0.5,
                match_type: MatchType::None,
            });
        }

        let prints = fingerprint::generate(FingerprintInput {
            normalized_name: &candidate.normalized_name,
            start_date: candidate.start_date,
            city_id: candidate.city_id,
        });
        let hash_for = |kind: FingerprintKind| {
            prints
                .iter()
                .find(|(k, _)| *k == kind)
                .map(|(_, h)| h.as_str())
        };

        // 1. Exact hit.
        if let Some(hash) = hash_for(FingerprintKind::Exact) {
            let ids = fingerprints::lookup(conn, FingerprintKind::Exact, hash)?;
            if let Some(best) = self.best_by_provenance(conn, &ids)? {
                return Ok(DeduplicationResult {
                    action: ResolutionAction::Merge,
                    existing_event_id: Some(best),
                    confidence: self.config.exact_confidence,
                    match_type: MatchType::Exact,
                });
            }
        }

        // 2. Weighted similarity over the fuzzy-name and same-day buckets.
        let mut bucket: Vec<i64> = Vec::new();
        for kind in [FingerprintKind::FuzzyName, FingerprintKind::DateLocation] {
            if let Some(hash) = hash_for(kind) {
                for id in fingerprints::lookup(conn, kind, hash)? {
                    if !bucket.contains(&id) {
                        bucket.push(id);
                    }
                }
            }
        }
        if let Some((id, similarity)) =
            self.best_scored(conn, &bucket, self.config.merge_similarity, |event| {
                self.weighted_similarity(conn, candidate, event)
            })?
        {
            return Ok(DeduplicationResult {
                action: ResolutionAction::Merge,
                existing_event_id: Some(id),
                confidence: similarity,
                match_type: MatchType::FuzzyName,
            });
        }

        // 3. Same week, same city: close names need a human decision.
        if let Some(hash) = hash_for(FingerprintKind::WeekLocation) {
            let ids = fingerprints::lookup(conn, FingerprintKind::WeekLocation, hash)?;
            if let Some((id, similarity)) =
                self.best_scored(conn, &ids, self.config.review_similarity, |event| {
                    Ok(jaro_winkler(
                        &candidate.normalized_name,
                        &normalize(&event.name),
                    ))
                })?
            {
                return Ok(DeduplicationResult {
                    action: ResolutionAction::Review,
                    existing_event_id: Some(id),
                    confidence: similarity,
                    match_type: MatchType::DateLocation,
                });
            }
        }

        // 4. Nothing close enough anywhere.
        Ok(DeduplicationResult {
            action: ResolutionAction::Create,
            existing_event_id: None,
            confidence: 1.0,
            match_type: MatchType::None,
        })
    }

    /// Weighted candidate/event similarity: name 0.40, date 0.30, location
    /// 0.20, venue 0.10.
    pub fn weighted_similarity(
        &self,
        conn: &Connection,
        candidate: &Candidate,
        event: &Event,
    ) -> Result<f64> {
        let name_score = jaro_winkler(&candidate.normalized_name, &normalize(&event.name));

        let date_score = match candidate.start_date {
            Some(date) => {
                let diff = (date - event.start_date).num_days().abs();
                match diff {
                    0 => 1.0,
                    1 => 0.8,
                    2..=7 => 0.5,
                    _ => 0.0,
                }
            }
            None => 0.0,
        };

        let location_score = if candidate.city_id == Some(event.city_id) {
            1.0
        } else {
            0.0
        };

        let event_venue = match event.venue_id {
            Some(venue_id) => refs::get_venue(conn, venue_id)?.map(|v| normalize(&v.name)),
            None => None,
        };
        let candidate_venue = candidate.venue_name.as_deref().map(normalize);
        let venue_score = match (candidate_venue, event_venue) {
            (Some(a), Some(b)) if a == b => 1.0,
            (Some(_), Some(_)) => 0.0,
            _ => 0.5,
        };

        Ok(WEIGHT_NAME * name_score
            + WEIGHT_DATE * date_score
            + WEIGHT_LOCATION * location_score
            + WEIGHT_VENUE * venue_score)
    }

    /// Best-scoring event above the threshold. Ties break on the existing
    /// event's best source reliability, then earliest created_at.
    fn best_scored(
        &self,
        conn: &Connection,
        ids: &[i64],
        threshold: f64,
        score: impl Fn(&Event) -> Result<f64>,
    ) -> Result<Option<(i64, f64)>> {
        let mut ranked: Vec<(f64, f64, DateTime<Utc>, i64)> = Vec::new();
        for &id in ids {
            let Some(event) = events::get(conn, id)? else {
                continue;
            };
            let similarity = score(&event)?;
            if similarity < threshold {
                continue;
            }
            let reliability = sources::max_reliability_for_event(conn, id)?.unwrap_or(0.0);
            ranked.push((similarity, reliability, event.created_at, id));
        }
        ranked.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal))
                .then(a.2.cmp(&b.2))
                .then(a.3.cmp(&b.3))
        });
        Ok(ranked.first().map(|(similarity, _, _, id)| (*id, *similarity)))
    }

    /// Tie-break an equal-score bucket: reliability desc, created_at asc.
    fn best_by_provenance(&self, conn: &Connection, ids: &[i64]) -> Result<Option<i64>> {
        self.best_scored(conn, ids, 0.0, |_| Ok(1.0))
            .map(|best| best.map(|(id, _)| id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use moussem_core::catalog::{events as event_rows, fingerprints as fp_rows, refs, sources as src_rows, Catalog};
    use moussem_core::domain::{
        Candidate, Event, EventSource, EventStatus, EventType, Source, SourceType,
    };
    use moussem_core::CatalogError;

    const ESSAOUIRA: i64 = 25;

    fn seed_event(
        catalog: &Catalog,
        name: &str,
        date: NaiveDate,
        city_id: i64,
        reliability: f64,
    ) -> i64 {
        catalog
            .with_tx::<_, CatalogError>(|tx| {
                let now = Utc::now();
                let source_id = src_rows::upsert(
                    tx,
                    &Source {
                        id: None,
                        name: format!("seed-{name}-{reliability}"),
                        source_type: SourceType::Api,
                        reliability_score: reliability,
                        is_active: true,
                        last_fetch_at: None,
                        accuracy_score: None,
                    },
                )?;
                let city = refs::get_city(tx, city_id)?;
                let event = Event {
                    id: None,
                    slug: format!("{}-{}", crate::normalize::slugify(name), date),
                    name: name.to_string(),
                    event_type: EventType::Festival,
                    start_date: date,
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
                    confidence_score: 0.5,
                    created_at: now,
                    updated_at: now,
                    last_verified_at: None,
                };
                let event_id = event_rows::insert(tx, &event)?;
                src_rows::insert_event_source(
                    tx,
                    &EventSource {
                        id: None,
                        event_id,
                        source_id,
                        external_id: None,
                        source_url: None,
                        raw_payload: serde_json::json!({}),
                        fetched_at: now,
                        reported_start_date: Some(date),
                        reported_venue: None,
                    },
                )?;
                let prints = fingerprint::generate(FingerprintInput {
                    normalized_name: &normalize(name),
                    start_date: Some(date),
                    city_id: Some(city_id),
                });
                fp_rows::replace_for_event(tx, event_id, &prints)?;
                Ok(event_id)
            })
            .unwrap()
    }

    fn candidate(name: &str, date: Option<NaiveDate>, city_id: Option<i64>) -> Candidate {
        Candidate {
            id: Some(1),
            source_id: 1,
            external_id: None,
            source_url: None,
            raw_payload: serde_json::json!({}),
            raw_name: name.to_string(),
            normalized_name: normalize(name),
            event_type: EventType::Festival,
            start_date: date,
            end_date: None,
            raw_city: None,
            city_id,
            venue_name: None,
            organizer_name: None,
            description: None,
            official_website: None,
            ticket_url: None,
            genres: vec![],
            artists: vec![],
            processed: false,
            outcome: None,
            matched_event_id: None,
            match_confidence: None,
            ingested_at: Utc::now(),
            processed_at: None,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn exact_duplicate_merges_at_095() {
        let catalog = Catalog::open_in_memory().unwrap();
        let date = day(2025, 6, 26);
        let existing =
            seed_event(&catalog, "Festival Gnaoua et Musiques du Monde", date, ESSAOUIRA, 0.8);
        let resolver = Resolver::new();
        let result = catalog
            .with_conn(|conn| {
                resolver.resolve(
                    conn,
                    &candidate(
                        "Festival Gnaoua et Musiques du Monde 2025",
                        Some(date),
                        Some(ESSAOUIRA),
                    ),
                )
            })
            .unwrap();
        assert_eq!(result.action, ResolutionAction::Merge);
        assert_eq!(result.existing_event_id, Some(existing));
        assert_eq!(result.match_type, MatchType::Exact);
        assert!((result.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn renamed_edition_on_same_day_merges_fuzzily() {
        let catalog = Catalog::open_in_memory().unwrap();
        let date = day(2025, 6, 26);
        let existing = seed_event(
            &catalog,
            "Festival Gnaoua et Musiques du Monde 2025",
            date,
            ESSAOUIRA,
            0.8,
        );
        let resolver = Resolver::new();
        let result = catalog
            .with_conn(|conn| {
                resolver.resolve(
                    conn,
                    &candidate("Festival Gnaoua 2025 — 27e édition", Some(date), Some(ESSAOUIRA)),
                )
            })
            .unwrap();
        assert_eq!(result.action, ResolutionAction::Merge);
        assert_eq!(result.existing_event_id, Some(existing));
        assert_eq!(result.match_type, MatchType::FuzzyName);
        assert!(result.confidence >= 0.85 && result.confidence < 0.95);
    }

    #[test]
    fn date_disagreement_goes_to_review() {
        let catalog = Catalog::open_in_memory().unwrap();
        let existing = seed_event(
            &catalog,
            "Festival Gnaoua et Musiques du Monde",
            day(2025, 6, 26),
            ESSAOUIRA,
            0.8,
        );
        let resolver = Resolver::new();
        let result = catalog
            .with_conn(|conn| {
                resolver.resolve(
                    conn,
                    &candidate(
                        "Festival Gnaoua et Musiques du Monde",
                        Some(day(2025, 6, 27)),
                        Some(ESSAOUIRA),
                    ),
                )
            })
            .unwrap();
        assert_eq!(result.action, ResolutionAction::Review);
        assert_eq!(result.existing_event_id, Some(existing));
        assert_eq!(result.match_type, MatchType::DateLocation);
        assert!(result.confidence >= 0.70);
    }

    #[test]
    fn unrelated_candidate_creates() {
        let catalog = Catalog::open_in_memory().unwrap();
        seed_event(
            &catalog,
            "Festival Gnaoua et Musiques du Monde",
            day(2025, 6, 26),
            ESSAOUIRA,
            0.8,
        );
        let resolver = Resolver::new();
        let result = catalog
            .with_conn(|conn| {
                resolver.resolve(
                    conn,
                    // Different city and month entirely.
                    &candidate("Timitar Signes et Cultures", Some(day(2025, 7, 3)), Some(32)),
                )
            })
            .unwrap();
        assert_eq!(result.action, ResolutionAction::Create);
        assert_eq!(result.existing_event_id, None);
        assert_eq!(result.match_type, MatchType::None);
        assert!((result.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_city_is_create_only_at_low_confidence() {
        let catalog = Catalog::open_in_memory().unwrap();
        let resolver = Resolver::new();
        let result = catalog
            .with_conn(|conn| {
                resolver.resolve(conn, &candidate("Somewhere Sessions", Some(day(2025, 8, 1)), None))
            })
            .unwrap();
        assert_eq!(result.action, ResolutionAction::Create);
        assert!((result.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn exact_bucket_tie_breaks_on_source_reliability() {
        let catalog = Catalog::open_in_memory().unwrap();
        let date = day(2025, 6, 26);
        let _weaker = seed_event(&catalog, "Moussem Moulay Abdellah", date, 22, 0.5);
        let stronger = seed_event(&catalog, "Moussem Moulay Abdellah", date, 22, 1.0);
        let resolver = Resolver::new();
        let result = catalog
            .with_conn(|conn| {
                resolver.resolve(conn, &candidate("Moussem Moulay Abdellah", Some(date), Some(22)))
            })
            .unwrap();
        assert_eq!(result.action, ResolutionAction::Merge);
        assert_eq!(result.existing_event_id, Some(stronger));
    }
}
