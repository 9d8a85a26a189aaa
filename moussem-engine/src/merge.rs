//! Merge & provenance writer.
//!
//! Applies a resolver decision. The caller wraps `apply` in a catalog
//! transaction so the event row, its provenance, its fingerprint set, its
//! confidence and the candidate's processed flag all commit or roll back
//! together.

use chrono::{DateTime, Datelike, Utc};
use rusqlite::Connection;
use tracing::{debug, warn};

use moussem_core::catalog::{candidates, events, fingerprints as fingerprint_index, refs, sources};
use moussem_core::domain::{
    Candidate, CandidateOutcome, Event, EventSource, EventStatus,
};
use moussem_core::CatalogError;

use std::sync::Arc;

use crate::common::error::{PipelineError, Result};
use crate::confidence::ConfidenceScorer;
use crate::observability::metrics;
use crate::fingerprint::{self, FingerprintInput};
use crate::normalize::{normalize, slugify};
use crate::resolver::{DeduplicationResult, ResolutionAction};
use crate::sources::NormalizerContext;

#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub event_id: Option<i64>,
    pub outcome: CandidateOutcome,
    /// Set when the apply went through but left something for editors.
    pub warning: Option<String>,
}

pub struct MergeWriter {
    scorer: ConfidenceScorer,
    context: Arc<NormalizerContext>,
}

impl MergeWriter {
    pub fn new(context: Arc<NormalizerContext>) -> Self {
        Self {
            scorer: ConfidenceScorer::new(),
            context,
        }
    }

    pub fn apply(
        &self,
        conn: &Connection,
        candidate: &Candidate,
        resolution: &DeduplicationResult,
        now: DateTime<Utc>,
    ) -> Result<ApplyOutcome> {
        let candidate_id = candidate.id.ok_or(PipelineError::Validation {
            message: "candidate has no id".to_string(),
        })?;

        match resolution.action {
            ResolutionAction::Review => {
                candidates::mark_processed(
                    conn,
                    candidate_id,
                    CandidateOutcome::Review,
                    resolution.existing_event_id,
                    Some(resolution.confidence),
                    now,
                )?;
                Ok(ApplyOutcome {
                    event_id: resolution.existing_event_id,
                    outcome: CandidateOutcome::Review,
                    warning: None,
                })
            }
            ResolutionAction::Create => self.apply_create(conn, candidate, candidate_id, resolution, now),
            ResolutionAction::Merge => self.apply_merge(conn, candidate, candidate_id, resolution, now),
        }
    }

    fn apply_create(
        &self,
        conn: &Connection,
        candidate: &Candidate,
        candidate_id: i64,
        resolution: &DeduplicationResult,
        now: DateTime<Utc>,
    ) -> Result<ApplyOutcome> {
        // A candidate whose city never resolved cannot become an event; it
        // parks in the review queue for editorial attention instead.
        let Some(city_id) = candidate.city_id else {
            candidates::mark_processed(
                conn,
                candidate_id,
                CandidateOutcome::Review,
                None,
                Some(resolution.confidence),
                now,
            )?;
            return Ok(ApplyOutcome {
                event_id: None,
                outcome: CandidateOutcome::Review,
                warning: Some(format!(
                    "unrecognized city '{}' for '{}'",
                    candidate.raw_city.as_deref().unwrap_or(""),
                    candidate.raw_name
                )),
            });
        };
        let Some(start_date) = candidate.start_date else {
            candidates::mark_processed(
                conn,
                candidate_id,
                CandidateOutcome::Error,
                None,
                None,
                now,
            )?;
            return Ok(ApplyOutcome {
                event_id: None,
                outcome: CandidateOutcome::Error,
                warning: Some(format!("'{}' has no usable start date", candidate.raw_name)),
            });
        };

        let city = refs::get_city(conn, city_id)?;
        let venue_id = match candidate.venue_name.as_deref() {
            Some(venue_name) if !venue_name.trim().is_empty() => Some(refs::get_or_create_venue(
                conn,
                venue_name,
                &format!("{}-{}", city.slug, slugify(venue_name)),
                city_id,
            )?),
            _ => None,
        };
        let organizer_id = match candidate.organizer_name.as_deref() {
            Some(name) if !name.trim().is_empty() => Some(refs::get_or_create_organizer(
                conn,
                name,
                &slugify(name),
            )?),
            _ => None,
        };

        let slug = allocate_slug(conn, &candidate.raw_name, start_date.year())?;
        let event = Event {
            id: None,
            slug,
            name: candidate.raw_name.clone(),
            event_type: candidate.event_type,
            start_date,
            end_date: candidate.end_date,
            city_id,
            region_id: city.region_id,
            venue_id,
            organizer_id,
            description: candidate.description.clone(),
            official_website: candidate.official_website.clone(),
            ticket_url: candidate.ticket_url.clone(),
            status: EventStatus::Announced,
            is_verified: false,
            is_pinned: false,
            cultural_significance: 0,
            confidence_score: 0.0,
            created_at: now,
            updated_at: now,
            last_verified_at: None,
        };
        let event_id = events::insert(conn, &event)?;

        for genre_name in &candidate.genres {
            if let Some(genre_id) = self.context.genres.lookup(genre_name) {
                events::link_genre(conn, event_id, genre_id)?;
            } else {
                debug!(genre = %genre_name, "unmatched genre skipped");
            }
        }
        for artist_name in &candidate.artists {
            let slug = slugify(artist_name);
            if slug.is_empty() {
                continue;
            }
            let artist_id = refs::get_or_create_artist(conn, artist_name, &slug)?;
            events::link_artist(conn, event_id, artist_id)?;
        }

        self.link_provenance(conn, event_id, candidate, now)?;
        self.refresh_fingerprints(conn, event_id, &event.name, start_date, city_id)?;
        self.scorer.recompute(conn, event_id, now)?;
        candidates::mark_processed(
            conn,
            candidate_id,
            CandidateOutcome::Created,
            Some(event_id),
            Some(resolution.confidence),
            now,
        )?;
        metrics::merge::event_created();

        Ok(ApplyOutcome {
            event_id: Some(event_id),
            outcome: CandidateOutcome::Created,
            warning: None,
        })
    }

    fn apply_merge(
        &self,
        conn: &Connection,
        candidate: &Candidate,
        candidate_id: i64,
        resolution: &DeduplicationResult,
        now: DateTime<Utc>,
    ) -> Result<ApplyOutcome> {
        let event_id = resolution
            .existing_event_id
            .ok_or(PipelineError::MergeConflict {
                message: "merge decision without a target event".to_string(),
            })?;
        let mut event = events::get(conn, event_id)?.ok_or(PipelineError::MergeConflict {
            message: format!("merge target event {event_id} vanished"),
        })?;
        let source =
            sources::get(conn, candidate.source_id)?.ok_or(CatalogError::NotFound(format!(
                "source {}",
                candidate.source_id
            )))?;

        // The incumbents' best reliability, measured before this link lands.
        let best_existing = sources::max_reliability_for_event(conn, event_id)?.unwrap_or(0.0);
        self.link_provenance(conn, event_id, candidate, now)?;

        let mut warning = None;
        if source.reliability_score > best_existing {
            if let Some(start_date) = candidate.start_date {
                event.start_date = start_date;
            }
            if candidate.end_date.is_some() {
                event.end_date = candidate.end_date;
            }
            event.name = candidate.raw_name.clone();
            if let Some(venue_name) = candidate.venue_name.as_deref() {
                let city = refs::get_city(conn, event.city_id)?;
                event.venue_id = Some(refs::get_or_create_venue(
                    conn,
                    venue_name,
                    &format!("{}-{}", city.slug, slugify(venue_name)),
                    event.city_id,
                )?);
            }
            if let Some(organizer_name) = candidate.organizer_name.as_deref() {
                event.organizer_id = Some(refs::get_or_create_organizer(
                    conn,
                    organizer_name,
                    &slugify(organizer_name),
                )?);
            }
            if candidate.official_website.is_some() {
                event.official_website = candidate.official_website.clone();
            }
            event.updated_at = now;
            events::update(conn, &event)?;
            self.refresh_fingerprints(conn, event_id, &event.name, event.start_date, event.city_id)?;
            metrics::merge::overwrite_applied();
        } else if (source.reliability_score - best_existing).abs() < f64::EPSILON
            && disagrees(candidate, &event)
        {
            // Equal-reliability disagreement keeps the older value; the
            // linkage stays so editors can see both readings.
            let message = format!(
                "source '{}' disagrees with event {event_id} at equal reliability",
                source.name
            );
            warn!(%message);
            metrics::merge::tie_warning();
            warning = Some(message);
        }

        self.scorer.recompute(conn, event_id, now)?;
        candidates::mark_processed(
            conn,
            candidate_id,
            CandidateOutcome::Merged,
            Some(event_id),
            Some(resolution.confidence),
            now,
        )?;
        metrics::merge::event_merged();

        Ok(ApplyOutcome {
            event_id: Some(event_id),
            outcome: CandidateOutcome::Merged,
            warning,
        })
    }

    fn link_provenance(
        &self,
        conn: &Connection,
        event_id: i64,
        candidate: &Candidate,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sources::insert_event_source(
            conn,
            &EventSource {
                id: None,
                event_id,
                source_id: candidate.source_id,
                external_id: candidate.external_id.clone(),
                source_url: candidate.source_url.clone(),
                raw_payload: candidate.raw_payload.clone(),
                fetched_at: now,
                reported_start_date: candidate.start_date,
                reported_venue: candidate.venue_name.as_deref().map(normalize),
            },
        )?;
        Ok(())
    }

    fn refresh_fingerprints(
        &self,
        conn: &Connection,
        event_id: i64,
        name: &str,
        start_date: chrono::NaiveDate,
        city_id: i64,
    ) -> Result<()> {
        let prints = fingerprint::generate(FingerprintInput {
            normalized_name: &normalize(name),
            start_date: Some(start_date),
            city_id: Some(city_id),
        });
        fingerprint_index::replace_for_event(conn, event_id, &prints)?;
        Ok(())
    }
}

/// True when the candidate and the event read differently on an attribute
/// the overwrite policy covers.
fn disagrees(candidate: &Candidate, event: &Event) -> bool {
    if let Some(date) = candidate.start_date {
        if date != event.start_date {
            return true;
        }
    }
    normalize(&candidate.raw_name) != normalize(&event.name)
}

/// URL-safe slug from the raw name plus start year, suffixed on collision
/// with any non-archived event.
pub fn allocate_slug(conn: &Connection, raw_name: &str, year: i32) -> Result<String> {
    let mut base = slugify(raw_name);
    if base.is_empty() {
        base = "event".to_string();
    }
    let year_token = year.to_string();
    if !base.ends_with(&year_token) {
        base = format!("{base}-{year_token}");
    }
    if !events::slug_in_use(conn, &base)? {
        return Ok(base);
    }
    let mut counter = 2;
    loop {
        let slug = format!("{base}-{counter}");
        if !events::slug_in_use(conn, &slug)? {
            return Ok(slug);
        }
        counter += 1;
    }
}
