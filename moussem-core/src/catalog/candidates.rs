use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{
    day_to_sql, enum_from_sql, json_from_sql, opt_day_from_sql, opt_ts_from_sql, ts_from_sql,
    ts_to_sql,
};
use crate::common::error::Result;
use crate::domain::{Candidate, CandidateOutcome};

const CANDIDATE_COLUMNS: &str = "id, source_id, external_id, source_url, raw_payload, raw_name, \
     normalized_name, event_type, start_date, end_date, raw_city, city_id, venue_name, \
     organizer_name, description, official_website, ticket_url, genres, artists, processed, \
     outcome, matched_event_id, match_confidence, ingested_at, processed_at";

fn candidate_from_row(row: &Row) -> rusqlite::Result<Candidate> {
    let genres: Vec<String> = serde_json::from_value(json_from_sql(17, row.get(17)?)?)
        .unwrap_or_default();
    let artists: Vec<String> = serde_json::from_value(json_from_sql(18, row.get(18)?)?)
        .unwrap_or_default();
    let outcome: Option<String> = row.get(20)?;
    Ok(Candidate {
        id: Some(row.get(0)?),
        source_id: row.get(1)?,
        external_id: row.get(2)?,
        source_url: row.get(3)?,
        raw_payload: json_from_sql(4, row.get(4)?)?,
        raw_name: row.get(5)?,
        normalized_name: row.get(6)?,
        event_type: enum_from_sql(7, row.get(7)?)?,
        start_date: opt_day_from_sql(8, row.get(8)?)?,
        end_date: opt_day_from_sql(9, row.get(9)?)?,
        raw_city: row.get(10)?,
        city_id: row.get(11)?,
        venue_name: row.get(12)?,
        organizer_name: row.get(13)?,
        description: row.get(14)?,
        official_website: row.get(15)?,
        ticket_url: row.get(16)?,
        genres,
        artists,
        processed: row.get(19)?,
        outcome: outcome.map(|s| enum_from_sql(20, s)).transpose()?,
        matched_event_id: row.get(21)?,
        match_confidence: row.get(22)?,
        ingested_at: ts_from_sql(23, row.get(23)?)?,
        processed_at: opt_ts_from_sql(24, row.get(24)?)?,
    })
}

/// Always appends, even for a repeated external_id. Dedup happens downstream
/// at the resolver.
pub fn insert(conn: &Connection, candidate: &Candidate) -> Result<i64> {
    conn.execute(
        "INSERT INTO candidates (source_id, external_id, source_url, raw_payload, raw_name, \
         normalized_name, event_type, start_date, end_date, raw_city, city_id, venue_name, \
         organizer_name, description, official_website, ticket_url, genres, artists, processed, \
         ingested_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, \
         ?18, 0, ?19)",
        params![
            candidate.source_id,
            candidate.external_id,
            candidate.source_url,
            serde_json::to_string(&candidate.raw_payload)?,
            candidate.raw_name,
            candidate.normalized_name,
            candidate.event_type.as_str(),
            candidate.start_date.as_ref().map(day_to_sql),
            candidate.end_date.as_ref().map(day_to_sql),
            candidate.raw_city,
            candidate.city_id,
            candidate.venue_name,
            candidate.organizer_name,
            candidate.description,
            candidate.official_website,
            candidate.ticket_url,
            serde_json::to_string(&candidate.genres)?,
            serde_json::to_string(&candidate.artists)?,
            ts_to_sql(&candidate.ingested_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Candidate>> {
    let candidate = conn
        .query_row(
            &format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = ?1"),
            params![id],
            candidate_from_row,
        )
        .optional()?;
    Ok(candidate)
}

pub fn mark_processed(
    conn: &Connection,
    id: i64,
    outcome: CandidateOutcome,
    matched_event_id: Option<i64>,
    match_confidence: Option<f64>,
    at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE candidates SET processed = 1, outcome = ?1, matched_event_id = ?2, \
         match_confidence = ?3, processed_at = ?4 WHERE id = ?5",
        params![
            outcome.as_str(),
            matched_event_id,
            match_confidence,
            ts_to_sql(&at),
            id
        ],
    )?;
    Ok(())
}

pub fn list_unprocessed(conn: &Connection, limit: Option<u32>) -> Result<Vec<Candidate>> {
    let sql = match limit {
        Some(n) => format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE processed = 0 \
             ORDER BY ingested_at, id LIMIT {n}"
        ),
        None => format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE processed = 0 \
             ORDER BY ingested_at, id"
        ),
    };
    let mut stmt = conn.prepare(&sql)?;
    let candidates = stmt
        .query_map([], candidate_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(candidates)
}

/// Candidates parked for a human decision.
pub fn list_review_pending(conn: &Connection) -> Result<Vec<Candidate>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE outcome = 'review' \
         ORDER BY ingested_at, id"
    ))?;
    let candidates = stmt
        .query_map([], candidate_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(candidates)
}

/// Weekly sweep of unprocessed candidates that nobody will come back for.
pub fn garbage_collect_older_than(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM candidates WHERE processed = 0 AND ingested_at < ?1",
        params![ts_to_sql(&cutoff)],
    )?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{sources, Catalog};
    use crate::domain::{EventType, Source, SourceType};
    use chrono::Duration;

    fn staged(source_id: i64, external_id: &str, ingested_at: DateTime<Utc>) -> Candidate {
        Candidate {
            id: None,
            source_id,
            external_id: Some(external_id.to_string()),
            source_url: None,
            raw_payload: serde_json::json!({"raw": true}),
            raw_name: "Festival Test".to_string(),
            normalized_name: "test".to_string(),
            event_type: EventType::Festival,
            start_date: None,
            end_date: None,
            raw_city: None,
            city_id: None,
            venue_name: None,
            organizer_name: None,
            description: None,
            official_website: None,
            ticket_url: None,
            genres: vec!["Gnawa".to_string()],
            artists: vec![],
            processed: false,
            outcome: None,
            matched_event_id: None,
            match_confidence: None,
            ingested_at,
            processed_at: None,
        }
    }

    fn seed_source(catalog: &Catalog) -> i64 {
        catalog
            .with_conn(|conn| {
                sources::upsert(
                    conn,
                    &Source {
                        id: None,
                        name: "test-source".to_string(),
                        source_type: SourceType::Api,
                        reliability_score: 0.8,
                        is_active: true,
                        last_fetch_at: None,
                        accuracy_score: None,
                    },
                )
            })
            .unwrap()
    }

    #[test]
    fn insert_always_appends_even_for_duplicate_external_ids() {
        let catalog = Catalog::open_in_memory().unwrap();
        let source_id = seed_source(&catalog);
        let now = Utc::now();
        catalog
            .with_conn(|conn| insert(conn, &staged(source_id, "X-1", now)))
            .unwrap();
        catalog
            .with_conn(|conn| insert(conn, &staged(source_id, "X-1", now)))
            .unwrap();
        let pending = catalog.with_conn(|conn| list_unprocessed(conn, None)).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].genres, vec!["Gnawa".to_string()]);
    }

    #[test]
    fn mark_processed_records_the_outcome_and_match() {
        let catalog = Catalog::open_in_memory().unwrap();
        let source_id = seed_source(&catalog);
        let now = Utc::now();
        let id = catalog
            .with_conn(|conn| insert(conn, &staged(source_id, "X-1", now)))
            .unwrap();
        catalog
            .with_conn(|conn| {
                mark_processed(conn, id, CandidateOutcome::Review, Some(7), Some(0.82), now)
            })
            .unwrap();
        assert!(catalog
            .with_conn(|conn| list_unprocessed(conn, None))
            .unwrap()
            .is_empty());
        let review = catalog.with_conn(list_review_pending).unwrap();
        assert_eq!(review.len(), 1);
        assert_eq!(review[0].matched_event_id, Some(7));
        assert!(review[0].processed);
    }

    #[test]
    fn gc_only_removes_old_unprocessed_rows() {
        let catalog = Catalog::open_in_memory().unwrap();
        let source_id = seed_source(&catalog);
        let now = Utc::now();
        let old = now - Duration::days(45);
        let stale_id = catalog
            .with_conn(|conn| insert(conn, &staged(source_id, "OLD", old)))
            .unwrap();
        let processed_old_id = catalog
            .with_conn(|conn| insert(conn, &staged(source_id, "DONE", old)))
            .unwrap();
        catalog
            .with_conn(|conn| {
                mark_processed(
                    conn,
                    processed_old_id,
                    CandidateOutcome::Created,
                    Some(1),
                    Some(1.0),
                    now,
                )
            })
            .unwrap();
        catalog
            .with_conn(|conn| insert(conn, &staged(source_id, "FRESH", now)))
            .unwrap();

        let removed = catalog
            .with_conn(|conn| garbage_collect_older_than(conn, now - Duration::days(30)))
            .unwrap();
        assert_eq!(removed, 1);
        let remaining = catalog.with_conn(|conn| list_unprocessed(conn, None)).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].external_id.as_deref(), Some("FRESH"));
        assert!(catalog.with_conn(|conn| get(conn, stale_id)).unwrap().is_none());
    }
}
