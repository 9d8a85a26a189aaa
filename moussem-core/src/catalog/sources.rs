use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{
    day_to_sql, enum_from_sql, json_from_sql, opt_day_from_sql, opt_ts_from_sql, ts_from_sql,
    ts_to_sql,
};
use crate::common::error::Result;
use crate::domain::{EventSource, Source};

fn source_from_row(row: &Row) -> rusqlite::Result<Source> {
    Ok(Source {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        source_type: enum_from_sql(2, row.get(2)?)?,
        reliability_score: row.get(3)?,
        is_active: row.get(4)?,
        last_fetch_at: opt_ts_from_sql(5, row.get(5)?)?,
        accuracy_score: row.get(6)?,
    })
}

const SOURCE_COLUMNS: &str =
    "id, name, source_type, reliability_score, is_active, last_fetch_at, accuracy_score";

/// Sync a registry spec into the sources table. The fetch cursor and the
/// accumulated accuracy history survive spec updates.
pub fn upsert(conn: &Connection, source: &Source) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM sources WHERE name = ?1",
            params![source.name],
            |row| row.get(0),
        )
        .optional()?;
    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE sources SET source_type = ?1, reliability_score = ?2, is_active = ?3 \
                 WHERE id = ?4",
                params![
                    source.source_type.as_str(),
                    source.reliability_score,
                    source.is_active,
                    id
                ],
            )?;
            Ok(id)
        }
        None => {
            conn.execute(
                "INSERT INTO sources (name, source_type, reliability_score, is_active, \
                 last_fetch_at, accuracy_score) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    source.name,
                    source.source_type.as_str(),
                    source.reliability_score,
                    source.is_active,
                    source.last_fetch_at.as_ref().map(ts_to_sql),
                    source.accuracy_score,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        }
    }
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Source>> {
    let source = conn
        .query_row(
            &format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?1"),
            params![id],
            source_from_row,
        )
        .optional()?;
    Ok(source)
}

pub fn get_by_name(conn: &Connection, name: &str) -> Result<Option<Source>> {
    let source = conn
        .query_row(
            &format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE name = ?1"),
            params![name],
            source_from_row,
        )
        .optional()?;
    Ok(source)
}

pub fn list_active(conn: &Connection) -> Result<Vec<Source>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE is_active = 1"))?;
    let sources = stmt
        .query_map([], source_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(sources)
}

pub fn set_last_fetch_at(conn: &Connection, id: i64, at: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE sources SET last_fetch_at = ?1 WHERE id = ?2",
        params![ts_to_sql(&at), id],
    )?;
    Ok(())
}

pub fn insert_event_source(conn: &Connection, link: &EventSource) -> Result<i64> {
    conn.execute(
        "INSERT INTO event_sources (event_id, source_id, external_id, source_url, raw_payload, \
         fetched_at, reported_start_date, reported_venue) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            link.event_id,
            link.source_id,
            link.external_id,
            link.source_url,
            serde_json::to_string(&link.raw_payload)?,
            ts_to_sql(&link.fetched_at),
            link.reported_start_date.as_ref().map(day_to_sql),
            link.reported_venue,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Provenance rows for an event, each joined with its source.
pub fn for_event(conn: &Connection, event_id: i64) -> Result<Vec<(EventSource, Source)>> {
    let mut stmt = conn.prepare(
        "SELECT es.id, es.event_id, es.source_id, es.external_id, es.source_url, es.raw_payload, \
         es.fetched_at, es.reported_start_date, es.reported_venue, \
         s.id, s.name, s.source_type, s.reliability_score, s.is_active, s.last_fetch_at, \
         s.accuracy_score \
         FROM event_sources es JOIN sources s ON s.id = es.source_id \
         WHERE es.event_id = ?1 ORDER BY es.id",
    )?;
    let rows = stmt
        .query_map(params![event_id], |row| {
            let link = EventSource {
                id: Some(row.get(0)?),
                event_id: row.get(1)?,
                source_id: row.get(2)?,
                external_id: row.get(3)?,
                source_url: row.get(4)?,
                raw_payload: json_from_sql(5, row.get(5)?)?,
                fetched_at: ts_from_sql(6, row.get(6)?)?,
                reported_start_date: opt_day_from_sql(7, row.get(7)?)?,
                reported_venue: row.get(8)?,
            };
            let source = Source {
                id: Some(row.get(9)?),
                name: row.get(10)?,
                source_type: enum_from_sql(11, row.get(11)?)?,
                reliability_score: row.get(12)?,
                is_active: row.get(13)?,
                last_fetch_at: opt_ts_from_sql(14, row.get(14)?)?,
                accuracy_score: row.get(15)?,
            };
            Ok((link, source))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn count_for_event(conn: &Connection, event_id: i64) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM event_sources WHERE event_id = ?1",
        params![event_id],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Best reliability among an event's linked sources, if it has any.
pub fn max_reliability_for_event(conn: &Connection, event_id: i64) -> Result<Option<f64>> {
    let max: Option<f64> = conn.query_row(
        "SELECT MAX(s.reliability_score) FROM event_sources es \
         JOIN sources s ON s.id = es.source_id WHERE es.event_id = ?1",
        params![event_id],
        |row| row.get(0),
    )?;
    Ok(max)
}

/// Move all provenance rows from one event to another (editorial merge).
pub fn relink(conn: &Connection, from_event: i64, to_event: i64) -> Result<usize> {
    let moved = conn.execute(
        "UPDATE event_sources SET event_id = ?1 WHERE event_id = ?2",
        params![to_event, from_event],
    )?;
    Ok(moved)
}
