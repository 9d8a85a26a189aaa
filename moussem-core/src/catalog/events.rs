use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{
    day_from_sql, day_to_sql, enum_from_sql, opt_day_from_sql, opt_ts_from_sql, ts_from_sql,
    ts_to_sql,
};
use crate::common::error::Result;
use crate::domain::{Artist, City, Event, EventStatus, Genre, Organizer, Region, Venue};

const EVENT_COLUMNS: &str = "id, slug, name, event_type, start_date, end_date, city_id, \
     region_id, venue_id, organizer_id, description, official_website, ticket_url, status, \
     is_verified, is_pinned, cultural_significance, confidence_score, created_at, updated_at, \
     last_verified_at";

fn event_from_row(row: &Row) -> rusqlite::Result<Event> {
    Ok(Event {
        id: Some(row.get(0)?),
        slug: row.get(1)?,
        name: row.get(2)?,
        event_type: enum_from_sql(3, row.get(3)?)?,
        start_date: day_from_sql(4, row.get(4)?)?,
        end_date: opt_day_from_sql(5, row.get(5)?)?,
        city_id: row.get(6)?,
        region_id: row.get(7)?,
        venue_id: row.get(8)?,
        organizer_id: row.get(9)?,
        description: row.get(10)?,
        official_website: row.get(11)?,
        ticket_url: row.get(12)?,
        status: enum_from_sql(13, row.get(13)?)?,
        is_verified: row.get(14)?,
        is_pinned: row.get(15)?,
        cultural_significance: row.get(16)?,
        confidence_score: row.get(17)?,
        created_at: ts_from_sql(18, row.get(18)?)?,
        updated_at: ts_from_sql(19, row.get(19)?)?,
        last_verified_at: opt_ts_from_sql(20, row.get(20)?)?,
    })
}

pub fn insert(conn: &Connection, event: &Event) -> Result<i64> {
    conn.execute(
        "INSERT INTO events (slug, name, event_type, start_date, end_date, city_id, region_id, \
         venue_id, organizer_id, description, official_website, ticket_url, status, is_verified, \
         is_pinned, cultural_significance, confidence_score, created_at, updated_at, \
         last_verified_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, \
         ?18, ?19, ?20)",
        params![
            event.slug,
            event.name,
            event.event_type.as_str(),
            day_to_sql(&event.start_date),
            event.end_date.as_ref().map(day_to_sql),
            event.city_id,
            event.region_id,
            event.venue_id,
            event.organizer_id,
            event.description,
            event.official_website,
            event.ticket_url,
            event.status.as_str(),
            event.is_verified,
            event.is_pinned,
            event.cultural_significance,
            event.confidence_score,
            ts_to_sql(&event.created_at),
            ts_to_sql(&event.updated_at),
            event.last_verified_at.as_ref().map(ts_to_sql),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Event>> {
    let event = conn
        .query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
            params![id],
            event_from_row,
        )
        .optional()?;
    Ok(event)
}

/// Overwrite the mutable columns of an event row.
pub fn update(conn: &Connection, event: &Event) -> Result<()> {
    let id = event.id.ok_or(crate::CatalogError::Invalid {
        field: "event.id",
        value: "None".to_string(),
    })?;
    conn.execute(
        "UPDATE events SET slug = ?1, name = ?2, event_type = ?3, start_date = ?4, end_date = ?5, \
         city_id = ?6, region_id = ?7, venue_id = ?8, organizer_id = ?9, description = ?10, \
         official_website = ?11, ticket_url = ?12, status = ?13, is_verified = ?14, \
         is_pinned = ?15, cultural_significance = ?16, confidence_score = ?17, updated_at = ?18, \
         last_verified_at = ?19 WHERE id = ?20",
        params![
            event.slug,
            event.name,
            event.event_type.as_str(),
            day_to_sql(&event.start_date),
            event.end_date.as_ref().map(day_to_sql),
            event.city_id,
            event.region_id,
            event.venue_id,
            event.organizer_id,
            event.description,
            event.official_website,
            event.ticket_url,
            event.status.as_str(),
            event.is_verified,
            event.is_pinned,
            event.cultural_significance,
            event.confidence_score,
            ts_to_sql(&event.updated_at),
            event.last_verified_at.as_ref().map(ts_to_sql),
            id,
        ],
    )?;
    Ok(())
}

/// Remove an event row. Only the editorial merge path does this, after
/// snapshotting and re-linking provenance.
pub fn delete(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM event_genres WHERE event_id = ?1", params![id])?;
    conn.execute("DELETE FROM event_artists WHERE event_id = ?1", params![id])?;
    conn.execute("DELETE FROM events WHERE id = ?1", params![id])?;
    Ok(())
}

pub fn set_confidence(conn: &Connection, id: i64, score: f64, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE events SET confidence_score = ?1, last_verified_at = ?2, updated_at = ?2 \
         WHERE id = ?3",
        params![score, ts_to_sql(&now), id],
    )?;
    Ok(())
}

pub fn set_status(conn: &Connection, id: i64, status: EventStatus, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE events SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), ts_to_sql(&now), id],
    )?;
    Ok(())
}

pub fn set_verified(conn: &Connection, id: i64, flag: bool, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE events SET is_verified = ?1, last_verified_at = ?2, updated_at = ?2 WHERE id = ?3",
        params![flag, ts_to_sql(&now), id],
    )?;
    Ok(())
}

pub fn set_pinned(conn: &Connection, id: i64, flag: bool, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE events SET is_pinned = ?1, updated_at = ?2 WHERE id = ?3",
        params![flag, ts_to_sql(&now), id],
    )?;
    Ok(())
}

pub fn set_significance(conn: &Connection, id: i64, score: u8, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE events SET cultural_significance = ?1, updated_at = ?2 WHERE id = ?3",
        params![score, ts_to_sql(&now), id],
    )?;
    Ok(())
}

/// True when a non-archived event already owns the slug.
pub fn slug_in_use(conn: &Connection, slug: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM events WHERE slug = ?1 AND status != 'archived'",
        params![slug],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn list_ids_with_status(conn: &Connection, statuses: &[EventStatus]) -> Result<Vec<i64>> {
    let placeholders = std::iter::repeat("?")
        .take(statuses.len())
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT id FROM events WHERE status IN ({placeholders}) ORDER BY start_date, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let params = rusqlite::params_from_iter(statuses.iter().map(|s| s.as_str()));
    let ids = stmt
        .query_map(params, |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

pub fn count_with_status(conn: &Connection, statuses: &[EventStatus]) -> Result<u64> {
    let placeholders = std::iter::repeat("?")
        .take(statuses.len())
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("SELECT COUNT(*) FROM events WHERE status IN ({placeholders})");
    let params = rusqlite::params_from_iter(statuses.iter().map(|s| s.as_str()));
    let count: i64 = conn.query_row(&sql, params, |row| row.get(0))?;
    Ok(count as u64)
}

/// Events whose run is over (end date, or start date when single-day) and
/// that are still visible.
pub fn list_past_unarchived(conn: &Connection, today: NaiveDate) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM events WHERE status != 'archived' \
         AND COALESCE(end_date, start_date) < ?1 ORDER BY id",
    )?;
    let ids = stmt
        .query_map(params![day_to_sql(&today)], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

/// Events not re-verified since the cutoff, due for a confidence refresh.
pub fn list_stale_verified(conn: &Connection, cutoff: DateTime<Utc>) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM events WHERE status != 'archived' \
         AND (last_verified_at IS NULL OR last_verified_at < ?1) ORDER BY id",
    )?;
    let ids = stmt
        .query_map(params![ts_to_sql(&cutoff)], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

pub fn link_genre(conn: &Connection, event_id: i64, genre_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO event_genres (event_id, genre_id) VALUES (?1, ?2)",
        params![event_id, genre_id],
    )?;
    Ok(())
}

pub fn link_artist(conn: &Connection, event_id: i64, artist_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO event_artists (event_id, artist_id) VALUES (?1, ?2)",
        params![event_id, artist_id],
    )?;
    Ok(())
}

/// Move the loser's artist links onto the keeper, dropping duplicates.
pub fn relink_artists(conn: &Connection, from_event: i64, to_event: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO event_artists (event_id, artist_id) \
         SELECT ?1, artist_id FROM event_artists WHERE event_id = ?2",
        params![to_event, from_event],
    )?;
    conn.execute(
        "DELETE FROM event_artists WHERE event_id = ?1",
        params![from_event],
    )?;
    Ok(())
}

pub fn relink_genres(conn: &Connection, from_event: i64, to_event: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO event_genres (event_id, genre_id) \
         SELECT ?1, genre_id FROM event_genres WHERE event_id = ?2",
        params![to_event, from_event],
    )?;
    conn.execute(
        "DELETE FROM event_genres WHERE event_id = ?1",
        params![from_event],
    )?;
    Ok(())
}

pub fn genres_for(conn: &Connection, event_id: i64) -> Result<Vec<Genre>> {
    let mut stmt = conn.prepare(
        "SELECT g.id, g.name, g.slug FROM genres g \
         JOIN event_genres eg ON eg.genre_id = g.id WHERE eg.event_id = ?1 ORDER BY g.name",
    )?;
    let genres = stmt
        .query_map(params![event_id], |row| {
            Ok(Genre {
                id: Some(row.get(0)?),
                name: row.get(1)?,
                slug: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(genres)
}

pub fn artists_for(conn: &Connection, event_id: i64) -> Result<Vec<Artist>> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.name, a.slug FROM artists a \
         JOIN event_artists ea ON ea.artist_id = a.id WHERE ea.event_id = ?1 ORDER BY a.name",
    )?;
    let artists = stmt
        .query_map(params![event_id], |row| {
            Ok(Artist {
                id: Some(row.get(0)?),
                name: row.get(1)?,
                slug: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(artists)
}

/// An event joined with everything the projection transform needs.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub event: Event,
    pub city: City,
    pub region: Region,
    pub venue: Option<Venue>,
    pub organizer: Option<Organizer>,
    pub genres: Vec<Genre>,
    pub artists: Vec<Artist>,
}

pub fn load_record(conn: &Connection, id: i64) -> Result<Option<EventRecord>> {
    let Some(event) = get(conn, id)? else {
        return Ok(None);
    };
    let city = super::refs::get_city(conn, event.city_id)?;
    let region = super::refs::get_region(conn, event.region_id)?;
    let venue = match event.venue_id {
        Some(venue_id) => super::refs::get_venue(conn, venue_id)?,
        None => None,
    };
    let organizer = match event.organizer_id {
        Some(organizer_id) => super::refs::get_organizer(conn, organizer_id)?,
        None => None,
    };
    let genres = genres_for(conn, id)?;
    let artists = artists_for(conn, id)?;
    Ok(Some(EventRecord {
        event,
        city,
        region,
        venue,
        organizer,
        genres,
        artists,
    }))
}
