use rusqlite::{params, Connection, OptionalExtension};

use crate::common::error::{CatalogError, Result};
use crate::domain::{City, Organizer, Region, Venue};

pub fn get_region(conn: &Connection, id: i64) -> Result<Region> {
    conn.query_row(
        "SELECT id, name, slug FROM regions WHERE id = ?1",
        params![id],
        |row| {
            Ok(Region {
                id: row.get(0)?,
                name: row.get(1)?,
                slug: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| CatalogError::NotFound(format!("region {id}")))
}

pub fn get_city(conn: &Connection, id: i64) -> Result<City> {
    conn.query_row(
        "SELECT id, name, slug, region_id, latitude, longitude FROM cities WHERE id = ?1",
        params![id],
        city_from_row,
    )
    .optional()?
    .ok_or_else(|| CatalogError::NotFound(format!("city {id}")))
}

fn city_from_row(row: &rusqlite::Row) -> rusqlite::Result<City> {
    Ok(City {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        region_id: row.get(3)?,
        latitude: row.get(4)?,
        longitude: row.get(5)?,
    })
}

pub fn list_cities(conn: &Connection) -> Result<Vec<City>> {
    let mut stmt =
        conn.prepare("SELECT id, name, slug, region_id, latitude, longitude FROM cities")?;
    let cities = stmt
        .query_map([], city_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(cities)
}

/// Every recognized spelling for rows of a reference table: canonical name,
/// slug, and the aliases linked from its alias table.
fn list_name_variants(
    conn: &Connection,
    table: &str,
    alias_table: &str,
    alias_fk: &str,
) -> Result<Vec<(String, i64)>> {
    let mut variants = Vec::new();
    let mut stmt = conn.prepare(&format!("SELECT name, slug, id FROM {table}"))?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;
    for row in rows {
        let (name, slug, id) = row?;
        variants.push((name, id));
        variants.push((slug, id));
    }
    let mut stmt = conn.prepare(&format!("SELECT alias, {alias_fk} FROM {alias_table}"))?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    for row in rows {
        variants.push(row?);
    }
    Ok(variants)
}

pub fn list_city_name_variants(conn: &Connection) -> Result<Vec<(String, i64)>> {
    list_name_variants(conn, "cities", "city_aliases", "city_id")
}

pub fn list_genre_name_variants(conn: &Connection) -> Result<Vec<(String, i64)>> {
    list_name_variants(conn, "genres", "genre_aliases", "genre_id")
}

pub fn get_venue(conn: &Connection, id: i64) -> Result<Option<Venue>> {
    let venue = conn
        .query_row(
            "SELECT id, name, slug, city_id, address FROM venues WHERE id = ?1",
            params![id],
            |row| {
                Ok(Venue {
                    id: Some(row.get(0)?),
                    name: row.get(1)?,
                    slug: row.get(2)?,
                    city_id: row.get(3)?,
                    address: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(venue)
}

pub fn get_or_create_venue(conn: &Connection, name: &str, slug: &str, city_id: i64) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM venues WHERE slug = ?1",
            params![slug],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO venues (name, slug, city_id) VALUES (?1, ?2, ?3)",
        params![name, slug, city_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_organizer(conn: &Connection, id: i64) -> Result<Option<Organizer>> {
    let organizer = conn
        .query_row(
            "SELECT id, name, slug, website FROM organizers WHERE id = ?1",
            params![id],
            |row| {
                Ok(Organizer {
                    id: Some(row.get(0)?),
                    name: row.get(1)?,
                    slug: row.get(2)?,
                    website: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(organizer)
}

pub fn get_or_create_organizer(conn: &Connection, name: &str, slug: &str) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM organizers WHERE slug = ?1",
            params![slug],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO organizers (name, slug) VALUES (?1, ?2)",
        params![name, slug],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_or_create_artist(conn: &Connection, name: &str, slug: &str) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM artists WHERE slug = ?1",
            params![slug],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO artists (name, slug) VALUES (?1, ?2)",
        params![name, slug],
    )?;
    Ok(conn.last_insert_rowid())
}

