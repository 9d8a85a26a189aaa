use rusqlite::{params, Connection};

use crate::common::error::Result;
use crate::domain::{Fingerprint, FingerprintKind};

/// Replace the full fingerprint set for an event. Removal and insertion run
/// under the caller's transaction so the lookup index never shows a partial
/// set.
pub fn replace_for_event(
    conn: &Connection,
    event_id: i64,
    prints: &[(FingerprintKind, String)],
) -> Result<()> {
    conn.execute(
        "DELETE FROM fingerprints WHERE event_id = ?1",
        params![event_id],
    )?;
    for (kind, hash) in prints {
        conn.execute(
            "INSERT OR IGNORE INTO fingerprints (kind, hash, event_id) VALUES (?1, ?2, ?3)",
            params![kind.as_str(), hash, event_id],
        )?;
    }
    Ok(())
}

pub fn delete_for_event(conn: &Connection, event_id: i64) -> Result<()> {
    conn.execute(
        "DELETE FROM fingerprints WHERE event_id = ?1",
        params![event_id],
    )?;
    Ok(())
}

/// Event ids owning the given fingerprint, oldest event first.
pub fn lookup(conn: &Connection, kind: FingerprintKind, hash: &str) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT f.event_id FROM fingerprints f JOIN events e ON e.id = f.event_id \
         WHERE f.kind = ?1 AND f.hash = ?2 ORDER BY e.created_at, e.id",
    )?;
    let ids = stmt
        .query_map(params![kind.as_str(), hash], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

pub fn list_for_event(conn: &Connection, event_id: i64) -> Result<Vec<Fingerprint>> {
    let mut stmt =
        conn.prepare("SELECT kind, hash FROM fingerprints WHERE event_id = ?1 ORDER BY kind")?;
    let rows = stmt
        .query_map(params![event_id], |row| {
            Ok(Fingerprint {
                kind: super::enum_from_sql::<FingerprintKind>(0, row.get(0)?)?,
                hash: row.get(1)?,
                event_id,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
