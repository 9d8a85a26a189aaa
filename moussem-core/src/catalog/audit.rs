use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{json_from_sql, ts_from_sql, ts_to_sql};
use crate::common::error::Result;
use crate::domain::{EditorialAction, Event};

pub fn insert_action(
    conn: &Connection,
    action_type: &str,
    event_id: i64,
    actor: &str,
    payload: &serde_json::Value,
    at: DateTime<Utc>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO editorial_actions (action_type, event_id, actor, payload, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            action_type,
            event_id,
            actor,
            serde_json::to_string(payload)?,
            ts_to_sql(&at)
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_actions_for_event(conn: &Connection, event_id: i64) -> Result<Vec<EditorialAction>> {
    let mut stmt = conn.prepare(
        "SELECT id, action_type, event_id, actor, payload, created_at \
         FROM editorial_actions WHERE event_id = ?1 ORDER BY id",
    )?;
    let actions = stmt
        .query_map(params![event_id], |row| {
            Ok(EditorialAction {
                id: Some(row.get(0)?),
                action_type: row.get(1)?,
                event_id: row.get(2)?,
                actor: row.get(3)?,
                payload: json_from_sql(4, row.get(4)?)?,
                created_at: ts_from_sql(5, row.get(5)?)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(actions)
}

/// Freeze the losing event's full state before an editorial merge removes it.
pub fn insert_snapshot(
    conn: &Connection,
    event: &Event,
    reason: &str,
    at: DateTime<Utc>,
) -> Result<i64> {
    let event_id = event.id.unwrap_or_default();
    conn.execute(
        "INSERT INTO event_snapshots (event_id, snapshot, reason, created_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![
            event_id,
            serde_json::to_string(event)?,
            reason,
            ts_to_sql(&at)
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn snapshot_count_for_event(conn: &Connection, event_id: i64) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM event_snapshots WHERE event_id = ?1",
        params![event_id],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}
