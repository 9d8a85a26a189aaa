//! Authoritative catalog store.
//!
//! A thin wrapper over SQLite. Row operations live in per-entity modules as
//! free functions taking `&Connection`, so the same helpers work standalone
//! and inside a transaction (`Transaction` derefs to `Connection`). Callers
//! that need the resolve/apply/fingerprint/confidence cycle to commit
//! atomically run it through [`Catalog::with_tx`].

pub mod audit;
pub mod candidates;
pub mod events;
pub mod fingerprints;
pub mod refs;
pub mod schema;
pub mod sources;

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Transaction};

use crate::common::error::{CatalogError, Result};

pub struct Catalog {
    conn: Mutex<Connection>,
}

impl Catalog {
    /// Open (and migrate) the catalog at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        Self::init(conn)
    }

    /// In-memory catalog, used by the test suite.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(schema::SCHEMA)?;
        conn.execute_batch(schema::SEEDS)?;
        tracing::debug!("catalog schema and reference seeds applied");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run read-only or single-statement work against the connection. The
    /// error type is generic so callers layering their own error over
    /// [`CatalogError`] can run their logic directly.
    pub fn with_conn<T, E>(&self, f: impl FnOnce(&Connection) -> std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<CatalogError>,
    {
        let conn = self.conn.lock().expect("catalog lock poisoned");
        f(&conn)
    }

    /// Run `f` inside a transaction; commits on Ok, rolls back on Err.
    pub fn with_tx<T, E>(&self, f: impl FnOnce(&Transaction) -> std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<CatalogError>,
    {
        let mut conn = self.conn.lock().expect("catalog lock poisoned");
        let tx = conn
            .transaction()
            .map_err(|e| E::from(CatalogError::from(e)))?;
        let out = f(&tx)?;
        tx.commit().map_err(|e| E::from(CatalogError::from(e)))?;
        Ok(out)
    }
}

// Column conversion helpers shared by the row mappers. Timestamps are stored
// as RFC 3339 text, dates as YYYY-MM-DD text.

pub(crate) fn ts_to_sql(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub(crate) fn ts_from_sql(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_ts_from_sql(
    idx: usize,
    s: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.map(|s| ts_from_sql(idx, s)).transpose()
}

pub(crate) fn day_to_sql(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub(crate) fn day_from_sql(idx: usize, s: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_day_from_sql(
    idx: usize,
    s: Option<String>,
) -> rusqlite::Result<Option<NaiveDate>> {
    s.map(|s| day_from_sql(idx, s)).transpose()
}

pub(crate) fn enum_from_sql<T>(idx: usize, s: String) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    s.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn json_from_sql(idx: usize, s: String) -> rusqlite::Result<serde_json::Value> {
    serde_json::from_str(&s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
