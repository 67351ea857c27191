//! SQLite-backed persistence.
//!
//! Provides:
//! - Key-value store backing the user settings
//! - History of breathing sessions (finished or stopped)
//! - Session statistics (daily and all-time)

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::data_dir;
use crate::error::SettingsError;
use crate::timer::{SessionOutcome, CYCLE_MS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub session_id: Uuid,
    pub outcome: SessionOutcome,
    pub cycle_count: u32,
    pub cycles_completed: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Stats {
    pub total_sessions: u64,
    pub finished_sessions: u64,
    pub stopped_sessions: u64,
    pub total_cycles: u64,
    /// Guided breathing time, counting completed cycles only.
    pub total_breathing_ms: u64,
    pub today_sessions: u64,
    pub today_cycles: u64,
}

/// SQLite database for settings and session history.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `<data_dir>/respiro.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened.
    pub fn open() -> Result<Self, SettingsError> {
        let path = data_dir()?.join("respiro.db");
        Self::open_at(&path)
    }

    /// Open (or create) a database file at an explicit path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self, SettingsError> {
        let conn = Connection::open(path).map_err(|source| SettingsError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_memory() -> Result<Self, SettingsError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id       TEXT NOT NULL UNIQUE,
                outcome          TEXT NOT NULL,
                cycle_count      INTEGER NOT NULL,
                cycles_completed INTEGER NOT NULL,
                started_at       TEXT NOT NULL,
                ended_at         TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_ended_at ON sessions(ended_at);",
        )?;
        Ok(())
    }

    /// Record an ended session and return its row id.
    ///
    /// Recording the same `session_id` twice keeps the first record and
    /// returns `None`.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn record_session(
        &self,
        session_id: Uuid,
        outcome: SessionOutcome,
        cycle_count: u32,
        cycles_completed: u32,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<i64>, rusqlite::Error> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO sessions
                (session_id, outcome, cycle_count, cycles_completed, started_at, ended_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session_id.to_string(),
                outcome.as_str(),
                cycle_count,
                cycles_completed,
                started_at.to_rfc3339(),
                ended_at.to_rfc3339(),
            ],
        )?;
        Ok((inserted > 0).then(|| self.conn.last_insert_rowid()))
    }

    /// Most recent sessions first.
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, outcome, cycle_count, cycles_completed, started_at, ended_at
             FROM sessions
             ORDER BY ended_at DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(SessionRecord {
                id: row.get(0)?,
                session_id: parse_uuid(1, &row.get::<_, String>(1)?)?,
                outcome: parse_outcome(2, &row.get::<_, String>(2)?)?,
                cycle_count: row.get(3)?,
                cycles_completed: row.get(4)?,
                started_at: parse_time(5, &row.get::<_, String>(5)?)?,
                ended_at: parse_time(6, &row.get::<_, String>(6)?)?,
            })
        })?;
        rows.collect()
    }

    pub fn stats_all(&self) -> Result<Stats, rusqlite::Error> {
        let mut stats = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(outcome = 'finished'), 0),
                    COALESCE(SUM(outcome = 'stopped'), 0),
                    COALESCE(SUM(cycles_completed), 0)
             FROM sessions",
            [],
            |row| {
                Ok(Stats {
                    total_sessions: row.get(0)?,
                    finished_sessions: row.get(1)?,
                    stopped_sessions: row.get(2)?,
                    total_cycles: row.get(3)?,
                    ..Stats::default()
                })
            },
        )?;
        stats.total_breathing_ms = stats.total_cycles * CYCLE_MS;

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let (today_sessions, today_cycles) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(cycles_completed), 0)
             FROM sessions
             WHERE ended_at >= ?1",
            params![format!("{today}T00:00:00+00:00")],
            |row| Ok((row.get::<_, u64>(0)?, row.get::<_, u64>(1)?)),
        )?;
        stats.today_sessions = today_sessions;
        stats.today_cycles = today_cycles;
        Ok(stats)
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Remove a key from the kv store. Missing keys are fine.
    pub fn kv_remove(&self, key: &str) -> Result<(), rusqlite::Error> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_uuid(idx: usize, raw: &str) -> Result<Uuid, rusqlite::Error> {
    Uuid::parse_str(raw).map_err(|e| conversion_error(idx, e))
}

fn parse_time(idx: usize, raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_outcome(idx: usize, raw: &str) -> Result<SessionOutcome, rusqlite::Error> {
    match raw {
        "finished" => Ok(SessionOutcome::Finished),
        "stopped" => Ok(SessionOutcome::Stopped),
        other => Err(conversion_error(
            idx,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown session outcome '{other}'"),
            ),
        )),
    }
}
