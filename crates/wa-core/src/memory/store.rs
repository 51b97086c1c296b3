//! Transcript persistence using SQLite

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::debug;

use crate::memory::TurnRecord;
use crate::{Error, Result};

/// Append-only SQLite transcript store
pub struct TranscriptStore {
    conn: Mutex<Connection>,
}

impl TranscriptStore {
    /// Open (or create) the transcript database at `db_path`
    pub fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        debug!("Opening transcript database at: {}", db_path);
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                utterance TEXT NOT NULL,
                answer TEXT NOT NULL,
                steps INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_turns_session_id ON turns(session_id)",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Other("transcript store lock poisoned".to_string()))
    }

    pub fn append(&self, record: &TurnRecord) -> Result<()> {
        self.lock()?.execute(
            "INSERT INTO turns (session_id, utterance, answer, steps, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.session_id,
                record.utterance,
                record.answer,
                record.steps as i64,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// The latest `limit` turns of a session, oldest first
    pub fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<TurnRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT session_id, utterance, answer, steps, created_at FROM turns
             WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![session_id, limit as i64], |row| {
            let created_at_str: String = row.get(4)?;
            let created_at = DateTime::parse_from_rfc3339(&created_at_str)
                .map_err(|_| rusqlite::Error::InvalidQuery)?
                .with_timezone(&Utc);
            let steps: i64 = row.get(3)?;

            Ok(TurnRecord {
                session_id: row.get(0)?,
                utterance: row.get(1)?,
                answer: row.get(2)?,
                steps: steps as usize,
                created_at,
            })
        })?;

        let mut result = Vec::new();
        for record in rows {
            result.push(record?);
        }
        result.reverse();
        Ok(result)
    }

    /// Forget a session, returning the number of turns removed
    pub fn clear(&self, session_id: &str) -> Result<usize> {
        let affected = self
            .lock()?
            .execute("DELETE FROM turns WHERE session_id = ?1", params![session_id])?;
        Ok(affected)
    }

    pub fn count(&self, session_id: &str) -> Result<usize> {
        let count: i64 = self.lock()?.query_row(
            "SELECT COUNT(*) FROM turns WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
