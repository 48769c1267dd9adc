// SQLite persistence layer for draft sessions.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::draft::order::RoundType;
use crate::draft::pick::{PickRecord, PickSource, PlayerRef, TeamId};
use crate::draft::state::DraftSession;

/// SQLite-backed storage for session snapshots, the pick history mirror and
/// key-value state.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                session_id    TEXT PRIMARY KEY,
                status        TEXT NOT NULL,
                current_index INTEGER NOT NULL,
                snapshot      TEXT NOT NULL,
                updated_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS draft_picks (
                session_id  TEXT NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
                pick_index  INTEGER NOT NULL,
                round       INTEGER NOT NULL,
                pick_number INTEGER NOT NULL,
                team        TEXT NOT NULL,
                player_id   TEXT NOT NULL,
                owner       TEXT,
                round_type  TEXT NOT NULL,
                source      TEXT NOT NULL,
                timestamp   TEXT NOT NULL,
                PRIMARY KEY (session_id, pick_index)
            );

            CREATE TABLE IF NOT EXISTS draft_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Write the full session record and its pick mirror in one transaction.
    /// Either both land or neither does.
    pub fn save_session(&self, session: &DraftSession) -> Result<()> {
        let snapshot = serde_json::to_string(session).context("failed to serialize session")?;

        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .context("failed to begin save_session transaction")?;

        tx.execute(
            "INSERT INTO sessions (session_id, status, current_index, snapshot, updated_at)
             VALUES (?1, ?2, ?3, ?4, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
             ON CONFLICT(session_id) DO UPDATE SET
                status        = excluded.status,
                current_index = excluded.current_index,
                snapshot      = excluded.snapshot,
                updated_at    = excluded.updated_at",
            params![
                session.id(),
                session.status().label(),
                session.current_index() as i64,
                snapshot,
            ],
        )
        .context("failed to upsert session")?;

        tx.execute(
            "DELETE FROM draft_picks WHERE session_id = ?1 AND pick_index >= ?2",
            params![session.id(), session.picks().len() as i64],
        )
        .context("failed to trim undone picks")?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO draft_picks
                        (session_id, pick_index, round, pick_number, team, player_id, owner,
                         round_type, source, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )
                .context("failed to prepare pick insert")?;
            for (index, pick) in session.picks().iter().enumerate() {
                stmt.execute(params![
                    session.id(),
                    index as i64,
                    pick.round,
                    pick.pick_number,
                    pick.team.as_str(),
                    pick.player.id.as_str(),
                    pick.player.owner.as_ref().map(|o| o.as_str()),
                    pick.round_type.label(),
                    pick.source.label(),
                    pick.timestamp.to_rfc3339(),
                ])
                .context("failed to record draft pick")?;
            }
        }

        tx.commit().context("failed to commit save_session")?;
        Ok(())
    }

    /// Load the last saved record for `session_id`.
    pub fn load_session(&self, session_id: &str) -> Result<Option<DraftSession>> {
        let conn = self.conn();
        let snapshot: Option<String> = conn
            .query_row(
                "SELECT snapshot FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query session")?;

        snapshot
            .map(|json| {
                serde_json::from_str::<DraftSession>(&json)
                    .with_context(|| format!("failed to deserialize session {session_id}"))
            })
            .transpose()
    }

    /// Read the pick mirror for `session_id`, ordered by position.
    pub fn load_picks(&self, session_id: &str) -> Result<Vec<PickRecord>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT round, pick_number, team, player_id, owner, round_type, source, timestamp
                 FROM draft_picks WHERE session_id = ?1 ORDER BY pick_index",
            )
            .context("failed to prepare load_picks query")?;

        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })
            .context("failed to query draft picks")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map draft pick rows")?;

        rows.into_iter()
            .map(
                |(round, pick_number, team, player_id, owner, round_type, source, timestamp)|
                 -> Result<PickRecord> {
                    Ok(PickRecord {
                        round,
                        pick_number,
                        team: TeamId::new(team),
                        round_type: parse_round_type(&round_type)?,
                        player: PlayerRef::new(player_id, owner.map(TeamId::new)),
                        source: parse_source(&source)?,
                        timestamp: chrono::DateTime::parse_from_rfc3339(&timestamp)
                            .with_context(|| format!("bad pick timestamp '{timestamp}'"))?
                            .with_timezone(&chrono::Utc),
                    })
                },
            )
            .collect()
    }

    /// Ids of every stored session, most recently updated first.
    pub fn list_sessions(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT session_id FROM sessions ORDER BY updated_at DESC, session_id")
            .context("failed to prepare list_sessions query")?;
        let ids = stmt
            .query_map([], |row| row.get(0))
            .context("failed to query sessions")?
            .collect::<std::result::Result<Vec<String>, _>>()
            .context("failed to map session rows")?;
        Ok(ids)
    }

    // ------------------------------------------------------------------
    // Key-value state
    // ------------------------------------------------------------------

    /// Persist an arbitrary JSON value under `key`. Uses INSERT OR REPLACE so
    /// repeated saves overwrite the previous value.
    pub fn save_state(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.conn();
        let json_str =
            serde_json::to_string(value).context("failed to serialize state value")?;
        conn.execute(
            "INSERT OR REPLACE INTO draft_state (key, value) VALUES (?1, ?2)",
            params![key, json_str],
        )
        .context("failed to save state")?;
        Ok(())
    }

    /// Load a previously saved JSON value by `key`.
    pub fn load_state(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn();
        let json_str: Option<String> = conn
            .query_row(
                "SELECT value FROM draft_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query draft state")?;

        json_str
            .map(|s| serde_json::from_str(&s).context("failed to deserialize state value"))
            .transpose()
    }

    // ------------------------------------------------------------------
    // Session ID management
    // ------------------------------------------------------------------

    /// Key used in the draft_state table to store the current session ID.
    const SESSION_ID_KEY: &'static str = "current_session_id";

    pub fn get_current_session_id(&self) -> Result<Option<String>> {
        let value = self.load_state(Self::SESSION_ID_KEY)?;
        Ok(value.and_then(|v| v.as_str().map(|s| s.to_string())))
    }

    pub fn set_current_session_id(&self, session_id: &str) -> Result<()> {
        self.save_state(
            Self::SESSION_ID_KEY,
            &serde_json::Value::String(session_id.to_string()),
        )
    }

    /// Generate a new session ID from the current UTC time.
    ///
    /// Format: `draft_YYYYMMDD_HHMMSS_SSS` (e.g. `draft_20260228_143022_123`).
    pub fn generate_session_id() -> String {
        chrono::Utc::now()
            .format("draft_%Y%m%d_%H%M%S_%3f")
            .to_string()
    }

    /// Make every subsequent write fail. Used to exercise persistence-failure
    /// paths.
    #[cfg(test)]
    pub(crate) fn set_read_only(&self, read_only: bool) -> Result<()> {
        let pragma = if read_only {
            "PRAGMA query_only = ON;"
        } else {
            "PRAGMA query_only = OFF;"
        };
        self.conn()
            .execute_batch(pragma)
            .context("failed to toggle query_only")
    }
}

fn parse_source(label: &str) -> Result<PickSource> {
    match label {
        "manual" => Ok(PickSource::Manual),
        "autopick-board" => Ok(PickSource::AutopickBoard),
        "autopick-fallback" => Ok(PickSource::AutopickFallback),
        other => anyhow::bail!("unknown pick source '{other}'"),
    }
}

fn parse_round_type(label: &str) -> Result<RoundType> {
    match label {
        "protected" => Ok(RoundType::Protected),
        "unprotected" => Ok(RoundType::Unprotected),
        other => anyhow::bail!("unknown round type '{other}'"),
    }
}
