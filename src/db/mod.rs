// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Database module for persistent storage
//!
//! Holds everything that must survive a process kill: unsent batches,
//! scheduler timing and checkpoints, sessions and small settings.

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use crate::adapters::{Channel, HealthSample};
use crate::config::DatabaseConfig;
use crate::core::{ScheduledTask, TaskKind, TaskResult};
use crate::error::{OrchestratorError, Result};
use crate::geofence::{ActivitySession, SessionKind};
use crate::sync::{BatchStatus, SyncBatch};

/// Database manager
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create database
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&config.path)?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        "#,
        )?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_tables()?;

        info!("Database opened at {:?}", config.path);
        Ok(db)
    }

    /// Throwaway database for tests and demo runs without a data dir
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            -- Unsent upload batches
            CREATE TABLE IF NOT EXISTS batches (
                id TEXT PRIMARY KEY,
                channel TEXT NOT NULL,
                created_at TEXT NOT NULL,
                attempt_count INTEGER NOT NULL,
                status TEXT NOT NULL,
                retry_at TEXT,
                last_error TEXT,
                samples BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_batches_created ON batches(created_at);

            -- Scheduler registry
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                interval_seconds INTEGER NOT NULL,
                next_run_at TEXT NOT NULL,
                last_result TEXT NOT NULL,
                checkpoint TEXT,
                background_only INTEGER NOT NULL
            );

            -- Activity sessions
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                trigger_region_id TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at);

            -- Settings table
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        )?;

        Ok(())
    }

    /// Insert or overwrite a batch
    pub fn save_batch(&self, batch: &SyncBatch) -> Result<()> {
        let samples = bincode::serialize(&batch.samples)?;
        let conn = self.conn.lock();

        conn.execute(
            r#"INSERT OR REPLACE INTO batches
               (id, channel, created_at, attempt_count, status, retry_at, last_error, samples)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                batch.id.to_string(),
                batch.channel.as_str(),
                timestamp(&batch.created_at),
                batch.attempt_count,
                batch.status.as_str(),
                batch.retry_at.as_ref().map(timestamp),
                batch.last_error,
                samples
            ],
        )?;
        Ok(())
    }

    pub fn delete_batch(&self, id: &Uuid) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM batches WHERE id = ?1", params![id.to_string()])?;
        Ok(())
    }

    /// Every batch not yet acknowledged, oldest first
    pub fn load_batches(&self) -> Result<Vec<SyncBatch>> {
        let rows = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                r#"SELECT id, channel, created_at, attempt_count, status, retry_at, last_error, samples
                   FROM batches WHERE status != 'succeeded' ORDER BY created_at"#,
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(BatchRow {
                    id: row.get(0)?,
                    channel: row.get(1)?,
                    created_at: row.get(2)?,
                    attempt_count: row.get(3)?,
                    status: row.get(4)?,
                    retry_at: row.get(5)?,
                    last_error: row.get(6)?,
                    samples: row.get(7)?,
                })
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        rows.into_iter().map(BatchRow::into_batch).collect()
    }

    pub fn save_task(&self, task: &ScheduledTask) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"INSERT OR REPLACE INTO tasks
               (id, kind, interval_seconds, next_run_at, last_result, checkpoint, background_only)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                task.id,
                task.kind.as_str(),
                task.interval_seconds as i64,
                timestamp(&task.next_run_at),
                task.last_result.as_str(),
                task.checkpoint,
                task.background_only
            ],
        )?;
        Ok(())
    }

    pub fn load_task(&self, id: &str) -> Result<Option<ScheduledTask>> {
        let row = {
            let conn = self.conn.lock();
            conn.query_row(
                r#"SELECT id, kind, interval_seconds, next_run_at, last_result, checkpoint, background_only
                   FROM tasks WHERE id = ?1"#,
                params![id],
                TaskRow::from_row,
            )
            .optional()?
        };
        row.map(TaskRow::into_task).transpose()
    }

    pub fn load_tasks(&self) -> Result<Vec<ScheduledTask>> {
        let rows = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                r#"SELECT id, kind, interval_seconds, next_run_at, last_result, checkpoint, background_only
                   FROM tasks ORDER BY id"#,
            )?;
            let rows = stmt.query_map([], TaskRow::from_row)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    pub fn save_session(&self, session: &ActivitySession) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"INSERT OR REPLACE INTO sessions (id, kind, started_at, ended_at, trigger_region_id)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                session.id.to_string(),
                session.kind.as_str(),
                timestamp(&session.started_at),
                session.ended_at.as_ref().map(timestamp),
                session.trigger_region_id
            ],
        )?;
        Ok(())
    }

    /// Sessions without an end time, oldest first
    pub fn load_open_sessions(&self) -> Result<Vec<ActivitySession>> {
        self.query_sessions(
            "SELECT id, kind, started_at, ended_at, trigger_region_id FROM sessions
             WHERE ended_at IS NULL ORDER BY started_at",
        )
    }

    pub fn delete_session(&self, id: &Uuid) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM sessions WHERE id = ?1", params![id.to_string()])?;
        Ok(())
    }

    fn query_sessions(&self, sql: &str) -> Result<Vec<ActivitySession>> {
        let rows = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        rows.into_iter()
            .map(|(id, kind, started_at, ended_at, trigger_region_id)| {
                Ok(ActivitySession {
                    id: parse_uuid(&id)?,
                    kind: SessionKind::parse(&kind).ok_or_else(|| corrupt("session kind", &kind))?,
                    started_at: parse_time(&started_at)?,
                    ended_at: ended_at.as_deref().map(parse_time).transpose()?,
                    trigger_region_id,
                })
            })
            .collect()
    }

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let conn = self.conn.lock();

        let batch_count: i64 = conn.query_row("SELECT COUNT(*) FROM batches", [], |row| row.get(0))?;
        let task_count: i64 = conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;
        let session_count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;

        let size_bytes: i64 = conn
            .query_row(
                "SELECT page_count * page_size as size FROM pragma_page_count(), pragma_page_size()",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        Ok(DatabaseStats {
            batch_count: batch_count as usize,
            task_count: task_count as usize,
            session_count: session_count as usize,
            size_bytes: size_bytes as u64,
        })
    }

    /// Store a setting
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        debug!("Setting '{}' updated", key);
        Ok(())
    }

    /// Get a setting
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();

        let value = conn
            .query_row("SELECT value FROM settings WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }
}

struct BatchRow {
    id: String,
    channel: String,
    created_at: String,
    attempt_count: u32,
    status: String,
    retry_at: Option<String>,
    last_error: Option<String>,
    samples: Vec<u8>,
}

impl BatchRow {
    fn into_batch(self) -> Result<SyncBatch> {
        let samples: Vec<HealthSample> = bincode::deserialize(&self.samples)?;
        Ok(SyncBatch {
            id: parse_uuid(&self.id)?,
            channel: Channel::parse(&self.channel).ok_or_else(|| corrupt("channel", &self.channel))?,
            samples,
            created_at: parse_time(&self.created_at)?,
            attempt_count: self.attempt_count,
            status: BatchStatus::parse(&self.status).ok_or_else(|| corrupt("batch status", &self.status))?,
            retry_at: self.retry_at.as_deref().map(parse_time).transpose()?,
            last_error: self.last_error,
        })
    }
}

struct TaskRow {
    id: String,
    kind: String,
    interval_seconds: i64,
    next_run_at: String,
    last_result: String,
    checkpoint: Option<String>,
    background_only: bool,
}

impl TaskRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            interval_seconds: row.get(2)?,
            next_run_at: row.get(3)?,
            last_result: row.get(4)?,
            checkpoint: row.get(5)?,
            background_only: row.get(6)?,
        })
    }

    fn into_task(self) -> Result<ScheduledTask> {
        Ok(ScheduledTask {
            kind: TaskKind::parse(&self.kind).ok_or_else(|| corrupt("task kind", &self.kind))?,
            interval_seconds: self.interval_seconds.max(0) as u64,
            next_run_at: parse_time(&self.next_run_at)?,
            last_result: TaskResult::parse(&self.last_result).ok_or_else(|| corrupt("task result", &self.last_result))?,
            checkpoint: self.checkpoint,
            background_only: self.background_only,
            id: self.id,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub batch_count: usize,
    pub task_count: usize,
    pub session_count: usize,
    pub size_bytes: u64,
}

/// Fixed-width RFC 3339 so text ordering matches time ordering
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| OrchestratorError::Serialization(format!("bad timestamp '{}': {}", s, e)))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| OrchestratorError::Serialization(format!("bad id '{}': {}", s, e)))
}

fn corrupt(what: &str, value: &str) -> OrchestratorError {
    OrchestratorError::Serialization(format!("unknown {} '{}'", what, value))
}
