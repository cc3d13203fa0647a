//! Persisted state of full import runs
//!
//! One row per run in a small SQLite database. Checkpoint updates happen inside
//! `BEGIN IMMEDIATE` transactions, which take the database write lock before
//! reading, so two writers can never interleave a read-modify-write of the
//! completed-file list.

use super::source::ImportError;
use crate::backend::TaskId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Lifecycle state of an import run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Preparing,
    Importing,
    Swapping,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Preparing => "preparing",
            RunStatus::Importing => "importing",
            RunStatus::Swapping => "swapping",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    /// The run has ended (successfully or not)
    pub fn is_finished(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled)
    }

    /// The run holds the shadow indexes; no other run may start
    pub fn is_active(&self) -> bool {
        !self.is_finished()
    }

    /// A run in this state may be started or resumed
    ///
    /// A `swapping` run was interrupted mid-swap and resumes at the swap.
    pub fn is_restartable(&self) -> bool {
        matches!(
            self,
            RunStatus::Pending
                | RunStatus::Preparing
                | RunStatus::Importing
                | RunStatus::Swapping
                | RunStatus::Failed
        )
    }

    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        use RunStatus::*;
        match next {
            Preparing => matches!(self, Pending | Preparing | Importing | Failed),
            Importing => *self == Preparing,
            // From failed only to finish a swap that was already issued
            Swapping => matches!(self, Importing | Failed),
            Completed => *self == Swapping,
            Failed => self.is_active(),
            Cancelled => matches!(self, Pending | Preparing | Importing),
            Pending => false,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "preparing" => Ok(RunStatus::Preparing),
            "importing" => Ok(RunStatus::Importing),
            "swapping" => Ok(RunStatus::Swapping),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(format!("unknown run status '{}'", other)),
        }
    }
}

/// One full reimport
#[derive(Debug, Clone, Serialize)]
pub struct ImportRun {
    pub id: i64,
    pub status: RunStatus,
    pub total_files: usize,
    pub completed_files: usize,
    pub total_records_imported: u64,
    pub current_file: Option<String>,
    pub error_message: Option<String>,
    /// Checkpoint: documents fully written, in completion order
    pub completed_filenames: Vec<String>,
    pub cancel_requested: bool,
    /// Backend task of the issued swap, kept until the run completes
    pub swap_task: Option<TaskId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ImportRun {
    pub fn is_checkpointed(&self, filename: &str) -> bool {
        self.completed_filenames.iter().any(|f| f == filename)
    }

    /// Whether processing should stop at the next document boundary
    pub fn should_stop(&self) -> bool {
        self.cancel_requested || self.status == RunStatus::Cancelled
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_files == 0 {
            return 0.0;
        }
        (self.completed_files as f64 / self.total_files as f64 * 100.0).min(100.0)
    }

    /// Time since start, up to the finish time for ended runs
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        let start = self.started_at?;
        let end = self.finished_at.unwrap_or_else(Utc::now);
        Some(end - start)
    }
}

/// SQLite-backed store of import runs
pub struct RunStore {
    conn: Mutex<Connection>,
}

const RUN_COLUMNS: &str = "id, status, total_files, completed_files, total_records_imported, \
     current_file, error_message, completed_filenames, cancel_requested, \
     created_at, started_at, finished_at, swap_task";

impl RunStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self {
            conn: Mutex::new(Connection::open(path)?),
        };
        store.initialize()?;
        debug!(path = %path.display(), "Opened run store");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, ImportError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<(), ImportError> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(include_str!("run_schema.sql"))?;
        Ok(())
    }

    /// Create a pending run; refused while another run is active
    pub fn create(&self) -> Result<ImportRun, ImportError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let active: Option<i64> = tx
            .query_row(
                "SELECT id FROM import_run
                 WHERE status IN ('pending', 'preparing', 'importing', 'swapping')
                 ORDER BY id LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = active {
            return Err(ImportError::RunActive(id));
        }

        tx.execute(
            "INSERT INTO import_run (status, created_at) VALUES ('pending', ?1)",
            params![Utc::now().to_rfc3339()],
        )?;
        let id = tx.last_insert_rowid();
        let run = load_run(&tx, id)?;
        tx.commit()?;

        info!(run_id = id, "Created import run");
        Ok(run)
    }

    pub fn load(&self, id: i64) -> Result<ImportRun, ImportError> {
        let conn = self.conn.lock();
        load_run(&conn, id)
    }

    /// Most recent runs first
    pub fn recent(&self, limit: usize) -> Result<Vec<ImportRun>, ImportError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM import_run ORDER BY id DESC LIMIT ?1",
            RUN_COLUMNS
        ))?;
        let runs = stmt
            .query_map(params![limit as i64], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    /// The run currently holding the shadow indexes, if any
    pub fn active(&self) -> Result<Option<ImportRun>, ImportError> {
        let conn = self.conn.lock();
        let run = conn
            .query_row(
                &format!(
                    "SELECT {} FROM import_run
                     WHERE status IN ('pending', 'preparing', 'importing', 'swapping')
                     ORDER BY id LIMIT 1",
                    RUN_COLUMNS
                ),
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    /// Move a run to `next`, stamping start and finish times
    pub fn transition(&self, id: i64, next: RunStatus) -> Result<ImportRun, ImportError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let run = load_run(&tx, id)?;
        if !run.status.can_transition_to(next) {
            return Err(ImportError::InvalidTransition {
                id,
                from: run.status.to_string(),
                to: next.to_string(),
            });
        }

        let now = Utc::now().to_rfc3339();
        match next {
            RunStatus::Preparing => {
                tx.execute(
                    "UPDATE import_run
                     SET status = ?2, error_message = NULL, finished_at = NULL,
                         started_at = COALESCE(started_at, ?3)
                     WHERE id = ?1",
                    params![id, next.as_str(), now],
                )?;
            }
            status if status.is_finished() => {
                tx.execute(
                    "UPDATE import_run SET status = ?2, current_file = NULL, finished_at = ?3
                     WHERE id = ?1",
                    params![id, next.as_str(), now],
                )?;
            }
            _ => {
                tx.execute(
                    "UPDATE import_run SET status = ?2 WHERE id = ?1",
                    params![id, next.as_str()],
                )?;
            }
        }
        let run = load_run(&tx, id)?;
        tx.commit()?;

        debug!(run_id = id, status = %next, "Import run transitioned");
        Ok(run)
    }

    pub fn set_total_files(&self, id: i64, total: usize) -> Result<(), ImportError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE import_run SET total_files = ?2 WHERE id = ?1",
            params![id, total as i64],
        )?;
        Ok(())
    }

    pub fn set_current_file(&self, id: i64, filename: Option<&str>) -> Result<(), ImportError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE import_run SET current_file = ?2 WHERE id = ?1",
            params![id, filename],
        )?;
        Ok(())
    }

    /// Remember the swap task so an interrupted run can find out whether the
    /// swap happened
    pub fn set_swap_task(&self, id: i64, task: Option<TaskId>) -> Result<(), ImportError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE import_run SET swap_task = ?2 WHERE id = ?1",
            params![id, task.map(|t| t as i64)],
        )?;
        Ok(())
    }

    /// Append a document to the checkpoint and add its records to the total
    ///
    /// A document already in the checkpoint is left alone, so replaying the
    /// same completion never double-counts.
    pub fn mark_file_completed(
        &self,
        id: i64,
        filename: &str,
        records: u64,
    ) -> Result<ImportRun, ImportError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut run = load_run(&tx, id)?;

        if run.is_checkpointed(filename) {
            tx.commit()?;
            return Ok(run);
        }

        run.completed_filenames.push(filename.to_string());
        tx.execute(
            "UPDATE import_run
             SET completed_filenames = ?2, completed_files = ?3,
                 total_records_imported = total_records_imported + ?4,
                 current_file = NULL
             WHERE id = ?1",
            params![
                id,
                serde_json::to_string(&run.completed_filenames)?,
                run.completed_filenames.len() as i64,
                records as i64
            ],
        )?;
        let run = load_run(&tx, id)?;
        tx.commit()?;
        Ok(run)
    }

    /// Mark a run failed with the error class and message
    pub fn fail(&self, id: i64, error: &ImportError) -> Result<ImportRun, ImportError> {
        let message = format!("{}: {}", error.kind(), error);
        let run = self.transition(id, RunStatus::Failed)?;
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE import_run SET error_message = ?2 WHERE id = ?1",
            params![id, message],
        )?;
        Ok(ImportRun {
            error_message: Some(message),
            ..run
        })
    }

    /// Ask a run to stop at the next document boundary
    ///
    /// A run that has not started is cancelled immediately.
    pub fn request_cancel(&self, id: i64) -> Result<ImportRun, ImportError> {
        let run = self.load(id)?;
        match run.status {
            RunStatus::Pending => self.transition(id, RunStatus::Cancelled),
            RunStatus::Preparing | RunStatus::Importing => {
                let conn = self.conn.lock();
                conn.execute(
                    "UPDATE import_run SET cancel_requested = 1 WHERE id = ?1",
                    params![id],
                )?;
                load_run(&conn, id)
            }
            status => Err(ImportError::InvalidTransition {
                id,
                from: status.to_string(),
                to: RunStatus::Cancelled.to_string(),
            }),
        }
    }
}

fn load_run(conn: &Connection, id: i64) -> Result<ImportRun, ImportError> {
    conn.query_row(
        &format!("SELECT {} FROM import_run WHERE id = ?1", RUN_COLUMNS),
        params![id],
        run_from_row,
    )
    .optional()?
    .ok_or(ImportError::RunNotFound(id))
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<ImportRun> {
    let status: String = row.get(1)?;
    let status = status
        .parse::<RunStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, e.into()))?;
    let filenames: String = row.get(7)?;
    let completed_filenames: Vec<String> = serde_json::from_str(&filenames)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;

    Ok(ImportRun {
        id: row.get(0)?,
        status,
        total_files: row.get::<_, i64>(2)?.max(0) as usize,
        completed_files: row.get::<_, i64>(3)?.max(0) as usize,
        total_records_imported: row.get::<_, i64>(4)?.max(0) as u64,
        current_file: row.get(5)?,
        error_message: row.get(6)?,
        completed_filenames,
        cancel_requested: row.get::<_, i64>(8)? != 0,
        created_at: parse_time(Some(row.get(9)?)).unwrap_or_else(Utc::now),
        started_at: parse_time(row.get(10)?),
        finished_at: parse_time(row.get(11)?),
        swap_task: row.get::<_, Option<i64>>(12)?.map(|t| t.max(0) as TaskId),
    })
}

fn parse_time(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|t| t.with_timezone(&Utc))
}
