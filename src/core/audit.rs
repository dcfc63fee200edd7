//! Persisted record of every script sent to a server.
//!
//! One row per job *instance*, not per attempt: retries update the same
//! record in place. Jobs hold only the record id across retry boundaries
//! and re-fetch the row from the store on every attempt.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Pending => "pending",
            AuditStatus::Executing => "executing",
            AuditStatus::Completed => "completed",
            AuditStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(AuditStatus::Pending),
            "executing" => Ok(AuditStatus::Executing),
            "completed" => Ok(AuditStatus::Completed),
            "failed" => Ok(AuditStatus::Failed),
            other => Err(Error::Other(format!("Unknown audit status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: i64,
    pub server_id: String,
    /// Remote-side script filename, e.g. `provision-1712345678_123456789.sh`.
    pub filename: String,
    pub resource_type: String,
    pub resource_id: Option<i64>,
    pub run_as: Option<String>,
    /// The wrapped script exactly as sent to the server.
    pub script: String,
    /// Accumulated output across attempts, including retry/fatal notes.
    pub output: String,
    pub exit_code: Option<i32>,
    pub executed_at: Option<DateTime<Utc>>,
    pub status: AuditStatus,
    pub dismissed: bool,
}

/// Fields required to create a record; everything else starts empty.
#[derive(Debug, Clone)]
pub struct NewAuditRecord {
    pub server_id: String,
    pub filename: String,
    pub resource_type: String,
    pub resource_id: Option<i64>,
    pub run_as: Option<String>,
    pub script: String,
}

/// Query filter for the read-only listing surface.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub server_id: Option<String>,
    pub resource_type: Option<String>,
    pub status: Option<AuditStatus>,
}

pub struct AuditStore {
    conn: Mutex<Connection>,
}

impl AuditStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS audit_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                server_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                resource_type TEXT NOT NULL,
                resource_id INTEGER,
                run_as TEXT,
                script TEXT NOT NULL,
                output TEXT NOT NULL DEFAULT '',
                exit_code INTEGER,
                executed_at TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                dismissed INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_audit_server ON audit_records (server_id);
            CREATE INDEX IF NOT EXISTS idx_audit_status ON audit_records (status);",
        )?;
        Ok(())
    }

    /// Insert a new record in `Pending` status and return its id.
    pub fn create(&self, record: &NewAuditRecord) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO audit_records
                (server_id, filename, resource_type, resource_id, run_as, script)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.server_id,
                record.filename,
                record.resource_type,
                record.resource_id,
                record.run_as,
                record.script,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get(&self, id: i64) -> Result<AuditRecord> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT id, server_id, filename, resource_type, resource_id, run_as,
                        script, output, exit_code, executed_at, status, dismissed
                 FROM audit_records WHERE id = ?1",
                params![id],
                row_to_record,
            )
            .optional()?;
        record.ok_or_else(|| Error::Other(format!("Audit record #{} not found", id)))
    }

    /// Mark an attempt as in flight.
    pub fn mark_executing(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE audit_records SET status = 'executing' WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    /// Record an attempt's outcome: appended output, exit code, executed-at,
    /// and the terminal status derived from the exit code.
    pub fn finish(
        &self,
        id: i64,
        output: &str,
        exit_code: i32,
        executed_at: DateTime<Utc>,
    ) -> Result<()> {
        let status = if exit_code == 0 {
            AuditStatus::Completed
        } else {
            AuditStatus::Failed
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE audit_records
             SET output = output || ?2, exit_code = ?3, executed_at = ?4, status = ?5
             WHERE id = ?1",
            params![
                id,
                output,
                exit_code,
                executed_at.to_rfc3339(),
                status.as_str()
            ],
        )?;
        Ok(())
    }

    /// Append a note (e.g. a retry marker) to the accumulated output.
    pub fn append_output(&self, id: i64, note: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE audit_records SET output = output || ?2 || char(10) WHERE id = ?1",
            params![id, note],
        )?;
        Ok(())
    }

    /// Finalize a record as failed with a fatal note.
    pub fn mark_failed(&self, id: i64, note: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE audit_records
             SET status = 'failed', output = output || ?2 || char(10)
             WHERE id = ?1",
            params![id, note],
        )?;
        Ok(())
    }

    pub fn list(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = String::from(
            "SELECT id, server_id, filename, resource_type, resource_id, run_as,
                    script, output, exit_code, executed_at, status, dismissed
             FROM audit_records WHERE 1=1",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(server_id) = &filter.server_id {
            sql.push_str(" AND server_id = ?");
            args.push(Box::new(server_id.clone()));
        }
        if let Some(resource_type) = &filter.resource_type {
            sql.push_str(" AND resource_type = ?");
            args.push(Box::new(resource_type.clone()));
        }
        if let Some(status) = &filter.status {
            sql.push_str(" AND status = ?");
            args.push(Box::new(status.as_str().to_string()));
        }
        sql.push_str(" ORDER BY id DESC");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Acknowledge a failed record so operator-facing listings can hide it.
    pub fn dismiss(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE audit_records SET dismissed = 1 WHERE id = ?1 AND status = 'failed'",
            params![id],
        )?;
        if changed == 0 {
            return Err(Error::Other(format!(
                "Audit record #{} is not a failed record",
                id
            )));
        }
        Ok(())
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<AuditRecord> {
    let executed_at: Option<String> = row.get(9)?;
    let status: String = row.get(10)?;
    Ok(AuditRecord {
        id: row.get(0)?,
        server_id: row.get(1)?,
        filename: row.get(2)?,
        resource_type: row.get(3)?,
        resource_id: row.get(4)?,
        run_as: row.get(5)?,
        script: row.get(6)?,
        output: row.get(7)?,
        exit_code: row.get(8)?,
        executed_at: executed_at
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        status: AuditStatus::parse(&status).unwrap_or(AuditStatus::Pending),
        dismissed: row.get::<_, i64>(11)? != 0,
    })
}
