//! SQLite run ledger.
//!
//! Append-only record of every delivered report. The newest scheduled
//! `target_date` decides where the next batch starts.

use crate::error::ReportError;
use crate::models::{RunRecord, RunType};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, info, warn};

const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_date TEXT NOT NULL,
    target_date TEXT NOT NULL,
    output_table BLOB NOT NULL,
    output_image BLOB NOT NULL,
    run_type TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_runs_target ON runs (run_type, target_date);
";

/// Handle to the ledger database. Open once per process.
pub struct RunLedger {
    conn: Connection,
}

impl RunLedger {
    /// Open (or create) the ledger file at `path`.
    pub fn open(path: &Path) -> Result<Self, ReportError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ReportError::Ledger(format!("failed to create {}: {}", parent.display(), e))
                })?;
            }
        }

        info!("Opening run ledger: {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, ReportError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, ReportError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Wipe every recorded run.
    pub fn purge(&mut self) -> Result<(), ReportError> {
        warn!("Purging run ledger");
        let tx = self.conn.transaction()?;
        tx.execute_batch("DROP TABLE IF EXISTS runs;")?;
        tx.execute_batch(SCHEMA)?;
        tx.commit()?;
        Ok(())
    }

    /// `MAX(target_date)` over scheduled runs.
    pub fn last_target_date(&self) -> Result<Option<NaiveDate>, ReportError> {
        let max: Option<String> = self.conn.query_row(
            "SELECT MAX(target_date) FROM runs WHERE run_type = ?1",
            params![RunType::Scheduled.as_str()],
            |row| row.get(0),
        )?;
        debug!("Last recorded target_date: {:?}", max);

        max.map(|s| parse_stored_date(&s)).transpose()
    }

    /// Append one run in its own transaction.
    pub fn record(
        &mut self,
        target_date: NaiveDate,
        output_table: &[u8],
        output_image: &[u8],
        run_type: RunType,
    ) -> Result<RunRecord, ReportError> {
        let run_timestamp = Utc::now();

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO runs (run_date, target_date, output_table, output_image, run_type)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run_timestamp.to_rfc3339(),
                target_date.format(DATE_FORMAT).to_string(),
                output_table,
                output_image,
                run_type.as_str(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!("Recorded run {} for target_date={} ({})", id, target_date, run_type);

        Ok(RunRecord {
            id,
            run_timestamp,
            target_date,
            output_table: output_table.to_vec(),
            output_image: output_image.to_vec(),
            run_type,
        })
    }

    /// Number of runs of the given type.
    pub fn count(&self, run_type: RunType) -> Result<usize, ReportError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM runs WHERE run_type = ?1",
            params![run_type.as_str()],
            |row| row.get(0),
        )?;
        Ok(n.max(0) as usize)
    }
}

fn parse_stored_date(s: &str) -> Result<NaiveDate, ReportError> {
    // Older rows may carry a time component after the date.
    let date_part = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(date_part, DATE_FORMAT).map_err(|e| conversion_error(e.to_string()))
}

fn conversion_error(message: String) -> ReportError {
    ReportError::Ledger(message)
}
