//! Error taxonomy for a report batch.
//!
//! Only [`ReportError::NoData`] is recoverable: the driver skips that date and
//! moves on. Everything else aborts the batch and leaves the ledger where it
//! was, so the failed date is picked up again on the next invocation.

use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised while producing, delivering or recording a report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The first company returned no rows for the date.
    #[error("no data found for date={0}")]
    NoData(NaiveDate),

    /// Warehouse or network failure while fetching metrics.
    #[error("warehouse fetch failed: {0}")]
    Fetch(String),

    /// Renderer process failed or did not produce an image.
    #[error("render failed: {0}")]
    Render(String),

    /// Chat API rejected a message or upload.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Run ledger storage failure.
    #[error("ledger error: {0}")]
    Ledger(String),
}

impl From<rusqlite::Error> for ReportError {
    fn from(e: rusqlite::Error) -> Self {
        ReportError::Ledger(e.to_string())
    }
}

impl ReportError {
    /// Whether the driver may skip the date and continue the batch.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ReportError::NoData(_))
    }
}
