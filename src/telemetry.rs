//! Observability context handed to the run driver.
//!
//! Holds the batch span and the counters reported when the batch ends.

use crate::models::RunType;
use crate::schedule::DateRange;
use chrono::NaiveDate;
use tracing::{info, info_span, Span};

/// Events emitted by the driver as it walks the date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryEvent {
    /// Aggregation finished for a date
    DateFetched(NaiveDate),
    /// Date had no data and was skipped
    DateSkipped(NaiveDate),
    /// Text and image were posted for a date
    DateDelivered(NaiveDate),
    /// Ledger row written for a date
    DateRecorded(NaiveDate),
}

/// Counters aggregated from telemetry events.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub fetched: usize,
    pub skipped: Vec<NaiveDate>,
    pub delivered: usize,
    pub recorded: Vec<NaiveDate>,
}

impl RunStats {
    pub fn update(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::DateFetched(_) => self.fetched += 1,
            TelemetryEvent::DateSkipped(date) => self.skipped.push(*date),
            TelemetryEvent::DateDelivered(_) => self.delivered += 1,
            TelemetryEvent::DateRecorded(date) => self.recorded.push(*date),
        }
    }
}

/// Per-batch observability context.
#[derive(Debug)]
pub struct RunTelemetry {
    span: Span,
    stats: RunStats,
}

impl RunTelemetry {
    pub fn new(run_type: RunType) -> Self {
        Self {
            span: info_span!("batch", run_type = %run_type, start = tracing::field::Empty, end = tracing::field::Empty),
            stats: RunStats::default(),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Attach the reconciled range to the batch span.
    pub fn set_range(&self, range: &DateRange) {
        self.span.record("start", tracing::field::display(range.start));
        self.span.record("end", tracing::field::display(range.end));
    }

    pub fn emit(&mut self, event: TelemetryEvent) {
        self.stats.update(&event);
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Log the batch totals.
    pub fn report(&self) {
        let _guard = self.span.enter();
        info!(
            fetched = self.stats.fetched,
            skipped = self.stats.skipped.len(),
            delivered = self.stats.delivered,
            recorded = self.stats.recorded.len(),
            "Batch finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_update() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut telemetry = RunTelemetry::new(RunType::Scheduled);

        telemetry.emit(TelemetryEvent::DateFetched(date));
        telemetry.emit(TelemetryEvent::DateDelivered(date));
        telemetry.emit(TelemetryEvent::DateRecorded(date));
        telemetry.emit(TelemetryEvent::DateSkipped(date.succ_opt().unwrap()));

        let stats = telemetry.stats();
        assert_eq!(stats.fetched, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.recorded, vec![date]);
        assert_eq!(stats.skipped.len(), 1);
    }
}
