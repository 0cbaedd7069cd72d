//! Batch driver.
//!
//! Reconciles the date range against the ledger, then walks it one date at
//! a time: aggregate, render, deliver, record. A date with no data is
//! skipped; any other failure ends the batch with the ledger untouched for
//! that date, so the next invocation retries it.

use crate::aggregate::{Aggregator, CompanyNames};
use crate::delivery::Delivery;
use crate::error::ReportError;
use crate::ledger::RunLedger;
use crate::models::{CompanyId, MetricFamily, RunType, Subcategory, Window};
use crate::render::Renderer;
use crate::report;
use crate::schedule::{compute_range, DateRange};
use crate::table::{ReportRow, ReportTable};
use crate::telemetry::{RunTelemetry, TelemetryEvent};
use crate::warehouse::Warehouse;
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::{debug, info, warn, Instrument};

/// Where the driver is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Reconciling,
    UpToDate,
    Fetching,
    SkipNoData,
    Rendering,
    Delivering,
    Recording,
    Done,
}

/// Settings for one batch.
#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Companies in column order. The first one gates data availability.
    pub companies: Vec<CompanyId>,
    pub channel: String,
    pub min_start_date: Option<NaiveDate>,
    pub max_days: u32,
    pub dry_run: bool,
    /// Directory receiving `<date>.html` / `<date>.png` copies, if any.
    pub artifacts_dir: Option<PathBuf>,
}

impl BatchSettings {
    fn run_type(&self) -> RunType {
        if self.dry_run {
            RunType::DryRun
        } else {
            RunType::Scheduled
        }
    }
}

/// How a batch ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Nothing to report.
    UpToDate(DateRange),
    /// Every date in the range was either delivered or skipped.
    Completed {
        range: DateRange,
        delivered: Vec<NaiveDate>,
        skipped: Vec<NaiveDate>,
    },
}

enum DateOutcome {
    Delivered,
    Skipped,
}

/// Collaborators a batch runs against.
pub struct RunDriver<'a> {
    warehouse: &'a dyn Warehouse,
    names: &'a CompanyNames,
    renderer: &'a dyn Renderer,
    delivery: &'a dyn Delivery,
    ledger: &'a mut RunLedger,
    settings: BatchSettings,
    phase: Phase,
}

impl<'a> RunDriver<'a> {
    pub fn new(
        warehouse: &'a dyn Warehouse,
        names: &'a CompanyNames,
        renderer: &'a dyn Renderer,
        delivery: &'a dyn Delivery,
        ledger: &'a mut RunLedger,
        settings: BatchSettings,
    ) -> Self {
        Self {
            warehouse,
            names,
            renderer,
            delivery,
            ledger,
            settings,
            phase: Phase::Idle,
        }
    }

    #[cfg(test)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn transition(&mut self, next: Phase) {
        debug!("{:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    /// Work out the range this batch would cover.
    pub fn reconcile(&mut self, current_date: NaiveDate) -> Result<DateRange, ReportError> {
        self.transition(Phase::Reconciling);
        let last = self.ledger.last_target_date()?;
        let range = compute_range(
            last,
            self.settings.min_start_date,
            self.settings.max_days,
            current_date,
        );
        info!(
            "Generating data for daterange: {} ({} days)",
            range,
            range.len_days()
        );
        Ok(range)
    }

    /// Run the batch up to (excluding) `current_date`.
    pub async fn run(
        &mut self,
        current_date: NaiveDate,
        telemetry: &mut RunTelemetry,
    ) -> Result<BatchOutcome, ReportError> {
        let span = telemetry.span().clone();
        let outcome = self.run_batch(current_date, telemetry).instrument(span).await;
        telemetry.report();
        outcome
    }

    async fn run_batch(
        &mut self,
        current_date: NaiveDate,
        telemetry: &mut RunTelemetry,
    ) -> Result<BatchOutcome, ReportError> {
        let range = self.reconcile(current_date)?;
        telemetry.set_range(&range);

        if range.is_up_to_date() {
            self.transition(Phase::UpToDate);
            info!("Current posts already up to date");
            return Ok(BatchOutcome::UpToDate(range));
        }

        let mut delivered = Vec::new();
        let mut skipped = Vec::new();

        for target_date in range.days() {
            match self.process_date(target_date, telemetry).await? {
                DateOutcome::Delivered => delivered.push(target_date),
                DateOutcome::Skipped => skipped.push(target_date),
            }
        }

        self.transition(Phase::Done);
        Ok(BatchOutcome::Completed {
            range,
            delivered,
            skipped,
        })
    }

    async fn process_date(
        &mut self,
        target_date: NaiveDate,
        telemetry: &mut RunTelemetry,
    ) -> Result<DateOutcome, ReportError> {
        self.transition(Phase::Fetching);
        let table = match self.build_table(target_date).await {
            Ok(table) if table.is_empty() => {
                // Later companies lacked every key the first one had
                self.skip(target_date, telemetry);
                return Ok(DateOutcome::Skipped);
            }
            Ok(table) => table,
            Err(e) if e.is_recoverable() => {
                self.skip(target_date, telemetry);
                return Ok(DateOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };
        telemetry.emit(TelemetryEvent::DateFetched(target_date));

        self.transition(Phase::Rendering);
        let html = report::generate_html(&table);
        let image = self.renderer.render(&html).await?;
        self.keep_artifacts(target_date, &html, &image).await;

        self.transition(Phase::Delivering);
        let text = if self.settings.dry_run {
            report::dry_run_message(target_date)
        } else {
            report::report_message(target_date)
        };
        self.delivery.send_text(&self.settings.channel, &text).await?;
        self.delivery
            .send_image(
                &self.settings.channel,
                &image,
                &report::image_caption(target_date),
            )
            .await?;
        telemetry.emit(TelemetryEvent::DateDelivered(target_date));

        self.transition(Phase::Recording);
        let table_json = table
            .to_json_bytes()
            .map_err(|e| ReportError::Ledger(format!("failed to serialize table: {}", e)))?;
        let run = self
            .ledger
            .record(target_date, &table_json, &image, self.settings.run_type())?;
        debug!(
            id = run.id,
            target_date = %run.target_date,
            run_type = %run.run_type,
            run_timestamp = %run.run_timestamp,
            table_bytes = run.output_table.len(),
            image_bytes = run.output_image.len(),
            "Run stored"
        );
        telemetry.emit(TelemetryEvent::DateRecorded(target_date));

        Ok(DateOutcome::Delivered)
    }

    async fn build_table(&self, target_date: NaiveDate) -> Result<ReportTable, ReportError> {
        if self.settings.dry_run {
            return Ok(dry_run_table(target_date));
        }
        Aggregator::new(self.warehouse, self.names)
            .aggregate(target_date, &self.settings.companies)
            .await
    }

    fn skip(&mut self, target_date: NaiveDate, telemetry: &mut RunTelemetry) {
        self.transition(Phase::SkipNoData);
        warn!("No data found for date={}", target_date);
        telemetry.emit(TelemetryEvent::DateSkipped(target_date));
    }

    async fn keep_artifacts(&self, target_date: NaiveDate, html: &str, image: &[u8]) {
        let Some(dir) = &self.settings.artifacts_dir else {
            return;
        };
        let stem = target_date.format("%Y-%m-%d").to_string();

        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!("Cannot create {}: {}", dir.display(), e);
            return;
        }
        if let Err(e) = tokio::fs::write(dir.join(format!("{}.html", stem)), html).await {
            warn!("Failed to keep HTML for {}: {}", stem, e);
        }
        if let Err(e) = tokio::fs::write(dir.join(format!("{}.png", stem)), image).await {
            warn!("Failed to keep image for {}: {}", stem, e);
        }
    }
}

/// Minimal in-memory table used by dry runs.
pub fn dry_run_table(target_date: NaiveDate) -> ReportTable {
    let rows = [Window::Daily, Window::Weekly, Window::Monthly]
        .into_iter()
        .zip(1..)
        .map(|(window, value)| ReportRow {
            label: Subcategory::new(MetricFamily::Active, window).label(),
            end_date: target_date,
            values: vec![value],
        })
        .collect();

    ReportTable {
        target_date,
        companies: vec!["Test".to_string()],
        rows,
    }
}
