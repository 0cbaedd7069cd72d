//! Per-date aggregation.
//!
//! Fetches each company's rows for one date, joins them into a single
//! frame and labels/sorts it into the report table.

use crate::error::ReportError;
use crate::models::CompanyId;
use crate::table::{MetricFrame, ReportTable, VALUE_COLUMN};
use crate::warehouse::Warehouse;
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{info, warn};

/// Company id to display name lookup. Immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct CompanyNames {
    names: HashMap<CompanyId, String>,
}

impl CompanyNames {
    pub fn new(names: HashMap<CompanyId, String>) -> Self {
        Self { names }
    }

    /// Load the map from the warehouse.
    pub async fn load(warehouse: &dyn Warehouse) -> Result<Self, ReportError> {
        let names = warehouse.fetch_company_names().await?;
        info!("Loaded {} company names", names.len());
        Ok(Self::new(names))
    }

    /// Display name, falling back to the raw id.
    pub fn display_name(&self, company: &CompanyId) -> String {
        match self.names.get(company) {
            Some(name) => name.clone(),
            None => {
                warn!("No display name for company={}, using its id", company);
                company.to_string()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

/// Builds a [`ReportTable`] for one date.
pub struct Aggregator<'a> {
    warehouse: &'a dyn Warehouse,
    names: &'a CompanyNames,
}

impl<'a> Aggregator<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, names: &'a CompanyNames) -> Self {
        Self { warehouse, names }
    }

    /// Aggregate every company's metrics for `target_date`.
    ///
    /// Fails with [`ReportError::NoData`] when the first company has no
    /// rows; emptiness of the other companies only shrinks the inner join.
    pub async fn aggregate(
        &self,
        target_date: NaiveDate,
        companies: &[CompanyId],
    ) -> Result<ReportTable, ReportError> {
        let mut combined: Option<MetricFrame> = None;

        for company in companies {
            let name = self.names.display_name(company);
            info!("Fetching data for company={}", name);

            let rows = self.warehouse.fetch_metrics(target_date, company).await?;
            let frame = MetricFrame::from_metric_rows(&rows).rename(VALUE_COLUMN, &name);

            combined = Some(match combined {
                None if frame.is_empty() => return Err(ReportError::NoData(target_date)),
                None => frame,
                Some(base) => base.inner_join_on(&frame),
            });
        }

        let frame = combined.ok_or(ReportError::NoData(target_date))?;
        Ok(frame
            .sort_by(|row| row.subcategory.priority())
            .into_report(target_date))
    }
}
