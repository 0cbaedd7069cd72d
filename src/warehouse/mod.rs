//! Warehouse access.
//!
//! The aggregator only sees the [`Warehouse`] trait; the BigQuery REST
//! client is one implementation of it.

pub mod bigquery;

pub use bigquery::{BigQueryConfig, BigQueryWarehouse};

use crate::error::ReportError;
use crate::models::{CompanyId, MetricRow};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Source of per-company metric rows.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Company id to display name map. Fetched once at startup.
    async fn fetch_company_names(&self) -> Result<HashMap<CompanyId, String>, ReportError>;

    /// Rows for exactly `end_date` and one company.
    async fn fetch_metrics(
        &self,
        end_date: NaiveDate,
        company: &CompanyId,
    ) -> Result<Vec<MetricRow>, ReportError>;
}
