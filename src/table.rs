//! Typed tabular data for the per-date report.
//!
//! A [`MetricFrame`] has a fixed key schema (`end_date`, `subcategory`)
//! and any number of named integer value columns. Frames are combined with
//! [`MetricFrame::inner_join_on`] and finally labeled into a [`ReportTable`].

use crate::models::{MetricRow, Subcategory};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Default name of the value column in a freshly fetched frame.
pub const VALUE_COLUMN: &str = "n_users";

/// One keyed row of a [`MetricFrame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRow {
    pub end_date: NaiveDate,
    pub subcategory: Subcategory,
    pub values: Vec<i64>,
}

impl FrameRow {
    fn key(&self) -> (NaiveDate, Subcategory) {
        (self.end_date, self.subcategory)
    }
}

/// Rows keyed by `(end_date, subcategory)` with named value columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricFrame {
    columns: Vec<String>,
    rows: Vec<FrameRow>,
}

impl MetricFrame {
    /// Build a single-column frame from warehouse rows.
    pub fn from_metric_rows(rows: &[MetricRow]) -> Self {
        Self {
            columns: vec![VALUE_COLUMN.to_string()],
            rows: rows
                .iter()
                .map(|r| FrameRow {
                    end_date: r.end_date,
                    subcategory: r.subcategory,
                    values: vec![r.value],
                })
                .collect(),
        }
    }

    #[cfg(test)]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[cfg(test)]
    pub fn rows(&self) -> &[FrameRow] {
        &self.rows
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rename a value column. Unknown names leave the frame unchanged.
    pub fn rename(mut self, from: &str, to: &str) -> Self {
        for column in self.columns.iter_mut().filter(|c| c.as_str() == from) {
            *column = to.to_string();
        }
        self
    }

    /// Inner join on `(end_date, subcategory)`.
    ///
    /// Left row order is kept; each left row is paired with every matching
    /// right row. Keys missing from either side are dropped.
    pub fn inner_join_on(self, other: &MetricFrame) -> Self {
        let mut columns = self.columns;
        columns.extend(other.columns.iter().cloned());

        let mut rows = Vec::with_capacity(self.rows.len());
        for left in &self.rows {
            for right in other.rows.iter().filter(|r| r.key() == left.key()) {
                let mut values = left.values.clone();
                values.extend_from_slice(&right.values);
                rows.push(FrameRow {
                    end_date: left.end_date,
                    subcategory: left.subcategory,
                    values,
                });
            }
        }

        Self { columns, rows }
    }

    /// Stable sort by a key computed from each row.
    pub fn sort_by<K, F>(mut self, key: F) -> Self
    where
        K: Ord,
        F: FnMut(&FrameRow) -> K,
    {
        self.rows.sort_by_key(key);
        self
    }

    /// Relabel the subcategory codes and freeze the frame into a report.
    pub fn into_report(self, target_date: NaiveDate) -> ReportTable {
        ReportTable {
            target_date,
            companies: self.columns,
            rows: self
                .rows
                .into_iter()
                .map(|r| ReportRow {
                    label: r.subcategory.label(),
                    end_date: r.end_date,
                    values: r.values,
                })
                .collect(),
        }
    }
}

/// One labeled row of the final report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub label: String,
    pub end_date: NaiveDate,
    pub values: Vec<i64>,
}

/// The per-date report: `[label, end_date, one column per company]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTable {
    pub target_date: NaiveDate,
    /// Value column headers (company display names).
    pub companies: Vec<String>,
    pub rows: Vec<ReportRow>,
}

impl ReportTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column headers including the two key columns.
    pub fn headers(&self) -> Vec<String> {
        let mut headers = vec!["subcategory".to_string(), "end_date".to_string()];
        headers.extend(self.companies.iter().cloned());
        headers
    }

    /// Serialized form stored in the run ledger.
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompanyId, MetricFamily, Window};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn row(code: &str, value: i64) -> MetricRow {
        MetricRow {
            company_id: CompanyId::from("c1"),
            end_date: date(),
            subcategory: code.parse().unwrap(),
            value,
        }
    }

    #[test]
    fn test_rename() {
        let frame = MetricFrame::from_metric_rows(&[row("active_daily", 1)]).rename(VALUE_COLUMN, "Acme");
        assert_eq!(frame.columns(), ["Acme".to_string()]);

        let frame = frame.rename("missing", "Other");
        assert_eq!(frame.columns(), ["Acme".to_string()]);
    }

    #[test]
    fn test_inner_join_drops_unmatched_keys() {
        let left = MetricFrame::from_metric_rows(&[row("active_daily", 1), row("syncs_daily", 2)])
            .rename(VALUE_COLUMN, "A");
        let right = MetricFrame::from_metric_rows(&[row("syncs_daily", 20), row("created_total", 30)])
            .rename(VALUE_COLUMN, "B");

        let joined = left.inner_join_on(&right);
        assert_eq!(joined.columns(), ["A".to_string(), "B".to_string()]);
        assert_eq!(joined.len(), 1);
        assert_eq!(
            joined.rows()[0].subcategory,
            Subcategory::new(MetricFamily::Syncs, Window::Daily)
        );
        assert_eq!(joined.rows()[0].values, vec![2, 20]);
    }

    #[test]
    fn test_inner_join_with_empty_side_is_empty() {
        let left = MetricFrame::from_metric_rows(&[row("active_daily", 1)]);
        let right = MetricFrame::from_metric_rows(&[]);
        assert!(left.inner_join_on(&right).is_empty());
    }

    #[test]
    fn test_sort_by_priority() {
        let frame = MetricFrame::from_metric_rows(&[
            row("activated_daily", 4),
            row("active_total", 3),
            row("active_daily", 1),
            row("syncs_weekly", 2),
        ])
        .sort_by(|r| r.subcategory.priority());

        let codes: Vec<String> = frame.rows().iter().map(|r| r.subcategory.to_string()).collect();
        assert_eq!(codes, vec!["active_daily", "active_total", "syncs_weekly", "activated_daily"]);
    }

    #[test]
    fn test_into_report_labels_rows() {
        let table = MetricFrame::from_metric_rows(&[row("created_monthly", 7)])
            .rename(VALUE_COLUMN, "Acme")
            .into_report(date());

        assert_eq!(table.rows[0].label, "User Registrations: Month to Date");
        assert_eq!(table.headers(), vec!["subcategory", "end_date", "Acme"]);

        let json = String::from_utf8(table.to_json_bytes().unwrap()).unwrap();
        assert!(json.contains("\"User Registrations: Month to Date\""));
        assert!(json.contains("\"2024-01-01\""));
    }
}
