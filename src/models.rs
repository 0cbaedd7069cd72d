//! Data models for the usage digest.
//!
//! This module contains the metric vocabulary (families, windows,
//! subcategory codes) and the records exchanged between the warehouse,
//! the aggregator and the run ledger.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Warehouse identifier of a company.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(pub String);

impl CompanyId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CompanyId {
    fn from(s: &str) -> Self {
        CompanyId(s.trim().to_string())
    }
}

/// Metric family of a subcategory code.
///
/// Declaration order is the row priority in the rendered table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricFamily {
    /// Users active in the window
    Active,
    /// Distinct users that synced
    Syncs,
    /// New registrations
    Created,
    /// First logins
    Activated,
}

impl MetricFamily {
    #[cfg(test)]
    pub const ALL: [MetricFamily; 4] = [
        MetricFamily::Active,
        MetricFamily::Syncs,
        MetricFamily::Created,
        MetricFamily::Activated,
    ];

    /// Raw code used by the warehouse.
    pub fn code(&self) -> &'static str {
        match self {
            MetricFamily::Active => "active",
            MetricFamily::Syncs => "syncs",
            MetricFamily::Created => "created",
            MetricFamily::Activated => "activated",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            MetricFamily::Active => 0,
            MetricFamily::Syncs => 1,
            MetricFamily::Created => 2,
            MetricFamily::Activated => 3,
        }
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricFamily::Active => write!(f, "Active Users"),
            MetricFamily::Syncs => write!(f, "Unique User Syncs"),
            MetricFamily::Created => write!(f, "User Registrations"),
            MetricFamily::Activated => write!(f, "First Logins"),
        }
    }
}

impl FromStr for MetricFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MetricFamily::Active),
            "syncs" => Ok(MetricFamily::Syncs),
            "created" => Ok(MetricFamily::Created),
            "activated" => Ok(MetricFamily::Activated),
            other => Err(format!("unknown metric family: {}", other)),
        }
    }
}

/// Aggregation window of a subcategory code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    Daily,
    Weekly,
    Monthly,
    Total,
}

impl Window {
    #[cfg(test)]
    pub const ALL: [Window; 4] = [Window::Daily, Window::Weekly, Window::Monthly, Window::Total];

    pub fn code(&self) -> &'static str {
        match self {
            Window::Daily => "daily",
            Window::Weekly => "weekly",
            Window::Monthly => "monthly",
            Window::Total => "total",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Window::Daily => 0,
            Window::Weekly => 1,
            Window::Monthly => 2,
            Window::Total => 3,
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::Daily => write!(f, "Daily"),
            Window::Weekly => write!(f, "Week to Date"),
            Window::Monthly => write!(f, "Month to Date"),
            Window::Total => write!(f, "All time"),
        }
    }
}

impl FromStr for Window {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Window::Daily),
            "weekly" => Ok(Window::Weekly),
            "monthly" => Ok(Window::Monthly),
            "total" => Ok(Window::Total),
            other => Err(format!("unknown window: {}", other)),
        }
    }
}

/// A parsed subcategory code such as `active_daily`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Subcategory {
    pub family: MetricFamily,
    pub window: Window,
}

impl Subcategory {
    pub fn new(family: MetricFamily, window: Window) -> Self {
        Self { family, window }
    }

    /// Human label, e.g. `Active Users: Daily`.
    pub fn label(&self) -> String {
        format!("{}: {}", self.family, self.window)
    }

    /// Composite sort key (family rank, window rank).
    pub fn priority(&self) -> (u8, u8) {
        (self.family.rank(), self.window.rank())
    }

    /// Every subcategory in table order.
    #[cfg(test)]
    pub fn all() -> impl Iterator<Item = Subcategory> {
        MetricFamily::ALL
            .into_iter()
            .flat_map(|family| Window::ALL.into_iter().map(move |window| Subcategory { family, window }))
    }
}

impl fmt::Display for Subcategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.family.code(), self.window.code())
    }
}

impl FromStr for Subcategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (family, window) = s
            .trim()
            .rsplit_once('_')
            .ok_or_else(|| format!("malformed subcategory code: {}", s))?;
        Ok(Subcategory {
            family: family.parse()?,
            window: window.parse()?,
        })
    }
}

/// One row returned by the warehouse metric query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRow {
    pub company_id: CompanyId,
    pub end_date: NaiveDate,
    pub subcategory: Subcategory,
    /// Number of users.
    pub value: i64,
}

/// Tag stored with every ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    /// A real batch; these rows drive reconciliation.
    Scheduled,
    /// Smoke test of the delivery path.
    DryRun,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::Scheduled => "scheduled",
            RunType::DryRun => "dryrun",
        }
    }

    #[cfg(test)]
    pub fn from_tag(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(RunType::Scheduled),
            "dryrun" => Some(RunType::DryRun),
            _ => None,
        }
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed report run as stored in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub id: i64,
    pub run_timestamp: DateTime<Utc>,
    pub target_date: NaiveDate,
    /// Report table serialized as JSON.
    pub output_table: Vec<u8>,
    /// Rendered PNG.
    pub output_image: Vec<u8>,
    pub run_type: RunType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_ordering_matches_rank() {
        assert!(MetricFamily::Active < MetricFamily::Syncs);
        assert!(MetricFamily::Syncs < MetricFamily::Created);
        assert!(MetricFamily::Created < MetricFamily::Activated);
        assert_eq!(MetricFamily::Activated.rank(), 3);
    }

    #[test]
    fn test_subcategory_from_str() {
        let sub: Subcategory = "active_daily".parse().unwrap();
        assert_eq!(sub, Subcategory::new(MetricFamily::Active, Window::Daily));

        let sub: Subcategory = "activated_total".parse().unwrap();
        assert_eq!(sub.family, MetricFamily::Activated);
        assert_eq!(sub.window, Window::Total);

        assert!("active".parse::<Subcategory>().is_err());
        assert!("retained_daily".parse::<Subcategory>().is_err());
        assert!("syncs_yearly".parse::<Subcategory>().is_err());
    }

    #[test]
    fn test_subcategory_label() {
        let sub = Subcategory::new(MetricFamily::Syncs, Window::Weekly);
        assert_eq!(sub.label(), "Unique User Syncs: Week to Date");
        assert_eq!(sub.to_string(), "syncs_weekly");

        let sub = Subcategory::new(MetricFamily::Created, Window::Total);
        assert_eq!(sub.label(), "User Registrations: All time");
    }

    #[test]
    fn test_subcategory_all_in_priority_order() {
        let all: Vec<Subcategory> = Subcategory::all().collect();
        assert_eq!(all.len(), 16);
        assert_eq!(all[0].to_string(), "active_daily");
        assert_eq!(all[4].to_string(), "syncs_daily");
        assert_eq!(all[15].to_string(), "activated_total");

        let mut sorted = all.clone();
        sorted.sort_by_key(|s| s.priority());
        assert_eq!(sorted, all);
    }

    #[test]
    fn test_run_type_tags() {
        assert_eq!(RunType::Scheduled.as_str(), "scheduled");
        assert_eq!(RunType::from_tag("dryrun"), Some(RunType::DryRun));
        assert_eq!(RunType::from_tag("other"), None);
    }
}
