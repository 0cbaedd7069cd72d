//! Configuration file handling.
//!
//! Loads `.usagebot.toml` and merges it with CLI arguments.

use crate::models::CompanyId;
use crate::warehouse::BigQueryConfig;
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = ".usagebot.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub warehouse: WarehouseConfig,

    #[serde(default)]
    pub slack: SlackConfig,

    #[serde(default)]
    pub renderer: RendererConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Holds `runs.sqlite3` and the `rundata/` artifacts.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Channel the digest is posted to.
    #[serde(default = "default_target_channel")]
    pub target_channel: String,

    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            target_channel: default_target_channel(),
            verbose: false,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./analytics_slackbot_data")
}

fn default_target_channel() -> String {
    "test_channel".to_string()
}

/// Which dates and companies a batch covers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Company ids in column order. The first one gates data availability.
    #[serde(default = "default_companies")]
    pub companies: Vec<String>,

    /// Earliest date ever reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,

    /// Maximum number of dates per batch.
    #[serde(default = "default_n_days")]
    pub n_days: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            companies: default_companies(),
            start_date: None,
            n_days: default_n_days(),
        }
    }
}

fn default_companies() -> Vec<String> {
    vec![
        "603de62548d6dc001315dfb4",
        "5b3eefcc04802c000ff7c91e",
        "603a1e1248d6dc001315a2c7",
        "600690d96bbcf900128a87d8",
        "5ed45e746be1a70012b152b7",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_n_days() -> u32 {
    2
}

/// BigQuery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default = "default_bigquery_url")]
    pub api_url: String,

    #[serde(default = "default_project")]
    pub project: String,

    #[serde(default = "default_dataset")]
    pub dataset: String,

    #[serde(default = "default_metrics_table")]
    pub metrics_table: String,

    #[serde(default = "default_names_table")]
    pub names_table: String,

    #[serde(default = "default_warehouse_timeout")]
    pub timeout_seconds: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            api_url: default_bigquery_url(),
            project: default_project(),
            dataset: default_dataset(),
            metrics_table: default_metrics_table(),
            names_table: default_names_table(),
            timeout_seconds: default_warehouse_timeout(),
        }
    }
}

fn default_bigquery_url() -> String {
    "https://bigquery.googleapis.com/bigquery/v2".to_string()
}

fn default_project() -> String {
    "aktivophase2pushnotification".to_string()
}

fn default_dataset() -> String {
    "integrated_reporting_precomp".to_string()
}

fn default_metrics_table() -> String {
    "cs_interative_compiled".to_string()
}

fn default_names_table() -> String {
    "company_name_map".to_string()
}

fn default_warehouse_timeout() -> u64 {
    120
}

/// Slack Web API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    #[serde(default = "default_slack_url")]
    pub api_url: String,

    #[serde(default = "default_slack_timeout")]
    pub timeout_seconds: u64,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            api_url: default_slack_url(),
            timeout_seconds: default_slack_timeout(),
        }
    }
}

fn default_slack_url() -> String {
    "https://slack.com/api".to_string()
}

fn default_slack_timeout() -> u64 {
    30
}

/// HTML to PNG renderer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Program invoked as `<program> <args...> <html> <png>`.
    #[serde(default = "default_renderer_program")]
    pub program: String,

    #[serde(default = "default_renderer_args")]
    pub args: Vec<String>,

    /// Keep a copy of each day's HTML and PNG under `<data_dir>/rundata/`.
    #[serde(default = "default_true")]
    pub keep_artifacts: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            program: default_renderer_program(),
            args: default_renderer_args(),
            keep_artifacts: true,
        }
    }
}

fn default_renderer_program() -> String {
    "wkhtmltoimage".to_string()
}

fn default_renderer_args() -> Vec<String> {
    vec!["--quiet".to_string()]
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values given explicitly on the command line override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref data_dir) = args.data_dir {
            self.general.data_dir = data_dir.clone();
        }
        if let Some(ref channel) = args.target_channel {
            self.general.target_channel = channel.clone();
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if let Some(ref companies) = args.companies {
            self.schedule.companies = companies
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
        }
        if let Some(start_date) = args.start_date {
            self.schedule.start_date = Some(start_date);
        }
        if let Some(n_days) = args.n_days {
            self.schedule.n_days = n_days;
        }

        if let Some(ref program) = args.renderer {
            self.renderer.program = program.clone();
        }
    }

    /// Check the merged settings before any batch work starts.
    pub fn validate(&self, dry_run: bool) -> Result<()> {
        if self.company_ids().is_empty() {
            bail!("At least one company must be configured");
        }
        if self.schedule.n_days == 0 {
            bail!("n_days must be at least 1");
        }
        if self.schedule.start_date.is_none() && !dry_run {
            bail!("start_date needs to be specified for non-dryrun runs");
        }
        if self.general.target_channel.trim().is_empty() {
            bail!("target_channel must not be empty");
        }
        Ok(())
    }

    /// Configured companies, blank entries dropped.
    pub fn company_ids(&self) -> Vec<CompanyId> {
        self.schedule
            .companies
            .iter()
            .map(|c| CompanyId::from(c.as_str()))
            .filter(|c| !c.as_str().is_empty())
            .collect()
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.general.data_dir.join("runs.sqlite3")
    }

    /// Artifact directory, when artifacts are kept.
    pub fn rundata_dir(&self) -> Option<PathBuf> {
        self.renderer
            .keep_artifacts
            .then(|| self.general.data_dir.join("rundata"))
    }

    pub fn bigquery(&self) -> BigQueryConfig {
        BigQueryConfig {
            api_url: self.warehouse.api_url.clone(),
            project: self.warehouse.project.clone(),
            dataset: self.warehouse.dataset.clone(),
            metrics_table: self.warehouse.metrics_table.clone(),
            names_table: self.warehouse.names_table.clone(),
            timeout_seconds: self.warehouse.timeout_seconds,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::tests::make_args;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.target_channel, "test_channel");
        assert_eq!(config.schedule.n_days, 2);
        assert_eq!(config.schedule.companies.len(), 5);
        assert_eq!(config.schedule.companies[0], "603de62548d6dc001315dfb4");
        assert_eq!(config.warehouse.metrics_table, "cs_interative_compiled");
        assert!(config.renderer.keep_artifacts);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
data_dir = "/var/lib/usagebot"
target_channel = "analytics"

[schedule]
companies = ["a", "b"]
start_date = "2024-01-01"
n_days = 5

[renderer]
program = "chromium-render"
keep_artifacts = false
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.data_dir, PathBuf::from("/var/lib/usagebot"));
        assert_eq!(config.general.target_channel, "analytics");
        assert_eq!(config.schedule.companies, vec!["a", "b"]);
        assert_eq!(config.schedule.start_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(config.schedule.n_days, 5);
        assert_eq!(config.renderer.program, "chromium-render");
        assert_eq!(config.rundata_dir(), None);
        // Untouched sections keep their defaults
        assert_eq!(config.slack.api_url, "https://slack.com/api");
        assert_eq!(config.ledger_path(), PathBuf::from("/var/lib/usagebot/runs.sqlite3"));
    }

    #[test]
    fn test_merge_only_explicit_args() {
        let mut config: Config = toml::from_str(
            r#"
[general]
target_channel = "from-file"

[schedule]
n_days = 7
"#,
        )
        .unwrap();

        let mut args = make_args();
        args.companies = Some(vec!["x".into(), " y ".into(), "".into()]);
        args.start_date = NaiveDate::from_ymd_opt(2024, 2, 1);
        config.merge_with_args(&args);

        assert_eq!(config.general.target_channel, "from-file");
        assert_eq!(config.schedule.n_days, 7);
        assert_eq!(config.schedule.companies, vec!["x", "y"]);
        assert_eq!(config.schedule.start_date, NaiveDate::from_ymd_opt(2024, 2, 1));

        args.target_channel = Some("cli".into());
        args.n_days = Some(1);
        config.merge_with_args(&args);
        assert_eq!(config.general.target_channel, "cli");
        assert_eq!(config.schedule.n_days, 1);
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        assert!(config.validate(false).is_err());
        assert!(config.validate(true).is_ok());

        config.schedule.start_date = NaiveDate::from_ymd_opt(2024, 1, 1);
        assert!(config.validate(false).is_ok());

        config.schedule.n_days = 0;
        assert!(config.validate(false).is_err());

        config.schedule.n_days = 2;
        config.schedule.companies.clear();
        assert!(config.validate(false).is_err());
    }

    #[test]
    fn test_blank_companies_from_file_are_dropped() {
        let mut config: Config = toml::from_str(
            r#"
[schedule]
companies = ["a", "", "  ", " b "]
start_date = "2024-01-01"
"#,
        )
        .unwrap();

        assert_eq!(config.company_ids(), vec![CompanyId::from("a"), CompanyId::from("b")]);
        assert!(config.validate(false).is_ok());

        config.schedule.companies = vec!["".into(), " ".into()];
        assert!(config.company_ids().is_empty());
        assert!(config.validate(false).is_err());
    }

    #[test]
    fn test_verbose_from_file_or_flag() {
        let mut config: Config = toml::from_str("[general]\nverbose = true\n").unwrap();
        let args = make_args();
        assert_eq!(args.log_level(config.general.verbose), tracing::Level::DEBUG);

        config.merge_with_args(&args);
        assert!(config.general.verbose);

        let mut quiet = make_args();
        quiet.quiet = true;
        assert_eq!(quiet.log_level(config.general.verbose), tracing::Level::ERROR);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[schedule]"));
        assert!(toml_str.contains("[warehouse]"));
        assert!(toml_str.contains("[renderer]"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.schedule.n_days, 2);
    }
}
