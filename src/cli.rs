//! Command-line interface argument parsing.

use crate::schedule::parse_date;
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

/// usagebot - daily per-company user activity digests for Slack
///
/// Reads usage metrics from BigQuery for every date not yet reported,
/// renders one table image per date, posts it to Slack and records the
/// run so the next invocation resumes where this one stopped.
///
/// Examples:
///   usagebot slack.token bigquery.token --start-date 2024-01-01
///   usagebot slack.token bigquery.token --start-date 2024-01-01 --n-days 7
///   usagebot slack.token bigquery.token --dryrun --target-channel bot-test
///   usagebot --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// File holding the Slack bot token
    #[arg(value_name = "SLACK_TOKEN", required_unless_present = "init_config")]
    pub slack_token_path: Option<PathBuf>,

    /// File holding the BigQuery OAuth access token
    #[arg(value_name = "BIGQUERY_TOKEN", required_unless_present = "init_config")]
    pub warehouse_token_path: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .usagebot.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the run ledger and rendered artifacts
    #[arg(long, value_name = "DIR", env = "USAGEBOT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Delete every recorded run before starting
    #[arg(long)]
    pub purge: bool,

    /// Company ids to report on (comma-separated, first one gates availability)
    #[arg(long, value_name = "IDS", value_delimiter = ',')]
    pub companies: Option<Vec<String>>,

    /// Earliest date to report (YYYY-MM-DD)
    ///
    /// Required for non-dryrun runs unless set in the config file.
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    pub start_date: Option<NaiveDate>,

    /// Maximum number of dates to post in one run
    #[arg(long, value_name = "DAYS")]
    pub n_days: Option<u32>,

    /// Post synthetic test tables without querying the warehouse
    ///
    /// Still writes to the ledger, tagged as dry runs.
    #[arg(long)]
    pub dryrun: bool,

    /// Slack channel to post to
    #[arg(long, value_name = "CHANNEL")]
    pub target_channel: Option<String>,

    /// HTML to PNG renderer program
    #[arg(long, value_name = "PROGRAM")]
    pub renderer: Option<String>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .usagebot.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.n_days == Some(0) {
            return Err("--n-days must be at least 1".to_string());
        }

        if let Some(ref companies) = self.companies {
            if companies.iter().all(|c| c.trim().is_empty()) {
                return Err("--companies must name at least one company".to_string());
            }
        }

        for (flag, path) in [
            ("Slack token", &self.slack_token_path),
            ("BigQuery token", &self.warehouse_token_path),
        ] {
            match path {
                None => return Err(format!("{} path is required", flag)),
                Some(p) if !p.is_file() => {
                    return Err(format!("{} file does not exist: {}", flag, p.display()));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is `[general].verbose`; `--quiet` wins over both.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    pub(crate) fn make_args() -> Args {
        Args {
            slack_token_path: None,
            warehouse_token_path: None,
            config: None,
            data_dir: None,
            purge: false,
            companies: None,
            start_date: None,
            n_days: None,
            dryrun: false,
            target_channel: None,
            renderer: None,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    fn token_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "xoxb-test").unwrap();
        file
    }

    #[test]
    fn test_parse_full_command_line() {
        let args = Args::try_parse_from([
            "usagebot",
            "slack.token",
            "bq.token",
            "--companies",
            "a,b,c",
            "--start-date",
            "2024-01-01",
            "--n-days",
            "3",
            "--dryrun",
        ])
        .unwrap();

        assert_eq!(args.slack_token_path, Some(PathBuf::from("slack.token")));
        assert_eq!(args.warehouse_token_path, Some(PathBuf::from("bq.token")));
        assert_eq!(args.companies, Some(vec!["a".into(), "b".into(), "c".into()]));
        assert_eq!(args.start_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(args.n_days, Some(3));
        assert!(args.dryrun);
    }

    #[test]
    fn test_bad_start_date_rejected() {
        let result = Args::try_parse_from(["usagebot", "s", "b", "--start-date", "01/02/2024"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_token_paths_required_unless_init_config() {
        assert!(Args::try_parse_from(["usagebot"]).is_err());
        let args = Args::try_parse_from(["usagebot", "--init-config"]).unwrap();
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_missing_token_file() {
        let mut args = make_args();
        args.slack_token_path = Some(PathBuf::from("/nonexistent/slack.token"));
        args.warehouse_token_path = Some(PathBuf::from("/nonexistent/bq.token"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_ok_with_token_files() {
        let slack = token_file();
        let bq = token_file();
        let mut args = make_args();
        args.slack_token_path = Some(slack.path().to_path_buf());
        args.warehouse_token_path = Some(bq.path().to_path_buf());
        assert!(args.validate().is_ok());

        args.n_days = Some(0);
        assert!(args.validate().is_err());

        args.n_days = Some(1);
        args.companies = Some(vec![" ".into()]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(false), tracing::Level::INFO);
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(false), tracing::Level::ERROR);
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }
}
