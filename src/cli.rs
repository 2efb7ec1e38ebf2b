// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `streamdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "streamdag",
    version,
    about = "Run a scheduled task graph with branch decisions, retries and timeouts.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Streamdag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Streamdag.toml")]
    pub config: String,

    /// Run the DAG once and exit instead of following its schedule.
    ///
    /// The process exits with an error if the run failed.
    #[arg(long)]
    pub once: bool,

    /// Logical date for `--once` (`YYYY-MM-DDTHH:MM:SS`, UTC).
    ///
    /// Defaults to the most recently closed schedule interval.
    #[arg(long, value_name = "DATETIME", requires = "once")]
    pub logical_date: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `STREAMDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the DAG, but don't execute any task.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = CliArgs::try_parse_from(["streamdag"]).unwrap();
        assert_eq!(args.config, "Streamdag.toml");
        assert!(!args.once);
        assert!(args.logical_date.is_none());
    }

    #[test]
    fn logical_date_requires_once() {
        assert!(CliArgs::try_parse_from(["streamdag", "--logical-date", "2024-09-16T00:00:00"]).is_err());
        let args = CliArgs::try_parse_from([
            "streamdag",
            "--once",
            "--logical-date",
            "2024-09-16T00:00:00",
        ])
        .unwrap();
        assert_eq!(args.logical_date.as_deref(), Some("2024-09-16T00:00:00"));
    }
}
