use clap::Parser;
use std::path::PathBuf;

use crate::logging;

/// XML validate / transform / query / XPath worker
///
/// Reads JSON request lines from stdin and writes one JSON reply line per request to stdout.
#[derive(Parser, Debug, Clone)]
#[command(name = "xml-worker")]
#[command(
    about = "Serve XML validation, XSLT transformation, XQuery and XPath requests as JSON lines"
)]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Seconds a compiled artifact may stay unused before eviction
    #[arg(long = "cache-ttl")]
    pub cache_ttl: Option<u64>,

    /// Maximum compiled artifacts kept per operation
    #[arg(long = "cache-max-entries")]
    pub cache_max_entries: Option<u64>,

    /// HTTP request timeout in seconds
    #[arg(long = "timeout")]
    pub timeout: Option<u64>,

    /// Maximum number of requests processed at once
    #[arg(long = "max-in-flight")]
    pub max_in_flight: Option<usize>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long = "log-level", value_parser = parse_log_level)]
    pub log_level: Option<String>,

    /// Enable verbose logging (same as --log-level debug)
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,
}

fn parse_log_level(value: &str) -> Result<String, String> {
    if logging::is_valid_level(value) {
        Ok(value.to_ascii_lowercase())
    } else {
        Err(format!(
            "unknown log level '{}', expected one of: {}",
            value,
            logging::LOG_LEVELS.join(", ")
        ))
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The level requested on the command line, if any. `--log-level` wins over the shorthands.
    pub fn effective_log_level(&self) -> Option<String> {
        if let Some(level) = &self.log_level {
            Some(level.clone())
        } else if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            Some("error".to_string())
        } else {
            None
        }
    }
}
