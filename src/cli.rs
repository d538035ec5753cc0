//! Command-line interface argument parsing.

use std::path::PathBuf;

use clap::Parser;
use tracing::Level;

/// shelfwatch - supermarket price dashboard over an Apache Hudi table
///
/// Reads the product table once per cache window, then serves a
/// single page with a category filter and four charts.
///
/// Examples:
///   shelfwatch
///   shelfwatch --table-uri s3://my-bucket/sandbox/daft_hudi --region us-west-2
///   shelfwatch --config ./shelfwatch.toml --bind 0.0.0.0:8501
///   shelfwatch --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for shelfwatch.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Base URI of the Hudi table
    #[arg(long, value_name = "URI", env = "SHELFWATCH_TABLE_URI")]
    pub table_uri: Option<String>,

    /// Object-store region
    #[arg(long, env = "SHELFWATCH_REGION")]
    pub region: Option<String>,

    /// strftime format of the date column when stored as text
    #[arg(long, value_name = "FORMAT")]
    pub date_format: Option<String>,

    /// Seconds a load result is reused before the table is read again
    #[arg(long, value_name = "SECONDS", env = "SHELFWATCH_CACHE_TTL")]
    pub cache_ttl: Option<u64>,

    /// Listen address
    #[arg(short, long, value_name = "ADDR", env = "SHELFWATCH_BIND")]
    pub bind: Option<String>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write a default shelfwatch.toml and exit
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    pub fn log_level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else if self.quiet {
            Level::WARN
        } else {
            Level::INFO
        }
    }
}
