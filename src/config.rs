//! Configuration file handling.
//!
//! Settings come from built-in defaults, then `shelfwatch.toml`, then
//! command-line flags and their environment variables.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ShelfError;

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "shelfwatch.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Lake table location.
    #[serde(default)]
    pub table: TableConfig,

    /// Load-result memoization.
    #[serde(default)]
    pub cache: CacheConfig,

    /// HTTP listener.
    #[serde(default)]
    pub server: ServerConfig,

    /// Page chrome.
    #[serde(default)]
    pub page: PageConfig,

    /// Static credentials, tried after the environment.
    #[serde(default)]
    pub credentials: StaticCredentialsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    /// Base URI of the Hudi table.
    #[serde(default = "default_table_uri")]
    pub uri: String,

    /// Object-store region.
    #[serde(default = "default_region")]
    pub region: String,

    /// strftime format of a string `date` column. Inferred when absent.
    #[serde(default)]
    pub date_format: Option<String>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            uri: default_table_uri(),
            region: default_region(),
            date_format: None,
        }
    }
}

fn default_table_uri() -> String {
    "s3://my-bucket/sandbox/daft_hudi".to_string()
}

fn default_region() -> String {
    "us-west-2".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a load result is served before the table is read again.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

fn default_ttl_seconds() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address, `host:port`.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageConfig {
    /// Heading shown above the filter.
    #[serde(default = "default_title")]
    pub title: String,

    /// Browser tab title.
    #[serde(default = "default_browser_title")]
    pub browser_title: String,

    /// Chart colors, applied in order.
    #[serde(default = "default_palette")]
    pub palette: Vec<String>,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            browser_title: default_browser_title(),
            palette: default_palette(),
        }
    }
}

fn default_title() -> String {
    "Apache Hudi - Daft Dataframe".to_string()
}

fn default_browser_title() -> String {
    "Hudi Streamlit Application".to_string()
}

fn default_palette() -> Vec<String> {
    vec!["#1abc9c", "#16a085", "#2ecc71", "#27ae60", "#3498db"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticCredentialsConfig {
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ShelfError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ShelfError::Config(format!("failed to read {}: {e}", path.display()))
        })?;

        toml::from_str(&content)
            .map_err(|e| ShelfError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>, ShelfError> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge command-line arguments into this configuration.
    ///
    /// Only values the user actually supplied (flag or environment) override.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref uri) = args.table_uri {
            self.table.uri = uri.clone();
        }
        if let Some(ref region) = args.region {
            self.table.region = region.clone();
        }
        if let Some(ref format) = args.date_format {
            self.table.date_format = Some(format.clone());
        }
        if let Some(ttl) = args.cache_ttl {
            self.cache.ttl_seconds = ttl;
        }
        if let Some(ref bind) = args.bind {
            self.server.bind = bind.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ShelfError> {
        if self.table.uri.trim().is_empty() {
            return Err(ShelfError::Config("table.uri must not be empty".into()));
        }
        if self.table.region.trim().is_empty() {
            return Err(ShelfError::Config("table.region must not be empty".into()));
        }
        if self.page.palette.is_empty() {
            return Err(ShelfError::Config("page.palette must not be empty".into()));
        }
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ShelfError> {
        self.server.bind.parse().map_err(|e| {
            ShelfError::Config(format!("invalid server.bind '{}': {e}", self.server.bind))
        })
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}
