use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShelfError {
    #[error("Credentials unavailable: {0}")]
    CredentialsUnavailable(String),

    #[error("Data source unreachable: {uri}: {reason}")]
    DataSourceUnreachable { uri: String, reason: String },

    #[error("Schema mismatch: missing column(s) {}", .missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    #[error("Cast failure in column '{column}': row {row} holds {value:?} ({failures} failing row(s))")]
    CastFailure {
        column: String,
        row: usize,
        value: String,
        failures: usize,
    },

    #[error("Unrecognized boolean token {token:?} in own_brand at row {row}")]
    UnrecognizedBooleanToken { row: usize, token: String },

    #[error("Column '{column}' has {count} null value(s)")]
    NullValues { column: String, count: usize },

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ShelfError {
    /// Stable identifier used in diagnostics and JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CredentialsUnavailable(_) => "credentials_unavailable",
            Self::DataSourceUnreachable { .. } => "data_source_unreachable",
            Self::SchemaMismatch { .. } => "schema_mismatch",
            Self::CastFailure { .. } => "cast_failure",
            Self::UnrecognizedBooleanToken { .. } => "unrecognized_boolean_token",
            Self::NullValues { .. } => "null_values",
            Self::Polars(_) => "dataframe",
            Self::Io(_) => "io",
            Self::Config(_) => "config",
            Self::Task(_) => "task",
        }
    }

    /// Errors that come from the data or its location rather than from us.
    pub fn is_load_failure(&self) -> bool {
        !matches!(
            self,
            Self::Polars(_) | Self::Io(_) | Self::Config(_) | Self::Task(_)
        )
    }
}
