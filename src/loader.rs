use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::aggregation::DiversityAggregate;
use crate::cache::TtlCache;
use crate::config::Config;
use crate::credentials::CredentialProvider;
use crate::error::ShelfError;
use crate::normalize::{normalize, NormalizeOptions, NormalizedDataset};
use crate::schema::product;
use crate::source::{ReadRequest, TableSource};

/// One load result: the normalized table and its diversity aggregate.
///
/// Immutable once built; shared between requests for a whole cache window.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub dataset: NormalizedDataset,
    pub diversity: DiversityAggregate,
    pub loaded_at: DateTime<Utc>,
}

/// Where and how to read the product table.
#[derive(Debug, Clone)]
pub struct LoaderSettings {
    pub uri: String,
    pub region: String,
    pub normalize: NormalizeOptions,
    pub ttl: std::time::Duration,
}

impl LoaderSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            uri: config.table.uri.clone(),
            region: config.table.region.clone(),
            normalize: NormalizeOptions {
                date_format: config.table.date_format.clone(),
            },
            ttl: config.cache.ttl(),
        }
    }
}

/// Credentials -> table read -> normalization -> aggregation, memoized.
pub struct Loader {
    settings: LoaderSettings,
    source: Arc<dyn TableSource>,
    credentials: Arc<dyn CredentialProvider>,
    cache: TtlCache<Snapshot>,
}

impl Loader {
    pub fn new(
        settings: LoaderSettings,
        source: Arc<dyn TableSource>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let cache = TtlCache::new(settings.ttl);
        Self {
            settings,
            source,
            credentials,
            cache,
        }
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    /// The current snapshot, read from the table only when the cache is
    /// empty or expired.
    pub async fn load(&self) -> Result<Arc<Snapshot>, ShelfError> {
        self.cache.get_or_try_fill(|| self.fetch()).await
    }

    /// Discard the cached snapshot and read the table again.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>, ShelfError> {
        info!("Refreshing {}", self.settings.uri);
        self.cache.invalidate().await;
        self.load().await
    }

    pub async fn invalidate(&self) {
        self.cache.invalidate().await;
    }

    /// Read and derive a snapshot, bypassing the cache.
    pub async fn fetch(&self) -> Result<Snapshot, ShelfError> {
        let started = Instant::now();

        let credentials = self
            .credentials
            .resolve()
            .await
            .inspect_err(|e| warn!("{e}"))?;
        let request = ReadRequest {
            uri: self.settings.uri.clone(),
            region: self.settings.region.clone(),
            credentials,
            columns: product::ALL.iter().map(|c| c.to_string()).collect(),
        };

        let raw = self.source.read(&request).await?;
        debug!("Read {} raw rows from {}", raw.height(), request.uri);

        let options = self.settings.normalize.clone();
        let (dataset, diversity) = tokio::task::spawn_blocking(move || {
            let dataset = normalize(raw, &options)?;
            let diversity = DiversityAggregate::compute(dataset.frame())?;
            Ok::<_, ShelfError>((dataset, diversity))
        })
        .await??;

        info!(
            "Loaded {} rows, {} categories from {} in {:.2}s",
            dataset.height(),
            diversity.len(),
            request.uri,
            started.elapsed().as_secs_f64()
        );

        Ok(Snapshot {
            dataset,
            diversity,
            loaded_at: Utc::now(),
        })
    }
}
