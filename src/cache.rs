//! Single-value cache with a time-to-live.
//!
//! The slot lock is held while a value is being produced, so concurrent
//! callers that arrive during a fill wait for it instead of fetching again.
//! Failed fills are not cached.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

struct Entry<T> {
    value: Arc<T>,
    stored_at: Instant,
}

pub struct TtlCache<T> {
    ttl: Duration,
    slot: Mutex<Option<Entry<T>>>,
}

impl<T> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached value, or run `fill` and cache its result.
    pub async fn get_or_try_fill<F, Fut, E>(&self, fill: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut slot = self.slot.lock().await;

        if let Some(entry) = slot.as_ref() {
            if entry.stored_at.elapsed() < self.ttl {
                debug!("Cache hit (age {:?})", entry.stored_at.elapsed());
                return Ok(Arc::clone(&entry.value));
            }
            debug!("Cache entry expired after {:?}", self.ttl);
        } else {
            debug!("Cache empty");
        }

        *slot = None;
        let value = Arc::new(fill().await?);
        *slot = Some(Entry {
            value: Arc::clone(&value),
            stored_at: Instant::now(),
        });
        Ok(value)
    }

    /// The cached value if it is still fresh.
    pub async fn peek(&self) -> Option<Arc<T>> {
        let slot = self.slot.lock().await;
        slot.as_ref()
            .filter(|e| e.stored_at.elapsed() < self.ttl)
            .map(|e| Arc::clone(&e.value))
    }

    /// Drop the cached value; the next access fills again.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}
