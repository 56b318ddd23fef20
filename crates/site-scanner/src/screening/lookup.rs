use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::warn;

use super::config::LookupConfig;
use super::domain::ParcelId;
use super::layers::{Layer, LayerLookup};
use super::providers::LookupError;

/// Per-call timeout plus bounded exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &LookupConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            multiplier: config.backoff_multiplier.max(1.0),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let delay_nanos = self.initial_backoff.as_nanos() as f64 * self.multiplier.powi(exponent);
        if !delay_nanos.is_finite() || delay_nanos >= self.max_backoff.as_nanos() as f64 {
            return self.max_backoff;
        }
        Duration::from_nanos(delay_nanos.round() as u64)
    }

    /// Runs `call` until it succeeds or retries are exhausted. Each attempt is bounded by
    /// the policy timeout.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, LookupError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LookupError>>,
    {
        let mut last = LookupError::Unavailable("not attempted".to_string());
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.backoff(attempt - 1)).await;
            }

            match tokio::time::timeout(self.timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(error)) => last = error,
                Err(_) => last = LookupError::Timeout(self.timeout.as_millis() as u64),
            }

            warn!(
                operation,
                attempt = attempt + 1,
                error = %last,
                "external lookup attempt failed"
            );
        }

        Err(LookupError::Exhausted {
            operation: operation.to_string(),
            attempts: self.max_retries + 1,
            last: last.to_string(),
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&LookupConfig::default())
    }
}

/// Write-once map. Concurrent requests for the same key share one fetch and later
/// requests reuse its value.
#[derive(Debug)]
pub struct OnceCache<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for OnceCache<K, V> {
    fn default() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> OnceCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
            cells
                .entry(key)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        cell.get_or_init(fetch).await.clone()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    pub fn len(&self) -> usize {
        let cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Layer lookups keyed by parcel and layer.
#[derive(Debug, Default)]
pub struct LayerCache {
    lookups: OnceCache<(ParcelId, Layer), LayerLookup>,
}

impl LayerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_fetch<F, Fut>(&self, parcel: &ParcelId, layer: Layer, fetch: F) -> LayerLookup
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LayerLookup>,
    {
        self.lookups.get_or_fetch((parcel.clone(), layer), fetch).await
    }

    pub fn get(&self, parcel: &ParcelId, layer: Layer) -> Option<LayerLookup> {
        self.lookups.get(&(parcel.clone(), layer))
    }

    pub fn len(&self) -> usize {
        self.lookups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }
}
