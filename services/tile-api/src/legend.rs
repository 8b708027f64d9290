//! Categorical legends fetched from the legend service.
//!
//! Each legend is fetched at most once per process and shared by every
//! tile job. A failed fetch caches the built-in default table instead;
//! there is no TTL and no retry.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use renderer::{CategoryTable, StyleError};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

use crate::metrics;

/// Shared by every legend that failed to load.
static BUILTIN_LEGEND: Lazy<Arc<CategoryTable>> =
    Lazy::new(|| Arc::new(CategoryTable::builtin_default()));

#[derive(Debug, Error)]
pub enum LegendError {
    #[error("legend service not configured")]
    NotConfigured,

    #[error("legend request failed: {0}")]
    Request(String),

    #[error("legend service returned HTTP {0}")]
    Status(u16),

    #[error("invalid legend: {0}")]
    Invalid(#[from] StyleError),
}

/// Source of category legends.
#[async_trait]
pub trait LegendFetcher: Send + Sync {
    async fn fetch(&self, legend_ref: &str) -> Result<CategoryTable, LegendError>;
}

/// Fetches `{base_url}/{legend_ref}`, or `legend_ref` itself when it is a
/// full URL.
#[derive(Debug, Clone)]
pub struct HttpLegendFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLegendFetcher {
    pub fn new(base_url: impl Into<String>) -> Result<Self, LegendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LegendError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, legend_ref: &str) -> String {
        if legend_ref.starts_with("http://") || legend_ref.starts_with("https://") {
            legend_ref.to_string()
        } else {
            format!("{}/{}", self.base_url, legend_ref.trim_start_matches('/'))
        }
    }
}

#[async_trait]
impl LegendFetcher for HttpLegendFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, legend_ref: &str) -> Result<CategoryTable, LegendError> {
        let response = self
            .client
            .get(self.url_for(legend_ref))
            .send()
            .await
            .map_err(|e| LegendError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LegendError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LegendError::Request(e.to_string()))?;
        Ok(CategoryTable::from_json(&body)?)
    }
}

/// Used when no legend service is configured; every legend falls back to
/// the built-in table.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLegendService;

#[async_trait]
impl LegendFetcher for NoLegendService {
    async fn fetch(&self, _legend_ref: &str) -> Result<CategoryTable, LegendError> {
        Err(LegendError::NotConfigured)
    }
}

/// Process-wide legend cache keyed by legend ref.
pub struct LegendCache {
    fetcher: Arc<dyn LegendFetcher>,
    entries: Mutex<HashMap<String, Arc<OnceCell<Arc<CategoryTable>>>>>,
}

impl LegendCache {
    pub fn new(fetcher: Arc<dyn LegendFetcher>) -> Self {
        Self {
            fetcher,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// HTTP-backed cache when `legend_url` is set, built-in otherwise.
    pub fn from_url(legend_url: Option<&str>) -> Result<Self, LegendError> {
        let fetcher: Arc<dyn LegendFetcher> = match legend_url {
            Some(url) => Arc::new(HttpLegendFetcher::new(url)?),
            None => Arc::new(NoLegendService),
        };
        Ok(Self::new(fetcher))
    }

    /// The table for `legend_ref`, fetching it on first use.
    ///
    /// Concurrent first callers share one fetch.
    pub async fn get(&self, legend_ref: &str) -> Arc<CategoryTable> {
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(entries.entry(legend_ref.to_string()).or_default())
        };

        cell.get_or_init(|| async {
            match self.fetcher.fetch(legend_ref).await {
                Ok(table) => {
                    info!(legend = legend_ref, entries = table.len(), "Loaded legend");
                    Arc::new(table)
                }
                Err(e) => {
                    warn!(
                        legend = legend_ref,
                        error = %e,
                        "Legend unavailable, using built-in default"
                    );
                    metrics::record_legend_fallback(legend_ref);
                    Arc::clone(&BUILTIN_LEGEND)
                }
            }
        })
        .await
        .clone()
    }

    /// Number of legends resolved so far.
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.values().filter(|c| c.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for LegendCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegendCache")
            .field("resolved", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderer::Color;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: AtomicUsize,
        body: Option<&'static str>,
    }

    #[async_trait]
    impl LegendFetcher for CountingFetcher {
        async fn fetch(&self, _legend_ref: &str) -> Result<CategoryTable, LegendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            match self.body {
                Some(body) => Ok(CategoryTable::from_json(body)?),
                None => Err(LegendError::Status(503)),
            }
        }
    }

    #[tokio::test]
    async fn test_fetched_once_and_shared() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            body: Some(r##"{"2": {"color": "#addd8e"}}"##),
        });
        let cache = Arc::new(LegendCache::new(fetcher.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get("fuel").await })
            })
            .collect();
        for handle in handles {
            let table = handle.await.unwrap();
            assert_eq!(table.color_for(2.0), Color::opaque(173, 221, 142));
        }

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_caches_builtin_default() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            body: None,
        });
        let cache = LegendCache::new(fetcher.clone());

        let table = cache.get("fuel").await;
        assert_eq!(table.color_for(98.0), Color::opaque(0, 0, 255));

        let again = cache.get("fuel").await;
        assert!(Arc::ptr_eq(&table, &again));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_service_uses_builtin() {
        let cache = LegendCache::from_url(None).unwrap();
        assert_eq!(*cache.get("anything").await, CategoryTable::builtin_default());
    }

    #[test]
    fn test_url_for() {
        let fetcher = HttpLegendFetcher::new("http://legends:8000/api/legends/").unwrap();
        assert_eq!(fetcher.url_for("fuel"), "http://legends:8000/api/legends/fuel");
        assert_eq!(
            fetcher.url_for("https://example.org/fbfm40.json"),
            "https://example.org/fbfm40.json"
        );
    }
}
