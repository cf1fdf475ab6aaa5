//! Collection entry points.
//!
//! This module provides what both collectors share:
//! - [`CollectorConfig`]: pool size, cache TTL and retry policy
//! - [`Collector`]: the async `collect` contract
//! - [`SectionRunner`]: the per-section cache-then-fetch step
//!
//! The sequential collector lives in [`sequential`]; the concurrent one in
//! [`crate::executor`].

pub mod sequential;

use crate::aggregate::AggregateError;
use crate::cache::{CacheKey, CacheStore};
use crate::cancel::CancelToken;
use crate::fetch::{RemoteFetcher, RetryPolicy};
use crate::model::{CollectionRequest, Report, RequestError, SectionFailure, SectionResult, Source};
use crate::registry::{SectionKind, SectionRegistry};
use crate::sections::SectionRecord;
use crate::traits::ApiClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

pub use sequential::SequentialCollector;

// ============================================================================
// Configuration
// ============================================================================

/// Collector settings. Every field has a default, so a partial document
/// deserializes.
///
/// Cache lifetime belongs to the [`CacheStore`]; see
/// [`CacheStore::with_default_ttl`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Worker pool size for the concurrent collector
    pub concurrency_limit: usize,
    pub retry: RetryPolicy,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 10,
            retry: RetryPolicy::default(),
        }
    }
}

impl CollectorConfig {
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

// ============================================================================
// Collector contract
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectError {
    /// The request was rejected before any fetch
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    /// The collector produced an inconsistent set of results (a bug)
    #[error("Report assembly failed: {0}")]
    Aggregate(#[from] AggregateError),
}

/// Collects every requested section of one resource into a [`Report`].
///
/// Remote failures never fail the call; they become per-section failures in
/// the report.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(
        &self,
        request: &CollectionRequest,
        cancel: CancelToken,
    ) -> Result<Report, CollectError>;
}

// ============================================================================
// Per-section step
// ============================================================================

/// Cache lookup, fetch and cache write for one section.
#[derive(Debug, Clone)]
pub(crate) struct SectionRunner {
    fetcher: RemoteFetcher,
    cache: CacheStore,
}

impl SectionRunner {
    #[instrument(skip(self, request, cancel), fields(section = %kind))]
    pub(crate) async fn run(
        &self,
        kind: SectionKind,
        request: &CollectionRequest,
        cancel: &CancelToken,
    ) -> SectionResult {
        if cancel.is_cancelled() {
            return SectionResult::Failure(SectionFailure::cancelled());
        }

        let key = CacheKey::new(&request.region, &request.resource_id, kind);
        if request.use_cache {
            if let Some(record) = self.cached(&key).await {
                return SectionResult::Success {
                    record,
                    source: Source::Cached,
                };
            }
        }

        match self
            .fetcher
            .fetch(kind, &request.region, &request.resource_id, cancel)
            .await
        {
            Ok(record) => {
                if request.use_cache {
                    self.store(key, &record).await;
                }
                debug!(items = record.item_count(), "Section fetched");
                SectionResult::Success {
                    record,
                    source: Source::Fresh,
                }
            }
            Err(e) => {
                warn!(error = %e, retryable = e.is_retryable(), "Section failed");
                SectionResult::Failure(SectionFailure::new(e.kind(), e.to_string()))
            }
        }
    }

    /// A cached payload that no longer decodes into this section's record is
    /// a miss.
    async fn cached(&self, key: &CacheKey) -> Option<SectionRecord> {
        let entry = self.cache.get(key).await?;
        match serde_json::from_value::<SectionRecord>(entry.payload) {
            Ok(record) if record.kind() == key.section => Some(record),
            Ok(record) => {
                warn!(found = %record.kind(), "Cached payload holds another section, ignoring");
                None
            }
            Err(e) => {
                warn!(error = %e, "Cached payload is unreadable, ignoring");
                None
            }
        }
    }

    async fn store(&self, key: CacheKey, record: &SectionRecord) {
        match serde_json::to_value(record) {
            Ok(payload) => self.cache.put(key, payload, None).await,
            Err(e) => warn!(error = %e, "Section record could not be serialized for caching"),
        }
    }
}

/// State and builder methods shared by both collectors.
#[derive(Debug, Clone)]
pub(crate) struct CollectorCore {
    pub(crate) registry: SectionRegistry,
    pub(crate) config: CollectorConfig,
    pub(crate) runner: SectionRunner,
}

impl CollectorCore {
    pub(crate) fn new(client: Arc<dyn ApiClient>) -> Self {
        let config = CollectorConfig::default();
        Self {
            registry: SectionRegistry::default(),
            runner: SectionRunner {
                fetcher: RemoteFetcher::new(client).with_retry_policy(config.retry.clone()),
                cache: CacheStore::in_memory(),
            },
            config,
        }
    }

    pub(crate) fn set_config(&mut self, config: CollectorConfig) {
        self.runner.fetcher = self
            .runner
            .fetcher
            .clone()
            .with_retry_policy(config.retry.clone());
        self.config = config;
    }

    pub(crate) fn set_cache(&mut self, cache: CacheStore) {
        self.runner.cache = cache;
    }

    pub(crate) fn cache(&self) -> &CacheStore {
        &self.runner.cache
    }
}
