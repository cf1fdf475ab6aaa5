//! Sequential collector - one section at a time, in registry order.

use super::{CollectError, Collector, CollectorConfig, CollectorCore};
use crate::aggregate::Aggregator;
use crate::cache::CacheStore;
use crate::cancel::CancelToken;
use crate::model::{CollectionRequest, Report, SectionFailure, SectionResult};
use crate::registry::SectionRegistry;
use crate::traits::ApiClient;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

/// Walks the requested sections in order. A failing section never stops the
/// walk; once cancelled, every remaining section is reported as cancelled.
///
/// # Example
///
/// ```ignore
/// let collector = SequentialCollector::new(client).with_cache(CacheStore::in_memory());
/// let request = CollectionRequest::new("us-east-1", "vpc-0abc")
///     .with_sections([SectionKind::Vpc, SectionKind::Subnets]);
/// let report = collector.collect(&request, CancelToken::never()).await?;
/// ```
#[derive(Debug, Clone)]
pub struct SequentialCollector {
    core: CollectorCore,
}

impl SequentialCollector {
    pub fn new(client: Arc<dyn ApiClient>) -> Self {
        Self {
            core: CollectorCore::new(client),
        }
    }

    pub fn with_config(mut self, config: CollectorConfig) -> Self {
        self.core.set_config(config);
        self
    }

    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.core.set_cache(cache);
        self
    }

    pub fn with_registry(mut self, registry: SectionRegistry) -> Self {
        self.core.registry = registry;
        self
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.core.config
    }

    pub fn cache(&self) -> &CacheStore {
        self.core.cache()
    }
}

#[async_trait]
impl Collector for SequentialCollector {
    #[instrument(skip(self, request, cancel), fields(region = %request.region, resource_id = %request.resource_id))]
    async fn collect(
        &self,
        request: &CollectionRequest,
        cancel: CancelToken,
    ) -> Result<Report, CollectError> {
        let sections = request.validate(&self.core.registry)?;
        let start = Instant::now();
        info!(sections = sections.len(), "Starting sequential collection");

        let mut aggregator = Aggregator::new(
            request.region.clone(),
            request.resource_id.clone(),
            sections.iter().copied(),
        );
        for kind in sections {
            let result = if cancel.is_cancelled() {
                SectionResult::Failure(SectionFailure::cancelled())
            } else {
                self.core.runner.run(kind, request, &cancel).await
            };
            aggregator.record(kind, result)?;
        }

        let report = aggregator.finish(start.elapsed())?;
        info!(
            elapsed_ms = report.elapsed_ms(),
            partial = report.is_partial(),
            failures = report.failures().count(),
            "Sequential collection finished"
        );
        Ok(report)
    }
}
