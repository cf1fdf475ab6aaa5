//! Concurrent collector - a fixed pool of workers draining a shared queue.
//!
//! Workers pull sections from the queue, run them and send each result over
//! a channel. The collecting task owns the [`Aggregator`] and is the only
//! writer of the report. Each section runs in its own task so a panic is
//! caught and reported as a failure of that section.
//!
//! Workers and section tasks live in [`JoinSet`]s: dropping the `collect`
//! future aborts them along with any call in flight.

use crate::aggregate::Aggregator;
use crate::cache::CacheStore;
use crate::cancel::CancelToken;
use crate::collect::{CollectError, Collector, CollectorConfig, CollectorCore, SectionRunner};
use crate::model::{CollectionRequest, ErrorKind, Report, SectionFailure, SectionResult};
use crate::registry::{SectionKind, SectionRegistry};
use crate::traits::ApiClient;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

type SectionQueue = Arc<Mutex<VecDeque<SectionKind>>>;

#[derive(Debug, Clone)]
pub struct ConcurrentCollector {
    core: CollectorCore,
}

impl ConcurrentCollector {
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

    /// Pool size for `request`: its own limit, else the configured one,
    /// never more than there are sections.
    fn worker_count(&self, request: &CollectionRequest, sections: usize) -> usize {
        request
            .concurrency_limit
            .unwrap_or(self.core.config.concurrency_limit)
            .max(1)
            .min(sections)
    }
}

#[async_trait]
impl Collector for ConcurrentCollector {
    #[instrument(skip(self, request, cancel), fields(region = %request.region, resource_id = %request.resource_id))]
    async fn collect(
        &self,
        request: &CollectionRequest,
        cancel: CancelToken,
    ) -> Result<Report, CollectError> {
        let sections = request.validate(&self.core.registry)?;
        let start = Instant::now();
        let workers = self.worker_count(request, sections.len());
        info!(
            sections = sections.len(),
            workers, "Starting concurrent collection"
        );

        let mut aggregator = Aggregator::new(
            request.region.clone(),
            request.resource_id.clone(),
            sections.iter().copied(),
        );

        let queue: SectionQueue = Arc::new(Mutex::new(sections.iter().copied().collect()));
        // Capacity covers every section, so workers never wait on a send.
        let (tx, mut rx) = mpsc::channel(sections.len());
        let request = Arc::new(request.clone());

        let mut pool = JoinSet::new();
        for worker in 0..workers {
            pool.spawn(run_worker(
                worker,
                self.core.runner.clone(),
                Arc::clone(&request),
                Arc::clone(&queue),
                tx.clone(),
                cancel.clone(),
            ));
        }
        drop(tx);

        while let Some((kind, result)) = rx.recv().await {
            aggregator.record(kind, result)?;
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Collector worker terminated abnormally");
            }
        }

        // Whatever is still unrecorded never ran (cancelled) or was lost
        // with its worker.
        for kind in aggregator.pending() {
            let failure = if cancel.is_cancelled() {
                SectionFailure::cancelled()
            } else {
                SectionFailure::new(ErrorKind::Transient, "Section worker exited before reporting")
            };
            aggregator.record(kind, SectionResult::Failure(failure))?;
        }

        let report = aggregator.finish(start.elapsed())?;
        info!(
            elapsed_ms = report.elapsed_ms(),
            partial = report.is_partial(),
            failures = report.failures().count(),
            "Concurrent collection finished"
        );
        Ok(report)
    }
}

async fn run_worker(
    worker: usize,
    runner: SectionRunner,
    request: Arc<CollectionRequest>,
    queue: SectionQueue,
    results: mpsc::Sender<(SectionKind, SectionResult)>,
    cancel: CancelToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let Some(kind) = next_section(&queue) else {
            break;
        };

        let result = run_isolated(&runner, kind, &request, &cancel).await;
        if results.send((kind, result)).await.is_err() {
            break;
        }
    }
    debug!(worker, "Worker drained");
}

fn next_section(queue: &SectionQueue) -> Option<SectionKind> {
    match queue.lock() {
        Ok(mut queue) => queue.pop_front(),
        // A worker that panicked while holding the lock leaves the queue intact.
        Err(poisoned) => poisoned.into_inner().pop_front(),
    }
}

/// Runs one section in its own task. A panic becomes a `Transient` failure;
/// cancellation, or dropping this future, aborts the task.
async fn run_isolated(
    runner: &SectionRunner,
    kind: SectionKind,
    request: &Arc<CollectionRequest>,
    cancel: &CancelToken,
) -> SectionResult {
    let mut task = JoinSet::new();
    task.spawn({
        let runner = runner.clone();
        let request = Arc::clone(request);
        let cancel = cancel.clone();
        async move { runner.run(kind, &request, &cancel).await }
    });

    tokio::select! {
        joined = task.join_next() => match joined {
            Some(Ok(result)) => result,
            Some(Err(e)) if e.is_panic() => {
                error!(section = %kind, "Section task panicked");
                SectionResult::Failure(SectionFailure::new(
                    ErrorKind::Transient,
                    format!("Section task panicked: {e}"),
                ))
            }
            _ => SectionResult::Failure(SectionFailure::cancelled()),
        },
        _ = cancel.cancelled() => {
            task.abort_all();
            SectionResult::Failure(SectionFailure::cancelled())
        }
    }
}
