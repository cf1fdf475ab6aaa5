//! VPC section collector.
//!
//! Collects up to nineteen independent sections of metadata about one VPC
//! (subnets, route tables, gateways, peering, Direct Connect and more) through
//! a read-only API client, either one section at a time
//! ([`SequentialCollector`]) or through a bounded worker pool
//! ([`ConcurrentCollector`]). Results are cached with a TTL, remote calls are
//! retried with backoff, and every run yields a [`Report`] with one result per
//! requested section. A section that fails marks the report partial; it never
//! fails the run.

pub mod aggregate;
pub mod cache;
pub mod cancel;
pub mod collect;
pub mod executor;
pub mod fetch;
pub mod model;
pub mod registry;
pub mod sections;
pub mod telemetry;
pub mod traits;

// Re-export common types for convenience
pub use aggregate::{AggregateError, Aggregator};
pub use cache::{CacheBackend, CacheEntry, CacheError, CacheKey, CacheStore, FileBackend, MemoryBackend};
pub use cancel::{CancelSignal, CancelToken};
pub use collect::{CollectError, Collector, CollectorConfig, SequentialCollector};
pub use executor::ConcurrentCollector;
pub use fetch::{FetchError, RemoteFetcher, RetryPolicy};
pub use model::*;
pub use registry::{ParseSectionError, SectionKind, SectionRegistry};
pub use sections::{ResourceList, SectionRecord, Tag};
pub use traits::*;
