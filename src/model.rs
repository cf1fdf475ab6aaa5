use crate::registry::{SectionKind, SectionRegistry};
use crate::sections::SectionRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

// ============================================================================
// Request
// ============================================================================

/// What to collect: one resource in one region, and which sections of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRequest {
    pub region: String,
    pub resource_id: String,
    pub sections: BTreeSet<SectionKind>,
    pub use_cache: bool,
    /// Upper bound on concurrent section fetches (concurrent collector only)
    pub concurrency_limit: Option<usize>,
}

impl CollectionRequest {
    /// Request for every section, with caching enabled.
    pub fn new(region: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            resource_id: resource_id.into(),
            sections: SectionKind::ALL.into_iter().collect(),
            use_cache: true,
            concurrency_limit: None,
        }
    }

    pub fn with_sections(mut self, sections: impl IntoIterator<Item = SectionKind>) -> Self {
        self.sections = sections.into_iter().collect();
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }

    /// Checks the request against `registry` and returns the sections to
    /// collect in registry order.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] for an empty region or resource id, an empty
    /// section set, a zero concurrency limit, or a section the registry does
    /// not serve.
    pub fn validate(&self, registry: &SectionRegistry) -> Result<Vec<SectionKind>, RequestError> {
        if self.region.trim().is_empty() {
            return Err(RequestError::EmptyRegion);
        }
        if self.resource_id.trim().is_empty() {
            return Err(RequestError::EmptyResourceId);
        }
        if self.sections.is_empty() {
            return Err(RequestError::NoSections);
        }
        if self.concurrency_limit == Some(0) {
            return Err(RequestError::ZeroConcurrency);
        }
        if let Some(kind) = self.sections.iter().find(|kind| !registry.contains(**kind)) {
            return Err(RequestError::UnsupportedSection(*kind));
        }

        // BTreeSet iteration follows declaration order, which is registry order.
        Ok(self.sections.iter().copied().collect())
    }
}

/// Usage errors detected before any fetch begins.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Region must not be empty")]
    EmptyRegion,
    #[error("Resource id must not be empty")]
    EmptyResourceId,
    #[error("At least one section must be requested")]
    NoSections,
    #[error("Concurrency limit must be at least 1")]
    ZeroConcurrency,
    #[error("Section '{0}' is not served by this collector")]
    UnsupportedSection(SectionKind),
}

// ============================================================================
// Per-section outcome
// ============================================================================

/// Why a section could not be collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Remote API throttled every attempt
    RateLimited,
    /// Network or timeout failure on every attempt
    Transient,
    NotAuthorized,
    NotFound,
    /// Payload could not be normalized into the section record
    Malformed,
    /// Collection was cancelled before the section completed
    Cancelled,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::RateLimited | ErrorKind::Transient)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl SectionFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.is_retryable(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Collection cancelled before section completed")
    }
}

/// Where a successful record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Fresh,
    Cached,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionResult {
    Success { record: SectionRecord, source: Source },
    Failure(SectionFailure),
}

impl SectionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, SectionResult::Success { .. })
    }

    pub fn record(&self) -> Option<&SectionRecord> {
        match self {
            SectionResult::Success { record, .. } => Some(record),
            SectionResult::Failure(_) => None,
        }
    }

    pub fn source(&self) -> Option<Source> {
        match self {
            SectionResult::Success { source, .. } => Some(*source),
            SectionResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&SectionFailure> {
        match self {
            SectionResult::Success { .. } => None,
            SectionResult::Failure(failure) => Some(failure),
        }
    }
}

// ============================================================================
// Report
// ============================================================================

/// Unified outcome of one collection run.
///
/// Built once by the aggregator and handed to the caller; there is no API to
/// change it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    region: String,
    resource_id: String,
    sections: BTreeMap<SectionKind, SectionResult>,
    partial: bool,
    elapsed_ms: u64,
}

impl Report {
    pub(crate) fn new(
        region: String,
        resource_id: String,
        sections: BTreeMap<SectionKind, SectionResult>,
        elapsed_ms: u64,
    ) -> Self {
        let partial = sections.values().any(|result| !result.is_success());
        Self {
            region,
            resource_id,
            sections,
            partial,
            elapsed_ms,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// True iff at least one section failed.
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn get(&self, kind: SectionKind) -> Option<&SectionResult> {
        self.sections.get(&kind)
    }

    pub fn sections(&self) -> &BTreeMap<SectionKind, SectionResult> {
        &self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = (SectionKind, &SectionRecord)> {
        self.sections
            .iter()
            .filter_map(|(kind, result)| result.record().map(|record| (*kind, record)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (SectionKind, &SectionFailure)> {
        self.sections
            .iter()
            .filter_map(|(kind, result)| result.failure().map(|failure| (*kind, failure)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_request_defaults_to_all_sections() {
        let request = CollectionRequest::new("us-east-1", "vpc-1");
        assert_eq!(request.sections.len(), 19);
        assert!(request.use_cache);
        assert_eq!(request.concurrency_limit, None);
    }

    #[test]
    fn test_validate_returns_registry_order() {
        let request = CollectionRequest::new("us-east-1", "vpc-1").with_sections([
            SectionKind::FlowLogs,
            SectionKind::Vpc,
            SectionKind::Subnets,
        ]);
        let sections = request.validate(&SectionRegistry::default()).unwrap();
        assert_eq!(
            sections,
            vec![SectionKind::Vpc, SectionKind::Subnets, SectionKind::FlowLogs]
        );
    }

    #[test]
    fn test_validate_rejects_usage_errors() {
        let registry = SectionRegistry::default();
        let base = CollectionRequest::new("us-east-1", "vpc-1");

        assert_eq!(
            CollectionRequest::new("", "vpc-1").validate(&registry),
            Err(RequestError::EmptyRegion)
        );
        assert_eq!(
            CollectionRequest::new("us-east-1", " ").validate(&registry),
            Err(RequestError::EmptyResourceId)
        );
        assert_eq!(
            base.clone().with_sections([]).validate(&registry),
            Err(RequestError::NoSections)
        );
        assert_eq!(
            base.clone().with_concurrency_limit(0).validate(&registry),
            Err(RequestError::ZeroConcurrency)
        );

        let narrow = SectionRegistry::with_kinds([SectionKind::Vpc]);
        assert_eq!(
            base.with_sections([SectionKind::Subnets]).validate(&narrow),
            Err(RequestError::UnsupportedSection(SectionKind::Subnets))
        );
    }

    #[test]
    fn test_failure_retryable_follows_kind() {
        assert!(SectionFailure::new(ErrorKind::RateLimited, "slow down").retryable);
        assert!(SectionFailure::new(ErrorKind::Transient, "reset").retryable);
        assert!(!SectionFailure::new(ErrorKind::NotAuthorized, "denied").retryable);
        assert!(!SectionFailure::cancelled().retryable);
    }

    #[test]
    fn test_report_partial_flag() {
        let mut sections = BTreeMap::new();
        sections.insert(
            SectionKind::Vpc,
            SectionResult::Failure(SectionFailure::new(ErrorKind::NotFound, "gone")),
        );
        let report = Report::new("us-east-1".into(), "vpc-1".into(), sections, 5);
        assert!(report.is_partial());
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.successes().count(), 0);

        let empty = Report::new("us-east-1".into(), "vpc-1".into(), BTreeMap::new(), 0);
        assert!(!empty.is_partial());
    }
}
