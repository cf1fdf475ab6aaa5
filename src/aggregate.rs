//! Aggregator - merges per-section outcomes into one [`Report`].
//!
//! Exactly one result per requested section. Anything else is a collector
//! bug and is surfaced as [`AggregateError`] rather than papered over.

use crate::model::{Report, SectionResult};
use crate::registry::SectionKind;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregateError {
    #[error("Section '{0}' was recorded twice")]
    Duplicate(SectionKind),

    #[error("Section '{0}' was not requested")]
    Unrequested(SectionKind),

    #[error("No result recorded for sections: {0:?}")]
    Missing(Vec<SectionKind>),
}

#[derive(Debug)]
pub struct Aggregator {
    region: String,
    resource_id: String,
    requested: BTreeSet<SectionKind>,
    results: BTreeMap<SectionKind, SectionResult>,
}

impl Aggregator {
    pub fn new(
        region: impl Into<String>,
        resource_id: impl Into<String>,
        requested: impl IntoIterator<Item = SectionKind>,
    ) -> Self {
        Self {
            region: region.into(),
            resource_id: resource_id.into(),
            requested: requested.into_iter().collect(),
            results: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, kind: SectionKind, result: SectionResult) -> Result<(), AggregateError> {
        if !self.requested.contains(&kind) {
            return Err(AggregateError::Unrequested(kind));
        }
        if self.results.contains_key(&kind) {
            return Err(AggregateError::Duplicate(kind));
        }
        self.results.insert(kind, result);
        Ok(())
    }

    /// Requested sections with no result yet, in registry order.
    pub fn pending(&self) -> Vec<SectionKind> {
        self.requested
            .iter()
            .filter(|kind| !self.results.contains_key(kind))
            .copied()
            .collect()
    }

    pub fn finish(self, elapsed: Duration) -> Result<Report, AggregateError> {
        let missing = self.pending();
        if !missing.is_empty() {
            return Err(AggregateError::Missing(missing));
        }
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        Ok(Report::new(
            self.region,
            self.resource_id,
            self.results,
            elapsed_ms,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ErrorKind, SectionFailure, Source};
    use crate::sections::{ResourceList, SectionRecord};

    fn success() -> SectionResult {
        SectionResult::Success {
            record: SectionRecord::Subnets(ResourceList::new(vec![])),
            source: Source::Fresh,
        }
    }

    fn failure() -> SectionResult {
        SectionResult::Failure(SectionFailure::new(ErrorKind::RateLimited, "throttled"))
    }

    #[test]
    fn test_finish_builds_partial_report() {
        let mut agg = Aggregator::new(
            "us-east-1",
            "vpc-1",
            [SectionKind::Subnets, SectionKind::NatGateways],
        );
        agg.record(SectionKind::NatGateways, failure()).unwrap();
        agg.record(SectionKind::Subnets, success()).unwrap();

        let report = agg.finish(Duration::from_millis(42)).unwrap();
        assert_eq!(report.len(), 2);
        assert!(report.is_partial());
        assert_eq!(report.elapsed_ms(), 42);
        assert_eq!(report.region(), "us-east-1");
    }

    #[test]
    fn test_all_success_is_not_partial() {
        let mut agg = Aggregator::new("us-east-1", "vpc-1", [SectionKind::Subnets]);
        agg.record(SectionKind::Subnets, success()).unwrap();
        assert!(!agg.finish(Duration::ZERO).unwrap().is_partial());
    }

    #[test]
    fn test_rejects_duplicate_and_unrequested() {
        let mut agg = Aggregator::new("us-east-1", "vpc-1", [SectionKind::Subnets]);
        agg.record(SectionKind::Subnets, success()).unwrap();

        assert_eq!(
            agg.record(SectionKind::Subnets, failure()),
            Err(AggregateError::Duplicate(SectionKind::Subnets))
        );
        assert_eq!(
            agg.record(SectionKind::Vpc, success()),
            Err(AggregateError::Unrequested(SectionKind::Vpc))
        );
    }

    #[test]
    fn test_finish_reports_missing_sections() {
        let mut agg = Aggregator::new(
            "us-east-1",
            "vpc-1",
            [SectionKind::Vpc, SectionKind::Subnets, SectionKind::FlowLogs],
        );
        agg.record(SectionKind::Subnets, success()).unwrap();
        assert_eq!(agg.pending(), vec![SectionKind::Vpc, SectionKind::FlowLogs]);

        assert_eq!(
            agg.finish(Duration::ZERO),
            Err(AggregateError::Missing(vec![
                SectionKind::Vpc,
                SectionKind::FlowLogs
            ]))
        );
    }
}
