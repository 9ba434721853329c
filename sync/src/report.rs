//! Outcome of a reconciliation pass.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub collection: String,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    /// Entities dropped for failing validation, env resolution or hashing.
    pub skipped: usize,
    /// Set when the collection's read or transaction failed. Write counts are
    /// zero in that case.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<String>
}

impl CollectionReport {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn writes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>) {
        self.created = 0;
        self.updated = 0;
        self.deleted = 0;
        self.failed = Some(reason.into());
    }
}

impl fmt::Display for CollectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} created, {} updated, {} deleted, {} unchanged, {} skipped",
            self.collection, self.created, self.updated, self.deleted, self.unchanged, self.skipped
        )?;
        if let Some(reason) = &self.failed {
            write!(f, " (failed: {reason})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub collections: Vec<CollectionReport>
}

impl SyncReport {
    #[must_use]
    pub fn total_writes(&self) -> usize {
        self.collections.iter().map(CollectionReport::writes).sum()
    }

    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&CollectionReport> {
        self.collections.iter().find(|c| c.collection == name)
    }

    #[must_use]
    pub fn failures(&self) -> Vec<&CollectionReport> {
        self.collections.iter().filter(|c| c.failed.is_some()).collect()
    }

    pub(crate) fn push(&mut self, report: CollectionReport) {
        if report.failed.is_some() {
            tracing::error!(collection = %report.collection, "{}", report);
        } else if report.writes() > 0 || report.skipped > 0 {
            tracing::info!(collection = %report.collection, "{}", report);
        } else {
            tracing::debug!(collection = %report.collection, "{}", report);
        }
        self.collections.push(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_collection_has_no_writes() {
        let mut report = CollectionReport::new("providers");
        report.created = 2;
        report.updated = 1;
        report.fail("transaction rejected");
        assert_eq!(report.writes(), 0);
        assert!(report.to_string().contains("failed: transaction rejected"));
    }

    #[test]
    fn test_total_writes() {
        let mut sync = SyncReport::default();
        sync.push(CollectionReport {
            created: 1,
            deleted: 2,
            ..CollectionReport::new("virtual_key_provider_configs")
        });
        sync.push(CollectionReport {
            unchanged: 4,
            ..CollectionReport::new("budgets")
        });
        assert_eq!(sync.total_writes(), 3);
        assert!(sync.failures().is_empty());
        assert_eq!(sync.collection("budgets").unwrap().unchanged, 4);
    }
}
