pub mod controller;
pub mod metadata;
pub mod reconciler;
pub mod worker;

use tokio::sync::mpsc;

use crate::error::Error;

/// Outcome of reconciling one work item.
pub type TaskResult = std::result::Result<(), Error>;

/// One unit of work for the pool: a changed ADO work item id plus the
/// channel the worker reports its outcome on.
pub struct SyncTask {
    pub ado_task_id: i64,
    pub result: mpsc::Sender<TaskResult>,
}

/// Report returned after one controller cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub status: CycleStatus,
    pub items_found: usize,
    pub items_failed: usize,
    /// Whether the watermark was advanced (unanimous success only).
    pub watermark_advanced: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleStatus {
    Success,
    PartialFailure,
    Failed,
}

impl CycleReport {
    /// Create a CycleReport with the status derived from counts.
    pub fn from_counts(items_found: usize, items_failed: usize, watermark_advanced: bool) -> Self {
        let status = if items_failed == 0 {
            CycleStatus::Success
        } else if items_failed < items_found {
            CycleStatus::PartialFailure
        } else {
            CycleStatus::Failed
        };
        let error = if items_failed > 0 {
            Some(format!("{items_failed} items failed"))
        } else {
            None
        };
        Self {
            status,
            items_found,
            items_failed,
            watermark_advanced,
            error,
        }
    }

    /// A cycle that failed before dispatching any work.
    pub fn aborted(error: String) -> Self {
        Self {
            status: CycleStatus::Failed,
            items_found: 0,
            items_failed: 0,
            watermark_advanced: false,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_counts_success() {
        let report = CycleReport::from_counts(3, 0, true);
        assert_eq!(report.status, CycleStatus::Success);
        assert!(report.watermark_advanced);
        assert!(report.error.is_none());
    }

    #[test]
    fn test_from_counts_partial_failure() {
        let report = CycleReport::from_counts(3, 1, false);
        assert_eq!(report.status, CycleStatus::PartialFailure);
        assert!(!report.watermark_advanced);
        assert_eq!(report.error.as_deref(), Some("1 items failed"));
    }

    #[test]
    fn test_from_counts_total_failure() {
        let report = CycleReport::from_counts(2, 2, false);
        assert_eq!(report.status, CycleStatus::Failed);
    }

    #[test]
    fn test_aborted() {
        let report = CycleReport::aborted("wiql query failed".into());
        assert_eq!(report.status, CycleStatus::Failed);
        assert!(!report.watermark_advanced);
        assert_eq!(report.items_found, 0);
    }
}
