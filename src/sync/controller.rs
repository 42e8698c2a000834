use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ado::AdoApi;
use crate::storage::{repository, Database};

use super::{CycleReport, SyncTask};

/// Periodic orchestrator. Each cycle lists work items changed since the
/// watermark, dispatches them to the worker pool, waits for every result,
/// and advances the watermark only when all of them succeeded.
pub struct Controller {
    db: Database,
    ado: Arc<dyn AdoApi>,
    tasks: mpsc::Sender<SyncTask>,
    interval: Duration,
}

impl Controller {
    pub fn new(
        db: Database,
        ado: Arc<dyn AdoApi>,
        tasks: mpsc::Sender<SyncTask>,
        interval: Duration,
    ) -> Self {
        Self {
            db,
            ado,
            tasks,
            interval,
        }
    }

    /// Run cycles until the shutdown token fires. The token is only
    /// checked between cycles; an in-flight cycle always finishes
    /// collecting its results.
    pub async fn run(&self, shutdown: CancellationToken) {
        log::info!("controller started");
        loop {
            let report = self.run_cycle().await;
            log::info!(
                "cycle complete: status={:?} found={} failed={} watermark_advanced={}",
                report.status,
                report.items_found,
                report.items_failed,
                report.watermark_advanced
            );

            log::info!("sleeping for {:?}", self.interval);
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!("shutdown requested, controller stopping");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// Execute a single sync cycle.
    pub async fn run_cycle(&self) -> CycleReport {
        let since = match repository::last_sync(&self.db).await {
            Ok(since) => since,
            Err(e) => {
                log::error!("error reading last sync time: {e}");
                return CycleReport::aborted(e.to_string());
            }
        };

        log::info!("listing work items changed since {since}");
        let items = match self.ado.list_changed(since).await {
            Ok(items) => items,
            Err(e) => {
                log::error!("error listing changed work items: {e}");
                return CycleReport::aborted(e.to_string());
            }
        };

        let found = items.len();
        let (result_tx, mut results) = mpsc::channel(found.max(1));
        for item in items {
            let task = SyncTask {
                ado_task_id: item.id,
                result: result_tx.clone(),
            };
            if self.tasks.send(task).await.is_err() {
                log::error!("worker queue closed, aborting cycle");
                return CycleReport::aborted("worker queue closed".into());
            }
        }
        // Only the per-task clones remain; the channel closes once every
        // dispatched result has been delivered.
        drop(result_tx);

        let mut failed = 0;
        while let Some(result) = results.recv().await {
            if result.is_err() {
                failed += 1;
            }
        }

        let mut advanced = failed == 0;
        if advanced {
            if let Err(e) = repository::write_last_sync(&self.db, Utc::now()).await {
                log::error!("error writing last sync time: {e}");
                advanced = false;
            }
        }

        CycleReport::from_counts(found, failed, advanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::sentinel_last_sync;
    use crate::sync::metadata::MetadataCache;
    use crate::sync::reconciler::Reconciler;
    use crate::sync::worker::spawn_workers;
    use crate::sync::CycleStatus;
    use crate::testutil::{work_item, MockAdo, MockAsana};
    use std::time::Duration;

    struct Fixture {
        db: Database,
        ado: Arc<MockAdo>,
        controller: Controller,
    }

    async fn fixture() -> Fixture {
        let db = Database::open_memory().await.unwrap();
        db.ensure_indexes().await.unwrap();
        let ado = Arc::new(MockAdo::default());
        let asana = Arc::new(MockAsana::default());
        let metadata = Arc::new(MetadataCache::new(
            db.clone(),
            asana.clone(),
            Duration::from_secs(24 * 60 * 60),
            "synced",
        ));
        let reconciler = Arc::new(Reconciler::new(
            db.clone(),
            ado.clone(),
            asana,
            metadata,
        ));

        let (task_tx, task_rx) = mpsc::channel(16);
        spawn_workers(2, task_rx, reconciler);

        let controller = Controller::new(db.clone(), ado.clone(), task_tx, Duration::from_secs(1));
        Fixture {
            db,
            ado,
            controller,
        }
    }

    #[tokio::test]
    async fn test_cycle_advances_watermark_on_unanimous_success() {
        let fx = fixture().await;
        // Unmapped projects reconcile as successful skips.
        fx.ado
            .add_work_item(work_item(1, "One", "Unmapped", "http://ado/1"));
        fx.ado
            .add_work_item(work_item(2, "Two", "Unmapped", "http://ado/2"));

        let report = fx.controller.run_cycle().await;

        assert_eq!(report.status, CycleStatus::Success);
        assert_eq!(report.items_found, 2);
        assert!(report.watermark_advanced);
        assert!(repository::last_sync(&fx.db).await.unwrap() > sentinel_last_sync());
    }

    #[tokio::test]
    async fn test_failed_task_pins_watermark() {
        let fx = fixture().await;
        fx.ado
            .add_work_item(work_item(1, "One", "Unmapped", "http://ado/1"));
        fx.ado
            .add_work_item(work_item(3, "Three", "Unmapped", "http://ado/3"));
        // Work item 2 is listed as changed but cannot be fetched.
        fx.ado.set_changed(vec![1, 2, 3]);

        let report = fx.controller.run_cycle().await;

        assert_eq!(report.status, CycleStatus::PartialFailure);
        assert_eq!(report.items_found, 3);
        assert_eq!(report.items_failed, 1);
        assert!(!report.watermark_advanced);
        assert_eq!(
            repository::last_sync(&fx.db).await.unwrap(),
            sentinel_last_sync()
        );
    }

    #[tokio::test]
    async fn test_list_changed_failure_aborts_cycle() {
        let fx = fixture().await;
        fx.ado.set_error("list_changed", "wiql down");

        let report = fx.controller.run_cycle().await;

        assert_eq!(report.status, CycleStatus::Failed);
        assert_eq!(report.items_found, 0);
        assert!(!report.watermark_advanced);
        assert_eq!(
            repository::last_sync(&fx.db).await.unwrap(),
            sentinel_last_sync()
        );
    }

    #[tokio::test]
    async fn test_empty_cycle_still_advances_watermark() {
        let fx = fixture().await;

        let report = fx.controller.run_cycle().await;

        assert_eq!(report.status, CycleStatus::Success);
        assert_eq!(report.items_found, 0);
        assert!(report.watermark_advanced);
        assert!(repository::last_sync(&fx.db).await.unwrap() > sentinel_last_sync());
    }

    #[tokio::test]
    async fn test_watermark_monotonic_across_cycles() {
        let fx = fixture().await;

        fx.controller.run_cycle().await;
        let first = repository::last_sync(&fx.db).await.unwrap();

        fx.controller.run_cycle().await;
        let second = repository::last_sync(&fx.db).await.unwrap();

        assert!(second >= first);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let fx = fixture().await;
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        // With the token already cancelled the loop runs one cycle and
        // returns instead of sleeping.
        fx.controller.run(shutdown).await;
    }
}
