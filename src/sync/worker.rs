use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::reconciler::Reconciler;
use super::SyncTask;

/// Spawn `count` workers consuming the shared task queue. Workers run
/// until the queue closes; every outcome is reported on the task's result
/// channel and a task-level error never stops a worker.
pub fn spawn_workers(
    count: usize,
    queue: mpsc::Receiver<SyncTask>,
    reconciler: Arc<Reconciler>,
) -> Vec<JoinHandle<()>> {
    let queue = Arc::new(Mutex::new(queue));
    (0..count)
        .map(|id| {
            let queue = queue.clone();
            let reconciler = reconciler.clone();
            tokio::spawn(worker(id, queue, reconciler))
        })
        .collect()
}

async fn worker(id: usize, queue: Arc<Mutex<mpsc::Receiver<SyncTask>>>, reconciler: Arc<Reconciler>) {
    log::info!("worker {id} started");
    loop {
        let task = queue.lock().await.recv().await;
        let Some(task) = task else {
            break;
        };

        log::info!("worker {id}: syncing ADO work item {}", task.ado_task_id);
        let result = reconciler.sync_work_item(task.ado_task_id).await;
        if let Err(e) = &result {
            log::error!(
                "worker {id}: task sync failed: ado_task_id={} error={e}",
                task.ado_task_id
            );
        }
        let _ = task.result.send(result).await;
    }
    log::info!("worker {id} stopped");
}
