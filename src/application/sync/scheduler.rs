use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use futures::{StreamExt, stream};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

use crate::domain::repository::RepositorySpec;

use super::engine::{SyncEngine, SyncError, SyncMode, SyncOutcome};

/// One pending sync of a repository; consumed by exactly one worker.
#[derive(Debug, Clone)]
pub struct SyncTask {
    pub repo: RepositorySpec,
    pub mode: SyncMode,
}

impl SyncTask {
    pub fn scheduled(repo: &RepositorySpec) -> Self {
        Self {
            mode: SyncMode::Scheduled(repo.check_interval()),
            repo: repo.clone(),
        }
    }

    pub fn forced(repo: &RepositorySpec) -> Self {
        Self {
            repo: repo.clone(),
            mode: SyncMode::Forced,
        }
    }
}

/// Fixed pool of workers draining a single-slot task queue.
///
/// Enqueueing waits for a free slot, so triggers are delayed rather than dropped.
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    sender: mpsc::Sender<SyncTask>,
    workers: Vec<JoinHandle<()>>,
}

impl SyncScheduler {
    pub fn start(engine: Arc<SyncEngine>, workers: NonZeroUsize) -> Self {
        let (sender, receiver) = mpsc::channel::<SyncTask>(1);
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..workers.get())
            .map(|worker| {
                let engine = engine.clone();
                let receiver = receiver.clone();
                tokio::spawn(async move {
                    loop {
                        let task = receiver.lock().await.recv().await;
                        let Some(task) = task else {
                            break;
                        };
                        run_task(&engine, worker, task).await;
                    }
                    debug!(target = "docmirror::scheduler", worker, "sync worker stopped");
                })
            })
            .collect();

        Self {
            engine,
            sender,
            workers: handles,
        }
    }

    pub async fn enqueue(&self, task: SyncTask) {
        let prefix = task.repo.remote_prefix.clone();
        if self.sender.send(task).await.is_err() {
            warn!(
                target = "docmirror::scheduler",
                remote_prefix = %prefix,
                "sync queue closed, dropping task"
            );
        }
    }

    /// Queue a scheduled cycle for every repository that is not sync-disabled.
    pub async fn enqueue_due(&self, repositories: &[RepositorySpec]) {
        for repo in repositories.iter().filter(|repo| !repo.sync_disabled) {
            self.enqueue(SyncTask::scheduled(repo)).await;
        }
    }

    /// Record every enabled repository as just triggered without syncing it.
    pub fn mark_all_triggered(&self, repositories: &[RepositorySpec]) {
        for repo in repositories.iter().filter(|repo| !repo.sync_disabled) {
            self.engine.registry().mark_triggered(&repo.remote_prefix);
        }
    }

    /// Periodically queue scheduled cycles. The per-repository interval gate decides what runs.
    pub fn spawn_trigger_loop(
        self: &Arc<Self>,
        repositories: Vec<RepositorySpec>,
        cadence: Duration,
    ) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cadence);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                debug!(target = "docmirror::scheduler", "scheduler tick");
                scheduler.enqueue_due(&repositories).await;
            }
        })
    }

    /// Close the queue and wait for in-flight cycles to finish.
    pub async fn shutdown(self) {
        drop(self.sender);
        for handle in self.workers {
            if let Err(err) = handle.await {
                warn!(target = "docmirror::scheduler", error = %err, "sync worker panicked");
            }
        }
    }
}

async fn run_task(engine: &SyncEngine, worker: usize, task: SyncTask) {
    let prefix = task.repo.remote_prefix.clone();
    match engine.sync(&task.repo, task.mode).await {
        Ok(SyncOutcome::Skipped) => {
            debug!(target = "docmirror::scheduler", worker, remote_prefix = %prefix, "not due");
        }
        Ok(SyncOutcome::Completed(_)) => {
            debug!(target = "docmirror::scheduler", worker, remote_prefix = %prefix, "synced");
        }
        // Already logged and published in the status table by the engine.
        Err(_) => {}
    }
}

/// Force one cycle of each repository, running at most `workers` at a time.
///
/// Returns the prefixes that failed alongside their errors.
pub async fn sync_all(
    engine: &SyncEngine,
    repositories: &[RepositorySpec],
    workers: NonZeroUsize,
) -> Vec<(String, SyncError)> {
    let results: Vec<(String, Result<SyncOutcome, SyncError>)> = stream::iter(repositories)
        .map(|repo| async move {
            let outcome = engine.sync(repo, SyncMode::Forced).await;
            (repo.remote_prefix.clone(), outcome)
        })
        .buffer_unordered(workers.get())
        .collect()
        .await;

    let failures: Vec<(String, SyncError)> = results
        .into_iter()
        .filter_map(|(prefix, result)| result.err().map(|err| (prefix, err)))
        .collect();

    info!(
        target = "docmirror::sync",
        repositories = repositories.len(),
        failed = failures.len(),
        "one-shot sync finished"
    );
    failures
}
