//! Worker pool

use crate::queue::JobQueue;
use crate::worker::TelemetryWorker;
use crate::WorkerConfig;
use safety_scoring::Analyzer;
use std::sync::Arc;
use storage::TripStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// A fixed set of workers sharing one queue
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    /// Spawn `config.workers` workers (at least one)
    pub fn spawn(
        config: &WorkerConfig,
        store: Arc<dyn TripStore>,
        queue: Arc<dyn JobQueue>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let count = config.workers.max(1);

        let handles = (0..count)
            .map(|id| {
                let worker = TelemetryWorker::new(id, store.clone(), queue.clone(), analyzer.clone());
                tokio::spawn(worker.run(rx.clone()))
            })
            .collect();

        info!("Started {} trip workers", count);
        Self { handles, shutdown }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Signal every worker to stop after its current job and wait for them
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        self.join().await;
    }

    /// Wait for all workers to exit (e.g. after the queue is closed)
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Worker task ended abnormally: {}", e);
            }
        }
        info!("All trip workers stopped");
    }
}
