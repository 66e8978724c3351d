//! In-process worker pool.
//!
//! Each worker is a tokio task owning a request queue. Requests travel as
//! JSON, the same encoding a remote transport would use, and every answer is
//! pushed to one shared completion channel, so [`LocalWorkerPool::next_result`]
//! yields results in completion order across all workers.
//!
//! Per-worker concurrency is bounded by a semaphore. Reconfiguring swaps the
//! semaphore: requests already running keep their old permits, new requests
//! draw from the new limit.

use std::{
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use futures::FutureExt;
use log::{debug, warn};
use snafu::prelude::*;
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore, mpsc},
    task::JoinSet,
};

use crate::pool::{
    ClosedSnafu, DecodeSnafu, EncodeSnafu, InvalidParallelismSnafu, InvalidWorkerSnafu,
    JoinSnafu, NoPendingRequestSnafu, PoolError, PoolResult, WorkerPool, registry::WorkerRegistry,
};
use crate::protocol::{WorkerRequest, WorkerResult};
use crate::worker::WorkerHandler;

struct Completion {
    worker_idx: usize,
    outcome: Result<Vec<u8>, String>,
}

/// Concurrency limit of one worker.
struct WorkerLimit {
    semaphore: Mutex<Arc<Semaphore>>,
}

impl WorkerLimit {
    fn new(permits: usize) -> Self {
        Self {
            semaphore: Mutex::new(Arc::new(Semaphore::new(permits))),
        }
    }

    fn current(&self) -> Arc<Semaphore> {
        match self.semaphore.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn replace(&self, permits: usize) {
        let semaphore = Arc::new(Semaphore::new(permits));
        match self.semaphore.lock() {
            Ok(mut guard) => *guard = semaphore,
            Err(poisoned) => *poisoned.into_inner() = semaphore,
        }
    }

    async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        // The semaphore is never closed.
        self.current().acquire_owned().await.ok()
    }
}

/// Workers running as tokio tasks of the current runtime.
///
/// Must be created from within a tokio runtime.
pub struct LocalWorkerPool {
    senders: Vec<mpsc::UnboundedSender<Vec<u8>>>,
    limits: Vec<Arc<WorkerLimit>>,
    completions: mpsc::UnboundedReceiver<Completion>,
    workers: JoinSet<()>,
    pending: usize,
    parallel: usize,
}

impl std::fmt::Debug for LocalWorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWorkerPool")
            .field("num_workers", &self.limits.len())
            .field("pending", &self.pending)
            .finish()
    }
}

impl LocalWorkerPool {
    /// Start one worker per handler.
    pub fn spawn(
        handlers: Vec<Arc<dyn WorkerHandler>>,
        parallel_requests_per_worker: usize,
    ) -> PoolResult<Self> {
        ensure!(parallel_requests_per_worker > 0, InvalidParallelismSnafu);

        let (completion_tx, completions) = mpsc::unbounded_channel();
        let mut senders = Vec::with_capacity(handlers.len());
        let mut limits = Vec::with_capacity(handlers.len());
        let mut workers = JoinSet::new();

        for (worker_idx, handler) in handlers.into_iter().enumerate() {
            let (tx, rx) = mpsc::unbounded_channel();
            let limit = Arc::new(WorkerLimit::new(parallel_requests_per_worker));
            workers.spawn(worker_loop(
                worker_idx,
                handler,
                rx,
                limit.clone(),
                completion_tx.clone(),
            ));
            senders.push(tx);
            limits.push(limit);
        }

        debug!(
            "Started {} local worker(s) with {parallel_requests_per_worker} parallel request(s) each",
            senders.len()
        );

        Ok(Self {
            senders,
            limits,
            completions,
            workers,
            pending: 0,
            parallel: parallel_requests_per_worker,
        })
    }

    /// Start `num_workers` workers sharing one handler.
    pub fn with_handler(
        handler: Arc<dyn WorkerHandler>,
        num_workers: usize,
        parallel_requests_per_worker: usize,
    ) -> PoolResult<Self> {
        Self::spawn(
            vec![handler; num_workers],
            parallel_requests_per_worker,
        )
    }

    /// Start `num_workers` workers running the handler registered as `name`.
    pub fn from_registry(
        registry: &WorkerRegistry,
        name: &str,
        num_workers: usize,
        parallel_requests_per_worker: usize,
    ) -> PoolResult<Self> {
        let handlers = (0..num_workers)
            .map(|_| registry.create(name))
            .collect::<PoolResult<Vec<_>>>()?;
        Self::spawn(handlers, parallel_requests_per_worker)
    }

    /// Number of submitted requests whose result was not yet returned.
    pub fn pending(&self) -> usize {
        self.pending
    }
}

async fn execute(handler: &dyn WorkerHandler, bytes: &[u8]) -> Result<Vec<u8>, String> {
    let request: WorkerRequest =
        serde_json::from_slice(bytes).map_err(|e| format!("invalid request: {e}"))?;
    let shard_idx = request.shard_idx;
    let result = handler
        .run(request)
        .await
        .map_err(|e| format!("output shard {shard_idx}: {e}"))?;
    serde_json::to_vec(&result).map_err(|e| format!("cannot encode result: {e}"))
}

async fn worker_loop(
    worker_idx: usize,
    handler: Arc<dyn WorkerHandler>,
    mut requests: mpsc::UnboundedReceiver<Vec<u8>>,
    limit: Arc<WorkerLimit>,
    completions: mpsc::UnboundedSender<Completion>,
) {
    let mut running = JoinSet::new();

    while let Some(bytes) = requests.recv().await {
        let permit = limit.acquire().await;
        let handler = handler.clone();
        let completions = completions.clone();

        running.spawn(async move {
            let outcome = AssertUnwindSafe(execute(handler.as_ref(), &bytes))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err("worker panicked".to_string()));
            drop(permit);
            if completions
                .send(Completion {
                    worker_idx,
                    outcome,
                })
                .is_err()
            {
                warn!("Worker {worker_idx} finished a request after the pool was dropped");
            }
        });

        while running.try_join_next().is_some() {}
    }

    while running.join_next().await.is_some() {}
    debug!("Worker {worker_idx} stopped");
}

#[async_trait]
impl WorkerPool for LocalWorkerPool {
    fn num_workers(&self) -> usize {
        self.limits.len()
    }

    fn parallel_requests_per_worker(&self) -> usize {
        self.parallel
    }

    async fn configure(&mut self, parallel_requests_per_worker: usize) -> PoolResult<()> {
        ensure!(parallel_requests_per_worker > 0, InvalidParallelismSnafu);
        for limit in &self.limits {
            limit.replace(parallel_requests_per_worker);
        }
        self.parallel = parallel_requests_per_worker;
        Ok(())
    }

    async fn submit(&mut self, request: &WorkerRequest, worker_idx: usize) -> PoolResult<()> {
        let num_workers = self.num_workers();
        ensure!(
            worker_idx < num_workers,
            InvalidWorkerSnafu {
                worker_idx,
                num_workers
            }
        );
        let sender = self.senders.get(worker_idx).context(ClosedSnafu)?;
        let bytes = serde_json::to_vec(request).context(EncodeSnafu {
            shard_idx: request.shard_idx,
        })?;
        sender.send(bytes).ok().context(ClosedSnafu)?;
        self.pending += 1;
        Ok(())
    }

    async fn next_result(&mut self) -> PoolResult<WorkerResult> {
        ensure!(self.pending > 0, NoPendingRequestSnafu);
        let completion = self.completions.recv().await.context(ClosedSnafu)?;
        self.pending -= 1;

        let worker_idx = completion.worker_idx;
        match completion.outcome {
            Ok(bytes) => serde_json::from_slice(&bytes).context(DecodeSnafu { worker_idx }),
            Err(message) => Err(PoolError::Worker {
                worker_idx,
                message,
            }),
        }
    }

    async fn shutdown(&mut self) -> PoolResult<()> {
        self.senders.clear();
        while let Some(joined) = self.workers.join_next().await {
            joined.context(JoinSnafu)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataspec::DataSpecification;
    use crate::worker::WorkerError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn request(shard_idx: usize) -> WorkerRequest {
        WorkerRequest {
            columns: vec![0],
            dataspec: DataSpecification::default(),
            dataset_path: format!("csv:/in/{shard_idx}"),
            shard_idx,
            num_shards: 8,
            output_directory: "/cache".into(),
            column_idx_remove_example_with_zero: None,
        }
    }

    /// Answers `10 * shard_idx` examples after sleeping `delay_ms(shard_idx)`.
    struct Scripted {
        delay_ms: fn(usize) -> u64,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl Scripted {
        fn new(delay_ms: fn(usize) -> u64) -> Arc<Self> {
            Arc::new(Self {
                delay_ms,
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl WorkerHandler for Scripted {
        async fn run(&self, request: WorkerRequest) -> Result<WorkerResult, WorkerError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis((self.delay_ms)(request.shard_idx))).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            if request.dataset_path.ends_with("fail") {
                return Err(WorkerError::Rejected {
                    message: "scripted failure".to_string(),
                });
            }
            if request.dataset_path.ends_with("panic") {
                panic!("scripted panic");
            }
            Ok(WorkerResult {
                shard_idx: request.shard_idx,
                num_examples: 10 * request.shard_idx as u64,
            })
        }
    }

    #[tokio::test]
    async fn results_arrive_in_completion_order() -> TestResult {
        let handler = Scripted::new(|idx| if idx == 0 { 200 } else { 0 });
        let mut pool = LocalWorkerPool::with_handler(handler, 2, 1)?;

        pool.submit(&request(0), 0).await?;
        pool.submit(&request(1), 1).await?;

        assert_eq!(pool.next_result().await?.shard_idx, 1);
        let slow = pool.next_result().await?;
        assert_eq!(slow.shard_idx, 0);
        assert_eq!(slow.num_examples, 0);
        assert_eq!(pool.pending(), 0);

        pool.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn configure_bounds_per_worker_concurrency() -> TestResult {
        let handler = Scripted::new(|_| 20);
        let mut pool = LocalWorkerPool::with_handler(handler.clone(), 1, 4)?;

        assert_eq!(pool.parallel_requests_per_worker(), 4);
        pool.configure(1).await?;
        assert_eq!(pool.parallel_requests_per_worker(), 1);
        for idx in 0..4 {
            pool.submit(&request(idx), 0).await?;
        }
        for _ in 0..4 {
            pool.next_result().await?;
        }
        assert_eq!(handler.max_running.load(Ordering::SeqCst), 1);

        handler.max_running.store(0, Ordering::SeqCst);
        pool.configure(3).await?;
        for idx in 0..6 {
            pool.submit(&request(idx), 0).await?;
        }
        for _ in 0..6 {
            pool.next_result().await?;
        }
        let max = handler.max_running.load(Ordering::SeqCst);
        assert!((1..=3).contains(&max), "max concurrency was {max}");

        pool.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn invalid_worker_and_empty_queue_are_errors() -> TestResult {
        let mut pool = LocalWorkerPool::with_handler(Scripted::new(|_| 0), 2, 1)?;

        let err = pool.submit(&request(0), 2).await.expect_err("bad worker");
        assert!(matches!(err, PoolError::InvalidWorker { worker_idx: 2, num_workers: 2, .. }));

        let err = pool.next_result().await.expect_err("nothing pending");
        assert!(matches!(err, PoolError::NoPendingRequest { .. }));

        let err = pool.configure(0).await.expect_err("zero parallelism");
        assert!(matches!(err, PoolError::InvalidParallelism { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn handler_failures_and_panics_become_worker_errors() -> TestResult {
        let mut pool = LocalWorkerPool::with_handler(Scripted::new(|_| 0), 1, 2)?;

        let mut failing = request(3);
        failing.dataset_path = "csv:/in/fail".to_string();
        pool.submit(&failing, 0).await?;
        let err = pool.next_result().await.expect_err("failure");
        assert!(
            matches!(err, PoolError::Worker { worker_idx: 0, ref message } if message.contains("scripted failure"))
        );

        let mut panicking = request(4);
        panicking.dataset_path = "csv:/in/panic".to_string();
        pool.submit(&panicking, 0).await?;
        let err = pool.next_result().await.expect_err("panic");
        assert!(matches!(err, PoolError::Worker { ref message, .. } if message.contains("panicked")));

        // The worker survives both.
        pool.submit(&request(5), 0).await?;
        assert_eq!(pool.next_result().await?.num_examples, 50);

        pool.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn submit_after_shutdown_fails() -> TestResult {
        let mut pool = LocalWorkerPool::with_handler(Scripted::new(|_| 0), 1, 1)?;
        pool.shutdown().await?;

        let err = pool.submit(&request(0), 0).await.expect_err("closed");
        assert!(matches!(err, PoolError::Closed { .. }));
        assert_eq!(pool.num_workers(), 1);
        Ok(())
    }
}
