//! In-process worker pool
//!
//! Tasks go through a bounded channel and run on spawned tokio tasks, at most
//! `max_workers` at a time. Shutdown: [`WorkerPool::shutdown`] stops accepting
//! tasks, runs whatever is still queued, and returns once every task has
//! finished, so no claimed record is left `processing`.

use async_trait::async_trait;
use mediafiles_core::Config;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use crate::dispatch::{DispatchError, HealthCheck, ProcessFileTask, TaskDispatcher, WorkerHealth};
use crate::executor::ProcessingExecutor;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub max_workers: usize,
    /// Tasks that may wait for a free worker before enqueue is refused
    pub queue_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            queue_capacity: 256,
        }
    }
}

impl WorkerPoolConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_workers: config.worker_max_workers.max(1),
            queue_capacity: config.worker_queue_capacity.max(1),
        }
    }
}

#[derive(Clone)]
pub struct WorkerPool {
    sender: mpsc::Sender<ProcessFileTask>,
    shutdown_tx: mpsc::Sender<()>,
    stopped: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    dispatch_loop: Arc<Mutex<Option<JoinHandle<()>>>>,
    config: WorkerPoolConfig,
}

impl WorkerPool {
    /// Spawn the dispatch loop. Must be called inside a tokio runtime.
    pub fn start(executor: ProcessingExecutor, config: WorkerPoolConfig) -> Self {
        let (sender, task_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let stopped = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(AtomicUsize::new(0));

        let handle = tokio::spawn(Self::worker_pool(
            executor,
            config.clone(),
            task_rx,
            shutdown_rx,
            stopped.clone(),
            in_flight.clone(),
        ));

        Self {
            sender,
            shutdown_tx,
            stopped,
            in_flight,
            dispatch_loop: Arc::new(Mutex::new(Some(handle))),
            config,
        }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Tasks currently being executed
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Tasks waiting in the queue
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst) && !self.sender.is_closed()
    }

    /// Stop accepting tasks, finish queued and running ones, then return.
    pub async fn shutdown(&self) {
        tracing::info!(
            queued = self.queued(),
            in_flight = self.in_flight(),
            "Initiating worker pool shutdown"
        );
        self.stopped.store(true, Ordering::SeqCst);

        let Some(handle) = self.dispatch_loop.lock().await.take() else {
            tracing::debug!("Worker pool already shut down");
            return;
        };

        if let Err(e) = self.shutdown_tx.send(()).await {
            // The loop already exited on its own; awaiting it below is enough
            tracing::warn!(error = %e, "Worker pool dispatch loop not listening for shutdown");
        }

        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Worker pool dispatch loop panicked");
        }
    }

    fn spawn_task(
        tasks: &mut JoinSet<()>,
        executor: &ProcessingExecutor,
        in_flight: &Arc<AtomicUsize>,
        permit: OwnedSemaphorePermit,
        task: ProcessFileTask,
    ) {
        let executor = executor.clone();
        let in_flight = in_flight.clone();
        in_flight.fetch_add(1, Ordering::SeqCst);
        tasks.spawn(async move {
            let _permit = permit;
            let file_id = task.file_id;
            let outcome = executor.run(task).await;
            tracing::debug!(file_id, outcome = %outcome, "Worker finished task");
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    async fn worker_pool(
        executor: ProcessingExecutor,
        config: WorkerPoolConfig,
        mut task_rx: mpsc::Receiver<ProcessFileTask>,
        mut shutdown_rx: mpsc::Receiver<()>,
        stopped: Arc<AtomicBool>,
        in_flight: Arc<AtomicUsize>,
    ) {
        tracing::info!(
            max_workers = config.max_workers,
            queue_capacity = config.queue_capacity,
            "Worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers.max(1)));
        let mut tasks = JoinSet::new();

        loop {
            while let Some(result) = tasks.try_join_next() {
                log_join_result(result);
            }

            // Wait for a free worker first so backlog stays visible in the channel
            let permit = tokio::select! {
                _ = shutdown_rx.recv() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let task = tokio::select! {
                _ = shutdown_rx.recv() => break,
                task = task_rx.recv() => match task {
                    Some(task) => task,
                    None => break,
                },
            };

            Self::spawn_task(&mut tasks, &executor, &in_flight, permit, task);
        }

        stopped.store(true, Ordering::SeqCst);

        // Refuse new tasks, then run what was already accepted
        task_rx.close();
        let mut drained = 0usize;
        while let Some(task) = task_rx.recv().await {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::error!(file_id = task.file_id, error = %e, "No worker for queued task");
                    continue;
                }
            };
            Self::spawn_task(&mut tasks, &executor, &in_flight, permit, task);
            drained += 1;
        }
        if drained > 0 {
            tracing::info!(drained, "Running tasks queued before shutdown");
        }

        while let Some(result) = tasks.join_next().await {
            log_join_result(result);
        }
        tracing::info!("Worker pool stopped");
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "Worker task panicked");
    }
}

#[async_trait]
impl HealthCheck for WorkerPool {
    async fn probe(&self) -> WorkerHealth {
        if !self.is_running() {
            WorkerHealth::Unavailable
        } else if self.sender.capacity() == 0 {
            WorkerHealth::Unhealthy
        } else {
            WorkerHealth::Healthy
        }
    }
}

#[async_trait]
impl TaskDispatcher for WorkerPool {
    async fn enqueue(&self, task: ProcessFileTask) -> Result<(), DispatchError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(DispatchError::ShutDown);
        }

        let file_id = task.file_id;
        self.sender.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::ShutDown,
        })?;

        tracing::info!(file_id, task = ProcessFileTask::NAME, "Task submitted to worker pool");
        Ok(())
    }
}
