//! Decides whether and where a saved record gets processed

use mediafiles_core::{MediaRecord, ProcessingStatus};
use mediafiles_db::MediaRepository;
use mediafiles_processing::ProcessingResult;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::dispatch::{HealthCheck, ProcessFileTask, TaskDispatcher, WorkerHealth};
use crate::executor::ProcessingExecutor;
use crate::unit_of_work::UnitOfWork;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoSource,
    NotPending(ProcessingStatus),
    AlreadyClaimed,
    ClaimFailed,
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SkipReason::NoSource => write!(f, "no source file"),
            SkipReason::NotPending(status) => write!(f, "status is {}", status),
            SkipReason::AlreadyClaimed => write!(f, "already claimed"),
            SkipReason::ClaimFailed => write!(f, "claim failed"),
        }
    }
}

/// Where processing of a saved record was routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Skipped(SkipReason),
    /// Runs in the saving task after commit.
    Local,
    /// Handed to the worker pool after commit.
    Queued,
}

#[derive(Clone)]
pub struct ProcessingCoordinator {
    executor: ProcessingExecutor,
    health: Option<Arc<dyn HealthCheck>>,
    dispatcher: Option<Arc<dyn TaskDispatcher>>,
}

impl ProcessingCoordinator {
    /// Coordinator without a worker pool: everything runs locally.
    pub fn new(executor: ProcessingExecutor) -> Self {
        Self {
            executor,
            health: None,
            dispatcher: None,
        }
    }

    /// Route work to `worker` whenever it reports healthy.
    pub fn with_worker<W>(mut self, worker: Arc<W>) -> Self
    where
        W: HealthCheck + TaskDispatcher + 'static,
    {
        self.health = Some(worker.clone());
        self.dispatcher = Some(worker);
        self
    }

    pub fn with_health_check(mut self, health: Arc<dyn HealthCheck>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn TaskDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn executor(&self) -> &ProcessingExecutor {
        &self.executor
    }

    fn repository(&self) -> &Arc<dyn MediaRepository> {
        self.executor.repository()
    }

    async fn worker_health(&self) -> WorkerHealth {
        match (&self.health, &self.dispatcher) {
            (Some(health), Some(_)) => health.probe().await,
            _ => WorkerHealth::Unavailable,
        }
    }

    /// React to a saved record.
    ///
    /// Invalid processor parameters surface as a configuration error and
    /// leave the record `pending`. Everything else is decided here and the
    /// actual work is registered on `uow`.
    #[tracing::instrument(skip(self, record, uow), fields(file_id = record.id, variant = %record.variant()))]
    pub async fn on_saved(
        &self,
        record: &MediaRecord,
        created: bool,
        uow: &mut UnitOfWork,
    ) -> ProcessingResult<Dispatch> {
        if !record.has_source() {
            return Ok(Dispatch::Skipped(SkipReason::NoSource));
        }
        if record.status != ProcessingStatus::Pending {
            return Ok(Dispatch::Skipped(SkipReason::NotPending(record.status)));
        }

        let params = record.processor_params();
        self.executor
            .registry()
            .validate_params(record.variant(), &params)?;

        match self
            .repository()
            .claim_for_processing(record.id, &record.storage_key)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Record already claimed by another save");
                return Ok(Dispatch::Skipped(SkipReason::AlreadyClaimed));
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to claim record for processing");
                return Ok(Dispatch::Skipped(SkipReason::ClaimFailed));
            }
        }

        let task = ProcessFileTask::new(record.id, record.storage_key.clone(), params);
        let executor = self.executor.clone();
        let health = self.worker_health().await;

        let dispatch = match &self.dispatcher {
            Some(dispatcher) if health.is_healthy() => {
                let dispatcher = dispatcher.clone();
                uow.on_commit(move || async move {
                    let file_id = task.file_id;
                    if let Err(e) = dispatcher.enqueue(task.clone()).await {
                        tracing::warn!(
                            file_id,
                            error = %e,
                            "Enqueue rejected, processing in-process"
                        );
                        executor.run(task).await;
                    }
                });
                Dispatch::Queued
            }
            _ => {
                uow.on_commit(move || async move {
                    executor.run(task).await;
                });
                Dispatch::Local
            }
        };

        tracing::info!(
            created,
            worker_health = %health,
            dispatch = ?dispatch,
            "Processing scheduled"
        );
        Ok(dispatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchError;
    use async_trait::async_trait;
    use mediafiles_core::{ImageAttributes, MediaKind, NewMediaRecord, ProcessorParams};
    use mediafiles_db::InMemoryMediaRepository;
    use mediafiles_processing::ProcessorRegistry;
    use mediafiles_storage::InMemoryStorage;
    use std::sync::Mutex;

    /// Worker double with a fixed health and an optional enqueue failure
    struct FakeWorker {
        health: WorkerHealth,
        reject: bool,
        tasks: Mutex<Vec<ProcessFileTask>>,
    }

    impl FakeWorker {
        fn new(health: WorkerHealth, reject: bool) -> Arc<Self> {
            Arc::new(Self {
                health,
                reject,
                tasks: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HealthCheck for FakeWorker {
        async fn probe(&self) -> WorkerHealth {
            self.health
        }
    }

    #[async_trait]
    impl TaskDispatcher for FakeWorker {
        async fn enqueue(&self, task: ProcessFileTask) -> Result<(), DispatchError> {
            if self.reject {
                return Err(DispatchError::QueueFull);
            }
            self.tasks.lock().unwrap().push(task);
            Ok(())
        }
    }

    struct Fixture {
        coordinator: ProcessingCoordinator,
        store: InMemoryStorage,
        repo: InMemoryMediaRepository,
    }

    fn fixture() -> Fixture {
        let store = InMemoryStorage::new();
        let repo = InMemoryMediaRepository::new();
        let executor = ProcessingExecutor::new(
            Arc::new(ProcessorRegistry::default()),
            Arc::new(store.clone()),
            Arc::new(repo.clone()),
        );
        Fixture {
            coordinator: ProcessingCoordinator::new(executor),
            store,
            repo,
        }
    }

    async fn text_record(fx: &Fixture) -> MediaRecord {
        fx.store.insert("file/a.txt", &b"hello"[..]).await.unwrap();
        fx.repo
            .insert(NewMediaRecord::new("file/a.txt", MediaKind::File))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn no_worker_runs_locally_after_commit() {
        let fx = fixture();
        let record = text_record(&fx).await;

        let mut uow = UnitOfWork::new();
        let dispatch = fx.coordinator.on_saved(&record, true, &mut uow).await.unwrap();
        assert_eq!(dispatch, Dispatch::Local);

        let claimed = fx.repo.get(record.id).await.unwrap().unwrap();
        assert_eq!(claimed.status, ProcessingStatus::Processing);

        uow.commit().await;
        let done = fx.repo.get(record.id).await.unwrap().unwrap();
        assert_eq!(done.status, ProcessingStatus::Success);
    }

    #[tokio::test]
    async fn healthy_worker_gets_the_task() {
        let fx = fixture();
        let worker = FakeWorker::new(WorkerHealth::Healthy, false);
        let coordinator = fx.coordinator.clone().with_worker(worker.clone());
        let record = text_record(&fx).await;

        let mut uow = UnitOfWork::new();
        assert_eq!(
            coordinator.on_saved(&record, true, &mut uow).await.unwrap(),
            Dispatch::Queued
        );
        // nothing is enqueued before commit
        assert!(worker.tasks.lock().unwrap().is_empty());

        uow.commit().await;
        let tasks = worker.tasks.lock().unwrap().clone();
        assert_eq!(
            tasks,
            vec![ProcessFileTask::new(
                record.id,
                "file/a.txt",
                ProcessorParams::File
            )]
        );
        let stored = fx.repo.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProcessingStatus::Processing);
    }

    #[tokio::test]
    async fn unhealthy_worker_falls_back_to_local() {
        let fx = fixture();
        let worker = FakeWorker::new(WorkerHealth::Unhealthy, false);
        let coordinator = fx.coordinator.clone().with_worker(worker.clone());
        let record = text_record(&fx).await;

        let mut uow = UnitOfWork::new();
        assert_eq!(
            coordinator.on_saved(&record, true, &mut uow).await.unwrap(),
            Dispatch::Local
        );
        uow.commit().await;
        assert!(worker.tasks.lock().unwrap().is_empty());
        assert_eq!(
            fx.repo.get(record.id).await.unwrap().unwrap().status,
            ProcessingStatus::Success
        );
    }

    #[tokio::test]
    async fn rejected_enqueue_runs_locally() {
        let fx = fixture();
        let worker = FakeWorker::new(WorkerHealth::Healthy, true);
        let coordinator = fx.coordinator.clone().with_worker(worker);
        let record = text_record(&fx).await;

        let mut uow = UnitOfWork::new();
        assert_eq!(
            coordinator.on_saved(&record, true, &mut uow).await.unwrap(),
            Dispatch::Queued
        );
        uow.commit().await;
        assert_eq!(
            fx.repo.get(record.id).await.unwrap().unwrap().status,
            ProcessingStatus::Success
        );
    }

    #[tokio::test]
    async fn guards_skip_without_claiming() {
        let fx = fixture();
        let record = text_record(&fx).await;

        let mut empty = record.clone();
        empty.storage_key.clear();
        let mut uow = UnitOfWork::new();
        assert_eq!(
            fx.coordinator.on_saved(&empty, false, &mut uow).await.unwrap(),
            Dispatch::Skipped(SkipReason::NoSource)
        );

        let mut done = record.clone();
        done.status = ProcessingStatus::Success;
        assert_eq!(
            fx.coordinator.on_saved(&done, false, &mut uow).await.unwrap(),
            Dispatch::Skipped(SkipReason::NotPending(ProcessingStatus::Success))
        );
        assert_eq!(uow.pending(), 0);
        assert_eq!(
            fx.repo.get(record.id).await.unwrap().unwrap().status,
            ProcessingStatus::Pending
        );
    }

    #[tokio::test]
    async fn second_save_does_not_claim_twice() {
        let fx = fixture();
        let record = text_record(&fx).await;

        let mut uow = UnitOfWork::new();
        fx.coordinator.on_saved(&record, true, &mut uow).await.unwrap();
        // stale snapshot still says pending
        assert_eq!(
            fx.coordinator.on_saved(&record, false, &mut uow).await.unwrap(),
            Dispatch::Skipped(SkipReason::AlreadyClaimed)
        );
        assert_eq!(uow.pending(), 1);
    }

    #[tokio::test]
    async fn invalid_params_surface_and_leave_pending() {
        let fx = fixture();
        fx.store.insert("imagefile/a.png", &b"x"[..]).await.unwrap();
        let record = fx
            .repo
            .insert(NewMediaRecord::new(
                "imagefile/a.png",
                MediaKind::Image(ImageAttributes {
                    compression_quality: 0,
                    ..ImageAttributes::default()
                }),
            ))
            .await
            .unwrap();

        let mut uow = UnitOfWork::new();
        let err = fx
            .coordinator
            .on_saved(&record, true, &mut uow)
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(uow.pending(), 0);
        assert_eq!(
            fx.repo.get(record.id).await.unwrap().unwrap().status,
            ProcessingStatus::Pending
        );
    }
}
