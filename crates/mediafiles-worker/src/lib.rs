//! Mediafiles Worker Library
//!
//! Post-save coordination: decides whether a saved media record needs
//! processing and runs it either in the saving task or on the in-process
//! worker pool once the unit of work commits.

pub mod coordinator;
pub mod dispatch;
pub mod executor;
pub mod pool;
pub mod service;
pub mod unit_of_work;

pub use coordinator::{Dispatch, ProcessingCoordinator, SkipReason};
pub use dispatch::{DispatchError, HealthCheck, ProcessFileTask, TaskDispatcher, WorkerHealth};
pub use executor::{ProcessingExecutor, ProcessingOutcome};
pub use pool::{WorkerPool, WorkerPoolConfig};
pub use service::{MediaService, NewMedia, ServiceError, ServiceResult};
pub use unit_of_work::UnitOfWork;
