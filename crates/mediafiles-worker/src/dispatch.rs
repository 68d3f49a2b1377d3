//! Contract between the coordinator and a background worker pool

use async_trait::async_trait;
use mediafiles_core::constants::FILE_PROCESSING_TASK;
use mediafiles_core::ProcessorParams;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use thiserror::Error;

/// Payload of one background processing job.
///
/// Identifies one claim: the record id plus the storage key that was
/// claimed, with the processor parameters by value. The record itself is
/// re-read by whoever executes the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessFileTask {
    pub file_id: i64,
    pub storage_key: String,
    pub params: ProcessorParams,
}

impl ProcessFileTask {
    pub const NAME: &'static str = FILE_PROCESSING_TASK;

    pub fn new(file_id: i64, storage_key: impl Into<String>, params: ProcessorParams) -> Self {
        Self {
            file_id,
            storage_key: storage_key.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerHealth {
    Healthy,
    /// Reachable but not accepting work right now.
    Unhealthy,
    Unavailable,
}

impl WorkerHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, WorkerHealth::Healthy)
    }
}

impl Display for WorkerHealth {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            WorkerHealth::Healthy => write!(f, "healthy"),
            WorkerHealth::Unhealthy => write!(f, "unhealthy"),
            WorkerHealth::Unavailable => write!(f, "unavailable"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Worker queue is full")]
    QueueFull,

    #[error("Worker pool is shut down")]
    ShutDown,
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn probe(&self) -> WorkerHealth;
}

#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn enqueue(&self, task: ProcessFileTask) -> Result<(), DispatchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_payload_is_plain_json() {
        let task = ProcessFileTask::new(
            7,
            "imagefile/a.png",
            ProcessorParams::Image {
                max_size: Some(1024),
                quality: 80,
                thumbnail_size: vec![300, 300],
            },
        );
        let payload = serde_json::to_value(&task).unwrap();
        assert_eq!(payload["file_id"], 7);
        assert_eq!(payload["storage_key"], "imagefile/a.png");
        assert_eq!(payload["params"]["processor"], "image");
        assert_eq!(ProcessFileTask::NAME, "mediafiles.file-processing");

        let decoded: ProcessFileTask = serde_json::from_value(payload).unwrap();
        assert_eq!(decoded, task);
    }
}
