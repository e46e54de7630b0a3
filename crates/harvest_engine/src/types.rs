use std::sync::mpsc;

use harvest_core::{ProgressSnapshot, RunSummary};
use thiserror::Error;

use crate::allocator::SetupError;
use crate::persist::PersistError;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub enum HarvestEvent {
    Started {
        seed: Option<String>,
        start_index: Option<u64>,
        target: u64,
        attempt_ceiling: u64,
        workers: usize,
    },
    /// A new unique record; `seq` is its 1-based position in completion order.
    RecordAccepted {
        seq: u64,
        code: String,
        identity: String,
    },
    Progress(ProgressSnapshot),
    Finished(RunSummary),
}

/// Receives engine events. Implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: HarvestEvent);
}

pub struct ChannelProgressSink {
    tx: mpsc::Sender<HarvestEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::Sender<HarvestEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: HarvestEvent) {
        let _ = self.tx.send(event);
    }
}

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("setup failed: {0}")]
    Setup(#[from] SetupError),
    #[error("failed to persist progress: {0}")]
    Persist(#[from] PersistError),
    #[error("failed to persist results: {0}")]
    Store(#[from] StoreError),
    #[error("invalid engine configuration: {0}")]
    Config(String),
    #[error("worker task failed: {0}")]
    WorkerTask(String),
}
