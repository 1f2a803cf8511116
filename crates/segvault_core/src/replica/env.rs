//! The environment replicas are created in.

use super::BackupReplica;
use crate::config::BackupConfig;
use crate::error::{ReplicaError, ReplicaResult};
use crate::types::ServerId;
use crate::worker::{WorkerHandle, WorkerPool};
use segvault_storage::{FrameStorage, InMemoryStorage};
use std::sync::Arc;

/// Storage and worker pools shared by the replicas of one backup.
///
/// Dropping the environment finishes queued jobs and stops the workers.
/// Replicas that outlive it run their storage jobs on the calling thread.
pub struct ReplicaEnv {
    config: BackupConfig,
    storage: Arc<dyn FrameStorage>,
    io: WorkerPool,
    recovery: WorkerPool,
}

impl std::fmt::Debug for ReplicaEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaEnv")
            .field("config", &self.config)
            .field("frame_size", &self.storage.frame_size())
            .field("io", &self.io)
            .field("recovery", &self.recovery)
            .finish()
    }
}

impl ReplicaEnv {
    /// Creates an environment over `storage`.
    ///
    /// # Errors
    ///
    /// Returns an error if segments do not fit in the storage frames or a
    /// worker thread cannot be started.
    pub fn new(config: BackupConfig, storage: Arc<dyn FrameStorage>) -> ReplicaResult<Self> {
        if config.segment_size == 0 {
            return Err(ReplicaError::InvalidConfig {
                message: "segment size must be non-zero".to_string(),
            });
        }
        if u32::try_from(config.segment_size).is_err() {
            return Err(ReplicaError::InvalidConfig {
                message: format!("segment size {} exceeds 4 GiB", config.segment_size),
            });
        }
        if config.segment_size > storage.frame_size() {
            return Err(ReplicaError::InvalidConfig {
                message: format!(
                    "segment size {} exceeds the storage frame size {}",
                    config.segment_size,
                    storage.frame_size()
                ),
            });
        }

        let io = WorkerPool::new("segvault-io", config.io_threads)?;
        let recovery = WorkerPool::new("segvault-recovery", config.recovery_threads)?;
        Ok(Self {
            config,
            storage,
            io,
            recovery,
        })
    }

    /// Creates an environment over fresh in-memory storage sized by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread cannot be started.
    pub fn in_memory(config: BackupConfig) -> ReplicaResult<Self> {
        let storage = Arc::new(InMemoryStorage::new(config.segment_size, config.frame_count));
        Self::new(config, storage)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Returns the storage replicas allocate frames from.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn FrameStorage> {
        &self.storage
    }

    pub(crate) fn io(&self) -> WorkerHandle {
        self.io.handle()
    }

    pub(crate) fn recovery(&self) -> WorkerHandle {
        self.recovery.handle()
    }

    /// Creates an unopened replica of segment `segment_id` of `master_id`'s log.
    #[must_use]
    pub fn replica(&self, master_id: ServerId, segment_id: u64, primary: bool) -> BackupReplica {
        BackupReplica::new(self, master_id, segment_id, primary)
    }

    /// Creates a replica and opens it, waiting for the initial store if the
    /// configuration asks for it.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicaError::ResourceExhausted`] if storage has no free frame.
    pub fn open_replica(
        &self,
        master_id: ServerId,
        segment_id: u64,
        primary: bool,
    ) -> ReplicaResult<BackupReplica> {
        let replica = self.replica(master_id, segment_id, primary);
        replica.open(self.config.sync_open)?;
        Ok(replica)
    }

    /// Blocks until both pools are idle.
    pub fn drain(&self) {
        // Builds queue loads, so the I/O pool is drained last.
        self.recovery.handle().drain();
        self.io.handle().drain();
    }
}
