//! Replica environments for tests.
//!
//! Provides convenience constructors for environments over in-memory,
//! gated and file-backed storage, and shortcuts for bringing a replica to
//! a given state.

use crate::gated::GatedStorage;
use crate::segments::SegmentFixture;
use segvault_core::{BackupConfig, BackupReplica, PartitionList, ReplicaEnv, ServerId};
use segvault_storage::{FileStorage, FrameStorage};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Segment size used by test environments.
pub const TEST_SEGMENT_SIZE: usize = 64 * 1024;

/// Master that owns every test replica.
pub const TEST_MASTER: ServerId = ServerId::new(99, 0);

/// A replica environment with automatic cleanup.
pub struct TestEnv {
    /// The environment.
    pub env: ReplicaEnv,
    gated: Option<Arc<GatedStorage>>,
    _temp_dir: Option<TempDir>,
}

impl TestEnv {
    /// Creates an environment whose jobs run on the calling thread.
    pub fn inline(frame_count: usize) -> Self {
        Self::in_memory(
            BackupConfig::inline()
                .segment_size(TEST_SEGMENT_SIZE)
                .frame_count(frame_count),
        )
    }

    /// Creates an environment with background workers.
    pub fn threaded(frame_count: usize) -> Self {
        Self::in_memory(
            BackupConfig::new()
                .segment_size(TEST_SEGMENT_SIZE)
                .frame_count(frame_count),
        )
    }

    /// Creates an environment over fresh in-memory storage.
    pub fn in_memory(config: BackupConfig) -> Self {
        Self {
            env: ReplicaEnv::in_memory(config).expect("Failed to create environment"),
            gated: None,
            _temp_dir: None,
        }
    }

    /// Creates an environment with background workers over [`GatedStorage`].
    pub fn gated(frame_count: usize) -> Self {
        let storage = Arc::new(GatedStorage::new(TEST_SEGMENT_SIZE, frame_count));
        let config = BackupConfig::new()
            .segment_size(TEST_SEGMENT_SIZE)
            .frame_count(frame_count);
        let shared: Arc<dyn FrameStorage> = storage.clone();
        Self {
            env: ReplicaEnv::new(config, shared).expect("Failed to create environment"),
            gated: Some(storage),
            _temp_dir: None,
        }
    }

    /// Creates an environment with background workers over a frame file in
    /// a temporary directory.
    pub fn file(frame_count: usize) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage = FileStorage::open_with_create_dirs(
            &temp_dir.path().join("frames").join("replicas.dat"),
            TEST_SEGMENT_SIZE,
            frame_count,
        )
        .expect("Failed to create frame file");
        let config = BackupConfig::new()
            .segment_size(TEST_SEGMENT_SIZE)
            .frame_count(frame_count);
        Self {
            env: ReplicaEnv::new(config, Arc::new(storage)).expect("Failed to create environment"),
            gated: None,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the gated storage of an environment made by [`TestEnv::gated`].
    pub fn gate(&self) -> &GatedStorage {
        self.gated
            .as_deref()
            .expect("environment was not created with TestEnv::gated")
    }

    /// Returns the directory holding the frame file, if file-backed.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().join("frames"))
    }

    /// Opens a replica of `segment_id` and waits for its first store.
    pub fn open(&self, segment_id: u64) -> BackupReplica {
        let replica = self.env.replica(TEST_MASTER, segment_id, true);
        replica.open(true).expect("Failed to open replica");
        replica
    }

    /// Opens a replica, writes `segment` into it with its certificate,
    /// closes it and waits for the close to be stored.
    pub fn closed_replica(&self, segment_id: u64, segment: &SegmentFixture) -> BackupReplica {
        let replica = self.open(segment_id);
        replica
            .write(segment.bytes(), 0, Some(segment.sealed()), false)
            .expect("Failed to write replica");
        replica.close().expect("Failed to close replica");
        replica.wait_for_ongoing_ops();
        replica
    }

    /// Like [`TestEnv::closed_replica`], then starts recovery.
    pub fn recovering_replica(
        &self,
        segment_id: u64,
        segment: &SegmentFixture,
        partitions: Option<PartitionList>,
    ) -> BackupReplica {
        let replica = self.closed_replica(segment_id, segment);
        replica
            .set_recovering(partitions)
            .expect("Failed to start recovery");
        replica
    }
}

impl std::ops::Deref for TestEnv {
    type Target = ReplicaEnv;

    fn deref(&self) -> &Self::Target {
        &self.env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use segvault_core::ReplicaState;

    #[test]
    fn closed_replica_is_stored() {
        let env = TestEnv::inline(1);
        let segment = SegmentFixture::new(99, 88).object(123, "10");
        let replica = env.closed_replica(88, &segment);
        assert_eq!(replica.state(), ReplicaState::Closed);
        assert!(!replica.in_memory());
    }

    #[test]
    fn file_env_creates_frame_file() {
        let env = TestEnv::file(2);
        let path = env.path().unwrap();
        assert!(path.join("replicas.dat").exists());
        assert_eq!(env.storage().free_frames(), 2);
    }
}
