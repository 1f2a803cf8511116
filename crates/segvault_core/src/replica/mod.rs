//! Backup replicas.
//!
//! A [`BackupReplica`] is a backup's copy of one segment of one master's
//! log. It moves through a fixed lifecycle:
//!
//! 1. `open` claims a storage frame and a zeroed in-memory buffer.
//! 2. `write` copies master data into the buffer, optionally storing it.
//! 3. `close` seals the segment with a footer and stores it. Once stored,
//!    the buffer is released.
//! 4. `set_recovering` starts crash recovery. The replica is split into
//!    one recovery segment per partition, either right away (eager) or when
//!    `build_recovery_segments` is called (deferred).
//! 5. `free` returns the frame to storage.
//!
//! Storage writes and loads run on the environment's I/O workers. Only
//! `free`, a forced close-out on drop and recovery builds block on them.

mod env;
mod shared;

pub use env::ReplicaEnv;

use crate::error::{ReplicaError, ReplicaResult};
use crate::partition::PartitionList;
use crate::recovery::RecoveryOutcome;
use crate::types::{ReplicaId, ReplicaState, ServerId};
use bytes::BytesMut;
use parking_lot::{Condvar, Mutex};
use segvault_codec::{encode_header, encoded_len, Certificate, EntryType, CERTIFICATE_SIZE};
use shared::{ReplicaCore, ReplicaInner};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Encoded size of a segment footer entry.
pub const FOOTER_LEN: usize = encoded_len(CERTIFICATE_SIZE as u32);

/// Result of asking for a recovery segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum ReadStatus {
    /// The segment was appended; it is covered by this certificate.
    Ready(Certificate),
    /// Recovery segments are not built yet. Ask again later.
    Retry,
}

impl ReadStatus {
    /// Returns true if the caller should ask again.
    #[must_use]
    pub const fn is_retry(&self) -> bool {
        matches!(self, Self::Retry)
    }

    /// Returns the certificate of a ready segment.
    #[must_use]
    pub const fn certificate(&self) -> Option<Certificate> {
        match self {
            Self::Ready(certificate) => Some(*certificate),
            Self::Retry => None,
        }
    }
}

/// A backup's replica of one log segment.
///
/// All methods take `&self`; the replica can be shared across threads.
pub struct BackupReplica {
    core: Arc<ReplicaCore>,
}

impl std::fmt::Debug for BackupReplica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupReplica")
            .field("id", &self.core.id)
            .field("state", &self.state())
            .finish()
    }
}

impl BackupReplica {
    /// Creates an unopened replica.
    ///
    /// Its capacity is the environment's segment size.
    #[must_use]
    pub fn new(env: &ReplicaEnv, master_id: ServerId, segment_id: u64, primary: bool) -> Self {
        Self {
            core: Arc::new(ReplicaCore {
                id: ReplicaId::new(master_id, segment_id),
                capacity: env.config().segment_size,
                primary,
                storage: Arc::clone(env.storage()),
                io: env.io(),
                recovery: env.recovery(),
                inner: Mutex::new(ReplicaInner::default()),
                changed: Condvar::new(),
            }),
        }
    }

    /// Returns the replica's identity.
    #[must_use]
    pub fn id(&self) -> ReplicaId {
        self.core.id
    }

    /// Returns true if this is the master's primary replica.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.core.primary
    }

    /// Returns the segment capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.core.capacity
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> ReplicaState {
        self.core.inner.lock().state
    }

    /// Returns true if the replica's content is in memory.
    #[must_use]
    pub fn in_memory(&self) -> bool {
        self.core.inner.lock().buffer.is_some()
    }

    /// Returns the index of the storage frame, if one is held.
    #[must_use]
    pub fn frame_index(&self) -> Option<usize> {
        self.core.inner.lock().frame.as_ref().map(|frame| frame.index())
    }

    /// Returns the number of storage jobs not yet finished.
    #[must_use]
    pub fn pending_ops(&self) -> usize {
        self.core.inner.lock().pending_ops
    }

    /// Blocks until every scheduled storage job has finished.
    pub fn wait_for_ongoing_ops(&self) {
        let mut inner = self.core.inner.lock();
        self.core.wait_for_ongoing_ops(&mut inner);
    }

    /// Returns the number of recovery segments, once built.
    #[must_use]
    pub fn recovery_partition_count(&self) -> Option<usize> {
        match &self.core.inner.lock().outcome {
            RecoveryOutcome::Built(segments) => Some(segments.len()),
            RecoveryOutcome::NotBuilt | RecoveryOutcome::Poisoned(_) => None,
        }
    }

    /// Returns true if building recovery segments failed.
    #[must_use]
    pub fn is_recovery_poisoned(&self) -> bool {
        matches!(
            self.core.inner.lock().outcome,
            RecoveryOutcome::Poisoned(_)
        )
    }

    /// Returns true if recovery segments are built without being asked.
    #[must_use]
    pub fn is_eager_recovery(&self) -> bool {
        self.core.inner.lock().eager
    }

    /// Claims a storage frame and a zeroed buffer, and starts storing the
    /// empty segment.
    ///
    /// The frame is always claimed before this returns. With `synchronous`
    /// the initial store has finished too.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicaError::WrongState`] unless the replica is unopened
    /// and [`ReplicaError::ResourceExhausted`] if storage has no free
    /// frame. The replica stays unopened on error.
    pub fn open(&self, synchronous: bool) -> ReplicaResult<()> {
        let core = &self.core;
        let mut inner = core.inner.lock();
        core.expect_state(&inner, ReplicaState::Uninit, "open")?;

        let frame = core.storage.allocate().map_err(|source| {
            warn!("No storage frame for replica {}: {source}", core.id);
            ReplicaError::ResourceExhausted {
                replica: core.id,
                source,
            }
        })?;
        let frame_index = frame.index();
        inner.frame = Some(Arc::new(frame));
        inner.buffer = Some(Arc::new(vec![0u8; core.capacity]));
        inner.state = ReplicaState::Open;
        let job = core.persist_job(&mut inner);
        drop(inner);

        info!("Opened replica {} in frame {frame_index}", core.id);
        if let Some(job) = job {
            core.io.submit(job);
        }
        if synchronous {
            self.wait_for_ongoing_ops();
        }
        Ok(())
    }

    /// Copies `src` into the segment at `dest_offset`.
    ///
    /// A `certificate` given as `(footer_offset, certificate)` replaces the
    /// previous one; `close` seals it into a footer at `footer_offset`. With
    /// `atomic` the whole segment is stored in the background, after any
    /// store already running. Never waits for storage.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicaError::WrongState`] unless the replica is open and
    /// [`ReplicaError::InvalidArgument`] if the data or footer would not
    /// fit in the segment.
    pub fn write(
        &self,
        src: &[u8],
        dest_offset: usize,
        certificate: Option<(u32, Certificate)>,
        atomic: bool,
    ) -> ReplicaResult<()> {
        let core = &self.core;
        let mut inner = core.inner.lock();
        core.expect_state(&inner, ReplicaState::Open, "write")?;

        let end = dest_offset
            .checked_add(src.len())
            .filter(|end| *end <= core.capacity)
            .ok_or_else(|| {
                core.invalid_argument(format!(
                    "write of {} bytes at offset {dest_offset} overruns a {} byte segment",
                    src.len(),
                    core.capacity
                ))
            })?;
        if let Some((footer_offset, _)) = certificate {
            if footer_offset as usize + FOOTER_LEN > core.capacity {
                return Err(core.invalid_argument(format!(
                    "footer at offset {footer_offset} overruns a {} byte segment",
                    core.capacity
                )));
            }
        }

        let Some(buffer) = inner.buffer.as_mut() else {
            return Err(core.wrong_state(ReplicaState::Open, "write"));
        };
        Arc::make_mut(buffer)[dest_offset..end].copy_from_slice(src);
        if certificate.is_some() {
            inner.certificate = certificate;
        }
        let job = if atomic {
            core.persist_job(&mut inner)
        } else {
            None
        };
        drop(inner);

        if let Some(job) = job {
            core.io.submit(job);
        }
        Ok(())
    }

    /// Seals the segment and starts storing it.
    ///
    /// A footer carrying the last certificate is written at the offset
    /// given with it; without a certificate no footer is written. Never
    /// waits for storage; the buffer is released once the store finishes.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicaError::WrongState`] unless the replica is open.
    pub fn close(&self) -> ReplicaResult<()> {
        let core = &self.core;
        let mut inner = core.inner.lock();
        core.expect_state(&inner, ReplicaState::Open, "close")?;

        if let Some((footer_offset, certificate)) = inner.certificate {
            let mut footer = Vec::with_capacity(FOOTER_LEN);
            encode_header(EntryType::SegmentFooter, CERTIFICATE_SIZE as u32, &mut footer);
            footer.extend_from_slice(&certificate.to_bytes());

            let start = footer_offset as usize;
            let Some(buffer) = inner.buffer.as_mut() else {
                return Err(core.wrong_state(ReplicaState::Open, "close"));
            };
            let Some(slot) = Arc::make_mut(buffer).get_mut(start..start + footer.len()) else {
                return Err(core.invalid_argument(format!(
                    "footer at offset {start} overruns a {} byte segment",
                    core.capacity
                )));
            };
            slot.copy_from_slice(&footer);
        }
        inner.state = ReplicaState::Closed;
        let job = core.persist_job(&mut inner);
        drop(inner);

        info!("Closed replica {}", core.id);
        if let Some(job) = job {
            core.io.submit(job);
        }
        Ok(())
    }

    /// Starts loading the replica's content into memory.
    ///
    /// Does nothing if the content is resident, a load is already running,
    /// or the replica holds no frame.
    pub fn start_loading(&self) {
        let core = &self.core;
        let job = core.load_job(&mut core.inner.lock());
        if let Some(job) = job {
            debug!("Loading replica {}", core.id);
            core.io.submit(job);
        }
    }

    /// Starts recovery.
    ///
    /// With `partitions` the replica loads its content and builds its
    /// recovery segments in the background. Without, building waits for
    /// [`BackupReplica::build_recovery_segments`].
    ///
    /// # Errors
    ///
    /// Returns [`ReplicaError::WrongState`] unless the replica is closed.
    pub fn set_recovering(&self, partitions: Option<PartitionList>) -> ReplicaResult<()> {
        let core = &self.core;
        let mut inner = core.inner.lock();
        core.expect_state(&inner, ReplicaState::Closed, "start recovery of")?;
        inner.state = ReplicaState::Recovering;
        inner.eager = partitions.is_some();
        let load = if partitions.is_some() {
            core.load_job(&mut inner)
        } else {
            None
        };
        drop(inner);

        info!(
            "Replica {} recovering ({})",
            core.id,
            if partitions.is_some() { "eager" } else { "deferred" }
        );
        if let Some(job) = load {
            core.io.submit(job);
        }
        if let Some(partitions) = partitions {
            let build_core = Arc::clone(core);
            core.recovery.submit(move || {
                if let Err(err) = build_core.build(&partitions) {
                    debug!("Recovery build for {} abandoned: {err}", build_core.id);
                }
            });
        }
        Ok(())
    }

    /// Splits the replica into one recovery segment per partition.
    ///
    /// Blocks until the content is in memory, loading it if needed. Runs
    /// at most once: later calls, with any partition list, log and return.
    /// Content that fails to decode poisons recovery rather than failing
    /// this call; reads then report [`ReplicaError::RecoveryFailed`].
    ///
    /// # Errors
    ///
    /// Returns [`ReplicaError::WrongState`] unless the replica is recovering.
    pub fn build_recovery_segments(&self, partitions: &PartitionList) -> ReplicaResult<()> {
        self.core.build(partitions)
    }

    /// Appends recovery segment `partition` to `dest`.
    ///
    /// Each call appends a full copy.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicaError::WrongState`] unless the replica is recovering,
    /// [`ReplicaError::RecoveryFailed`] if the build failed, and
    /// [`ReplicaError::PartitionOutOfBounds`] for an index past the number
    /// of partitions.
    pub fn append_recovery_segment(
        &self,
        partition: usize,
        dest: &mut BytesMut,
    ) -> ReplicaResult<ReadStatus> {
        let core = &self.core;
        let inner = core.inner.lock();
        if inner.state != ReplicaState::Recovering {
            warn!("Asked for segment {} which isn't recovering", core.id);
            return Err(core.wrong_state(inner.state, "read recovery segment from"));
        }
        let segment = match &inner.outcome {
            RecoveryOutcome::NotBuilt => return Ok(ReadStatus::Retry),
            RecoveryOutcome::Poisoned(reason) => {
                return Err(ReplicaError::RecoveryFailed {
                    replica: core.id,
                    reason: reason.clone(),
                })
            }
            RecoveryOutcome::Built(segments) => match segments.get(partition) {
                Some(segment) => segment.clone(),
                None => {
                    warn!(
                        "Asked for recovery segment {partition} from segment {} but there \
                         are only {} partitions",
                        core.id,
                        segments.len()
                    );
                    return Err(ReplicaError::PartitionOutOfBounds {
                        replica: core.id,
                        requested: partition,
                        available: segments.len(),
                    });
                }
            },
        };
        drop(inner);

        dest.extend_from_slice(segment.bytes());
        Ok(ReadStatus::Ready(segment.certificate()))
    }

    /// Returns the frame to storage.
    ///
    /// Waits for storage jobs in flight. A recovery build in flight is not
    /// waited for; its result is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicaError::WrongState`] if the replica holds no frame
    /// and [`ReplicaError::Storage`] if storage rejects the frame.
    pub fn free(&self) -> ReplicaResult<()> {
        let core = &self.core;
        let mut inner = core.inner.lock();
        if !inner.state.holds_frame() {
            return Err(core.wrong_state(inner.state, "free"));
        }
        core.wait_for_ongoing_ops(&mut inner);
        if !inner.state.holds_frame() {
            return Err(core.wrong_state(inner.state, "free"));
        }

        inner.state = ReplicaState::Freed;
        inner.outcome = RecoveryOutcome::NotBuilt;
        inner.buffer = None;
        let frame = inner.frame.take();
        core.changed.notify_all();
        drop(inner);

        info!("Freed replica {}", core.id);
        if let Some(frame) = frame {
            match Arc::try_unwrap(frame) {
                Ok(frame) => core.storage.free(frame)?,
                Err(_) => error!("Frame of replica {} is still in use; not returned", core.id),
            }
        }
        Ok(())
    }
}

impl Drop for BackupReplica {
    fn drop(&mut self) {
        match self.state() {
            ReplicaState::Open => {
                warn!(
                    "Backup shutting down with open segment {}, closing out to storage",
                    self.core.id
                );
                if let Err(err) = self.close() {
                    error!("Failed to close out replica {}: {err}", self.core.id);
                }
                self.wait_for_ongoing_ops();
                if let Err(err) = self.free() {
                    error!("Failed to free replica {}: {err}", self.core.id);
                }
            }
            ReplicaState::Closed | ReplicaState::Recovering => {
                if let Err(err) = self.free() {
                    error!("Failed to free replica {}: {err}", self.core.id);
                }
            }
            ReplicaState::Uninit | ReplicaState::Freed => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackupConfig;
    use segvault_codec::{Object, Segment, SegmentHeader};

    const SEGMENT_SIZE: usize = 64 * 1024;

    fn env() -> ReplicaEnv {
        ReplicaEnv::in_memory(
            BackupConfig::inline()
                .segment_size(SEGMENT_SIZE)
                .frame_count(2),
        )
        .unwrap()
    }

    fn sealed_segment() -> (Vec<u8>, Certificate) {
        let mut segment = Segment::new();
        segment
            .append(
                EntryType::SegmentHeader,
                &SegmentHeader::new(99, 88, SEGMENT_SIZE as u32).encode(),
            )
            .unwrap();
        segment
            .append(EntryType::Object, &Object::new(123, "10", "").encode().unwrap())
            .unwrap();
        let certificate = segment.certificate();
        (segment.as_bytes().to_vec(), certificate)
    }

    #[test]
    fn open_claims_frame_and_zeroed_buffer() {
        let env = env();
        let replica = env.replica(ServerId::new(99, 0), 88, true);
        replica.open(true).unwrap();

        assert_eq!(replica.state(), ReplicaState::Open);
        assert!(replica.in_memory());
        assert_eq!(replica.frame_index(), Some(0));
        assert_eq!(env.storage().free_frames(), 1);
        assert_eq!(replica.core.inner.lock().buffer.as_ref().unwrap()[0], 0);
    }

    #[test]
    fn open_twice_is_wrong_state() {
        let env = env();
        let replica = env.replica(ServerId::new(99, 0), 88, true);
        replica.open(false).unwrap();
        assert!(matches!(
            replica.open(false),
            Err(ReplicaError::WrongState {
                state: ReplicaState::Open,
                operation: "open",
                ..
            })
        ));
    }

    #[test]
    fn write_out_of_range_is_invalid() {
        let env = env();
        let replica = env.replica(ServerId::new(99, 0), 88, true);
        replica.open(false).unwrap();

        let result = replica.write(b"abc", SEGMENT_SIZE - 2, None, false);
        assert!(matches!(result, Err(ReplicaError::InvalidArgument { .. })));

        let footer_past_end = Some((SEGMENT_SIZE as u32 - 4, Certificate::default()));
        let result = replica.write(b"abc", 0, footer_past_end, false);
        assert!(matches!(result, Err(ReplicaError::InvalidArgument { .. })));
        assert!(replica.core.inner.lock().certificate.is_none());
    }

    #[test]
    fn write_records_latest_certificate() {
        let env = env();
        let replica = env.replica(ServerId::new(99, 0), 88, true);
        replica.open(false).unwrap();

        let first = Certificate::new(1, 1);
        let second = Certificate::new(2, 2);
        replica.write(b"a", 0, Some((1, first)), false).unwrap();
        replica.write(b"b", 1, Some((2, second)), false).unwrap();
        replica.write(b"c", 2, None, true).unwrap();

        assert_eq!(replica.core.inner.lock().certificate, Some((2, second)));
    }

    #[test]
    fn close_seals_footer_and_releases_buffer() {
        let env = env();
        let replica = env.replica(ServerId::new(99, 0), 88, true);
        replica.open(false).unwrap();
        let (bytes, certificate) = sealed_segment();
        replica
            .write(&bytes, 0, Some((certificate.segment_length, certificate)), false)
            .unwrap();
        replica.close().unwrap();
        replica.wait_for_ongoing_ops();

        assert_eq!(replica.state(), ReplicaState::Closed);
        assert!(!replica.in_memory());
        let footer = segvault_codec::find_footer(&replica_frame(&env, &replica)).unwrap();
        assert_eq!(footer.unwrap().certificate, certificate);
    }

    fn replica_frame(env: &ReplicaEnv, replica: &BackupReplica) -> Vec<u8> {
        let frame = replica.core.inner.lock().frame.clone().unwrap();
        env.storage().load(&frame).unwrap()
    }

    #[test]
    fn set_recovering_requires_closed() {
        let env = env();
        let replica = env.replica(ServerId::new(99, 0), 88, true);
        replica.open(false).unwrap();
        assert!(matches!(
            replica.set_recovering(None),
            Err(ReplicaError::WrongState {
                state: ReplicaState::Open,
                ..
            })
        ));
        assert_eq!(replica.state(), ReplicaState::Open);
    }

    #[test]
    fn build_and_read() {
        let env = env();
        let replica = env.replica(ServerId::new(99, 0), 88, true);
        replica.open(false).unwrap();
        let (bytes, certificate) = sealed_segment();
        replica
            .write(&bytes, 0, Some((certificate.segment_length, certificate)), false)
            .unwrap();
        replica.close().unwrap();
        replica.set_recovering(None).unwrap();

        let mut dest = BytesMut::new();
        assert_eq!(
            replica.append_recovery_segment(0, &mut dest).unwrap(),
            ReadStatus::Retry
        );

        let hash = segvault_codec::key_hash(123, b"10");
        let list = PartitionList::from_tablets(vec![crate::TabletDescriptor::new(
            123, hash, hash, 0,
        )]);
        replica.build_recovery_segments(&list).unwrap();
        assert_eq!(replica.recovery_partition_count(), Some(1));

        let status = replica.append_recovery_segment(0, &mut dest).unwrap();
        assert_eq!(status.certificate().unwrap().segment_length, 30);
        assert_eq!(dest.len(), 30);
        assert!(!replica.is_eager_recovery());
    }

    #[test]
    fn free_returns_frame() {
        let env = env();
        let replica = env.replica(ServerId::new(99, 0), 88, true);
        replica.open(false).unwrap();
        replica.close().unwrap();
        replica.free().unwrap();

        assert_eq!(replica.state(), ReplicaState::Freed);
        assert_eq!(replica.frame_index(), None);
        assert_eq!(env.storage().free_frames(), 2);
        assert!(matches!(
            replica.free(),
            Err(ReplicaError::WrongState {
                state: ReplicaState::Freed,
                ..
            })
        ));
    }

    #[test]
    fn drop_frees_closed_replica() {
        let env = env();
        {
            let replica = env.replica(ServerId::new(99, 0), 88, true);
            replica.open(false).unwrap();
            replica.close().unwrap();
        }
        assert_eq!(env.storage().free_frames(), 2);
    }

    #[test]
    fn read_status_helpers() {
        assert!(ReadStatus::Retry.is_retry());
        assert_eq!(ReadStatus::Retry.certificate(), None);
        let certificate = Certificate::new(30, 1);
        assert_eq!(ReadStatus::Ready(certificate).certificate(), Some(certificate));
    }
}
