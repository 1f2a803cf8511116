//! State shared between a replica and its background jobs.

use crate::error::{ReplicaError, ReplicaResult};
use crate::partition::PartitionList;
use crate::recovery::{partition_segment, RecoveryOutcome, RecoverySegment};
use crate::types::{ReplicaId, ReplicaState};
use crate::worker::{Job, WorkerHandle};
use parking_lot::{Condvar, Mutex, MutexGuard};
use segvault_codec::Certificate;
use segvault_storage::{Frame, FrameStorage};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Everything the replica lock guards.
#[derive(Debug, Default)]
pub(crate) struct ReplicaInner {
    pub(crate) state: ReplicaState,
    /// Resident content. Jobs hold clones while they run.
    pub(crate) buffer: Option<Arc<Vec<u8>>>,
    /// Jobs hold clones while they run and drop them before reporting back.
    pub(crate) frame: Option<Arc<Frame>>,
    /// Storage jobs scheduled and not yet finished.
    pub(crate) pending_ops: usize,
    /// A store is running. Stores asked for meanwhile queue behind it.
    pub(crate) storing: bool,
    /// A store is queued behind the running one.
    pub(crate) store_queued: bool,
    pub(crate) loading: bool,
    /// Latest certificate and the offset its footer is sealed at.
    pub(crate) certificate: Option<(u32, Certificate)>,
    pub(crate) outcome: RecoveryOutcome,
    pub(crate) building: bool,
    /// Whether partitions were supplied when recovery started.
    pub(crate) eager: bool,
}

pub(crate) struct ReplicaCore {
    pub(crate) id: ReplicaId,
    pub(crate) capacity: usize,
    pub(crate) primary: bool,
    pub(crate) storage: Arc<dyn FrameStorage>,
    pub(crate) io: WorkerHandle,
    pub(crate) recovery: WorkerHandle,
    pub(crate) inner: Mutex<ReplicaInner>,
    /// Signalled whenever a job finishes or a build settles.
    pub(crate) changed: Condvar,
}

impl ReplicaCore {
    pub(crate) fn wrong_state(&self, state: ReplicaState, operation: &'static str) -> ReplicaError {
        ReplicaError::WrongState {
            replica: self.id,
            state,
            operation,
        }
    }

    pub(crate) fn expect_state(
        &self,
        inner: &ReplicaInner,
        expected: ReplicaState,
        operation: &'static str,
    ) -> ReplicaResult<()> {
        if inner.state == expected {
            Ok(())
        } else {
            Err(self.wrong_state(inner.state, operation))
        }
    }

    pub(crate) fn invalid_argument(&self, message: String) -> ReplicaError {
        ReplicaError::InvalidArgument {
            replica: self.id,
            message,
        }
    }

    /// Blocks until every scheduled storage job has finished.
    pub(crate) fn wait_for_ongoing_ops(&self, inner: &mut MutexGuard<'_, ReplicaInner>) {
        while inner.pending_ops > 0 {
            self.changed.wait(inner);
        }
    }

    /// Prepares a write of the whole buffer to the frame.
    ///
    /// Stores of one replica never overlap. If one is running, the store is
    /// queued behind it and no job is returned; any number of queued stores
    /// collapse into one that writes the buffer as it is when it starts.
    /// The returned job must be submitted after the lock is released.
    pub(crate) fn persist_job(self: &Arc<Self>, inner: &mut ReplicaInner) -> Option<Job> {
        let (Some(buffer), Some(frame)) = (inner.buffer.clone(), inner.frame.clone()) else {
            return None;
        };
        if inner.storing {
            if !inner.store_queued {
                inner.store_queued = true;
                inner.pending_ops += 1;
            }
            return None;
        }
        inner.storing = true;
        inner.pending_ops += 1;
        let core = Arc::clone(self);
        Some(Box::new(move || core.store(buffer, frame)))
    }

    /// Writes `buffer` to `frame`, then any store queued meanwhile.
    fn store(&self, mut buffer: Arc<Vec<u8>>, mut frame: Arc<Frame>) {
        loop {
            let result = self
                .storage
                .write(&frame, 0, &buffer)
                .and_then(|()| self.storage.sync());
            drop(buffer);
            drop(frame);

            let mut inner = self.inner.lock();
            inner.pending_ops -= 1;
            if let Err(err) = &result {
                error!("Failed to store replica {}: {err}", self.id);
            }
            if inner.store_queued {
                inner.store_queued = false;
                if let (Some(next_buffer), Some(next_frame)) =
                    (inner.buffer.clone(), inner.frame.clone())
                {
                    buffer = next_buffer;
                    frame = next_frame;
                    self.changed.notify_all();
                    continue;
                }
                inner.pending_ops -= 1;
            }
            inner.storing = false;
            if result.is_ok() && inner.state == ReplicaState::Closed && inner.pending_ops == 0 {
                inner.buffer = None;
                debug!("Replica {} stored, released its buffer", self.id);
            }
            self.changed.notify_all();
            return;
        }
    }

    /// Prepares a load of the frame into memory, unless content is resident
    /// or already on its way.
    pub(crate) fn load_job(self: &Arc<Self>, inner: &mut ReplicaInner) -> Option<Job> {
        if inner.buffer.is_some() || inner.loading {
            return None;
        }
        let frame = inner.frame.clone()?;
        inner.loading = true;
        inner.pending_ops += 1;
        let core = Arc::clone(self);
        Some(Box::new(move || {
            let result = core.storage.load(&frame);
            drop(frame);

            let mut inner = core.inner.lock();
            inner.loading = false;
            inner.pending_ops -= 1;
            match result {
                Ok(bytes) => {
                    if inner.state.holds_frame() && inner.buffer.is_none() {
                        inner.buffer = Some(Arc::new(bytes));
                        debug!("Loaded replica {}", core.id);
                    }
                }
                Err(err) => error!("Failed to load replica {}: {err}", core.id),
            }
            core.changed.notify_all();
        }))
    }

    /// Blocks until content is resident, loading it if necessary.
    ///
    /// Returns `None` if a load started here finished without content.
    fn resident_content(
        self: &Arc<Self>,
        inner: &mut MutexGuard<'_, ReplicaInner>,
    ) -> ReplicaResult<Option<Arc<Vec<u8>>>> {
        let mut requested = false;
        loop {
            self.expect_state(inner, ReplicaState::Recovering, "build recovery segments for")?;
            if let Some(buffer) = &inner.buffer {
                return Ok(Some(Arc::clone(buffer)));
            }
            if !inner.loading {
                if requested {
                    return Ok(None);
                }
                requested = true;
                if let Some(job) = self.load_job(inner) {
                    MutexGuard::unlocked(inner, || self.io.submit(job));
                }
                continue;
            }
            self.changed.wait(inner);
        }
    }

    pub(crate) fn build(self: &Arc<Self>, partitions: &PartitionList) -> ReplicaResult<()> {
        let mut inner = self.inner.lock();
        loop {
            self.expect_state(&inner, ReplicaState::Recovering, "build recovery segments for")?;
            if inner.outcome.is_settled() {
                info!("Recovery segments already built for {}", self.id);
                return Ok(());
            }
            if !inner.building {
                break;
            }
            self.changed.wait(&mut inner);
        }
        inner.building = true;

        let content = match self.resident_content(&mut inner) {
            Ok(content) => content,
            Err(err) => {
                inner.building = false;
                self.changed.notify_all();
                return Err(err);
            }
        };
        let certificate = inner.certificate.map(|(_, certificate)| certificate);
        let id = self.id;
        let result = MutexGuard::unlocked(&mut inner, || {
            scan(id, content.as_ref().map(|c| c.as_slice()), certificate, partitions)
        });

        inner.building = false;
        self.changed.notify_all();
        if inner.state != ReplicaState::Recovering {
            debug!("Discarding recovery segments for {id}; the replica was freed");
            return Err(self.wrong_state(inner.state, "build recovery segments for"));
        }
        inner.outcome = match result {
            Ok(segments) => {
                info!("Built {} recovery segments for {id}", segments.len());
                RecoveryOutcome::Built(segments)
            }
            Err(reason) => {
                warn!("Couldn't build recovery segments for {id}: {reason}");
                RecoveryOutcome::Poisoned(reason)
            }
        };
        Ok(())
    }
}

fn scan(
    id: ReplicaId,
    content: Option<&[u8]>,
    certificate: Option<Certificate>,
    partitions: &PartitionList,
) -> Result<Vec<RecoverySegment>, String> {
    let content = content.ok_or_else(|| "replica content could not be loaded".to_string())?;
    let certificate =
        certificate.ok_or_else(|| "no certificate was recorded for the replica".to_string())?;
    let _span = tracing::debug_span!("build_recovery_segments", replica = %id).entered();
    partition_segment(id.segment_id, content, &certificate, partitions).map_err(|err| err.to_string())
}
