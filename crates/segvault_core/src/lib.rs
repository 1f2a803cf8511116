//! # segvault core
//!
//! Backup-side replica management for segvault.
//!
//! Masters replicate each segment of their log to several backups. This
//! crate is the backup's half of that arrangement:
//!
//! - [`BackupReplica`] - the lifecycle of one replica, from the frame it is
//!   opened in through sealing, recovery and release
//! - [`ReplicaEnv`] - storage and worker pools shared by a backup's replicas
//! - [`partition_segment`] - splitting a replica into recovery segments by
//!   tablet
//! - [`PartitionList`] - the tablets a crashed master's data is recovered into
//!
//! ## Example
//!
//! ```rust
//! use bytes::BytesMut;
//! use segvault_codec::{key_hash, EntryType, Object, Segment};
//! use segvault_core::{BackupConfig, PartitionList, ReplicaEnv, ServerId, TabletDescriptor};
//!
//! let env = ReplicaEnv::in_memory(BackupConfig::inline().segment_size(4096).frame_count(1))
//!     .unwrap();
//! let replica = env.open_replica(ServerId::new(99, 0), 88, true).unwrap();
//!
//! let mut segment = Segment::new();
//! segment
//!     .append(EntryType::Object, &Object::new(123, "10", "").encode().unwrap())
//!     .unwrap();
//! let certificate = segment.certificate();
//! replica
//!     .write(segment.as_bytes(), 0, Some((certificate.segment_length, certificate)), true)
//!     .unwrap();
//! replica.close().unwrap();
//!
//! let hash = key_hash(123, b"10");
//! let tablets = PartitionList::from_tablets(vec![TabletDescriptor::new(123, hash, hash, 0)]);
//! replica.set_recovering(Some(tablets.clone())).unwrap();
//! replica.build_recovery_segments(&tablets).unwrap();
//!
//! let mut dest = BytesMut::new();
//! let status = replica.append_recovery_segment(0, &mut dest).unwrap();
//! assert_eq!(status.certificate().unwrap().segment_length, 30);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod partition;
mod recovery;
mod replica;
mod types;
mod worker;

pub use config::BackupConfig;
pub use error::{ReplicaError, ReplicaResult};
pub use partition::{PartitionList, TabletDescriptor, Watermark};
pub use recovery::{
    is_entry_alive, partition_segment, which_partition, RecoveryOutcome, RecoverySegment,
};
pub use replica::{BackupReplica, ReadStatus, ReplicaEnv, FOOTER_LEN};
pub use types::{ReplicaId, ReplicaState, ServerId};
pub use worker::{Job, WorkerHandle, WorkerPool};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
