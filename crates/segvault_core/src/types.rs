//! Core type definitions for segvault.

use std::fmt;

/// Identifier of a server in the cluster.
///
/// The generation distinguishes successive incarnations of the same slot,
/// so an id is never reused by a restarted server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerId {
    /// Slot index.
    pub index: u32,
    /// Incarnation of the slot.
    pub generation: u32,
}

impl ServerId {
    /// Creates a new server ID.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the id packed as `generation << 32 | index`.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        (self.generation as u64) << 32 | self.index as u64
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.index, self.generation)
    }
}

/// Identity of a replica: the master that owns the log and the segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplicaId {
    /// Master whose log the segment belongs to.
    pub master_id: ServerId,
    /// Segment within that log.
    pub segment_id: u64,
}

impl ReplicaId {
    /// Creates a new replica ID.
    #[must_use]
    pub const fn new(master_id: ServerId, segment_id: u64) -> Self {
        Self {
            master_id,
            segment_id,
        }
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{},{}>", self.master_id, self.segment_id)
    }
}

/// Lifecycle state of a replica.
///
/// States only move forward:
///
/// ```text
/// UNINIT -> OPEN -> CLOSED -> RECOVERING -> FREED
///             \        \________________/
///              \__________________________> FREED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReplicaState {
    /// Created but not yet given a frame.
    #[default]
    Uninit,
    /// Accepting writes from the master.
    Open,
    /// Sealed; no further writes.
    Closed,
    /// Serving recovery segments.
    Recovering,
    /// Frame returned to storage.
    Freed,
}

impl ReplicaState {
    /// Returns true if the replica holds a frame in this state.
    #[must_use]
    pub const fn holds_frame(self) -> bool {
        matches!(self, Self::Open | Self::Closed | Self::Recovering)
    }
}

impl fmt::Display for ReplicaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninit => "UNINIT",
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
            Self::Recovering => "RECOVERING",
            Self::Freed => "FREED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_id_display() {
        assert_eq!(format!("{}", ServerId::new(99, 0)), "99.0");
        assert_eq!(format!("{}", ServerId::new(3, 7)), "3.7");
    }

    #[test]
    fn server_id_packing() {
        assert_eq!(ServerId::new(99, 0).as_u64(), 99);
        assert_eq!(ServerId::new(1, 1).as_u64(), (1 << 32) | 1);
    }

    #[test]
    fn replica_id_display() {
        let id = ReplicaId::new(ServerId::new(99, 0), 88);
        assert_eq!(format!("{id}"), "<99.0,88>");
    }

    #[test]
    fn state_holds_frame() {
        assert!(!ReplicaState::Uninit.holds_frame());
        assert!(ReplicaState::Open.holds_frame());
        assert!(ReplicaState::Recovering.holds_frame());
        assert!(!ReplicaState::Freed.holds_frame());
        assert_eq!(ReplicaState::Recovering.to_string(), "RECOVERING");
    }
}
