//! Routing of log entries to tablets.

use crate::partition::{PartitionList, TabletDescriptor};
use segvault_codec::{KeyRef, LogPosition};
use tracing::debug;

/// Returns the tablet an entry with `key`, appended at `position`, is
/// recovered into.
///
/// The first tablet of the entry's table whose hash range holds the key
/// hash wins. `None` means the entry is dropped: either no tablet covers it
/// (the tablet was deleted or moved to another log) or the tablet was
/// created after the entry was written.
#[must_use]
pub fn which_partition<'a>(
    key: &KeyRef<'_>,
    position: LogPosition,
    partitions: &'a PartitionList,
) -> Option<&'a TabletDescriptor> {
    let key_hash = key.hash();
    let Some(tablet) = partitions.find_tablet(key.table_id, key_hash) else {
        debug!(
            "Couldn't place object with <tableId, keyHash> of <{},{}> into any of the given \
             tablets for recovery; hopefully it belonged to a deleted tablet or lives in \
             another log now",
            key.table_id, key_hash
        );
        return None;
    };

    if !is_entry_alive(position, tablet) {
        debug!(
            "Skipping object with <tableId, keyHash> of <{},{}> because it appears to have \
             existed prior to this tablet's creation",
            key.table_id, key_hash
        );
        return None;
    }

    Some(tablet)
}

/// Returns true if an entry appended at `position` postdates `tablet`'s
/// creation.
///
/// Entries at exactly the creation position are not alive. Tablets without
/// a recorded creation position accept every entry.
#[must_use]
pub fn is_entry_alive(position: LogPosition, tablet: &TabletDescriptor) -> bool {
    tablet
        .ctime
        .is_none_or(|ctime| position > ctime.position())
}
