//! Property-based test generators using proptest.
//!
//! Provides strategies for generating segments and tablet lists that
//! overlap, so routing has something to route.

use crate::segments::{tablet_for_key, SegmentFixture, TEST_TABLE};
use proptest::prelude::*;
use segvault_core::PartitionList;

/// Strategy for generating short object keys from a small alphabet.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-d]{1,2}").expect("Invalid regex")
}

/// Strategy for generating a headed segment of objects in [`TEST_TABLE`].
///
/// Yields the keys in append order alongside the segment.
pub fn segment_strategy(segment_id: u64) -> impl Strategy<Value = (Vec<String>, SegmentFixture)> {
    prop::collection::vec(key_strategy(), 0..32).prop_map(move |keys| {
        let segment = keys
            .iter()
            .fold(SegmentFixture::new(99, segment_id), |segment, key| {
                segment.object(TEST_TABLE, key)
            });
        (keys, segment)
    })
}

/// Strategy for generating single-key tablets spread over a few partitions.
pub fn tablets_strategy() -> impl Strategy<Value = PartitionList> {
    prop::collection::vec((key_strategy(), 0u64..4), 0..8).prop_map(|tablets| {
        tablets
            .into_iter()
            .map(|(key, partition)| tablet_for_key(TEST_TABLE, &key, partition))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn segments_match_their_keys((keys, segment) in segment_strategy(7)) {
            prop_assert!(!segment.is_empty());
            prop_assert_eq!(segment.certificate().segment_length as usize, segment.len());
            prop_assert!(keys.len() < 32);
        }

        #[test]
        fn tablets_use_few_partitions(tablets in tablets_strategy()) {
            prop_assert!(tablets.partition_count() <= 4);
        }
    }
}
