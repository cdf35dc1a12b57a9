//! Proptest generators for property-based testing.

use proptest::prelude::*;

use chronosync_core::{ActionType, Component, Name, UpdateRecord};
use chronosync_sync::DigestTree;

/// Generate a name component, including bytes that need escaping.
pub fn component() -> impl Strategy<Value = Component> {
    prop_oneof![
        "[a-z][a-z0-9-]{0,11}".prop_map(|s| Component::from(s.as_str())),
        prop::collection::vec(any::<u8>(), 0..8).prop_map(Component::from),
    ]
}

/// Generate a producer prefix of one to four components.
pub fn name() -> impl Strategy<Value = Name> {
    prop::collection::vec(component(), 1..=4).prop_map(Name::from_components)
}

/// Generate a session number.
pub fn session() -> impl Strategy<Value = i64> {
    prop_oneof![0i64..=8, any::<i64>()]
}

/// Generate a sequence number.
pub fn seq() -> impl Strategy<Value = i64> {
    0i64..=1_000_000
}

/// Generate a record action, mostly `Update`.
pub fn action() -> impl Strategy<Value = ActionType> {
    prop_oneof![
        8 => Just(ActionType::Update),
        1 => Just(ActionType::Delete),
        1 => Just(ActionType::Other),
    ]
}

/// Generate an `Update` record.
pub fn update_record() -> impl Strategy<Value = UpdateRecord> {
    (name(), session(), seq()).prop_map(|(prefix, session, seq)| UpdateRecord::new(prefix, session, seq))
}

/// Generate a record with any action.
pub fn wire_record() -> impl Strategy<Value = UpdateRecord> {
    (update_record(), action()).prop_map(|(mut record, action)| {
        record.action = action;
        record
    })
}

/// Generate a batch of at most `max_len` update records drawn from a small
/// pool of prefixes, so batches often touch the same producer twice.
pub fn update_batch(max_len: usize) -> impl Strategy<Value = Vec<UpdateRecord>> {
    prop::collection::vec(name(), 1..=4).prop_flat_map(move |prefixes| {
        let n = prefixes.len();
        prop::collection::vec((0..n, 0i64..3, seq()), 0..=max_len).prop_map(move |picks| {
            picks
                .into_iter()
                .map(|(i, session, seq)| UpdateRecord::new(prefixes[i].clone(), session, seq))
                .collect()
        })
    })
}

/// Parameters for a sequence of batches applied to one tree.
#[derive(Debug, Clone)]
pub struct TreeHistoryParams {
    pub batches: Vec<Vec<UpdateRecord>>,
}

impl Arbitrary for TreeHistoryParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop::collection::vec(update_batch(6), 0..6)
            .prop_map(|batches| TreeHistoryParams { batches })
            .boxed()
    }
}

/// Apply every batch of `params` to a fresh tree.
pub fn tree_from_params(params: &TreeHistoryParams) -> DigestTree {
    let mut tree = DigestTree::new();
    for batch in &params.batches {
        tree.update(batch);
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronosync_core::{CborCodec, SyncStateCodec};
    use chronosync_sync::DigestLog;

    proptest! {
        #[test]
        fn test_tree_is_sorted_and_unique(params: TreeHistoryParams) {
            let tree = tree_from_params(&params);
            let keys: Vec<_> = tree
                .iter()
                .map(|s| (s.producer_prefix.clone(), s.session))
                .collect();
            for pair in keys.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }

        #[test]
        fn test_tree_keeps_highest_seq(params: TreeHistoryParams) {
            let tree = tree_from_params(&params);
            for batch in &params.batches {
                for record in batch {
                    let seq = tree.seq_of(&record.producer_prefix, record.session);
                    prop_assert!(seq.is_some_and(|s| s >= record.seq));
                }
            }
        }

        #[test]
        fn test_batching_does_not_change_root(params: TreeHistoryParams) {
            let batched = tree_from_params(&params);

            let mut flat = DigestTree::new();
            let all: Vec<UpdateRecord> = params.batches.concat();
            flat.update(&all);

            prop_assert_eq!(batched.root(), flat.root());
        }

        #[test]
        fn test_snapshot_rebuilds_same_root(params: TreeHistoryParams) {
            let tree = tree_from_params(&params);
            let mut copy = DigestTree::new();
            copy.update(&tree.snapshot());
            prop_assert_eq!(tree.root(), copy.root());
        }

        #[test]
        fn test_diff_since_catches_up(
            base in update_batch(6),
            later in prop::collection::vec(update_batch(4), 1..4),
        ) {
            let mut tree = DigestTree::new();
            let mut log = DigestLog::new();
            if tree.update(&base) {
                log.append(tree.root().clone(), base.clone());
            }
            let behind = tree.clone();
            let index = log.find(behind.root()).unwrap();

            for batch in &later {
                if tree.update(batch) {
                    log.append(tree.root().clone(), batch.clone());
                }
            }

            let mut follower = behind;
            follower.update(&log.diff_since(index, &tree));
            prop_assert_eq!(follower.root(), tree.root());
        }

        #[test]
        fn test_codec_preserves_records(records in prop::collection::vec(wire_record(), 0..8)) {
            let codec = CborCodec;
            let bytes = codec.encode(&records).unwrap();
            prop_assert_eq!(codec.decode(&bytes).unwrap(), records);
        }
    }
}
