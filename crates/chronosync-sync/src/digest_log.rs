//! Digest log.
//!
//! Append-only history of the fingerprints this node has held and the
//! updates that led to each one. Lets the engine answer a peer that is
//! behind with exactly what changed since the peer's fingerprint.

use std::collections::{HashMap, HashSet};

use chronosync_core::{Fingerprint, Name, UpdateRecord};

use crate::digest_tree::DigestTree;

/// A fingerprint and the updates that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestLogEntry {
    pub digest: Fingerprint,
    pub updates: Vec<UpdateRecord>,
}

/// Deduplicated fingerprint history. Entry 0 is always the bootstrap
/// fingerprint with no updates.
#[derive(Debug, Clone)]
pub struct DigestLog {
    entries: Vec<DigestLogEntry>,
    index: HashMap<Fingerprint, usize>,
}

impl Default for DigestLog {
    fn default() -> Self {
        Self::new()
    }
}

impl DigestLog {
    pub fn new() -> Self {
        let mut log = Self {
            entries: Vec::new(),
            index: HashMap::new(),
        };
        log.append(Fingerprint::bootstrap(), Vec::new());
        log
    }

    /// Append an entry unless the fingerprint is already logged.
    pub fn append(&mut self, digest: Fingerprint, updates: Vec<UpdateRecord>) -> bool {
        if self.index.contains_key(&digest) {
            return false;
        }
        self.index.insert(digest.clone(), self.entries.len());
        self.entries.push(DigestLogEntry { digest, updates });
        true
    }

    pub fn find(&self, digest: &Fingerprint) -> Option<usize> {
        self.index.get(digest).copied()
    }

    pub fn get(&self, index: usize) -> Option<&DigestLogEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DigestLogEntry> {
        self.entries.iter()
    }

    /// Everything that changed after entry `index`.
    ///
    /// Keys are emitted once, in the order they were first touched, and only
    /// if the tree still holds them. Each record carries the tree's current
    /// sequence number for its key.
    pub fn diff_since(&self, index: usize, tree: &DigestTree) -> Vec<UpdateRecord> {
        let mut seen: HashSet<(&Name, i64)> = HashSet::new();
        let mut diff = Vec::new();

        for entry in self.entries.iter().skip(index + 1) {
            for update in &entry.updates {
                let key = update.key();
                if !seen.insert(key) {
                    continue;
                }
                if let Some(seq) = tree.seq_of(key.0, key.1) {
                    diff.push(UpdateRecord::new(key.0.clone(), key.1, seq));
                }
            }
        }
        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(prefix: &str, session: i64, seq: i64) -> UpdateRecord {
        UpdateRecord::new(prefix.parse().unwrap(), session, seq)
    }

    /// Apply each batch to the tree and log the resulting root.
    fn build(batches: &[Vec<UpdateRecord>]) -> (DigestTree, DigestLog) {
        let mut tree = DigestTree::new();
        let mut log = DigestLog::new();
        for batch in batches {
            if tree.update(batch) {
                log.append(tree.root().clone(), batch.clone());
            }
        }
        (tree, log)
    }

    #[test]
    fn test_seeded_with_bootstrap() {
        let log = DigestLog::new();
        assert_eq!(log.len(), 1);
        assert_eq!(log.find(&Fingerprint::bootstrap()), Some(0));
        assert!(log.get(0).unwrap().updates.is_empty());
    }

    #[test]
    fn test_append_rejects_duplicate() {
        let mut log = DigestLog::new();
        assert!(!log.append(Fingerprint::bootstrap(), vec![record("/a", 1, 0)]));
        assert!(log.append(Fingerprint::from("abcd"), vec![]));
        assert!(!log.append(Fingerprint::from("abcd"), vec![]));
        assert_eq!(log.len(), 2);
        assert_eq!(log.find(&Fingerprint::from("abcd")), Some(1));
    }

    #[test]
    fn test_diff_since_first_seen_order_with_current_values() {
        let (tree, log) = build(&[
            vec![record("/a", 1, 0)],
            vec![record("/b", 1, 0)],
            vec![record("/a", 1, 1)],
            vec![record("/c", 1, 0)],
        ]);

        let diff = log.diff_since(1, &tree);
        assert_eq!(
            diff,
            vec![record("/b", 1, 0), record("/a", 1, 1), record("/c", 1, 0)]
        );

        // From the bootstrap entry the diff is the full state.
        assert_eq!(log.diff_since(0, &tree).len(), 3);
        // From the latest entry nothing changed.
        assert!(log.diff_since(log.len() - 1, &tree).is_empty());
    }

    #[test]
    fn test_diff_skips_keys_missing_from_tree() {
        let mut log = DigestLog::new();
        log.append(Fingerprint::from("x"), vec![record("/gone", 1, 3)]);
        let tree = DigestTree::new();
        assert!(log.diff_since(0, &tree).is_empty());
    }
}
