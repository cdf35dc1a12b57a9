//! Digest tree.
//!
//! The canonical set of producer states, sorted by `(prefix, session)`, and
//! the fingerprint of that set.
//!
//! ## Fingerprint
//!
//! For every entry in sorted order the hasher is fed
//! `prefix-uri ‖ session (8 bytes BE) ‖ seq (8 bytes BE)`; the Blake3 digest
//! is rendered as lowercase hex. The empty tree has the bootstrap
//! fingerprint `"00"`. Since the entries are sorted, the fingerprint only
//! depends on the set, never on the order updates were applied in.

use chronosync_core::{Fingerprint, Name, UpdateRecord};

/// One producer's position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerState {
    pub producer_prefix: Name,
    pub session: i64,
    pub seq: i64,
}

impl ProducerState {
    /// The state as an `Update` record.
    pub fn to_record(&self) -> UpdateRecord {
        UpdateRecord::new(self.producer_prefix.clone(), self.session, self.seq)
    }
}

/// Sorted producer states plus their fingerprint.
#[derive(Debug, Clone)]
pub struct DigestTree {
    entries: Vec<ProducerState>,
    root: Fingerprint,
}

impl Default for DigestTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DigestTree {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            root: Fingerprint::bootstrap(),
        }
    }

    /// Apply a batch of records. Returns whether the root changed.
    ///
    /// Only `Update` records are applied. A stored sequence number is only
    /// ever raised, so a delayed record cannot move a producer backwards.
    pub fn update(&mut self, batch: &[UpdateRecord]) -> bool {
        let mut touched = false;

        for record in batch.iter().filter(|r| r.is_update()) {
            match self.search(&record.producer_prefix, record.session) {
                Ok(i) => {
                    if record.seq > self.entries[i].seq {
                        self.entries[i].seq = record.seq;
                        touched = true;
                    }
                }
                Err(i) => {
                    self.entries.insert(
                        i,
                        ProducerState {
                            producer_prefix: record.producer_prefix.clone(),
                            session: record.session,
                            seq: record.seq,
                        },
                    );
                    touched = true;
                }
            }
        }

        if !touched {
            return false;
        }

        let root = self.compute_root();
        let changed = root != self.root;
        self.root = root;
        changed
    }

    /// Index of the entry for `(prefix, session)`.
    pub fn find(&self, producer_prefix: &Name, session: i64) -> Option<usize> {
        self.search(producer_prefix, session).ok()
    }

    /// Current sequence number for `(prefix, session)`.
    pub fn seq_of(&self, producer_prefix: &Name, session: i64) -> Option<i64> {
        self.find(producer_prefix, session).map(|i| self.entries[i].seq)
    }

    pub fn get(&self, index: usize) -> Option<&ProducerState> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProducerState> {
        self.entries.iter()
    }

    pub fn root(&self) -> &Fingerprint {
        &self.root
    }

    /// The whole tree as `Update` records, in canonical order.
    pub fn snapshot(&self) -> Vec<UpdateRecord> {
        self.entries.iter().map(ProducerState::to_record).collect()
    }

    fn search(&self, producer_prefix: &Name, session: i64) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| {
            e.producer_prefix
                .cmp(producer_prefix)
                .then(e.session.cmp(&session))
        })
    }

    fn compute_root(&self) -> Fingerprint {
        if self.entries.is_empty() {
            return Fingerprint::bootstrap();
        }

        let mut hasher = blake3::Hasher::new();
        for entry in &self.entries {
            hasher.update(entry.producer_prefix.to_uri().as_bytes());
            hasher.update(&entry.session.to_be_bytes());
            hasher.update(&entry.seq.to_be_bytes());
        }
        Fingerprint::from_hash(hasher.finalize())
    }
}
