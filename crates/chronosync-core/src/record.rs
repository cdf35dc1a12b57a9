//! Sync state records.
//!
//! An [`UpdateRecord`] says "producer X at session S now has sequence N".
//! Records travel in batches inside sync responses and are applied to the
//! digest tree.

use std::fmt;

use crate::name::Name;

/// What a record asks the receiver to do.
///
/// Only `Update` is ever produced or applied. The other actions exist on the
/// wire and are carried through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ActionType {
    Update = 0,
    Delete = 1,
    Other = 2,
}

impl ActionType {
    /// Convert to u8 for serialization.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Try to parse from u8.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Update),
            1 => Some(Self::Delete),
            2 => Some(Self::Other),
            _ => None,
        }
    }
}

/// One producer's position: `(prefix, session) -> seq`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct UpdateRecord {
    pub producer_prefix: Name,
    pub session: i64,
    pub seq: i64,
    pub action: ActionType,
}

impl UpdateRecord {
    /// Create an `Update` record.
    pub fn new(producer_prefix: Name, session: i64, seq: i64) -> Self {
        Self {
            producer_prefix,
            session,
            seq,
            action: ActionType::Update,
        }
    }

    pub fn is_update(&self) -> bool {
        self.action == ActionType::Update
    }

    /// The `(prefix, session)` key this record addresses.
    pub fn key(&self) -> (&Name, i64) {
        (&self.producer_prefix, self.session)
    }
}

impl fmt::Debug for UpdateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UpdateRecord({} session={} seq={} {:?})",
            self.producer_prefix, self.session, self.seq, self.action
        )
    }
}
