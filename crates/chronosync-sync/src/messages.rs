//! Sync request naming.
//!
//! Every sync request lives under the broadcast prefix:
//!
//! - `<prefix>/<fingerprint>` - long-lived request carrying the sender's root
//! - `<prefix>/00` - newcomer asking for the full state
//! - `<prefix>/recovery/<fingerprint>` - explicit request for the full state
//!   of a node that does not recognise `<fingerprint>`

use chronosync_core::{Fingerprint, Name};

/// Name component marking a recovery request.
pub const RECOVERY_COMPONENT: &str = "recovery";

/// What an incoming sync request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRequestKind {
    /// `<prefix>/00`
    Newcomer,
    /// `<prefix>/recovery/<fingerprint>`
    Recovery(Fingerprint),
    /// `<prefix>/<fingerprint>`
    Sync(Fingerprint),
}

impl SyncRequestKind {
    /// Classify `name` against the broadcast prefix. `None` for names of
    /// any other shape.
    pub fn classify(broadcast_prefix: &Name, name: &Name) -> Option<Self> {
        if !broadcast_prefix.is_prefix_of(name) {
            return None;
        }

        match &name.components()[broadcast_prefix.len()..] {
            [digest] => {
                let digest = Fingerprint::from_component(digest);
                if digest.is_bootstrap() {
                    Some(Self::Newcomer)
                } else {
                    Some(Self::Sync(digest))
                }
            }
            [marker, digest] if marker.as_bytes() == RECOVERY_COMPONENT.as_bytes() => {
                Some(Self::Recovery(Fingerprint::from_component(digest)))
            }
            _ => None,
        }
    }
}

/// `<prefix>/<digest>`
pub fn sync_request_name(broadcast_prefix: &Name, digest: &Fingerprint) -> Name {
    broadcast_prefix.clone().append(digest.to_component())
}

/// `<prefix>/recovery/<digest>`
pub fn recovery_request_name(broadcast_prefix: &Name, digest: &Fingerprint) -> Name {
    broadcast_prefix
        .clone()
        .append(RECOVERY_COMPONENT)
        .append(digest.to_component())
}
