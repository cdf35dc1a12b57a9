//! # ChronoSync Core
//!
//! Pure primitives for the ChronoSync client stack: names, packets, sync
//! records and their codec, response signing, and the clock and transport
//! contracts the upper layers are written against.
//!
//! This crate contains no protocol state and no I/O.
//!
//! ## Key Types
//!
//! - [`Name`] / [`Component`] - Hierarchical names with canonical ordering
//! - [`Request`] / [`Response`] - The only message exchange primitive
//! - [`UpdateRecord`] - "producer X at session S now has sequence N"
//! - [`Fingerprint`] - Digest of the global producer state
//! - [`SyncStateCodec`] - Sync payload encoding, [`CborCodec`] by default
//! - [`Signer`] - Signs every outgoing response, [`Ed25519Signer`] by default

pub mod clock;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod name;
pub mod packet;
pub mod record;
pub mod transport;

pub use clock::{deadline_after, Clock, ManualClock, SystemClock};
pub use codec::{CborCodec, SyncStateCodec};
pub use crypto::{
    Ed25519PublicKey, Ed25519Signature, Ed25519Signer, Fingerprint, Keypair, Signer,
};
pub use error::{CoreError, Result, TransportError};
pub use name::{Component, Name};
pub use packet::{ChildSelector, Request, Response};
pub use record::{ActionType, UpdateRecord};
pub use transport::{ChannelId, Transport};
