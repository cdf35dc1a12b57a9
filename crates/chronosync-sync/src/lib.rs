//! # ChronoSync Sync
//!
//! The ChronoSync protocol: producers agree on "who has published up to
//! which sequence number" using only named requests and responses.
//!
//! ## Overview
//!
//! Each participant keeps a [`DigestTree`] of every producer's latest
//! sequence number and sends a long-lived request named after the tree's
//! fingerprint. Whoever publishes next answers all such requests with the
//! new record. A participant that sees a fingerprint it does not recognise
//! waits briefly, then asks for the full state. The [`DigestLog`] lets a
//! participant answer a peer that is behind with just the difference.
//!
//! ## Key Types
//!
//! - [`SyncEngine`] - Protocol state machine for one local producer
//! - [`Face`] - What the engine needs from the network
//! - [`SyncObserver`] - Receives learned producer states
//!
//! ## Usage
//!
//! ```ignore
//! let config = SyncConfig::new(broadcast_prefix, app_prefix, session);
//! let mut engine = SyncEngine::new(config, face, signer, observer, clock);
//! engine.initialize()?;
//!
//! // The host feeds network events in:
//! engine.on_incoming_request(&request, channel);
//! engine.on_response(id, &response)?;
//! engine.on_timeout(id)?;
//!
//! let seq = engine.publish()?;
//! ```

pub mod digest_log;
pub mod digest_tree;
pub mod engine;
pub mod error;
pub mod face;
pub mod messages;

pub use digest_log::{DigestLog, DigestLogEntry};
pub use digest_tree::{DigestTree, ProducerState};
pub use engine::{EngineState, SyncConfig, SyncEngine, SyncObserver};
pub use error::{Result, SyncError};
pub use face::{Face, FaceAction, QueueFace, RequestId};
pub use messages::{recovery_request_name, sync_request_name, SyncRequestKind, RECOVERY_COMPONENT};
