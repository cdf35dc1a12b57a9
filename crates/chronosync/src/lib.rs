//! # ChronoSync
//!
//! A ChronoSync client stack: producers in a group agree, without a
//! coordinator, on how far each of them has published, using nothing but
//! named requests and responses.
//!
//! ## Overview
//!
//! - **Names and packets** ([`core`]): hierarchical names, requests that are
//!   satisfied by any response whose name they prefix, signed responses
//! - **Caching** ([`store`]): published responses and parked requests
//! - **Protocol** ([`sync`]): digest tree, digest log and the [`SyncEngine`]
//! - **Hosting** (this crate): a tokio task per node and an in-memory
//!   broadcast network
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chronosync::core::{Ed25519Signer, Keypair};
//! use chronosync::link::memory::MemoryNetwork;
//! use chronosync::{Node, NodeConfig, SyncConfig, SyncEvent};
//!
//! async fn example() {
//!     let network = MemoryNetwork::new();
//!     let config = SyncConfig::new(
//!         "/ndn/broadcast/chat".parse().unwrap(),
//!         "/chat/alice".parse().unwrap(),
//!         1,
//!     );
//!
//!     let mut node = Node::spawn(
//!         NodeConfig::new(config),
//!         network.connect().await,
//!         Ed25519Signer::new(Keypair::generate()),
//!     )
//!     .unwrap();
//!
//!     // Wait until the node has joined, then publish.
//!     while let Some(event) = node.events.recv().await {
//!         if event == SyncEvent::Initialized {
//!             break;
//!         }
//!     }
//!     let seq = node.handle.publish().await.unwrap();
//!     assert_eq!(seq, 1);
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `chronosync::core` - Names, packets, records, codec, signing
//! - `chronosync::store` - Content store and pending request table
//! - `chronosync::sync` - Digest tree, digest log, sync engine

pub mod config;
pub mod error;
pub mod link;
pub mod node;

// Re-export component crates
pub use chronosync_core as core;
pub use chronosync_store as store;
pub use chronosync_sync as sync;

// Re-export main types for convenience
pub use config::NodeConfig;
pub use error::{NodeError, Result};
pub use link::{Link, Packet};
pub use node::{Node, NodeHandle, NodeStatus, SyncEvent, TokioClock};

pub use chronosync_core::{Fingerprint, Name, UpdateRecord};
pub use chronosync_sync::{EngineState, SyncConfig, SyncEngine, SyncObserver};
