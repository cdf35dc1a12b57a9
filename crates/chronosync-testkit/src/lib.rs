//! # ChronoSync Testkit
//!
//! Testing utilities for ChronoSync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: digest tree roots for known producer states
//! - **Generators**: Proptest strategies for names, records and batches
//! - **Fixtures**: a recording observer and engine setup helpers
//! - **Simulator**: a deterministic network that drives several engines
//!   on one manual clock
//!
//! ## Golden Vectors
//!
//! ```rust
//! use chronosync_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, root) in verify_all_vectors().unwrap() {
//!     assert!(matches, "{}: {}", name, root);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use chronosync_testkit::generators::{tree_from_params, TreeHistoryParams};
//!
//! proptest! {
//!     #[test]
//!     fn root_is_deterministic(params: TreeHistoryParams) {
//!         prop_assert_eq!(tree_from_params(&params).root(), tree_from_params(&params).root());
//!     }
//! }
//! ```
//!
//! ## Simulation
//!
//! ```rust
//! use std::time::Duration;
//! use chronosync_testkit::sim::SimNetwork;
//!
//! let mut net = SimNetwork::new();
//! let a = net.join("/app/a", 1).unwrap();
//! let b = net.join("/app/b", 1).unwrap();
//! net.advance(Duration::from_secs(10)).unwrap();
//!
//! net.publish(a).unwrap();
//! assert!(net.converged());
//! assert_eq!(net.engine(b).producer_sequence_no(&"/app/a".parse().unwrap(), 1), Some(1));
//! ```

pub mod fixtures;
pub mod generators;
pub mod sim;
pub mod vectors;

pub use fixtures::{EngineFixture, RecordingObserver};
pub use generators::{tree_from_params, TreeHistoryParams};
pub use sim::{SimNetwork, SimStats};
pub use vectors::{all_vectors, tree_from_vector, verify_all_vectors, GoldenVector};
