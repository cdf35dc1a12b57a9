//! # ChronoSync Store
//!
//! Response caching for a ChronoSync node.
//!
//! ## Key Types
//!
//! - [`ContentStore`] - Cache of published responses with freshness expiry
//!   and child-selector lookup
//! - [`PendingRequestTable`] - Incoming requests waiting for a future
//!   publication
//!
//! Both are driven by an injected [`chronosync_core::Clock`] and evict
//! expired entries lazily.

pub mod content;
pub mod pending;

pub use content::{ContentStore, NotFoundHandler, DEFAULT_CLEANUP_INTERVAL};
pub use pending::{PendingRequestRecord, PendingRequestTable};
