//! Transport contract.
//!
//! Incoming requests arrive on a channel; a reply for that request must go
//! back on the same channel. The core only ever sees opaque [`ChannelId`]s.

use std::fmt;

use crate::error::TransportError;
use crate::packet::Response;

/// Identifies the channel an incoming request was delivered on.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sends responses back on the channel that delivered a request.
///
/// Delivery is best-effort; callers log failures and carry on.
pub trait Transport {
    fn send(&mut self, channel: ChannelId, response: &Response) -> Result<(), TransportError>;
}
