//! Request and response packets.
//!
//! These are the in-memory forms of the two message kinds. Their binary wire
//! encoding belongs to the transport and is not modelled here.

use std::time::Duration;

use bytes::Bytes;

use crate::crypto::Ed25519Signature;
use crate::name::{Component, Name};

/// Tie-break rule when several stored responses match a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildSelector {
    /// Prefer the smallest component after the matched prefix.
    Leftmost,
    /// Prefer the largest component after the matched prefix.
    Rightmost,
}

/// A named request. Satisfied by any response whose name it prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub name: Name,
    /// How long the request stays pending. `None` means no expiry.
    pub lifetime: Option<Duration>,
    pub child_selector: Option<ChildSelector>,
}

impl Request {
    pub fn new(name: Name) -> Self {
        Self {
            name,
            lifetime: None,
            child_selector: None,
        }
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn with_child_selector(mut self, selector: ChildSelector) -> Self {
        self.child_selector = Some(selector);
        self
    }

    /// Check whether a response named `name` satisfies this request.
    pub fn matches_name(&self, name: &Name) -> bool {
        self.name.is_prefix_of(name)
    }

    /// The component of `name` right after this request's name. `None` when
    /// `name` has no further components; selectors treat that as empty.
    pub fn child_component<'a>(&self, name: &'a Name) -> Option<&'a Component> {
        name.get(self.name.len())
    }
}

/// A named, optionally signed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub name: Name,
    pub payload: Bytes,
    /// How long the response stays fresh in a cache. `None` never goes stale.
    pub freshness: Option<Duration>,
    pub signature: Option<Ed25519Signature>,
}

impl Response {
    pub fn new(name: Name, payload: impl Into<Bytes>) -> Self {
        Self {
            name,
            payload: payload.into(),
            freshness: None,
            signature: None,
        }
    }

    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = Some(freshness);
        self
    }

    /// The bytes covered by the signature: `name-uri || payload`.
    pub fn signed_portion(&self) -> Vec<u8> {
        let uri = self.name.to_uri();
        let mut buf = Vec::with_capacity(uri.len() + self.payload.len());
        buf.extend_from_slice(uri.as_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }
}
