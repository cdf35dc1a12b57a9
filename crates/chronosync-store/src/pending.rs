//! Pending request table.
//!
//! Holds incoming sync requests that could not be answered when they
//! arrived. A later publication that matches a record is delivered on the
//! record's channel and the record is removed. Expired records are dropped
//! lazily whenever the table is scanned.

use chronosync_core::{deadline_after, ChannelId, Name, Request};

/// An unanswered incoming request.
#[derive(Debug, Clone)]
pub struct PendingRequestRecord {
    pub request: Request,
    /// Where the answer must be sent.
    pub channel: ChannelId,
    /// Unix ms after which the requester has given up. `None` never expires.
    pub expires_at: Option<i64>,
}

impl PendingRequestRecord {
    pub fn is_expired(&self, now_millis: i64) -> bool {
        matches!(self.expires_at, Some(t) if now_millis >= t)
    }
}

/// Table of unanswered incoming requests.
#[derive(Debug, Default)]
pub struct PendingRequestTable {
    records: Vec<PendingRequestRecord>,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a request. Its expiry is `now + lifetime`.
    pub fn insert(&mut self, request: Request, channel: ChannelId, now_millis: i64) {
        let expires_at = request.lifetime.map(|l| deadline_after(now_millis, l));
        self.records.push(PendingRequestRecord {
            request,
            channel,
            expires_at,
        });
    }

    /// Drop every expired record. Returns how many were dropped.
    pub fn remove_expired(&mut self, now_millis: i64) -> usize {
        let before = self.records.len();
        self.records.retain(|r| !r.is_expired(now_millis));
        before - self.records.len()
    }

    /// Remove and return every live record whose request matches `name`.
    ///
    /// Expired records are dropped first, so an expired request is never
    /// returned.
    pub fn take_matching(&mut self, name: &Name, now_millis: i64) -> Vec<PendingRequestRecord> {
        self.remove_expired(now_millis);

        let mut taken = Vec::new();
        let mut i = 0;
        while i < self.records.len() {
            if self.records[i].request.matches_name(name) {
                taken.push(self.records.remove(i));
            } else {
                i += 1;
            }
        }
        taken
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingRequestRecord> {
        self.records.iter()
    }
}
