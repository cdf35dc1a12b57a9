//! Face contract.
//!
//! A face is the endpoint an engine talks through: it sends requests into
//! the network, runs local timers, registers prefixes and sends responses
//! back on channels. Outcomes are not returned inline; the host later calls
//! [`SyncEngine::on_response`](crate::SyncEngine::on_response) or
//! [`SyncEngine::on_timeout`](crate::SyncEngine::on_timeout) with the
//! [`RequestId`] the face handed out.

use std::fmt;
use std::time::Duration;

use chronosync_core::{ChannelId, Name, Request, Response, Transport, TransportError};

/// Identifies an outstanding request or timer on a face.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The registration and transport endpoint of one engine.
pub trait Face: Transport {
    // ─────────────────────────────────────────────────────────────────────
    // Requests
    // ─────────────────────────────────────────────────────────────────────

    /// Send a request. It completes later with a response or a timeout after
    /// its lifetime.
    fn express_request(&mut self, request: Request) -> RequestId;

    /// Start a local timer that completes with a timeout after `delay`.
    fn schedule(&mut self, delay: Duration) -> RequestId;

    // ─────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────

    /// Ask to receive incoming requests under `prefix`.
    fn register_prefix(&mut self, prefix: &Name) -> Result<(), TransportError>;
}

/// Something a [`QueueFace`] was asked to do.
#[derive(Debug, Clone)]
pub enum FaceAction {
    Express(RequestId, Request),
    Schedule(RequestId, Duration),
    Send(ChannelId, Response),
}

/// A face that queues everything the engine asks for.
///
/// Hosts drain the queue after each engine call and carry the actions out
/// on their own network and timers.
#[derive(Debug, Default)]
pub struct QueueFace {
    next_id: u64,
    actions: Vec<FaceAction>,
    registered: Vec<Name>,
}

impl QueueFace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return the queued actions, oldest first.
    pub fn take_actions(&mut self) -> Vec<FaceAction> {
        std::mem::take(&mut self.actions)
    }

    /// Whether an incoming request falls under a registered prefix.
    pub fn accepts(&self, name: &Name) -> bool {
        self.registered.iter().any(|p| p.is_prefix_of(name))
    }

    pub fn registered(&self) -> &[Name] {
        &self.registered
    }

    fn next_id(&mut self) -> RequestId {
        self.next_id += 1;
        RequestId(self.next_id)
    }
}

impl Transport for QueueFace {
    fn send(&mut self, channel: ChannelId, response: &Response) -> Result<(), TransportError> {
        self.actions.push(FaceAction::Send(channel, response.clone()));
        Ok(())
    }
}

impl Face for QueueFace {
    fn express_request(&mut self, request: Request) -> RequestId {
        let id = self.next_id();
        self.actions.push(FaceAction::Express(id, request));
        id
    }

    fn schedule(&mut self, delay: Duration) -> RequestId {
        let id = self.next_id();
        self.actions.push(FaceAction::Schedule(id, delay));
        id
    }

    fn register_prefix(&mut self, prefix: &Name) -> Result<(), TransportError> {
        if !self.registered.contains(prefix) {
            self.registered.push(prefix.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_face_queues_actions_in_order() {
        let mut face = QueueFace::new();
        let prefix: Name = "/sync".parse().unwrap();
        face.register_prefix(&prefix).unwrap();
        face.register_prefix(&prefix).unwrap();

        let a = face.express_request(Request::new("/sync/00".parse().unwrap()));
        let b = face.schedule(Duration::from_secs(2));
        face.send(ChannelId(3), &Response::new("/sync/ab".parse().unwrap(), &b""[..]))
            .unwrap();

        assert_ne!(a, b);
        assert_eq!(face.registered().len(), 1);
        assert!(face.accepts(&"/sync/ab".parse().unwrap()));
        assert!(!face.accepts(&"/other".parse().unwrap()));

        let actions = face.take_actions();
        assert_eq!(actions.len(), 3);
        assert!(matches!(actions[0], FaceAction::Express(id, _) if id == a));
        assert!(matches!(actions[2], FaceAction::Send(ChannelId(3), _)));
        assert!(face.take_actions().is_empty());
    }
}
