//! Tokio-hosted node.
//!
//! A [`Node`] runs one [`SyncEngine`] inside a tokio task. Application calls
//! reach the task through a cloneable [`NodeHandle`]; learned producer states
//! come back as [`SyncEvent`]s. The task owns the engine, the link and a
//! deadline table, and reacts to whichever of command, packet or deadline
//! comes first.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

use chronosync_core::{ChannelId, Clock, Fingerprint, Name, Signer, UpdateRecord};
use chronosync_sync::{
    EngineState, FaceAction, ProducerState, QueueFace, RequestId, SyncEngine, SyncError,
    SyncObserver,
};

use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::link::{Link, Packet};

/// Lifetime given to a request expressed without one.
const DEFAULT_REQUEST_LIFETIME: Duration = Duration::from_secs(4);

/// Milliseconds since creation, measured on tokio's clock so that paused
/// runtimes drive content expiry too.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_millis()).unwrap_or(i64::MAX)
    }
}

/// What a node reports to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The node joined its sync group.
    Initialized,
    /// New producer states arrived.
    State {
        records: Vec<UpdateRecord>,
        is_recovery: bool,
    },
}

struct EventForwarder(mpsc::UnboundedSender<SyncEvent>);

impl SyncObserver for EventForwarder {
    fn on_received_sync_state(&mut self, records: &[UpdateRecord], is_recovery: bool) {
        let _ = self.0.send(SyncEvent::State {
            records: records.to_vec(),
            is_recovery,
        });
    }

    fn on_initialized(&mut self) {
        let _ = self.0.send(SyncEvent::Initialized);
    }
}

/// Point-in-time view of a node.
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub sequence_no: i64,
    pub session_no: i64,
    pub root: Fingerprint,
    pub state: EngineState,
    pub producers: Vec<ProducerState>,
    pub pending_requests: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────────────────────────

enum NodeCommand {
    Publish {
        resp: oneshot::Sender<std::result::Result<i64, SyncError>>,
    },
    Status {
        resp: oneshot::Sender<NodeStatus>,
    },
    ProducerSequenceNo {
        prefix: Name,
        session: i64,
        resp: oneshot::Sender<Option<i64>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// An expressed request or local timer waiting for its outcome.
struct Waiting {
    deadline: Instant,
    /// Request name; `None` for local timers.
    interest: Option<Name>,
}

struct NodeActor<L: Link, S: Signer> {
    engine: SyncEngine<QueueFace, S>,
    link: L,
    rx: mpsc::Receiver<NodeCommand>,
    /// Ordered by id, so the earliest expressed request matches first.
    waiting: BTreeMap<RequestId, Waiting>,
}

impl<L: Link, S: Signer> NodeActor<L, S> {
    async fn run(mut self) {
        loop {
            self.flush().await;
            let next = self.waiting.values().map(|w| w.deadline).min();

            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => {
                        if !self.handle_command(cmd) {
                            break;
                        }
                    }
                    None => {
                        self.engine.shutdown();
                        break;
                    }
                },
                packet = self.link.recv() => match packet {
                    Some((from, packet)) => {
                        if let Err(e) = self.handle_packet(from, packet) {
                            tracing::error!("sync engine failed: {}", e);
                            self.engine.shutdown();
                            break;
                        }
                    }
                    None => {
                        tracing::debug!("link closed");
                        self.engine.shutdown();
                        break;
                    }
                },
                _ = sleep_until_next(next) => {
                    if let Err(e) = self.fire_expired() {
                        tracing::error!("sync engine failed: {}", e);
                        self.engine.shutdown();
                        break;
                    }
                }
            }
        }
    }

    /// Carry out everything the engine queued on its face.
    async fn flush(&mut self) {
        let actions = self.engine.face_mut().take_actions();
        for action in actions {
            match action {
                FaceAction::Express(id, request) => {
                    let lifetime = request.lifetime.unwrap_or(DEFAULT_REQUEST_LIFETIME);
                    self.waiting.insert(
                        id,
                        Waiting {
                            deadline: Instant::now() + lifetime,
                            interest: Some(request.name.clone()),
                        },
                    );
                    if let Err(e) = self.link.broadcast(Packet::Request(request)).await {
                        tracing::warn!(%id, "failed to broadcast request: {}", e);
                    }
                }
                FaceAction::Schedule(id, delay) => {
                    self.waiting.insert(
                        id,
                        Waiting {
                            deadline: Instant::now() + delay,
                            interest: None,
                        },
                    );
                }
                FaceAction::Send(channel, response) => {
                    let name = response.name.clone();
                    if let Err(e) = self.link.send(channel, Packet::Response(response)).await {
                        tracing::warn!(%name, %channel, "failed to send response: {}", e);
                    }
                }
            }
        }
    }

    /// Returns false once the node should stop.
    fn handle_command(&mut self, cmd: NodeCommand) -> bool {
        match cmd {
            NodeCommand::Publish { resp } => {
                let _ = resp.send(self.engine.publish());
            }
            NodeCommand::Status { resp } => {
                let _ = resp.send(self.status());
            }
            NodeCommand::ProducerSequenceNo {
                prefix,
                session,
                resp,
            } => {
                let _ = resp.send(self.engine.producer_sequence_no(&prefix, session));
            }
            NodeCommand::Shutdown { resp } => {
                self.engine.shutdown();
                let _ = resp.send(());
                return false;
            }
        }
        true
    }

    fn handle_packet(&mut self, from: ChannelId, packet: Packet) -> chronosync_sync::Result<()> {
        match packet {
            Packet::Request(request) => {
                if self.engine.face().accepts(&request.name) {
                    self.engine.on_incoming_request(&request, from);
                }
            }
            Packet::Response(response) => {
                let matched = self
                    .waiting
                    .iter()
                    .find(|(_, w)| {
                        w.interest
                            .as_ref()
                            .is_some_and(|name| name.is_prefix_of(&response.name))
                    })
                    .map(|(id, _)| *id);

                match matched {
                    Some(id) => {
                        self.waiting.remove(&id);
                        self.engine.on_response(id, &response)?;
                    }
                    None => tracing::debug!(name = %response.name, "unsolicited response dropped"),
                }
            }
        }
        Ok(())
    }

    fn fire_expired(&mut self) -> chronosync_sync::Result<()> {
        let now = Instant::now();
        let mut expired: Vec<(Instant, RequestId)> = self
            .waiting
            .iter()
            .filter(|(_, w)| w.deadline <= now)
            .map(|(id, w)| (w.deadline, *id))
            .collect();
        expired.sort();

        for (_, id) in expired {
            self.waiting.remove(&id);
            self.engine.on_timeout(id)?;
        }
        Ok(())
    }

    fn status(&self) -> NodeStatus {
        NodeStatus {
            sequence_no: self.engine.sequence_no(),
            session_no: self.engine.session_no(),
            root: self.engine.root().clone(),
            state: self.engine.state(),
            producers: self.engine.digest_tree().iter().cloned().collect(),
            pending_requests: self.engine.pending_requests().len(),
        }
    }
}

async fn sleep_until_next(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// A running node: its handle and its event stream.
pub struct Node {
    pub handle: NodeHandle,
    pub events: mpsc::UnboundedReceiver<SyncEvent>,
}

impl Node {
    /// Start a node on `link` and begin bootstrapping.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<L, S>(config: NodeConfig, link: L, signer: S) -> Result<Self>
    where
        L: Link + 'static,
        S: Signer + Send + 'static,
    {
        let (events_tx, events) = mpsc::unbounded_channel();
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());

        let mut engine = SyncEngine::new(
            config.sync,
            QueueFace::new(),
            signer,
            Box::new(EventForwarder(events_tx)),
            clock,
        );
        engine.initialize()?;

        let (tx, rx) = mpsc::channel(config.command_buffer);
        let actor = NodeActor {
            engine,
            link,
            rx,
            waiting: BTreeMap::new(),
        };
        tokio::spawn(actor.run());

        Ok(Self {
            handle: NodeHandle { tx },
            events,
        })
    }
}

/// Cloneable handle to a running node.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    tx: mpsc::Sender<NodeCommand>,
}

impl NodeHandle {
    /// Publish the next local sequence number.
    pub async fn publish(&self) -> Result<i64> {
        let seq = self.request(|resp| NodeCommand::Publish { resp }).await??;
        Ok(seq)
    }

    pub async fn status(&self) -> Result<NodeStatus> {
        self.request(|resp| NodeCommand::Status { resp }).await
    }

    /// Last known sequence number of a producer.
    pub async fn producer_sequence_no(&self, prefix: &Name, session: i64) -> Result<Option<i64>> {
        let prefix = prefix.clone();
        self.request(|resp| NodeCommand::ProducerSequenceNo {
            prefix,
            session,
            resp,
        })
        .await
    }

    /// Shut the engine down and stop the node task.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|resp| NodeCommand::Shutdown { resp }).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> NodeCommand) -> Result<T> {
        let (resp, rx) = oneshot::channel();
        self.tx
            .send(make(resp))
            .await
            .map_err(|_| NodeError::Stopped)?;
        rx.await.map_err(|_| NodeError::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = TokioClock::new();
        assert_eq!(clock.now_millis(), 0);
        tokio::time::advance(Duration::from_millis(1_500)).await;
        assert_eq!(clock.now_millis(), 1_500);
    }
}
