//! Deterministic multi-node simulator.
//!
//! A [`SimNetwork`] hosts several [`SyncEngine`]s on [`QueueFace`]s and a
//! shared [`ManualClock`]. Delivery is instantaneous and strictly FIFO:
//!
//! - an expressed request reaches every other online node whose face has
//!   registered a matching prefix, on channel `ChannelId(sender index)`;
//! - a response goes back to the node named by its channel and satisfies
//!   that node's earliest outstanding request whose name prefixes it;
//! - timers and request lifetimes only fire inside [`SimNetwork::advance`],
//!   in deadline order.
//!
//! An offline node keeps its timers but neither sends nor receives.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chronosync_core::{
    deadline_after, ChannelId, Clock, Ed25519Signer, Fingerprint, ManualClock, Name, Request,
    Response,
};
use chronosync_sync::{
    EngineState, FaceAction, QueueFace, RequestId, Result, SyncConfig, SyncEngine,
};

use crate::fixtures::{signer, sync_config, RecordingObserver};

/// Lifetime given to a request expressed without one.
const DEFAULT_REQUEST_LIFETIME: Duration = Duration::from_secs(4);

/// Deliveries allowed within one instant before the run is declared stuck.
const MAX_DELIVERIES: usize = 100_000;

/// Engine type hosted by the simulator.
pub type SimEngine = SyncEngine<QueueFace, Ed25519Signer>;

/// Packet counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub requests: usize,
    pub responses: usize,
    /// Responses that matched no outstanding request.
    pub unsolicited: usize,
    /// Packets lost to an offline sender or receiver.
    pub dropped: usize,
}

struct Waiting {
    deadline: i64,
    interest: Option<Name>,
}

/// One hosted engine.
pub struct SimNode {
    pub engine: SimEngine,
    pub observer: RecordingObserver,
    online: bool,
    waiting: BTreeMap<RequestId, Waiting>,
}

impl SimNode {
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Outstanding requests and timers.
    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }
}

enum InFlight {
    Request {
        from: usize,
        to: usize,
        request: Request,
    },
    Response {
        to: usize,
        response: Response,
    },
}

/// A simulated broadcast network.
pub struct SimNetwork {
    clock: ManualClock,
    nodes: Vec<SimNode>,
    queue: VecDeque<InFlight>,
    stats: SimStats,
}

impl Default for SimNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl SimNetwork {
    /// Empty network at time 0.
    pub fn new() -> Self {
        Self {
            clock: ManualClock::new(0),
            nodes: Vec::new(),
            queue: VecDeque::new(),
            stats: SimStats::default(),
        }
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn stats(&self) -> SimStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> &SimNode {
        &self.nodes[index]
    }

    pub fn engine(&self, index: usize) -> &SimEngine {
        &self.nodes[index].engine
    }

    pub fn engine_mut(&mut self, index: usize) -> &mut SimEngine {
        &mut self.nodes[index].engine
    }

    pub fn observer(&self, index: usize) -> &RecordingObserver {
        &self.nodes[index].observer
    }

    /// Add an engine with the given configuration. It is not initialized.
    pub fn add_node(&mut self, config: SyncConfig, seed: u8) -> usize {
        let observer = RecordingObserver::new();
        let engine = SyncEngine::new(
            config,
            QueueFace::new(),
            signer(seed),
            Box::new(observer.clone()),
            Arc::new(self.clock.clone()),
        );
        self.nodes.push(SimNode {
            engine,
            observer,
            online: true,
            waiting: BTreeMap::new(),
        });
        self.nodes.len() - 1
    }

    /// Add an engine for `app_prefix` with default timings.
    pub fn add_producer(&mut self, app_prefix: &str, session: i64) -> usize {
        let seed = u8::try_from(self.nodes.len() + 1).unwrap_or(u8::MAX);
        self.add_node(sync_config(app_prefix, session), seed)
    }

    /// Start a node's discovery and deliver whatever follows.
    pub fn initialize(&mut self, index: usize) -> Result<()> {
        self.nodes[index].engine.initialize()?;
        self.run_until_quiet()
    }

    /// Add, initialize and wait out the discovery lifetime, so the node
    /// has joined whether or not anyone answered.
    pub fn join(&mut self, app_prefix: &str, session: i64) -> Result<usize> {
        let index = self.add_producer(app_prefix, session);
        self.initialize(index)?;
        let lifetime = self.nodes[index].engine.config().initial_lifetime;
        self.advance(lifetime)?;
        Ok(index)
    }

    /// Publish on a node and deliver whatever follows.
    pub fn publish(&mut self, index: usize) -> Result<i64> {
        let seq = self.nodes[index].engine.publish()?;
        self.run_until_quiet()?;
        Ok(seq)
    }

    pub fn shutdown(&mut self, index: usize) {
        self.nodes[index].engine.shutdown();
    }

    /// Take a node off the network or bring it back.
    pub fn set_online(&mut self, index: usize, online: bool) {
        self.nodes[index].online = online;
    }

    /// Hand `response` to node `to` as if it came off the network.
    ///
    /// Returns whether it matched an outstanding request.
    pub fn inject_response(&mut self, to: usize, response: Response) -> Result<bool> {
        let matched = self.deliver_response(to, &response)?;
        self.run_until_quiet()?;
        Ok(matched)
    }

    /// Deliver queued packets until nothing is left in flight.
    ///
    /// # Panics
    ///
    /// Panics if the nodes keep talking without time moving.
    pub fn run_until_quiet(&mut self) -> Result<()> {
        let mut delivered = 0;
        loop {
            for index in 0..self.nodes.len() {
                self.flush(index);
            }
            let Some(packet) = self.queue.pop_front() else {
                return Ok(());
            };
            self.deliver(packet)?;

            delivered += 1;
            assert!(
                delivered <= MAX_DELIVERIES,
                "network did not settle after {} deliveries at t={}",
                MAX_DELIVERIES,
                self.now_millis()
            );
        }
    }

    /// Move time forward by `by`, firing every deadline on the way in order.
    pub fn advance(&mut self, by: Duration) -> Result<()> {
        let target = deadline_after(self.now_millis(), by);
        self.run_until_quiet()?;

        while let Some((deadline, index, id)) = self.next_deadline() {
            if deadline > target {
                break;
            }
            self.clock.set(deadline.max(self.now_millis()));
            self.nodes[index].waiting.remove(&id);
            self.nodes[index].engine.on_timeout(id)?;
            self.run_until_quiet()?;
        }

        self.clock.set(target);
        Ok(())
    }

    /// Whether every running online node has the same root.
    pub fn converged(&self) -> bool {
        let mut roots = self.running().map(|n| n.engine.root());
        match roots.next() {
            Some(first) => roots.all(|r| r == first),
            None => true,
        }
    }

    /// Root of every node, by index.
    pub fn roots(&self) -> Vec<Fingerprint> {
        self.nodes.iter().map(|n| n.engine.root().clone()).collect()
    }

    fn running(&self) -> impl Iterator<Item = &SimNode> {
        self.nodes
            .iter()
            .filter(|n| n.online && n.engine.state() != EngineState::Disabled)
    }

    fn next_deadline(&self) -> Option<(i64, usize, RequestId)> {
        self.nodes
            .iter()
            .enumerate()
            .flat_map(|(index, node)| {
                node.waiting
                    .iter()
                    .map(move |(id, w)| (w.deadline, index, *id))
            })
            .min()
    }

    /// Carry out everything node `index` queued on its face.
    fn flush(&mut self, index: usize) {
        let now = self.now_millis();
        let actions = self.nodes[index].engine.face_mut().take_actions();
        for action in actions {
            match action {
                FaceAction::Express(id, request) => {
                    let lifetime = request.lifetime.unwrap_or(DEFAULT_REQUEST_LIFETIME);
                    self.nodes[index].waiting.insert(
                        id,
                        Waiting {
                            deadline: deadline_after(now, lifetime),
                            interest: Some(request.name.clone()),
                        },
                    );
                    self.broadcast(index, request);
                }
                FaceAction::Schedule(id, delay) => {
                    self.nodes[index].waiting.insert(
                        id,
                        Waiting {
                            deadline: deadline_after(now, delay),
                            interest: None,
                        },
                    );
                }
                FaceAction::Send(channel, response) => {
                    if !self.nodes[index].online {
                        self.stats.dropped += 1;
                        continue;
                    }
                    match usize::try_from(channel.0) {
                        Ok(to) if to < self.nodes.len() => {
                            self.queue.push_back(InFlight::Response { to, response });
                        }
                        _ => self.stats.dropped += 1,
                    }
                }
            }
        }
    }

    fn broadcast(&mut self, from: usize, request: Request) {
        if !self.nodes[from].online {
            self.stats.dropped += 1;
            return;
        }
        for to in 0..self.nodes.len() {
            if to != from && self.nodes[to].engine.face().accepts(&request.name) {
                self.queue.push_back(InFlight::Request {
                    from,
                    to,
                    request: request.clone(),
                });
            }
        }
    }

    fn deliver(&mut self, packet: InFlight) -> Result<()> {
        match packet {
            InFlight::Request { from, to, request } => {
                if !self.nodes[to].online {
                    self.stats.dropped += 1;
                    return Ok(());
                }
                self.stats.requests += 1;
                self.nodes[to]
                    .engine
                    .on_incoming_request(&request, ChannelId(from as u64));
                Ok(())
            }
            InFlight::Response { to, response } => {
                if !self.nodes[to].online {
                    self.stats.dropped += 1;
                    return Ok(());
                }
                self.deliver_response(to, &response).map(|_| ())
            }
        }
    }

    fn deliver_response(&mut self, to: usize, response: &Response) -> Result<bool> {
        self.stats.responses += 1;
        let node = &mut self.nodes[to];
        let matched = node
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
                node.waiting.remove(&id);
                node.engine.on_response(id, response)?;
                Ok(true)
            }
            None => {
                self.stats.unsolicited += 1;
                Ok(false)
            }
        }
    }
}

impl std::fmt::Debug for SimNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimNetwork")
            .field("now", &self.now_millis())
            .field("nodes", &self.nodes.iter().map(|n| &n.engine).collect::<Vec<_>>())
            .field("in_flight", &self.queue.len())
            .field("stats", &self.stats)
            .finish()
    }
}
