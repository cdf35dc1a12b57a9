//! Sync engine.
//!
//! Drives the ChronoSync protocol for one local producer. The engine owns the
//! digest tree, the digest log, the content store and the pending request
//! table, and talks to the network only through its [`Face`].
//!
//! ## Event model
//!
//! The engine never blocks. Every request it sends or timer it starts is
//! recorded in an outstanding table keyed by the [`RequestId`] the face
//! returned. The host delivers the outcome later:
//!
//! - [`SyncEngine::on_incoming_request`] - a request arrived on a channel
//! - [`SyncEngine::on_response`] - one of our requests was answered
//! - [`SyncEngine::on_timeout`] - one of our requests or timers expired
//!
//! An id that is not in the table is ignored, so late events after a renewal
//! or a shutdown are harmless.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chronosync_core::{
    CborCodec, ChannelId, Clock, Fingerprint, Name, Request, Response, Signer, SyncStateCodec,
    UpdateRecord,
};
use chronosync_store::{ContentStore, PendingRequestTable, DEFAULT_CLEANUP_INTERVAL};

use crate::digest_log::DigestLog;
use crate::digest_tree::DigestTree;
use crate::error::{Result, SyncError};
use crate::face::{Face, RequestId};
use crate::messages::{recovery_request_name, sync_request_name, SyncRequestKind};

/// Configuration for one sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Prefix every sync request is sent under.
    pub broadcast_prefix: Name,
    /// Prefix the local producer publishes under.
    pub application_prefix: Name,
    /// Incarnation of the local producer.
    pub session: i64,
    /// Lifetime of long-lived sync requests.
    pub sync_lifetime: Duration,
    /// Lifetime of the discovery request sent by `initialize`.
    pub initial_lifetime: Duration,
    /// How long an unknown fingerprint is given before asking for recovery.
    pub recovery_delay: Duration,
    /// Freshness of published sync responses. `None` keeps them forever.
    pub sync_response_freshness: Option<Duration>,
    /// Interval between content store cleanup passes.
    pub cleanup_interval: Duration,
}

impl SyncConfig {
    pub fn new(broadcast_prefix: Name, application_prefix: Name, session: i64) -> Self {
        Self {
            broadcast_prefix,
            application_prefix,
            session,
            sync_lifetime: Duration::from_secs(5),
            initial_lifetime: Duration::from_secs(1),
            recovery_delay: Duration::from_secs(2),
            sync_response_freshness: None,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }

    pub fn with_sync_lifetime(mut self, lifetime: Duration) -> Self {
        self.sync_lifetime = lifetime;
        self
    }

    pub fn with_initial_lifetime(mut self, lifetime: Duration) -> Self {
        self.initial_lifetime = lifetime;
        self
    }

    pub fn with_recovery_delay(mut self, delay: Duration) -> Self {
        self.recovery_delay = delay;
        self
    }

    pub fn with_sync_response_freshness(mut self, freshness: Duration) -> Self {
        self.sync_response_freshness = Some(freshness);
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

/// Receives what the engine learns.
pub trait SyncObserver: Send {
    /// New producer states arrived. `is_recovery` is set when they came from
    /// a full-state answer rather than a regular update.
    fn on_received_sync_state(&mut self, records: &[UpdateRecord], is_recovery: bool);

    /// Called exactly once, when the engine has joined the group.
    fn on_initialized(&mut self);
}

/// Where the engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    /// Waiting for the discovery request to be answered or time out.
    Bootstrapping,
    /// Joined, with one long-lived request outstanding.
    Steady,
    /// An unknown fingerprint was seen; waiting to judge it.
    RecoveryPending,
    /// A recovery request is outstanding.
    Recovering,
    /// Shut down. Every entry point is a no-op.
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum OutstandingKind {
    /// The discovery request `<prefix>/00`.
    Initial,
    /// A long-lived request for our root.
    Sync,
    /// `<prefix>/recovery/<digest>`.
    Recovery,
    /// Timer giving an unknown fingerprint time to show up in our log.
    JudgeRecovery {
        digest: Fingerprint,
        channel: ChannelId,
    },
}

#[derive(Debug, Clone)]
struct Outstanding {
    kind: OutstandingKind,
    /// Request name. For a judgement timer, the name of the request being
    /// judged.
    name: Name,
}

/// One participant in a sync group.
pub struct SyncEngine<F: Face, S: Signer> {
    config: SyncConfig,
    face: F,
    signer: S,
    codec: Box<dyn SyncStateCodec>,
    observer: Box<dyn SyncObserver>,
    clock: Arc<dyn Clock>,

    tree: DigestTree,
    log: DigestLog,
    store: ContentStore,
    pending: PendingRequestTable,
    outstanding: HashMap<RequestId, Outstanding>,

    /// Local sequence number. -1 until the engine has joined.
    sequence_no: i64,
    initialized: bool,
    disabled: bool,
}

impl<F: Face, S: Signer> SyncEngine<F, S> {
    /// Create an engine. Nothing is sent until [`initialize`](Self::initialize).
    pub fn new(
        config: SyncConfig,
        face: F,
        signer: S,
        observer: Box<dyn SyncObserver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = ContentStore::new(Arc::clone(&clock), config.cleanup_interval);
        Self {
            config,
            face,
            signer,
            codec: Box::new(CborCodec),
            observer,
            clock,
            tree: DigestTree::new(),
            log: DigestLog::new(),
            store,
            pending: PendingRequestTable::new(),
            outstanding: HashMap::new(),
            sequence_no: -1,
            initialized: false,
            disabled: false,
        }
    }

    /// Replace the sync payload codec.
    pub fn with_codec(mut self, codec: Box<dyn SyncStateCodec>) -> Self {
        self.codec = codec;
        self
    }

    // ─────────────────────────────────────────────────────────────────────
    // Application calls
    // ─────────────────────────────────────────────────────────────────────

    /// Register the broadcast prefix and send the discovery request.
    pub fn initialize(&mut self) -> Result<()> {
        if self.disabled || self.initialized {
            return Ok(());
        }

        self.face
            .register_prefix(&self.config.broadcast_prefix)
            .map_err(SyncError::Registration)?;

        self.express_initial();
        tracing::info!(
            prefix = %self.config.application_prefix,
            session = self.config.session,
            "sync engine bootstrapping"
        );
        Ok(())
    }

    /// Publish the next local sequence number. Returns it.
    pub fn publish(&mut self) -> Result<i64> {
        if self.disabled {
            return Err(SyncError::Disabled);
        }
        if !self.initialized {
            return Err(SyncError::NotInitialized);
        }

        // Peers waiting on us hold the current root.
        let announce_as = self.tree.root().clone();
        self.sequence_no += 1;
        self.commit_local(&announce_as)?;
        self.express_sync_request();

        tracing::debug!(seq = self.sequence_no, root = %self.tree.root(), "published");
        Ok(self.sequence_no)
    }

    /// Stop reacting to anything. Outstanding requests are left to expire.
    pub fn shutdown(&mut self) {
        if !self.disabled {
            self.disabled = true;
            tracing::info!(prefix = %self.config.application_prefix, "sync engine shut down");
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Network events
    // ─────────────────────────────────────────────────────────────────────

    /// Handle a request delivered on `channel`.
    ///
    /// The content store gets the first chance to answer it.
    pub fn on_incoming_request(&mut self, request: &Request, channel: ChannelId) {
        if self.disabled {
            return;
        }
        if self.store.answer(request, channel, &mut self.face) {
            tracing::debug!(name = %request.name, %channel, "answered from content store");
            return;
        }
        self.on_incoming_sync_request(request, channel);
    }

    /// Handle a sync request the content store could not answer.
    pub fn on_incoming_sync_request(&mut self, request: &Request, channel: ChannelId) {
        if self.disabled {
            return;
        }

        let Some(kind) = SyncRequestKind::classify(&self.config.broadcast_prefix, &request.name)
        else {
            tracing::debug!(name = %request.name, "ignoring request outside the sync namespace");
            return;
        };

        match kind {
            SyncRequestKind::Newcomer => {
                self.send_snapshot(&request.name, channel);
            }
            SyncRequestKind::Recovery(digest) => {
                if self.log.find(&digest).is_some() {
                    self.send_snapshot(&request.name, channel);
                } else {
                    tracing::debug!(%digest, "recovery request for unknown digest");
                }
            }
            SyncRequestKind::Sync(digest) if &digest == self.tree.root() => {
                let now = self.clock.now_millis();
                let expired = self.pending.remove_expired(now);
                if expired > 0 {
                    tracing::debug!(expired, "dropped expired parked requests");
                }
                self.pending.insert(request.clone(), channel, now);
                tracing::debug!(name = %request.name, %channel, "parked sync request");
            }
            SyncRequestKind::Sync(digest) => match self.log.find(&digest) {
                Some(index) => {
                    let diff = self.log.diff_since(index, &self.tree);
                    self.send_records(&request.name, &diff, channel);
                }
                None => {
                    let id = self.face.schedule(self.config.recovery_delay);
                    tracing::debug!(%digest, timer = %id, "unknown digest, judging later");
                    self.outstanding.insert(
                        id,
                        Outstanding {
                            kind: OutstandingKind::JudgeRecovery { digest, channel },
                            name: request.name.clone(),
                        },
                    );
                }
            },
        }
    }

    /// Handle the answer to one of our requests.
    pub fn on_response(&mut self, id: RequestId, response: &Response) -> Result<()> {
        if self.disabled {
            return Ok(());
        }
        let Some(outstanding) = self.outstanding.remove(&id) else {
            return Ok(());
        };
        if let OutstandingKind::JudgeRecovery { .. } = outstanding.kind {
            tracing::debug!(%id, "response for a local timer ignored");
            return Ok(());
        }

        let records = match self.codec.decode(&response.payload) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(name = %response.name, "malformed sync payload: {}", e);
                self.reissue(&outstanding.kind);
                return Ok(());
            }
        };

        let mut is_recovery = outstanding.kind == OutstandingKind::Recovery;

        if self.tree.root().is_bootstrap() {
            if !records.iter().any(|r| r.is_update()) {
                tracing::warn!(name = %response.name, "sync answer carried no producer state");
                self.reissue(&outstanding.kind);
                return Ok(());
            }
            self.merge(&records);
            self.join_from(&records)?;
            is_recovery = true;
        } else {
            self.merge(&records);
        }

        let updates: Vec<UpdateRecord> = records.into_iter().filter(|r| r.is_update()).collect();
        if !updates.is_empty() {
            self.observer.on_received_sync_state(&updates, is_recovery);
        }

        self.express_sync_request();
        Ok(())
    }

    /// Handle the expiry of one of our requests or timers.
    pub fn on_timeout(&mut self, id: RequestId) -> Result<()> {
        if self.disabled {
            return Ok(());
        }
        let Some(outstanding) = self.outstanding.remove(&id) else {
            return Ok(());
        };

        match outstanding.kind {
            OutstandingKind::Initial if self.initialized => {
                tracing::debug!(name = %outstanding.name, "discovery timed out after joining");
            }
            OutstandingKind::Initial => self.initial_timeout()?,
            OutstandingKind::Sync => {
                if outstanding.name == self.root_request_name() {
                    self.express_sync_request();
                } else {
                    tracing::debug!(name = %outstanding.name, "dropping stale sync request");
                }
            }
            OutstandingKind::Recovery => {
                tracing::debug!(name = %outstanding.name, "recovery request timed out");
            }
            OutstandingKind::JudgeRecovery { digest, channel } => {
                self.judge_recovery(digest, &outstanding.name, channel);
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    /// Local sequence number, -1 before joining.
    pub fn sequence_no(&self) -> i64 {
        self.sequence_no
    }

    pub fn session_no(&self) -> i64 {
        self.config.session
    }

    /// Last known sequence number of a producer, if any.
    pub fn producer_sequence_no(&self, producer_prefix: &Name, session: i64) -> Option<i64> {
        self.tree.seq_of(producer_prefix, session)
    }

    pub fn root(&self) -> &Fingerprint {
        self.tree.root()
    }

    pub fn digest_tree(&self) -> &DigestTree {
        &self.tree
    }

    pub fn digest_log(&self) -> &DigestLog {
        &self.log
    }

    pub fn pending_requests(&self) -> &PendingRequestTable {
        &self.pending
    }

    pub fn content_store(&self) -> &ContentStore {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn state(&self) -> EngineState {
        if self.disabled {
            return EngineState::Disabled;
        }
        if !self.initialized {
            return EngineState::Bootstrapping;
        }
        let kinds = || self.outstanding.values().map(|o| &o.kind);
        if kinds().any(|k| *k == OutstandingKind::Recovery) {
            EngineState::Recovering
        } else if kinds().any(|k| matches!(k, OutstandingKind::JudgeRecovery { .. })) {
            EngineState::RecoveryPending
        } else {
            EngineState::Steady
        }
    }

    pub fn face(&self) -> &F {
        &self.face
    }

    pub fn face_mut(&mut self) -> &mut F {
        &mut self.face
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn root_request_name(&self) -> Name {
        sync_request_name(&self.config.broadcast_prefix, self.tree.root())
    }

    fn express(&mut self, kind: OutstandingKind, name: Name, lifetime: Duration) -> RequestId {
        let request = Request::new(name.clone()).with_lifetime(lifetime);
        let id = self.face.express_request(request);
        tracing::debug!(%name, %id, "expressed request");
        self.outstanding.insert(id, Outstanding { kind, name });
        id
    }

    fn express_initial(&mut self) {
        let name = sync_request_name(&self.config.broadcast_prefix, &Fingerprint::bootstrap());
        self.express(OutstandingKind::Initial, name, self.config.initial_lifetime);
    }

    /// Ask for updates to the current root unless that request is already out.
    fn express_sync_request(&mut self) {
        let name = self.root_request_name();
        let already_out = self
            .outstanding
            .values()
            .any(|o| o.kind == OutstandingKind::Sync && o.name == name);
        if !already_out {
            self.express(OutstandingKind::Sync, name, self.config.sync_lifetime);
        }
    }

    fn reissue(&mut self, kind: &OutstandingKind) {
        match kind {
            OutstandingKind::Initial => self.express_initial(),
            // While bootstrapping the discovery request is still outstanding.
            OutstandingKind::Sync | OutstandingKind::Recovery if self.initialized => {
                self.express_sync_request()
            }
            OutstandingKind::Sync | OutstandingKind::Recovery => {}
            OutstandingKind::JudgeRecovery { .. } => {}
        }
    }

    /// Apply received records and log the new root.
    fn merge(&mut self, records: &[UpdateRecord]) {
        if self.tree.update(records) {
            let updates = records.iter().filter(|r| r.is_update()).cloned().collect();
            self.log.append(self.tree.root().clone(), updates);
        }

        let prefix = &self.config.application_prefix;
        let session = self.config.session;
        for record in records.iter().filter(|r| r.is_update()) {
            if &record.producer_prefix == prefix && record.session == session {
                self.sequence_no = self.sequence_no.max(record.seq);
            }
        }
    }

    /// First answer to our discovery request: pick our starting sequence
    /// and announce it to the group.
    fn join_from(&mut self, records: &[UpdateRecord]) -> Result<()> {
        let prefix = &self.config.application_prefix;
        let previous = records
            .iter()
            .filter(|r| r.is_update() && &r.producer_prefix == prefix)
            .map(|r| r.seq)
            .max();
        self.sequence_no = previous.map_or(0, |seq| seq + 1);

        let announce_as = self.tree.root().clone();
        self.commit_local(&announce_as)?;
        self.mark_initialized();
        Ok(())
    }

    fn initial_timeout(&mut self) -> Result<()> {
        if self.sequence_no != -1 {
            return Err(SyncError::InvariantViolation(format!(
                "discovery timed out with local sequence {}",
                self.sequence_no
            )));
        }

        // Nobody answered: we are the only participant.
        self.sequence_no = 0;
        let updates = vec![self.local_record()];
        if self.tree.update(&updates) {
            self.log.append(self.tree.root().clone(), updates);
        }
        self.mark_initialized();
        self.express_sync_request();
        Ok(())
    }

    fn mark_initialized(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        self.outstanding.retain(|_, o| o.kind != OutstandingKind::Initial);
        tracing::info!(
            prefix = %self.config.application_prefix,
            seq = self.sequence_no,
            root = %self.tree.root(),
            "sync engine initialized"
        );
        self.observer.on_initialized();
    }

    fn local_record(&self) -> UpdateRecord {
        UpdateRecord::new(
            self.config.application_prefix.clone(),
            self.config.session,
            self.sequence_no,
        )
    }

    /// Apply the local sequence number, log it and publish it as a response
    /// named `<prefix>/<announce_as>`.
    fn commit_local(&mut self, announce_as: &Fingerprint) -> Result<()> {
        let updates = vec![self.local_record()];

        if !self.tree.update(&updates) {
            return Err(SyncError::InvariantViolation(format!(
                "local sequence {} did not change the digest tree",
                self.sequence_no
            )));
        }
        if !self.log.append(self.tree.root().clone(), updates.clone()) {
            return Err(SyncError::InvariantViolation(format!(
                "digest {} already logged",
                self.tree.root()
            )));
        }

        // Nobody can have asked for our state under the empty root.
        if announce_as.is_bootstrap() {
            tracing::debug!(seq = self.sequence_no, "not storing an answer for the empty root");
            return Ok(());
        }

        let payload = self.codec.encode(&updates)?;
        let name = sync_request_name(&self.config.broadcast_prefix, announce_as);
        let response = self.signed_response(name, payload);

        self.store.add(response.clone());
        let satisfied = self
            .store
            .satisfy_pending(&mut self.pending, &response, &mut self.face);
        tracing::debug!(name = %response.name, satisfied, "stored sync response");
        Ok(())
    }

    fn judge_recovery(&mut self, digest: Fingerprint, name: &Name, channel: ChannelId) {
        match self.log.find(&digest) {
            Some(_) if &digest == self.tree.root() => {
                tracing::debug!(%digest, "judged digest is our root");
            }
            Some(index) => {
                let diff = self.log.diff_since(index, &self.tree);
                self.send_records(name, &diff, channel);
            }
            None => {
                let recovery = recovery_request_name(&self.config.broadcast_prefix, &digest);
                let already_out = self
                    .outstanding
                    .values()
                    .any(|o| o.kind == OutstandingKind::Recovery && o.name == recovery);
                if !already_out {
                    tracing::debug!(%digest, "digest still unknown, requesting recovery");
                    self.express(OutstandingKind::Recovery, recovery, self.config.sync_lifetime);
                }
            }
        }
    }

    fn send_snapshot(&mut self, name: &Name, channel: ChannelId) {
        let snapshot = self.tree.snapshot();
        self.send_records(name, &snapshot, channel);
    }

    /// Encode, sign and send `records` on `channel`. Nothing is sent for an
    /// empty batch.
    fn send_records(&mut self, name: &Name, records: &[UpdateRecord], channel: ChannelId) {
        if records.is_empty() {
            return;
        }

        let payload = match self.codec.encode(records) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(%name, "failed to encode sync state: {}", e);
                return;
            }
        };

        let response = self.signed_response(name.clone(), payload);
        match self.face.send(channel, &response) {
            Ok(()) => tracing::debug!(%name, %channel, count = records.len(), "sent sync state"),
            Err(e) => tracing::warn!(%name, %channel, "failed to send sync state: {}", e),
        }
    }

    fn signed_response(&self, name: Name, payload: Vec<u8>) -> Response {
        let mut response = Response::new(name, payload);
        if let Some(freshness) = self.config.sync_response_freshness {
            response = response.with_freshness(freshness);
        }
        self.signer.sign(&mut response);
        response
    }
}

impl<F: Face, S: Signer> std::fmt::Debug for SyncEngine<F, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("prefix", &self.config.application_prefix)
            .field("session", &self.config.session)
            .field("sequence_no", &self.sequence_no)
            .field("root", self.tree.root())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
