//! Test fixtures and helpers.
//!
//! Common setup code for engine and scenario tests.

use std::sync::{Arc, Mutex, MutexGuard};

use chronosync_core::{Ed25519Signer, Keypair, ManualClock, Name, UpdateRecord};
use chronosync_sync::{Face, SyncConfig, SyncEngine, SyncObserver};

/// Broadcast prefix shared by every fixture engine.
pub const BROADCAST_PREFIX: &str = "/ndn/broadcast/chronosync-test";

/// Everything an observer was told, in order.
#[derive(Debug, Clone, Default)]
pub struct Recorded {
    /// Each delivered batch with its recovery flag.
    pub states: Vec<(Vec<UpdateRecord>, bool)>,
    /// How many times `on_initialized` fired.
    pub initialized: usize,
}

/// Observer that records every callback. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of everything recorded so far.
    pub fn recorded(&self) -> Recorded {
        self.lock().clone()
    }

    pub fn initialized_count(&self) -> usize {
        self.lock().initialized
    }

    /// Every delivered record, flattened in delivery order.
    pub fn records(&self) -> Vec<UpdateRecord> {
        self.lock()
            .states
            .iter()
            .flat_map(|(records, _)| records.iter().cloned())
            .collect()
    }

    /// Whether `(prefix, session, seq)` was delivered in any batch.
    pub fn saw(&self, prefix: &Name, session: i64, seq: i64) -> bool {
        self.delivery_of(prefix, session, seq).is_some()
    }

    /// Recovery flag of the first batch that carried `(prefix, session, seq)`.
    pub fn delivery_of(&self, prefix: &Name, session: i64, seq: i64) -> Option<bool> {
        self.lock().states.iter().find_map(|(records, is_recovery)| {
            records
                .iter()
                .any(|r| &r.producer_prefix == prefix && r.session == session && r.seq == seq)
                .then_some(*is_recovery)
        })
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        *self.lock() = Recorded::default();
    }
}

impl SyncObserver for RecordingObserver {
    fn on_received_sync_state(&mut self, records: &[UpdateRecord], is_recovery: bool) {
        self.lock().states.push((records.to_vec(), is_recovery));
    }

    fn on_initialized(&mut self) {
        self.lock().initialized += 1;
    }
}

/// Parse a name, panicking on malformed input.
pub fn name(uri: &str) -> Name {
    uri.parse()
        .unwrap_or_else(|e| panic!("bad test name {:?}: {}", uri, e))
}

/// An update record from a URI.
pub fn record(prefix: &str, session: i64, seq: i64) -> UpdateRecord {
    UpdateRecord::new(name(prefix), session, seq)
}

/// Engine configuration under [`BROADCAST_PREFIX`].
pub fn sync_config(app_prefix: &str, session: i64) -> SyncConfig {
    SyncConfig::new(name(BROADCAST_PREFIX), name(app_prefix), session)
}

/// Deterministic signer from a one-byte seed.
pub fn signer(seed: u8) -> Ed25519Signer {
    Ed25519Signer::new(Keypair::from_seed(&[seed; 32]))
}

/// An engine wired to a recording observer and a shared manual clock.
pub struct EngineFixture<F: Face> {
    pub engine: SyncEngine<F, Ed25519Signer>,
    pub observer: RecordingObserver,
    pub clock: ManualClock,
}

impl<F: Face> EngineFixture<F> {
    /// Create an engine for `app_prefix`, not yet initialized.
    pub fn new(config: SyncConfig, face: F, seed: u8, clock: ManualClock) -> Self {
        let observer = RecordingObserver::new();
        let engine = SyncEngine::new(
            config,
            face,
            signer(seed),
            Box::new(observer.clone()),
            Arc::new(clock.clone()),
        );
        Self {
            engine,
            observer,
            clock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronosync_sync::{EngineState, FaceAction, QueueFace};

    #[test]
    fn test_observer_clones_share_record() {
        let observer = RecordingObserver::new();
        let mut boxed: Box<dyn SyncObserver> = Box::new(observer.clone());

        boxed.on_initialized();
        boxed.on_received_sync_state(&[record("/a", 1, 2)], true);
        boxed.on_received_sync_state(&[record("/a", 1, 3)], false);

        assert_eq!(observer.initialized_count(), 1);
        assert_eq!(observer.records().len(), 2);
        assert_eq!(observer.delivery_of(&name("/a"), 1, 2), Some(true));
        assert_eq!(observer.delivery_of(&name("/a"), 1, 3), Some(false));
        assert!(!observer.saw(&name("/a"), 2, 3));

        observer.clear();
        assert!(observer.recorded().states.is_empty());
    }

    #[test]
    fn test_engine_fixture_starts_bootstrapping() {
        let mut fixture =
            EngineFixture::new(sync_config("/app/a", 1), QueueFace::new(), 1, ManualClock::new(0));
        assert_eq!(fixture.engine.state(), EngineState::Bootstrapping);

        fixture.engine.initialize().unwrap();
        let actions = fixture.engine.face_mut().take_actions();
        assert!(matches!(
            &actions[..],
            [FaceAction::Express(_, request)] if request.name == name(BROADCAST_PREFIX).append("00")
        ));
    }
}
