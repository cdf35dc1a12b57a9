//! End-to-end protocol scenarios on the simulated network.

use std::sync::Arc;
use std::time::Duration;

use chronosync_core::{ChildSelector, ManualClock, Request, Response};
use chronosync_store::ContentStore;
use chronosync_sync::{EngineState, FaceAction, QueueFace, SyncError};
use chronosync_testkit::fixtures::{name, BROADCAST_PREFIX};
use chronosync_testkit::sim::SimNetwork;
use chronosync_testkit::vectors::all_vectors;

const SETTLE: Duration = Duration::from_secs(10);

/// Two producers that have already found each other.
fn two_node_network() -> (SimNetwork, usize, usize) {
    let mut net = SimNetwork::new();
    let a = net.join("/app/a", 1).unwrap();
    let b = net.add_producer("/app/b", 1);
    net.initialize(b).unwrap();
    net.advance(SETTLE).unwrap();
    assert!(net.converged());
    (net, a, b)
}

#[test]
fn test_sole_participant_initializes_alone() {
    let mut net = SimNetwork::new();
    let a = net.add_producer("/app/a", 1);
    net.initialize(a).unwrap();
    assert_eq!(net.engine(a).sequence_no(), -1);

    net.advance(Duration::from_secs(1)).unwrap();

    let engine = net.engine(a);
    assert!(engine.is_initialized());
    assert_eq!(engine.sequence_no(), 0);
    assert_eq!(engine.state(), EngineState::Steady);
    assert_eq!(engine.producer_sequence_no(&name("/app/a"), 1), Some(0));
    assert_eq!(engine.digest_log().len(), 2);
    assert_eq!(net.observer(a).initialized_count(), 1);
    assert!(net.observer(a).records().is_empty());

    let vectors = all_vectors().unwrap();
    let single = vectors.iter().find(|v| v.name == "single producer").unwrap();
    assert_eq!(engine.root(), &single.expected());
}

#[test]
fn test_two_producers_exchange_publications() {
    let mut net = SimNetwork::new();
    let a = net.join("/app/a", 1).unwrap();

    let b = net.add_producer("/app/b", 1);
    net.initialize(b).unwrap();
    assert!(net.engine(b).is_initialized());
    assert_eq!(net.engine(b).sequence_no(), 0);
    // Learned during bootstrap, so reported as recovery.
    assert_eq!(net.observer(b).delivery_of(&name("/app/a"), 1, 0), Some(true));

    net.advance(SETTLE).unwrap();
    assert!(net.converged());

    assert_eq!(net.publish(a).unwrap(), 1);

    assert_eq!(net.engine(b).producer_sequence_no(&name("/app/a"), 1), Some(1));
    assert_eq!(net.observer(b).delivery_of(&name("/app/a"), 1, 1), Some(false));
    assert!(net.converged());
}

#[test]
fn test_late_joiner_recovers_full_state() {
    let (mut net, a, b) = two_node_network();
    net.publish(a).unwrap();
    net.publish(a).unwrap();
    net.publish(b).unwrap();
    net.advance(SETTLE).unwrap();

    let c = net.add_producer("/app/c", 1);
    net.initialize(c).unwrap();

    let joiner = net.engine(c);
    assert!(joiner.is_initialized());
    assert_eq!(joiner.sequence_no(), 0);
    assert_eq!(joiner.producer_sequence_no(&name("/app/a"), 1), Some(2));
    assert_eq!(joiner.producer_sequence_no(&name("/app/b"), 1), Some(1));

    let observer = net.observer(c);
    assert_eq!(observer.delivery_of(&name("/app/a"), 1, 2), Some(true));
    assert_eq!(observer.delivery_of(&name("/app/b"), 1, 1), Some(true));
    // Only the first discovery answer is used.
    assert!(net.stats().unsolicited >= 1);

    net.advance(Duration::from_secs(15)).unwrap();
    assert!(net.converged());
    for i in [a, b, c] {
        assert_eq!(net.engine(i).digest_tree().len(), 3);
    }
}

#[test]
fn test_rightmost_child_selector() {
    let mut store = ContentStore::new(Arc::new(ManualClock::new(0)), Duration::from_secs(60));
    for uri in ["/a/b/a", "/a/b/c", "/a/b/b"] {
        store.add(Response::new(name(uri), &b"x"[..]));
    }

    let mut face = QueueFace::new();
    let request = Request::new(name("/a/b")).with_child_selector(ChildSelector::Rightmost);
    assert!(store.answer(&request, chronosync_core::ChannelId(7), &mut face));

    let actions = face.take_actions();
    assert!(matches!(
        &actions[..],
        [FaceAction::Send(_, response)] if response.name == name("/a/b/c")
    ));
}

#[test]
fn test_unknown_digest_escalates_to_recovery() {
    let mut net = SimNetwork::new();
    let a = net.join("/app/a", 1).unwrap();
    let b = net.add_producer("/app/b", 1);
    net.initialize(b).unwrap();

    // B's sync request names a digest A has never seen.
    assert_eq!(net.engine(a).state(), EngineState::RecoveryPending);
    assert!(!net.observer(a).saw(&name("/app/b"), 1, 0));

    net.advance(Duration::from_secs(2)).unwrap();

    assert_eq!(net.engine(a).state(), EngineState::Steady);
    assert_eq!(net.observer(a).delivery_of(&name("/app/b"), 1, 0), Some(true));
    assert!(net.converged());
}

#[test]
fn test_shut_down_engine_ignores_traffic() {
    let (mut net, a, b) = two_node_network();
    net.shutdown(b);
    assert_eq!(net.engine(b).state(), EngineState::Disabled);

    net.publish(a).unwrap();
    net.publish(a).unwrap();
    net.advance(SETTLE).unwrap();

    assert_eq!(net.engine(b).producer_sequence_no(&name("/app/a"), 1), Some(0));
    assert!(!net.observer(b).saw(&name("/app/a"), 1, 1));
    assert!(matches!(net.engine_mut(b).publish(), Err(SyncError::Disabled)));
    assert_ne!(net.engine(a).root(), net.engine(b).root());
}

#[test]
fn test_malformed_discovery_answer_is_retried() {
    let mut net = SimNetwork::new();
    let a = net.join("/app/a", 1).unwrap();
    net.set_online(a, false);

    let b = net.add_producer("/app/b", 1);
    net.initialize(b).unwrap();
    assert!(!net.engine(b).is_initialized());
    net.set_online(a, true);

    let garbage = Response::new(name(BROADCAST_PREFIX).append("00"), &b"not cbor"[..]);
    assert!(net.inject_response(b, garbage).unwrap());

    // The discovery request went out again and A answered it.
    assert!(net.engine(b).is_initialized());
    assert_eq!(net.engine(b).producer_sequence_no(&name("/app/a"), 1), Some(0));
}

#[test]
fn test_new_session_continues_sequence() {
    let (mut net, a, b) = two_node_network();
    net.publish(a).unwrap();
    net.publish(a).unwrap();
    net.advance(SETTLE).unwrap();
    assert_eq!(net.engine(b).producer_sequence_no(&name("/app/a"), 1), Some(2));

    net.shutdown(a);
    let a2 = net.add_producer("/app/a", 2);
    net.initialize(a2).unwrap();

    let engine = net.engine(a2);
    assert!(engine.is_initialized());
    assert_eq!(engine.sequence_no(), 3);
    assert_eq!(engine.producer_sequence_no(&name("/app/a"), 2), Some(3));
    assert_eq!(engine.producer_sequence_no(&name("/app/a"), 1), Some(2));
}

#[test]
fn test_concurrent_publications_converge() {
    let (mut net, a, b) = two_node_network();
    let c = net.add_producer("/app/c", 1);
    net.initialize(c).unwrap();
    net.advance(SETTLE).unwrap();
    assert!(net.converged());

    for i in [a, b, c] {
        net.engine_mut(i).publish().unwrap();
    }
    net.run_until_quiet().unwrap();
    net.advance(Duration::from_secs(30)).unwrap();

    assert!(net.converged());
    for i in [a, b, c] {
        let engine = net.engine(i);
        for producer in ["/app/a", "/app/b", "/app/c"] {
            assert_eq!(engine.producer_sequence_no(&name(producer), 1), Some(1));
        }
    }
}

#[test]
fn test_offline_node_catches_up() {
    let (mut net, a, b) = two_node_network();
    net.set_online(b, false);

    for _ in 0..3 {
        net.publish(a).unwrap();
    }
    assert_eq!(net.engine(b).producer_sequence_no(&name("/app/a"), 1), Some(0));

    net.set_online(b, true);
    net.advance(Duration::from_secs(15)).unwrap();

    assert_eq!(net.engine(b).producer_sequence_no(&name("/app/a"), 1), Some(3));
    assert!(net.converged());
}
