//! Core-only property tests for the credit-flow engine — no tokio dependency

use sps_core::{
    CreditMessage, CreditUpdate, DisconnectReason, LinkConfig, LinkEngine, LinkError, LinkState,
    Replenish,
};

/// Drive one successful send through the two-phase transition.
fn send_ok(engine: &mut LinkEngine, len: usize) -> Result<(), LinkError> {
    engine.reserve_send()?;
    engine.commit_send(len)
}

#[test]
fn outbound_credit_conservation() {
    let mut engine = LinkEngine::new(LinkConfig::default());
    let mut granted: u32 = 0;
    let mut sent: u32 = 0;

    // Interleave grants and sends; the balance must always equal
    // granted - sent and never go negative.
    for (grant, sends) in [(5u8, 3u32), (0, 0), (2, 4), (10, 8), (1, 3)] {
        engine.on_credit(CreditMessage::Grant(grant));
        granted += u32::from(grant);
        assert_eq!(engine.outbound_credits(), granted - sent);

        for _ in 0..sends {
            match send_ok(&mut engine, 1) {
                Ok(()) => sent += 1,
                Err(LinkError::InsufficientCredit) => {
                    assert_eq!(granted, sent, "rejected only at a zero balance");
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
            assert_eq!(engine.outbound_credits(), granted - sent);
        }
    }
}

#[test]
fn inbound_credit_conservation() {
    let batch = 4u8;
    let mut engine = LinkEngine::new(LinkConfig::new().grant_batch(batch));
    let mut issued: u32 = 0;
    let mut received: u32 = 0;

    engine.begin_grant().unwrap();
    engine.grant_succeeded();
    issued += u32::from(batch);

    for _ in 0..20 {
        let replenish = engine.frame_received(1);
        received += 1;
        if let Replenish::Issue(n) = replenish {
            assert_eq!(n, batch);
            engine.grant_succeeded();
            issued += u32::from(n);
        }
        assert_eq!(engine.inbound_credits(), issued - received);
    }
}

#[test]
fn liveness_regrant_before_peer_starves() {
    let batch = 10u8;
    let mut engine = LinkEngine::new(LinkConfig::new().grant_batch(batch));
    engine.begin_grant().unwrap();
    engine.grant_succeeded();

    // N consecutive receives: the Nth must come back with a grant
    // instruction, so the peer is never left at zero allowance.
    for i in 1..=u32::from(batch) {
        let replenish = engine.frame_received(1);
        if i < u32::from(batch) {
            assert_eq!(replenish, Replenish::NotNeeded);
        } else {
            assert_eq!(replenish, Replenish::Issue(batch));
        }
    }
    engine.grant_succeeded();
    assert_eq!(engine.inbound_credits(), u32::from(batch));
}

#[test]
fn sentinel_precedence_over_counters() {
    for (outbound_grant, frames) in [(0u8, 0u32), (254, 0), (20, 7)] {
        let mut engine = LinkEngine::new(LinkConfig::default());
        engine.begin_grant().unwrap();
        engine.grant_succeeded();
        engine.on_credit(CreditMessage::Grant(outbound_grant));
        for _ in 0..frames {
            let _ = engine.frame_received(1);
        }

        let outbound = engine.outbound_credits();
        let inbound = engine.inbound_credits();

        assert_eq!(
            engine.on_credit(CreditMessage::Sentinel),
            CreditUpdate::Disconnected
        );
        assert_eq!(
            engine.state(),
            LinkState::Disconnected(DisconnectReason::PeerSentinel)
        );

        // Counters frozen exactly where they were.
        engine.on_credit(CreditMessage::Grant(99));
        let _ = engine.frame_received(1);
        assert_eq!(engine.outbound_credits(), outbound);
        assert_eq!(engine.inbound_credits(), inbound);
    }
}

#[test]
fn send_rejected_at_zero_balance() {
    let mut engine = LinkEngine::new(LinkConfig::default());
    assert!(matches!(
        engine.reserve_send(),
        Err(LinkError::InsufficientCredit)
    ));
    // reserve_send is the gate before any transport write; a rejection
    // must leave the balance (and stats) untouched.
    assert_eq!(engine.outbound_credits(), 0);
    assert_eq!(engine.stats().frames_sent, 0);
}

#[test]
fn teardown_fires_once() {
    let mut engine = LinkEngine::new(LinkConfig::default());
    // Sentinel followed by transport-level loss: only the first trigger
    // reports a transition.
    assert_eq!(
        engine.on_credit(CreditMessage::Sentinel),
        CreditUpdate::Disconnected
    );
    assert!(!engine.disconnect(DisconnectReason::TransportLost));
    assert_eq!(
        engine.disconnect_reason(),
        Some(DisconnectReason::PeerSentinel)
    );
}

#[test]
fn reference_scenario() {
    // connect → initial grant of 10 → peer consumes all 10, the 10th
    // receive triggers a fresh grant; separately the peer grants 5 and the
    // local side spends them all, the 6th send failing without I/O.
    let mut engine = LinkEngine::new(LinkConfig::default());

    let batch = engine.begin_grant().unwrap();
    assert_eq!(batch, 10);
    engine.grant_succeeded();
    assert_eq!(engine.inbound_credits(), 10);

    for i in 1..=10u32 {
        let replenish = engine.frame_received(3);
        if i == 10 {
            assert_eq!(replenish, Replenish::Issue(10));
            engine.grant_succeeded();
        } else {
            assert_eq!(replenish, Replenish::NotNeeded);
        }
    }
    assert_eq!(engine.inbound_credits(), 10);

    engine.on_credit(CreditMessage::Grant(5));
    for _ in 0..5 {
        send_ok(&mut engine, 3).unwrap();
    }
    assert_eq!(engine.outbound_credits(), 0);
    assert!(matches!(
        engine.reserve_send(),
        Err(LinkError::InsufficientCredit)
    ));

    let stats = engine.stats();
    assert_eq!(stats.frames_sent, 5);
    assert_eq!(stats.frames_received, 10);
    assert_eq!(stats.grants_issued, 2);
    assert_eq!(stats.grants_received, 1);
}
