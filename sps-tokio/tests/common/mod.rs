//! Shared test helpers for SPS link integration tests

use std::sync::Arc;
use std::time::Duration;

use sps_core::DisconnectReason;
use sps_tokio::{LinkEvent, LinkSession, MemPeer, MemTransport, SpsConfig};
use tokio::sync::broadcast;
use tokio::time::timeout;

pub const PEER_ID: &str = "aa:bb:cc:dd:ee:ff";
pub const QUIET: Duration = Duration::from_millis(50);

/// Register a peer on a fresh in-memory transport and bring a session up.
pub async fn connected_pair(config: SpsConfig) -> (LinkSession<MemTransport>, MemPeer) {
    let transport = Arc::new(MemTransport::new());
    let peer = transport.register_peer(PEER_ID, Some("test-peer"), Some(-50));
    let session = LinkSession::connect(transport, PEER_ID.to_string(), config)
        .await
        .expect("bring-up should succeed");
    (session, peer)
}

/// Wait for the next teardown notification, skipping other events.
pub async fn next_disconnect(events: &mut broadcast::Receiver<LinkEvent>) -> DisconnectReason {
    loop {
        match events.recv().await.expect("event stream should stay open") {
            LinkEvent::Disconnected { reason } => return reason,
            _ => continue,
        }
    }
}

/// Assert that no further teardown notification arrives within the quiet
/// window.
pub async fn assert_no_disconnect(events: &mut broadcast::Receiver<LinkEvent>) {
    assert!(
        timeout(QUIET, next_disconnect(events)).await.is_err(),
        "unexpected second teardown notification"
    );
}

/// Wait for the next grant-write-failure notification, skipping other
/// events.
pub async fn next_grant_failure(events: &mut broadcast::Receiver<LinkEvent>) -> String {
    loop {
        match events.recv().await.expect("event stream should stay open") {
            LinkEvent::GrantWriteFailed { message } => return message,
            _ => continue,
        }
    }
}
