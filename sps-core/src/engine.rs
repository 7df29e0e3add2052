//! Credit-flow state machine for one SPS link.
//!
//! [`LinkEngine`] owns both credit counters and the connected/disconnected
//! state. It performs no I/O: every transition returns an instruction (or an
//! error) that the async driver acts on, which keeps each rule of the
//! protocol independently testable.
//!
//! Transitions are two-phase wherever a transport write sits in the middle:
//!
//! - send: [`reserve_send`](LinkEngine::reserve_send) checks the balance,
//!   [`commit_send`](LinkEngine::commit_send) applies the decrement after the
//!   write completes. A failed write never commits, so no credit is consumed.
//! - grant: [`begin_grant`](LinkEngine::begin_grant) latches a
//!   grant-in-flight marker, then exactly one of
//!   [`grant_succeeded`](LinkEngine::grant_succeeded) or
//!   [`grant_failed`](LinkEngine::grant_failed) resolves it.
//!
//! Receiving a frame drives replenishment through the named
//! [`frame_received`](LinkEngine::frame_received) → [`Replenish`] transition:
//! consuming the last inbound credit instructs the driver to write a fresh
//! batch, which is the liveness property keeping the peer from starving.

use crate::config::LinkConfig;
use crate::error::{LinkError, LinkResult};
use crate::protocol::{CreditMessage, LinkStats};

#[cfg(feature = "tracing")]
use tracing::warn;

/// Why the link left the `Connected` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Local caller asked for the disconnect
    Local,
    /// Peer signaled disconnect via the credits-channel sentinel (0xFF)
    PeerSentinel,
    /// The transport reported the connection gone
    TransportLost,
}

/// Link lifecycle state. `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected(DisconnectReason),
}

/// Outcome of feeding a credits-channel message into the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditUpdate {
    /// Outbound balance increased by this many credits
    Granted(u8),
    /// The sentinel arrived; the engine is now `Disconnected`
    Disconnected,
    /// The engine was already disconnected; the message was dropped
    Ignored,
}

/// Outcome of the receive-drives-regrant transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replenish {
    /// Write a grant of this many credits to the peer now
    Issue(u8),
    /// Inbound credit remains (or a grant is already in flight)
    NotNeeded,
}

/// Pure credit-flow state machine for one link.
#[derive(Debug)]
pub struct LinkEngine {
    state: LinkState,
    /// Sends we are permitted to make, granted by the peer
    outbound_credits: u32,
    /// Sends we have granted the peer, not yet consumed
    inbound_credits: u32,
    /// Batch size latched by an unresolved `begin_grant`
    grant_in_flight: Option<u8>,
    config: LinkConfig,
    stats: LinkStats,
}

impl LinkEngine {
    /// Create the engine for a freshly connected link. Both counters start
    /// at zero; the driver issues the initial grant via [`begin_grant`].
    pub fn new(config: LinkConfig) -> Self {
        Self {
            state: LinkState::Connected,
            outbound_credits: 0,
            inbound_credits: 0,
            grant_in_flight: None,
            config,
            stats: LinkStats::default(),
        }
    }

    // ── Outbound: send-side credit consumption ──────────────────────────

    /// Check that a send is currently permitted.
    ///
    /// Must be called before the transport write; fails with
    /// `InsufficientCredit` without any I/O when the balance is zero.
    pub fn reserve_send(&self) -> LinkResult<()> {
        if !self.is_connected() {
            return Err(LinkError::Disconnected);
        }
        if self.outbound_credits == 0 {
            return Err(LinkError::InsufficientCredit);
        }
        Ok(())
    }

    /// Consume one outbound credit after the transport write succeeded.
    pub fn commit_send(&mut self, frame_len: usize) -> LinkResult<()> {
        if !self.is_connected() {
            return Err(LinkError::Disconnected);
        }
        if self.outbound_credits == 0 {
            return Err(LinkError::protocol("send committed without reservation"));
        }
        self.outbound_credits -= 1;
        self.stats.frames_sent += 1;
        self.stats.bytes_sent += frame_len as u64;
        Ok(())
    }

    // ── Outbound: credits-channel intake ────────────────────────────────

    /// Apply a decoded credits-channel message.
    ///
    /// A grant raises the outbound balance; the sentinel transitions the
    /// engine to `Disconnected` without contributing any credit. Messages
    /// arriving after teardown are ignored so a late notification cannot
    /// mutate frozen counters.
    pub fn on_credit(&mut self, message: CreditMessage) -> CreditUpdate {
        if !self.is_connected() {
            return CreditUpdate::Ignored;
        }
        match message {
            CreditMessage::Grant(quantity) => {
                self.outbound_credits += u32::from(quantity);
                self.stats.grants_received += 1;
                CreditUpdate::Granted(quantity)
            }
            CreditMessage::Sentinel => {
                self.disconnect(DisconnectReason::PeerSentinel);
                CreditUpdate::Disconnected
            }
        }
    }

    // ── Inbound: receive-drives-regrant ─────────────────────────────────

    /// Account for one received data frame and decide whether the peer's
    /// allowance must be replenished.
    ///
    /// `Replenish::Issue(n)` latches the grant-in-flight marker itself, so
    /// the driver only has to write the grant and resolve it with
    /// [`grant_succeeded`](Self::grant_succeeded) or
    /// [`grant_failed`](Self::grant_failed).
    pub fn frame_received(&mut self, frame_len: usize) -> Replenish {
        if !self.is_connected() {
            return Replenish::NotNeeded;
        }
        self.stats.frames_received += 1;
        self.stats.bytes_received += frame_len as u64;

        if self.inbound_credits > 0 {
            self.inbound_credits -= 1;
        } else {
            // Peer overshot its allowance; saturate rather than lose data.
            #[cfg(feature = "tracing")]
            warn!("peer sent a frame with no inbound credit outstanding");
        }

        if self.inbound_credits == 0 && self.grant_in_flight.is_none() {
            self.grant_in_flight = Some(self.config.grant_batch);
            Replenish::Issue(self.config.grant_batch)
        } else {
            Replenish::NotNeeded
        }
    }

    // ── Inbound: grant issuance ─────────────────────────────────────────

    /// Start a grant outside the receive path (the initial grant after
    /// connection establishment). Returns the batch size to put on the wire.
    pub fn begin_grant(&mut self) -> LinkResult<u8> {
        if !self.is_connected() {
            return Err(LinkError::Disconnected);
        }
        if self.grant_in_flight.is_some() {
            return Err(LinkError::protocol("credit grant already in flight"));
        }
        self.grant_in_flight = Some(self.config.grant_batch);
        Ok(self.config.grant_batch)
    }

    /// The grant write completed: the peer now holds the batch.
    pub fn grant_succeeded(&mut self) {
        if let Some(batch) = self.grant_in_flight.take() {
            self.inbound_credits += u32::from(batch);
            self.stats.grants_issued += 1;
        }
    }

    /// The grant write failed: no partial credit. A later receive may
    /// re-trigger replenishment.
    pub fn grant_failed(&mut self) {
        self.grant_in_flight = None;
    }

    // ── Teardown ────────────────────────────────────────────────────────

    /// Transition to `Disconnected`. Returns `true` only on the first call;
    /// repeated triggers (sentinel followed by transport loss, say) are
    /// no-ops so teardown side effects run exactly once.
    pub fn disconnect(&mut self, reason: DisconnectReason) -> bool {
        match self.state {
            LinkState::Connected => {
                self.state = LinkState::Disconnected(reason);
                true
            }
            LinkState::Disconnected(_) => false,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, LinkState::Connected)
    }

    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        match self.state {
            LinkState::Connected => None,
            LinkState::Disconnected(reason) => Some(reason),
        }
    }

    pub fn outbound_credits(&self) -> u32 {
        self.outbound_credits
    }

    pub fn inbound_credits(&self) -> u32 {
        self.inbound_credits
    }

    /// Snapshot of the link statistics including current credit balances.
    pub fn stats(&self) -> LinkStats {
        LinkStats {
            outbound_credits: self.outbound_credits,
            inbound_credits: self.inbound_credits,
            ..self.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> LinkEngine {
        LinkEngine::new(LinkConfig::default())
    }

    #[test]
    fn fresh_engine_has_no_credit() {
        let engine = engine();
        assert!(engine.is_connected());
        assert_eq!(engine.outbound_credits(), 0);
        assert_eq!(engine.inbound_credits(), 0);
        assert!(matches!(
            engine.reserve_send(),
            Err(LinkError::InsufficientCredit)
        ));
    }

    #[test]
    fn grant_then_send_consumes_one_credit() {
        let mut engine = engine();
        assert_eq!(
            engine.on_credit(CreditMessage::Grant(3)),
            CreditUpdate::Granted(3)
        );
        assert_eq!(engine.outbound_credits(), 3);

        engine.reserve_send().unwrap();
        engine.commit_send(5).unwrap();
        assert_eq!(engine.outbound_credits(), 2);
        assert_eq!(engine.stats().frames_sent, 1);
        assert_eq!(engine.stats().bytes_sent, 5);
    }

    #[test]
    fn failed_write_leaves_credit_untouched() {
        let mut engine = engine();
        engine.on_credit(CreditMessage::Grant(1));
        engine.reserve_send().unwrap();
        // Transport write failed: commit never happens.
        assert_eq!(engine.outbound_credits(), 1);
        engine.reserve_send().unwrap();
    }

    #[test]
    fn initial_grant_raises_inbound_balance() {
        let mut engine = engine();
        let batch = engine.begin_grant().unwrap();
        assert_eq!(batch, 10);
        assert_eq!(engine.inbound_credits(), 0, "no credit before write completes");
        engine.grant_succeeded();
        assert_eq!(engine.inbound_credits(), 10);
        assert_eq!(engine.stats().grants_issued, 1);
    }

    #[test]
    fn grant_failure_leaves_no_partial_credit() {
        let mut engine = engine();
        engine.begin_grant().unwrap();
        engine.grant_failed();
        assert_eq!(engine.inbound_credits(), 0);
        // The flag is cleared, so a later attempt may retry.
        engine.begin_grant().unwrap();
    }

    #[test]
    fn double_begin_grant_is_rejected() {
        let mut engine = engine();
        engine.begin_grant().unwrap();
        assert!(engine.begin_grant().is_err());
    }

    #[test]
    fn last_receive_triggers_replenish() {
        let mut engine = LinkEngine::new(LinkConfig::new().grant_batch(2));
        engine.begin_grant().unwrap();
        engine.grant_succeeded();
        assert_eq!(engine.inbound_credits(), 2);

        assert_eq!(engine.frame_received(1), Replenish::NotNeeded);
        assert_eq!(engine.inbound_credits(), 1);

        // Consuming the last credit instructs a new grant of the batch size.
        assert_eq!(engine.frame_received(1), Replenish::Issue(2));
        assert_eq!(engine.inbound_credits(), 0);

        // No second instruction while that grant is unresolved.
        assert_eq!(engine.frame_received(1), Replenish::NotNeeded);

        engine.grant_succeeded();
        assert_eq!(engine.inbound_credits(), 2);
    }

    #[test]
    fn over_send_saturates_at_zero() {
        let mut engine = engine();
        // Peer sends without any credit outstanding.
        let replenish = engine.frame_received(4);
        assert_eq!(replenish, Replenish::Issue(10));
        assert_eq!(engine.inbound_credits(), 0);
        assert_eq!(engine.stats().frames_received, 1);
        assert_eq!(engine.stats().bytes_received, 4);
    }

    #[test]
    fn sentinel_disconnects_without_adding_credit() {
        let mut engine = engine();
        engine.on_credit(CreditMessage::Grant(7));
        assert_eq!(
            engine.on_credit(CreditMessage::Sentinel),
            CreditUpdate::Disconnected
        );
        assert_eq!(
            engine.state(),
            LinkState::Disconnected(DisconnectReason::PeerSentinel)
        );
        // The sentinel never contributes to the balance.
        assert_eq!(engine.outbound_credits(), 7);
    }

    #[test]
    fn counters_frozen_after_disconnect() {
        let mut engine = engine();
        engine.on_credit(CreditMessage::Grant(5));
        engine.disconnect(DisconnectReason::Local);

        assert_eq!(
            engine.on_credit(CreditMessage::Grant(9)),
            CreditUpdate::Ignored
        );
        assert_eq!(engine.frame_received(1), Replenish::NotNeeded);
        assert!(matches!(engine.reserve_send(), Err(LinkError::Disconnected)));
        assert!(engine.begin_grant().is_err());
        assert_eq!(engine.outbound_credits(), 5);
        assert_eq!(engine.stats().frames_received, 0);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut engine = engine();
        assert!(engine.disconnect(DisconnectReason::PeerSentinel));
        assert!(!engine.disconnect(DisconnectReason::TransportLost));
        // The first reason wins.
        assert_eq!(
            engine.disconnect_reason(),
            Some(DisconnectReason::PeerSentinel)
        );
    }
}
