//! Actor-based link driver — owns the LinkEngine in a dedicated task,
//! communicates via channels. All credit-state mutation happens on this one
//! task, which is what makes each increment/decrement atomic with respect
//! to the others.

use crate::config::SpsConfig;
use crate::error::Result;
use crate::metrics::global_metrics;
use crate::session::LinkEvent;
use crate::transport::{Notifications, Transport};

use bytes::Bytes;
use sps_core::protocol::{decode_credit, encode_grant, encode_sentinel};
use sps_core::{CreditUpdate, DisconnectReason, LinkEngine, LinkStats, Replenish};
use std::sync::Arc;
use tokio::sync::mpsc::OwnedPermit;
use tokio::sync::{broadcast, mpsc, oneshot, Notify};
use tracing::{debug, info, trace, warn};

/// Commands sent to the link actor.
pub(crate) enum LinkCmd {
    Send {
        data: Bytes,
        reply: oneshot::Sender<Result<()>>,
    },
    Stats {
        reply: oneshot::Sender<LinkStats>,
    },
    Credits {
        reply: oneshot::Sender<(u32, u32)>,
    },
    IsAlive {
        reply: oneshot::Sender<bool>,
    },
    Disconnect {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Run the link actor loop.
///
/// - `credits_rx` / `frames_rx`: the two channel subscriptions established
///   during bring-up, consumed in strict arrival order per channel.
/// - `data_tx`: inbound frames forwarded to the caller's `recv`.
/// - `drained`: signaled by the handle's `recv` when a queue slot frees
///   up; wakes the actor to retry a deferred grant.
/// - `events`: observer notifications; exactly one `Disconnected` is
///   emitted per session.
///
/// Every credit granted to the peer is backed by a reserved slot in the
/// receive queue, so a peer that stays within its allowance never has a
/// frame dropped on a slow reader. Replenishment waits for queue room.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_link_actor<T: Transport>(
    mut engine: LinkEngine,
    mut credits_rx: Notifications,
    mut frames_rx: Notifications,
    mut cmd_rx: mpsc::Receiver<LinkCmd>,
    data_tx: mpsc::Sender<Bytes>,
    drained: Arc<Notify>,
    events: broadcast::Sender<LinkEvent>,
    transport: Arc<T>,
    peer: T::Peer,
    config: SpsConfig,
) {
    let _ = events.send(LinkEvent::Established);
    debug!(peer = %peer, "link actor started");

    // Slots backing the bring-up grant; `validate()` guarantees the queue
    // covers one batch while it is still empty.
    let mut permits = acquire_permits(&data_tx, config.grant_batch).unwrap_or_default();
    let mut grant_pending = false;

    loop {
        tokio::select! {
            biased;

            // Credits-channel notifications (prioritized: grants and the
            // sentinel should not sit behind a burst of data frames)
            msg = credits_rx.next() => {
                match msg {
                    Some(buf) => {
                        if handle_credit(&mut engine, &transport, &peer, &config, &events, &buf).await {
                            break;
                        }
                    }
                    None => {
                        trace!(peer = %peer, "credits subscription ended");
                        teardown(&mut engine, &transport, &peer, &config, &events, DisconnectReason::TransportLost).await;
                        break;
                    }
                }
            }

            // Data-channel notifications
            frame = frames_rx.next() => {
                match frame {
                    Some(buf) => {
                        handle_frame(
                            &mut engine,
                            &transport,
                            &peer,
                            &config,
                            &data_tx,
                            &mut permits,
                            &mut grant_pending,
                            &events,
                            buf,
                        )
                        .await;
                    }
                    None => {
                        trace!(peer = %peer, "data subscription ended");
                        teardown(&mut engine, &transport, &peer, &config, &events, DisconnectReason::TransportLost).await;
                        break;
                    }
                }
            }

            // The reader drained a frame; retry a grant that was deferred
            // for queue room
            _ = drained.notified(), if grant_pending => {
                grant_pending = false;
                if let Ok(batch) = engine.begin_grant() {
                    issue_grant(
                        &mut engine,
                        &transport,
                        &peer,
                        &config,
                        &data_tx,
                        &mut permits,
                        &mut grant_pending,
                        &events,
                        batch,
                    )
                    .await;
                }
            }

            // User commands
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(LinkCmd::Send { data, reply }) => {
                        let r = do_send(&mut engine, &transport, &peer, &config, data).await;
                        let _ = reply.send(r);
                    }
                    Some(LinkCmd::Stats { reply }) => {
                        let _ = reply.send(engine.stats());
                    }
                    Some(LinkCmd::Credits { reply }) => {
                        let _ = reply.send((engine.outbound_credits(), engine.inbound_credits()));
                    }
                    Some(LinkCmd::IsAlive { reply }) => {
                        let _ = reply.send(engine.is_connected());
                    }
                    Some(LinkCmd::Disconnect { reply }) => {
                        teardown(&mut engine, &transport, &peer, &config, &events, DisconnectReason::Local).await;
                        let _ = reply.send(Ok(()));
                        break;
                    }
                    None => {
                        // All session handles dropped
                        teardown(&mut engine, &transport, &peer, &config, &events, DisconnectReason::Local).await;
                        break;
                    }
                }
            }
        }
    }

    debug!(peer = %peer, "link actor stopped");
}

/// Two-phase send: reserve a credit, write the frame, commit the decrement.
/// A rejection at a zero balance touches neither the transport nor the
/// counters; a failed write leaves the reservation uncommitted.
async fn do_send<T: Transport>(
    engine: &mut LinkEngine,
    transport: &Arc<T>,
    peer: &T::Peer,
    config: &SpsConfig,
    data: Bytes,
) -> Result<()> {
    if let Err(e) = engine.reserve_send() {
        if matches!(e, sps_core::LinkError::InsufficientCredit) {
            global_metrics().credit_rejection();
        }
        return Err(e.into());
    }
    let len = data.len();
    transport
        .write(peer, &config.service_uuid, &config.fifo_uuid, data)
        .await?;
    engine.commit_send(len)?;
    trace!(peer = %peer, bytes = len, credits = engine.outbound_credits(), "frame sent");
    Ok(())
}

/// Apply one credits-channel message. Returns `true` when the message tore
/// the session down (sentinel).
async fn handle_credit<T: Transport>(
    engine: &mut LinkEngine,
    transport: &Arc<T>,
    peer: &T::Peer,
    config: &SpsConfig,
    events: &broadcast::Sender<LinkEvent>,
    buf: &[u8],
) -> bool {
    let message = match decode_credit(buf) {
        Ok(message) => message,
        Err(e) => {
            warn!(peer = %peer, error = %e, "discarding malformed credits message");
            return false;
        }
    };

    match engine.on_credit(message) {
        CreditUpdate::Granted(quantity) => {
            trace!(peer = %peer, granted = quantity, credits = engine.outbound_credits(), "peer granted credits");
            false
        }
        CreditUpdate::Disconnected => {
            info!(peer = %peer, "peer signaled disconnect via credits sentinel");
            global_metrics().sentinel_disconnect();
            // The engine already transitioned; finish the transport side.
            finish_teardown(engine, transport, peer, config, events, DisconnectReason::PeerSentinel)
                .await;
            true
        }
        CreditUpdate::Ignored => true,
    }
}

/// Deliver one inbound frame and obey the engine's replenishment decision.
#[allow(clippy::too_many_arguments)]
async fn handle_frame<T: Transport>(
    engine: &mut LinkEngine,
    transport: &Arc<T>,
    peer: &T::Peer,
    config: &SpsConfig,
    data_tx: &mpsc::Sender<Bytes>,
    permits: &mut Vec<OwnedPermit<Bytes>>,
    grant_pending: &mut bool,
    events: &broadcast::Sender<LinkEvent>,
    buf: Bytes,
) {
    let len = buf.len();
    match permits.pop() {
        // In-allowance frame: its queue slot was reserved when the credit
        // was granted, so delivery cannot fail.
        Some(permit) => {
            let _ = permit.send(buf);
        }
        // Over-allowance frame: no reserved slot, best effort.
        None => {
            if data_tx.try_send(buf).is_err() {
                warn!(peer = %peer, bytes = len, "over-allowance frame dropped (receive queue full)");
            }
        }
    }

    match engine.frame_received(len) {
        Replenish::Issue(batch) => {
            issue_grant(
                engine,
                transport,
                peer,
                config,
                data_tx,
                permits,
                grant_pending,
                events,
                batch,
            )
            .await;
        }
        Replenish::NotNeeded => {}
    }
}

/// Write a credit grant to the peer and resolve the engine's two-phase
/// grant transition. A grant is only issued once a queue slot is reserved
/// for every credit in it; short on room, the grant is deferred until the
/// reader drains.
#[allow(clippy::too_many_arguments)]
async fn issue_grant<T: Transport>(
    engine: &mut LinkEngine,
    transport: &Arc<T>,
    peer: &T::Peer,
    config: &SpsConfig,
    data_tx: &mpsc::Sender<Bytes>,
    permits: &mut Vec<OwnedPermit<Bytes>>,
    grant_pending: &mut bool,
    events: &broadcast::Sender<LinkEvent>,
    batch: u8,
) {
    let mut reserved = match acquire_permits(data_tx, batch) {
        Some(reserved) => reserved,
        None => {
            engine.grant_failed();
            *grant_pending = true;
            trace!(peer = %peer, wanted = batch, "grant deferred until the receive queue drains");
            return;
        }
    };

    let payload = match encode_grant(batch) {
        Ok(payload) => payload,
        Err(e) => {
            // Unreachable with a validated config; resolve the transition anyway.
            engine.grant_failed();
            warn!(peer = %peer, error = %e, "grant encoding failed");
            return;
        }
    };

    match transport
        .write(peer, &config.service_uuid, &config.credits_uuid, payload)
        .await
    {
        Ok(()) => {
            engine.grant_succeeded();
            *grant_pending = false;
            permits.append(&mut reserved);
            trace!(peer = %peer, granted = batch, inbound = engine.inbound_credits(), "credits granted to peer");
        }
        Err(e) => {
            // Dropping the reservations releases the slots.
            engine.grant_failed();
            *grant_pending = true;
            global_metrics().grant_write_failure();
            warn!(peer = %peer, error = %e, "credit grant write failed");
            let _ = events.send(LinkEvent::GrantWriteFailed {
                message: e.to_string(),
            });
        }
    }
}

/// Reserve `n` receive-queue slots, all or nothing.
fn acquire_permits(data_tx: &mpsc::Sender<Bytes>, n: u8) -> Option<Vec<OwnedPermit<Bytes>>> {
    let mut acquired = Vec::with_capacity(n as usize);
    for _ in 0..n {
        match data_tx.clone().try_reserve_owned() {
            Ok(permit) => acquired.push(permit),
            // Dropping the partial batch releases its slots.
            Err(_) => return None,
        }
    }
    Some(acquired)
}

/// Idempotent session teardown: the engine transition gates every side
/// effect, so a second trigger is a silent no-op.
async fn teardown<T: Transport>(
    engine: &mut LinkEngine,
    transport: &Arc<T>,
    peer: &T::Peer,
    config: &SpsConfig,
    events: &broadcast::Sender<LinkEvent>,
    reason: DisconnectReason,
) {
    if !engine.disconnect(reason) {
        return;
    }
    finish_teardown(engine, transport, peer, config, events, reason).await;
}

/// Transport-side half of teardown, run exactly once per session.
async fn finish_teardown<T: Transport>(
    engine: &mut LinkEngine,
    transport: &Arc<T>,
    peer: &T::Peer,
    config: &SpsConfig,
    events: &broadcast::Sender<LinkEvent>,
    reason: DisconnectReason,
) {
    if reason == DisconnectReason::Local {
        // Tell the peer we are going away, in its own protocol.
        if let Err(e) = transport
            .write(
                peer,
                &config.service_uuid,
                &config.credits_uuid,
                encode_sentinel(),
            )
            .await
        {
            trace!(peer = %peer, error = %e, "sentinel write failed");
        }
    }

    if reason != DisconnectReason::TransportLost {
        if let Err(e) = transport.disconnect(peer).await {
            trace!(peer = %peer, error = %e, "transport disconnect failed");
        }
    }

    global_metrics().session_closed(&engine.stats());
    let _ = events.send(LinkEvent::Disconnected { reason });
    info!(peer = %peer, ?reason, "link closed");
}
