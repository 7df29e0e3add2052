//! Link session bring-up and the public handle API.
//!
//! [`LinkSession::connect`] performs the SPS bring-up sequence in its
//! mandatory order, spawns the session actor, and hands back a handle whose
//! operations are all funneled through the actor's command channel. The
//! order matters: the credits subscription must exist before the data
//! subscription (it establishes the flow-control contract the data channel
//! depends on), and the initial grant is what unblocks the peer's first
//! send.

use std::sync::Arc;

use bytes::Bytes;
use sps_core::protocol::{encode_grant, text_to_frame};
use sps_core::{DisconnectReason, LinkEngine, LinkStats};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, Notify};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::actor::{run_link_actor, LinkCmd};
use crate::config::SpsConfig;
use crate::error::{ConnectionError, Result, SpsError};
use crate::metrics::global_metrics;
use crate::transport::{DiscoveredPeer, Transport};

/// Observer notifications emitted by a session.
///
/// Exactly one `Disconnected` is emitted per session, however many triggers
/// (sentinel, transport loss, local call) race to cause it.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Bring-up finished; local sends may now be attempted
    Established,
    /// The session is gone; presentation state can reset
    Disconnected { reason: DisconnectReason },
    /// A replenishment grant write failed; the peer's allowance was not
    /// raised. Surfaced here because no caller awaits grant writes.
    GrantWriteFailed { message: String },
}

/// Handle to one active SPS link.
///
/// Cheap to clone; every clone drives the same actor and shares one
/// inbound queue. Dropping the last handle tears the session down. All
/// state lives inside the actor task, so a handle operation after teardown
/// gets a closed-link error rather than touching stale state.
pub struct LinkSession<T: Transport> {
    peer: T::Peer,
    cmd_tx: mpsc::Sender<LinkCmd>,
    data_rx: Arc<Mutex<mpsc::Receiver<Bytes>>>,
    drained: Arc<Notify>,
    events_tx: broadcast::Sender<LinkEvent>,
}

impl<T: Transport> Clone for LinkSession<T> {
    fn clone(&self) -> Self {
        Self {
            peer: self.peer.clone(),
            cmd_tx: self.cmd_tx.clone(),
            data_rx: self.data_rx.clone(),
            drained: self.drained.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

impl<T: Transport> LinkSession<T> {
    /// Connect to `peer` and bring the link up.
    ///
    /// Sequencing: transport connect → counters reset → credits
    /// subscription → data subscription → initial grant → established.
    /// Failure at any step fails the whole operation; the transport
    /// connection is torn down best-effort and no partially subscribed
    /// session is observable.
    pub async fn connect(transport: Arc<T>, peer: T::Peer, config: SpsConfig) -> Result<Self> {
        config.validate()?;

        // 1. Open the transport connection.
        match timeout(config.connect_timeout, transport.connect(&peer)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(SpsError::connection(ConnectionError::Timeout));
            }
        }
        debug!(peer = %peer, "transport connected");

        // 2. Fresh engine: both credit counters start at zero.
        let mut engine = LinkEngine::new(config.clone().into());

        // 3. Credits subscription first — it carries the flow-control
        //    contract (and the disconnect sentinel).
        let credits_rx = match transport
            .subscribe(&peer, &config.service_uuid, &config.credits_uuid)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                cleanup(&transport, &peer).await;
                return Err(e);
            }
        };

        // 4. Data subscription.
        let frames_rx = match transport
            .subscribe(&peer, &config.service_uuid, &config.fifo_uuid)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                cleanup(&transport, &peer).await;
                return Err(e);
            }
        };

        // 5. Initial grant — unblocks the peer's first send.
        let payload = match engine.begin_grant().and_then(encode_grant) {
            Ok(payload) => payload,
            Err(e) => {
                cleanup(&transport, &peer).await;
                return Err(e.into());
            }
        };
        let batch = config.grant_batch;
        match transport
            .write(&peer, &config.service_uuid, &config.credits_uuid, payload)
            .await
        {
            Ok(()) => {
                engine.grant_succeeded();
                trace!(peer = %peer, granted = batch, "initial credits granted");
            }
            Err(e) => {
                engine.grant_failed();
                cleanup(&transport, &peer).await;
                return Err(e);
            }
        }

        // 6. Established: spawn the actor that owns all further mutation.
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (data_tx, data_rx) = mpsc::channel(config.recv_buffer);
        let (events_tx, _) = broadcast::channel(config.event_buffer);
        let drained = Arc::new(Notify::new());

        global_metrics().session_opened();
        tokio::spawn(run_link_actor(
            engine,
            credits_rx,
            frames_rx,
            cmd_rx,
            data_tx,
            drained.clone(),
            events_tx.clone(),
            transport,
            peer.clone(),
            config,
        ));

        Ok(Self {
            peer,
            cmd_tx,
            data_rx: Arc::new(Mutex::new(data_rx)),
            drained,
            events_tx,
        })
    }

    /// Send one data frame. Fails immediately with insufficient-credit when
    /// the outbound balance is zero, without touching the transport.
    pub async fn send(&self, data: Bytes) -> Result<()> {
        self.request(|reply| LinkCmd::Send { data, reply }).await?
    }

    /// Send ASCII text as one data frame.
    pub async fn send_text(&self, text: &str) -> Result<()> {
        let frame = text_to_frame(text).map_err(SpsError::from)?;
        self.send(frame).await
    }

    /// Next inbound frame, in arrival order. Clones share one queue, so
    /// each frame reaches exactly one caller. `None` after teardown once
    /// the queue is drained.
    pub async fn recv(&self) -> Option<Bytes> {
        let frame = self.data_rx.lock().await.recv().await;
        if frame.is_some() {
            // Frees a queue slot; the actor may have a grant waiting on it.
            self.drained.notify_one();
        }
        frame
    }

    /// Subscribe to the session's observer events.
    pub fn events(&self) -> broadcast::Receiver<LinkEvent> {
        self.events_tx.subscribe()
    }

    /// Snapshot of the link statistics.
    pub async fn stats(&self) -> Result<LinkStats> {
        self.request(|reply| LinkCmd::Stats { reply }).await
    }

    /// Current `(outbound, inbound)` credit balances.
    pub async fn credits(&self) -> Result<(u32, u32)> {
        self.request(|reply| LinkCmd::Credits { reply }).await
    }

    /// Tear the session down. Idempotent: calling it on an already closed
    /// session succeeds without effect.
    pub async fn disconnect(&self) -> Result<()> {
        match self.request(|reply| LinkCmd::Disconnect { reply }).await {
            Ok(r) => r,
            // Actor already gone: the session is closed, which is the goal.
            Err(e) if e.is_peer_closed() => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn is_alive(&self) -> bool {
        self.request(|reply| LinkCmd::IsAlive { reply })
            .await
            .unwrap_or(false)
    }

    pub fn peer(&self) -> &T::Peer {
        &self.peer
    }

    /// Send a command and wait for the reply. Returns a closed-link error
    /// if the actor has exited.
    async fn request<R>(&self, cmd: impl FnOnce(oneshot::Sender<R>) -> LinkCmd) -> Result<R> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(cmd(reply))
            .await
            .map_err(|_| SpsError::connection(ConnectionError::Closed))?;
        rx.await
            .map_err(|_| SpsError::connection(ConnectionError::Closed))
    }
}

/// Best-effort transport teardown during a failed bring-up. A teardown
/// failure must not mask the original error.
async fn cleanup<T: Transport>(transport: &Arc<T>, peer: &T::Peer) {
    if let Err(e) = transport.disconnect(peer).await {
        trace!(peer = %peer, error = %e, "cleanup disconnect failed");
    }
}

/// Collect the peers discovered within the configured scan window.
pub async fn scan<T: Transport>(
    transport: &T,
    config: &SpsConfig,
) -> Result<Vec<DiscoveredPeer<T::Peer>>> {
    let mut discovery = transport
        .scan(&config.service_uuid, config.scan_timeout)
        .await?;
    let mut peers = Vec::new();
    while let Some(peer) = discovery.next().await {
        trace!(peer = %peer.id, name = ?peer.name, rssi = ?peer.rssi, "peer discovered");
        peers.push(peer);
    }
    Ok(peers)
}
