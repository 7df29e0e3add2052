//! In-memory loopback transport for tests and demos.
//!
//! [`MemTransport`] implements [`Transport`] against a registry of
//! scriptable peers. The remote end of each link is a [`MemPeer`] handle:
//! tests inject credit grants, frames, or the disconnect sentinel, capture
//! everything the local side writes, make writes fail, or drop the link.
//! The transport speaks the default SPS channel UUIDs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use sps_core::protocol::constants::{SPS_CREDITS_UUID, SPS_FIFO_UUID};
use sps_core::protocol::{encode_grant, encode_sentinel};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{ConnectionError, Result, SpsError};
use crate::transport::{DiscoveredPeer, Discovery, Notifications, Transport};

struct Slot {
    name: Option<String>,
    rssi: Option<i16>,
    connected: AtomicBool,
    /// Writes left to fail before behaving normally again
    fail_writes: AtomicU32,
    /// Local-side subscriptions, keyed by channel UUID
    subs: Mutex<HashMap<String, mpsc::Sender<Bytes>>>,
    /// Captured local writes to the data channel
    frame_tap: mpsc::UnboundedSender<Bytes>,
    /// Captured local writes to the credits channel (raw byte)
    grant_tap: mpsc::UnboundedSender<u8>,
}

impl Slot {
    fn subscription(&self, channel: &str) -> Option<mpsc::Sender<Bytes>> {
        self.subs
            .lock()
            .expect("subscription registry poisoned")
            .get(channel)
            .cloned()
    }
}

/// Loopback [`Transport`] keyed by string peer ids.
#[derive(Default)]
pub struct MemTransport {
    peers: Mutex<HashMap<String, Arc<Slot>>>,
}

impl MemTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer and get its scriptable remote-end handle. The peer
    /// appears in subsequent scans.
    pub fn register_peer(
        &self,
        id: impl Into<String>,
        name: Option<&str>,
        rssi: Option<i16>,
    ) -> MemPeer {
        let (frame_tap, frames) = mpsc::unbounded_channel();
        let (grant_tap, grants) = mpsc::unbounded_channel();
        let slot = Arc::new(Slot {
            name: name.map(str::to_owned),
            rssi,
            connected: AtomicBool::new(false),
            fail_writes: AtomicU32::new(0),
            subs: Mutex::new(HashMap::new()),
            frame_tap,
            grant_tap,
        });
        self.peers
            .lock()
            .expect("peer registry poisoned")
            .insert(id.into(), slot.clone());
        MemPeer {
            slot,
            frames,
            grants,
        }
    }

    fn slot(&self, peer: &str) -> Result<Arc<Slot>> {
        self.peers
            .lock()
            .expect("peer registry poisoned")
            .get(peer)
            .cloned()
            .ok_or_else(|| SpsError::connection(ConnectionError::Refused))
    }
}

impl Transport for MemTransport {
    type Peer = String;

    async fn scan(&self, _service_filter: &str, _timeout: Duration) -> Result<Discovery<String>> {
        let peers: Vec<DiscoveredPeer<String>> = {
            let registry = self.peers.lock().expect("peer registry poisoned");
            registry
                .iter()
                .map(|(id, slot)| DiscoveredPeer {
                    id: id.clone(),
                    name: slot.name.clone(),
                    rssi: slot.rssi,
                })
                .collect()
        };
        // Everything registered is already discovered; deliver the batch
        // and close the window immediately.
        let (tx, rx) = mpsc::channel(peers.len().max(1));
        for peer in peers {
            let _ = tx.try_send(peer);
        }
        Ok(Discovery::new(rx))
    }

    async fn connect(&self, peer: &String) -> Result<()> {
        let slot = self.slot(peer)?;
        slot.connected.store(true, Ordering::SeqCst);
        trace!(peer = %peer, "mem transport connected");
        Ok(())
    }

    async fn disconnect(&self, peer: &String) -> Result<()> {
        let slot = self.slot(peer)?;
        slot.connected.store(false, Ordering::SeqCst);
        // Disconnect cancels the peer's subscriptions.
        slot.subs
            .lock()
            .expect("subscription registry poisoned")
            .clear();
        trace!(peer = %peer, "mem transport disconnected");
        Ok(())
    }

    async fn write(
        &self,
        peer: &String,
        _service: &str,
        channel: &str,
        payload: Bytes,
    ) -> Result<()> {
        let slot = self.slot(peer)?;
        if !slot.connected.load(Ordering::SeqCst) {
            return Err(SpsError::connection(ConnectionError::NotConnected));
        }
        if slot
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SpsError::transport("write", "injected write failure"));
        }

        match channel {
            c if c == SPS_CREDITS_UUID => {
                let byte = *payload
                    .first()
                    .ok_or_else(|| SpsError::transport("write", "empty credits write"))?;
                let _ = slot.grant_tap.send(byte);
                Ok(())
            }
            c if c == SPS_FIFO_UUID => {
                let _ = slot.frame_tap.send(payload);
                Ok(())
            }
            other => Err(SpsError::transport("write", format!("unknown channel {other}"))),
        }
    }

    async fn subscribe(
        &self,
        peer: &String,
        _service: &str,
        channel: &str,
    ) -> Result<Notifications> {
        let slot = self.slot(peer)?;
        if !slot.connected.load(Ordering::SeqCst) {
            return Err(SpsError::connection(ConnectionError::NotConnected));
        }
        let (tx, rx) = mpsc::channel(64);
        slot.subs
            .lock()
            .expect("subscription registry poisoned")
            .insert(channel.to_owned(), tx);
        Ok(Notifications::new(rx))
    }
}

/// Scriptable remote end of one registered peer.
pub struct MemPeer {
    slot: Arc<Slot>,
    frames: mpsc::UnboundedReceiver<Bytes>,
    grants: mpsc::UnboundedReceiver<u8>,
}

impl MemPeer {
    /// Grant the local side `quantity` credits over the credits channel.
    pub async fn grant(&self, quantity: u8) -> Result<()> {
        let payload = encode_grant(quantity).map_err(SpsError::from)?;
        self.notify(SPS_CREDITS_UUID, payload).await
    }

    /// Signal disconnect by sending the 0xFF sentinel.
    pub async fn send_sentinel(&self) -> Result<()> {
        self.notify(SPS_CREDITS_UUID, encode_sentinel()).await
    }

    /// Deliver an arbitrary credits-channel message (malformed ones
    /// included, for protocol-error tests).
    pub async fn inject_credit_raw(&self, payload: Bytes) -> Result<()> {
        self.notify(SPS_CREDITS_UUID, payload).await
    }

    /// Deliver one data frame to the local side.
    pub async fn inject_frame(&self, payload: Bytes) -> Result<()> {
        self.notify(SPS_FIFO_UUID, payload).await
    }

    /// Next data frame written by the local side.
    pub async fn next_frame(&mut self) -> Option<Bytes> {
        self.frames.recv().await
    }

    /// Next credits-channel byte written by the local side. A grant shows
    /// as its quantity, a local disconnect as the 0xFF sentinel.
    pub async fn next_grant(&mut self) -> Option<u8> {
        self.grants.recv().await
    }

    /// Make the next `n` local writes fail at the transport.
    pub fn fail_next_writes(&self, n: u32) {
        self.slot.fail_writes.store(n, Ordering::SeqCst);
    }

    /// Drop the link abruptly: both local subscription streams end as if
    /// the transport lost the connection.
    pub fn drop_link(&self) {
        self.slot.connected.store(false, Ordering::SeqCst);
        self.slot
            .subs
            .lock()
            .expect("subscription registry poisoned")
            .clear();
    }

    async fn notify(&self, channel: &str, payload: Bytes) -> Result<()> {
        let Some(tx) = self.slot.subscription(channel) else {
            return Err(SpsError::transport("notify", "channel not subscribed"));
        };
        tx.send(payload)
            .await
            .map_err(|_| SpsError::transport("notify", "subscription cancelled"))
    }
}
