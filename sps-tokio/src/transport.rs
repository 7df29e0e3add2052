//! Abstract transport layer for the SPS link
//!
//! The [`Transport`] trait is the boundary to the underlying characteristic
//! transport (a BLE stack, a serial bridge, the in-memory
//! [`MemTransport`](crate::mem::MemTransport) used in tests). The link core
//! never touches radios or sockets directly — it only connects, writes to
//! named channels, and subscribes to named channels.

use std::fmt::{Debug, Display};
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

/// Marker trait for peer identifier types used by [`Transport`]
/// implementations.
///
/// Any type satisfying the required bounds automatically implements `PeerId`
/// via the blanket impl. This keeps bound lists short elsewhere.
pub trait PeerId: Clone + Eq + Hash + Send + Sync + Debug + Display + 'static {}

impl<T: Clone + Eq + Hash + Send + Sync + Debug + Display + 'static> PeerId for T {}

/// A peer reported by a discovery scan.
#[derive(Debug, Clone)]
pub struct DiscoveredPeer<P> {
    pub id: P,
    /// Advertised display name, if any
    pub name: Option<String>,
    /// Signal strength in dBm, if the transport reports one
    pub rssi: Option<i16>,
}

/// Ongoing stream of byte buffers from a subscribed channel.
///
/// Dropping the stream is its cancellation. The transport ends the stream
/// (`next` returns `None`) when the connection is gone.
pub struct Notifications {
    rx: mpsc::Receiver<Bytes>,
}

impl Notifications {
    pub fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self { rx }
    }

    /// Next notification, in arrival order. `None` once the subscription
    /// has been terminated by the transport.
    pub async fn next(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

/// Lazy stream of peers found by a scan, bounded by the scan timeout.
pub struct Discovery<P> {
    rx: mpsc::Receiver<DiscoveredPeer<P>>,
}

impl<P> Discovery<P> {
    pub fn new(rx: mpsc::Receiver<DiscoveredPeer<P>>) -> Self {
        Self { rx }
    }

    /// Next discovered peer; `None` once the scan window has closed.
    pub async fn next(&mut self) -> Option<DiscoveredPeer<P>> {
        self.rx.recv().await
    }
}

/// Async characteristic transport used by
/// [`LinkSession`](crate::session::LinkSession).
///
/// Implementors provide connect/write/subscribe primitives addressed by an
/// associated [`PeerId`] type and by service/channel UUID strings. All
/// single-shot operations have exactly one terminal completion; retry and
/// backoff are never performed above this boundary.
pub trait Transport: Send + Sync + 'static {
    /// The identifier type for remote endpoints.
    type Peer: PeerId;

    /// Scan for peers advertising `service_filter`, for at most `timeout`.
    fn scan<'a>(
        &'a self,
        service_filter: &'a str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Discovery<Self::Peer>>> + Send + 'a;

    /// Open a connection to `peer`.
    fn connect<'a>(&'a self, peer: &'a Self::Peer) -> impl Future<Output = Result<()>> + Send + 'a;

    /// Tear down the connection to `peer`. Implicitly cancels that peer's
    /// subscriptions.
    fn disconnect<'a>(
        &'a self,
        peer: &'a Self::Peer,
    ) -> impl Future<Output = Result<()>> + Send + 'a;

    /// Write `payload` to one channel of `peer`, single-shot.
    fn write<'a>(
        &'a self,
        peer: &'a Self::Peer,
        service: &'a str,
        channel: &'a str,
        payload: Bytes,
    ) -> impl Future<Output = Result<()>> + Send + 'a;

    /// Subscribe to one channel of `peer` for an ongoing notification
    /// stream.
    fn subscribe<'a>(
        &'a self,
        peer: &'a Self::Peer,
        service: &'a str,
        channel: &'a str,
    ) -> impl Future<Output = Result<Notifications>> + Send + 'a;
}
