//! # SPS Tokio — async credit-flow serial link
//!
//! An async implementation of the Serial Port Service link: a
//! point-to-point serial data link over a notify/write characteristic
//! transport, flow-controlled by explicit credits so neither side can
//! overrun the other's buffer.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │  sps-tokio  (this crate)                  │
//! │                                           │
//! │  LinkSession          ← user API          │
//! │  actor                ← serialized state  │
//! │  transport / mem      ← adapter boundary  │
//! ├───────────────────────────────────────────┤
//! │  sps-core  (dependency)                   │
//! │                                           │
//! │  LinkEngine  ← pure sync credit machine   │
//! │  protocol    ← wire constants & codec     │
//! └───────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sps_tokio::{LinkSession, MemTransport, SpsConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(MemTransport::new());
//!     let peer = transport.register_peer("aa:bb:cc", Some("widget"), Some(-40));
//!
//!     let session =
//!         LinkSession::connect(transport, "aa:bb:cc".to_string(), SpsConfig::default()).await?;
//!
//!     peer.grant(5).await?;
//!     session.send_text("hello").await?;
//!
//!     if let Some(frame) = session.recv().await {
//!         println!("received {} bytes", frame.len());
//!     }
//!     session.disconnect().await?;
//!     Ok(())
//! }
//! ```

// ── Layer 1: Core protocol (re-exported from sps-core) ──────────────────

/// Core protocol constants, codec, and statistics.
pub use sps_core::protocol;

/// Direct access to the standalone `sps-core` crate.
pub use sps_core;

// ── Layer 2: Transport boundary ─────────────────────────────────────────

pub mod transport;
pub use transport::{DiscoveredPeer, Discovery, Notifications, PeerId, Transport};

pub mod mem;
pub use mem::{MemPeer, MemTransport};

// ── Layer 3: Configuration & errors (extends core with I/O concerns) ────

pub mod config;
pub mod error;
pub use config::SpsConfig;
pub use error::{ConnectionError, Result, SpsError};

// ── Layer 4: The link session (actor + handle) ──────────────────────────

pub(crate) mod actor;
pub mod session;
pub use session::{scan, LinkEvent, LinkSession};

pub mod metrics;

// ── Version info ────────────────────────────────────────────────────────

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PROTOCOL_NAME: &str = "sps";
