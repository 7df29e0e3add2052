//! Pure synchronous SPS credit-flow protocol engine.
//!
//! This crate implements the credit accounting, replenishment policy, and
//! disconnect-sentinel handling of the Serial Port Service link with zero
//! runtime dependencies — no tokio, no async, no I/O. It only depends on
//! `bytes` and optionally `tracing`.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  sps-core                    │
//! │                              │
//! │  protocol  ← wire constants  │
//! │  config    ← tuning          │
//! │  error     ← 3 variants      │
//! │  engine    ← state machine   │
//! └──────────────────────────────┘
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;

pub use config::LinkConfig;
pub use engine::{CreditUpdate, DisconnectReason, LinkEngine, LinkState, Replenish};
pub use error::{LinkError, LinkResult};
pub use protocol::*;
