//! Error types for the async SPS link.
//!
//! [`SpsError`] extends [`sps_core::LinkError`] with the transport,
//! connection, and config variants needed by the async runtime layer.

use std::fmt;
use thiserror::Error;

pub use sps_core::LinkError;

pub type Result<T> = std::result::Result<T, SpsError>;

// ── Error types ─────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum SpsError {
    #[error("{0}")]
    Core(#[from] LinkError),

    #[error("Transport error during {op}: {message}")]
    Transport { op: &'static str, message: String },

    #[error("Connection error: {kind}")]
    Connection { kind: ConnectionError },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

#[derive(Debug, Clone)]
pub enum ConnectionError {
    Closed,
    Refused,
    Lost,
    Timeout,
    NotConnected,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "link closed"),
            Self::Refused => write!(f, "connection refused"),
            Self::Lost => write!(f, "connection lost"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::NotConnected => write!(f, "not connected"),
        }
    }
}

// ── Constructors ────────────────────────────────────────────────────────

impl SpsError {
    pub fn transport(op: &'static str, message: impl Into<String>) -> Self {
        Self::Transport {
            op,
            message: message.into(),
        }
    }

    pub fn connection(kind: ConnectionError) -> Self {
        Self::Connection { kind }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

// ── Predicates ──────────────────────────────────────────────────────────

impl SpsError {
    /// Local send rejected at a zero outbound balance; the caller may wait
    /// for a credit-grant event and retry the same send.
    pub fn is_insufficient_credit(&self) -> bool {
        matches!(self, Self::Core(LinkError::InsufficientCredit))
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Core(e) => e.is_recoverable(),
            Self::Connection { kind } => {
                matches!(kind, ConnectionError::Lost | ConnectionError::Timeout)
            }
            _ => false,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Core(LinkError::Disconnected)
                | Self::Connection {
                    kind: ConnectionError::Closed | ConnectionError::Lost
                }
        )
    }

    /// The link is gone — either side has torn it down.
    pub fn is_peer_closed(&self) -> bool {
        matches!(
            self,
            Self::Core(LinkError::Disconnected)
                | Self::Connection {
                    kind: ConnectionError::Closed
                        | ConnectionError::Lost
                        | ConnectionError::NotConnected
                }
        )
    }
}
