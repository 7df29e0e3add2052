//! Error types for the SPS core protocol engine

use std::fmt;

/// Result type for SPS core operations
pub type LinkResult<T> = std::result::Result<T, LinkError>;

/// Error types produced by the credit-flow protocol engine.
///
/// This is intentionally minimal — only the 3 variants the engine actually produces.
#[derive(Debug)]
pub enum LinkError {
    /// Local send attempted with no outbound credit available
    InsufficientCredit,
    /// Protocol-level errors (malformed credits message, bad state)
    Protocol { message: String },
    /// Operation attempted on a link that has already been torn down
    Disconnected,
}

impl LinkError {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        LinkError::Protocol {
            message: message.into(),
        }
    }

    /// Check if the caller can recover by waiting and retrying.
    ///
    /// Only `InsufficientCredit` qualifies — a later credit grant from the
    /// peer makes the same send valid again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LinkError::InsufficientCredit)
    }

    /// Check if this is a fatal error that should stop the engine
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkError::Disconnected)
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::InsufficientCredit => write!(f, "Insufficient outbound credit"),
            LinkError::Protocol { message } => write!(f, "Protocol error: {message}"),
            LinkError::Disconnected => write!(f, "Link disconnected"),
        }
    }
}

impl std::error::Error for LinkError {}
