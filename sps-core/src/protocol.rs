//! SPS wire constants, credits-channel codec, and text helpers

use bytes::Bytes;

use crate::error::{LinkError, LinkResult};

/// SPS characteristic layout.
///
/// These UUIDs identify the Serial Port Service and its two channels; they
/// are agreed with the peer implementation out of band, never negotiated at
/// runtime. The FIFO characteristic carries data in both directions.
pub mod constants {
    /// Serial Port Service UUID
    pub const SPS_SERVICE_UUID: &str = "2456e1b9-26e2-8f83-e744-f34f01e9d701";
    /// Data (FIFO) characteristic UUID — same UUID both directions
    pub const SPS_FIFO_UUID: &str = "2456e1b9-26e2-8f83-e744-f34f01e9d703";
    /// Credits characteristic UUID — 1-byte flow-control messages
    pub const SPS_CREDITS_UUID: &str = "2456e1b9-26e2-8f83-e744-f34f01e9d704";

    /// Reserved credits-channel value meaning "I am disconnecting".
    /// Never a valid credit quantity.
    pub const DISCONNECT_SENTINEL: u8 = 0xFF;
    /// Largest quantity a single grant message can carry
    pub const MAX_GRANT: u8 = 0xFE;
    /// Default number of credits granted to the peer per batch
    pub const DEFAULT_GRANT_BATCH: u8 = 10;
}

pub use constants::*;

/// A decoded credits-channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditMessage {
    /// The peer granted us `n` more sends (0..=254)
    Grant(u8),
    /// The peer is disconnecting (reserved value 0xFF)
    Sentinel,
}

/// Encode a credit grant as a 1-byte credits-channel message.
///
/// Rejects the reserved sentinel value; use [`encode_sentinel`] to signal
/// disconnect.
pub fn encode_grant(quantity: u8) -> LinkResult<Bytes> {
    if quantity > MAX_GRANT {
        return Err(LinkError::protocol(format!(
            "grant quantity {quantity} exceeds maximum {MAX_GRANT}"
        )));
    }
    Ok(Bytes::copy_from_slice(&[quantity]))
}

/// Encode the disconnect sentinel as a credits-channel message.
pub fn encode_sentinel() -> Bytes {
    Bytes::copy_from_slice(&[DISCONNECT_SENTINEL])
}

/// Decode a credits-channel message.
///
/// The credits channel carries exactly one byte per message; anything else
/// is a protocol error and the message must be discarded.
pub fn decode_credit(message: &[u8]) -> LinkResult<CreditMessage> {
    match message {
        [DISCONNECT_SENTINEL] => Ok(CreditMessage::Sentinel),
        [quantity] => Ok(CreditMessage::Grant(*quantity)),
        [] => Err(LinkError::protocol("empty credits message")),
        _ => Err(LinkError::protocol(format!(
            "credits message must be 1 byte, got {}",
            message.len()
        ))),
    }
}

/// Encode text as a data frame. The link's byte-to-text mapping is 7-bit
/// ASCII (byte value == character code), both directions.
pub fn text_to_frame(text: &str) -> LinkResult<Bytes> {
    if !text.is_ascii() {
        return Err(LinkError::protocol("text contains non-ASCII characters"));
    }
    Ok(Bytes::copy_from_slice(text.as_bytes()))
}

/// Decode a data frame as ASCII text.
pub fn frame_to_text(frame: &[u8]) -> LinkResult<String> {
    if !frame.is_ascii() {
        return Err(LinkError::protocol("frame contains non-ASCII bytes"));
    }
    let text = std::str::from_utf8(frame)
        .map_err(|e| LinkError::protocol(format!("frame is not valid text: {e}")))?;
    Ok(text.to_owned())
}

/// Statistics for one SPS link
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkStats {
    /// Total data frames sent
    pub frames_sent: u64,
    /// Total data frames received
    pub frames_received: u64,
    /// Total payload bytes sent
    pub bytes_sent: u64,
    /// Total payload bytes received
    pub bytes_received: u64,
    /// Credit grant messages written to the peer
    pub grants_issued: u64,
    /// Credit grant messages received from the peer
    pub grants_received: u64,
    /// Current outbound credit balance (sends we may still make)
    pub outbound_credits: u32,
    /// Current inbound credit balance (sends the peer may still make)
    pub inbound_credits: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_round_trip() {
        let msg = encode_grant(10).unwrap();
        assert_eq!(msg.as_ref(), &[10]);
        assert_eq!(decode_credit(&msg).unwrap(), CreditMessage::Grant(10));
    }

    #[test]
    fn grant_rejects_sentinel_value() {
        assert!(encode_grant(0xFF).is_err());
        assert!(encode_grant(MAX_GRANT).is_ok());
    }

    #[test]
    fn sentinel_is_classified() {
        let msg = encode_sentinel();
        assert_eq!(msg.as_ref(), &[0xFF]);
        assert_eq!(decode_credit(&msg).unwrap(), CreditMessage::Sentinel);
    }

    #[test]
    fn malformed_credits_messages_rejected() {
        assert!(decode_credit(&[]).is_err());
        assert!(decode_credit(&[1, 2]).is_err());
    }

    #[test]
    fn ascii_text_round_trip() {
        let frame = text_to_frame("hello SPS").unwrap();
        assert_eq!(frame_to_text(&frame).unwrap(), "hello SPS");
    }

    #[test]
    fn non_ascii_rejected_both_ways() {
        assert!(text_to_frame("héllo").is_err());
        assert!(frame_to_text(&[0x80]).is_err());
    }
}
