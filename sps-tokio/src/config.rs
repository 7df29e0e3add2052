//! Configuration types for the async SPS link.
//!
//! [`SpsConfig`] extends the core [`LinkConfig`] with transport-level
//! settings (timeouts, channel UUIDs, buffer depths).

use std::time::Duration;

use sps_core::protocol::constants::{
    DEFAULT_GRANT_BATCH, MAX_GRANT, SPS_CREDITS_UUID, SPS_FIFO_UUID, SPS_SERVICE_UUID,
};
use sps_core::LinkConfig;

use crate::error::{Result, SpsError};

/// Full SPS configuration — protocol settings + transport / runtime settings.
#[derive(Debug, Clone)]
pub struct SpsConfig {
    // Protocol settings (forwarded to the sps-core engine)
    /// Credits granted to the peer per replenishment batch (1..=254)
    pub grant_batch: u8,

    // Transport / runtime settings (used only by sps-tokio)
    /// Discovery scan window
    pub scan_timeout: Duration,
    /// Deadline for the transport connect step
    pub connect_timeout: Duration,
    /// Service UUID, overridable for peers with a relocated service
    pub service_uuid: String,
    /// Data (FIFO) characteristic UUID
    pub fifo_uuid: String,
    /// Credits characteristic UUID
    pub credits_uuid: String,
    /// Capacity of the observer event stream
    pub event_buffer: usize,
    /// Capacity of the inbound frame queue handed to the caller. Must be
    /// at least `grant_batch`; each credit granted to the peer reserves a
    /// slot here, so the depth bounds how far the peer runs ahead of a
    /// slow reader.
    pub recv_buffer: usize,
}

impl Default for SpsConfig {
    fn default() -> Self {
        Self {
            grant_batch: DEFAULT_GRANT_BATCH,
            scan_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            service_uuid: SPS_SERVICE_UUID.to_owned(),
            fifo_uuid: SPS_FIFO_UUID.to_owned(),
            credits_uuid: SPS_CREDITS_UUID.to_owned(),
            event_buffer: 16,
            recv_buffer: 32,
        }
    }
}

/// Extracts the protocol-only fields that `LinkEngine` reads.
impl From<SpsConfig> for LinkConfig {
    fn from(c: SpsConfig) -> Self {
        LinkConfig::new().grant_batch(c.grant_batch)
    }
}

// ── Builder methods ─────────────────────────────────────────────────────

impl SpsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Protocol tuning --

    pub fn grant_batch(mut self, batch: u8) -> Self {
        self.grant_batch = batch;
        self
    }

    // -- Transport / runtime tuning --

    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn service_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.service_uuid = uuid.into();
        self
    }

    pub fn fifo_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.fifo_uuid = uuid.into();
        self
    }

    pub fn credits_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.credits_uuid = uuid.into();
        self
    }

    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    pub fn recv_buffer(mut self, capacity: usize) -> Self {
        self.recv_buffer = capacity;
        self
    }

    // -- Validation --

    pub fn validate(&self) -> Result<()> {
        if self.grant_batch == 0 || self.grant_batch > MAX_GRANT {
            return Err(SpsError::config(format!(
                "grant batch must be 1..={MAX_GRANT}"
            )));
        }
        if self.service_uuid.is_empty()
            || self.fifo_uuid.is_empty()
            || self.credits_uuid.is_empty()
        {
            return Err(SpsError::config("channel UUIDs must not be empty"));
        }
        if self.event_buffer == 0 || self.recv_buffer == 0 {
            return Err(SpsError::config("buffer capacities must be greater than 0"));
        }
        if self.recv_buffer < self.grant_batch as usize {
            return Err(SpsError::config(
                "recv buffer must hold at least one grant batch",
            ));
        }
        Ok(())
    }
}

// ── Presets ──────────────────────────────────────────────────────────────

impl SpsConfig {
    /// Throughput-oriented: large grant batches, deep inbound queue.
    pub fn bulk() -> Self {
        Self::default()
            .grant_batch(100)
            .recv_buffer(256)
            .connect_timeout(Duration::from_secs(30))
    }

    /// For peers with tiny receive buffers: tight allowance, short scans.
    pub fn constrained() -> Self {
        Self::default()
            .grant_batch(2)
            .recv_buffer(4)
            .scan_timeout(Duration::from_secs(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SpsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grant_batch, 10);
        assert_eq!(config.service_uuid, SPS_SERVICE_UUID);
    }

    #[test]
    fn presets_are_valid() {
        assert!(SpsConfig::bulk().validate().is_ok());
        assert!(SpsConfig::constrained().validate().is_ok());
    }

    #[test]
    fn invalid_configs_rejected() {
        assert!(SpsConfig::new().grant_batch(0).validate().is_err());
        assert!(SpsConfig::new().grant_batch(0xFF).validate().is_err());
        assert!(SpsConfig::new().service_uuid("").validate().is_err());
        assert!(SpsConfig::new().recv_buffer(4).validate().is_err());
    }

    #[test]
    fn projects_onto_core_config() {
        let core: LinkConfig = SpsConfig::new().grant_batch(25).into();
        assert_eq!(core.grant_batch, 25);
    }
}
