//! Configuration types for the SPS core protocol engine

use crate::error::{LinkError, LinkResult};
use crate::protocol::constants::{DEFAULT_GRANT_BATCH, MAX_GRANT};

/// Protocol-only configuration for the link engine.
///
/// Contains only the fields the engine reads — no transport or I/O settings.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Number of credits granted to the peer per replenishment batch
    pub grant_batch: u8,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            grant_batch: DEFAULT_GRANT_BATCH,
        }
    }
}

impl LinkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant_batch(mut self, batch: u8) -> Self {
        self.grant_batch = batch;
        self
    }

    pub fn validate(&self) -> LinkResult<()> {
        if self.grant_batch == 0 {
            return Err(LinkError::protocol("grant batch must be greater than 0"));
        }
        if self.grant_batch > MAX_GRANT {
            return Err(LinkError::protocol(format!(
                "grant batch must be at most {MAX_GRANT}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_batch_is_valid() {
        let config = LinkConfig::default();
        assert_eq!(config.grant_batch, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_and_sentinel_batches_rejected() {
        assert!(LinkConfig::new().grant_batch(0).validate().is_err());
        assert!(LinkConfig::new().grant_batch(0xFF).validate().is_err());
        assert!(LinkConfig::new().grant_batch(0xFE).validate().is_ok());
    }
}
