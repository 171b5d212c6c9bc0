//! Agent-side update configuration

use std::time::Duration;

use pldm_fw_wire::{BASELINE_TRANSFER_SIZE, MIN_OUTSTANDING_TRANSFER_REQUESTS};
use serde::{Deserialize, Serialize};

use crate::error::{UpdateError, UpdateResult};

/// Configuration shared by every update session an agent runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Largest firmware data chunk the agent serves per request.
    pub max_transfer_size: u32,
    /// Smallest chunk a target may request; also the trailing slack
    /// allowed past the end of a component image.
    pub baseline_transfer_size: u32,
    /// Outstanding transfer requests advertised in RequestUpdate.
    pub max_outstanding_transfer_requests: u8,
    /// Age after which a held instance id may be forcibly reclaimed.
    pub instance_id_expiry: Duration,
    /// Bound on every agent-initiated command exchange.
    pub command_timeout: Duration,
    /// Bound on the silence between target requests while a component is
    /// outstanding.
    pub component_outcome_timeout: Duration,
    /// Send a best-effort CancelUpdate when a session fails in update mode.
    pub cancel_on_failure: bool,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            max_transfer_size: 4096,
            baseline_transfer_size: BASELINE_TRANSFER_SIZE,
            max_outstanding_transfer_requests: MIN_OUTSTANDING_TRANSFER_REQUESTS,
            instance_id_expiry: Duration::from_secs(5),
            command_timeout: Duration::from_secs(5),
            component_outcome_timeout: Duration::from_secs(60),
            cancel_on_failure: true,
        }
    }
}

impl UpdateConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::InvalidConfig`] if any value is out of range.
    pub fn validate(&self) -> UpdateResult<()> {
        if self.baseline_transfer_size < BASELINE_TRANSFER_SIZE {
            return Err(UpdateError::InvalidConfig(format!(
                "baseline_transfer_size must be at least {BASELINE_TRANSFER_SIZE}"
            )));
        }
        if self.max_transfer_size < self.baseline_transfer_size {
            return Err(UpdateError::InvalidConfig(
                "max_transfer_size must not be smaller than baseline_transfer_size".to_string(),
            ));
        }
        if self.max_outstanding_transfer_requests < MIN_OUTSTANDING_TRANSFER_REQUESTS {
            return Err(UpdateError::InvalidConfig(
                "max_outstanding_transfer_requests must be greater than 0".to_string(),
            ));
        }
        if self.instance_id_expiry.is_zero() {
            return Err(UpdateError::InvalidConfig(
                "instance_id_expiry must be greater than 0".to_string(),
            ));
        }
        if self.command_timeout.is_zero() {
            return Err(UpdateError::InvalidConfig(
                "command_timeout must be greater than 0".to_string(),
            ));
        }
        if self.component_outcome_timeout.is_zero() {
            return Err(UpdateError::InvalidConfig(
                "component_outcome_timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> UpdateConfigBuilder {
        UpdateConfigBuilder::default()
    }
}

/// Builder for `UpdateConfig`.
#[derive(Debug, Default)]
pub struct UpdateConfigBuilder {
    config: UpdateConfig,
}

impl UpdateConfigBuilder {
    /// Set the maximum transfer size.
    #[must_use]
    pub fn max_transfer_size(mut self, bytes: u32) -> Self {
        self.config.max_transfer_size = bytes;
        self
    }

    /// Set the baseline transfer size.
    #[must_use]
    pub fn baseline_transfer_size(mut self, bytes: u32) -> Self {
        self.config.baseline_transfer_size = bytes;
        self
    }

    /// Set the advertised outstanding transfer requests.
    #[must_use]
    pub fn max_outstanding_transfer_requests(mut self, count: u8) -> Self {
        self.config.max_outstanding_transfer_requests = count;
        self
    }

    /// Set the instance id expiry.
    #[must_use]
    pub fn instance_id_expiry(mut self, expiry: Duration) -> Self {
        self.config.instance_id_expiry = expiry;
        self
    }

    /// Set the per-command timeout.
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Set the component outcome timeout.
    #[must_use]
    pub fn component_outcome_timeout(mut self, timeout: Duration) -> Self {
        self.config.component_outcome_timeout = timeout;
        self
    }

    /// Enable or disable CancelUpdate on failure.
    #[must_use]
    pub fn cancel_on_failure(mut self, enabled: bool) -> Self {
        self.config.cancel_on_failure = enabled;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> UpdateResult<UpdateConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
