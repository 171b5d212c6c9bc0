//! Error types for firmware update operations

use pldm_fw_wire::{WireError, completion_code};
use thiserror::Error;

use crate::records::EndpointId;

/// Errors that can occur while updating a firmware device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// Local message construction failed
    #[error("Failed to encode {command}: {reason}")]
    Encode {
        /// Command being built
        command: &'static str,
        /// Underlying codec failure
        reason: String,
    },

    /// A response was malformed or truncated
    #[error("Failed to decode {command} response: {reason}")]
    Decode {
        /// Command whose response failed to decode
        command: &'static str,
        /// Underlying codec failure
        reason: String,
    },

    /// The target answered with a non-success completion code
    #[error("{command} rejected by target with completion code {completion_code:#04x}")]
    Remote {
        /// Command that was rejected
        command: &'static str,
        /// Completion code returned by the target
        completion_code: u8,
    },

    /// A data request fell outside the negotiated bounds
    #[error("Firmware data request offset={offset} length={length} out of bounds ({})", completion_code::name(*.completion_code))]
    ProtocolRange {
        /// Completion code answered to the target
        completion_code: u8,
        /// Requested offset
        offset: u32,
        /// Requested length
        length: u32,
    },

    /// The dispatcher could not deliver a request or its response
    #[error("Transport error: {0}")]
    Transport(String),

    /// No instance id is free for the endpoint
    #[error("No instance id available for endpoint {endpoint}")]
    ResourceExhausted {
        /// Endpoint whose pool is exhausted
        endpoint: EndpointId,
    },

    /// A waiting state expired
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    /// Device record or component table is inconsistent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid agent configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reading component image bytes failed
    #[error("Package read failed: {0}")]
    PackageRead(String),

    /// An update session already exists for the endpoint
    #[error("Update already in progress for endpoint {0}")]
    UpdateInProgress(EndpointId),

    /// The update was cancelled by the agent
    #[error("Update cancelled")]
    Cancelled,

    /// The session is gone
    #[error("Update session closed")]
    SessionClosed,
}

impl UpdateError {
    /// Create an encode error from a codec failure
    pub fn encode(command: &'static str, err: &WireError) -> Self {
        Self::Encode {
            command,
            reason: err.to_string(),
        }
    }

    /// Create a decode error from a codec failure
    pub fn decode(command: &'static str, err: &WireError) -> Self {
        Self::Decode {
            command,
            reason: err.to_string(),
        }
    }

    /// Create a timeout error
    pub fn timeout(waiting_for: impl Into<String>) -> Self {
        Self::Timeout(waiting_for.into())
    }

    /// Check if a fresh attempt at the whole update could succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            UpdateError::Transport(_)
                | UpdateError::Timeout(_)
                | UpdateError::ResourceExhausted { .. }
                | UpdateError::Remote { .. }
        )
    }

    /// Completion code carried by the error, if any
    pub fn completion_code(&self) -> Option<u8> {
        match self {
            UpdateError::Remote {
                completion_code, ..
            }
            | UpdateError::ProtocolRange {
                completion_code, ..
            } => Some(*completion_code),
            _ => None,
        }
    }
}

/// Specialized Result type for update operations
pub type UpdateResult<T> = std::result::Result<T, UpdateError>;
