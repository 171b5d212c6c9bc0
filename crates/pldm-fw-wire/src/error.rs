//! Error types for PLDM firmware-update encoding and decoding

use thiserror::Error;

use crate::codes::completion_code;

/// Errors produced while encoding or decoding firmware-update messages
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Input ended before a field could be read
    #[error("Message truncated reading {field}: need {needed} bytes, {available} available")]
    Truncated {
        /// Field being decoded
        field: &'static str,
        /// Bytes required by the field
        needed: usize,
        /// Bytes left in the input
        available: usize,
    },

    /// A fixed-size body carried extra bytes
    #[error("{count} unexpected trailing bytes after {message}")]
    TrailingBytes {
        /// Message being decoded
        message: &'static str,
        /// Number of surplus bytes
        count: usize,
    },

    /// A value does not fit its wire field
    #[error("Field {field} value {value} does not fit the wire format")]
    FieldOverflow {
        /// Field being encoded
        field: &'static str,
        /// Offending value
        value: usize,
    },

    /// A field carried a value outside its defined set
    #[error("Invalid value {value:#04x} for {field}")]
    InvalidValue {
        /// Field being decoded
        field: &'static str,
        /// Raw value found on the wire
        value: u32,
    },

    /// A request was decoded as a response or vice versa
    #[error("Expected a {expected} message")]
    WrongDirection {
        /// Direction the caller asked for
        expected: &'static str,
    },
}

impl WireError {
    /// Completion code a responder should answer with for this decode failure
    pub fn completion_code(&self) -> u8 {
        match self {
            WireError::Truncated { .. } | WireError::TrailingBytes { .. } => {
                completion_code::ERROR_INVALID_LENGTH
            }
            WireError::FieldOverflow { .. }
            | WireError::InvalidValue { .. }
            | WireError::WrongDirection { .. } => completion_code::ERROR_INVALID_DATA,
        }
    }
}

/// Specialized Result type for wire operations
pub type WireResult<T> = std::result::Result<T, WireError>;
