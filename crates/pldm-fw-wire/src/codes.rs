//! Command codes, completion codes and small enumerations of the
//! firmware-update command set.

use std::fmt;

use crate::error::{WireError, WireResult};

/// PLDM type number for firmware update.
pub const PLDM_TYPE_FIRMWARE_UPDATE: u8 = 0x05;

/// Smallest chunk length a target may request, and the trailing slack
/// allowed past the end of a component image.
pub const BASELINE_TRANSFER_SIZE: u32 = 32;

/// Minimum number of outstanding transfer requests a target must support.
pub const MIN_OUTSTANDING_TRANSFER_REQUESTS: u8 = 1;

/// Firmware-update command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FwUpCommand {
    /// QueryDeviceIdentifiers
    QueryDeviceIdentifiers = 0x01,
    /// GetFirmwareParameters
    GetFirmwareParameters = 0x02,
    /// RequestUpdate
    RequestUpdate = 0x10,
    /// GetPackageData
    GetPackageData = 0x11,
    /// GetDeviceMetaData
    GetDeviceMetaData = 0x12,
    /// PassComponentTable
    PassComponentTable = 0x13,
    /// UpdateComponent
    UpdateComponent = 0x14,
    /// RequestFirmwareData
    RequestFirmwareData = 0x15,
    /// TransferComplete
    TransferComplete = 0x16,
    /// VerifyComplete
    VerifyComplete = 0x17,
    /// ApplyComplete
    ApplyComplete = 0x18,
    /// GetMetaData
    GetMetaData = 0x19,
    /// ActivateFirmware
    ActivateFirmware = 0x1A,
    /// GetStatus
    GetStatus = 0x1B,
    /// CancelUpdateComponent
    CancelUpdateComponent = 0x1C,
    /// CancelUpdate
    CancelUpdate = 0x1D,
}

impl FwUpCommand {
    /// Raw command code
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Look up a command by its raw code
    pub fn from_code(code: u8) -> Option<Self> {
        let command = match code {
            0x01 => Self::QueryDeviceIdentifiers,
            0x02 => Self::GetFirmwareParameters,
            0x10 => Self::RequestUpdate,
            0x11 => Self::GetPackageData,
            0x12 => Self::GetDeviceMetaData,
            0x13 => Self::PassComponentTable,
            0x14 => Self::UpdateComponent,
            0x15 => Self::RequestFirmwareData,
            0x16 => Self::TransferComplete,
            0x17 => Self::VerifyComplete,
            0x18 => Self::ApplyComplete,
            0x19 => Self::GetMetaData,
            0x1A => Self::ActivateFirmware,
            0x1B => Self::GetStatus,
            0x1C => Self::CancelUpdateComponent,
            0x1D => Self::CancelUpdate,
            _ => return None,
        };
        Some(command)
    }

    /// Command name as used in logs and errors
    pub const fn name(self) -> &'static str {
        match self {
            Self::QueryDeviceIdentifiers => "QueryDeviceIdentifiers",
            Self::GetFirmwareParameters => "GetFirmwareParameters",
            Self::RequestUpdate => "RequestUpdate",
            Self::GetPackageData => "GetPackageData",
            Self::GetDeviceMetaData => "GetDeviceMetaData",
            Self::PassComponentTable => "PassComponentTable",
            Self::UpdateComponent => "UpdateComponent",
            Self::RequestFirmwareData => "RequestFirmwareData",
            Self::TransferComplete => "TransferComplete",
            Self::VerifyComplete => "VerifyComplete",
            Self::ApplyComplete => "ApplyComplete",
            Self::GetMetaData => "GetMetaData",
            Self::ActivateFirmware => "ActivateFirmware",
            Self::GetStatus => "GetStatus",
            Self::CancelUpdateComponent => "CancelUpdateComponent",
            Self::CancelUpdate => "CancelUpdate",
        }
    }

    /// Whether the target, not the update agent, initiates this command
    pub fn is_device_initiated(self) -> bool {
        matches!(
            self,
            Self::GetPackageData
                | Self::RequestFirmwareData
                | Self::TransferComplete
                | Self::VerifyComplete
                | Self::ApplyComplete
                | Self::GetMetaData
        )
    }
}

impl fmt::Display for FwUpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Completion codes carried in every response.
pub mod completion_code {
    /// Success
    pub const SUCCESS: u8 = 0x00;
    /// Generic failure
    pub const ERROR: u8 = 0x01;
    /// Request carried invalid data
    pub const ERROR_INVALID_DATA: u8 = 0x02;
    /// Request had the wrong length
    pub const ERROR_INVALID_LENGTH: u8 = 0x03;
    /// Responder not ready
    pub const ERROR_NOT_READY: u8 = 0x04;
    /// Command not supported
    pub const ERROR_UNSUPPORTED_PLDM_CMD: u8 = 0x05;
    /// PLDM type not supported
    pub const ERROR_INVALID_PLDM_TYPE: u8 = 0x20;

    /// Target is not in update mode
    pub const NOT_IN_UPDATE_MODE: u8 = 0x80;
    /// Target is already in update mode
    pub const ALREADY_IN_UPDATE_MODE: u8 = 0x81;
    /// Requested data lies outside the component image
    pub const DATA_OUT_OF_RANGE: u8 = 0x82;
    /// Requested chunk length outside the negotiated bounds
    pub const INVALID_TRANSFER_LENGTH: u8 = 0x83;
    /// Command not valid in the current state
    pub const INVALID_STATE_FOR_COMMAND: u8 = 0x84;
    /// Update is incomplete
    pub const INCOMPLETE_UPDATE: u8 = 0x85;
    /// Busy in background
    pub const BUSY_IN_BACKGROUND: u8 = 0x86;
    /// Cancel pending
    pub const CANCEL_PENDING: u8 = 0x87;
    /// Command not expected at this point of the update
    pub const COMMAND_NOT_EXPECTED: u8 = 0x88;
    /// Retry RequestFirmwareData
    pub const RETRY_REQUEST_FW_DATA: u8 = 0x89;
    /// Unable to initiate update
    pub const UNABLE_TO_INITIATE_UPDATE: u8 = 0x8A;
    /// Activation not required
    pub const ACTIVATION_NOT_REQUIRED: u8 = 0x8B;
    /// Self-contained activation not permitted
    pub const SELF_CONTAINED_ACTIVATION_NOT_PERMITTED: u8 = 0x8C;
    /// No device metadata
    pub const NO_DEVICE_METADATA: u8 = 0x8D;
    /// Retry RequestUpdate
    pub const RETRY_REQUEST_UPDATE: u8 = 0x8E;
    /// No package data available
    pub const NO_PACKAGE_DATA: u8 = 0x8F;
    /// Unknown multipart transfer handle
    pub const INVALID_TRANSFER_HANDLE: u8 = 0x90;
    /// Unknown multipart operation flag
    pub const INVALID_TRANSFER_OPERATION_FLAG: u8 = 0x91;
    /// Activating the pending image is not permitted
    pub const ACTIVATE_PENDING_IMAGE_NOT_PERMITTED: u8 = 0x92;
    /// Package data error
    pub const PACKAGE_DATA_ERROR: u8 = 0x93;

    /// Human-readable name for logging
    pub fn name(code: u8) -> &'static str {
        match code {
            SUCCESS => "SUCCESS",
            ERROR => "ERROR",
            ERROR_INVALID_DATA => "ERROR_INVALID_DATA",
            ERROR_INVALID_LENGTH => "ERROR_INVALID_LENGTH",
            ERROR_NOT_READY => "ERROR_NOT_READY",
            ERROR_UNSUPPORTED_PLDM_CMD => "ERROR_UNSUPPORTED_PLDM_CMD",
            ERROR_INVALID_PLDM_TYPE => "ERROR_INVALID_PLDM_TYPE",
            NOT_IN_UPDATE_MODE => "NOT_IN_UPDATE_MODE",
            ALREADY_IN_UPDATE_MODE => "ALREADY_IN_UPDATE_MODE",
            DATA_OUT_OF_RANGE => "DATA_OUT_OF_RANGE",
            INVALID_TRANSFER_LENGTH => "INVALID_TRANSFER_LENGTH",
            INVALID_STATE_FOR_COMMAND => "INVALID_STATE_FOR_COMMAND",
            INCOMPLETE_UPDATE => "INCOMPLETE_UPDATE",
            BUSY_IN_BACKGROUND => "BUSY_IN_BACKGROUND",
            CANCEL_PENDING => "CANCEL_PENDING",
            COMMAND_NOT_EXPECTED => "COMMAND_NOT_EXPECTED",
            RETRY_REQUEST_FW_DATA => "RETRY_REQUEST_FW_DATA",
            UNABLE_TO_INITIATE_UPDATE => "UNABLE_TO_INITIATE_UPDATE",
            ACTIVATION_NOT_REQUIRED => "ACTIVATION_NOT_REQUIRED",
            SELF_CONTAINED_ACTIVATION_NOT_PERMITTED => "SELF_CONTAINED_ACTIVATION_NOT_PERMITTED",
            NO_DEVICE_METADATA => "NO_DEVICE_METADATA",
            RETRY_REQUEST_UPDATE => "RETRY_REQUEST_UPDATE",
            NO_PACKAGE_DATA => "NO_PACKAGE_DATA",
            INVALID_TRANSFER_HANDLE => "INVALID_TRANSFER_HANDLE",
            INVALID_TRANSFER_OPERATION_FLAG => "INVALID_TRANSFER_OPERATION_FLAG",
            ACTIVATE_PENDING_IMAGE_NOT_PERMITTED => "ACTIVATE_PENDING_IMAGE_NOT_PERMITTED",
            PACKAGE_DATA_ERROR => "PACKAGE_DATA_ERROR",
            _ => "UNKNOWN",
        }
    }
}

/// Position marker of one part within an ordered multipart transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransferFlag {
    /// First part of several
    Start = 0x01,
    /// Neither first nor last
    Middle = 0x02,
    /// Last part of several
    End = 0x04,
    /// The only part
    StartAndEnd = 0x05,
}

impl TransferFlag {
    /// Flag for a part that is (or is not) first and (or not) last
    pub fn from_bounds(is_first: bool, is_last: bool) -> Self {
        match (is_first, is_last) {
            (true, true) => Self::StartAndEnd,
            (true, false) => Self::Start,
            (false, true) => Self::End,
            (false, false) => Self::Middle,
        }
    }

    /// Flag for entry `position` of a table with `count` entries
    pub fn for_position(position: usize, count: usize) -> Self {
        Self::from_bounds(position == 0, position.saturating_add(1) >= count)
    }

    /// Raw flag value
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Parse a raw flag value
    pub fn from_code(code: u8) -> WireResult<Self> {
        match code {
            0x01 => Ok(Self::Start),
            0x02 => Ok(Self::Middle),
            0x04 => Ok(Self::End),
            0x05 => Ok(Self::StartAndEnd),
            other => Err(WireError::InvalidValue {
                field: "transfer flag",
                value: u32::from(other),
            }),
        }
    }
}

/// Multipart operation requested by GetPackageData
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransferOperation {
    /// Continue from the supplied handle
    GetNextPart = 0x00,
    /// Restart from the beginning; the handle is ignored
    GetFirstPart = 0x01,
}

impl TransferOperation {
    /// Parse a raw operation flag
    pub fn from_code(code: u8) -> WireResult<Self> {
        match code {
            0x00 => Ok(Self::GetNextPart),
            0x01 => Ok(Self::GetFirstPart),
            other => Err(WireError::InvalidValue {
                field: "transfer operation flag",
                value: u32::from(other),
            }),
        }
    }
}

/// Encoding of a version string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StringType {
    /// Unknown encoding
    Unknown = 0,
    /// 7-bit ASCII
    Ascii = 1,
    /// UTF-8
    Utf8 = 2,
    /// UTF-16 with byte order mark
    Utf16 = 3,
    /// UTF-16 little-endian
    Utf16Le = 4,
    /// UTF-16 big-endian
    Utf16Be = 5,
}

impl StringType {
    /// Parse a raw string type
    pub fn from_code(code: u8) -> WireResult<Self> {
        match code {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Ascii),
            2 => Ok(Self::Utf8),
            3 => Ok(Self::Utf16),
            4 => Ok(Self::Utf16Le),
            5 => Ok(Self::Utf16Be),
            other => Err(WireError::InvalidValue {
                field: "version string type",
                value: u32::from(other),
            }),
        }
    }
}

/// Bit masks of the package component options and UpdateComponent flags.
pub mod option_bits {
    /// Package component option: force update even if versions match
    pub const COMPONENT_FORCE_UPDATE: u16 = 1 << 0;
    /// UpdateComponent option flag: request force update
    pub const REQUEST_FORCE_UPDATE: u32 = 1 << 0;
}

/// Translate package component options into UpdateComponent option flags.
///
/// Only the force-update bit is forwarded.
pub fn update_option_flags(component_options: u16) -> u32 {
    if component_options & option_bits::COMPONENT_FORCE_UPDATE != 0 {
        option_bits::REQUEST_FORCE_UPDATE
    } else {
        0
    }
}
