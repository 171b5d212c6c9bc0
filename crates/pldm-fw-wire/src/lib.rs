//! PLDM firmware-update wire format: message framing, codes and bodies.
//!
//! This crate is intentionally I/O-free. It provides pure types and
//! bounds-checked encode/decode functions that can be tested and fuzzed
//! without a transport.
//!
//! # Architecture
//!
//! - [`header`]: three-byte PLDM header, instance ids, full request/response framing
//! - [`codes`]: command codes, completion codes, transfer flags, string types
//! - [`messages`]: one body type per command, each implementing [`WireMessage`]
//! - [`error`]: decode/encode errors and their completion-code mapping
//!
//! # Example
//!
//! ```
//! use pldm_fw_wire::{
//!     FwUpCommand, InstanceId, RequestFirmwareDataRequest, RequestMessage, WireError, WireMessage,
//! };
//!
//! # fn main() -> Result<(), WireError> {
//! let body = RequestFirmwareDataRequest { offset: 0, length: 64 }.encode()?;
//! let id = InstanceId::new(1).ok_or(WireError::InvalidValue {
//!     field: "instance id",
//!     value: 1,
//! })?;
//! let request =
//!     RequestMessage::firmware_update(id, FwUpCommand::RequestFirmwareData.code(), body);
//! let parsed = RequestMessage::from_bytes(&request.to_bytes())?;
//! assert_eq!(RequestFirmwareDataRequest::decode(&parsed.payload)?.length, 64);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod codes;
mod cursor;
pub mod error;
pub mod header;
pub mod messages;

pub use codes::{
    BASELINE_TRANSFER_SIZE, FwUpCommand, MIN_OUTSTANDING_TRANSFER_REQUESTS,
    PLDM_TYPE_FIRMWARE_UPDATE, StringType, TransferFlag, TransferOperation, completion_code,
    option_bits, update_option_flags,
};
pub use error::{WireError, WireResult};
pub use header::{HEADER_LEN, InstanceId, MessageHeader, RequestMessage, ResponseMessage};
pub use messages::{
    ActivateFirmwareRequest, ActivateFirmwareResponse, ApplyCompleteRequest, CancelUpdateResponse,
    ComponentIdentity, GetPackageDataRequest, GetPackageDataResponse, PassComponentTableRequest,
    PassComponentTableResponse, RequestFirmwareDataRequest, RequestUpdateRequest,
    RequestUpdateResponse, TransferCompleteRequest, UpdateComponentRequest,
    UpdateComponentResponse, VerifyCompleteRequest, VersionString, WireMessage,
};
