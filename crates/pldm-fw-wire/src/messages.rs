//! Request and response bodies of the firmware-update command set.
//!
//! Response types describe the bytes after the completion code; a response
//! whose completion code is not `SUCCESS` carries no body and is never
//! decoded through these types.

use std::fmt;

use crate::codes::{FwUpCommand, StringType, TransferFlag, TransferOperation};
use crate::cursor::{Reader, put_u16, put_u32, put_u64};
use crate::error::{WireError, WireResult};

/// A body that knows its command and how to move to and from bytes
pub trait WireMessage: Sized {
    /// Command this body belongs to
    const COMMAND: FwUpCommand;

    /// Append the encoded body to `buf`
    fn encode_into(&self, buf: &mut Vec<u8>) -> WireResult<()>;

    /// Decode a body from exactly `payload`
    fn decode(payload: &[u8]) -> WireResult<Self>;

    /// Encode into a fresh buffer
    fn encode(&self) -> WireResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf)?;
        Ok(buf)
    }
}

/// Length-prefixed version string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionString {
    /// Encoding of `bytes`
    pub string_type: StringType,
    /// Raw string bytes
    pub bytes: Vec<u8>,
}

impl VersionString {
    /// Tag a Rust string as ASCII when possible, UTF-8 otherwise
    pub fn new(text: &str) -> Self {
        let string_type = if text.is_ascii() {
            StringType::Ascii
        } else {
            StringType::Utf8
        };
        Self {
            string_type,
            bytes: text.as_bytes().to_vec(),
        }
    }

    fn encode_into(&self, buf: &mut Vec<u8>) -> WireResult<()> {
        let len = u8::try_from(self.bytes.len()).map_err(|_overflow| WireError::FieldOverflow {
            field: "version string length",
            value: self.bytes.len(),
        })?;
        buf.push(self.string_type as u8);
        buf.push(len);
        buf.extend_from_slice(&self.bytes);
        Ok(())
    }

    // Type and length precede the fixed fields in some bodies, so they are
    // read separately from the string bytes.
    fn read_prefix(reader: &mut Reader<'_>) -> WireResult<(StringType, usize)> {
        let string_type = StringType::from_code(reader.u8("version string type")?)?;
        let len = usize::from(reader.u8("version string length")?);
        Ok((string_type, len))
    }

    fn read_bytes(
        reader: &mut Reader<'_>,
        string_type: StringType,
        len: usize,
    ) -> WireResult<Self> {
        let bytes = reader.take(len, "version string")?.to_vec();
        Ok(Self { string_type, bytes })
    }
}

impl fmt::Display for VersionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.bytes))
    }
}

fn u16_field(field: &'static str, value: usize) -> WireResult<u16> {
    u16::try_from(value).map_err(|_overflow| WireError::FieldOverflow { field, value })
}

/// RequestUpdate request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUpdateRequest {
    /// Largest chunk the agent will serve per RequestFirmwareData
    pub max_transfer_size: u32,
    /// Number of components that will be passed
    pub num_components: u16,
    /// Outstanding transfer requests the agent supports
    pub max_outstanding_transfer_requests: u8,
    /// Length of the opaque package data
    pub package_data_length: u16,
    /// Component image set version
    pub image_set_version: VersionString,
}

impl RequestUpdateRequest {
    /// Convenience constructor checking the count fields
    pub fn new(
        max_transfer_size: u32,
        num_components: usize,
        max_outstanding_transfer_requests: u8,
        package_data_length: usize,
        image_set_version: &str,
    ) -> WireResult<Self> {
        Ok(Self {
            max_transfer_size,
            num_components: u16_field("number of components", num_components)?,
            max_outstanding_transfer_requests,
            package_data_length: u16_field("package data length", package_data_length)?,
            image_set_version: VersionString::new(image_set_version),
        })
    }
}

impl WireMessage for RequestUpdateRequest {
    const COMMAND: FwUpCommand = FwUpCommand::RequestUpdate;

    fn encode_into(&self, buf: &mut Vec<u8>) -> WireResult<()> {
        put_u32(buf, self.max_transfer_size);
        put_u16(buf, self.num_components);
        buf.push(self.max_outstanding_transfer_requests);
        put_u16(buf, self.package_data_length);
        self.image_set_version.encode_into(buf)
    }

    fn decode(payload: &[u8]) -> WireResult<Self> {
        let mut reader = Reader::new(payload);
        let max_transfer_size = reader.u32("maximum transfer size")?;
        let num_components = reader.u16("number of components")?;
        let max_outstanding_transfer_requests = reader.u8("maximum outstanding requests")?;
        let package_data_length = reader.u16("package data length")?;
        let (string_type, len) = VersionString::read_prefix(&mut reader)?;
        let image_set_version = VersionString::read_bytes(&mut reader, string_type, len)?;
        reader.finish("RequestUpdate request")?;
        Ok(Self {
            max_transfer_size,
            num_components,
            max_outstanding_transfer_requests,
            package_data_length,
            image_set_version,
        })
    }
}

/// RequestUpdate response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestUpdateResponse {
    /// Length of device metadata the target wants to hand back later
    pub fd_metadata_length: u16,
    /// Whether the target will pull package data with GetPackageData
    pub fd_will_send_package_data: bool,
}

impl WireMessage for RequestUpdateResponse {
    const COMMAND: FwUpCommand = FwUpCommand::RequestUpdate;

    fn encode_into(&self, buf: &mut Vec<u8>) -> WireResult<()> {
        put_u16(buf, self.fd_metadata_length);
        buf.push(u8::from(self.fd_will_send_package_data));
        Ok(())
    }

    fn decode(payload: &[u8]) -> WireResult<Self> {
        let mut reader = Reader::new(payload);
        let fd_metadata_length = reader.u16("device metadata length")?;
        let fd_will_send_package_data = reader.u8("will send package data")? != 0;
        reader.finish("RequestUpdate response")?;
        Ok(Self {
            fd_metadata_length,
            fd_will_send_package_data,
        })
    }
}

/// Identity of one component as carried in PassComponentTable and UpdateComponent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentIdentity {
    /// Component classification
    pub classification: u16,
    /// Component identifier
    pub identifier: u16,
    /// Classification index reported by the target
    pub classification_index: u8,
    /// Comparison stamp of the image in the package
    pub comparison_stamp: u32,
}

impl ComponentIdentity {
    fn encode_ids(&self, buf: &mut Vec<u8>) {
        put_u16(buf, self.classification);
        put_u16(buf, self.identifier);
        buf.push(self.classification_index);
    }

    fn decode_ids(reader: &mut Reader<'_>) -> WireResult<(u16, u16, u8)> {
        Ok((
            reader.u16("component classification")?,
            reader.u16("component identifier")?,
            reader.u8("component classification index")?,
        ))
    }
}

/// PassComponentTable request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassComponentTableRequest {
    /// Position of this entry in the table
    pub transfer_flag: TransferFlag,
    /// Component identity
    pub component: ComponentIdentity,
    /// Component version
    pub version: VersionString,
}

impl WireMessage for PassComponentTableRequest {
    const COMMAND: FwUpCommand = FwUpCommand::PassComponentTable;

    fn encode_into(&self, buf: &mut Vec<u8>) -> WireResult<()> {
        buf.push(self.transfer_flag.code());
        self.component.encode_ids(buf);
        put_u32(buf, self.component.comparison_stamp);
        self.version.encode_into(buf)
    }

    fn decode(payload: &[u8]) -> WireResult<Self> {
        let mut reader = Reader::new(payload);
        let transfer_flag = TransferFlag::from_code(reader.u8("transfer flag")?)?;
        let (classification, identifier, classification_index) =
            ComponentIdentity::decode_ids(&mut reader)?;
        let comparison_stamp = reader.u32("component comparison stamp")?;
        let (string_type, len) = VersionString::read_prefix(&mut reader)?;
        let version = VersionString::read_bytes(&mut reader, string_type, len)?;
        reader.finish("PassComponentTable request")?;
        Ok(Self {
            transfer_flag,
            component: ComponentIdentity {
                classification,
                identifier,
                classification_index,
                comparison_stamp,
            },
            version,
        })
    }
}

/// PassComponentTable response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassComponentTableResponse {
    /// 0 = component can be updated, 1 = component may be updated
    pub component_response: u8,
    /// Reason code behind `component_response`
    pub component_response_code: u8,
}

impl WireMessage for PassComponentTableResponse {
    const COMMAND: FwUpCommand = FwUpCommand::PassComponentTable;

    fn encode_into(&self, buf: &mut Vec<u8>) -> WireResult<()> {
        buf.push(self.component_response);
        buf.push(self.component_response_code);
        Ok(())
    }

    fn decode(payload: &[u8]) -> WireResult<Self> {
        let mut reader = Reader::new(payload);
        let component_response = reader.u8("component response")?;
        let component_response_code = reader.u8("component response code")?;
        reader.finish("PassComponentTable response")?;
        Ok(Self {
            component_response,
            component_response_code,
        })
    }
}

/// UpdateComponent request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateComponentRequest {
    /// Component identity
    pub component: ComponentIdentity,
    /// Size of the component image in bytes
    pub image_size: u32,
    /// Requested update options
    pub update_option_flags: u32,
    /// Component version
    pub version: VersionString,
}

impl WireMessage for UpdateComponentRequest {
    const COMMAND: FwUpCommand = FwUpCommand::UpdateComponent;

    fn encode_into(&self, buf: &mut Vec<u8>) -> WireResult<()> {
        self.component.encode_ids(buf);
        put_u32(buf, self.component.comparison_stamp);
        put_u32(buf, self.image_size);
        put_u32(buf, self.update_option_flags);
        self.version.encode_into(buf)
    }

    fn decode(payload: &[u8]) -> WireResult<Self> {
        let mut reader = Reader::new(payload);
        let (classification, identifier, classification_index) =
            ComponentIdentity::decode_ids(&mut reader)?;
        let comparison_stamp = reader.u32("component comparison stamp")?;
        let image_size = reader.u32("component image size")?;
        let update_option_flags = reader.u32("update option flags")?;
        let (string_type, len) = VersionString::read_prefix(&mut reader)?;
        let version = VersionString::read_bytes(&mut reader, string_type, len)?;
        reader.finish("UpdateComponent request")?;
        Ok(Self {
            component: ComponentIdentity {
                classification,
                identifier,
                classification_index,
                comparison_stamp,
            },
            image_size,
            update_option_flags,
            version,
        })
    }
}

/// UpdateComponent response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateComponentResponse {
    /// 0 = component can be updated, 1 = component will not be updated
    pub compatibility_response: u8,
    /// Reason code behind `compatibility_response`
    pub compatibility_response_code: u8,
    /// Update options the target accepted
    pub update_option_flags_enabled: u32,
    /// Seconds before the target starts requesting data
    pub time_before_request_fw_data: u16,
}

impl UpdateComponentResponse {
    /// Whether the target accepted the component
    pub fn is_compatible(&self) -> bool {
        self.compatibility_response == 0
    }
}

impl WireMessage for UpdateComponentResponse {
    const COMMAND: FwUpCommand = FwUpCommand::UpdateComponent;

    fn encode_into(&self, buf: &mut Vec<u8>) -> WireResult<()> {
        buf.push(self.compatibility_response);
        buf.push(self.compatibility_response_code);
        put_u32(buf, self.update_option_flags_enabled);
        put_u16(buf, self.time_before_request_fw_data);
        Ok(())
    }

    fn decode(payload: &[u8]) -> WireResult<Self> {
        let mut reader = Reader::new(payload);
        let compatibility_response = reader.u8("compatibility response")?;
        let compatibility_response_code = reader.u8("compatibility response code")?;
        let update_option_flags_enabled = reader.u32("update option flags enabled")?;
        let time_before_request_fw_data = reader.u16("time before request fw data")?;
        reader.finish("UpdateComponent response")?;
        Ok(Self {
            compatibility_response,
            compatibility_response_code,
            update_option_flags_enabled,
            time_before_request_fw_data,
        })
    }
}

/// RequestFirmwareData request (target to agent)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFirmwareDataRequest {
    /// Offset into the component image
    pub offset: u32,
    /// Requested chunk length
    pub length: u32,
}

impl WireMessage for RequestFirmwareDataRequest {
    const COMMAND: FwUpCommand = FwUpCommand::RequestFirmwareData;

    fn encode_into(&self, buf: &mut Vec<u8>) -> WireResult<()> {
        put_u32(buf, self.offset);
        put_u32(buf, self.length);
        Ok(())
    }

    fn decode(payload: &[u8]) -> WireResult<Self> {
        let mut reader = Reader::new(payload);
        let offset = reader.u32("offset")?;
        let length = reader.u32("length")?;
        reader.finish("RequestFirmwareData request")?;
        Ok(Self { offset, length })
    }
}

/// TransferComplete request (target to agent)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferCompleteRequest {
    /// 0 = transfer succeeded, anything else identifies the failure
    pub transfer_result: u8,
}

impl TransferCompleteRequest {
    /// Whether the transfer succeeded
    pub fn succeeded(&self) -> bool {
        self.transfer_result == 0x00
    }
}

impl WireMessage for TransferCompleteRequest {
    const COMMAND: FwUpCommand = FwUpCommand::TransferComplete;

    fn encode_into(&self, buf: &mut Vec<u8>) -> WireResult<()> {
        buf.push(self.transfer_result);
        Ok(())
    }

    fn decode(payload: &[u8]) -> WireResult<Self> {
        let mut reader = Reader::new(payload);
        let transfer_result = reader.u8("transfer result")?;
        reader.finish("TransferComplete request")?;
        Ok(Self { transfer_result })
    }
}

/// VerifyComplete request (target to agent)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyCompleteRequest {
    /// 0 = verification succeeded, anything else identifies the failure
    pub verify_result: u8,
}

impl VerifyCompleteRequest {
    /// Whether verification succeeded
    pub fn succeeded(&self) -> bool {
        self.verify_result == 0x00
    }
}

impl WireMessage for VerifyCompleteRequest {
    const COMMAND: FwUpCommand = FwUpCommand::VerifyComplete;

    fn encode_into(&self, buf: &mut Vec<u8>) -> WireResult<()> {
        buf.push(self.verify_result);
        Ok(())
    }

    fn decode(payload: &[u8]) -> WireResult<Self> {
        let mut reader = Reader::new(payload);
        let verify_result = reader.u8("verify result")?;
        reader.finish("VerifyComplete request")?;
        Ok(Self { verify_result })
    }
}

/// ApplyComplete request (target to agent)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyCompleteRequest {
    /// 0 = success, 1 = success with modified activation method
    pub apply_result: u8,
    /// Activation methods the target switched to, when `apply_result == 1`
    pub activation_methods_modification: u16,
}

impl ApplyCompleteRequest {
    /// Whether the component was applied
    pub fn succeeded(&self) -> bool {
        matches!(self.apply_result, 0x00 | 0x01)
    }
}

impl WireMessage for ApplyCompleteRequest {
    const COMMAND: FwUpCommand = FwUpCommand::ApplyComplete;

    fn encode_into(&self, buf: &mut Vec<u8>) -> WireResult<()> {
        buf.push(self.apply_result);
        put_u16(buf, self.activation_methods_modification);
        Ok(())
    }

    fn decode(payload: &[u8]) -> WireResult<Self> {
        let mut reader = Reader::new(payload);
        let apply_result = reader.u8("apply result")?;
        let activation_methods_modification = reader.u16("activation methods modification")?;
        reader.finish("ApplyComplete request")?;
        Ok(Self {
            apply_result,
            activation_methods_modification,
        })
    }
}

/// ActivateFirmware request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivateFirmwareRequest {
    /// Ask the target to activate self-contained components immediately
    pub self_contained_activation: bool,
}

impl WireMessage for ActivateFirmwareRequest {
    const COMMAND: FwUpCommand = FwUpCommand::ActivateFirmware;

    fn encode_into(&self, buf: &mut Vec<u8>) -> WireResult<()> {
        buf.push(u8::from(self.self_contained_activation));
        Ok(())
    }

    fn decode(payload: &[u8]) -> WireResult<Self> {
        let mut reader = Reader::new(payload);
        let self_contained_activation = match reader.u8("self-contained activation request")? {
            0 => false,
            1 => true,
            other => {
                return Err(WireError::InvalidValue {
                    field: "self-contained activation request",
                    value: u32::from(other),
                });
            }
        };
        reader.finish("ActivateFirmware request")?;
        Ok(Self {
            self_contained_activation,
        })
    }
}

/// ActivateFirmware response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivateFirmwareResponse {
    /// Seconds the target needs for self-contained activation
    pub estimated_time_for_activation: u16,
}

impl WireMessage for ActivateFirmwareResponse {
    const COMMAND: FwUpCommand = FwUpCommand::ActivateFirmware;

    fn encode_into(&self, buf: &mut Vec<u8>) -> WireResult<()> {
        put_u16(buf, self.estimated_time_for_activation);
        Ok(())
    }

    fn decode(payload: &[u8]) -> WireResult<Self> {
        let mut reader = Reader::new(payload);
        let estimated_time_for_activation = reader.u16("estimated activation time")?;
        reader.finish("ActivateFirmware response")?;
        Ok(Self {
            estimated_time_for_activation,
        })
    }
}

/// GetPackageData request (target to agent)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetPackageDataRequest {
    /// Handle returned by the previous part; ignored for the first part
    pub data_transfer_handle: u32,
    /// First or next part
    pub operation: TransferOperation,
}

impl WireMessage for GetPackageDataRequest {
    const COMMAND: FwUpCommand = FwUpCommand::GetPackageData;

    fn encode_into(&self, buf: &mut Vec<u8>) -> WireResult<()> {
        put_u32(buf, self.data_transfer_handle);
        buf.push(self.operation as u8);
        Ok(())
    }

    fn decode(payload: &[u8]) -> WireResult<Self> {
        let mut reader = Reader::new(payload);
        let data_transfer_handle = reader.u32("data transfer handle")?;
        let operation = TransferOperation::from_code(reader.u8("transfer operation flag")?)?;
        reader.finish("GetPackageData request")?;
        Ok(Self {
            data_transfer_handle,
            operation,
        })
    }
}

/// GetPackageData response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetPackageDataResponse {
    /// Handle to pass with the next GetNextPart
    pub next_data_transfer_handle: u32,
    /// Position of this part
    pub transfer_flag: TransferFlag,
    /// Package data bytes of this part
    pub portion: Vec<u8>,
}

impl WireMessage for GetPackageDataResponse {
    const COMMAND: FwUpCommand = FwUpCommand::GetPackageData;

    fn encode_into(&self, buf: &mut Vec<u8>) -> WireResult<()> {
        put_u32(buf, self.next_data_transfer_handle);
        buf.push(self.transfer_flag.code());
        buf.extend_from_slice(&self.portion);
        Ok(())
    }

    fn decode(payload: &[u8]) -> WireResult<Self> {
        let mut reader = Reader::new(payload);
        let next_data_transfer_handle = reader.u32("next data transfer handle")?;
        let transfer_flag = TransferFlag::from_code(reader.u8("transfer flag")?)?;
        let portion = reader.rest().to_vec();
        Ok(Self {
            next_data_transfer_handle,
            transfer_flag,
            portion,
        })
    }
}

/// CancelUpdate response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelUpdateResponse {
    /// Whether any component was left non-functional
    pub non_functioning_component_indication: bool,
    /// Bitmap of non-functional components
    pub non_functioning_component_bitmap: u64,
}

impl WireMessage for CancelUpdateResponse {
    const COMMAND: FwUpCommand = FwUpCommand::CancelUpdate;

    fn encode_into(&self, buf: &mut Vec<u8>) -> WireResult<()> {
        buf.push(u8::from(self.non_functioning_component_indication));
        put_u64(buf, self.non_functioning_component_bitmap);
        Ok(())
    }

    fn decode(payload: &[u8]) -> WireResult<Self> {
        let mut reader = Reader::new(payload);
        let non_functioning_component_indication =
            reader.u8("non-functioning component indication")? != 0;
        let non_functioning_component_bitmap = reader.u64("non-functioning component bitmap")?;
        reader.finish("CancelUpdate response")?;
        Ok(Self {
            non_functioning_component_indication,
            non_functioning_component_bitmap,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_update_layout() -> WireResult<()> {
        let request = RequestUpdateRequest::new(4096, 2, 1, 0, "v1")?;
        let bytes = request.encode()?;
        assert_eq!(
            bytes,
            vec![
                0x00, 0x10, 0x00, 0x00, // max transfer size
                0x02, 0x00, // components
                0x01, // outstanding
                0x00, 0x00, // package data length
                0x01, 0x02, b'v', b'1',
            ]
        );
        assert_eq!(RequestUpdateRequest::decode(&bytes)?, request);
        Ok(())
    }

    #[test]
    fn test_request_update_rejects_oversized_counts() {
        let result = RequestUpdateRequest::new(4096, 70_000, 1, 0, "v1");
        assert!(matches!(
            result,
            Err(WireError::FieldOverflow {
                field: "number of components",
                ..
            })
        ));
    }

    #[test]
    fn test_version_string_longer_than_255_bytes_fails_to_encode() {
        let long = "x".repeat(256);
        let mut buf = Vec::new();
        let result = VersionString::new(&long).encode_into(&mut buf);
        assert!(matches!(result, Err(WireError::FieldOverflow { .. })));
    }

    #[test]
    fn test_non_ascii_version_is_tagged_utf8() {
        assert_eq!(VersionString::new("1.0").string_type, StringType::Ascii);
        assert_eq!(VersionString::new("1.0-ß").string_type, StringType::Utf8);
        assert_eq!(VersionString::new("1.0-ß").to_string(), "1.0-ß");
    }

    #[test]
    fn test_pass_component_table_layout() -> WireResult<()> {
        let request = PassComponentTableRequest {
            transfer_flag: TransferFlag::End,
            component: ComponentIdentity {
                classification: 0x000A,
                identifier: 0x1234,
                classification_index: 3,
                comparison_stamp: 0xDEAD_BEEF,
            },
            version: VersionString::new("A"),
        };
        let bytes = request.encode()?;
        assert_eq!(
            bytes,
            vec![
                0x04, 0x0A, 0x00, 0x34, 0x12, 0x03, 0xEF, 0xBE, 0xAD, 0xDE, 0x01, 0x01, b'A',
            ]
        );
        assert_eq!(PassComponentTableRequest::decode(&bytes)?, request);
        Ok(())
    }

    #[test]
    fn test_update_component_carries_size_and_flags() -> WireResult<()> {
        let request = UpdateComponentRequest {
            component: ComponentIdentity {
                classification: 0x000A,
                identifier: 0x0001,
                classification_index: 0,
                comparison_stamp: 1,
            },
            image_size: 100,
            update_option_flags: 1,
            version: VersionString::new(""),
        };
        let bytes = request.encode()?;
        assert_eq!(bytes.len(), 2 + 2 + 1 + 4 + 4 + 4 + 2);
        assert_eq!(&bytes[9..13], &100u32.to_le_bytes());
        assert_eq!(&bytes[13..17], &1u32.to_le_bytes());
        assert_eq!(UpdateComponentRequest::decode(&bytes)?, request);
        Ok(())
    }

    #[test]
    fn test_truncated_version_string_is_rejected() {
        let bytes = [
            0x01, 0x0A, 0x00, 0x34, 0x12, 0x03, 0xEF, 0xBE, 0xAD, 0xDE, 0x01, 0x05, b'A',
        ];
        assert!(matches!(
            PassComponentTableRequest::decode(&bytes),
            Err(WireError::Truncated {
                field: "version string",
                ..
            })
        ));
    }

    #[test]
    fn test_apply_result_interpretation() {
        let ok = ApplyCompleteRequest {
            apply_result: 0x00,
            activation_methods_modification: 0,
        };
        let modified = ApplyCompleteRequest {
            apply_result: 0x01,
            activation_methods_modification: 0x0002,
        };
        let failed = ApplyCompleteRequest {
            apply_result: 0x0A,
            activation_methods_modification: 0,
        };
        assert!(ok.succeeded());
        assert!(modified.succeeded());
        assert!(!failed.succeeded());
    }

    #[test]
    fn test_fixed_bodies_reject_trailing_bytes() {
        assert!(matches!(
            TransferCompleteRequest::decode(&[0x00, 0x00]),
            Err(WireError::TrailingBytes { .. })
        ));
        assert!(matches!(
            RequestFirmwareDataRequest::decode(&[0; 7]),
            Err(WireError::Truncated { .. })
        ));
    }

    #[test]
    fn test_get_package_data_response_keeps_portion() -> WireResult<()> {
        let response = GetPackageDataResponse {
            next_data_transfer_handle: 64,
            transfer_flag: TransferFlag::Start,
            portion: vec![1, 2, 3],
        };
        let bytes = response.encode()?;
        assert_eq!(bytes, vec![64, 0, 0, 0, 0x01, 1, 2, 3]);
        assert_eq!(GetPackageDataResponse::decode(&bytes)?, response);
        Ok(())
    }

    #[test]
    fn test_activate_firmware_rejects_non_boolean() {
        assert!(matches!(
            ActivateFirmwareRequest::decode(&[0x02]),
            Err(WireError::InvalidValue { .. })
        ));
    }
}
