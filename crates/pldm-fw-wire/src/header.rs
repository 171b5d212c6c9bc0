//! PLDM message header and full request/response framing.
//!
//! Layout:
//! - Byte 0: `bit7 = request`, `bit6 = datagram`, `bits4:0 = instance id`
//! - Byte 1: `bits7:6 = header version (0)`, `bits5:0 = PLDM type`
//! - Byte 2: command code
//! - Byte 3 (responses only): completion code

use std::fmt;

use crate::codes::PLDM_TYPE_FIRMWARE_UPDATE;
use crate::cursor::Reader;
use crate::error::{WireError, WireResult};

/// Wire size of a request header.
pub const HEADER_LEN: usize = 3;

const REQUEST_BIT: u8 = 0x80;
const INSTANCE_ID_MASK: u8 = 0x1F;
const PLDM_TYPE_MASK: u8 = 0x3F;

/// Correlation tag tying a response to its request.
///
/// Only the low five bits are carried on the wire, so valid ids are `0..=31`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u8);

impl InstanceId {
    /// Largest valid instance id
    pub const MAX: u8 = INSTANCE_ID_MASK;

    /// Number of distinct instance ids
    pub const COUNT: usize = INSTANCE_ID_MASK as usize + 1;

    /// Create an instance id, rejecting values that do not fit five bits
    pub fn new(raw: u8) -> Option<Self> {
        (raw <= Self::MAX).then_some(Self(raw))
    }

    /// Raw id value
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Iterate over every valid id in ascending order
    pub fn all() -> impl Iterator<Item = InstanceId> {
        (0..=Self::MAX).map(Self)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Decoded message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Request (`true`) or response (`false`)
    pub request: bool,
    /// Instance id
    pub instance_id: InstanceId,
    /// PLDM type
    pub pldm_type: u8,
    /// Command code
    pub command: u8,
}

impl MessageHeader {
    /// Encode the header to bytes
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let rq = if self.request { REQUEST_BIT } else { 0 };
        [
            rq | self.instance_id.get(),
            self.pldm_type & PLDM_TYPE_MASK,
            self.command,
        ]
    }

    /// Decode a header, returning it together with the bytes that follow
    pub fn decode(bytes: &[u8]) -> WireResult<(Self, &[u8])> {
        let mut reader = Reader::new(bytes);
        let flags = reader.u8("header flags")?;
        let type_byte = reader.u8("header type")?;
        let command = reader.u8("command code")?;

        let version = type_byte >> 6;
        if version != 0 {
            return Err(WireError::InvalidValue {
                field: "header version",
                value: u32::from(version),
            });
        }

        let header = Self {
            request: flags & REQUEST_BIT != 0,
            instance_id: InstanceId(flags & INSTANCE_ID_MASK),
            pldm_type: type_byte & PLDM_TYPE_MASK,
            command,
        };
        Ok((header, reader.rest()))
    }
}

/// A complete request message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMessage {
    /// Instance id
    pub instance_id: InstanceId,
    /// PLDM type
    pub pldm_type: u8,
    /// Command code
    pub command: u8,
    /// Request body
    pub payload: Vec<u8>,
}

impl RequestMessage {
    /// Build a firmware-update request
    pub fn firmware_update(instance_id: InstanceId, command: u8, payload: Vec<u8>) -> Self {
        Self {
            instance_id,
            pldm_type: PLDM_TYPE_FIRMWARE_UPDATE,
            command,
            payload,
        }
    }

    /// Header of this request
    pub fn header(&self) -> MessageHeader {
        MessageHeader {
            request: true,
            instance_id: self.instance_id,
            pldm_type: self.pldm_type,
            command: self.command,
        }
    }

    /// Serialize header and body
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.header().encode());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse a request from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> WireResult<Self> {
        let (header, payload) = MessageHeader::decode(bytes)?;
        if !header.request {
            return Err(WireError::WrongDirection {
                expected: "request",
            });
        }
        Ok(Self {
            instance_id: header.instance_id,
            pldm_type: header.pldm_type,
            command: header.command,
            payload: payload.to_vec(),
        })
    }

    /// Build the response to this request
    pub fn respond(&self, completion_code: u8, body: Vec<u8>) -> ResponseMessage {
        ResponseMessage {
            instance_id: self.instance_id,
            pldm_type: self.pldm_type,
            command: self.command,
            completion_code,
            body,
        }
    }
}

/// A complete response message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMessage {
    /// Instance id copied from the request
    pub instance_id: InstanceId,
    /// PLDM type
    pub pldm_type: u8,
    /// Command code
    pub command: u8,
    /// Completion code
    pub completion_code: u8,
    /// Response body following the completion code
    pub body: Vec<u8>,
}

impl ResponseMessage {
    /// Whether the completion code signals success
    pub fn is_success(&self) -> bool {
        self.completion_code == crate::codes::completion_code::SUCCESS
    }

    /// Serialize header, completion code and body
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = MessageHeader {
            request: false,
            instance_id: self.instance_id,
            pldm_type: self.pldm_type,
            command: self.command,
        };
        let mut out = Vec::with_capacity(HEADER_LEN + 1 + self.body.len());
        out.extend_from_slice(&header.encode());
        out.push(self.completion_code);
        out.extend_from_slice(&self.body);
        out
    }

    /// Parse a response from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> WireResult<Self> {
        let (header, rest) = MessageHeader::decode(bytes)?;
        if header.request {
            return Err(WireError::WrongDirection {
                expected: "response",
            });
        }
        let mut reader = Reader::new(rest);
        let completion_code = reader.u8("completion code")?;
        Ok(Self {
            instance_id: header.instance_id,
            pldm_type: header.pldm_type,
            command: header.command,
            completion_code,
            body: reader.rest().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::{FwUpCommand, completion_code};

    fn id(raw: u8) -> WireResult<InstanceId> {
        InstanceId::new(raw).ok_or(WireError::InvalidValue {
            field: "instance id",
            value: u32::from(raw),
        })
    }

    #[test]
    fn test_instance_id_range() {
        assert!(InstanceId::new(31).is_some());
        assert!(InstanceId::new(32).is_none());
        assert_eq!(InstanceId::all().count(), InstanceId::COUNT);
    }

    #[test]
    fn test_request_header_layout() -> WireResult<()> {
        let request = RequestMessage::firmware_update(
            id(7)?,
            FwUpCommand::RequestUpdate.code(),
            vec![0xAA],
        );
        assert_eq!(request.to_bytes(), vec![0x87, 0x05, 0x10, 0xAA]);
        Ok(())
    }

    #[test]
    fn test_response_layout_and_parse() -> WireResult<()> {
        let request = RequestMessage::firmware_update(
            id(3)?,
            FwUpCommand::TransferComplete.code(),
            vec![0x00],
        );
        let response = request.respond(completion_code::SUCCESS, Vec::new());
        let bytes = response.to_bytes();
        assert_eq!(bytes, vec![0x03, 0x05, 0x16, 0x00]);

        let parsed = ResponseMessage::from_bytes(&bytes)?;
        assert_eq!(parsed, response);
        assert!(parsed.is_success());
        Ok(())
    }

    #[test]
    fn test_direction_is_checked() {
        let response_bytes = [0x01, 0x05, 0x15, 0x00];
        assert!(matches!(
            RequestMessage::from_bytes(&response_bytes),
            Err(WireError::WrongDirection { .. })
        ));
        let request_bytes = [0x81, 0x05, 0x15];
        assert!(matches!(
            ResponseMessage::from_bytes(&request_bytes),
            Err(WireError::WrongDirection { .. })
        ));
    }

    #[test]
    fn test_datagram_bit_is_ignored_and_version_checked() -> WireResult<()> {
        let (header, rest) = MessageHeader::decode(&[0xC2, 0x05, 0x18, 0x01])?;
        assert!(header.request);
        assert_eq!(header.instance_id, id(2)?);
        assert_eq!(rest, &[0x01]);

        assert!(MessageHeader::decode(&[0x82, 0x45, 0x18]).is_err());
        Ok(())
    }

    #[test]
    fn test_response_without_completion_code_is_truncated() {
        assert!(matches!(
            ResponseMessage::from_bytes(&[0x01, 0x05, 0x10]),
            Err(WireError::Truncated { .. })
        ));
    }
}
