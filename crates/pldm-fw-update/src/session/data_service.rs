//! Answers to target-initiated requests.
//!
//! While a component is outstanding the target drives the exchange: it pulls
//! image bytes in chunks and reports transfer, verify and apply results. The
//! bounds checks are pure functions so they can be exercised without a
//! session.

use pldm_fw_wire::{
    ApplyCompleteRequest, GetPackageDataRequest, GetPackageDataResponse, RequestFirmwareDataRequest,
    RequestMessage, ResponseMessage, TransferCompleteRequest, TransferFlag, TransferOperation,
    VerifyCompleteRequest, WireError, WireMessage, completion_code,
};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::DeviceUpdateSession;
use crate::error::{UpdateError, UpdateResult};
use crate::package::PackageByteSource;
use crate::records::{ComponentImageInfo, EndpointId};

/// Byte window answering one RequestFirmwareData.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareDataWindow {
    /// Offset into the component image of the first byte
    pub offset: u32,
    /// Bytes read from the package
    pub read_len: u32,
    /// Zero bytes appended past the end of the image
    pub pad_len: u32,
}

impl FirmwareDataWindow {
    /// Length of the response body
    pub fn total_len(&self) -> usize {
        self.read_len as usize + self.pad_len as usize
    }
}

/// Validate a firmware data request against the image size and transfer
/// bounds.
///
/// The target may read up to `baseline` bytes past the end of the image so
/// the last chunk can be a full baseline-sized read; those bytes are zero.
///
/// # Errors
///
/// Returns [`UpdateError::ProtocolRange`] carrying `INVALID_TRANSFER_LENGTH`
/// when the length is outside `baseline..=max`, or `DATA_OUT_OF_RANGE` when the
/// window ends beyond the slack.
pub fn plan_firmware_data(
    image_size: u32,
    request: &RequestFirmwareDataRequest,
    baseline: u32,
    max: u32,
) -> UpdateResult<FirmwareDataWindow> {
    let RequestFirmwareDataRequest { offset, length } = *request;
    if length < baseline || length > max {
        return Err(UpdateError::ProtocolRange {
            completion_code: completion_code::INVALID_TRANSFER_LENGTH,
            offset,
            length,
        });
    }

    let end = u64::from(offset) + u64::from(length);
    if end > u64::from(image_size) + u64::from(baseline) {
        return Err(UpdateError::ProtocolRange {
            completion_code: completion_code::DATA_OUT_OF_RANGE,
            offset,
            length,
        });
    }

    // end <= image_size + baseline and length >= baseline, so pad <= length.
    let pad = end.saturating_sub(u64::from(image_size));
    let pad_len = u32::try_from(pad).unwrap_or(length).min(length);
    Ok(FirmwareDataWindow {
        offset,
        read_len: length - pad_len,
        pad_len,
    })
}

/// Read the bytes of `window` for `component`, zero-filling the padding.
///
/// # Errors
///
/// Returns [`UpdateError::PackageRead`] if the package cannot supply the
/// requested range.
pub fn read_firmware_data(
    package: &dyn PackageByteSource,
    component: &ComponentImageInfo,
    window: &FirmwareDataWindow,
) -> UpdateResult<Vec<u8>> {
    let mut chunk = vec![0u8; window.total_len()];
    let position = component.package_offset + u64::from(window.offset);
    if let Some(real) = chunk.get_mut(..window.read_len as usize) {
        package.read_at(position, real).map_err(|err| {
            UpdateError::PackageRead(format!(
                "{} bytes at package offset {position}: {err}",
                window.read_len
            ))
        })?;
    }
    Ok(chunk)
}

/// One part of a multipart GetPackageData transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageDataPart {
    /// First byte of the part
    pub start: usize,
    /// One past the last byte of the part
    pub end: usize,
    /// Position of the part in the transfer
    pub transfer_flag: TransferFlag,
    /// Handle the target passes to fetch the next part, 0 after the last
    pub next_handle: u32,
}

/// Work out which slice of the package data answers `request`.
///
/// Transfer handles are byte offsets into the package data.
///
/// # Errors
///
/// Returns [`UpdateError::ProtocolRange`] carrying `NO_PACKAGE_DATA` when there
/// is nothing to send, or `INVALID_TRANSFER_HANDLE` when a GetNextPart handle
/// does not point inside the data.
pub fn plan_package_data(
    data_len: usize,
    request: &GetPackageDataRequest,
    max_transfer_size: u32,
) -> UpdateResult<PackageDataPart> {
    let reject = |completion_code| UpdateError::ProtocolRange {
        completion_code,
        offset: request.data_transfer_handle,
        length: 0,
    };

    if data_len == 0 {
        return Err(reject(completion_code::NO_PACKAGE_DATA));
    }

    let start = match request.operation {
        TransferOperation::GetFirstPart => 0,
        TransferOperation::GetNextPart => {
            let handle = request.data_transfer_handle as usize;
            if handle == 0 || handle >= data_len {
                return Err(reject(completion_code::INVALID_TRANSFER_HANDLE));
            }
            handle
        }
    };

    let end = start
        .saturating_add(max_transfer_size as usize)
        .min(data_len);
    let is_last = end == data_len;
    let next_handle = if is_last {
        0
    } else {
        u32::try_from(end).map_err(|_overflow| reject(completion_code::INVALID_TRANSFER_HANDLE))?
    };

    Ok(PackageDataPart {
        start,
        end,
        transfer_flag: TransferFlag::from_bounds(start == 0, is_last),
        next_handle,
    })
}

fn reject_undecodable(request: &RequestMessage, err: &WireError) -> ResponseMessage {
    debug!(command = request.command, %err, "Undecodable target request");
    request.respond(err.completion_code(), Vec::new())
}

fn acknowledge(request: &RequestMessage) -> ResponseMessage {
    request.respond(completion_code::SUCCESS, Vec::new())
}

/// Answer to a target request.
#[derive(Debug)]
pub(super) enum InboundReply {
    /// Answered on the session task
    Ready(ResponseMessage),
    /// Waiting on a package read running on the blocking pool
    Reading(JoinHandle<ResponseMessage>),
}

impl From<ResponseMessage> for InboundReply {
    fn from(response: ResponseMessage) -> Self {
        InboundReply::Ready(response)
    }
}

fn firmware_data_response(
    endpoint: EndpointId,
    component_index: usize,
    request: &RequestMessage,
    window: &FirmwareDataWindow,
    chunk: UpdateResult<Vec<u8>>,
) -> ResponseMessage {
    match chunk {
        Ok(chunk) => {
            trace!(
                endpoint,
                component_index,
                offset = window.offset,
                read_len = window.read_len,
                pad_len = window.pad_len,
                "Serving firmware data"
            );
            request.respond(completion_code::SUCCESS, chunk)
        }
        Err(err) => {
            error!(endpoint, component_index, %err, "Failed to read component image");
            request.respond(completion_code::ERROR, Vec::new())
        }
    }
}

impl DeviceUpdateSession {
    pub(super) fn serve_firmware_data(
        &self,
        position: usize,
        request: &RequestMessage,
    ) -> InboundReply {
        let endpoint = self.record.endpoint;
        let pull = match RequestFirmwareDataRequest::decode(&request.payload) {
            Ok(pull) => pull,
            Err(err) => return reject_undecodable(request, &err).into(),
        };
        let Some((component_index, component)) = self.component_at(position) else {
            return request.respond(completion_code::ERROR, Vec::new()).into();
        };

        let config = &self.context.config;
        let window = match plan_firmware_data(
            component.size,
            &pull,
            config.baseline_transfer_size,
            config.max_transfer_size,
        ) {
            Ok(window) => window,
            Err(err) => {
                warn!(endpoint, component_index, %err, "Rejecting firmware data request");
                let code = err.completion_code().unwrap_or(completion_code::ERROR);
                return request.respond(code, Vec::new()).into();
            }
        };

        let package = &self.context.package;
        if package.is_in_memory() || window.read_len == 0 {
            let chunk = read_firmware_data(package.as_ref(), component, &window);
            return firmware_data_response(endpoint, component_index, request, &window, chunk)
                .into();
        }

        let package = Arc::clone(package);
        let component = component.clone();
        let request = request.clone();
        InboundReply::Reading(tokio::task::spawn_blocking(move || {
            let chunk = read_firmware_data(package.as_ref(), &component, &window);
            firmware_data_response(endpoint, component_index, &request, &window, chunk)
        }))
    }

    pub(super) fn serve_package_data(&self, request: &RequestMessage) -> ResponseMessage {
        let endpoint = self.record.endpoint;
        let pull = match GetPackageDataRequest::decode(&request.payload) {
            Ok(pull) => pull,
            Err(WireError::InvalidValue {
                field: "transfer operation flag",
                ..
            }) => {
                return request.respond(
                    completion_code::INVALID_TRANSFER_OPERATION_FLAG,
                    Vec::new(),
                );
            }
            Err(err) => return reject_undecodable(request, &err),
        };

        let data = &self.record.package_data;
        let part = match plan_package_data(
            data.len(),
            &pull,
            self.context.config.max_transfer_size,
        ) {
            Ok(part) => part,
            Err(err) => {
                warn!(endpoint, %err, "Rejecting package data request");
                let code = err.completion_code().unwrap_or(completion_code::ERROR);
                return request.respond(code, Vec::new());
            }
        };

        let body = GetPackageDataResponse {
            next_data_transfer_handle: part.next_handle,
            transfer_flag: part.transfer_flag,
            portion: data.get(part.start..part.end).unwrap_or_default().to_vec(),
        };
        match body.encode() {
            Ok(bytes) => {
                debug!(
                    endpoint,
                    start = part.start,
                    end = part.end,
                    "Serving package data"
                );
                request.respond(completion_code::SUCCESS, bytes)
            }
            Err(err) => {
                error!(endpoint, %err, "Failed to encode package data");
                request.respond(completion_code::ERROR, Vec::new())
            }
        }
    }

    pub(super) fn acknowledge_transfer(
        &self,
        position: usize,
        request: &RequestMessage,
    ) -> ResponseMessage {
        let report = match TransferCompleteRequest::decode(&request.payload) {
            Ok(report) => report,
            Err(err) => return reject_undecodable(request, &err),
        };
        let endpoint = self.record.endpoint;
        let component_index = self.component_index(position);
        if report.succeeded() {
            info!(endpoint, component_index, "Component transfer complete");
        } else {
            warn!(
                endpoint,
                component_index,
                transfer_result = report.transfer_result,
                "Component transfer failed"
            );
        }
        acknowledge(request)
    }

    pub(super) fn acknowledge_verify(
        &self,
        position: usize,
        request: &RequestMessage,
    ) -> ResponseMessage {
        let report = match VerifyCompleteRequest::decode(&request.payload) {
            Ok(report) => report,
            Err(err) => return reject_undecodable(request, &err),
        };
        let endpoint = self.record.endpoint;
        let component_index = self.component_index(position);
        if report.succeeded() {
            info!(endpoint, component_index, "Component verification complete");
        } else {
            warn!(
                endpoint,
                component_index,
                verify_result = report.verify_result,
                "Component verification failed"
            );
        }
        acknowledge(request)
    }

    /// Acknowledge an apply result and move on to the next component, or to
    /// activation after the last one. A failed apply still advances.
    pub(super) fn acknowledge_apply(
        &mut self,
        position: usize,
        request: &RequestMessage,
    ) -> ResponseMessage {
        let report = match ApplyCompleteRequest::decode(&request.payload) {
            Ok(report) => report,
            Err(err) => return reject_undecodable(request, &err),
        };
        let endpoint = self.record.endpoint;
        let component_index = self.component_index(position);
        let success = report.succeeded();
        if success {
            info!(
                endpoint,
                component_index,
                activation_methods_modification = report.activation_methods_modification,
                "Component applied"
            );
        } else {
            warn!(
                endpoint,
                component_index,
                apply_result = report.apply_result,
                "Component apply failed"
            );
        }

        self.context
            .observer
            .on_component_applied(endpoint, component_index, success);
        self.advance_component(position);
        acknowledge(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::MemoryPackage;

    fn pull(offset: u32, length: u32) -> RequestFirmwareDataRequest {
        RequestFirmwareDataRequest { offset, length }
    }

    fn component(size: u32, package_offset: u64) -> ComponentImageInfo {
        ComponentImageInfo {
            classification: 0x000A,
            identifier: 1,
            comparison_stamp: 0,
            options: 0,
            requested_activation_method: 0,
            size,
            package_offset,
            version: "1.0".to_string(),
        }
    }

    #[test]
    fn test_full_chunk_inside_image() -> UpdateResult<()> {
        let window = plan_firmware_data(100, &pull(0, 64), 32, 64)?;
        assert_eq!(
            window,
            FirmwareDataWindow {
                offset: 0,
                read_len: 64,
                pad_len: 0
            }
        );
        Ok(())
    }

    #[test]
    fn test_final_chunk_is_padded() -> UpdateResult<()> {
        let window = plan_firmware_data(100, &pull(64, 64), 32, 64)?;
        assert_eq!(window.read_len, 36);
        assert_eq!(window.pad_len, 28);
        assert_eq!(window.total_len(), 64);
        Ok(())
    }

    #[test]
    fn test_short_request_is_invalid_length() {
        let result = plan_firmware_data(100, &pull(0, 16), 32, 64);
        assert_eq!(
            result.err().and_then(|e| e.completion_code()),
            Some(completion_code::INVALID_TRANSFER_LENGTH)
        );
    }

    #[test]
    fn test_oversized_request_is_invalid_length() {
        let result = plan_firmware_data(100, &pull(0, 65), 32, 64);
        assert_eq!(
            result.err().and_then(|e| e.completion_code()),
            Some(completion_code::INVALID_TRANSFER_LENGTH)
        );
    }

    #[test]
    fn test_window_past_slack_is_out_of_range() {
        let result = plan_firmware_data(100, &pull(90, 64), 32, 64);
        assert_eq!(
            result.err().and_then(|e| e.completion_code()),
            Some(completion_code::DATA_OUT_OF_RANGE)
        );
    }

    #[test]
    fn test_offset_near_u32_max_does_not_overflow() {
        let result = plan_firmware_data(100, &pull(u32::MAX, 64), 32, 64);
        assert_eq!(
            result.err().and_then(|e| e.completion_code()),
            Some(completion_code::DATA_OUT_OF_RANGE)
        );
    }

    #[test]
    fn test_read_zero_fills_padding() -> UpdateResult<()> {
        let mut bytes = vec![0xFFu8; 16];
        bytes.extend((0u8..100).map(|b| b.wrapping_add(1)));
        let package = MemoryPackage::new(bytes);
        let info = component(100, 16);

        let window = plan_firmware_data(100, &pull(64, 64), 32, 64)?;
        let chunk = read_firmware_data(&package, &info, &window)?;
        assert_eq!(chunk.len(), 64);
        assert_eq!(chunk.first(), Some(&65));
        assert_eq!(chunk.get(35), Some(&100));
        assert!(chunk.iter().skip(36).all(|b| *b == 0));
        Ok(())
    }

    #[test]
    fn test_read_failure_is_package_read_error() {
        let package = MemoryPackage::new(vec![0u8; 10]);
        let info = component(100, 0);
        let window = FirmwareDataWindow {
            offset: 0,
            read_len: 64,
            pad_len: 0,
        };
        assert!(matches!(
            read_firmware_data(&package, &info, &window),
            Err(UpdateError::PackageRead(_))
        ));
    }

    #[test]
    fn test_package_data_parts() -> UpdateResult<()> {
        let first = plan_package_data(
            100,
            &GetPackageDataRequest {
                data_transfer_handle: 0,
                operation: TransferOperation::GetFirstPart,
            },
            64,
        )?;
        assert_eq!((first.start, first.end), (0, 64));
        assert_eq!(first.transfer_flag, TransferFlag::Start);
        assert_eq!(first.next_handle, 64);

        let last = plan_package_data(
            100,
            &GetPackageDataRequest {
                data_transfer_handle: first.next_handle,
                operation: TransferOperation::GetNextPart,
            },
            64,
        )?;
        assert_eq!((last.start, last.end), (64, 100));
        assert_eq!(last.transfer_flag, TransferFlag::End);
        assert_eq!(last.next_handle, 0);
        Ok(())
    }

    #[test]
    fn test_package_data_single_part() -> UpdateResult<()> {
        let only = plan_package_data(
            10,
            &GetPackageDataRequest {
                data_transfer_handle: 0,
                operation: TransferOperation::GetFirstPart,
            },
            64,
        )?;
        assert_eq!(only.transfer_flag, TransferFlag::StartAndEnd);
        Ok(())
    }

    #[test]
    fn test_package_data_rejections() {
        let empty = plan_package_data(
            0,
            &GetPackageDataRequest {
                data_transfer_handle: 0,
                operation: TransferOperation::GetFirstPart,
            },
            64,
        );
        assert_eq!(
            empty.err().and_then(|e| e.completion_code()),
            Some(completion_code::NO_PACKAGE_DATA)
        );

        let bad_handle = plan_package_data(
            100,
            &GetPackageDataRequest {
                data_transfer_handle: 100,
                operation: TransferOperation::GetNextPart,
            },
            64,
        );
        assert_eq!(
            bad_handle.err().and_then(|e| e.completion_code()),
            Some(completion_code::INVALID_TRANSFER_HANDLE)
        );
    }
}
