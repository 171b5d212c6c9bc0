//! Fuzzes request framing and every target-initiated request body.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_request_decode
#![no_main]
use libfuzzer_sys::fuzz_target;
use pldm_fw_wire::{
    ApplyCompleteRequest, FwUpCommand, GetPackageDataRequest, RequestFirmwareDataRequest,
    RequestMessage, TransferCompleteRequest, VerifyCompleteRequest, WireMessage,
};

fuzz_target!(|data: &[u8]| {
    // Errors are expected, panics are not.
    let Ok(request) = RequestMessage::from_bytes(data) else {
        return;
    };
    let body = request.payload.as_slice();
    match FwUpCommand::from_code(request.command) {
        Some(FwUpCommand::RequestFirmwareData) => {
            let _ = RequestFirmwareDataRequest::decode(body);
        }
        Some(FwUpCommand::GetPackageData) => {
            let _ = GetPackageDataRequest::decode(body);
        }
        Some(FwUpCommand::TransferComplete) => {
            let _ = TransferCompleteRequest::decode(body);
        }
        Some(FwUpCommand::VerifyComplete) => {
            let _ = VerifyCompleteRequest::decode(body);
        }
        Some(FwUpCommand::ApplyComplete) => {
            let _ = ApplyCompleteRequest::decode(body);
        }
        _ => {}
    }
});
