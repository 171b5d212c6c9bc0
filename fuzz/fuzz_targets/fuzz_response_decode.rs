//! Fuzzes response framing and the bodies of agent-initiated commands.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_response_decode
#![no_main]
use libfuzzer_sys::fuzz_target;
use pldm_fw_wire::{
    ActivateFirmwareResponse, CancelUpdateResponse, PassComponentTableResponse,
    RequestUpdateResponse, ResponseMessage, UpdateComponentResponse, WireMessage,
};

fuzz_target!(|data: &[u8]| {
    let Ok(response) = ResponseMessage::from_bytes(data) else {
        return;
    };
    let body = response.body.as_slice();
    let _ = RequestUpdateResponse::decode(body);
    let _ = PassComponentTableResponse::decode(body);
    let _ = UpdateComponentResponse::decode(body);
    let _ = ActivateFirmwareResponse::decode(body);
    let _ = CancelUpdateResponse::decode(body);
    assert_eq!(ResponseMessage::from_bytes(&response.to_bytes()).ok(), Some(response));
});
