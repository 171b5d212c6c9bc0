//! Fuzzes firmware data window planning against arbitrary requests.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_firmware_data_window
#![no_main]
use libfuzzer_sys::fuzz_target;
use pldm_fw_update::plan_firmware_data;
use pldm_fw_wire::RequestFirmwareDataRequest;

fuzz_target!(|input: (u32, u32, u32, u16, u16)| {
    let (image_size, offset, length, baseline, extra) = input;
    let baseline = u32::from(baseline).max(32);
    let max = baseline.saturating_add(u32::from(extra));
    let request = RequestFirmwareDataRequest { offset, length };

    if let Ok(window) = plan_firmware_data(image_size, &request, baseline, max) {
        assert_eq!(window.total_len(), length as usize);
        assert!(u64::from(offset) + u64::from(window.read_len) <= u64::from(image_size));
    }
});
