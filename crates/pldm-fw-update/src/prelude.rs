//! Convenience re-exports for common firmware update types

pub use pldm_fw_wire::{InstanceId, RequestMessage, ResponseMessage, completion_code};

pub use crate::config::{UpdateConfig, UpdateConfigBuilder};
pub use crate::coordinator::{
    ComponentOutcome, DeviceUpdateReport, UpdateCoordinator, UpdatePhase, UpdateProgress,
};
pub use crate::dispatcher::{NoopObserver, RequestDispatcher, UpdateObserver};
pub use crate::error::{UpdateError, UpdateResult};
pub use crate::instance_id::{InstanceIdAllocator, InstanceIdLease};
#[cfg(any(unix, windows))]
pub use crate::package::FilePackage;
pub use crate::package::{MemoryPackage, PackageByteSource};
pub use crate::records::{ComponentImageInfo, ComponentTable, EndpointId, FirmwareDeviceRecord};
pub use crate::session::{DeviceUpdateSession, SessionContext, SessionHandle, SessionState};
