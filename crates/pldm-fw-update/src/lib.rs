//! PLDM firmware update agent
//!
//! This crate drives firmware devices through the PLDM firmware-update
//! command sequence:
//! - A per-device session state machine pushing RequestUpdate,
//!   PassComponentTable, UpdateComponent and ActivateFirmware
//! - A data service answering the target's RequestFirmwareData and
//!   GetPackageData pulls with bounds-checked, zero-padded chunks
//! - A per-endpoint instance id allocator with expiry-based reclamation
//! - A coordinator that owns sessions and broadcasts aggregate progress
//!
//! # Architecture
//!
//! - [`session`]: Session state machine and target-request handling
//! - [`instance_id`]: Instance id pool and RAII leases
//! - [`coordinator`]: Session ownership, routing and progress
//! - [`dispatcher`]: Collaborator traits for request delivery and notifications
//! - [`package`]: Random-access package byte sources
//! - [`records`]: Device records and component metadata
//! - [`config`]: Agent configuration
//! - [`error`]: Error types
//!
//! Message framing and bodies live in the `pldm-fw-wire` crate.
//!
//! # Example
//!
//! ```ignore
//! use pldm_fw_update::prelude::*;
//!
//! # async fn example(dispatcher: Arc<dyn RequestDispatcher>) -> UpdateResult<()> {
//! let package = Arc::new(FilePackage::open("bmc-image.pldm").map_err(|e| UpdateError::PackageRead(e.to_string()))?);
//! let components = ComponentTable::new(parsed_components).with_classification_index(0x000A, 0x0001, 0);
//! let coordinator = UpdateCoordinator::new(UpdateConfig::default(), dispatcher, package, components)?;
//!
//! coordinator.start_update(record)?;
//! // Feed target-initiated requests from the transport:
//! // coordinator.handle_inbound(endpoint, request).await
//! let report = coordinator.wait_for_completion(record_endpoint).await?;
//! assert!(report.success);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod instance_id;
pub mod package;
pub mod prelude;
pub mod records;
pub mod session;

pub use config::{UpdateConfig, UpdateConfigBuilder};
pub use coordinator::{
    ComponentOutcome, DeviceUpdateReport, UpdateCoordinator, UpdatePhase, UpdateProgress,
};
pub use dispatcher::{NoopObserver, RequestDispatcher, UpdateObserver};
pub use error::{UpdateError, UpdateResult};
pub use instance_id::{InstanceIdAllocator, InstanceIdLease};
#[cfg(any(unix, windows))]
pub use package::FilePackage;
pub use package::{MemoryPackage, PackageByteSource};
pub use records::{ComponentImageInfo, ComponentTable, EndpointId, FirmwareDeviceRecord};
pub use session::{
    DeviceUpdateSession, FirmwareDataWindow, PackageDataPart, SessionContext, SessionHandle,
    SessionState, plan_firmware_data, plan_package_data, read_firmware_data,
};
