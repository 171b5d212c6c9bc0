//! Update coordinator
//!
//! Owns one session per endpoint, routes target-initiated requests to them and
//! aggregates per-component and per-device progress.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pldm_fw_wire::{RequestMessage, ResponseMessage, completion_code};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, trace, warn};

use crate::config::UpdateConfig;
use crate::dispatcher::{RequestDispatcher, UpdateObserver};
use crate::error::{UpdateError, UpdateResult};
use crate::instance_id::InstanceIdAllocator;
use crate::package::PackageByteSource;
use crate::records::{ComponentTable, EndpointId, FirmwareDeviceRecord};
use crate::session::{DeviceUpdateSession, SessionContext, SessionHandle, SessionState};

/// What changed in a progress event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdatePhase {
    /// Session started
    Started,
    /// One component finished
    ComponentApplied {
        /// Index into the package component table
        component_index: usize,
        /// Whether the target applied it
        success: bool,
    },
    /// Device update finished successfully
    Completed,
    /// Device update failed
    Failed,
}

/// Progress information broadcast to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProgress {
    /// Endpoint the event is about
    pub endpoint: EndpointId,

    /// What happened
    pub phase: UpdatePhase,

    /// Components of this endpoint that have finished
    pub components_done: usize,

    /// Applicable components of this endpoint
    pub components_total: usize,

    /// Aggregate progress across every tracked device (0-100)
    pub progress_percent: u8,

    /// Current status message
    pub status_message: String,
}

/// Outcome of one component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentOutcome {
    /// Index into the package component table
    pub component_index: usize,
    /// Whether the target applied it
    pub success: bool,
}

/// Result of updating one device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceUpdateReport {
    /// Device endpoint
    pub endpoint: EndpointId,

    /// Whether the target accepted activation
    pub success: bool,

    /// Per-component outcomes in the order they finished
    pub components: Vec<ComponentOutcome>,

    /// Duration of the update
    #[serde(with = "duration_millis")]
    pub duration: Duration,

    /// Error message if the update failed
    pub error: Option<String>,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[derive(Debug, Default)]
struct DeviceProgress {
    components_total: usize,
    outcomes: Vec<ComponentOutcome>,
    collected: bool,
}

/// Observer that turns session notifications into broadcast progress
#[derive(Debug)]
struct ProgressTracker {
    progress_tx: broadcast::Sender<UpdateProgress>,
    devices: Mutex<HashMap<EndpointId, DeviceProgress>>,
}

impl ProgressTracker {
    fn new(capacity: usize) -> Self {
        let (progress_tx, _) = broadcast::channel(capacity);
        Self {
            progress_tx,
            devices: Mutex::new(HashMap::new()),
        }
    }

    fn register(&self, endpoint: EndpointId, components_total: usize) {
        self.devices.lock().insert(
            endpoint,
            DeviceProgress {
                components_total,
                outcomes: Vec::new(),
                collected: false,
            },
        );
        self.publish(endpoint, UpdatePhase::Started, "Update started".to_string());
    }

    /// Outcomes of a finished device. The device keeps counting towards the
    /// aggregate until [`ProgressTracker::clear_collected`].
    fn collect(&self, endpoint: EndpointId) -> Vec<ComponentOutcome> {
        let mut devices = self.devices.lock();
        let Some(device) = devices.get_mut(&endpoint) else {
            return Vec::new();
        };
        device.collected = true;
        device.outcomes.clone()
    }

    fn clear_collected(&self) {
        self.devices.lock().retain(|_, device| !device.collected);
    }

    fn publish(&self, endpoint: EndpointId, phase: UpdatePhase, status_message: String) {
        let progress = {
            let devices = self.devices.lock();
            let (done, total) = devices
                .get(&endpoint)
                .map_or((0, 0), |d| (d.outcomes.len(), d.components_total));
            let (all_done, all_total) = devices.values().fold((0usize, 0usize), |acc, d| {
                (acc.0 + d.outcomes.len(), acc.1 + d.components_total)
            });
            UpdateProgress {
                endpoint,
                phase,
                components_done: done,
                components_total: total,
                progress_percent: percent(all_done, all_total),
                status_message,
            }
        };
        if self.progress_tx.send(progress).is_err() {
            trace!(endpoint, "No progress subscribers");
        }
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    u8::try_from(done.min(total) * 100 / total).unwrap_or(100)
}

impl UpdateObserver for ProgressTracker {
    fn on_component_applied(&self, endpoint: EndpointId, component_index: usize, success: bool) {
        if let Some(device) = self.devices.lock().get_mut(&endpoint) {
            device.outcomes.push(ComponentOutcome {
                component_index,
                success,
            });
        }
        let status = if success {
            format!("Component {component_index} applied")
        } else {
            format!("Component {component_index} failed")
        };
        self.publish(
            endpoint,
            UpdatePhase::ComponentApplied {
                component_index,
                success,
            },
            status,
        );
    }

    fn on_device_update_completion(&self, endpoint: EndpointId, success: bool) {
        let (phase, status) = if success {
            (UpdatePhase::Completed, "Update completed")
        } else {
            (UpdatePhase::Failed, "Update failed")
        };
        self.publish(endpoint, phase, status.to_string());
    }
}

struct UpdateHandle {
    session: SessionHandle,
    task: Option<JoinHandle<SessionState>>,
    started_at: Instant,
}

/// Coordinates firmware updates of every device sharing one package
pub struct UpdateCoordinator {
    context: SessionContext,
    components: Arc<ComponentTable>,
    progress: Arc<ProgressTracker>,
    active_updates: Mutex<HashMap<EndpointId, UpdateHandle>>,
}

impl std::fmt::Debug for UpdateCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateCoordinator")
            .field("context", &self.context)
            .field("active_updates", &self.active_updates())
            .finish_non_exhaustive()
    }
}

impl UpdateCoordinator {
    /// Create a coordinator with its own instance id allocator.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::InvalidConfig`] if `config` does not validate.
    pub fn new(
        config: UpdateConfig,
        dispatcher: Arc<dyn RequestDispatcher>,
        package: Arc<dyn PackageByteSource>,
        components: ComponentTable,
    ) -> UpdateResult<Self> {
        let allocator = Arc::new(InstanceIdAllocator::new(config.instance_id_expiry));
        Self::with_allocator(config, allocator, dispatcher, package, components)
    }

    /// Create a coordinator sharing an existing allocator.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::InvalidConfig`] if `config` does not validate.
    pub fn with_allocator(
        config: UpdateConfig,
        allocator: Arc<InstanceIdAllocator>,
        dispatcher: Arc<dyn RequestDispatcher>,
        package: Arc<dyn PackageByteSource>,
        components: ComponentTable,
    ) -> UpdateResult<Self> {
        config.validate()?;
        let progress = Arc::new(ProgressTracker::new(1000));
        let observer: Arc<dyn UpdateObserver> = Arc::clone(&progress) as Arc<dyn UpdateObserver>;
        Ok(Self {
            context: SessionContext {
                config: Arc::new(config),
                allocator,
                dispatcher,
                package,
                observer,
            },
            components: Arc::new(components),
            progress,
            active_updates: Mutex::new(HashMap::new()),
        })
    }

    /// Instance id allocator shared by this coordinator's sessions
    pub fn allocator(&self) -> &Arc<InstanceIdAllocator> {
        &self.context.allocator
    }

    /// Start updating the device described by `record`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::UpdateInProgress`] if the endpoint already has a
    /// session, or [`UpdateError::Configuration`] outside a runtime.
    pub fn start_update(&self, record: FirmwareDeviceRecord) -> UpdateResult<SessionHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| UpdateError::Configuration(format!("no async runtime: {err}")))?;
        let endpoint = record.endpoint;

        let mut active_updates = self.active_updates.lock();
        if active_updates.contains_key(&endpoint) {
            return Err(UpdateError::UpdateInProgress(endpoint));
        }

        info!(endpoint, "Starting firmware update session");
        self.progress
            .register(endpoint, record.applicable_components.len());
        let (session, handle) =
            DeviceUpdateSession::new(record, Arc::clone(&self.components), self.context.clone());
        let task = runtime.spawn(session.run());
        active_updates.insert(
            endpoint,
            UpdateHandle {
                session: handle.clone(),
                task: Some(task),
                started_at: Instant::now(),
            },
        );
        Ok(handle)
    }

    /// Route a target-initiated request to the endpoint's session.
    ///
    /// Endpoints without a live session are answered `NOT_IN_UPDATE_MODE`.
    pub async fn handle_inbound(
        &self,
        endpoint: EndpointId,
        request: RequestMessage,
    ) -> ResponseMessage {
        let session = self
            .active_updates
            .lock()
            .get(&endpoint)
            .map(|update| update.session.clone());
        let Some(session) = session else {
            warn!(
                endpoint,
                command = request.command,
                "Request from endpoint not in update"
            );
            return request.respond(completion_code::NOT_IN_UPDATE_MODE, Vec::new());
        };

        let fallback = request.respond(completion_code::NOT_IN_UPDATE_MODE, Vec::new());
        match session.handle_request(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(endpoint, %err, "Session gone while handling request");
                fallback
            }
        }
    }

    /// Decode a raw request, route it and encode the response.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Decode`] if the bytes are not a request.
    pub async fn handle_inbound_bytes(
        &self,
        endpoint: EndpointId,
        bytes: &[u8],
    ) -> UpdateResult<Vec<u8>> {
        let request = RequestMessage::from_bytes(bytes)
            .map_err(|err| UpdateError::decode("inbound request", &err))?;
        Ok(self.handle_inbound(endpoint, request).await.to_bytes())
    }

    /// Wait for the endpoint's session to finish and collect its report.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::SessionClosed`] if there is no session to wait
    /// for or the session task did not finish normally.
    pub async fn wait_for_completion(
        &self,
        endpoint: EndpointId,
    ) -> UpdateResult<DeviceUpdateReport> {
        let (task, started_at) = {
            let mut active_updates = self.active_updates.lock();
            let update = active_updates
                .get_mut(&endpoint)
                .ok_or(UpdateError::SessionClosed)?;
            (update.task.take(), update.started_at)
        };
        let task = task.ok_or(UpdateError::SessionClosed)?;

        let joined = task.await;
        self.active_updates.lock().remove(&endpoint);
        let components = self.progress.collect(endpoint);
        let state = joined.map_err(|err| {
            error!(endpoint, %err, "Session task did not finish");
            UpdateError::SessionClosed
        })?;

        let (success, error) = match state {
            SessionState::Completed => (true, None),
            SessionState::Failed(err) => (false, Some(err.to_string())),
            other => (false, Some(format!("session stopped in state {other:?}"))),
        };
        Ok(DeviceUpdateReport {
            endpoint,
            success,
            components,
            duration: started_at.elapsed(),
            error,
        })
    }

    /// Cancel the endpoint's update.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::SessionClosed`] if the endpoint has no live
    /// session.
    pub fn cancel_update(&self, endpoint: EndpointId) -> UpdateResult<()> {
        let active_updates = self.active_updates.lock();
        let update = active_updates
            .get(&endpoint)
            .ok_or(UpdateError::SessionClosed)?;
        update.session.cancel()?;
        info!(endpoint, "Sent cancel signal");
        Ok(())
    }

    /// Drop collected devices from the aggregate progress.
    ///
    /// Devices stay in the aggregate after [`wait_for_completion`] so the
    /// reported percentage never goes backwards within one batch. Call this
    /// before starting the next batch.
    ///
    /// [`wait_for_completion`]: UpdateCoordinator::wait_for_completion
    pub fn clear_finished_progress(&self) {
        self.progress.clear_collected();
    }

    /// Subscribe to progress updates
    pub fn subscribe_progress(&self) -> broadcast::Receiver<UpdateProgress> {
        self.progress.progress_tx.subscribe()
    }

    /// Endpoints with a session that has not been collected yet
    pub fn active_updates(&self) -> Vec<EndpointId> {
        let mut endpoints: Vec<_> = self.active_updates.lock().keys().copied().collect();
        endpoints.sort_unstable();
        endpoints
    }

    /// Check if any update session is still running
    pub fn is_update_in_progress(&self) -> bool {
        self.active_updates
            .lock()
            .values()
            .any(|update| !update.session.state().is_terminal())
    }
}
