//! Per-device update session.
//!
//! A session drives one target endpoint through the update sequence:
//!
//! ```text
//! Idle -> AwaitingUpdateAck -> PassingComponentTable(0..N)
//!      -> UpdatingComponent(i) -> AwaitingComponentOutcome(i) -> (i + 1 | ActivatingFirmware)
//!      -> Completed | Failed
//! ```
//!
//! The session runs as a single task consuming an event queue. Responses to
//! agent-initiated commands, target-initiated requests and deferred
//! continuations all arrive as events, so transitions never nest and many
//! sessions interleave on one runtime thread.

mod data_service;

use data_service::InboundReply;
pub use data_service::{
    FirmwareDataWindow, PackageDataPart, plan_firmware_data, plan_package_data, read_firmware_data,
};

use std::fmt;
use std::sync::Arc;

use pldm_fw_wire::{
    ActivateFirmwareRequest, ActivateFirmwareResponse, CancelUpdateResponse, ComponentIdentity,
    FwUpCommand, PLDM_TYPE_FIRMWARE_UPDATE, PassComponentTableRequest, PassComponentTableResponse,
    RequestMessage, RequestUpdateRequest, RequestUpdateResponse, ResponseMessage, TransferFlag,
    UpdateComponentRequest, UpdateComponentResponse, WireMessage, completion_code,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::UpdateConfig;
use crate::dispatcher::{RequestDispatcher, UpdateObserver};
use crate::error::{UpdateError, UpdateResult};
use crate::instance_id::{InstanceIdAllocator, InstanceIdLease};
use crate::package::PackageByteSource;
use crate::records::{ComponentImageInfo, ComponentTable, EndpointId, FirmwareDeviceRecord};

/// Where a session is in the update sequence.
///
/// Positions index the device's applicable component list, not the package
/// component table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Not started
    #[default]
    Idle,
    /// RequestUpdate sent
    AwaitingUpdateAck,
    /// PassComponentTable sent for the component at `position`
    PassingComponentTable {
        /// Position in the applicable component list
        position: usize,
    },
    /// UpdateComponent sent for the component at `position`
    UpdatingComponent {
        /// Position in the applicable component list
        position: usize,
    },
    /// Target is pulling and applying the component at `position`
    AwaitingComponentOutcome {
        /// Position in the applicable component list
        position: usize,
    },
    /// ActivateFirmware sent
    ActivatingFirmware,
    /// Target accepted activation
    Completed,
    /// Update aborted
    Failed(UpdateError),
}

impl SessionState {
    /// Whether no further transitions can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed(_))
    }

    /// Whether the target is between RequestUpdate and the end of the update
    pub fn is_in_progress(&self) -> bool {
        !matches!(self, SessionState::Idle) && !self.is_terminal()
    }
}

/// Shared collaborators every session needs.
#[derive(Clone)]
pub struct SessionContext {
    /// Agent configuration
    pub config: Arc<UpdateConfig>,
    /// Instance id pool
    pub allocator: Arc<InstanceIdAllocator>,
    /// Request delivery
    pub dispatcher: Arc<dyn RequestDispatcher>,
    /// Package bytes
    pub package: Arc<dyn PackageByteSource>,
    /// Completion notifications
    pub observer: Arc<dyn UpdateObserver>,
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("config", &self.config)
            .field("allocator", &self.allocator)
            .field("package", &self.package)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum SessionEvent {
    Continue,
    Response {
        token: u64,
        outcome: UpdateResult<ResponseMessage>,
    },
    Inbound {
        request: RequestMessage,
        reply: oneshot::Sender<ResponseMessage>,
    },
    OutcomeTimeout,
    Cancel,
}

#[derive(Debug)]
struct PendingCommand {
    token: u64,
    command: FwUpCommand,
    _lease: InstanceIdLease,
}

/// Handle for talking to a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    endpoint: EndpointId,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Endpoint the session updates
    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Deliver a target-initiated request and wait for the session's answer.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::SessionClosed`] if the session has ended.
    pub async fn handle_request(&self, request: RequestMessage) -> UpdateResult<ResponseMessage> {
        let (reply, response) = oneshot::channel();
        self.events
            .send(SessionEvent::Inbound { request, reply })
            .map_err(|_closed| UpdateError::SessionClosed)?;
        response.await.map_err(|_closed| UpdateError::SessionClosed)
    }

    /// Abort the update
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::SessionClosed`] if the session has ended.
    pub fn cancel(&self) -> UpdateResult<()> {
        self.events
            .send(SessionEvent::Cancel)
            .map_err(|_closed| UpdateError::SessionClosed)
    }

    /// Wait until the session state satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::SessionClosed`] if the session ends first.
    pub async fn wait_for_state(
        &self,
        mut predicate: impl FnMut(&SessionState) -> bool,
    ) -> UpdateResult<SessionState> {
        let mut state = self.state.clone();
        let matched = state
            .wait_for(|current| predicate(current))
            .await
            .map_err(|_closed| UpdateError::SessionClosed)?;
        Ok(SessionState::clone(&matched))
    }
}

/// State machine updating one firmware device.
#[derive(Debug)]
pub struct DeviceUpdateSession {
    record: FirmwareDeviceRecord,
    components: Arc<ComponentTable>,
    context: SessionContext,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    pending: Option<PendingCommand>,
    next_token: u64,
    outcome_deadline: Option<Instant>,
    in_update_mode: bool,
}

impl DeviceUpdateSession {
    /// Create a session and the handle used to reach it once running.
    pub fn new(
        record: FirmwareDeviceRecord,
        components: Arc<ComponentTable>,
        context: SessionContext,
    ) -> (Self, SessionHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let handle = SessionHandle {
            endpoint: record.endpoint,
            events: events_tx.clone(),
            state: state_rx,
        };
        let session = Self {
            record,
            components,
            context,
            state: SessionState::Idle,
            state_tx,
            events_tx,
            events_rx,
            pending: None,
            next_token: 0,
            outcome_deadline: None,
            in_update_mode: false,
        };
        (session, handle)
    }

    /// Endpoint this session updates
    pub fn endpoint(&self) -> EndpointId {
        self.record.endpoint
    }

    /// Current state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run the update to a terminal state.
    pub async fn run(mut self) -> SessionState {
        if matches!(self.state, SessionState::Idle) {
            self.begin();
        }

        while !self.state.is_terminal() {
            let deadline = self.outcome_deadline;
            let event = tokio::select! {
                event = self.events_rx.recv() => event,
                () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() => Some(SessionEvent::OutcomeTimeout),
            };
            let Some(event) = event else {
                break;
            };
            self.handle_event(event).await;
        }

        self.state
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Continue => {
                tokio::task::yield_now().await;
                self.issue_step();
            }
            SessionEvent::Response { token, outcome } => self.on_response(token, outcome),
            SessionEvent::Inbound { request, reply } => match self.on_inbound(&request) {
                InboundReply::Ready(response) => self.reply(reply, response),
                InboundReply::Reading(read) => self.reply_after_read(&request, reply, read),
            },
            SessionEvent::OutcomeTimeout => {
                if let SessionState::AwaitingComponentOutcome { position } = self.state {
                    let component_index = self.component_index(position);
                    self.fail(UpdateError::timeout(format!(
                        "target requests for component {component_index}"
                    )));
                }
            }
            SessionEvent::Cancel => {
                info!(endpoint = self.record.endpoint, "Update cancelled");
                self.fail(UpdateError::Cancelled);
            }
        }
    }

    fn reply(&self, reply: oneshot::Sender<ResponseMessage>, response: ResponseMessage) {
        if reply.send(response).is_err() {
            debug!(
                endpoint = self.record.endpoint,
                "Target request abandoned before reply"
            );
        }
    }

    /// Answer once the package read finishes on the blocking pool.
    fn reply_after_read(
        &self,
        request: &RequestMessage,
        reply: oneshot::Sender<ResponseMessage>,
        read: JoinHandle<ResponseMessage>,
    ) {
        let endpoint = self.record.endpoint;
        let failed = request.respond(completion_code::ERROR, Vec::new());
        tokio::spawn(async move {
            let response = match read.await {
                Ok(response) => response,
                Err(err) => {
                    error!(endpoint, %err, "Package read task failed");
                    failed
                }
            };
            if reply.send(response).is_err() {
                debug!(endpoint, "Target request abandoned before reply");
            }
        });
    }

    fn begin(&mut self) {
        if let Err(err) = self.check_record() {
            self.fail(err);
            return;
        }
        info!(
            endpoint = self.record.endpoint,
            components = self.record.applicable_components.len(),
            image_set_version = %self.record.image_set_version,
            "Starting firmware update"
        );
        self.set_state(SessionState::AwaitingUpdateAck);
        self.issue_step();
    }

    fn check_record(&self) -> UpdateResult<()> {
        if self.record.applicable_components.is_empty() {
            return Err(UpdateError::Configuration(format!(
                "endpoint {} has no applicable components",
                self.record.endpoint
            )));
        }
        if let Some(missing) = self
            .record
            .applicable_components
            .iter()
            .find(|index| self.components.get(**index).is_none())
        {
            return Err(UpdateError::Configuration(format!(
                "component {missing} is not in the package ({} components)",
                self.components.len()
            )));
        }
        Ok(())
    }

    fn set_state(&mut self, state: SessionState) {
        info!(
            endpoint = self.record.endpoint,
            from = ?self.state,
            to = ?state,
            "Session transition"
        );
        self.outcome_deadline = matches!(state, SessionState::AwaitingComponentOutcome { .. })
            .then(|| Instant::now() + self.context.config.component_outcome_timeout);
        self.state = state.clone();
        self.state_tx.send_replace(state);
    }

    fn schedule_continue(&self) {
        if self.events_tx.send(SessionEvent::Continue).is_err() {
            error!(
                endpoint = self.record.endpoint,
                "Session event queue closed"
            );
        }
    }

    fn component_at(&self, position: usize) -> Option<(usize, &ComponentImageInfo)> {
        let index = *self.record.applicable_components.get(position)?;
        Some((index, self.components.get(index)?))
    }

    fn component_index(&self, position: usize) -> usize {
        self.record
            .applicable_components
            .get(position)
            .copied()
            .unwrap_or(position)
    }

    fn component_identity(
        &self,
        position: usize,
    ) -> UpdateResult<(&ComponentImageInfo, ComponentIdentity)> {
        let (index, component) = self.component_at(position).ok_or_else(|| {
            UpdateError::Configuration(format!("no applicable component at position {position}"))
        })?;
        let classification_index = self
            .components
            .classification_index(component)
            .ok_or_else(|| {
                UpdateError::Configuration(format!(
                    "no classification index for component {index} \
                     (classification {:#06x}, identifier {:#06x})",
                    component.classification, component.identifier
                ))
            })?;
        Ok((component, component.identity(classification_index)))
    }

    /// Build the agent-initiated request belonging to the current state.
    fn next_request(&self) -> UpdateResult<Option<(FwUpCommand, Vec<u8>)>> {
        let config = &self.context.config;
        let count = self.record.applicable_components.len();
        let (command, body) = match self.state {
            SessionState::AwaitingUpdateAck => (
                FwUpCommand::RequestUpdate,
                RequestUpdateRequest::new(
                    config.max_transfer_size,
                    count,
                    config.max_outstanding_transfer_requests,
                    self.record.package_data.len(),
                    &self.record.image_set_version,
                )
                .and_then(|request| request.encode()),
            ),
            SessionState::PassingComponentTable { position } => {
                let (component, identity) = self.component_identity(position)?;
                let request = PassComponentTableRequest {
                    transfer_flag: TransferFlag::for_position(position, count),
                    component: identity,
                    version: component.version_string(),
                };
                (FwUpCommand::PassComponentTable, request.encode())
            }
            SessionState::UpdatingComponent { position } => {
                let (component, identity) = self.component_identity(position)?;
                let request = UpdateComponentRequest {
                    component: identity,
                    image_size: component.size,
                    update_option_flags: component.update_option_flags(),
                    version: component.version_string(),
                };
                (FwUpCommand::UpdateComponent, request.encode())
            }
            SessionState::ActivatingFirmware => (
                FwUpCommand::ActivateFirmware,
                ActivateFirmwareRequest {
                    self_contained_activation: false,
                }
                .encode(),
            ),
            _ => return Ok(None),
        };
        body.map(|payload| Some((command, payload)))
            .map_err(|err| UpdateError::encode(command.name(), &err))
    }

    fn issue_step(&mut self) {
        match self.next_request() {
            Ok(Some((command, payload))) => self.submit(command, payload),
            Ok(None) => {}
            Err(err) => self.fail(err),
        }
    }

    fn submit(&mut self, command: FwUpCommand, payload: Vec<u8>) {
        let endpoint = self.record.endpoint;
        let lease = match self.context.allocator.lease(endpoint) {
            Ok(lease) => lease,
            Err(err) => {
                self.fail(err);
                return;
            }
        };
        let request = RequestMessage::firmware_update(lease.id(), command.code(), payload);
        let token = self.next_token;
        self.next_token = self.next_token.wrapping_add(1);
        debug!(
            endpoint,
            command = command.name(),
            instance_id = lease.id().get(),
            "Submitting request"
        );
        self.pending = Some(PendingCommand {
            token,
            command,
            _lease: lease,
        });

        let dispatcher = Arc::clone(&self.context.dispatcher);
        let events = self.events_tx.clone();
        let limit = self.context.config.command_timeout;
        tokio::spawn(async move {
            let response = tokio::time::timeout(limit, dispatcher.submit(endpoint, request));
            let outcome = match response.await {
                Ok(outcome) => outcome,
                Err(_elapsed) => Err(UpdateError::timeout(format!("{command} response"))),
            };
            let delivered = events.send(SessionEvent::Response { token, outcome });
            if delivered.is_err() {
                debug!(
                    endpoint,
                    command = command.name(),
                    "Session ended before response"
                );
            }
        });
    }

    fn on_response(&mut self, token: u64, outcome: UpdateResult<ResponseMessage>) {
        let Some(pending) = self.pending.take_if(|pending| pending.token == token) else {
            debug!(
                endpoint = self.record.endpoint,
                token,
                "Ignoring stale response"
            );
            return;
        };
        let command = pending.command;
        drop(pending);

        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                self.fail(err);
                return;
            }
        };
        if let Err(err) = self.process_response(command, &response) {
            self.fail(err);
        }
    }

    fn process_response(
        &mut self,
        command: FwUpCommand,
        response: &ResponseMessage,
    ) -> UpdateResult<()> {
        let endpoint = self.record.endpoint;
        if response.command != command.code() {
            return Err(UpdateError::Decode {
                command: command.name(),
                reason: format!("response carries command {:#04x}", response.command),
            });
        }
        if command == FwUpCommand::RequestUpdate && response.is_success() {
            self.in_update_mode = true;
        }
        if !response.is_success() {
            error!(
                endpoint,
                command = command.name(),
                completion_code = response.completion_code,
                "Target rejected command"
            );
            return Err(UpdateError::Remote {
                command: command.name(),
                completion_code: response.completion_code,
            });
        }

        match (command, self.state.clone()) {
            (FwUpCommand::RequestUpdate, SessionState::AwaitingUpdateAck) => {
                let ack: RequestUpdateResponse = decode_body(&response.body)?;
                info!(
                    endpoint,
                    fd_metadata_length = ack.fd_metadata_length,
                    will_send_package_data = ack.fd_will_send_package_data,
                    "Target entered update mode"
                );
                self.set_state(SessionState::PassingComponentTable { position: 0 });
                self.schedule_continue();
            }
            (FwUpCommand::PassComponentTable, SessionState::PassingComponentTable { position }) => {
                let ack: PassComponentTableResponse = decode_body(&response.body)?;
                debug!(
                    endpoint,
                    component_index = self.component_index(position),
                    component_response = ack.component_response,
                    component_response_code = ack.component_response_code,
                    "Component table entry accepted"
                );
                let next = position + 1;
                if next < self.record.applicable_components.len() {
                    self.set_state(SessionState::PassingComponentTable { position: next });
                } else {
                    self.set_state(SessionState::UpdatingComponent { position: 0 });
                }
                self.schedule_continue();
            }
            (FwUpCommand::UpdateComponent, SessionState::UpdatingComponent { position }) => {
                let ack: UpdateComponentResponse = decode_body(&response.body)?;
                let component_index = self.component_index(position);
                if ack.is_compatible() {
                    info!(
                        endpoint,
                        component_index,
                        time_before_request_fw_data = ack.time_before_request_fw_data,
                        "Component accepted, waiting for target"
                    );
                    self.set_state(SessionState::AwaitingComponentOutcome { position });
                } else {
                    warn!(
                        endpoint,
                        component_index,
                        compatibility_response_code = ack.compatibility_response_code,
                        "Target will not update component"
                    );
                    self.context
                        .observer
                        .on_component_applied(endpoint, component_index, false);
                    self.advance_component(position);
                }
            }
            (FwUpCommand::ActivateFirmware, SessionState::ActivatingFirmware) => {
                let ack: ActivateFirmwareResponse = decode_body(&response.body)?;
                info!(
                    endpoint,
                    estimated_time_for_activation = ack.estimated_time_for_activation,
                    "Firmware activation accepted"
                );
                self.set_state(SessionState::Completed);
                self.context
                    .observer
                    .on_device_update_completion(endpoint, true);
            }
            (command, state) => {
                return Err(UpdateError::Decode {
                    command: command.name(),
                    reason: format!("response arrived in state {state:?}"),
                });
            }
        }
        Ok(())
    }

    fn advance_component(&mut self, position: usize) {
        let next = position + 1;
        if next < self.record.applicable_components.len() {
            self.set_state(SessionState::UpdatingComponent { position: next });
        } else {
            self.set_state(SessionState::ActivatingFirmware);
        }
        self.schedule_continue();
    }

    fn on_inbound(&mut self, request: &RequestMessage) -> InboundReply {
        let endpoint = self.record.endpoint;
        if request.pldm_type != PLDM_TYPE_FIRMWARE_UPDATE {
            return request
                .respond(completion_code::ERROR_INVALID_PLDM_TYPE, Vec::new())
                .into();
        }
        let command = match FwUpCommand::from_code(request.command) {
            Some(
                command @ (FwUpCommand::GetPackageData
                | FwUpCommand::RequestFirmwareData
                | FwUpCommand::TransferComplete
                | FwUpCommand::VerifyComplete
                | FwUpCommand::ApplyComplete),
            ) => command,
            _ => {
                debug!(
                    endpoint,
                    command = request.command,
                    "Unsupported target request"
                );
                return request
                    .respond(completion_code::ERROR_UNSUPPORTED_PLDM_CMD, Vec::new())
                    .into();
            }
        };

        match (command, self.state.clone()) {
            (FwUpCommand::GetPackageData, state) if state.is_in_progress() => {
                self.serve_package_data(request).into()
            }
            (_, SessionState::AwaitingComponentOutcome { position })
                if command != FwUpCommand::GetPackageData =>
            {
                self.rearm_outcome_deadline();
                self.serve_component_request(command, position, request)
            }
            // The target may start pulling as soon as it has answered
            // UpdateComponent, before that answer reaches this session.
            (
                FwUpCommand::RequestFirmwareData
                | FwUpCommand::TransferComplete
                | FwUpCommand::VerifyComplete,
                SessionState::UpdatingComponent { position },
            ) if self.awaiting(FwUpCommand::UpdateComponent) => {
                debug!(
                    endpoint,
                    command = command.name(),
                    "Target request ahead of UpdateComponent response"
                );
                self.serve_component_request(command, position, request)
            }
            (command, state) => {
                warn!(
                    endpoint,
                    command = command.name(),
                    state = ?state,
                    "Target request not expected in current state"
                );
                request
                    .respond(completion_code::COMMAND_NOT_EXPECTED, Vec::new())
                    .into()
            }
        }
    }

    fn serve_component_request(
        &mut self,
        command: FwUpCommand,
        position: usize,
        request: &RequestMessage,
    ) -> InboundReply {
        match command {
            FwUpCommand::RequestFirmwareData => self.serve_firmware_data(position, request),
            FwUpCommand::TransferComplete => self.acknowledge_transfer(position, request).into(),
            FwUpCommand::VerifyComplete => self.acknowledge_verify(position, request).into(),
            _ => self.acknowledge_apply(position, request).into(),
        }
    }

    fn awaiting(&self, command: FwUpCommand) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|pending| pending.command == command)
    }

    fn rearm_outcome_deadline(&mut self) {
        let timeout = self.context.config.component_outcome_timeout;
        self.outcome_deadline = Some(Instant::now() + timeout);
    }

    fn fail(&mut self, error: UpdateError) {
        if self.state.is_terminal() {
            return;
        }
        let endpoint = self.record.endpoint;
        error!(endpoint, state = ?self.state, %error, "Firmware update failed");
        self.pending = None;
        if self.in_update_mode && self.context.config.cancel_on_failure {
            self.send_cancel();
        }
        self.set_state(SessionState::Failed(error));
        self.context
            .observer
            .on_device_update_completion(endpoint, false);
    }

    /// Best-effort CancelUpdate; its outcome is only logged.
    fn send_cancel(&self) {
        let endpoint = self.record.endpoint;
        let lease = match self.context.allocator.lease(endpoint) {
            Ok(lease) => lease,
            Err(err) => {
                warn!(endpoint, %err, "Cannot send CancelUpdate");
                return;
            }
        };
        let request = RequestMessage::firmware_update(
            lease.id(),
            FwUpCommand::CancelUpdate.code(),
            Vec::new(),
        );
        let dispatcher = Arc::clone(&self.context.dispatcher);
        let limit = self.context.config.command_timeout;
        tokio::spawn(async move {
            let _lease = lease;
            match tokio::time::timeout(limit, dispatcher.submit(endpoint, request)).await {
                Ok(Ok(response)) if response.is_success() => {
                    match CancelUpdateResponse::decode(&response.body) {
                        Ok(body) => info!(
                            endpoint,
                            non_functioning = body.non_functioning_component_indication,
                            non_functioning_bitmap = body.non_functioning_component_bitmap,
                            "Target cancelled update"
                        ),
                        Err(err) => warn!(endpoint, %err, "Malformed CancelUpdate response"),
                    }
                }
                Ok(Ok(response)) => warn!(
                    endpoint,
                    completion_code = response.completion_code,
                    "Target rejected CancelUpdate"
                ),
                Ok(Err(err)) => warn!(endpoint, %err, "CancelUpdate not delivered"),
                Err(_elapsed) => warn!(endpoint, "CancelUpdate timed out"),
            }
        });
    }
}

fn decode_body<T: WireMessage>(body: &[u8]) -> UpdateResult<T> {
    T::decode(body)
        .map_err(|err| UpdateError::decode(T::COMMAND.name(), &err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use pldm_fw_wire::InstanceId;
    use tracing_test::traced_test;

    use crate::dispatcher::NoopObserver;
    use crate::package::MemoryPackage;

    /// Target that never answers
    struct SilentTarget;

    #[async_trait::async_trait]
    impl RequestDispatcher for SilentTarget {
        async fn submit(
            &self,
            _endpoint: EndpointId,
            _request: RequestMessage,
        ) -> UpdateResult<ResponseMessage> {
            std::future::pending().await
        }
    }

    fn silent_session() -> DeviceUpdateSession {
        let context = SessionContext {
            config: Arc::new(UpdateConfig::default()),
            allocator: Arc::new(InstanceIdAllocator::new(Duration::from_secs(5))),
            dispatcher: Arc::new(SilentTarget),
            package: Arc::new(MemoryPackage::new(vec![0u8; 32])),
            observer: Arc::new(NoopObserver),
        };
        let components = ComponentTable::new(vec![ComponentImageInfo {
            classification: 0x000A,
            identifier: 1,
            comparison_stamp: 1,
            options: 0,
            requested_activation_method: 0,
            size: 32,
            package_offset: 0,
            version: "1.0".to_string(),
        }])
        .with_classification_index(0x000A, 1, 0);
        let record = FirmwareDeviceRecord {
            endpoint: 3,
            applicable_components: vec![0],
            package_data: Vec::new(),
            image_set_version: "set".to_string(),
        };
        DeviceUpdateSession::new(record, Arc::new(components), context).0
    }

    fn update_ack() -> UpdateResult<ResponseMessage> {
        let id = InstanceId::new(0).ok_or(UpdateError::SessionClosed)?;
        let body = RequestUpdateResponse {
            fd_metadata_length: 0,
            fd_will_send_package_data: false,
        }
        .encode()
        .map_err(|err| UpdateError::encode("RequestUpdate", &err))?;
        let request =
            RequestMessage::firmware_update(id, FwUpCommand::RequestUpdate.code(), Vec::new());
        Ok(request.respond(completion_code::SUCCESS, body))
    }

    #[tokio::test]
    #[traced_test]
    async fn test_responses_with_old_tokens_are_ignored() -> UpdateResult<()> {
        let mut session = silent_session();
        session.begin();
        assert_eq!(session.state, SessionState::AwaitingUpdateAck);
        let token = session.pending.as_ref().map(|pending| pending.token);
        assert_eq!(token, Some(0));
        assert_eq!(session.context.allocator.held_count(3), 1);

        session.on_response(7, update_ack());
        assert_eq!(session.state, SessionState::AwaitingUpdateAck);
        assert!(session.pending.is_some());
        assert!(logs_contain("Ignoring stale response"));

        session.on_response(0, Err(UpdateError::timeout("RequestUpdate response")));
        let timed_out = SessionState::Failed(UpdateError::timeout("RequestUpdate response"));
        assert_eq!(session.state, timed_out);
        assert_eq!(session.context.allocator.held_count(3), 0);

        // The answer the target sent after the timeout
        session.on_response(0, update_ack());
        assert_eq!(session.state, timed_out);
        assert!(!session.in_update_mode);
        Ok(())
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Failed(UpdateError::Cancelled).is_terminal());
        assert!(!SessionState::ActivatingFirmware.is_terminal());
        assert!(!SessionState::Idle.is_in_progress());
        assert!(SessionState::AwaitingComponentOutcome { position: 0 }.is_in_progress());
        assert!(!SessionState::Completed.is_in_progress());
    }
}
