//! Collaborator traits at the edges of an update session.

use async_trait::async_trait;
use pldm_fw_wire::{RequestMessage, ResponseMessage};

use crate::error::UpdateResult;
use crate::records::EndpointId;

/// Delivers agent-initiated requests and returns the matching response.
///
/// Implementations own retries and transport binding. A session bounds each
/// call with its own command timeout, so a dispatcher that never answers
/// fails the session rather than stalling it.
#[async_trait]
pub trait RequestDispatcher: Send + Sync {
    /// Send `request` to `endpoint` and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Transport`](crate::UpdateError::Transport) when
    /// no response could be obtained.
    async fn submit(
        &self,
        endpoint: EndpointId,
        request: RequestMessage,
    ) -> UpdateResult<ResponseMessage>;
}

/// Receives per-component and per-device completion notifications.
pub trait UpdateObserver: Send + Sync {
    /// A component finished, successfully or not
    fn on_component_applied(&self, endpoint: EndpointId, component_index: usize, success: bool);

    /// The device update reached a terminal state
    fn on_device_update_completion(&self, endpoint: EndpointId, success: bool);
}

/// Observer that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl UpdateObserver for NoopObserver {
    fn on_component_applied(
        &self,
        _endpoint: EndpointId,
        _component_index: usize,
        _success: bool,
    ) {
    }

    fn on_device_update_completion(&self, _endpoint: EndpointId, _success: bool) {}
}
