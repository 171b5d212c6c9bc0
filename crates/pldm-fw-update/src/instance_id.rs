//! Per-endpoint instance id pool.
//!
//! Every agent-initiated request holds an instance id for the lifetime of its
//! exchange. The pool is small (32 ids per endpoint), so a holder that never
//! returns its id would eventually starve the endpoint; ids held longer than
//! the configured expiry are reclaimed when the pool runs dry.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pldm_fw_wire::InstanceId;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{UpdateError, UpdateResult};
use crate::records::EndpointId;

#[derive(Debug, Clone, Copy)]
struct Holder {
    acquired_at: Instant,
    generation: u64,
}

#[derive(Debug, Default)]
struct AllocatorState {
    endpoints: HashMap<EndpointId, BTreeMap<InstanceId, Holder>>,
    next_generation: u64,
}

impl AllocatorState {
    fn hold(&mut self, endpoint: EndpointId, id: InstanceId, now: Instant) -> u64 {
        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);
        let holder = Holder {
            acquired_at: now,
            generation,
        };
        self.endpoints
            .entry(endpoint)
            .or_default()
            .insert(id, holder);
        generation
    }
}

/// Pool of instance ids, scoped per endpoint.
#[derive(Debug)]
pub struct InstanceIdAllocator {
    expiry: Duration,
    state: Mutex<AllocatorState>,
}

impl InstanceIdAllocator {
    /// Create an allocator that reclaims ids held longer than `expiry`.
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            state: Mutex::new(AllocatorState::default()),
        }
    }

    /// Reclamation age
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Acquire the lowest free id for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::ResourceExhausted`] when every id is held and
    /// none has outlived the expiry.
    pub fn acquire(&self, endpoint: EndpointId) -> UpdateResult<InstanceId> {
        self.acquire_at(endpoint, Instant::now())
    }

    /// Acquire as if the current time were `now`.
    pub fn acquire_at(&self, endpoint: EndpointId, now: Instant) -> UpdateResult<InstanceId> {
        self.acquire_tracked(endpoint, now).map(|(id, _)| id)
    }

    fn acquire_tracked(
        &self,
        endpoint: EndpointId,
        now: Instant,
    ) -> UpdateResult<(InstanceId, u64)> {
        let mut state = self.state.lock();
        let held = state.endpoints.entry(endpoint).or_default();

        if let Some(id) = InstanceId::all().find(|id| !held.contains_key(id)) {
            let generation = state.hold(endpoint, id, now);
            debug!(endpoint, instance_id = id.get(), "Acquired instance id");
            return Ok((id, generation));
        }

        let oldest = held
            .iter()
            .min_by_key(|(_, holder)| holder.acquired_at)
            .map(|(id, holder)| (*id, holder.acquired_at));

        match oldest {
            Some((id, acquired_at)) if now.saturating_duration_since(acquired_at) > self.expiry => {
                warn!(
                    endpoint,
                    instance_id = id.get(),
                    held_for_ms = now.saturating_duration_since(acquired_at).as_millis() as u64,
                    "Forcibly reclaiming expired instance id"
                );
                let generation = state.hold(endpoint, id, now);
                Ok((id, generation))
            }
            _ => Err(UpdateError::ResourceExhausted { endpoint }),
        }
    }

    /// Release `id` for `endpoint`. Releasing a free id is a no-op.
    pub fn release(&self, endpoint: EndpointId, id: InstanceId) {
        let mut state = self.state.lock();
        let removed = state
            .endpoints
            .get_mut(&endpoint)
            .and_then(|held| held.remove(&id));
        if removed.is_some() {
            debug!(endpoint, instance_id = id.get(), "Released instance id");
        }
    }

    fn release_generation(&self, endpoint: EndpointId, id: InstanceId, generation: u64) {
        let mut state = self.state.lock();
        let Some(held) = state.endpoints.get_mut(&endpoint) else {
            return;
        };
        match held.get(&id) {
            Some(holder) if holder.generation == generation => {
                held.remove(&id);
                debug!(endpoint, instance_id = id.get(), "Released instance id");
            }
            Some(_) => {
                debug!(
                    endpoint,
                    instance_id = id.get(),
                    "Instance id was reclaimed; leaving new holder in place"
                );
            }
            None => {}
        }
    }

    /// Acquire an id wrapped in a lease that releases it on drop.
    pub fn lease(self: &Arc<Self>, endpoint: EndpointId) -> UpdateResult<InstanceIdLease> {
        self.lease_at(endpoint, Instant::now())
    }

    /// Lease as if the current time were `now`.
    pub fn lease_at(
        self: &Arc<Self>,
        endpoint: EndpointId,
        now: Instant,
    ) -> UpdateResult<InstanceIdLease> {
        let (id, generation) = self.acquire_tracked(endpoint, now)?;
        Ok(InstanceIdLease {
            allocator: Arc::clone(self),
            endpoint,
            id,
            generation,
        })
    }

    /// Whether `id` is currently held for `endpoint`
    pub fn is_held(&self, endpoint: EndpointId, id: InstanceId) -> bool {
        self.state
            .lock()
            .endpoints
            .get(&endpoint)
            .is_some_and(|held| held.contains_key(&id))
    }

    /// Number of ids currently held for `endpoint`
    pub fn held_count(&self, endpoint: EndpointId) -> usize {
        self.state
            .lock()
            .endpoints
            .get(&endpoint)
            .map_or(0, BTreeMap::len)
    }
}

/// An instance id held for one exchange.
///
/// Dropping the lease returns the id, unless it has since been reclaimed and
/// handed to someone else.
#[derive(Debug)]
pub struct InstanceIdLease {
    allocator: Arc<InstanceIdAllocator>,
    endpoint: EndpointId,
    id: InstanceId,
    generation: u64,
}

impl InstanceIdLease {
    /// The leased id
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Endpoint the id belongs to
    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }
}

impl Drop for InstanceIdLease {
    fn drop(&mut self) {
        self.allocator
            .release_generation(self.endpoint, self.id, self.generation);
    }
}
