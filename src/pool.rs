//! Generic pooled-resource core: slot bookkeeping, lease timers, warm pool,
//! and health-driven replacement, independent of what a "resource" actually is.
//!
//! The browser-specific behavior (how to launch, tear down, and health-check
//! a Chrome instance) lives behind the [`ResourceFactory`] trait, implemented
//! in [`crate::browser_pool`]. This module only knows about slots, sessions,
//! and timers — it never touches a process handle directly.
//!
//! Rust's `tokio::sync::Mutex` is not reentrant, unlike the lock the original
//! pool implementation relies on. Every public method here locks the registry
//! at most once per await point and releases it before doing any I/O
//! (`factory.create`, `factory.cleanup`, `factory.health_check` all run with
//! the lock released), then re-acquires briefly to commit the result.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::models::{HealthSignal, ResourceDescriptor};

/// Adapts the generic pool core to one concrete kind of pooled resource.
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    type Resource: Send + Sync + 'static;

    /// Bring up a fresh resource bound to the given slot.
    async fn create(&self, slot_id: u32) -> Result<Self::Resource, GatewayError>;

    /// Tear a resource down. Errors are logged by the caller; cleanup never
    /// blocks the slot from being reused afterwards.
    async fn cleanup(&self, slot_id: u32, resource: Self::Resource);

    /// Non-blocking liveness check.
    async fn health_check(&self, slot_id: u32, resource: &mut Self::Resource) -> HealthSignal;
}

struct ManagedResource<R> {
    resource: R,
    last_used: Instant,
    session_id: Option<String>,
    lease_timeout: u64,
    startup_attempts: u32,
    is_active: bool,
}

struct Registry<R> {
    slots: HashMap<u32, ManagedResource<R>>,
    free_slots: VecDeque<u32>,
    next_fresh_id: u32,
    sessions: HashMap<String, u32>,
    timers: HashMap<u32, tokio::task::JoinHandle<()>>,
    /// Slots given up on by the health sweep after exhausting
    /// `max_startup_attempts`: a dead shell with no resource behind it,
    /// awaiting the replacement loop's next attempt. Not in `free_slots` —
    /// the warm-pool loop must not silently reclaim these ids for a fresh
    /// instance; only `run_replacement_sweep` retries them.
    inactive: HashMap<u32, Instant>,
}

impl<R> Registry<R> {
    fn new() -> Self {
        Self {
            slots: HashMap::new(),
            free_slots: VecDeque::new(),
            next_fresh_id: 0,
            sessions: HashMap::new(),
            timers: HashMap::new(),
            inactive: HashMap::new(),
        }
    }

    fn reserve_slot(&mut self, max_instances: u32) -> Option<u32> {
        if let Some(id) = self.free_slots.pop_front() {
            return Some(id);
        }
        if self.next_fresh_id < max_instances {
            let id = self.next_fresh_id;
            self.next_fresh_id += 1;
            return Some(id);
        }
        None
    }

    fn cancel_timer(&mut self, slot_id: u32) {
        if let Some(handle) = self.timers.remove(&slot_id) {
            handle.abort();
        }
    }
}

/// Fixed wake-up period for the warm-pool loop — not configurable, per the
/// pool core's contract.
const WARM_POOL_INTERVAL: Duration = Duration::from_secs(5);

pub struct PoolConfig {
    pub max_instances: u32,
    pub num_warm: u32,
    pub default_lease_secs: u64,
    pub max_startup_attempts: u32,
    pub health_check_interval: Duration,
    /// Wake-up period for the replacement loop, which retries slots the
    /// health loop gave up on after exhausting `max_startup_attempts`.
    pub scale_down_interval: Duration,
}

/// A generic pool of lease-managed resources identified by small integer slots.
pub struct ResourcePool<F: ResourceFactory> {
    factory: Arc<F>,
    config: PoolConfig,
    registry: Arc<Mutex<Registry<F::Resource>>>,
}

impl<F: ResourceFactory> Clone for ResourcePool<F> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            config: PoolConfig {
                max_instances: self.config.max_instances,
                num_warm: self.config.num_warm,
                default_lease_secs: self.config.default_lease_secs,
                max_startup_attempts: self.config.max_startup_attempts,
                health_check_interval: self.config.health_check_interval,
                scale_down_interval: self.config.scale_down_interval,
            },
            registry: self.registry.clone(),
        }
    }
}

impl<F: ResourceFactory> ResourcePool<F> {
    pub fn new(factory: F, config: PoolConfig) -> Self {
        Self {
            factory: Arc::new(factory),
            config,
            registry: Arc::new(Mutex::new(Registry::new())),
        }
    }

    /// Assign an idle resource to a new session, creating one if capacity allows.
    ///
    /// `wait_secs` bounds both how long this call polls for a free resource
    /// and, once one is assigned, the lease duration installed for it — the
    /// same single value serves both roles, mirroring the upstream contract
    /// where a caller's requested timeout is also their wait budget.
    pub async fn get_resource(&self, wait_secs: u64) -> Result<(u32, String), GatewayError> {
        let deadline = Instant::now() + Duration::from_secs(wait_secs.max(1));
        loop {
            // A failed `try_assign` (e.g. `factory.create` failing on the slow
            // path) is not surfaced immediately — it falls through to the same
            // bounded retry as a `None`, so a transient launch failure doesn't
            // fail a caller who would otherwise have succeeded on the next
            // ~500ms poll. Only the wait budget expiring surfaces an error.
            let outcome = match self.try_assign(wait_secs).await {
                Ok(outcome) => outcome,
                Err(_) => None,
            };
            match outcome {
                Some(assigned) => return Ok(assigned),
                None => {
                    if Instant::now() >= deadline {
                        let occupied = {
                            let reg = self.registry.lock().await;
                            reg.free_slots.is_empty()
                                && reg.next_fresh_id >= self.config.max_instances
                        };
                        return Err(if occupied {
                            GatewayError::AllOccupied
                        } else {
                            GatewayError::NoBrowserAvailable(
                                "unable to provision a new instance in time".to_string(),
                            )
                        });
                    }
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        }
    }

    async fn try_assign(&self, lease_secs: u64) -> Result<Option<(u32, String)>, GatewayError> {
        // Fast path: reuse an idle, already-live instance.
        let idle_slot = {
            let mut reg = self.registry.lock().await;
            reg.slots
                .iter()
                .find(|(_, m)| m.is_active && m.session_id.is_none())
                .map(|(id, _)| *id)
        };
        if let Some(slot_id) = idle_slot {
            return Ok(Some(self.assign_slot(slot_id, lease_secs).await));
        }

        // Slow path: provision a brand new instance into a free slot, if any.
        let reserved = {
            let mut reg = self.registry.lock().await;
            reg.reserve_slot(self.config.max_instances)
        };
        let Some(slot_id) = reserved else {
            return Ok(None);
        };

        match self.factory.create(slot_id).await {
            Ok(resource) => {
                let mut reg = self.registry.lock().await;
                reg.slots.insert(
                    slot_id,
                    ManagedResource {
                        resource,
                        last_used: Instant::now(),
                        session_id: None,
                        lease_timeout: lease_secs,
                        startup_attempts: 0,
                        is_active: true,
                    },
                );
                drop(reg);
                Ok(Some(self.assign_slot(slot_id, lease_secs).await))
            }
            Err(err) => {
                let mut reg = self.registry.lock().await;
                reg.free_slots.push_back(slot_id);
                drop(reg);
                warn!(slot_id, error = %err, "failed to provision new instance");
                Err(err)
            }
        }
    }

    async fn assign_slot(&self, slot_id: u32, lease_secs: u64) -> (u32, String) {
        let session_id = uuid::Uuid::new_v4().to_string();
        {
            let mut reg = self.registry.lock().await;
            reg.cancel_timer(slot_id);
            if let Some(managed) = reg.slots.get_mut(&slot_id) {
                managed.session_id = Some(session_id.clone());
                managed.last_used = Instant::now();
                managed.lease_timeout = lease_secs;
                managed.startup_attempts = 0;
            }
            reg.sessions.insert(session_id.clone(), slot_id);
        }
        self.arm_timer(slot_id, session_id.clone(), lease_secs).await;
        (slot_id, session_id)
    }

    async fn arm_timer(&self, slot_id: u32, session_id: String, lease_secs: u64) {
        let registry = self.registry.clone();
        let factory = self.factory.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(lease_secs)).await;
            timeout_fired(registry, factory, slot_id, session_id).await;
        });
        let mut reg = self.registry.lock().await;
        reg.timers.insert(slot_id, handle);
    }

    /// Validate that `session_id` currently owns `slot_id`.
    pub async fn validate_session(&self, slot_id: u32, session_id: &str) -> bool {
        let reg = self.registry.lock().await;
        matches!(
            reg.slots.get(&slot_id),
            Some(m) if m.is_active && m.session_id.as_deref() == Some(session_id)
        )
    }

    /// Find which slot (if any) a session id currently owns.
    pub async fn slot_for_session(&self, session_id: &str) -> Option<u32> {
        let reg = self.registry.lock().await;
        reg.sessions.get(session_id).copied()
    }

    /// Reset a session's lease back to `lease_secs` from now.
    pub async fn extend_timeout(&self, session_id: &str, lease_secs: u64) -> bool {
        let slot_id = {
            let reg = self.registry.lock().await;
            match reg.sessions.get(session_id) {
                Some(id) => *id,
                None => return false,
            }
        };
        {
            let mut reg = self.registry.lock().await;
            reg.cancel_timer(slot_id);
            if let Some(managed) = reg.slots.get_mut(&slot_id) {
                managed.lease_timeout = lease_secs;
                managed.last_used = Instant::now();
            } else {
                return false;
            }
        }
        self.arm_timer(slot_id, session_id.to_string(), lease_secs)
            .await;
        true
    }

    /// Restart a session's lease timer using its own already-configured
    /// duration, rather than installing a new one. Used once a proxied
    /// WebSocket connection closes, so the instance gets a fresh idle window
    /// of the same length it was originally leased for.
    pub async fn refresh_lease(&self, session_id: &str) -> bool {
        let (slot_id, lease_secs) = {
            let reg = self.registry.lock().await;
            match reg.sessions.get(session_id) {
                Some(id) => match reg.slots.get(id) {
                    Some(m) => (*id, m.lease_timeout),
                    None => return false,
                },
                None => return false,
            }
        };
        {
            let mut reg = self.registry.lock().await;
            reg.cancel_timer(slot_id);
            if let Some(managed) = reg.slots.get_mut(&slot_id) {
                managed.last_used = Instant::now();
            } else {
                return false;
            }
        }
        self.arm_timer(slot_id, session_id.to_string(), lease_secs)
            .await;
        true
    }

    /// Tear a resource down and return its slot to the free list.
    ///
    /// Idempotent: terminating an already-inactive or nonexistent slot
    /// returns `false` without invoking the factory.
    pub async fn terminate_resource(&self, slot_id: u32) -> bool {
        let (resource, session_id) = {
            let mut reg = self.registry.lock().await;
            reg.cancel_timer(slot_id);
            match reg.slots.remove(&slot_id) {
                Some(managed) if managed.is_active => (managed.resource, managed.session_id),
                Some(managed) => {
                    // Already torn down; put it back untouched.
                    reg.slots.insert(slot_id, managed);
                    return false;
                }
                None => return false,
            }
        };
        {
            let mut reg = self.registry.lock().await;
            if let Some(sid) = &session_id {
                reg.sessions.remove(sid);
            }
        }
        self.factory.cleanup(slot_id, resource).await;
        let mut reg = self.registry.lock().await;
        reg.free_slots.push_back(slot_id);
        true
    }

    pub async fn terminate_by_session(&self, session_id: &str) -> bool {
        let slot_id = {
            let reg = self.registry.lock().await;
            match reg.sessions.get(session_id) {
                Some(id) => *id,
                None => return false,
            }
        };
        self.terminate_resource(slot_id).await
    }

    pub async fn list_resources(&self) -> Vec<ResourceDescriptor> {
        let reg = self.registry.lock().await;
        reg.slots
            .iter()
            .map(|(id, m)| ResourceDescriptor {
                slot_id: *id,
                active: m.is_active,
                last_used: m.last_used,
                session_id: m.session_id.clone(),
                timeout: m.lease_timeout,
            })
            .chain(reg.inactive.iter().map(|(id, last_used)| ResourceDescriptor {
                slot_id: *id,
                active: false,
                last_used: *last_used,
                session_id: None,
                timeout: 0,
            }))
            .collect()
    }

    pub async fn active_count(&self) -> usize {
        let reg = self.registry.lock().await;
        reg.slots.values().filter(|m| m.is_active).count()
    }

    pub async fn leased_count(&self) -> usize {
        let reg = self.registry.lock().await;
        reg.slots
            .values()
            .filter(|m| m.is_active && m.session_id.is_some())
            .count()
    }

    /// Top up or reap idle instances so that exactly `num_warm` of them sit
    /// idle, growing when under and reaping surplus idle slots when over.
    /// Leased instances are never touched either way.
    pub async fn maintain_warm_pool(&self) {
        loop {
            let deficit = {
                let mut reg = self.registry.lock().await;
                let idle = reg
                    .slots
                    .values()
                    .filter(|m| m.is_active && m.session_id.is_none())
                    .count() as u32;
                if idle >= self.config.num_warm {
                    return;
                }
                reg.reserve_slot(self.config.max_instances)
            };
            let Some(slot_id) = deficit else { return };
            match self.factory.create(slot_id).await {
                Ok(resource) => {
                    let mut reg = self.registry.lock().await;
                    reg.slots.insert(
                        slot_id,
                        ManagedResource {
                            resource,
                            last_used: Instant::now(),
                            session_id: None,
                            lease_timeout: self.config.default_lease_secs,
                            startup_attempts: 0,
                            is_active: true,
                        },
                    );
                    debug!(slot_id, "warm pool: instance ready");
                }
                Err(err) => {
                    let mut reg = self.registry.lock().await;
                    reg.free_slots.push_back(slot_id);
                    warn!(slot_id, error = %err, "warm pool: provisioning failed");
                    return;
                }
            }
        }
    }

    /// Reap idle instances beyond `num_warm`, one at a time so each
    /// `terminate_resource` call observes a freshly re-locked registry.
    /// Only ever reaps instances with no session — leased instances are
    /// immune regardless of how far over `num_warm` the pool has drifted.
    pub async fn shrink_warm_pool(&self) {
        loop {
            let surplus_slot = {
                let reg = self.registry.lock().await;
                let idle = reg
                    .slots
                    .iter()
                    .filter(|(_, m)| m.is_active && m.session_id.is_none())
                    .count() as u32;
                if idle <= self.config.num_warm {
                    return;
                }
                reg.slots
                    .iter()
                    .find(|(_, m)| m.is_active && m.session_id.is_none())
                    .map(|(id, _)| *id)
            };
            match surplus_slot {
                Some(slot_id) => {
                    debug!(slot_id, "warm pool: reaping surplus idle instance");
                    self.terminate_resource(slot_id).await;
                }
                None => return,
            }
        }
    }

    pub fn spawn_warm_pool_task(self: &Self) -> tokio::task::JoinHandle<()> {
        let pool = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(WARM_POOL_INTERVAL);
            loop {
                ticker.tick().await;
                pool.maintain_warm_pool().await;
                pool.shrink_warm_pool().await;
            }
        })
    }

    /// Sweep all active slots, relaunching any that have died, up to
    /// `max_startup_attempts` tries before giving up on a slot.
    pub async fn run_health_sweep(&self) {
        let dead_slots: Vec<u32> = {
            let reg = self.registry.lock().await;
            let mut dead = Vec::new();
            for (id, managed) in reg.slots.iter() {
                if !managed.is_active {
                    continue;
                }
                // snapshot only; the actual check happens outside the lock below
                dead.push(*id);
            }
            dead
        };

        for slot_id in dead_slots {
            let resource_ref = {
                let reg = self.registry.lock().await;
                reg.slots.get(&slot_id).map(|m| m.is_active)
            };
            if resource_ref != Some(true) {
                continue;
            }

            let signal = {
                let mut reg = self.registry.lock().await;
                match reg.slots.get_mut(&slot_id) {
                    Some(m) => self.factory.health_check(slot_id, &mut m.resource).await,
                    None => continue,
                }
            };

            if signal == HealthSignal::Alive {
                continue;
            }

            self.handle_dead_slot(slot_id).await;
        }
    }

    async fn handle_dead_slot(&self, slot_id: u32) {
        let attempts = {
            let reg = self.registry.lock().await;
            reg.slots.get(&slot_id).map(|m| m.startup_attempts)
        };
        let Some(attempts) = attempts else { return };

        if attempts >= self.config.max_startup_attempts {
            warn!(
                slot_id,
                attempts, "giving up on slot after repeated failures, deferring to replacement loop"
            );
            let old = {
                let mut reg = self.registry.lock().await;
                reg.cancel_timer(slot_id);
                reg.slots.remove(&slot_id)
            };
            if let Some(managed) = old {
                if let Some(sid) = managed.session_id {
                    let mut reg = self.registry.lock().await;
                    reg.sessions.remove(&sid);
                }
                self.factory.cleanup(slot_id, managed.resource).await;
            }
            // Not returned to `free_slots`: a dead shell with no resource
            // left behind it is the replacement loop's job to retry, not
            // the warm-pool loop's to silently reclaim for a fresh instance.
            let mut reg = self.registry.lock().await;
            reg.inactive.insert(slot_id, Instant::now());
            return;
        }

        info!(slot_id, attempts, "relaunching dead instance");
        match self.factory.create(slot_id).await {
            Ok(resource) => {
                let mut reg = self.registry.lock().await;
                reg.slots.insert(
                    slot_id,
                    ManagedResource {
                        resource,
                        last_used: Instant::now(),
                        session_id: None,
                        lease_timeout: self.config.default_lease_secs,
                        startup_attempts: 0,
                        is_active: true,
                    },
                );
            }
            Err(err) => {
                warn!(slot_id, error = %err, "relaunch attempt failed");
                let mut reg = self.registry.lock().await;
                if let Some(managed) = reg.slots.get_mut(&slot_id) {
                    managed.startup_attempts += 1;
                }
            }
        }
    }

    pub fn spawn_health_task(self: &Self) -> tokio::task::JoinHandle<()> {
        let pool = self.clone();
        let interval = self.config.health_check_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                pool.run_health_sweep().await;
            }
        })
    }

    /// Retry every slot the health loop gave up on, reinstating it as a
    /// fresh active instance on success and leaving it in place to retry
    /// again next tick on failure.
    pub async fn run_replacement_sweep(&self) {
        let pending: Vec<u32> = {
            let reg = self.registry.lock().await;
            reg.inactive.keys().copied().collect()
        };

        for slot_id in pending {
            match self.factory.create(slot_id).await {
                Ok(resource) => {
                    let mut reg = self.registry.lock().await;
                    reg.inactive.remove(&slot_id);
                    reg.slots.insert(
                        slot_id,
                        ManagedResource {
                            resource,
                            last_used: Instant::now(),
                            session_id: None,
                            lease_timeout: self.config.default_lease_secs,
                            startup_attempts: 0,
                            is_active: true,
                        },
                    );
                    info!(slot_id, "replacement loop: slot reinstated");
                }
                Err(err) => {
                    debug!(slot_id, error = %err, "replacement loop: still unable to recreate slot");
                }
            }
        }
    }

    pub fn spawn_replacement_task(self: &Self) -> tokio::task::JoinHandle<()> {
        let pool = self.clone();
        let interval = self.config.scale_down_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                pool.run_replacement_sweep().await;
            }
        })
    }
}

async fn timeout_fired<F: ResourceFactory>(
    registry: Arc<Mutex<Registry<F::Resource>>>,
    factory: Arc<F>,
    slot_id: u32,
    session_id: String,
) {
    let still_owns = {
        let reg = registry.lock().await;
        matches!(
            reg.slots.get(&slot_id),
            Some(m) if m.session_id.as_deref() == Some(session_id.as_str())
        )
    };
    if !still_owns {
        return;
    }

    let (resource, owned_session) = {
        let mut reg = registry.lock().await;
        match reg.slots.remove(&slot_id) {
            Some(managed) if managed.session_id.as_deref() == Some(session_id.as_str()) => {
                (managed.resource, managed.session_id)
            }
            Some(managed) => {
                reg.slots.insert(slot_id, managed);
                return;
            }
            None => return,
        }
    };
    {
        let mut reg = registry.lock().await;
        if let Some(sid) = &owned_session {
            reg.sessions.remove(sid);
        }
        reg.timers.remove(&slot_id);
    }
    debug!(slot_id, session_id, "lease expired, tearing down instance");
    factory.cleanup(slot_id, resource).await;
    let mut reg = registry.lock().await;
    reg.free_slots.push_back(slot_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct CountingFactory {
        created: AtomicU32,
        fail_slot: Option<u32>,
    }

    #[async_trait]
    impl ResourceFactory for CountingFactory {
        type Resource = u32;

        async fn create(&self, slot_id: u32) -> Result<u32, GatewayError> {
            if self.fail_slot == Some(slot_id) {
                return Err(GatewayError::LaunchFailed("simulated failure".into()));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(slot_id)
        }

        async fn cleanup(&self, _slot_id: u32, _resource: u32) {}

        async fn health_check(&self, _slot_id: u32, _resource: &mut u32) -> HealthSignal {
            HealthSignal::Alive
        }
    }

    /// Fails `create` for its first `fail_first` calls, then succeeds —
    /// models a transient `LaunchFailed` that recovers on retry.
    struct FlakyFactory {
        attempts: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl ResourceFactory for FlakyFactory {
        type Resource = u32;

        async fn create(&self, slot_id: u32) -> Result<u32, GatewayError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(GatewayError::LaunchFailed("simulated transient failure".into()));
            }
            Ok(slot_id)
        }

        async fn cleanup(&self, _slot_id: u32, _resource: u32) {}

        async fn health_check(&self, _slot_id: u32, _resource: &mut u32) -> HealthSignal {
            HealthSignal::Alive
        }
    }

    fn test_pool(max_instances: u32) -> ResourcePool<CountingFactory> {
        ResourcePool::new(
            CountingFactory {
                created: AtomicU32::new(0),
                fail_slot: None,
            },
            PoolConfig {
                max_instances,
                num_warm: 0,
                default_lease_secs: 30,
                max_startup_attempts: 3,
                health_check_interval: Duration::from_secs(60),
                scale_down_interval: Duration::from_secs(60),
            },
        )
    }

    #[tokio::test]
    async fn get_resource_assigns_a_session() {
        let pool = test_pool(2);
        let (slot_id, session_id) = pool.get_resource(5).await.unwrap();
        assert!(pool.validate_session(slot_id, &session_id).await);
    }

    #[tokio::test]
    async fn capacity_is_enforced() {
        let pool = test_pool(1);
        let _first = pool.get_resource(1).await.unwrap();
        let err = pool.get_resource(1).await.unwrap_err();
        assert!(matches!(err, GatewayError::AllOccupied));
    }

    #[tokio::test]
    async fn get_resource_does_not_propagate_a_failed_create_before_the_deadline() {
        // A slot whose factory.create always fails must not make
        // get_resource return LaunchFailed on the first failed attempt —
        // it should keep polling until the wait budget elapses and only
        // then surface a bounded-wait error.
        let pool = ResourcePool::new(
            CountingFactory {
                created: AtomicU32::new(0),
                fail_slot: Some(0),
            },
            PoolConfig {
                max_instances: 1,
                num_warm: 0,
                default_lease_secs: 30,
                max_startup_attempts: 3,
                health_check_interval: Duration::from_secs(60),
                scale_down_interval: Duration::from_secs(60),
            },
        );
        let err = pool.get_resource(1).await.unwrap_err();
        assert!(matches!(err, GatewayError::NoBrowserAvailable(_)));
    }

    #[tokio::test]
    async fn get_resource_recovers_from_a_transient_create_failure() {
        let pool = ResourcePool::new(
            FlakyFactory {
                attempts: AtomicU32::new(0),
                fail_first: 1,
            },
            PoolConfig {
                max_instances: 1,
                num_warm: 0,
                default_lease_secs: 30,
                max_startup_attempts: 3,
                health_check_interval: Duration::from_secs(60),
                scale_down_interval: Duration::from_secs(60),
            },
        );
        let (slot_id, session_id) = pool.get_resource(2).await.unwrap();
        assert!(pool.validate_session(slot_id, &session_id).await);
    }

    #[tokio::test]
    async fn terminate_frees_the_slot_for_reuse() {
        let pool = test_pool(1);
        let (slot_id, _session_id) = pool.get_resource(1).await.unwrap();
        assert!(pool.terminate_resource(slot_id).await);
        let second = pool.get_resource(1).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let pool = test_pool(1);
        let (slot_id, _session_id) = pool.get_resource(1).await.unwrap();
        assert!(pool.terminate_resource(slot_id).await);
        assert!(!pool.terminate_resource(slot_id).await);
    }

    #[tokio::test]
    async fn extend_timeout_requires_known_session() {
        let pool = test_pool(1);
        assert!(!pool.extend_timeout("no-such-session", 30).await);
        let (_slot_id, session_id) = pool.get_resource(1).await.unwrap();
        assert!(pool.extend_timeout(&session_id, 60).await);
    }

    #[tokio::test]
    async fn warm_pool_grows_to_meet_deficit() {
        let pool = ResourcePool::new(
            CountingFactory {
                created: AtomicU32::new(0),
                fail_slot: None,
            },
            PoolConfig {
                max_instances: 3,
                num_warm: 2,
                default_lease_secs: 30,
                max_startup_attempts: 3,
                health_check_interval: Duration::from_secs(60),
                scale_down_interval: Duration::from_secs(60),
            },
        );
        pool.maintain_warm_pool().await;
        assert_eq!(pool.active_count().await, 2);
        assert_eq!(pool.leased_count().await, 0);
    }

    #[tokio::test]
    async fn warm_pool_reaping_leaves_leased_instances_untouched() {
        let pool = test_pool(3);
        let _leases: Vec<_> = futures::future::join_all(
            (0..3).map(|_| pool.get_resource(30)),
        )
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
        // num_warm is 0, but none of the three instances are idle, so
        // reaping must not tear any of them down.
        pool.shrink_warm_pool().await;
        assert_eq!(pool.active_count().await, 3);
        assert_eq!(pool.leased_count().await, 3);
    }

    #[tokio::test]
    async fn lease_expiry_tears_down_and_frees_slot() {
        let pool = test_pool(1);
        let (_slot_id, _session_id) = pool.get_resource(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        // Lease of 1s has fired; the slot should be reusable again.
        let second = pool.get_resource(1).await;
        assert!(second.is_ok());
    }

    /// Reports dead on demand and can be flipped to let `create` succeed
    /// again — models a browser binary that comes back after an outage.
    struct ToggleFactory {
        create_fails: AtomicBool,
        report_dead: AtomicBool,
    }

    #[async_trait]
    impl ResourceFactory for ToggleFactory {
        type Resource = u32;

        async fn create(&self, slot_id: u32) -> Result<u32, GatewayError> {
            if self.create_fails.load(Ordering::SeqCst) {
                return Err(GatewayError::LaunchFailed("simulated outage".into()));
            }
            Ok(slot_id)
        }

        async fn cleanup(&self, _slot_id: u32, _resource: u32) {}

        async fn health_check(&self, _slot_id: u32, _resource: &mut u32) -> HealthSignal {
            if self.report_dead.load(Ordering::SeqCst) {
                HealthSignal::Dead
            } else {
                HealthSignal::Alive
            }
        }
    }

    #[tokio::test]
    async fn replacement_sweep_reinstates_a_slot_the_health_loop_gave_up_on() {
        let pool = ResourcePool::new(
            ToggleFactory {
                create_fails: AtomicBool::new(false),
                report_dead: AtomicBool::new(false),
            },
            PoolConfig {
                max_instances: 1,
                num_warm: 0,
                default_lease_secs: 30,
                max_startup_attempts: 2,
                health_check_interval: Duration::from_secs(60),
                scale_down_interval: Duration::from_secs(60),
            },
        );
        let (_slot_id, _session_id) = pool.get_resource(1).await.unwrap();
        assert_eq!(pool.active_count().await, 1);

        // Instance starts reporting dead and the binary can't relaunch —
        // every health sweep is one exhausted attempt.
        pool.factory.report_dead.store(true, Ordering::SeqCst);
        pool.factory.create_fails.store(true, Ordering::SeqCst);
        pool.run_health_sweep().await; // attempts 0 -> 1, relaunch fails
        pool.run_health_sweep().await; // attempts 1 -> 2, relaunch fails
        pool.run_health_sweep().await; // attempts >= max_startup_attempts, gives up

        assert_eq!(pool.active_count().await, 0);
        let inactive = pool.list_resources().await;
        assert!(inactive.iter().any(|d| !d.active));

        // The binary is back; the replacement loop, not the health loop,
        // is the one that notices.
        pool.factory.create_fails.store(false, Ordering::SeqCst);
        pool.run_replacement_sweep().await;

        assert_eq!(pool.active_count().await, 1);
        let resources = pool.list_resources().await;
        assert!(resources.iter().any(|d| d.active));
    }
}
