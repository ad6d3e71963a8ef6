//! Browser-specific adapter binding the generic [`crate::pool::ResourcePool`]
//! to real Chrome processes via [`crate::launcher::ProcessLauncher`].
//!
//! This is the module external callers actually talk to: it speaks in
//! browser/port/session vocabulary and hides the generic slot machinery
//! underneath.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::GatewayError;
use crate::launcher::ProcessLauncher;
use crate::models::{BrowserDescriptor, BrowserProcess, HealthSignal};
use crate::pool::{PoolConfig, ResourceFactory, ResourcePool};

struct BrowserFactory {
    launcher: Arc<ProcessLauncher>,
}

#[async_trait]
impl ResourceFactory for BrowserFactory {
    type Resource = BrowserProcess;

    async fn create(&self, slot_id: u32) -> Result<BrowserProcess, GatewayError> {
        let result = self.launcher.launch(slot_id).await;
        crate::metrics::record_launch(result.is_ok());
        result
    }

    async fn cleanup(&self, _slot_id: u32, resource: BrowserProcess) {
        self.launcher.teardown(resource).await;
    }

    async fn health_check(&self, _slot_id: u32, resource: &mut BrowserProcess) -> HealthSignal {
        match resource.child.try_wait() {
            Ok(Some(_status)) => HealthSignal::Dead,
            Ok(None) => HealthSignal::Alive,
            Err(_) => HealthSignal::Dead,
        }
    }
}

/// Pool of Chrome instances, each reachable at `127.0.0.1:<debugging_port>`.
#[derive(Clone)]
pub struct BrowserPool {
    inner: ResourcePool<BrowserFactory>,
    config: Config,
}

impl BrowserPool {
    pub fn new(config: Config) -> Self {
        let launcher = Arc::new(ProcessLauncher::new(config.clone()));
        let inner = ResourcePool::new(
            BrowserFactory { launcher },
            PoolConfig {
                max_instances: config.max_instances,
                num_warm: config.num_warm,
                default_lease_secs: config.idle_timeout,
                max_startup_attempts: config.max_startup_attempts,
                health_check_interval: config.health_check_interval,
                scale_down_interval: config.scale_down_interval,
            },
        );
        Self { inner, config }
    }

    /// Assign a browser instance to a brand new session.
    ///
    /// Returns the session id and the debugging port the session is bound to.
    pub async fn allocate(&self, lease_secs: Option<u64>) -> Result<(String, u16), GatewayError> {
        let lease = lease_secs.unwrap_or(self.config.idle_timeout);
        let (slot_id, session_id) = self.inner.get_resource(lease).await?;
        Ok((session_id, self.config.port_for_slot(slot_id)))
    }

    pub async fn deallocate(&self, session_id: &str) -> bool {
        self.inner.terminate_by_session(session_id).await
    }

    pub async fn extend_timeout(&self, session_id: &str, lease_secs: Option<u64>) -> bool {
        let lease = lease_secs.unwrap_or(self.config.idle_timeout);
        self.inner.extend_timeout(session_id, lease).await
    }

    /// Refresh a session's lease back to its own configured duration, used
    /// after a proxied WebSocket connection for that session closes.
    pub async fn refresh_lease(&self, session_id: &str) -> bool {
        self.inner.refresh_lease(session_id).await
    }

    pub async fn port_for_session(&self, session_id: &str) -> Option<u16> {
        let slot_id = self.inner.slot_for_session(session_id).await?;
        Some(self.config.port_for_slot(slot_id))
    }

    pub async fn validate_session(&self, session_id: &str) -> bool {
        match self.inner.slot_for_session(session_id).await {
            Some(slot_id) => self.inner.validate_session(slot_id, session_id).await,
            None => false,
        }
    }

    pub async fn list_browsers(&self) -> Vec<BrowserDescriptor> {
        self.inner
            .list_resources()
            .await
            .into_iter()
            .map(|d| BrowserDescriptor {
                debugging_port: self.config.port_for_slot(d.slot_id),
                active: d.active,
                last_used_secs_ago: d.last_used.elapsed().as_secs_f64(),
                session_id: d.session_id,
                timeout: d.timeout,
            })
            .collect()
    }

    pub async fn active_count(&self) -> usize {
        self.inner.active_count().await
    }

    pub async fn leased_count(&self) -> usize {
        self.inner.leased_count().await
    }

    pub fn max_instances(&self) -> u32 {
        self.config.max_instances
    }

    /// Spawn the background warm-pool, health-check, replacement, and
    /// metrics-observer loops. Returns every join handle so the caller can
    /// hold onto them for shutdown.
    pub fn spawn_background_tasks(
        &self,
    ) -> (
        tokio::task::JoinHandle<()>,
        tokio::task::JoinHandle<()>,
        tokio::task::JoinHandle<()>,
        tokio::task::JoinHandle<()>,
    ) {
        (
            self.inner.spawn_warm_pool_task(),
            self.inner.spawn_health_task(),
            self.inner.spawn_replacement_task(),
            crate::metrics::spawn_observer(self.clone(), self.config.health_check_interval),
        )
    }

    /// Bounded wait used by the gateway before declaring an upstream
    /// connection attempt failed.
    pub fn connection_timeout(&self) -> Duration {
        self.config.proxy_connection_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_derivation_matches_config() {
        let config = Config::default();
        let pool = BrowserPool::new(config.clone());
        assert_eq!(pool.max_instances(), config.max_instances);
    }
}
