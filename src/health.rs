//! Pool-occupancy health reporting for `GET /healthz`.
//!
//! Grounded on the teacher's `SystemHealthChecker`/`HealthLevel` shape, pared
//! down to what a pooled browser gateway can actually observe about itself:
//! how full the pool is and whether instances are failing to stay healthy.

use serde::Serialize;

use crate::browser_pool::BrowserPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthLevel,
    pub active_instances: usize,
    pub leased_instances: usize,
    pub max_instances: u32,
}

/// Build a snapshot health report from the pool's current occupancy.
///
/// `Critical` once the pool is completely saturated (every slot leased),
/// `Warning` past 80% occupancy, `Healthy` otherwise.
pub async fn report(pool: &BrowserPool) -> HealthReport {
    let active = pool.active_count().await;
    let leased = pool.leased_count().await;
    let max = pool.max_instances();

    let status = if max == 0 {
        HealthLevel::Critical
    } else if leased as u32 >= max {
        HealthLevel::Critical
    } else if (leased as f64) / (max as f64) > 0.8 {
        HealthLevel::Warning
    } else {
        HealthLevel::Healthy
    };

    HealthReport {
        status,
        active_instances: active,
        leased_instances: leased,
        max_instances: max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn empty_pool_is_healthy() {
        let pool = BrowserPool::new(Config::default());
        let report = report(&pool).await;
        assert_eq!(report.status, HealthLevel::Healthy);
        assert_eq!(report.active_instances, 0);
    }
}
