//! Configuration for the browser gateway, loaded entirely from the environment.
//!
//! There is no config file and no CLI surface (see Non-goals): every knob is
//! read once at startup via [`Config::from_env`] and then shared read-only
//! behind an `Arc` for the lifetime of the process.

use std::path::PathBuf;
use std::time::Duration;

/// All tunables the gateway needs, assembled once at startup.
///
/// # Examples
///
/// ```rust
/// use browser_gateway::Config;
///
/// // Pick up overrides from the environment, falling back to defaults.
/// let config = Config::from_env();
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory under which each browser instance gets its own profile subdirectory.
    pub profile_base_dir: PathBuf,

    /// First remote-debugging port handed out; instance `n` gets `debugging_port_start + n`.
    pub debugging_port_start: u16,

    /// Number of instances the warm-pool loop tries to keep ready at all times.
    pub num_warm: u32,

    /// Hard ceiling on simultaneously live browser instances.
    pub max_instances: u32,

    /// Default lease duration, in seconds, used when a caller does not supply one.
    pub idle_timeout: u64,

    /// How often the replacement loop retries slots the health loop gave up
    /// on after exhausting `max_startup_attempts`. The warm-pool loop has
    /// its own fixed 5s cadence and does not use this value.
    pub scale_down_interval: Duration,

    /// How many consecutive launch/health failures a slot tolerates before it is
    /// given up on until the next warm-pool pass.
    pub max_startup_attempts: u32,

    /// How often the health-check loop sweeps all active instances.
    pub health_check_interval: Duration,

    /// Bound on how long the gateway waits for an upstream probe or proxied
    /// connection attempt before giving up.
    pub proxy_connection_timeout: Duration,

    /// Address the HTTP gateway binds to.
    pub bind_addr: String,

    /// Path to the Chrome/Chromium executable. Auto-detected if `None`.
    pub chrome_executable: Option<String>,

    /// When true, any stale profile directory is removed before a fresh launch.
    /// Off by default: profile reuse across restarts is often desirable, and
    /// deleting on every launch hides real cleanup bugs instead of surfacing them.
    pub purge_profiles_on_launch: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile_base_dir: PathBuf::from("/tmp/browser-gateway-profiles"),
            debugging_port_start: 9222,
            num_warm: 2,
            max_instances: 10,
            idle_timeout: 300,
            scale_down_interval: Duration::from_secs(60),
            max_startup_attempts: 3,
            health_check_interval: Duration::from_secs(15),
            proxy_connection_timeout: Duration::from_secs(10),
            bind_addr: "0.0.0.0:8080".to_string(),
            chrome_executable: None,
            purge_profiles_on_launch: false,
        }
    }
}

impl Config {
    /// Build a [`Config`] from environment variables, falling back to
    /// [`Config::default`] for anything unset or unparseable.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use browser_gateway::Config;
    ///
    /// std::env::set_var("MAX_INSTANCES", "20");
    /// let config = Config::from_env();
    /// assert_eq!(config.max_instances, 20);
    /// ```
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            profile_base_dir: std::env::var("CHROMIUM_PROFILE_BASE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.profile_base_dir),
            debugging_port_start: env_parse("DEBUGGING_PORT_START", defaults.debugging_port_start),
            num_warm: env_parse("NUM_WARM", defaults.num_warm),
            max_instances: env_parse("MAX_INSTANCES", defaults.max_instances),
            idle_timeout: env_parse("IDLE_TIMEOUT", defaults.idle_timeout),
            scale_down_interval: Duration::from_secs(env_parse(
                "SCALE_DOWN_INTERVAL",
                defaults.scale_down_interval.as_secs(),
            )),
            max_startup_attempts: env_parse("MAX_STARTUP_ATTEMPTS", defaults.max_startup_attempts),
            health_check_interval: Duration::from_secs(env_parse(
                "HEALTH_CHECK_INTERVAL",
                defaults.health_check_interval.as_secs(),
            )),
            proxy_connection_timeout: Duration::from_secs(env_parse(
                "PROXY_CONNECTION_TIMEOUT",
                defaults.proxy_connection_timeout.as_secs(),
            )),
            bind_addr: std::env::var("GATEWAY_BIND_ADDR").unwrap_or(defaults.bind_addr),
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok(),
            purge_profiles_on_launch: std::env::var("PURGE_PROFILES_ON_LAUNCH")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"))
                .unwrap_or(defaults.purge_profiles_on_launch),
        }
    }

    pub fn validate(&self) -> Result<(), crate::error::GatewayError> {
        if self.max_instances == 0 {
            return Err(crate::error::GatewayError::Configuration(
                "MAX_INSTANCES must be greater than 0".to_string(),
            ));
        }
        if self.num_warm > self.max_instances {
            return Err(crate::error::GatewayError::Configuration(
                "NUM_WARM cannot exceed MAX_INSTANCES".to_string(),
            ));
        }
        if self.idle_timeout == 0 {
            return Err(crate::error::GatewayError::Configuration(
                "IDLE_TIMEOUT must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Path of the profile directory a given slot's instance should use.
    pub fn profile_path(&self, slot_id: u32) -> PathBuf {
        self.profile_base_dir.join(format!("profile-{slot_id}"))
    }

    /// Debugging port bound to a given slot. Stable for the slot's lifetime.
    pub fn port_for_slot(&self, slot_id: u32) -> u16 {
        self.debugging_port_start + slot_id as u16
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Chrome/Chromium flags applied to every launched instance.
///
/// This list is frozen: it is not configurable per-request, matching the
/// single fixed flag set every pooled instance is launched with.
pub const CHROMIUM_ARGS: &[&str] = &[
    "--start-maximized",
    "--disable-backgrounding-occluded-windows",
    "--disable-hang-monitor",
    "--metrics-recording-only",
    "--disable-sync",
    "--disable-background-timer-throttling",
    "--disable-prompt-on-repost",
    "--disable-background-networking",
    "--disable-infobars",
    "--remote-allow-origins=*",
    "--homepage=about:blank",
    "--no-service-autorun",
    "--disable-ipc-flooding-protection",
    "--disable-session-crashed-bubble",
    "--force-fieldtrials=*BackgroundTracing/default/",
    "--disable-breakpad",
    "--password-store=basic",
    "--disable-features=IsolateOrigins,site-per-process",
    "--disable-client-side-phishing-detection",
    "--use-mock-keychain",
    "--no-pings",
    "--disable-renderer-backgrounding",
    "--disable-component-update",
    "--disable-dev-shm-usage",
    "--disable-default-apps",
    "--disable-domain-reliability",
    "--no-default-browser-check",
    "--disable-history-quick-provider",
    "--disable-history-url-provider",
    "--disable-save-password-bubble",
    "--disable-single-click-autofill",
    "--disable-autofill-download-manager",
    "--disable-offer-store-unmasked-wallet-cards",
    "--disable-offer-upload-credit-cards",
    "--disable-extensions",
    "--disable-notifications",
    "--disable-geolocation",
    "--disable-media-source",
    "--disable-device-discovery-notifications",
    "--disable-component-extensions-with-background-pages",
    "--disable-backing-store",
    "--disable-features=OptimizationHints",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port_for_slot(0), config.debugging_port_start);
        assert_eq!(config.port_for_slot(3), config.debugging_port_start + 3);
    }

    #[test]
    fn rejects_zero_max_instances() {
        let mut config = Config::default();
        config.max_instances = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_warm_pool_larger_than_max() {
        let mut config = Config::default();
        config.num_warm = config.max_instances + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn profile_path_is_per_slot() {
        let config = Config::default();
        assert_ne!(config.profile_path(0), config.profile_path(1));
    }
}
