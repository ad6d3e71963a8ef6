//! Process launcher: turns a slot id into a running Chrome process.
//!
//! Grounded on the pre-launch/teardown shape of a browser pool's instance
//! lifecycle, adapted here to spawn a real OS process rather than drive one
//! through a managed CDP client — the gateway proxies raw CDP frames, so it
//! has no need of a CDP-aware launch library.
//!
//! The launcher only confirms the process hasn't died within the startup
//! probe window; it never polls the debugging port itself. Readiness of
//! that port is confirmed lazily by the first HTTP probe a caller makes
//! against it (the upstream probe, or the health loop). Giving the launcher
//! a second synchronization surface to wait on the port buys nothing here.

use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::{Config, CHROMIUM_ARGS};
use crate::error::GatewayError;
use crate::models::BrowserProcess;

/// How long to wait after spawning before checking whether the process is
/// still alive. The process is never probed for debugging-port readiness.
const STARTUP_PROBE_INTERVAL: Duration = Duration::from_secs(2);

/// Upper bound on how much of a dead process's stderr gets folded into the
/// error message.
const STDERR_TAIL_BYTES: usize = 4096;

/// Directory Chromium stores its singleton lock files in, distinct from the
/// per-slot `--user-data-dir` profiles. Not configurable upstream either —
/// Chromium's own XDG layout decides it.
const CHROMIUM_LOCK_DIR: &str = "/config/xdg/config/chromium";

/// Lock files a crashed Chromium instance can leave behind, blocking the
/// next one from opening the same profile.
const CHROMIUM_LOCK_FILES: &[&str] = &["SingletonCookie", "SingletonLock", "SingletonSocket"];

pub struct ProcessLauncher {
    config: Config,
}

impl ProcessLauncher {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Launch a Chrome instance for `slot_id` and confirm it hasn't died
    /// within the startup probe window, or give up and tear down the
    /// half-started process.
    pub async fn launch(&self, slot_id: u32) -> Result<BrowserProcess, GatewayError> {
        let port = self.config.port_for_slot(slot_id);
        let profile_path = self.config.profile_path(slot_id);

        if self.config.purge_profiles_on_launch {
            if self.config.profile_base_dir.exists() {
                tokio::fs::remove_dir_all(&self.config.profile_base_dir).await.ok();
            }
            self.unlock_chromium_profile().await;
        }
        tokio::fs::create_dir_all(&profile_path).await?;

        let executable = self
            .config
            .chrome_executable
            .clone()
            .unwrap_or_else(|| "chromium".to_string());

        let mut command = Command::new(&executable);
        command
            .args(CHROMIUM_ARGS)
            .arg(format!("--remote-debugging-port={port}"))
            .arg(format!("--user-data-dir={}", profile_path.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(slot_id, port, executable, "launching browser process");
        let mut child = command
            .spawn()
            .map_err(|e| GatewayError::LaunchFailed(e.to_string()))?;

        tokio::time::sleep(STARTUP_PROBE_INTERVAL).await;

        match child.try_wait() {
            Ok(Some(status)) => {
                let stderr = read_stderr_tail(&mut child).await;
                tokio::fs::remove_dir_all(&profile_path).await.ok();
                warn!(slot_id, port, %status, "process exited during startup probe");
                return Err(GatewayError::LaunchFailed(format!(
                    "port {port} exited with {status} during startup: {stderr}"
                )));
            }
            Ok(None) => {}
            Err(err) => {
                tokio::fs::remove_dir_all(&profile_path).await.ok();
                return Err(GatewayError::LaunchFailed(err.to_string()));
            }
        }

        info!(slot_id, port, "browser instance ready");
        Ok(BrowserProcess {
            debugging_port: port,
            profile_path,
            child,
        })
    }

    /// Gracefully terminate a process, escalating to a hard kill if it
    /// doesn't exit within the grace period, then remove its profile directory.
    pub async fn teardown(&self, mut process: BrowserProcess) {
        let port = process.debugging_port;
        if let Some(id) = process.child.id() {
            unsafe {
                libc::kill(id as i32, libc::SIGTERM);
            }
        }
        let graceful = tokio::time::timeout(Duration::from_secs(5), process.child.wait()).await;
        if graceful.is_err() {
            warn!(port, "process did not exit within grace period, force killing");
            let _ = process.child.start_kill();
            let _ = process.child.wait().await;
        }
        if let Err(err) = tokio::fs::remove_dir_all(&process.profile_path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(port, error = %err, "failed to remove profile directory");
            }
        }
    }

    /// Remove stale Chromium singleton lock files left behind in the shared
    /// profile-lock directory by a process that didn't exit cleanly.
    async fn unlock_chromium_profile(&self) {
        let lock_dir = std::path::Path::new(CHROMIUM_LOCK_DIR);
        if !tokio::fs::try_exists(lock_dir).await.unwrap_or(false) {
            return;
        }
        for name in CHROMIUM_LOCK_FILES {
            let path = lock_dir.join(name);
            if tokio::fs::remove_file(&path).await.is_ok() {
                debug!(path = %path.display(), "removed stale chromium lock file");
            }
        }
    }
}

/// Best-effort capture of a dead process's stderr tail, for `LaunchFailed`.
async fn read_stderr_tail(child: &mut tokio::process::Child) -> String {
    let Some(stderr) = child.stderr.as_mut() else {
        return String::new();
    };
    let mut buf = Vec::with_capacity(STDERR_TAIL_BYTES);
    let mut chunk = [0u8; 512];
    loop {
        match tokio::time::timeout(Duration::from_millis(100), stderr.read(&mut chunk)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.len() >= STDERR_TAIL_BYTES {
                    break;
                }
            }
            Ok(Err(_)) => break,
        }
    }
    buf.truncate(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&buf).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_and_port_derive_from_slot() {
        let config = Config::default();
        let launcher = ProcessLauncher::new(config.clone());
        assert_eq!(launcher.config.port_for_slot(2), config.debugging_port_start + 2);
    }
}
