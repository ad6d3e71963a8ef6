//! Shared data-model types for the pool core and the browser adapter.
//!
//! The pool core (see [`crate::pool`]) is generic over a resource type; this
//! module defines the concrete resource the browser adapter plugs in, plus
//! the descriptor shapes exposed to callers of `list_resources`.

use serde::Serialize;
use std::time::Instant;
use tokio::process::Child;

/// A live browser process bound to one debugging port and one profile directory.
///
/// This is the "payload" half of a pooled resource; the bookkeeping half
/// (session id, lease timer, `last_used`, `startup_attempts`, `is_active`) is
/// owned by the generic pool core in [`crate::pool::ManagedResource`].
pub struct BrowserProcess {
    pub debugging_port: u16,
    pub profile_path: std::path::PathBuf,
    pub child: Child,
}

impl std::fmt::Debug for BrowserProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserProcess")
            .field("debugging_port", &self.debugging_port)
            .field("profile_path", &self.profile_path)
            .finish()
    }
}

/// Outcome of a single `health_check` pass over one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthSignal {
    /// The process is still running.
    Alive,
    /// The process has exited and should be relaunched if attempts remain.
    Dead,
}

/// One row of `GET /browsers`, matching the external JSON contract in §6.
#[derive(Debug, Clone, Serialize)]
pub struct BrowserDescriptor {
    pub debugging_port: u16,
    pub active: bool,
    #[serde(rename = "last_used")]
    pub last_used_secs_ago: f64,
    pub session_id: Option<String>,
    pub timeout: u64,
}

/// Internal slot listing used by [`crate::pool::ResourcePool::list_resources`],
/// independent of the browser-specific renaming the gateway applies.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    pub slot_id: u32,
    pub active: bool,
    pub last_used: Instant,
    pub session_id: Option<String>,
    pub timeout: u64,
}
