//! # browser-gateway
//!
//! A pooled headless-browser gateway: manages a fleet of local Chromium
//! processes, each exposing a remote-debugging endpoint, and multiplexes
//! many external clients onto that fleet through a single HTTP + WebSocket
//! front door.
//!
//! A client `POST`s `/browser` and receives a session id and a proxy URL.
//! For the lifetime of that session, every request under `/session/{id}/...`
//! is transparently forwarded — as plain HTTP or as a full-duplex WebSocket —
//! to a private browser instance leased just for that session.
//!
//! ## Module map
//!
//! - [`config`] — environment-driven configuration, loaded once at startup.
//! - [`models`] — the concrete resource type the pool manages and the
//!   descriptor shapes handed back to callers.
//! - [`error`] — the error enum shared by the pool, the adapter, and the
//!   gateway, with its HTTP status-code mapping.
//! - [`launcher`] — spawns and tears down individual Chromium processes.
//! - [`pool`] — the generic lease-managed resource pool: slots, warm pool,
//!   health sweeps, and per-session timeout timers.
//! - [`browser_pool`] — binds the generic pool to Chromium via the launcher,
//!   and exposes the session-centric API the gateway talks to.
//! - [`probe`] — fetches a Chromium instance's CDP WebSocket debugger URL.
//! - [`gateway`] — the HTTP router: lease/release/extend/list, plus the
//!   session-scoped HTTP proxy.
//! - [`ws_proxy`] — the verbatim, bidirectional WebSocket proxy.
//! - [`health`] — pool-occupancy health reporting for `GET /healthz`.
//! - [`metrics`] — Prometheus counters and gauges for `GET /metrics`.

/// Configuration loaded from the environment.
pub mod config;

/// Shared data-model types for the pool and the browser adapter.
pub mod models;

/// Error types shared across the pool, the adapter, and the gateway.
pub mod error;

/// Spawns and tears down individual browser processes.
pub mod launcher;

/// Generic pooled-resource core: slots, leases, warm pool, health sweeps.
pub mod pool;

/// Browser-specific adapter binding the pool core to real Chromium processes.
pub mod browser_pool;

/// Fetches a browser instance's CDP WebSocket debugger URL.
pub mod probe;

/// HTTP + WebSocket front door.
pub mod gateway;

/// Verbatim, bidirectional WebSocket proxying between client and upstream.
pub mod ws_proxy;

/// Pool-occupancy health reporting.
pub mod health;

/// Prometheus metrics for the pool and gateway.
pub mod metrics;

#[cfg(test)]
mod tests;

pub use browser_pool::BrowserPool;
pub use config::Config;
pub use error::GatewayError;
pub use gateway::AppState;
