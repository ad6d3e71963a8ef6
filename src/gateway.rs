//! HTTP + WebSocket front door: allocates sessions, lists the pool, and
//! proxies both protocols under `/session/{id}/...`.
//!
//! Grounded on the original gateway's catch-all `handle_request` dispatch —
//! expressed here as an axum [`Router`] with one handler per route instead
//! of one big path-matching function.

use axum::body::{Body, Bytes};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::browser_pool::BrowserPool;
use crate::error::GatewayError;
use crate::health;
use crate::ws_proxy;

#[derive(Clone)]
pub struct AppState {
    pub pool: BrowserPool,
    pub public_host: String,
    pub http: reqwest::Client,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(pool: BrowserPool, public_host: String) -> Self {
        Self {
            pool,
            public_host,
            http: reqwest::Client::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/browser", post(allocate))
        .route("/browser/:session_id", delete(deallocate))
        .route("/browser/:session_id/timeout", post(extend))
        .route("/browsers", get(list_browsers))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_endpoint))
        .route("/session/:session_id/*tail", any(session_proxy))
        .route("/session/:session_id", any(session_proxy_root))
        .with_state(Arc::new(state))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[derive(Deserialize, Default)]
struct TimeoutQuery {
    timeout: Option<String>,
}

fn parse_timeout(raw: &Option<String>) -> Result<Option<u64>, Response> {
    match raw {
        None => Ok(None),
        Some(s) => match s.parse::<u64>() {
            Ok(v) => Ok(Some(v)),
            Err(_) => Err((
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "timeout must be a non-negative integer" })),
            )
                .into_response()),
        },
    }
}

#[derive(Serialize)]
struct AllocateResponse {
    session_id: String,
    proxy_url: String,
}

async fn allocate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimeoutQuery>,
) -> Response {
    let lease = match parse_timeout(&query.timeout) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match state.pool.allocate(lease).await {
        Ok((session_id, _port)) => {
            crate::metrics::record_lease(true);
            let proxy_url = format!("http://{}/session/{}", state.public_host, session_id);
            Json(AllocateResponse {
                session_id,
                proxy_url,
            })
            .into_response()
        }
        Err(GatewayError::AllOccupied) => {
            crate::metrics::record_lease(false);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": "All browsers are currently in use" })),
            )
                .into_response()
        }
        Err(err) => {
            crate::metrics::record_lease(false);
            warn!(error = %err, "allocate failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": "No browser available" })),
            )
                .into_response()
        }
    }
}

async fn deallocate(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    if state.pool.deallocate(&session_id).await {
        (StatusCode::OK, Json(serde_json::json!({ "status": "Browser deallocated" })))
            .into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Session not found" })),
        )
            .into_response()
    }
}

async fn extend(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<TimeoutQuery>,
) -> Response {
    let lease = match parse_timeout(&query.timeout) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if state.pool.extend_timeout(&session_id, lease).await {
        (StatusCode::OK, Json(serde_json::json!({ "status": "Timeout extended" }))).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Session not found" })),
        )
            .into_response()
    }
}

async fn list_browsers(State(state): State<Arc<AppState>>) -> Response {
    Json(state.pool.list_browsers().await).into_response()
}

async fn healthz(State(state): State<Arc<AppState>>) -> Response {
    Json(health::report(&state.pool).await).into_response()
}

async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn session_proxy_root(
    state: State<Arc<AppState>>,
    path: Path<String>,
    headers: HeaderMap,
    req: Request,
) -> Response {
    session_proxy(state, Path((path.0, String::new())), headers, req).await
}

/// Looks up the session, then either upgrades to a WebSocket proxy or
/// forwards the request as plain HTTP to the instance's debugging port.
async fn session_proxy(
    State(state): State<Arc<AppState>>,
    Path((session_id, tail)): Path<(String, String)>,
    headers: HeaderMap,
    req: Request,
) -> Response {
    let Some(port) = state.pool.port_for_session(&session_id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Session not found" })),
        )
            .into_response();
    };
    if !state.pool.validate_session(&session_id).await {
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "error": "Session is no longer valid" })),
        )
            .into_response();
    }

    let (mut parts, body) = req.into_parts();
    match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(ws) => {
            let pool = state.pool.clone();
            ws.on_upgrade(move |socket| ws_proxy::serve(socket, session_id, pool))
        }
        Err(_) => {
            let req = Request::from_parts(parts, body);
            forward_http(&state, &session_id, port, &tail, headers, req).await
        }
    }
}

async fn forward_http(
    state: &AppState,
    session_id: &str,
    port: u16,
    tail: &str,
    headers: HeaderMap,
    req: Request,
) -> Response {
    let query = req.uri().query().map(|q| format!("?{q}")).unwrap_or_default();
    let method = req.method().clone();
    let url = format!("http://127.0.0.1:{port}/{tail}{query}");

    let body_bytes = match axum::body::to_bytes(req.into_body(), usize::MAX).await {
        Ok(b) => b,
        Err(err) => {
            warn!(error = %err, "failed to buffer request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let mut builder = state.http.request(
        reqwest::Method::from_bytes(method.as_str().as_bytes()).unwrap_or(reqwest::Method::GET),
        &url,
    );
    for (name, value) in headers.iter() {
        if name == axum::http::header::HOST {
            continue;
        }
        if let Ok(v) = value.to_str() {
            builder = builder.header(name.as_str(), v);
        }
    }
    builder = builder.body(Bytes::from(body_bytes.to_vec()));

    let timeout = state.pool.connection_timeout();
    let resp = tokio::time::timeout(timeout, builder.send()).await;

    match resp {
        Ok(Ok(upstream)) if upstream.status().is_success() => {
            state.pool.refresh_lease(session_id).await;
            let status = upstream.status();
            let bytes = upstream.bytes().await.unwrap_or_default();
            (
                StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::OK),
                Body::from(bytes),
            )
                .into_response()
        }
        Ok(Ok(upstream)) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({
                "error": format!("upstream returned {}", upstream.status())
            })),
        )
            .into_response(),
        Ok(Err(err)) => {
            warn!(error = %err, "upstream forward failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": "upstream unreachable" })),
            )
                .into_response()
        }
        Err(_) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "error": "upstream timed out" })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_query_parses_integers() {
        assert_eq!(parse_timeout(&Some("30".to_string())).unwrap(), Some(30));
    }

    #[test]
    fn timeout_query_rejects_garbage() {
        assert!(parse_timeout(&Some("soon".to_string())).is_err());
    }

    #[test]
    fn timeout_query_allows_absence() {
        assert_eq!(parse_timeout(&None).unwrap(), None);
    }
}
