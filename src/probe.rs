//! Upstream probe: asks a running Chrome instance for its CDP WebSocket URL.
//!
//! Grounded on the original gateway's `get_chrome_ws_url`/`fetch_chrome_data`
//! pair — hit `/json/version` on the instance's debugging port and pull
//! `webSocketDebuggerUrl` out of the response.

use serde::Deserialize;
use std::time::Duration;

use crate::error::GatewayError;

#[derive(Debug, Deserialize)]
struct JsonVersion {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: Option<String>,
}

/// Fetch `/json/version` from a local Chrome instance and return its
/// `webSocketDebuggerUrl`, if advertised.
pub async fn fetch_debugger_url(port: u16, timeout: Duration) -> Result<String, GatewayError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(GatewayError::from)?;

    let url = format!("http://127.0.0.1:{port}/json/version");
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| GatewayError::UpstreamUnreachable(e.to_string()))?;

    if !response.status().is_success() {
        return Err(GatewayError::UpstreamUnreachable(format!(
            "upstream returned status {}",
            response.status()
        )));
    }

    let body: JsonVersion = response
        .json()
        .await
        .map_err(|e| GatewayError::UpstreamUnreachable(e.to_string()))?;

    body.web_socket_debugger_url.ok_or(GatewayError::NoDebuggerUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_version_without_debugger_url_deserializes() {
        let parsed: JsonVersion = serde_json::from_str(r#"{"Browser":"Chrome"}"#).unwrap();
        assert!(parsed.web_socket_debugger_url.is_none());
    }

    #[test]
    fn json_version_with_debugger_url_deserializes() {
        let parsed: JsonVersion =
            serde_json::from_str(r#"{"webSocketDebuggerUrl":"ws://127.0.0.1:9222/devtools/browser/abc"}"#)
                .unwrap();
        assert_eq!(
            parsed.web_socket_debugger_url.as_deref(),
            Some("ws://127.0.0.1:9222/devtools/browser/abc")
        );
    }
}
