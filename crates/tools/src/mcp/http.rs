//! HTTP transport: JSON-RPC over POST, answered with JSON or an SSE stream.

use super::jsonrpc::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use super::RpcTransport;
use async_trait::async_trait;
use pixelforge_core::error::ToolError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const SESSION_HEADER: &str = "mcp-session-id";
const ACCEPT_BOTH: &str = "application/json, text/event-stream";

pub struct HttpTransport {
    provider: String,
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    session_id: RwLock<Option<String>>,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(
        provider: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, ToolError> {
        let config_error = |reason: String| ToolError::ConnectionFailed {
            provider: provider.to_string(),
            reason,
        };

        let mut header_map = HeaderMap::new();
        for (key, value) in headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| config_error(format!("invalid header name '{key}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| config_error(format!("invalid value for header '{key}': {e}")))?;
            header_map.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| config_error(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            provider: provider.to_string(),
            client,
            url: url.to_string(),
            headers: header_map,
            session_id: RwLock::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    fn protocol_error(&self, reason: impl Into<String>) -> ToolError {
        ToolError::Protocol {
            provider: self.provider.clone(),
            reason: reason.into(),
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, body: &T) -> Result<reqwest::Response, ToolError> {
        let mut request = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .header(ACCEPT, ACCEPT_BOTH)
            .json(body);

        if let Some(session) = self.session_id.read().await.as_deref() {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                ToolError::ConnectionFailed {
                    provider: self.provider.clone(),
                    reason: e.to_string(),
                }
            } else if e.is_timeout() {
                self.protocol_error(format!("request timed out: {e}"))
            } else {
                self.protocol_error(format!("request failed: {e}"))
            }
        })?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut current = self.session_id.write().await;
            if current.as_deref() != Some(session) {
                debug!(provider = %self.provider, "Captured MCP session id");
                *current = Some(session.to_string());
            }
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.protocol_error(format!("HTTP {status}: {body}")));
        }

        Ok(response)
    }
}

/// Collect the JSON payloads of an SSE body (`data:` lines, events
/// separated by blank lines).
pub fn parse_sse_messages(body: &str) -> Vec<Value> {
    let mut messages = Vec::new();
    let mut data = String::new();

    let mut flush = |data: &mut String| {
        if !data.is_empty() {
            if let Ok(value) = serde_json::from_str::<Value>(data) {
                messages.push(value);
            }
            data.clear();
        }
    };

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            flush(&mut data);
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    flush(&mut data);
    messages
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ToolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = self.post(&JsonRpcRequest::new(id, method, params)).await?;

        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let body = response
            .text()
            .await
            .map_err(|e| self.protocol_error(format!("failed to read body: {e}")))?;

        let candidates = if is_sse {
            parse_sse_messages(&body)
        } else {
            let value: Value = serde_json::from_str(&body)
                .map_err(|e| self.protocol_error(format!("invalid JSON response: {e}")))?;
            match value {
                // Batched responses
                Value::Array(items) => items,
                single => vec![single],
            }
        };

        let response = candidates
            .into_iter()
            .find_map(|value| JsonRpcResponse::matching(value, id))
            .ok_or_else(|| self.protocol_error(format!("no response to '{method}'")))?;

        response
            .into_result()
            .map_err(|reason| self.protocol_error(format!("'{method}' failed: {reason}")))
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ToolError> {
        self.post(&JsonRpcNotification::new(method, params)).await?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ToolError> {
        let Some(session) = self.session_id.write().await.take() else {
            return Ok(());
        };

        // Best effort; servers may not support explicit termination
        let result = self
            .client
            .delete(&self.url)
            .headers(self.headers.clone())
            .header(SESSION_HEADER, session)
            .send()
            .await;
        if let Err(e) = result {
            warn!(provider = %self.provider, error = %e, "Session termination failed");
        }
        Ok(())
    }
}
