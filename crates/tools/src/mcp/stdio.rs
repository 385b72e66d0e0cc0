//! Stdio transport: a child process exchanging newline-delimited JSON-RPC.

use super::jsonrpc::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use super::RpcTransport;
use async_trait::async_trait;
use pixelforge_core::error::ToolError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

struct Pipes {
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
}

pub struct StdioTransport {
    provider: String,
    pipes: Mutex<Pipes>,
    child: Mutex<Child>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl StdioTransport {
    /// Spawn the provider process.
    pub fn spawn(
        provider: &str,
        command: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> Result<Self, ToolError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| ToolError::ConnectionFailed {
            provider: provider.to_string(),
            reason: format!("failed to start '{command}': {e}"),
        })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(ToolError::ConnectionFailed {
                provider: provider.to_string(),
                reason: "child process has no stdio pipes".into(),
            });
        };

        debug!(provider, command, "Spawned stdio tool provider");

        Ok(Self {
            provider: provider.to_string(),
            pipes: Mutex::new(Pipes {
                stdin: Some(stdin),
                stdout: BufReader::new(stdout).lines(),
            }),
            child: Mutex::new(child),
            next_id: AtomicU64::new(1),
            timeout,
        })
    }

    fn protocol_error(&self, reason: impl Into<String>) -> ToolError {
        ToolError::Protocol {
            provider: self.provider.clone(),
            reason: reason.into(),
        }
    }

    async fn write_line(&self, pipes: &mut Pipes, line: String) -> Result<(), ToolError> {
        let stdin = pipes
            .stdin
            .as_mut()
            .ok_or_else(|| self.protocol_error("transport closed"))?;

        let mut payload = line.into_bytes();
        payload.push(b'\n');
        stdin
            .write_all(&payload)
            .await
            .map_err(|e| self.protocol_error(format!("write failed: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| self.protocol_error(format!("flush failed: {e}")))
    }

    async fn read_response(&self, pipes: &mut Pipes, id: u64) -> Result<JsonRpcResponse, ToolError> {
        loop {
            let line = pipes
                .stdout
                .next_line()
                .await
                .map_err(|e| self.protocol_error(format!("read failed: {e}")))?
                .ok_or_else(|| self.protocol_error("provider closed its output"))?;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
                trace!(provider = %self.provider, line = trimmed, "Skipping non-JSON output");
                continue;
            };

            match JsonRpcResponse::matching(value, id) {
                Some(response) => return Ok(response),
                None => trace!(provider = %self.provider, "Skipping unrelated message"),
            }
        }
    }
}

#[async_trait]
impl RpcTransport for StdioTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ToolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = serde_json::to_string(&JsonRpcRequest::new(id, method, params))
            .map_err(|e| self.protocol_error(e.to_string()))?;

        // One request in flight per process
        let mut pipes = self.pipes.lock().await;
        self.write_line(&mut pipes, line).await?;

        let response = tokio::time::timeout(self.timeout, self.read_response(&mut pipes, id))
            .await
            .map_err(|_| {
                self.protocol_error(format!("'{method}' timed out after {}s", self.timeout.as_secs()))
            })??;

        response
            .into_result()
            .map_err(|reason| self.protocol_error(format!("'{method}' failed: {reason}")))
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ToolError> {
        let line = serde_json::to_string(&JsonRpcNotification::new(method, params))
            .map_err(|e| self.protocol_error(e.to_string()))?;
        let mut pipes = self.pipes.lock().await;
        self.write_line(&mut pipes, line).await
    }

    async fn shutdown(&self) -> Result<(), ToolError> {
        // Closing stdin lets well-behaved servers exit on their own
        self.pipes.lock().await.stdin.take();

        let mut child = self.child.lock().await;
        if let Ok(Some(_)) = child.try_wait() {
            return Ok(());
        }
        if let Err(e) = child.kill().await {
            warn!(provider = %self.provider, error = %e, "Failed to kill tool provider");
            return Err(self.protocol_error(format!("kill failed: {e}")));
        }
        debug!(provider = %self.provider, "Stdio tool provider stopped");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::mcp::McpToolProvider;
    use pixelforge_core::tool::ToolProvider;
    use serde_json::json;

    /// A minimal MCP server in POSIX shell.
    const FAKE_SERVER: &str = r##"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  case "$line" in
    *'"method":"initialize"'*)
      printf '%s\n' "{\"jsonrpc\":\"2.0\",\"id\":$id,\"result\":{\"protocolVersion\":\"2025-03-26\",\"capabilities\":{\"tools\":{}},\"serverInfo\":{\"name\":\"fake\",\"version\":\"0\"}}}"
      ;;
    *'"method":"tools/list"'*)
      printf '%s\n' '{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info"}}'
      printf '%s\n' "{\"jsonrpc\":\"2.0\",\"id\":$id,\"result\":{\"tools\":[{\"name\":\"get_design_context\",\"description\":\"Design data\",\"inputSchema\":{\"type\":\"object\",\"properties\":{\"url\":{\"type\":\"string\"}},\"required\":[\"url\"]}}]}}"
      ;;
    *'"method":"tools/call"'*)
      printf '%s\n' "{\"jsonrpc\":\"2.0\",\"id\":$id,\"result\":{\"content\":[{\"type\":\"text\",\"text\":\"frame 1\"},{\"type\":\"text\",\"text\":\"frame 2\"}]}}"
      ;;
  esac
done
"##;

    fn spawn_fake() -> StdioTransport {
        StdioTransport::spawn(
            "fake",
            "sh",
            &["-c".to_string(), FAKE_SERVER.to_string()],
            &BTreeMap::new(),
            None,
            Duration::from_secs(10),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn handshake_discover_invoke_close() {
        let provider = McpToolProvider::new("fake", Box::new(spawn_fake()));
        provider.initialize().await.unwrap();

        let tools = provider.discover().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "get_design_context");
        assert_eq!(tools[0].provider, "fake");

        let text = provider
            .invoke("get_design_context", json!({"url": "https://design.example/f/1"}))
            .await
            .unwrap();
        assert_eq!(text, "frame 1\nframe 2");

        provider.close().await.unwrap();
        assert!(provider.invoke("get_design_context", json!({})).await.is_err());
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        let transport = StdioTransport::spawn(
            "silent",
            "sh",
            &["-c".to_string(), "while read -r line; do :; done".to_string()],
            &BTreeMap::new(),
            None,
            Duration::from_millis(200),
        )
        .unwrap();

        let err = transport.request("tools/list", None).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        transport.shutdown().await.unwrap();
    }
}
