//! Shared test doubles: a scripted LLM backend and a counting tool provider.

use async_trait::async_trait;
use pixelforge_core::error::{ProviderError, ToolError};
use pixelforge_core::message::ToolRequest;
use pixelforge_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use pixelforge_core::tool::{ToolDescriptor, ToolProvider};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request it was given. Panics if more calls are made than
/// responses provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Tool names offered on call `index`, or `None` if no schema was sent.
    pub fn offered_tools(&self, index: usize) -> Option<Vec<String>> {
        self.requests.lock().unwrap()[index]
            .tools
            .as_ref()
            .map(|tools| tools.iter().map(|t| t.name.clone()).collect())
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let index = requests.len();

        if index >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{index}, have {})",
                responses.len()
            );
        }

        requests.push(request);
        Ok(responses[index].clone())
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        text_segments: vec![text.to_string()],
        tool_requests: vec![],
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Create a response that requests tool calls.
pub fn make_tool_response(calls: &[(&str, &str, Value)]) -> ProviderResponse {
    ProviderResponse {
        text_segments: vec![],
        tool_requests: calls
            .iter()
            .map(|(id, name, args)| ToolRequest::new(*id, *name, args.to_string()))
            .collect(),
        usage: None,
        model: "mock-model".into(),
    }
}

/// A tool provider with fixed tools that counts invocations per tool.
pub struct CountingToolProvider {
    name: String,
    tools: Vec<String>,
    result_len: Option<usize>,
    failing: Vec<String>,
    calls: Mutex<HashMap<String, usize>>,
    arguments: Mutex<Vec<(String, Value)>>,
}

impl CountingToolProvider {
    pub fn new(name: &str, tools: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            tools: tools.iter().map(|t| t.to_string()).collect(),
            result_len: None,
            failing: Vec::new(),
            calls: Mutex::new(HashMap::new()),
            arguments: Mutex::new(Vec::new()),
        }
    }

    /// Pad every result to `len` characters.
    pub fn with_result_len(mut self, len: usize) -> Self {
        self.result_len = Some(len);
        self
    }

    /// Make `tool` fail on every invocation.
    pub fn failing(mut self, tool: &str) -> Self {
        self.failing.push(tool.to_string());
        self
    }

    pub fn invocations(&self, tool: &str) -> usize {
        self.calls.lock().unwrap().get(tool).copied().unwrap_or(0)
    }

    pub fn total_invocations(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Arguments of every invocation, in order.
    pub fn arguments(&self) -> Vec<(String, Value)> {
        self.arguments.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolProvider for CountingToolProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn discover(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        Ok(self
            .tools
            .iter()
            .map(|t| ToolDescriptor {
                name: t.clone(),
                description: format!("{t} (test)"),
                input_schema: json!({
                    "type": "object",
                    "properties": {"url": {"type": "string"}},
                    "required": ["url"],
                }),
                provider: self.name.clone(),
            })
            .collect())
    }

    async fn invoke(&self, tool: &str, arguments: Value) -> Result<String, ToolError> {
        *self.calls.lock().unwrap().entry(tool.to_string()).or_insert(0) += 1;
        self.arguments.lock().unwrap().push((tool.to_string(), arguments));

        if self.failing.iter().any(|t| t == tool) {
            return Err(ToolError::ExecutionFailed {
                tool_name: tool.to_string(),
                reason: "upstream unavailable".into(),
            });
        }

        let base = format!("{tool} result from {}", self.name);
        Ok(match self.result_len {
            Some(len) => base.chars().chain(std::iter::repeat('x')).take(len).collect(),
            None => base,
        })
    }

    async fn close(&self) -> Result<(), ToolError> {
        Ok(())
    }
}
