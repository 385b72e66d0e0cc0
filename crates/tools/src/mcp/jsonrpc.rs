//! JSON-RPC 2.0 message shapes and MCP payload helpers shared by transports.

use pixelforge_core::tool::ToolDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const PROTOCOL_VERSION: &str = "2025-03-26";

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JsonRpcNotification<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> JsonRpcNotification<'a> {
    pub fn new(method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl JsonRpcResponse {
    /// Parse `value` as the response to request `id`.
    ///
    /// Returns `None` for anything else: notifications, server-initiated
    /// requests, responses to other ids.
    pub fn matching(value: Value, id: u64) -> Option<Self> {
        let has_outcome = value.get("result").is_some() || value.get("error").is_some();
        if !has_outcome || value.get("id").and_then(Value::as_u64) != Some(id) {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    /// The `result` member, or the JSON-RPC error as a message.
    pub fn into_result(self) -> Result<Value, String> {
        if let Some(error) = self.error {
            return Err(format!("{} (code {})", error.message, error.code));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": "pixelforge",
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

/// Parse one `tools/list` page into descriptors owned by `provider`.
///
/// Returns the descriptors and the cursor for the next page, if any.
pub fn parse_tools_page(result: &Value, provider: &str) -> (Vec<ToolDescriptor>, Option<String>) {
    let tools = result["tools"]
        .as_array()
        .map(|tools| {
            tools
                .iter()
                .filter_map(|tool| {
                    let name = tool["name"].as_str()?;
                    let schema = match &tool["inputSchema"] {
                        Value::Object(_) => tool["inputSchema"].clone(),
                        _ => json!({ "type": "object", "properties": {} }),
                    };
                    Some(ToolDescriptor {
                        name: name.to_string(),
                        description: tool["description"].as_str().unwrap_or_default().to_string(),
                        input_schema: schema,
                        provider: provider.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let cursor = result["nextCursor"]
        .as_str()
        .filter(|c| !c.is_empty())
        .map(String::from);

    (tools, cursor)
}

/// Flatten a `tools/call` result to text.
///
/// Text content items are joined with newlines; a result without text items
/// is returned as pretty JSON. `isError: true` yields `Err` with the same text.
pub fn extract_call_result(result: &Value) -> Result<String, String> {
    let text = match result.get("content").and_then(Value::as_array) {
        Some(items) => {
            let texts: Vec<&str> = items
                .iter()
                .filter(|item| item["type"].as_str() == Some("text"))
                .filter_map(|item| item["text"].as_str())
                .collect();
            if texts.is_empty() {
                serde_json::to_string_pretty(result).unwrap_or_default()
            } else {
                texts.join("\n")
            }
        }
        None => serde_json::to_string_pretty(result).unwrap_or_default(),
    };

    if result["isError"].as_bool() == Some(true) {
        Err(text)
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_in_wire_order() {
        let req = JsonRpcRequest::new(7, "tools/list", Some(json!({})));
        let line = serde_json::to_string(&req).unwrap();
        assert_eq!(line, r#"{"jsonrpc":"2.0","id":7,"method":"tools/list","params":{}}"#);

        let note = serde_json::to_string(&JsonRpcNotification::new("notifications/initialized", None)).unwrap();
        assert!(!note.contains("\"id\""));
    }

    #[test]
    fn matching_skips_notifications_and_other_ids() {
        let note = json!({"jsonrpc": "2.0", "method": "notifications/progress", "params": {}});
        assert!(JsonRpcResponse::matching(note, 1).is_none());

        let other = json!({"jsonrpc": "2.0", "id": 2, "result": {}});
        assert!(JsonRpcResponse::matching(other, 1).is_none());

        let server_request = json!({"jsonrpc": "2.0", "id": 1, "method": "ping"});
        assert!(JsonRpcResponse::matching(server_request, 1).is_none());

        let ours = json!({"jsonrpc": "2.0", "id": 1, "result": {"ok": true}});
        let resp = JsonRpcResponse::matching(ours, 1).unwrap();
        assert_eq!(resp.into_result().unwrap()["ok"], true);
    }

    #[test]
    fn error_response_becomes_message() {
        let value = json!({"jsonrpc": "2.0", "id": 3, "error": {"code": -32601, "message": "Method not found"}});
        let err = JsonRpcResponse::matching(value, 3).unwrap().into_result().unwrap_err();
        assert!(err.contains("Method not found"));
        assert!(err.contains("-32601"));
    }

    #[test]
    fn tools_page_parses_descriptors_and_cursor() {
        let result = json!({
            "tools": [
                {
                    "name": "get_design_context",
                    "description": "Fetch design data",
                    "inputSchema": {"type": "object", "properties": {"url": {"type": "string"}}, "required": ["url"]}
                },
                { "name": "no_schema" },
                { "description": "nameless, dropped" }
            ],
            "nextCursor": "page-2"
        });
        let (tools, cursor) = parse_tools_page(&result, "figma");
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].provider, "figma");
        assert_eq!(tools[0].required_params(), vec!["url"]);
        assert_eq!(tools[1].input_schema["type"], "object");
        assert_eq!(cursor.as_deref(), Some("page-2"));
    }

    #[test]
    fn call_result_concatenates_text_items() {
        let result = json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "image", "data": "..."},
                {"type": "text", "text": "second"}
            ]
        });
        assert_eq!(extract_call_result(&result).unwrap(), "first\nsecond");
    }

    #[test]
    fn call_result_is_error_flag() {
        let result = json!({"content": [{"type": "text", "text": "node not found"}], "isError": true});
        assert_eq!(extract_call_result(&result).unwrap_err(), "node not found");
    }

    #[test]
    fn call_result_without_text_is_json() {
        let result = json!({"structuredContent": {"a": 1}});
        assert!(extract_call_result(&result).unwrap().contains("structuredContent"));
    }
}
