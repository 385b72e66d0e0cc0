//! Duplicate-call detection and tool blocking.
//!
//! Small models often re-request the same tool result turn after turn.
//! Every call is keyed by tool name plus canonical arguments; repeats are
//! answered from the cache with a directive to move on, and a tool that
//! keeps being repeated is blocked for the rest of the run.

use crate::context::cap_result;
use futures::future::join_all;
use pixelforge_core::event::{DomainEvent, EventBus};
use pixelforge_core::message::{ToolRequest, ToolResultEntry};
use pixelforge_core::provider::ToolDefinition;
use pixelforge_tools::ToolBridge;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Length of the cached excerpt echoed back on a duplicate call.
const EXCERPT_CHARS: usize = 500;

/// What to do with one tool-request turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnDecision {
    /// Every request targets a blocked tool: rewrite history instead.
    Escalate { blocked_tools: Vec<String> },

    /// One result per request, in request order.
    Results(Vec<ToolResultEntry>),
}

struct CachedResult {
    text: String,
    is_error: bool,
}

enum Disposition {
    Blocked,
    Duplicate,
    New,
}

/// Per-run duplicate cache, counters, and blocked set.
pub struct LoopBreaker {
    threshold: u32,
    result_cap: usize,
    /// canonical key -> capped result
    cache: HashMap<String, CachedResult>,
    /// Consecutive duplicates per tool name
    counters: HashMap<String, u32>,
    blocked: BTreeSet<String>,
    /// Tools that have returned at least one non-error result
    succeeded: HashSet<String>,
}

impl LoopBreaker {
    pub fn new(threshold: u32, result_cap: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            result_cap,
            cache: HashMap::new(),
            counters: HashMap::new(),
            blocked: BTreeSet::new(),
            succeeded: HashSet::new(),
        }
    }

    pub fn is_blocked(&self, tool: &str) -> bool {
        self.blocked.contains(tool)
    }

    /// Blocked tools, sorted.
    pub fn blocked_tools(&self) -> Vec<String> {
        self.blocked.iter().cloned().collect()
    }

    /// Whether the tool has produced a successful result this run.
    pub fn has_succeeded(&self, tool: &str) -> bool {
        self.succeeded.contains(tool)
    }

    /// Number of distinct calls cached so far.
    pub fn cached_calls(&self) -> usize {
        self.cache.len()
    }

    /// The tool schema to offer, minus blocked tools.
    pub fn filter_schema(&self, tools: &[ToolDefinition]) -> Vec<ToolDefinition> {
        tools
            .iter()
            .filter(|t| !self.is_blocked(&t.name))
            .cloned()
            .collect()
    }

    /// Resolve one turn of tool requests.
    ///
    /// New calls are dispatched concurrently; duplicates and blocked tools
    /// never reach the bridge.
    pub async fn process_turn(
        &mut self,
        requests: &[ToolRequest],
        bridge: &ToolBridge,
        events: &EventBus,
    ) -> TurnDecision {
        if !requests.is_empty() && requests.iter().all(|r| self.is_blocked(&r.name)) {
            let blocked_tools: Vec<String> = requests
                .iter()
                .map(|r| r.name.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            return TurnDecision::Escalate { blocked_tools };
        }

        let mut pending: HashSet<String> = HashSet::new();
        let mut plan = Vec::with_capacity(requests.len());

        for request in requests {
            let key = canonical_key(&request.name, &request.arguments);
            let disposition = if self.is_blocked(&request.name) {
                Disposition::Blocked
            } else if self.cache.contains_key(&key) || pending.contains(&key) {
                self.record_duplicate(&request.name, events);
                Disposition::Duplicate
            } else {
                self.counters.insert(request.name.clone(), 0);
                pending.insert(key.clone());
                Disposition::New
            };
            plan.push((request, key, disposition));
        }

        let invocations = plan
            .iter()
            .filter(|(_, _, d)| matches!(d, Disposition::New))
            .map(|(request, key, _)| async move {
                let started = Instant::now();
                let outcome = bridge.invoke(&request.name, request.arguments_value()).await;
                (key.clone(), request.name.clone(), outcome, started.elapsed())
            });

        for (key, name, outcome, elapsed) in join_all(invocations).await {
            events.publish(DomainEvent::ToolInvoked {
                tool_name: name.clone(),
                success: !outcome.is_error,
                duration_ms: elapsed.as_millis() as u64,
                timestamp: chrono::Utc::now(),
            });
            if !outcome.is_error {
                self.succeeded.insert(name);
            }
            self.cache.insert(
                key,
                CachedResult {
                    text: cap_result(&outcome.text, self.result_cap),
                    is_error: outcome.is_error,
                },
            );
        }

        let results = plan
            .into_iter()
            .map(|(request, key, disposition)| {
                let (content, is_error) = match disposition {
                    Disposition::Blocked => (cap_result(&blocked_payload(&request.name), self.result_cap), true),
                    Disposition::Duplicate => {
                        let cached = self.cache.get(&key).map(|c| c.text.as_str()).unwrap_or_default();
                        (duplicate_directive(&request.name, cached, self.result_cap), false)
                    }
                    Disposition::New => match self.cache.get(&key) {
                        Some(cached) => (cached.text.clone(), cached.is_error),
                        None => (String::new(), true),
                    },
                };
                ToolResultEntry {
                    call_id: request.id.clone(),
                    tool_name: request.name.clone(),
                    content,
                    is_error,
                }
            })
            .collect();

        TurnDecision::Results(results)
    }

    fn record_duplicate(&mut self, tool: &str, events: &EventBus) {
        let count = {
            let counter = self.counters.entry(tool.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };
        debug!(tool, consecutive = count, "Duplicate tool call answered from cache");

        if count >= self.threshold && self.blocked.insert(tool.to_string()) {
            warn!(tool, threshold = self.threshold, "Tool blocked after repeated duplicate calls");
            events.publish(DomainEvent::ToolBlocked {
                tool_name: tool.to_string(),
                timestamp: chrono::Utc::now(),
            });
        }
    }
}

/// Cache key: tool name plus arguments re-serialized with sorted keys.
///
/// Blank arguments and `{}` share a key; unparseable arguments are keyed
/// by their trimmed text.
pub fn canonical_key(tool: &str, arguments: &str) -> String {
    let trimmed = arguments.trim();
    let canonical = if trimmed.is_empty() {
        "{}".to_string()
    } else {
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => sorted(value).to_string(),
            Err(_) => trimmed.to_string(),
        }
    };
    format!("{tool}:{canonical}")
}

fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> =
                map.into_iter().map(|(k, v)| (k, sorted(v))).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

/// The reply to a repeated call, excerpt shortened so the whole reply fits `cap`.
fn duplicate_directive(tool: &str, cached: &str, cap: usize) -> String {
    const ELLIPSIS: &str = "\n...";
    let header = format!(
        "You already called {tool} with these exact arguments. Do NOT call it again. \
         Use the result you already have and proceed to the next step.\n\n\
         Previous result (excerpt):\n"
    );
    let room = cap.saturating_sub(header.chars().count() + ELLIPSIS.len());
    let excerpt_len = EXCERPT_CHARS.min(room);

    let excerpt: String = cached.chars().take(excerpt_len).collect();
    let more = if cached.chars().count() > excerpt_len { ELLIPSIS } else { "" };
    cap_result(&format!("{header}{excerpt}{more}"), cap)
}

fn blocked_payload(tool: &str) -> String {
    info!(tool, "Request for blocked tool refused");
    json!({
        "error": "tool_blocked",
        "tool": tool,
        "message": format!("{tool} is no longer available in this run. Proceed with the data you have."),
    })
    .to_string()
}
