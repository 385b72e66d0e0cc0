//! Pre-fetch: gather design data up front so the model never has to
//! orchestrate multi-turn tool use.

use crate::context::cap_result;
use pixelforge_core::job::{PrefetchCategory, PrefetchSpec};
use pixelforge_tools::ToolBridge;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Argument name used when neither the plan nor the schema names one.
const FALLBACK_ARGUMENT: &str = "url";

/// Capped text per category. Absent categories were unavailable or failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchedContext {
    blobs: BTreeMap<PrefetchCategory, String>,
}

impl PrefetchedContext {
    pub fn get(&self, category: PrefetchCategory) -> Option<&str> {
        self.blobs.get(&category).map(String::as_str)
    }

    pub fn insert(&mut self, category: PrefetchCategory, text: impl Into<String>) {
        self.blobs.insert(category, text.into());
    }

    /// Whether the primary (design) category was fetched.
    pub fn has_primary(&self) -> bool {
        self.blobs.keys().any(|c| c.is_primary())
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Fetched categories with their text, primary first.
    pub fn iter(&self) -> impl Iterator<Item = (PrefetchCategory, &str)> {
        self.blobs.iter().map(|(c, t)| (*c, t.as_str()))
    }
}

/// Run the pre-fetch plan against the bridge.
///
/// For each category the first tool that exists is called once with the
/// task reference. Failures are logged and leave the category absent.
/// The primary category is fetched first; when it comes back empty the
/// run is tool-driven and nothing else is fetched.
pub async fn prefetch(bridge: &ToolBridge, plan: &[PrefetchSpec], task_ref: &str) -> PrefetchedContext {
    let mut context = PrefetchedContext::default();
    if !bridge.is_connected() {
        return context;
    }

    let (primary, secondary): (Vec<&PrefetchSpec>, Vec<&PrefetchSpec>) =
        plan.iter().partition(|spec| spec.category.is_primary());

    for spec in primary {
        fetch_category(bridge, spec, task_ref, &mut context).await;
    }
    if !context.has_primary() {
        info!("No primary design data pre-fetched; the model will call tools itself");
        return context;
    }

    for spec in secondary {
        fetch_category(bridge, spec, task_ref, &mut context).await;
    }
    context
}

async fn fetch_category(
    bridge: &ToolBridge,
    spec: &PrefetchSpec,
    task_ref: &str,
    context: &mut PrefetchedContext,
) {
    let Some(tool) = spec.tools.iter().find(|t| bridge.has_tool(t)) else {
        debug!(category = %spec.category, "No pre-fetch tool available");
        return;
    };

    let arguments = prefetch_arguments(bridge, spec, tool, task_ref);
    let outcome = bridge.invoke(tool, arguments).await;

    if outcome.is_error {
        warn!(category = %spec.category, tool = %tool, error = %outcome.text, "Pre-fetch failed");
        return;
    }
    if outcome.text.trim().is_empty() {
        debug!(category = %spec.category, tool = %tool, "Pre-fetch returned nothing");
        return;
    }

    let original = outcome.text.chars().count();
    let text = cap_result(&outcome.text, spec.max_chars);
    info!(
        category = %spec.category,
        tool = %tool,
        chars = original,
        capped = original > spec.max_chars,
        "Pre-fetched context"
    );
    context.insert(spec.category, text);
}

fn prefetch_arguments(bridge: &ToolBridge, spec: &PrefetchSpec, tool: &str, task_ref: &str) -> Value {
    let argument = spec
        .argument
        .clone()
        .or_else(|| {
            bridge
                .descriptor(tool)
                .and_then(|d| d.required_params().first().map(|p| p.to_string()))
        })
        .unwrap_or_else(|| FALLBACK_ARGUMENT.to_string());

    let mut map = Map::new();
    map.insert(argument, json!(task_ref));
    Value::Object(map)
}
