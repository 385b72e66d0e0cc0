//! The job descriptor: everything a single run is parameterized by.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Numeric limits for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLimits {
    /// Maximum LLM round trips before the run fails
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Cap for a single tool result entering history (characters)
    #[serde(default = "default_max_tool_result_chars")]
    pub max_tool_result_chars: usize,

    /// Cap for the whole conversation history (characters)
    #[serde(default = "default_max_history_chars")]
    pub max_history_chars: usize,

    /// Consecutive duplicate calls after which a tool is blocked
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: u32,
}

fn default_max_turns() -> u32 {
    20
}
fn default_max_tool_result_chars() -> usize {
    12_000
}
fn default_max_history_chars() -> usize {
    120_000
}
fn default_duplicate_threshold() -> u32 {
    2
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_tool_result_chars: default_max_tool_result_chars(),
            max_history_chars: default_max_history_chars(),
            duplicate_threshold: default_duplicate_threshold(),
        }
    }
}

/// The fixed set of data categories gathered before the turn loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefetchCategory {
    /// Design data for the target node. Its presence switches the run
    /// into prefetched mode.
    Design,
    /// Existing component catalog entries
    Components,
    /// Design-system guidelines
    Guidelines,
}

impl PrefetchCategory {
    pub fn is_primary(self) -> bool {
        self == PrefetchCategory::Design
    }

    pub fn label(self) -> &'static str {
        match self {
            PrefetchCategory::Design => "design",
            PrefetchCategory::Components => "components",
            PrefetchCategory::Guidelines => "guidelines",
        }
    }
}

impl std::fmt::Display for PrefetchCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// How to fill one prefetch category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefetchSpec {
    pub category: PrefetchCategory,

    /// Candidate tool names, tried in order; the first one discovered is called
    #[serde(default)]
    pub tools: Vec<String>,

    /// Size cap for this category (characters)
    #[serde(default = "default_prefetch_chars")]
    pub max_chars: usize,

    /// Argument name that carries the task reference. When absent the
    /// tool's first required parameter is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument: Option<String>,
}

fn default_prefetch_chars() -> usize {
    20_000
}

impl PrefetchSpec {
    /// The stock plan: design, components, guidelines.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self {
                category: PrefetchCategory::Design,
                tools: vec![
                    "get_design_context".into(),
                    "get_figma_data".into(),
                    "get_node".into(),
                ],
                max_chars: 30_000,
                argument: None,
            },
            Self {
                category: PrefetchCategory::Components,
                tools: vec!["list_components".into(), "get_components".into()],
                max_chars: 12_000,
                argument: None,
            },
            Self {
                category: PrefetchCategory::Guidelines,
                tools: vec!["get_guidelines".into(), "get_design_guidelines".into()],
                max_chars: 6_000,
                argument: None,
            },
        ]
    }
}

/// When a completion phrase ends the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionPolicy {
    /// Case-insensitive phrases; any one is sufficient
    #[serde(default = "default_completion_phrases")]
    pub phrases: Vec<String>,

    /// Ignore completion claims until at least one artifact was written
    #[serde(default = "default_true")]
    pub require_artifact: bool,
}

fn default_completion_phrases() -> Vec<String> {
    vec![
        "WORKFLOW COMPLETE".into(),
        "GENERATION COMPLETE".into(),
        "ALL FILES GENERATED".into(),
        "TASK COMPLETE".into(),
    ]
}

fn default_true() -> bool {
    true
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            phrases: default_completion_phrases(),
            require_artifact: true,
        }
    }
}

impl CompletionPolicy {
    /// Whether `text` contains any completion phrase.
    pub fn matches(&self, text: &str) -> bool {
        let haystack = text.to_uppercase();
        self.phrases
            .iter()
            .any(|p| haystack.contains(&p.to_uppercase()))
    }
}

/// Optional override of the LLM backend for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Immutable description of one generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Opaque locator of the design to implement (e.g. a design file URL)
    pub task_ref: String,

    /// Sandbox root for generated files
    pub output_root: PathBuf,

    #[serde(default)]
    pub limits: RunLimits,

    /// Prefetch plan; empty disables the prefetch phase
    #[serde(default = "PrefetchSpec::defaults")]
    pub prefetch: Vec<PrefetchSpec>,

    #[serde(default)]
    pub completion: CompletionPolicy,

    /// Verbose progress reporting
    #[serde(default)]
    pub verbose: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendSelection>,
}

impl JobDescriptor {
    pub fn new(task_ref: impl Into<String>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            task_ref: task_ref.into(),
            output_root: output_root.into(),
            limits: RunLimits::default(),
            prefetch: PrefetchSpec::defaults(),
            completion: CompletionPolicy::default(),
            verbose: false,
            backend: None,
        }
    }

    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_prefetch(mut self, plan: Vec<PrefetchSpec>) -> Self {
        self.prefetch = plan;
        self
    }

    pub fn without_prefetch(mut self) -> Self {
        self.prefetch.clear();
        self
    }

    pub fn with_completion(mut self, completion: CompletionPolicy) -> Self {
        self.completion = completion;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_backend(mut self, backend: BackendSelection) -> Self {
        self.backend = Some(backend);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits() {
        let limits = RunLimits::default();
        assert_eq!(limits.max_turns, 20);
        assert_eq!(limits.duplicate_threshold, 2);
        assert!(limits.max_history_chars > limits.max_tool_result_chars);
    }

    #[test]
    fn job_builder() {
        let job = JobDescriptor::new("https://design.example/file/abc?node-id=1-2", "/tmp/out")
            .without_prefetch()
            .with_backend(BackendSelection {
                model: Some("qwen2.5-coder:7b".into()),
                endpoint: None,
            });
        assert!(job.prefetch.is_empty());
        assert_eq!(job.backend.unwrap().model.as_deref(), Some("qwen2.5-coder:7b"));
    }

    #[test]
    fn limits_parse_with_defaults() {
        let limits: RunLimits = serde_json::from_str(r#"{"max_turns": 3}"#).unwrap();
        assert_eq!(limits.max_turns, 3);
        assert_eq!(limits.max_tool_result_chars, 12_000);
    }

    #[test]
    fn default_plan_starts_with_primary() {
        let plan = PrefetchSpec::defaults();
        assert_eq!(plan.len(), 3);
        assert!(plan[0].category.is_primary());
        assert!(!plan[1].category.is_primary());
    }

    #[test]
    fn completion_phrases_are_case_insensitive() {
        let policy = CompletionPolicy::default();
        assert!(policy.matches("Files written.\nworkflow complete"));
        assert!(policy.matches("ALL FILES GENERATED"));
        assert!(!policy.matches("Still working on the workflow"));
    }
}
