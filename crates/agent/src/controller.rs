//! The conversation controller: drives one generation run.
//!
//! `init → (prefetch)? → loop { dispatch → parse → tool | artifact | stall }
//! → complete | turn budget exhausted`.

use crate::context::trim_history;
use crate::error::AgentError;
use crate::extractor;
use crate::loop_breaker::{LoopBreaker, TurnDecision};
use crate::prefetch::{prefetch, PrefetchedContext};
use crate::prompt::{self, StallPhase};
use pixelforge_config::ToolProviderConfig;
use pixelforge_core::artifact::ArtifactWriter;
use pixelforge_core::event::{DomainEvent, EventBus};
use pixelforge_core::job::JobDescriptor;
use pixelforge_core::message::{Conversation, Turn};
use pixelforge_core::provider::{Provider, ProviderRequest, ToolDefinition};
use pixelforge_core::summary::RunSummary;
use pixelforge_tools::ToolBridge;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Placeholder for a responder turn that came back with no text.
const EMPTY_RESPONSE: &str = "(no output)";

const PREVIEW_CHARS: usize = 200;

/// How the session gets its design data. Decided once, after pre-fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// The model calls tools itself.
    ToolDriven,
    /// Data was embedded in the task message; no tool schema is offered.
    Prefetched,
}

/// Orchestrates one run: LLM turns, tool calls, artifact writes.
pub struct Controller {
    /// The LLM backend
    provider: Arc<dyn Provider>,

    /// The model to ask for
    model: String,

    temperature: f32,

    max_tokens: Option<u32>,

    bridge: ToolBridge,

    writer: Arc<dyn ArtifactWriter>,

    job: JobDescriptor,

    event_bus: Arc<EventBus>,

    // ── Run state ──
    mode: SessionMode,
    conversation: Conversation,
    breaker: LoopBreaker,
    schema: Vec<ToolDefinition>,
    system_prompt: String,
    written: Vec<PathBuf>,
    turns: u32,
}

impl Controller {
    /// Create a controller over an already-connected bridge.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        bridge: ToolBridge,
        writer: Arc<dyn ArtifactWriter>,
        job: JobDescriptor,
    ) -> Self {
        let breaker = LoopBreaker::new(
            job.limits.duplicate_threshold,
            job.limits.max_tool_result_chars,
        );
        Self {
            provider,
            model: model.into(),
            temperature: 0.2,
            max_tokens: None,
            bridge,
            writer,
            job,
            event_bus: Arc::new(EventBus::default()),
            mode: SessionMode::ToolDriven,
            conversation: Conversation::new(),
            breaker,
            schema: Vec::new(),
            system_prompt: String::new(),
            written: Vec::new(),
            turns: 0,
        }
    }

    /// Connect the configured tool providers, then create the controller.
    ///
    /// A provider that cannot be reached fails the run before any turn.
    pub async fn connect(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tool_providers: &[ToolProviderConfig],
        writer: Arc<dyn ArtifactWriter>,
        job: JobDescriptor,
    ) -> Result<Self, AgentError> {
        let bridge = ToolBridge::connect(tool_providers)
            .await
            .map_err(AgentError::Connection)?;
        Ok(Self::new(provider, model, bridge, writer, job))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Publish run events on a shared bus.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// LLM calls made so far.
    pub fn turns_taken(&self) -> u32 {
        self.turns
    }

    pub fn written_paths(&self) -> &[PathBuf] {
        &self.written
    }

    pub fn blocked_tools(&self) -> Vec<String> {
        self.breaker.blocked_tools()
    }

    /// Summary of the run so far; `failure` marks it partial or error.
    pub fn summary(&self, failure: Option<&AgentError>) -> RunSummary {
        RunSummary::build(
            self.job.output_root.clone(),
            self.written.clone(),
            self.turns,
            failure.map(|e| e.to_string()),
        )
    }

    /// Execute the run. Tool providers are disconnected on every path out.
    pub async fn run(&mut self) -> Result<RunSummary, AgentError> {
        info!(
            task = %self.job.task_ref,
            model = %self.model,
            max_turns = self.job.limits.max_turns,
            "Starting generation run"
        );

        let result = self.drive().await;
        self.bridge.disconnect().await;

        let summary = self.summary(result.as_ref().err());
        self.event_bus.publish(DomainEvent::RunFinished {
            status: summary.status.to_string(),
            files_written: summary.files_written,
            turns: self.turns,
            timestamp: chrono::Utc::now(),
        });

        match result {
            Ok(()) => {
                info!(
                    files = summary.files_written,
                    turns = self.turns,
                    "Generation complete"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(error = %e, files = summary.files_written, turns = self.turns, "Generation failed");
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> Result<(), AgentError> {
        self.start().await;

        let max_turns = self.job.limits.max_turns;
        for turn in 1..=max_turns {
            self.turns = turn;
            if self.step(turn).await? {
                return Ok(());
            }

            if let Some(report) = trim_history(&mut self.conversation, self.job.limits.max_history_chars)? {
                debug!(
                    removed = report.removed_turns,
                    remaining_chars = report.remaining_chars,
                    "History trimmed"
                );
                self.event_bus.publish(DomainEvent::HistoryTrimmed {
                    removed_turns: report.removed_turns,
                    remaining_chars: report.remaining_chars,
                    timestamp: chrono::Utc::now(),
                });
            }
        }

        Err(AgentError::TurnBudgetExhausted { max_turns })
    }

    /// Pre-fetch, pick the session mode, and seed the conversation.
    async fn start(&mut self) {
        let prefetched = if self.job.prefetch.is_empty() {
            PrefetchedContext::default()
        } else {
            prefetch(&self.bridge, &self.job.prefetch, &self.job.task_ref).await
        };

        self.mode = if prefetched.has_primary() {
            SessionMode::Prefetched
        } else {
            SessionMode::ToolDriven
        };
        info!(mode = ?self.mode, tools = self.bridge.list_tools().len(), "Session mode selected");

        self.schema = self
            .bridge
            .list_tools()
            .iter()
            .map(|t| t.to_definition())
            .collect();
        self.system_prompt = prompt::system_prompt(self.mode, &self.job.completion);

        let task = prompt::task_message(&self.job, self.mode, &prefetched, self.bridge.list_tools());
        self.conversation = Conversation::with_task(task);
    }

    /// One dispatch/parse cycle. Returns true when the run is complete.
    async fn step(&mut self, turn: u32) -> Result<bool, AgentError> {
        let request = self.build_request();
        debug!(
            turn,
            history_turns = request.turns.len(),
            tools = request.tools.as_ref().map_or(0, Vec::len),
            "Dispatching turn"
        );

        let response = self.provider.complete(request).await?;
        let text = response.joined_text();
        if self.job.verbose {
            let preview: String = text.chars().take(PREVIEW_CHARS).collect();
            info!(
                turn,
                chars = text.len(),
                tool_requests = response.tool_requests.len(),
                preview = %preview,
                "Model replied"
            );
        }

        if extractor::has_fence(&text) {
            self.write_artifacts(&text).await;
        }

        let claims_completion = self.job.completion.matches(&text);
        let honoured = claims_completion
            && (!self.job.completion.require_artifact || !self.written.is_empty());

        if honoured {
            self.conversation.push(Turn::assistant(text))?;
            self.publish_turn(turn, response.tool_requests.len());
            info!(turn, "Completion signalled");
            return Ok(true);
        }

        if !response.tool_requests.is_empty() {
            let decision = self
                .breaker
                .process_turn(&response.tool_requests, &self.bridge, &self.event_bus)
                .await;
            match decision {
                TurnDecision::Escalate { blocked_tools } => self.escalate(&blocked_tools)?,
                TurnDecision::Results(results) => {
                    self.conversation
                        .push(Turn::tool_requests(text, response.tool_requests.clone()))?;
                    self.conversation.push(Turn::tool_results(results))?;
                }
            }
        } else {
            if claims_completion {
                debug!(turn, "Completion claimed before any file was written");
            }
            let guidance =
                prompt::stall_guidance(&self.stall_phase(), &self.job.completion, claims_completion);
            let reply = if text.trim().is_empty() {
                EMPTY_RESPONSE.to_string()
            } else {
                text
            };
            self.conversation.push(Turn::assistant(reply))?;
            self.conversation.push(Turn::user(guidance))?;
        }

        self.publish_turn(turn, response.tool_requests.len());
        Ok(false)
    }

    fn build_request(&self) -> ProviderRequest {
        let tools = match self.mode {
            SessionMode::Prefetched => None,
            SessionMode::ToolDriven => {
                let offered = self.breaker.filter_schema(&self.schema);
                (!offered.is_empty()).then_some(offered)
            }
        };

        ProviderRequest {
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            turns: self.conversation.turns().to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools,
        }
    }

    async fn write_artifacts(&mut self, text: &str) {
        let artifacts = extractor::extract_artifacts(text);
        if artifacts.is_empty() {
            return;
        }

        let written = self.writer.write_all(&artifacts).await;
        if written.is_empty() {
            return;
        }

        info!(count = written.len(), root = %self.writer.root().display(), "Artifacts written");
        self.event_bus.publish(DomainEvent::ArtifactsWritten {
            paths: written.iter().map(|p| p.display().to_string()).collect(),
            timestamp: chrono::Utc::now(),
        });
        for path in written {
            if !self.written.contains(&path) {
                self.written.push(path);
            }
        }
    }

    /// Replace an all-blocked turn with a synthetic pair that closes the
    /// phase the model is stuck in.
    fn escalate(&mut self, blocked: &[String]) -> Result<(), AgentError> {
        let next_tools = self.open_tools();
        warn!(blocked = ?blocked, next = ?next_tools, "Only blocked tools requested; rewriting conversation");

        let (assistant, user) = prompt::escalation_turns(blocked, &next_tools);
        self.conversation.push(Turn::assistant(assistant).synthetic())?;
        self.conversation.push(Turn::user(user).synthetic())?;

        self.event_bus.publish(DomainEvent::ConversationRewritten {
            blocked_tools: blocked.to_vec(),
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    /// For each pre-fetch category not yet satisfied, the first tool that
    /// exists and is not blocked.
    fn open_tools(&self) -> Vec<String> {
        self.job
            .prefetch
            .iter()
            .filter(|spec| !self.category_done(&spec.tools))
            .filter_map(|spec| {
                spec.tools
                    .iter()
                    .find(|t| self.bridge.has_tool(t) && !self.breaker.is_blocked(t))
                    .cloned()
            })
            .collect()
    }

    fn category_done(&self, tools: &[String]) -> bool {
        tools
            .iter()
            .any(|t| self.breaker.has_succeeded(t) || self.breaker.is_blocked(t))
    }

    fn stall_phase(&self) -> StallPhase {
        if !self.written.is_empty() {
            return StallPhase::AwaitingCompletion {
                files_written: self.written.len(),
            };
        }
        if self.mode == SessionMode::Prefetched {
            return StallPhase::ReadyToWrite;
        }

        let open = self.open_tools();
        let done = self
            .job
            .prefetch
            .iter()
            .filter(|spec| self.category_done(&spec.tools))
            .count();

        match (done, open.is_empty()) {
            (0, false) => StallPhase::NothingFetched {
                next_tools: open.into_iter().take(1).collect(),
            },
            (0, true) if self.breaker.cached_calls() == 0 => {
                let next_tools: Vec<String> = self
                    .breaker
                    .filter_schema(&self.schema)
                    .into_iter()
                    .map(|t| t.name)
                    .collect();
                if next_tools.is_empty() {
                    StallPhase::ReadyToWrite
                } else {
                    StallPhase::NothingFetched { next_tools }
                }
            }
            (_, false) => StallPhase::PartiallyFetched { next_tools: open },
            _ => StallPhase::ReadyToWrite,
        }
    }

    fn publish_turn(&self, turn: u32, tool_requests: usize) {
        self.event_bus.publish(DomainEvent::TurnCompleted {
            turn,
            tool_requests,
            history_turns: self.conversation.len(),
            timestamp: chrono::Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        make_text_response, make_tool_response, CountingToolProvider, SequentialMockProvider,
    };
    use pixelforge_core::job::RunLimits;
    use pixelforge_core::summary::RunStatus;
    use pixelforge_tools::FsArtifactWriter;
    use serde_json::json;

    const TASK: &str = "https://design.example/file/abc?node-id=1-2";

    fn job(root: &std::path::Path, max_turns: u32) -> JobDescriptor {
        JobDescriptor::new(TASK, root).with_limits(RunLimits {
            max_turns,
            ..RunLimits::default()
        })
    }

    fn controller(
        provider: Arc<SequentialMockProvider>,
        bridge: ToolBridge,
        job: JobDescriptor,
    ) -> Controller {
        let writer = Arc::new(FsArtifactWriter::new(job.output_root.clone()));
        Controller::new(provider, "mock-model", bridge, writer, job)
    }

    #[tokio::test]
    async fn completes_when_phrase_and_artifact_arrive() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response(
            "```tsx Button/Button.tsx\nexport const Button = () => null;\n```\nWORKFLOW COMPLETE",
        )]));

        let mut ctl = controller(provider.clone(), ToolBridge::empty(), job(dir.path(), 5));
        let summary = ctl.run().await.unwrap();

        assert_eq!(summary.status, RunStatus::Complete);
        assert_eq!(summary.files_written, 1);
        assert_eq!(summary.counts.components, 1);
        assert_eq!(provider.call_count(), 1);
        assert!(dir.path().join("Button/Button.tsx").exists());
    }

    #[tokio::test]
    async fn premature_completion_is_a_stall() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("TASK COMPLETE"),
            make_text_response("```tsx Card.tsx\nexport {}\n```\ntask complete"),
        ]));

        let mut ctl = controller(provider.clone(), ToolBridge::empty(), job(dir.path(), 5));
        let summary = ctl.run().await.unwrap();

        assert_eq!(provider.call_count(), 2);
        assert_eq!(summary.files_written, 1);
        let guidance = ctl.conversation().turns()[2].text().to_string();
        assert!(guidance.contains("No files have been written yet"));
    }

    #[tokio::test]
    async fn completion_without_artifact_when_not_required() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response(
            "Nothing to do. ALL FILES GENERATED",
        )]));
        let mut job = job(dir.path(), 3);
        job.completion.require_artifact = false;

        let mut ctl = controller(provider, ToolBridge::empty(), job);
        let summary = ctl.run().await.unwrap();
        assert_eq!(summary.status, RunStatus::Complete);
        assert_eq!(summary.files_written, 0);
    }

    #[tokio::test]
    async fn budget_exhaustion_names_limit_and_keeps_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("```tsx Card.tsx\nexport {}\n```"),
            make_text_response("still working"),
        ]));

        let mut ctl = controller(provider.clone(), ToolBridge::empty(), job(dir.path(), 2));
        let err = ctl.run().await.unwrap_err();

        assert!(matches!(err, AgentError::TurnBudgetExhausted { max_turns: 2 }));
        assert_eq!(provider.call_count(), 2);

        let summary = ctl.summary(Some(&err));
        assert_eq!(summary.status, RunStatus::Partial);
        assert!(summary.gaps.iter().any(|g| g.contains("max_turns = 2")));
        assert!(dir.path().join("Card.tsx").exists());
    }

    #[tokio::test]
    async fn prefetched_mode_offers_no_tools() {
        let dir = tempfile::tempdir().unwrap();
        let tools = Arc::new(CountingToolProvider::new("figma", &["get_design_context", "list_components"]));
        let bridge = ToolBridge::from_providers(vec![tools.clone()]).await.unwrap();
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("Working on it"),
            make_text_response("```tsx A.tsx\nexport {}\n```\nWORKFLOW COMPLETE"),
        ]));

        let mut ctl = controller(provider.clone(), bridge, job(dir.path(), 5));
        ctl.run().await.unwrap();

        assert_eq!(ctl.mode(), SessionMode::Prefetched);
        assert_eq!(provider.offered_tools(0), None);
        assert_eq!(provider.offered_tools(1), None);
        let first = &provider.requests()[0];
        assert!(first.turns[0].text().contains("get_design_context result from figma"));
        assert_eq!(tools.invocations("get_design_context"), 1);
    }

    #[tokio::test]
    async fn tool_driven_mode_offers_schema_and_records_results() {
        let dir = tempfile::tempdir().unwrap();
        let tools = Arc::new(CountingToolProvider::new("catalog", &["list_components"]));
        let bridge = ToolBridge::from_providers(vec![tools.clone()]).await.unwrap();
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_response(&[("call_1", "list_components", json!({}))]),
            make_text_response("```tsx A.tsx\nexport {}\n```\nWORKFLOW COMPLETE"),
        ]));

        let mut ctl = controller(provider.clone(), bridge, job(dir.path(), 5));
        ctl.run().await.unwrap();

        assert_eq!(ctl.mode(), SessionMode::ToolDriven);
        assert_eq!(provider.offered_tools(0), Some(vec!["list_components".to_string()]));
        // Turn 2 sees the request turn and its results
        assert_eq!(provider.requests()[1].turns.len(), 3);
        // No design data, so pre-fetch stops before the catalog
        assert_eq!(tools.invocations("list_components"), 1);
        assert_eq!(tools.arguments()[0].1, json!({}));
    }

    #[tokio::test]
    async fn provider_error_is_fatal() {
        struct Failing;
        #[async_trait::async_trait]
        impl Provider for Failing {
            fn name(&self) -> &str {
                "failing"
            }
            async fn complete(
                &self,
                _request: ProviderRequest,
            ) -> Result<pixelforge_core::provider::ProviderResponse, pixelforge_core::ProviderError> {
                Err(pixelforge_core::ProviderError::RateLimited { retry_after_secs: 5 })
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let writer = Arc::new(FsArtifactWriter::new(dir.path()));
        let mut ctl = Controller::new(Arc::new(Failing), "m", ToolBridge::empty(), writer, job(dir.path(), 3));
        let err = ctl.run().await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
        assert_eq!(ctl.summary(Some(&err)).status, RunStatus::Error);
    }

    #[tokio::test]
    async fn events_cover_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response(
            "```tsx A.tsx\nexport {}\n```\nWORKFLOW COMPLETE",
        )]));
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();

        let mut ctl = controller(provider, ToolBridge::empty(), job(dir.path(), 2)).with_event_bus(bus);
        ctl.run().await.unwrap();

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(serde_json::to_value(&*event).unwrap()["event"].as_str().unwrap().to_string());
        }
        assert_eq!(names, vec!["artifacts_written", "turn_completed", "run_finished"]);
    }
}
