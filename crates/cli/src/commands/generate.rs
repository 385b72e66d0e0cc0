//! `pixelforge generate`: Run the agent against one design reference.

use pixelforge_agent::Controller;
use pixelforge_config::AppConfig;
use pixelforge_core::event::{DomainEvent, EventBus};
use pixelforge_core::job::{BackendSelection, JobDescriptor};
use pixelforge_core::summary::RunSummary;
use pixelforge_tools::FsArtifactWriter;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub struct GenerateArgs {
    pub task_ref: String,
    pub output: PathBuf,
    pub max_turns: Option<u32>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub providers: Option<PathBuf>,
    pub no_prefetch: bool,
    pub verbose: bool,
}

pub async fn run(args: GenerateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let tool_providers = super::resolve_tool_providers(&config, args.providers.as_deref())?;
    let job = build_job(&config, &args);

    let backend = pixelforge_providers::build_from_config(&config.llm, job.backend.as_ref())?;
    tracing::info!(
        backend = backend.provider.name(),
        model = %backend.model,
        tool_providers = tool_providers.len(),
        output = %job.output_root.display(),
        "Backend ready"
    );

    let writer = Arc::new(FsArtifactWriter::new(job.output_root.clone()));
    let output_root = job.output_root.clone();

    let controller = match Controller::connect(
        backend.provider,
        backend.model,
        &tool_providers,
        writer,
        job,
    )
    .await
    {
        Ok(controller) => controller,
        Err(e) => {
            let summary = RunSummary::build(output_root, Vec::new(), 0, Some(e.to_string()));
            println!("{}", serde_json::to_string_pretty(&summary)?);
            return Err(e.into());
        }
    };

    let event_bus = Arc::new(EventBus::default());
    let printer = args
        .verbose
        .then(|| spawn_event_printer(event_bus.subscribe()));

    let mut controller = controller
        .with_temperature(config.llm.temperature)
        .with_max_tokens(config.llm.max_tokens)
        .with_event_bus(event_bus.clone());

    let result = controller.run().await;
    let summary = match &result {
        Ok(summary) => summary.clone(),
        Err(e) => controller.summary(Some(e)),
    };

    // Close the bus so the printer drains and exits
    drop(controller);
    drop(event_bus);
    if let Some(handle) = printer {
        let _ = handle.await;
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    result.map(|_| ()).map_err(Into::into)
}

/// The job for this invocation: config defaults, then command-line overrides.
fn build_job(config: &AppConfig, args: &GenerateArgs) -> JobDescriptor {
    let mut limits = config.limits.clone();
    if let Some(max_turns) = args.max_turns {
        limits.max_turns = max_turns;
    }

    let mut job = JobDescriptor::new(&args.task_ref, &args.output)
        .with_limits(limits)
        .with_prefetch(config.prefetch.clone())
        .with_completion(config.completion.clone())
        .with_verbose(args.verbose);

    if args.no_prefetch {
        job = job.without_prefetch();
    }
    if args.model.is_some() || args.endpoint.is_some() {
        job = job.with_backend(BackendSelection {
            model: args.model.clone(),
            endpoint: args.endpoint.clone(),
        });
    }
    job
}

fn spawn_event_printer(mut rx: broadcast::Receiver<Arc<DomainEvent>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => eprintln!("  {}", describe(&event)),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    eprintln!("  ... {missed} events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// One progress line per event.
fn describe(event: &DomainEvent) -> String {
    match event {
        DomainEvent::TurnCompleted {
            turn,
            tool_requests,
            history_turns,
            ..
        } => format!("turn {turn}: {tool_requests} tool request(s), {history_turns} turns in history"),
        DomainEvent::ToolInvoked {
            tool_name,
            success,
            duration_ms,
            ..
        } => {
            let outcome = if *success { "ok" } else { "failed" };
            format!("tool {tool_name}: {outcome} in {duration_ms}ms")
        }
        DomainEvent::ToolBlocked { tool_name, .. } => {
            format!("tool {tool_name}: blocked after repeated calls")
        }
        DomainEvent::ConversationRewritten { blocked_tools, .. } => {
            format!("escalated past {}", blocked_tools.join(", "))
        }
        DomainEvent::HistoryTrimmed {
            removed_turns,
            remaining_chars,
            ..
        } => format!("history trimmed: {removed_turns} turns dropped, {remaining_chars} chars left"),
        DomainEvent::ArtifactsWritten { paths, .. } => {
            format!("wrote {}", paths.join(", "))
        }
        DomainEvent::RunFinished {
            status,
            files_written,
            turns,
            ..
        } => format!("run {status}: {files_written} file(s) in {turns} turn(s)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> GenerateArgs {
        GenerateArgs {
            task_ref: "https://design.example/file/abc".into(),
            output: PathBuf::from("/tmp/out"),
            max_turns: None,
            model: None,
            endpoint: None,
            providers: None,
            no_prefetch: false,
            verbose: false,
        }
    }

    #[test]
    fn job_uses_config_defaults() {
        let config = AppConfig::default();
        let job = build_job(&config, &args());
        assert_eq!(job.limits, config.limits);
        assert_eq!(job.prefetch.len(), 3);
        assert!(job.backend.is_none());
    }

    #[test]
    fn flags_override_config() {
        let mut a = args();
        a.max_turns = Some(4);
        a.model = Some("claude-sonnet-4-20250514".into());
        a.no_prefetch = true;

        let job = build_job(&AppConfig::default(), &a);
        assert_eq!(job.limits.max_turns, 4);
        assert!(job.prefetch.is_empty());
        assert_eq!(
            job.backend.unwrap().model.as_deref(),
            Some("claude-sonnet-4-20250514")
        );
    }

    #[test]
    fn events_describe_progress() {
        let line = describe(&DomainEvent::ToolBlocked {
            tool_name: "get_node".into(),
            timestamp: chrono::Utc::now(),
        });
        assert!(line.contains("get_node"));

        let line = describe(&DomainEvent::RunFinished {
            status: "partial".into(),
            files_written: 2,
            turns: 5,
            timestamp: chrono::Utc::now(),
        });
        assert_eq!(line, "run partial: 2 file(s) in 5 turn(s)");
    }
}
