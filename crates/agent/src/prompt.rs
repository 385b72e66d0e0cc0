//! Prompt text: system prompts, the task message, stall guidance, and the
//! synthetic turns used to force the conversation forward.

use crate::controller::SessionMode;
use crate::prefetch::PrefetchedContext;
use pixelforge_core::job::{CompletionPolicy, JobDescriptor};
use pixelforge_core::tool::ToolDescriptor;

/// The fence contract the extractor relies on.
const FENCE_CONTRACT: &str = "\
Emit every file as a fenced code block whose opening line is three backticks, \
the language tag, a space, and the file path relative to the output directory, \
for example:

```tsx Button/Button.tsx
export function Button() { /* ... */ }
```

Close each block with a line containing only three backticks. \
One file per block. Never put the path on its own line inside the block.";

/// Where a stalled run currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StallPhase {
    /// No data gathered yet.
    NothingFetched { next_tools: Vec<String> },

    /// Some categories gathered, others still open.
    PartiallyFetched { next_tools: Vec<String> },

    /// All data in hand, nothing written.
    ReadyToWrite,

    /// Files written but completion not signalled.
    AwaitingCompletion { files_written: usize },
}

fn completion_phrase(policy: &CompletionPolicy) -> &str {
    policy
        .phrases
        .first()
        .map(String::as_str)
        .unwrap_or("WORKFLOW COMPLETE")
}

/// The system prompt for a session.
pub fn system_prompt(mode: SessionMode, completion: &CompletionPolicy) -> String {
    let done = completion_phrase(completion);
    match mode {
        SessionMode::Prefetched => format!(
            "You are a senior front-end engineer. You turn design data into \
             production-ready components, tests, and stories.\n\n\
             All design data you need is already in the task message. \
             You have no tools; do not try to call any.\n\n\
             {FENCE_CONTRACT}\n\n\
             When every file has been written, reply with the line: {done}"
        ),
        SessionMode::ToolDriven => format!(
            "You are a senior front-end engineer. You turn design data into \
             production-ready components, tests, and stories.\n\n\
             Work in phases:\n\
             1. Fetch the design data with the design tools.\n\
             2. Look up existing components and guidelines if tools for them exist.\n\
             3. Write the component, its tests, and its stories.\n\n\
             Call each tool at most once with the same arguments. Tool results \
             stay in the conversation; re-read them instead of calling again.\n\n\
             {FENCE_CONTRACT}\n\n\
             When every file has been written, reply with the line: {done}"
        ),
    }
}

/// The first originator message.
pub fn task_message(
    job: &JobDescriptor,
    mode: SessionMode,
    prefetched: &PrefetchedContext,
    tools: &[ToolDescriptor],
) -> String {
    let mut message = format!(
        "Generate the components for this design: {}\n\
         Write components, tests (*.test.tsx), and stories (*.stories.tsx).\n",
        job.task_ref
    );

    match mode {
        SessionMode::Prefetched => {
            for (category, text) in prefetched.iter() {
                message.push_str(&format!(
                    "\n## {} data\n\n{}\n",
                    category.label(),
                    text.trim_end()
                ));
            }
            message.push_str("\nAll data is above. Write the files now.");
        }
        SessionMode::ToolDriven => {
            if tools.is_empty() {
                message.push_str("\nNo tools are available. Write the files from the reference alone.");
            } else {
                message.push_str("\nAvailable tools:\n");
                for tool in tools {
                    message.push_str(&format!("- {}: {}\n", tool.name, tool.description));
                }
                message.push_str(&format!(
                    "\nStart by calling the design tool with the reference {}.",
                    job.task_ref
                ));
            }
        }
    }

    message
}

/// Guidance appended when the model produced neither tool calls nor an
/// honoured completion.
pub fn stall_guidance(phase: &StallPhase, completion: &CompletionPolicy, premature_claim: bool) -> String {
    let done = completion_phrase(completion);
    let mut guidance = String::new();
    if premature_claim {
        guidance.push_str("No files have been written yet, so the task is not complete. ");
    }

    match phase {
        StallPhase::NothingFetched { next_tools } => guidance.push_str(&format!(
            "You have not fetched any design data. Call {} now.",
            tool_list(next_tools)
        )),
        StallPhase::PartiallyFetched { next_tools } => guidance.push_str(&format!(
            "You have the design data. Next, call {} once, then write the files.",
            tool_list(next_tools)
        )),
        StallPhase::ReadyToWrite => guidance.push_str(
            "You have all the data you need. Write the files now, each in its own fenced block \
             with the path on the opening line (```tsx Button/Button.tsx).",
        ),
        StallPhase::AwaitingCompletion { files_written } => guidance.push_str(&format!(
            "You have written {files_written} file(s). If anything is missing (tests, stories), \
             write it now. If everything is done, reply with {done}."
        )),
    }

    guidance
}

/// The synthetic responder/originator pair that replaces a turn made up
/// entirely of blocked tool calls.
pub fn escalation_turns(blocked: &[String], next_tools: &[String]) -> (String, String) {
    let assistant = format!(
        "I have already gathered the data from {}. That phase is complete.",
        blocked.join(", ")
    );

    let mut user = format!(
        "Do not call {} again; {} not available anymore. ",
        blocked.join(", "),
        if blocked.len() == 1 { "it is" } else { "they are" }
    );
    if next_tools.is_empty() {
        user.push_str(
            "Write the files now, each in its own fenced block with the path on the opening line.",
        );
    } else {
        user.push_str(&format!("Continue with {}.", tool_list(next_tools)));
    }

    (assistant, user)
}

fn tool_list(tools: &[String]) -> String {
    match tools {
        [] => "the remaining tools".to_string(),
        [one] => one.clone(),
        many => many.join(" or "),
    }
}
