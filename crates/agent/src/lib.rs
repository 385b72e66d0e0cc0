//! The conversation controller for PixelForge.
//!
//! A run goes through these stages:
//!
//! 1. **Pre-fetch** design data through the tool bridge, when available
//! 2. **Dispatch** the conversation to the LLM backend
//! 3. **Extract** fenced code blocks and write them as artifacts
//! 4. **Execute** requested tools through the loop-breaker, or nudge the
//!    model forward when it stalls
//! 5. **Trim** history back under its budget and go to step 2
//!
//! The run ends when the model signals completion after writing at least
//! one file, or fails when the turn budget runs out.

pub mod context;
pub mod controller;
pub mod error;
pub mod extractor;
pub mod loop_breaker;
pub mod prefetch;
pub mod prompt;

#[cfg(test)]
mod test_helpers;

pub use context::{cap_result, trim_history, TrimReport};
pub use controller::{Controller, SessionMode};
pub use error::AgentError;
pub use extractor::{extract_artifacts, has_fence, scan_fences, FencedBlock};
pub use loop_breaker::{canonical_key, LoopBreaker, TurnDecision};
pub use prefetch::{prefetch, PrefetchedContext};
pub use prompt::StallPhase;
