//! # PixelForge Core
//!
//! Domain types, traits, and error definitions for the PixelForge
//! design-to-code agent. This crate has **zero framework dependencies**. It
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here:
//! - [`Provider`]: the LLM backend
//! - [`ToolProvider`]: an external tool source (design source, component catalog)
//! - [`ArtifactWriter`]: persistence of generated files
//!
//! Implementations live in their respective crates, which keeps the
//! conversation controller testable with scripted mocks.

pub mod artifact;
pub mod error;
pub mod event;
pub mod job;
pub mod message;
pub mod provider;
pub mod summary;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use artifact::{ArtifactKind, ArtifactWriter, ParsedArtifact};
pub use error::{ConversationError, ProviderError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use job::{
    BackendSelection, CompletionPolicy, JobDescriptor, PrefetchCategory, PrefetchSpec, RunLimits,
};
pub use message::{Conversation, ConversationId, Role, ToolRequest, ToolResultEntry, Turn, TurnPayload};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use summary::{ArtifactCounts, RunStatus, RunSummary};
pub use tool::{ToolDescriptor, ToolOutcome, ToolProvider};
