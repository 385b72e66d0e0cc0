//! LLM provider implementations for PixelForge.
//!
//! All providers implement the `pixelforge_core::Provider` trait.
//! The router selects the backend from configuration.

pub mod anthropic;
pub mod openai_compat;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{build_from_config, ResolvedBackend};
