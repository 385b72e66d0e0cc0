//! Tool plumbing for PixelForge.
//!
//! - [`ToolBridge`]: one name-indexed view over every connected tool provider
//! - [`mcp`]: MCP-style providers over stdio child processes and HTTP
//! - [`FsArtifactWriter`]: sandboxed persistence of generated files

pub mod bridge;
pub mod mcp;
pub mod writer;

pub use bridge::ToolBridge;
pub use mcp::{connect_provider, McpToolProvider};
pub use writer::FsArtifactWriter;
