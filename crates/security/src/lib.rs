//! Security module for PixelForge: sandboxing of generated artifact paths.
//!
//! Provides:
//! - **Path validation**: every artifact path must resolve under the output root

pub mod path;

pub use path::{resolve_sandboxed, PathValidationError};
