//! Generated artifacts and the writer collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One path-labeled content blob extracted from model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedArtifact {
    /// Target path, relative to the sandbox root
    pub path: String,

    /// File content, ending in exactly one newline
    pub content: String,

    /// Language tag from the opening fence, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Category of a generated file, by filename convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Component,
    Test,
    Story,
    Other,
}

const COMPONENT_EXTENSIONS: &[&str] = &[
    "tsx", "ts", "jsx", "js", "vue", "svelte", "css", "scss", "less", "html", "swift", "kt", "dart",
];

impl ArtifactKind {
    /// Classify a path: `*.test.*`/`*.spec.*` are tests, `*.stories.*` are
    /// stories, source/style extensions are components.
    pub fn classify(path: impl AsRef<Path>) -> Self {
        let file_name = path
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if file_name.contains(".test.") || file_name.contains(".spec.") {
            return ArtifactKind::Test;
        }
        if file_name.contains(".stories.") || file_name.contains(".story.") {
            return ArtifactKind::Story;
        }

        let extension = path
            .as_ref()
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if COMPONENT_EXTENSIONS.contains(&extension.as_str()) {
            ArtifactKind::Component
        } else {
            ArtifactKind::Other
        }
    }
}

/// Persists artifacts under a sandbox root.
///
/// Paths that resolve outside the root are skipped without aborting the
/// batch. Returns the paths actually written.
#[async_trait]
pub trait ArtifactWriter: Send + Sync {
    /// The sandbox root every artifact must resolve under.
    fn root(&self) -> &Path;

    /// Write a batch of artifacts.
    async fn write_all(&self, artifacts: &[ParsedArtifact]) -> Vec<PathBuf>;
}
