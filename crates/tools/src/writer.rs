//! Filesystem artifact writer with sandbox validation.

use async_trait::async_trait;
use pixelforge_core::artifact::{ArtifactWriter, ParsedArtifact};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Writes artifacts under a root directory, creating parents as needed.
///
/// Paths that fail sandbox validation are skipped silently (debug log);
/// I/O failures are logged and skipped. Neither aborts the batch.
pub struct FsArtifactWriter {
    root: PathBuf,
}

impl FsArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn write_one(&self, artifact: &ParsedArtifact) -> Option<PathBuf> {
        let target = match pixelforge_security::resolve_sandboxed(&self.root, &artifact.path) {
            Ok(target) => target,
            Err(e) => {
                debug!(path = %artifact.path, error = %e, "Skipping artifact outside sandbox");
                return None;
            }
        };

        if let Some(parent) = target.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            warn!(path = %artifact.path, error = %e, "Failed to create artifact directory");
            return None;
        }

        match tokio::fs::write(&target, &artifact.content).await {
            Ok(()) => {
                debug!(path = %target.display(), bytes = artifact.content.len(), "Artifact written");
                Some(target)
            }
            Err(e) => {
                warn!(path = %artifact.path, error = %e, "Failed to write artifact");
                None
            }
        }
    }
}

#[async_trait]
impl ArtifactWriter for FsArtifactWriter {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn write_all(&self, artifacts: &[ParsedArtifact]) -> Vec<PathBuf> {
        if artifacts.is_empty() {
            return Vec::new();
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.root).await {
            warn!(root = %self.root.display(), error = %e, "Cannot create output root");
            return Vec::new();
        }

        let mut written = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            if let Some(path) = self.write_one(artifact).await {
                written.push(path);
            }
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(path: &str, content: &str) -> ParsedArtifact {
        ParsedArtifact {
            path: path.into(),
            content: content.into(),
            language: Some("tsx".into()),
        }
    }

    #[tokio::test]
    async fn write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FsArtifactWriter::new(dir.path());

        let written = writer
            .write_all(&[artifact("Button/Button.tsx", "export const Button = () => null;\n")])
            .await;

        assert_eq!(written.len(), 1);
        let content = std::fs::read_to_string(dir.path().join("Button/Button.tsx")).unwrap();
        assert_eq!(content, "export const Button = () => null;\n");
    }

    #[tokio::test]
    async fn traversal_skipped_rest_of_batch_written() {
        let root = tempfile::tempdir().unwrap();
        let output = root.path().join("out");
        let writer = FsArtifactWriter::new(&output);

        let written = writer
            .write_all(&[
                artifact("../escape.ts", "bad\n"),
                artifact("Card/Card.tsx", "good\n"),
                artifact("/etc/pixelforge-test.ts", "bad\n"),
                artifact("Card/../../escape2.ts", "bad\n"),
                artifact("Card/Card.test.tsx", "good\n"),
            ])
            .await;

        assert_eq!(written.len(), 2);
        assert!(output.join("Card/Card.tsx").exists());
        assert!(output.join("Card/Card.test.tsx").exists());
        assert!(!root.path().join("escape.ts").exists());
        assert!(!root.path().join("escape2.ts").exists());
        assert!(!Path::new("/etc/pixelforge-test.ts").exists());
    }

    #[tokio::test]
    async fn overwrite_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "old\n").unwrap();
        let writer = FsArtifactWriter::new(dir.path());

        writer.write_all(&[artifact("a.ts", "new\n")]).await;
        assert_eq!(std::fs::read_to_string(dir.path().join("a.ts")).unwrap(), "new\n");
    }

    #[tokio::test]
    async fn empty_batch_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("never");
        let writer = FsArtifactWriter::new(&output);
        assert!(writer.write_all(&[]).await.is_empty());
        assert!(!output.exists());
        assert_eq!(writer.root(), output.as_path());
    }
}
