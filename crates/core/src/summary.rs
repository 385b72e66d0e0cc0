//! Run summary returned to the caller.

use crate::artifact::ArtifactKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// A completion phrase was honoured
    Complete,
    /// Fatal failure after at least one file was written
    Partial,
    /// Fatal failure with nothing written
    Error,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Complete => write!(f, "complete"),
            RunStatus::Partial => write!(f, "partial"),
            RunStatus::Error => write!(f, "error"),
        }
    }
}

/// Written files by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactCounts {
    pub components: usize,
    pub tests: usize,
    pub stories: usize,
    pub other: usize,
}

impl ArtifactCounts {
    pub fn tally<P: AsRef<Path>>(paths: &[P]) -> Self {
        let mut counts = Self::default();
        for path in paths {
            match ArtifactKind::classify(path) {
                ArtifactKind::Component => counts.components += 1,
                ArtifactKind::Test => counts.tests += 1,
                ArtifactKind::Story => counts.stories += 1,
                ArtifactKind::Other => counts.other += 1,
            }
        }
        counts
    }
}

/// The result of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub files_written: usize,
    pub counts: ArtifactCounts,

    /// Placeholder, always 0.0 (tests are never executed)
    pub coverage: f64,

    /// Placeholder, always 0.0
    pub parity: f64,

    pub gaps: Vec<String>,
    pub output_root: PathBuf,
    pub written_paths: Vec<PathBuf>,

    /// LLM round trips used
    pub turns: u32,
}

impl RunSummary {
    /// Build a summary from what has been written so far.
    ///
    /// `failure` is `None` for a completed run; otherwise it becomes a gap
    /// entry and the status is `partial` or `error` depending on whether
    /// anything was written.
    pub fn build(
        output_root: impl Into<PathBuf>,
        written_paths: Vec<PathBuf>,
        turns: u32,
        failure: Option<String>,
    ) -> Self {
        let counts = ArtifactCounts::tally(&written_paths);

        let status = match (&failure, written_paths.is_empty()) {
            (None, _) => RunStatus::Complete,
            (Some(_), false) => RunStatus::Partial,
            (Some(_), true) => RunStatus::Error,
        };

        let mut gaps = Vec::new();
        if counts.components > 0 && counts.tests == 0 {
            gaps.push("no test files generated".to_string());
        }
        if counts.components > 0 && counts.stories == 0 {
            gaps.push("no story files generated".to_string());
        }
        if let Some(reason) = failure {
            gaps.push(reason);
        }

        Self {
            status,
            files_written: written_paths.len(),
            counts,
            coverage: 0.0,
            parity: 0.0,
            gaps,
            output_root: output_root.into(),
            written_paths,
            turns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_summary_counts_categories() {
        let summary = RunSummary::build(
            "/out",
            vec![
                PathBuf::from("/out/Button/Button.tsx"),
                PathBuf::from("/out/Button/Button.test.tsx"),
                PathBuf::from("/out/Button/Button.stories.tsx"),
            ],
            3,
            None,
        );
        assert_eq!(summary.status, RunStatus::Complete);
        assert_eq!(summary.files_written, 3);
        assert_eq!(summary.counts.components, 1);
        assert_eq!(summary.counts.tests, 1);
        assert_eq!(summary.counts.stories, 1);
        assert!(summary.gaps.is_empty());
        assert_eq!(summary.coverage, 0.0);
    }

    #[test]
    fn failure_with_files_is_partial() {
        let summary = RunSummary::build(
            "/out",
            vec![PathBuf::from("/out/Card.tsx")],
            5,
            Some("turn budget of 5 exhausted".into()),
        );
        assert_eq!(summary.status, RunStatus::Partial);
        assert!(summary.gaps.contains(&"no test files generated".to_string()));
        assert!(summary.gaps.iter().any(|g| g.contains("turn budget")));
    }

    #[test]
    fn failure_without_files_is_error() {
        let summary = RunSummary::build("/out", vec![], 1, Some("boom".into()));
        assert_eq!(summary.status, RunStatus::Error);
        assert_eq!(summary.gaps, vec!["boom".to_string()]);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["status"], "error");
    }
}
