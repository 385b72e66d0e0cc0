//! Path validation: sandboxing generated files to an output root.
//!
//! Artifact paths come straight from model output and are untrusted. A path
//! is accepted only if it is relative, has no parent-directory segments, and
//! its deepest existing ancestor still resolves (through symlinks) under the
//! canonical root.

use std::path::{Component, Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' is empty")]
    Empty { path: String },

    #[error("Path '{path}' is absolute")]
    Absolute { path: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Path '{path}' resolves outside the sandbox root")]
    OutsideRoot { path: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Resolve `relative` under `root`, refusing anything that would land
/// outside it.
///
/// The root itself must exist. The target and its parents need not; the
/// check walks up to the deepest existing ancestor and canonicalizes that,
/// which catches symlinked directories pointing elsewhere.
///
/// Returns the absolute target path (root canonicalized, remainder joined).
pub fn resolve_sandboxed(root: &Path, relative: &str) -> Result<PathBuf, PathValidationError> {
    let trimmed = relative.trim();
    if trimmed.is_empty() {
        return Err(PathValidationError::Empty {
            path: relative.into(),
        });
    }

    // Backslashes are separators as far as untrusted input is concerned
    let normalized = trimmed.replace('\\', "/");
    let candidate = Path::new(&normalized);

    if candidate.is_absolute() || normalized.starts_with('/') || has_drive_prefix(&normalized) {
        return Err(PathValidationError::Absolute {
            path: relative.into(),
        });
    }

    let mut clean = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(PathValidationError::PathTraversal {
                    path: relative.into(),
                });
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathValidationError::Absolute {
                    path: relative.into(),
                });
            }
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(PathValidationError::Empty {
            path: relative.into(),
        });
    }

    let canonical_root = root
        .canonicalize()
        .map_err(|e| PathValidationError::CanonicalizeFailed {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;

    let target = canonical_root.join(&clean);

    // Deepest ancestor that exists on disk
    let mut existing = target.as_path();
    while !existing.exists() {
        match existing.parent() {
            Some(parent) => existing = parent,
            None => break,
        }
    }

    let resolved = existing
        .canonicalize()
        .map_err(|e| PathValidationError::CanonicalizeFailed {
            path: relative.into(),
            reason: e.to_string(),
        })?;

    if !resolved.starts_with(&canonical_root) {
        return Err(PathValidationError::OutsideRoot {
            path: relative.into(),
        });
    }

    Ok(target)
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_relative_path_resolves_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_sandboxed(dir.path(), "Button/Button.tsx").unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
        assert!(resolved.ends_with("Button/Button.tsx"));
    }

    #[test]
    fn current_dir_segments_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_sandboxed(dir.path(), "./src/./a.ts").unwrap();
        assert!(resolved.ends_with("src/a.ts"));
    }

    #[test]
    fn path_traversal_blocked() {
        let dir = tempfile::tempdir().unwrap();
        match resolve_sandboxed(dir.path(), "../../../etc/passwd").unwrap_err() {
            PathValidationError::PathTraversal { .. } => {}
            other => panic!("Expected PathTraversal, got: {other}"),
        }
        assert!(resolve_sandboxed(dir.path(), "src/../../escape.ts").is_err());
        assert!(resolve_sandboxed(dir.path(), "src\\..\\..\\escape.ts").is_err());
    }

    #[test]
    fn absolute_paths_blocked() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve_sandboxed(dir.path(), "/etc/passwd"),
            Err(PathValidationError::Absolute { .. })
        ));
        assert!(matches!(
            resolve_sandboxed(dir.path(), "C:/Windows/system.ini"),
            Err(PathValidationError::Absolute { .. })
        ));
    }

    #[test]
    fn empty_paths_blocked() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_sandboxed(dir.path(), "   ").is_err());
        assert!(resolve_sandboxed(dir.path(), "./").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_blocked() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("link")).unwrap();

        match resolve_sandboxed(root.path(), "link/evil.ts").unwrap_err() {
            PathValidationError::OutsideRoot { .. } => {}
            other => panic!("Expected OutsideRoot, got: {other}"),
        }
    }

    #[test]
    fn missing_root_fails() {
        let result = resolve_sandboxed(Path::new("/nonexistent/pixelforge-root"), "a.ts");
        assert!(matches!(
            result,
            Err(PathValidationError::CanonicalizeFailed { .. })
        ));
    }
}
