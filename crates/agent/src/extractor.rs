//! Artifact extraction from free-form model output.
//!
//! The model is told to emit each file as a fenced block whose opening line
//! carries a language tag and the relative path:
//!
//! ````text
//! ```tsx Button/Button.tsx
//! export const Button = () => <button />;
//! ```
//! ````
//!
//! Models drift from that contract, so the path is resolved with a fixed
//! priority: a `filename=` attribute, the bare metadata, a path comment on
//! the first body line, then a label or heading just above the fence.
//! Blocks that resolve to no path, or that have no content, are dropped.

use pixelforge_core::artifact::ParsedArtifact;
use regex_lite::Regex;
use std::sync::LazyLock;
use tracing::debug;

const FENCE: &str = "```";

/// How far above a fence to look for a path label.
const LOOKBACK_CHARS: usize = 300;

/// Extensions accepted as "looks like a file path".
const KNOWN_EXTENSIONS: &[&str] = &[
    "tsx", "ts", "jsx", "js", "mjs", "cjs", "vue", "svelte", "astro", "css", "scss", "sass",
    "less", "html", "json", "md", "mdx", "yaml", "yml", "toml", "svg", "xml", "graphql", "py",
    "rs", "go", "java", "kt", "swift", "dart", "rb", "php", "sh", "txt",
];

static FILE_ATTRIBUTE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:filename|file|path|title)\s*=\s*(?:"([^"]+)"|'([^']+)'|([^\s"']+))"#).ok()
});

/// `File: src/a.ts`, `- **Path**: src/a.ts`
static LABEL_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(?:[-*]\s+)?(?:\*\*|__)?[A-Za-z][\w ]{0,30}(?:\*\*|__)?\s*:\s*(?:\*\*|__)?(.+)$").ok()
});

/// `### src/a.ts`
static HEADING_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^#{1,6}\s+(.+)$").ok());

/// `**src/a.ts**`, `` `src/a.ts` ``, optionally list-marked or colon-terminated
static EMPHASIS_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(?:[-*]\s+|\d+\.\s+)?(?:\*\*`?([^*`]+)`?\*\*|`([^`]+)`):?$").ok()
});

/// A fenced region located in the text, before path resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock {
    /// Short language tag, if the opening line had one
    pub tag: Option<String>,

    /// Whatever followed the tag on the opening line, trimmed
    pub metadata: String,

    /// Lines strictly between the fences, joined with `\n`
    pub body: String,

    /// Byte offset of the opening fence line
    pub start: usize,
}

/// True if the text contains anything that could open a fence.
pub fn has_fence(text: &str) -> bool {
    text.contains(FENCE)
}

/// Locate every terminated fenced block, in order.
///
/// The opening line is split on horizontal whitespace only; a newline is
/// never a separator between the tag and the metadata.
pub fn scan_fences(text: &str) -> Vec<FencedBlock> {
    let mut blocks = Vec::new();
    let mut open: Option<(Option<String>, String, usize)> = None;
    let mut body: Vec<&str> = Vec::new();
    let mut offset = 0;

    for raw in text.split_inclusive('\n') {
        let line_start = offset;
        offset += raw.len();
        let line = raw.trim_end_matches(['\n', '\r']);

        match open.take() {
            None => {
                if let Some(info) = opening_info(line) {
                    let (tag, metadata) = split_info(info);
                    open = Some((tag, metadata, line_start));
                    body.clear();
                }
            }
            Some((tag, metadata, start)) => {
                if line.trim() == FENCE {
                    blocks.push(FencedBlock {
                        tag,
                        metadata,
                        body: body.join("\n"),
                        start,
                    });
                    body.clear();
                } else {
                    body.push(line);
                    open = Some((tag, metadata, start));
                }
            }
        }
    }

    // An unterminated fence yields nothing
    blocks
}

/// Extract every path-labeled, non-empty artifact from model output.
pub fn extract_artifacts(text: &str) -> Vec<ParsedArtifact> {
    scan_fences(text)
        .into_iter()
        .filter_map(|block| resolve_block(text, block))
        .collect()
}

fn resolve_block(text: &str, block: FencedBlock) -> Option<ParsedArtifact> {
    if block.body.trim().is_empty() {
        debug!(start = block.start, "Skipping empty fenced block");
        return None;
    }

    let mut body = block.body.as_str();
    let path = path_from_attribute(&block.metadata)
        .or_else(|| path_from_metadata(&block.metadata))
        .or_else(|| {
            let (first, rest) = body.split_once('\n').unwrap_or((body, ""));
            let path = path_from_comment(first)?;
            body = rest;
            Some(path)
        })
        .or_else(|| path_from_lookback(&text[..block.start]));

    let Some(path) = path else {
        debug!(start = block.start, tag = ?block.tag, "Skipping fenced block without a path");
        return None;
    };

    let content = body.trim_end();
    if content.trim().is_empty() {
        return None;
    }

    Some(ParsedArtifact {
        path,
        content: format!("{content}\n"),
        language: block.tag,
    })
}

/// The text after ``` on an opening fence line.
fn opening_info(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix(FENCE)?;
    if rest.starts_with('`') {
        return None;
    }
    Some(rest.trim())
}

fn split_info(info: &str) -> (Option<String>, String) {
    let (first, rest) = match info.find([' ', '\t']) {
        Some(i) => (&info[..i], info[i..].trim()),
        None => (info, ""),
    };

    if first.is_empty() {
        return (None, String::new());
    }
    if is_language_tag(first) {
        (Some(first.to_string()), rest.to_string())
    } else {
        (None, info.to_string())
    }
}

fn is_language_tag(token: &str) -> bool {
    token.len() <= 20
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '#' | '_'))
}

fn path_from_attribute(metadata: &str) -> Option<String> {
    let caps = FILE_ATTRIBUTE.as_ref()?.captures(metadata)?;
    let raw = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))?;
    normalize_path(raw.as_str())
}

fn path_from_metadata(metadata: &str) -> Option<String> {
    let candidate = strip_wrappers(metadata);
    if candidate.contains(char::is_whitespace) {
        return None;
    }
    looks_like_path(candidate).then(|| normalize_path(candidate)).flatten()
}

fn path_from_comment(line: &str) -> Option<String> {
    let line = line.trim();
    let inner = if let Some(rest) = line.strip_prefix("<!--") {
        rest.strip_suffix("-->")?
    } else if let Some(rest) = line.strip_prefix("/*") {
        rest.strip_suffix("*/")?
    } else if let Some(rest) = line.strip_prefix("//") {
        rest
    } else if let Some(rest) = line.strip_prefix("--") {
        rest
    } else if let Some(rest) = line.strip_prefix('#') {
        rest
    } else {
        return None;
    };

    let inner = inner.trim();
    // `// File: src/a.ts` as well as `// src/a.ts`
    let inner = match inner.split_once(':') {
        Some((label, rest)) if is_label(label) => rest.trim(),
        _ => inner,
    };
    let candidate = strip_wrappers(inner);
    if candidate.contains(char::is_whitespace) || !looks_like_path(candidate) {
        return None;
    }
    normalize_path(candidate)
}

fn path_from_lookback(before: &str) -> Option<String> {
    let window = tail_chars(before, LOOKBACK_CHARS);
    let line = window.lines().rev().map(str::trim).find(|l| !l.is_empty())?;

    if let Some(caps) = EMPHASIS_LINE.as_ref().and_then(|re| re.captures(line)) {
        let raw = caps.get(1).or_else(|| caps.get(2))?;
        return path_token(raw.as_str());
    }
    if let Some(caps) = HEADING_LINE.as_ref().and_then(|re| re.captures(line)) {
        return caps.get(1).and_then(|m| first_path_token(m.as_str()));
    }
    if let Some(caps) = LABEL_LINE.as_ref().and_then(|re| re.captures(line)) {
        return caps.get(1).and_then(|m| path_token(m.as_str()));
    }
    None
}

fn tail_chars(text: &str, max: usize) -> &str {
    match text.char_indices().rev().nth(max.saturating_sub(1)) {
        Some((i, _)) => &text[i..],
        None => text,
    }
}

fn is_label(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "file" | "filename" | "path" | "filepath"
    )
}

/// A single path token, ignoring emphasis and quoting.
fn path_token(raw: &str) -> Option<String> {
    let candidate = strip_wrappers(raw);
    if candidate.contains(char::is_whitespace) || !looks_like_path(candidate) {
        return None;
    }
    normalize_path(candidate)
}

/// The first whitespace-separated token of a heading that looks like a path.
fn first_path_token(heading: &str) -> Option<String> {
    heading.split_whitespace().find_map(path_token)
}

fn strip_wrappers(s: &str) -> &str {
    s.trim()
        .trim_end_matches(':')
        .trim_matches(|c| matches!(c, '*' | '_' | '`' | '"' | '\'' | '(' | ')'))
        .trim()
}

fn looks_like_path(candidate: &str) -> bool {
    if candidate.is_empty() || candidate.contains("://") {
        return false;
    }
    if !candidate
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '/' | '\\' | '.' | '_' | '-' | '@' | '[' | ']' | '+'))
    {
        return false;
    }
    let file = candidate.rsplit(['/', '\\']).next().unwrap_or(candidate);
    match file.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty() && KNOWN_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        }
        None => false,
    }
}

fn normalize_path(raw: &str) -> Option<String> {
    let path = raw.trim().replace('\\', "/");
    let path = path.trim_start_matches("./");
    (!path.is_empty()).then(|| path.to_string())
}
