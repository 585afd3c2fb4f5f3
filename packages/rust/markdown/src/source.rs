//! Source-path markers carried inside article bodies.
//!
//! Article names can change (a new `# Title`), so the remote copy is tied to
//! its file by a trailing HTML comment naming the path under the docs root.
//! Renderers drop the comment; the raw body keeps it.

use std::sync::LazyLock;

use regex::Regex;

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^<!-- kbsync-source: (\S+) -->[ \t]*\r?\n?").expect("valid regex")
});

/// The marker line for `path`.
pub fn source_marker(path: &str) -> String {
    format!("<!-- kbsync-source: {path} -->")
}

/// `body` with any existing marker replaced by one for `path`, on its own
/// line at the end.
pub fn with_source_marker(body: &str, path: &str) -> String {
    let stripped = MARKER_RE.replace_all(body, "");
    let trimmed = stripped.trim_end();
    if trimmed.is_empty() {
        source_marker(path)
    } else {
        format!("{trimmed}\n\n{}\n", source_marker(path))
    }
}

/// Path named by the last marker in `body`, if any.
pub fn source_path(body: &str) -> Option<&str> {
    MARKER_RE
        .captures_iter(body)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
