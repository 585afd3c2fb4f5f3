//! Display names for categories and articles.

use std::sync::LazyLock;

use regex::Regex;

/// Turn a raw directory or file name into a display title.
///
/// Strips a trailing extension, turns `/`, `_` and `-` into spaces, collapses
/// whitespace and upper-cases the first letter of every word. The rest of
/// each word is left alone so acronyms survive (`api-CLI` → `Api CLI`).
pub fn display_name(raw: &str) -> String {
    let stem = strip_extension(raw);

    stem.replace(['/', '_', '-'], " ")
        .split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract the first level-one heading of a Markdown document.
pub fn title_from_body(markdown: &str) -> Option<String> {
    static H1_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^#[ \t]+(.+?)[ \t#]*$").expect("valid regex")
    });

    let mut in_fence = false;
    for line in markdown.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(caps) = H1_RE.captures(line) {
            let title = caps[1].trim();
            if !title.is_empty() {
                return Some(title.to_string());
            }
        }
    }
    None
}

fn strip_extension(raw: &str) -> &str {
    match raw.rfind('.') {
        // Dotfiles keep their name.
        Some(0) | None => raw,
        Some(idx) => &raw[..idx],
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) => {
            let upper: String = c.to_uppercase().collect();
            format!("{upper}{}", chars.as_str())
        }
        None => String::new(),
    }
}
