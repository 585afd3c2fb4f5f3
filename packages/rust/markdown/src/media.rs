//! Local asset references inside Markdown bodies.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// Image file types that get uploaded to the remote media store.
pub const SUPPORTED_MEDIA_TYPES: &[&str] = &["png", "jpg", "jpeg", "gif"];

const ASSETS_PREFIX: &str = "../assets/";

/// Whether `path` ends with one of [`SUPPORTED_MEDIA_TYPES`] (case-insensitive).
pub fn is_supported_media_type(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    SUPPORTED_MEDIA_TYPES
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")))
}

/// Collect relative `../assets/...` link targets of supported media types,
/// in order of first appearance, without duplicates. Targets that climb back
/// out of `assets/` are dropped.
pub fn image_references(markdown: &str) -> Vec<String> {
    static ASSET_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\]\((\.\./assets/[^)\s]+)\)").expect("valid regex")
    });

    let mut refs: Vec<String> = Vec::new();
    for caps in ASSET_RE.captures_iter(markdown) {
        let target = caps[1].to_string();
        if target[ASSETS_PREFIX.len()..].split('/').any(|s| s == "..") {
            debug!(%target, "skipping asset reference leaving the assets directory");
            continue;
        }
        if !is_supported_media_type(&target) {
            debug!(%target, "skipping unsupported asset type");
            continue;
        }
        if !refs.contains(&target) {
            refs.push(target);
        }
    }
    refs
}

/// Replace every literal occurrence of `from` inside link targets with `to`.
pub fn replace_reference(body: &str, from: &str, to: &str) -> String {
    body.replace(&format!("]({from})"), &format!("]({to})"))
}
