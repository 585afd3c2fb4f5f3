//! Relative links between Markdown documents.

use std::sync::LazyLock;

use regex::Regex;

/// Relative `./` or `../` link targets ending in `.md`, without any
/// `#fragment`, in order of first appearance.
pub fn internal_links(markdown: &str) -> Vec<String> {
    static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\]\((\.{1,2}/[^)\s#]+\.md)(?:#[^)\s]*)?\)").expect("valid regex")
    });

    let mut links: Vec<String> = Vec::new();
    for caps in LINK_RE.captures_iter(markdown) {
        let target = caps[1].to_string();
        if !links.contains(&target) {
            links.push(target);
        }
    }
    links
}

/// Point every link to `from` at `to`, keeping `#fragment` suffixes.
pub fn replace_link(body: &str, from: &str, to: &str) -> String {
    body.replace(&format!("]({from})"), &format!("]({to})"))
        .replace(&format!("]({from}#"), &format!("]({to}#"))
}

/// Resolve `link` against the directory `from_dir` (both `/`-separated and
/// relative to the docs root). `None` when the result would leave the root.
pub fn resolve_relative(from_dir: Option<&str>, link: &str) -> Option<String> {
    let mut segments: Vec<&str> = from_dir
        .map(|d| d.split('/').filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    for part in link.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }

    (!segments.is_empty()).then(|| segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_relative_doc_links() {
        let body = "[b](./b.md) [c](../other/c.md#setup) [web](https://x.io/a.md) \
                    ![img](../assets/a.png) [again](./b.md#top) [abs](/root.md)";
        assert_eq!(
            internal_links(body),
            vec!["./b.md".to_string(), "../other/c.md".to_string()]
        );
    }

    #[test]
    fn replaces_plain_and_fragment_links() {
        let body = "[b](./b.md) and [b2](./b.md#install) but not ./b.md";
        let out = replace_link(body, "./b.md", "https://kb.example.com/kb/articles/3");
        assert_eq!(
            out,
            "[b](https://kb.example.com/kb/articles/3) and \
             [b2](https://kb.example.com/kb/articles/3#install) but not ./b.md"
        );
    }

    #[test]
    fn resolves_against_directory() {
        assert_eq!(resolve_relative(Some("guide"), "./b.md"), Some("guide/b.md".into()));
        assert_eq!(
            resolve_relative(Some("guide/setup"), "../../other/c.md"),
            Some("other/c.md".into())
        );
        assert_eq!(resolve_relative(None, "./top.md"), Some("top.md".into()));
        assert_eq!(resolve_relative(Some("guide"), "../../escape.md"), None);
    }
}
