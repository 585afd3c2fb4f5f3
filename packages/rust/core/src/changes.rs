//! Change list intake: a newline-separated list of changed paths, either read
//! from a file or produced by `git diff --name-only`.

use std::collections::HashSet;
use std::path::Path;
use std::process::Command;

use tracing::{debug, instrument};

use kbsync_shared::{ChangeEntry, KbSyncError, Result, SyncSettings};

/// Which paths of a change list are mirrored.
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    /// Repository-relative directory holding the documentation tree.
    pub watched_dir: String,
    /// Accepted file suffixes.
    pub extensions: Vec<String>,
}

impl From<&SyncSettings> for ChangeFilter {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            watched_dir: settings.watched_dir.clone(),
            extensions: settings.extensions.clone(),
        }
    }
}

impl ChangeFilter {
    /// Strip the watched-dir prefix from `line`, or `None` if the path is
    /// outside it or has an unsupported suffix.
    fn accept<'a>(&self, line: &'a str) -> Option<&'a str> {
        let path = line.strip_prefix("./").unwrap_or(line);
        let dir = self.watched_dir.trim_matches('/');

        let relative = if dir.is_empty() {
            path
        } else {
            path.strip_prefix(dir)?.strip_prefix('/')?
        };

        let supported = self.extensions.iter().any(|ext| relative.ends_with(ext.as_str()));
        (supported && !relative.is_empty()).then_some(relative)
    }
}

/// Parse a change list into entries relative to the watched directory.
pub fn parse_change_list(text: &str, filter: &ChangeFilter) -> Vec<ChangeEntry> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match filter.accept(line) {
            Some(relative) if seen.insert(relative.to_string()) => {
                entries.push(ChangeEntry::from(relative));
            }
            Some(_) => {}
            None => debug!(path = line, "ignoring change outside watched tree"),
        }
    }

    entries
}

/// Read and parse a change list file.
pub fn read_change_list(path: &Path, filter: &ChangeFilter) -> Result<Vec<ChangeEntry>> {
    let text = std::fs::read_to_string(path).map_err(|e| KbSyncError::io(path, e))?;
    Ok(parse_change_list(&text, filter))
}

/// Files changed in `repo` relative to `base`, per `git diff --name-only`.
#[instrument(skip_all, fields(repo = %repo.display(), base))]
pub fn git_change_list(repo: &Path, base: &str, filter: &ChangeFilter) -> Result<Vec<ChangeEntry>> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(["diff", "--name-only", base])
        .output()
        .map_err(|e| KbSyncError::Git(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(KbSyncError::Git(format!(
            "git diff against {base} failed: {}",
            stderr.trim()
        )));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    Ok(parse_change_list(&text, filter))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> ChangeFilter {
        ChangeFilter::from(&SyncSettings::default())
    }

    fn paths(entries: &[ChangeEntry]) -> Vec<&str> {
        entries.iter().map(ChangeEntry::as_str).collect()
    }

    #[test]
    fn keeps_watched_markdown_only() {
        let text = "\
knowledgeBase/blog/posts/a.md
src/main.rs
knowledgeBase/assets/logo.png
README.md
./knowledgeBase/guide.md
";
        let entries = parse_change_list(text, &filter());
        assert_eq!(paths(&entries), vec!["blog/posts/a.md", "guide.md"]);
    }

    #[test]
    fn trims_and_dedupes_keeping_first() {
        let text = "  knowledgeBase/b.md \r\n\nknowledgeBase/a.md\nknowledgeBase/b.md\n";
        let entries = parse_change_list(text, &filter());
        assert_eq!(paths(&entries), vec!["b.md", "a.md"]);
    }

    #[test]
    fn prefix_must_be_a_whole_directory() {
        let entries = parse_change_list("knowledgeBaseOld/a.md\n", &filter());
        assert!(entries.is_empty());
    }

    #[test]
    fn empty_watched_dir_accepts_everything_supported() {
        let filter = ChangeFilter {
            watched_dir: String::new(),
            extensions: vec![".md".into(), ".markdown".into()],
        };
        let entries = parse_change_list("docs/a.md\nnotes/b.markdown\nc.txt\n", &filter);
        assert_eq!(paths(&entries), vec!["docs/a.md", "notes/b.markdown"]);
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("changes.txt");
        std::fs::write(&path, "knowledgeBase/x/y.md\n").unwrap();

        let entries = read_change_list(&path, &filter()).unwrap();
        assert_eq!(paths(&entries), vec!["x/y.md"]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_change_list(Path::new("/nonexistent/changes.txt"), &filter()).unwrap_err();
        assert!(matches!(err, KbSyncError::Io { .. }));
    }

    #[test]
    fn git_outside_repository_is_git_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = git_change_list(dir.path(), "HEAD", &filter()).unwrap_err();
        assert!(matches!(err, KbSyncError::Git(_)));
    }
}
