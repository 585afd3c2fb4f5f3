//! Procedure builder: turns a flat change list into an ordered sequence of
//! pending category/article procedures.
//!
//! Hierarchy is inferred from the path strings alone. Every leading directory
//! of a changed file becomes a [`CategoryProcedure`] the first time it is seen
//! in a run, and the file itself becomes an [`ArticleProcedure`]. Ancestors are
//! always emitted before their descendants.

use std::collections::HashSet;

use tracing::{debug, instrument};

use kbsync_markdown::display_name;
use kbsync_shared::{
    AppConfig, ArticleProcedure, CategoryProcedure, ChangeEntry, KnowledgeBaseId, Procedure,
};

/// File-name prefix of directory index pages. Those articles are named after
/// the directory that holds them.
const INDEX_FILE_PREFIX: &str = "index";

// ---------------------------------------------------------------------------
// Defaults & context
// ---------------------------------------------------------------------------

/// Values stamped onto every procedure the builder emits.
#[derive(Debug, Clone)]
pub struct ProcedureDefaults {
    /// Bucket for new categories (the reconciler may re-route release notes).
    pub knowledge_base_id: KnowledgeBaseId,
    /// Article body format.
    pub format: String,
    /// Article locale.
    pub locale: String,
    /// Suffixes that make a leaf segment an article.
    pub extensions: Vec<String>,
}

impl Default for ProcedureDefaults {
    fn default() -> Self {
        Self {
            knowledge_base_id: KnowledgeBaseId(1),
            format: "markdown".into(),
            locale: "en".into(),
            extensions: vec![".md".into()],
        }
    }
}

impl From<&AppConfig> for ProcedureDefaults {
    fn from(config: &AppConfig) -> Self {
        Self {
            knowledge_base_id: KnowledgeBaseId(config.knowledge_bases.docs),
            format: config.sync.format.clone(),
            locale: config.sync.locale.clone(),
            extensions: config.sync.extensions.clone(),
        }
    }
}

/// Mutable state threaded through one build run.
///
/// `handled` holds every path prefix a procedure was already emitted for, so a
/// directory shared by several changed files yields a single category.
#[derive(Debug, Default)]
pub struct BuildContext {
    handled: HashSet<String>,
    procedures: Vec<Procedure>,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Procedures emitted so far, in order.
    pub fn procedures(&self) -> &[Procedure] {
        &self.procedures
    }

    pub fn is_handled(&self, path: &str) -> bool {
        self.handled.contains(path)
    }

    pub fn into_procedures(self) -> Vec<Procedure> {
        self.procedures
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Build the ordered procedure sequence for a whole change list.
///
/// Procedures for entry *i* precede those of entry *i + 1*, except that an
/// ancestor category already emitted for an earlier entry is not repeated.
#[instrument(skip_all, fields(changes = changes.len()))]
pub fn build_procedures(changes: &[ChangeEntry], defaults: &ProcedureDefaults) -> Vec<Procedure> {
    let mut ctx = BuildContext::new();
    for entry in changes {
        decompose(entry, &mut ctx, defaults);
    }

    debug!(procedures = ctx.procedures.len(), "procedures built");
    ctx.into_procedures()
}

/// Decompose one change-list entry into procedures appended to `ctx`.
///
/// Emits a category for each leading directory not yet handled, then one
/// terminal procedure: an article when the leaf carries a document suffix,
/// otherwise a category.
pub fn decompose(entry: &ChangeEntry, ctx: &mut BuildContext, defaults: &ProcedureDefaults) {
    let segments: Vec<&str> = entry
        .as_str()
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    let full_path = segments.join("/");
    let last = segments.len().saturating_sub(1);

    let mut prefix = String::new();
    for (idx, segment) in segments.iter().enumerate() {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(segment);

        // Keyed on the path prefix: a bare segment such as `index.md` repeats
        // across sibling directories.
        if !ctx.handled.insert(prefix.clone()) {
            continue;
        }

        let procedure = if idx == last && is_document(segment, defaults) {
            let parent = idx.checked_sub(1).map(|i| segments[i]);
            Procedure::Article(article_procedure(segment, parent, &full_path, defaults))
        } else {
            Procedure::Category(category_procedure(segment, &prefix, &full_path, defaults))
        };
        ctx.procedures.push(procedure);
    }
}

fn is_document(segment: &str, defaults: &ProcedureDefaults) -> bool {
    defaults
        .extensions
        .iter()
        .any(|ext| segment.len() > ext.len() && segment.ends_with(ext.as_str()))
}

fn category_procedure(
    segment: &str,
    path: &str,
    children_path: &str,
    defaults: &ProcedureDefaults,
) -> CategoryProcedure {
    CategoryProcedure {
        name: display_name(segment),
        file_name: segment.to_string(),
        path: path.to_string(),
        children_path: children_path.to_string(),
        parent_id: None,
        knowledge_category_id: None,
        knowledge_base_id: defaults.knowledge_base_id,
        description: String::new(),
        flagged_for_delete: false,
    }
}

fn article_procedure(
    file_name: &str,
    parent_dir: Option<&str>,
    path: &str,
    defaults: &ProcedureDefaults,
) -> ArticleProcedure {
    ArticleProcedure {
        name: article_name(file_name, parent_dir),
        aliases: Vec::new(),
        file_name: file_name.to_string(),
        path: path.to_string(),
        body: String::new(),
        format: defaults.format.clone(),
        locale: defaults.locale.clone(),
        knowledge_category_id: None,
        article_id: None,
        flagged_for_delete: false,
    }
}

/// Name derived from a document's file name: index pages take their
/// directory's name, other files the part before the first `.`.
pub fn article_name(file_name: &str, parent_dir: Option<&str>) -> String {
    match parent_dir {
        Some(dir) if file_name.starts_with(INDEX_FILE_PREFIX) => display_name(dir),
        _ => display_name(file_name.split('.').next().unwrap_or(file_name)),
    }
}

/// Directory part of a procedure path, `None` for top-level entries.
pub fn parent_path(path: &str) -> Option<&str> {
    path.rfind('/').map(|idx| &path[..idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(paths: &[&str]) -> Vec<ChangeEntry> {
        paths.iter().map(|p| ChangeEntry::from(*p)).collect()
    }

    fn summary(procedures: &[Procedure]) -> Vec<(String, String)> {
        procedures
            .iter()
            .map(|p| match p {
                Procedure::Category(c) => ("category".to_string(), c.path.clone()),
                Procedure::Article(a) => ("article".to_string(), a.path.clone()),
            })
            .collect()
    }

    #[test]
    fn empty_change_list() {
        let procedures = build_procedures(&[], &ProcedureDefaults::default());
        assert!(procedures.is_empty());
    }

    #[test]
    fn shared_directories_are_emitted_once() {
        let procedures = build_procedures(
            &entries(&["docs/guide/a.md", "docs/guide/b.md"]),
            &ProcedureDefaults::default(),
        );

        assert_eq!(
            summary(&procedures),
            vec![
                ("category".into(), "docs".into()),
                ("category".into(), "docs/guide".into()),
                ("article".into(), "docs/guide/a.md".into()),
                ("article".into(), "docs/guide/b.md".into()),
            ]
        );
    }

    #[test]
    fn blog_scenario_order() {
        let procedures = build_procedures(
            &entries(&["blog/post-one.md", "blog/images/diagram.png.md"]),
            &ProcedureDefaults::default(),
        );

        assert_eq!(procedures.len(), 4);
        match &procedures[0] {
            Procedure::Category(c) => {
                assert_eq!(c.path, "blog");
                assert_eq!(c.name, "Blog");
            }
            other => panic!("expected category, got {other:?}"),
        }
        match &procedures[1] {
            Procedure::Article(a) => {
                assert_eq!(a.file_name, "post-one.md");
                assert_eq!(a.path, "blog/post-one.md");
                assert_eq!(a.name, "Post One");
            }
            other => panic!("expected article, got {other:?}"),
        }
        match &procedures[2] {
            Procedure::Category(c) => {
                assert_eq!(c.path, "blog/images");
                assert_eq!(c.children_path, "blog/images/diagram.png.md");
            }
            other => panic!("expected category, got {other:?}"),
        }
        match &procedures[3] {
            Procedure::Article(a) => {
                assert_eq!(a.file_name, "diagram.png.md");
                assert_eq!(a.name, "Diagram");
            }
            other => panic!("expected article, got {other:?}"),
        }
    }

    #[test]
    fn ancestors_precede_descendants() {
        let procedures = build_procedures(
            &entries(&[
                "a/b/c/one.md",
                "a/two.md",
                "a/b/d/three.md",
                "x/y.md",
                "a/b/c/four.md",
            ]),
            &ProcedureDefaults::default(),
        );

        for (idx, procedure) in procedures.iter().enumerate() {
            let mut ancestor = parent_path(procedure.path());
            while let Some(dir) = ancestor {
                let pos = procedures
                    .iter()
                    .position(|p| matches!(p, Procedure::Category(c) if c.path == dir))
                    .unwrap_or_else(|| panic!("missing category for {dir}"));
                assert!(pos < idx, "{dir} must precede {}", procedure.path());
                assert!(procedure.path().starts_with(&format!("{dir}/")));
                ancestor = parent_path(dir);
            }
        }
    }

    #[test]
    fn category_paths_are_unique() {
        let procedures = build_procedures(
            &entries(&["a/b/one.md", "a/b/two.md", "a/c/three.md", "a/b/one.md"]),
            &ProcedureDefaults::default(),
        );
        let paths: Vec<&str> = procedures.iter().map(|p| p.path()).collect();
        let unique: HashSet<&str> = paths.iter().copied().collect();
        assert_eq!(paths.len(), unique.len());
        assert_eq!(paths, vec!["a", "a/b", "a/b/one.md", "a/b/two.md", "a/c", "a/c/three.md"]);
    }

    #[test]
    fn same_directory_name_under_different_parents() {
        let procedures = build_procedures(
            &entries(&["api/guide/a.md", "cli/guide/b.md"]),
            &ProcedureDefaults::default(),
        );
        let categories: Vec<&str> = procedures
            .iter()
            .filter_map(|p| match p {
                Procedure::Category(c) => Some(c.path.as_str()),
                Procedure::Article(_) => None,
            })
            .collect();
        assert_eq!(categories, vec!["api", "api/guide", "cli", "cli/guide"]);
    }

    #[test]
    fn repeated_file_names_in_sibling_directories_are_kept() {
        let procedures = build_procedures(
            &entries(&["docs/a/index.md", "docs/b/index.md"]),
            &ProcedureDefaults::default(),
        );
        let names: Vec<(String, String)> = summary(&procedures);
        assert_eq!(
            names,
            vec![
                ("category".to_string(), "docs".to_string()),
                ("category".to_string(), "docs/a".to_string()),
                ("article".to_string(), "docs/a/index.md".to_string()),
                ("category".to_string(), "docs/b".to_string()),
                ("article".to_string(), "docs/b/index.md".to_string()),
            ]
        );
    }

    #[test]
    fn index_file_takes_directory_name() {
        let procedures = build_procedures(
            &entries(&["getting-started/index.md"]),
            &ProcedureDefaults::default(),
        );
        match &procedures[1] {
            Procedure::Article(a) => {
                assert_eq!(a.name, "Getting Started");
                assert_eq!(a.file_name, "index.md");
            }
            other => panic!("expected article, got {other:?}"),
        }
    }

    #[test]
    fn leaf_without_document_suffix_is_category() {
        let procedures = build_procedures(
            &entries(&["docs/drafts"]),
            &ProcedureDefaults::default(),
        );
        assert_eq!(
            summary(&procedures),
            vec![
                ("category".into(), "docs".into()),
                ("category".into(), "docs/drafts".into()),
            ]
        );
    }

    #[test]
    fn decomposition_is_deterministic() {
        let defaults = ProcedureDefaults::default();
        let entry = ChangeEntry::from("release-notes/2024/q1_summary.md");

        let mut first = BuildContext::new();
        decompose(&entry, &mut first, &defaults);
        let mut second = BuildContext::new();
        decompose(&entry, &mut second, &defaults);

        assert_eq!(first.procedures(), second.procedures());
        assert!(first.is_handled("release-notes/2024"));
    }

    #[test]
    fn context_threads_handled_set_across_entries() {
        let defaults = ProcedureDefaults::default();
        let mut ctx = BuildContext::new();
        decompose(&ChangeEntry::from("docs/a.md"), &mut ctx, &defaults);
        assert_eq!(ctx.procedures().len(), 2);

        decompose(&ChangeEntry::from("docs/b.md"), &mut ctx, &defaults);
        assert_eq!(ctx.procedures().len(), 3);
    }

    #[test]
    fn procedures_carry_defaults() {
        let defaults = ProcedureDefaults {
            knowledge_base_id: KnowledgeBaseId(5),
            format: "markdown".into(),
            locale: "fr".into(),
            extensions: vec![".md".into()],
        };
        let procedures = build_procedures(&entries(&["guide/a.md"]), &defaults);
        match (&procedures[0], &procedures[1]) {
            (Procedure::Category(c), Procedure::Article(a)) => {
                assert_eq!(c.knowledge_base_id, KnowledgeBaseId(5));
                assert!(c.parent_id.is_none() && c.knowledge_category_id.is_none());
                assert_eq!(a.locale, "fr");
                assert!(a.article_id.is_none() && a.knowledge_category_id.is_none());
            }
            other => panic!("unexpected procedures {other:?}"),
        }
    }

    #[test]
    fn parent_path_helper() {
        assert_eq!(parent_path("a/b/c.md"), Some("a/b"));
        assert_eq!(parent_path("a"), None);
    }
}
