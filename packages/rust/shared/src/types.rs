//! Core domain types: change-list entries, pending procedures, and the
//! remote service's view of categories and articles.

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Remote knowledge-category identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub u64);

/// Remote article identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleId(pub u64);

/// Remote knowledge-base bucket identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnowledgeBaseId(pub u64);

impl std::fmt::Display for CategoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for ArticleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for KnowledgeBaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ChangeEntry
// ---------------------------------------------------------------------------

/// One added/modified file path, relative to the watched root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeEntry(pub String);

impl ChangeEntry {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChangeEntry {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Procedures
// ---------------------------------------------------------------------------

/// A pending create/update against the remote service, synthesized from a
/// changed path before any remote call is made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "procedureType", rename_all = "lowercase")]
pub enum Procedure {
    Category(CategoryProcedure),
    Article(ArticleProcedure),
}

impl Procedure {
    /// Path of the directory or file this procedure mirrors.
    pub fn path(&self) -> &str {
        match self {
            Procedure::Category(c) => &c.path,
            Procedure::Article(a) => &a.path,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Procedure::Category(c) => &c.name,
            Procedure::Article(a) => &a.name,
        }
    }

    pub fn is_flagged_for_delete(&self) -> bool {
        match self {
            Procedure::Category(c) => c.flagged_for_delete,
            Procedure::Article(a) => a.flagged_for_delete,
        }
    }
}

/// A directory that should exist as a remote category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryProcedure {
    /// Display name.
    pub name: String,
    /// Raw directory segment.
    pub file_name: String,
    /// Path prefix up to and including this directory.
    pub path: String,
    /// The full change-list path this category was decomposed from.
    pub children_path: String,
    #[serde(rename = "parentID")]
    pub parent_id: Option<CategoryId>,
    #[serde(rename = "knowledgeCategoryID")]
    pub knowledge_category_id: Option<CategoryId>,
    #[serde(rename = "knowledgeBaseID")]
    pub knowledge_base_id: KnowledgeBaseId,
    pub description: String,
    /// The directory no longer exists locally; remove it remotely.
    #[serde(default)]
    pub flagged_for_delete: bool,
}

/// A Markdown file that should exist as a remote article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleProcedure {
    /// Display name.
    pub name: String,
    /// Earlier names the remote article may still carry, e.g. the
    /// file-derived name when a `# Title` took over.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Raw file name.
    pub file_name: String,
    /// Full path of the file relative to the watched root.
    pub path: String,
    pub body: String,
    pub format: String,
    pub locale: String,
    #[serde(rename = "knowledgeCategoryID")]
    pub knowledge_category_id: Option<CategoryId>,
    #[serde(rename = "articleID")]
    pub article_id: Option<ArticleId>,
    /// The file no longer exists locally; soft-delete it remotely.
    #[serde(default)]
    pub flagged_for_delete: bool,
}

// ---------------------------------------------------------------------------
// Remote records
// ---------------------------------------------------------------------------

/// The service's view of a knowledge category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCategory {
    #[serde(rename = "knowledgeCategoryID")]
    pub knowledge_category_id: CategoryId,
    pub name: String,
    /// Root categories report `-1` (or omit the field); both map to `None`.
    #[serde(
        rename = "parentID",
        default,
        deserialize_with = "deserialize_parent_id"
    )]
    pub parent_id: Option<CategoryId>,
    #[serde(rename = "knowledgeBaseID", default = "default_kb")]
    pub knowledge_base_id: KnowledgeBaseId,
    #[serde(default)]
    pub article_count: u64,
    #[serde(default)]
    pub child_category_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

fn default_kb() -> KnowledgeBaseId {
    KnowledgeBaseId(1)
}

fn deserialize_parent_id<'de, D>(deserializer: D) -> Result<Option<CategoryId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<i64> = Option::deserialize(deserializer)?;
    Ok(raw
        .filter(|id| *id > 0)
        .map(|id| CategoryId(id as u64)))
}

/// Article lifecycle status. Deletion is a status transition, not a hard delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    Published,
    Deleted,
    Undeleted,
}

/// The service's view of an article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteArticle {
    #[serde(rename = "articleID")]
    pub article_id: ArticleId,
    #[serde(rename = "knowledgeCategoryID")]
    pub knowledge_category_id: Option<CategoryId>,
    pub name: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ArticleStatus>,
    /// Public link to the article.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Counts reported by `GET /knowledge-categories/{id}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCounts {
    #[serde(default)]
    pub article_count: u64,
    #[serde(default)]
    pub article_count_recursive: u64,
    #[serde(default)]
    pub child_category_count: u64,
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Body of a category create call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(rename = "parentID")]
    pub parent_id: Option<CategoryId>,
    #[serde(rename = "knowledgeBaseID")]
    pub knowledge_base_id: KnowledgeBaseId,
}

/// Body of an article create call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewArticle {
    #[serde(rename = "knowledgeCategoryID")]
    pub knowledge_category_id: CategoryId,
    pub name: String,
    pub body: String,
    pub format: String,
    pub locale: String,
}

/// Body of an article update call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateArticle {
    #[serde(rename = "knowledgeCategoryID")]
    pub knowledge_category_id: CategoryId,
    pub name: String,
    pub body: String,
    pub format: String,
}

/// Result of a media upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaUpload {
    pub url: String,
    #[serde(rename = "mediaID")]
    pub media_id: u64,
    #[serde(default)]
    pub name: String,
}
