//! Client for the remote knowledge-base service.
//!
//! The service models documentation as knowledge categories (folders) and
//! articles (files). [`KnowledgeBaseClient`] is the seam the reconciliation
//! engine talks to; [`HttpKnowledgeBaseClient`] implements it over the
//! service's JSON API.

mod http;

use async_trait::async_trait;
use kbsync_shared::{
    ArticleId, ArticleStatus, CategoryCounts, CategoryId, MediaUpload, NewArticle, NewCategory,
    RemoteArticle, RemoteCategory, Result, UpdateArticle,
};

pub use http::{ClientOptions, HttpKnowledgeBaseClient};

/// Operations the sync engine needs from the remote service.
///
/// Every call may fail with [`kbsync_shared::KbSyncError::Transport`] (the
/// request did not complete) or [`kbsync_shared::KbSyncError::Remote`] (the
/// service answered with an error payload).
#[async_trait]
pub trait KnowledgeBaseClient: Send + Sync {
    /// All knowledge categories across buckets.
    async fn list_categories(&self) -> Result<Vec<RemoteCategory>>;

    /// Current article and child-category counts of one category.
    async fn get_category(&self, id: CategoryId) -> Result<CategoryCounts>;

    async fn create_category(&self, body: &NewCategory) -> Result<RemoteCategory>;

    /// Articles directly inside `category`.
    async fn list_articles(&self, category: CategoryId) -> Result<Vec<RemoteArticle>>;

    async fn create_article(&self, body: &NewArticle) -> Result<RemoteArticle>;

    async fn update_article(&self, id: ArticleId, body: &UpdateArticle) -> Result<RemoteArticle>;

    /// Status transition; `ArticleStatus::Deleted` is how articles are removed.
    async fn set_article_status(
        &self,
        id: ArticleId,
        status: ArticleStatus,
    ) -> Result<RemoteArticle>;

    /// Hard delete. The service rejects non-empty categories.
    async fn delete_category(&self, id: CategoryId) -> Result<()>;

    /// Upload an image and return its hosted URL.
    async fn upload_media(&self, file_name: &str, bytes: Vec<u8>) -> Result<MediaUpload>;
}
