//! In-memory [`KnowledgeBaseClient`] for tests.
//!
//! Models just enough of the service: counts are derived from live state, so
//! soft-deleting articles or deleting child categories changes what
//! `get_category` reports, and non-empty categories refuse hard deletes.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use kbsync_remote::KnowledgeBaseClient;
use kbsync_shared::{
    ArticleId, ArticleStatus, CategoryCounts, CategoryId, KbSyncError, KnowledgeBaseId,
    MediaUpload, NewArticle, NewCategory, RemoteArticle, RemoteCategory, Result, UpdateArticle,
};

/// One recorded client call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    ListCategories,
    GetCategory(u64),
    CreateCategory {
        name: String,
        parent: Option<u64>,
        kb: u64,
    },
    ListArticles(u64),
    CreateArticle {
        name: String,
        category: u64,
    },
    UpdateArticle(u64),
    SetStatus(u64, ArticleStatus),
    DeleteCategory(u64),
    UploadMedia(String),
}

impl Call {
    pub(crate) fn is_write(&self) -> bool {
        !matches!(
            self,
            Call::ListCategories | Call::GetCategory(_) | Call::ListArticles(_)
        )
    }
}

#[derive(Default)]
struct State {
    categories: BTreeMap<u64, RemoteCategory>,
    articles: BTreeMap<u64, RemoteArticle>,
    next_id: u64,
    calls: Vec<Call>,
    failing_creates: HashSet<String>,
    failing_counts: HashSet<u64>,
    failing_status: HashSet<u64>,
}

impl State {
    fn counts(&self, id: u64) -> CategoryCounts {
        let article_count = self
            .articles
            .values()
            .filter(|a| {
                a.knowledge_category_id == Some(CategoryId(id))
                    && a.status != Some(ArticleStatus::Deleted)
            })
            .count() as u64;
        let child_category_count = self
            .categories
            .values()
            .filter(|c| c.parent_id == Some(CategoryId(id)))
            .count() as u64;
        CategoryCounts {
            article_count,
            article_count_recursive: article_count,
            child_category_count,
        }
    }

    fn with_counts(&self, category: &RemoteCategory) -> RemoteCategory {
        let counts = self.counts(category.knowledge_category_id.0);
        RemoteCategory {
            article_count: counts.article_count,
            child_category_count: counts.child_category_count,
            ..category.clone()
        }
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

pub(crate) struct FakeClient {
    state: Mutex<State>,
}

/// Build a remote category record.
pub(crate) fn category(id: u64, name: &str, parent: Option<u64>) -> RemoteCategory {
    RemoteCategory {
        knowledge_category_id: CategoryId(id),
        name: name.to_string(),
        parent_id: parent.map(CategoryId),
        knowledge_base_id: KnowledgeBaseId(1),
        article_count: 0,
        child_category_count: 0,
        url: None,
    }
}

/// Build a remote article record.
pub(crate) fn article(id: u64, category: u64, name: &str) -> RemoteArticle {
    RemoteArticle {
        article_id: ArticleId(id),
        knowledge_category_id: Some(CategoryId(category)),
        name: name.to_string(),
        body: String::new(),
        format: Some("markdown".into()),
        locale: Some("en".into()),
        status: Some(ArticleStatus::Published),
        url: Some(format!("https://kb.example.com/kb/articles/{id}")),
    }
}

impl FakeClient {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1000,
                ..State::default()
            }),
        }
    }

    pub(crate) fn with_category(self, id: u64, name: &str, parent: Option<u64>) -> Self {
        self.lock().categories.insert(id, category(id, name, parent));
        self
    }

    pub(crate) fn with_article(self, id: u64, category: u64, name: &str) -> Self {
        self.lock().articles.insert(id, article(id, category, name));
        self
    }

    /// Make `create_category` fail for this display name.
    pub(crate) fn failing_create(self, name: &str) -> Self {
        self.lock().failing_creates.insert(name.to_string());
        self
    }

    /// Make `get_category` fail with a transport error for this id.
    pub(crate) fn failing_counts(self, id: u64) -> Self {
        self.lock().failing_counts.insert(id);
        self
    }

    /// Make `set_article_status` fail for this article.
    pub(crate) fn failing_status(self, id: u64) -> Self {
        self.lock().failing_status.insert(id);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub(crate) fn writes(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_write).collect()
    }

    pub(crate) fn has_category(&self, id: u64) -> bool {
        self.lock().categories.contains_key(&id)
    }

    pub(crate) fn article_status(&self, id: u64) -> Option<ArticleStatus> {
        self.lock().articles.get(&id).and_then(|a| a.status)
    }

    pub(crate) fn article_body(&self, id: u64) -> Option<String> {
        self.lock().articles.get(&id).map(|a| a.body.clone())
    }

    /// Seed an article whose body carries raw Markdown, e.g. a source marker.
    pub(crate) fn with_article_body(self, id: u64, category: u64, name: &str, body: &str) -> Self {
        let seeded = RemoteArticle {
            body: body.to_string(),
            ..article(id, category, name)
        };
        self.lock().articles.insert(id, seeded);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake client state poisoned")
    }
}

#[async_trait]
impl KnowledgeBaseClient for FakeClient {
    async fn list_categories(&self) -> Result<Vec<RemoteCategory>> {
        let mut state = self.lock();
        state.calls.push(Call::ListCategories);
        Ok(state
            .categories
            .values()
            .map(|c| state.with_counts(c))
            .collect())
    }

    async fn get_category(&self, id: CategoryId) -> Result<CategoryCounts> {
        let mut state = self.lock();
        state.calls.push(Call::GetCategory(id.0));
        if state.failing_counts.contains(&id.0) {
            return Err(KbSyncError::Transport("connection reset".into()));
        }
        if !state.categories.contains_key(&id.0) {
            return Err(KbSyncError::remote(404, "Category not found"));
        }
        Ok(state.counts(id.0))
    }

    async fn create_category(&self, body: &NewCategory) -> Result<RemoteCategory> {
        let mut state = self.lock();
        state.calls.push(Call::CreateCategory {
            name: body.name.clone(),
            parent: body.parent_id.map(|p| p.0),
            kb: body.knowledge_base_id.0,
        });
        if state.failing_creates.contains(&body.name) {
            return Err(KbSyncError::remote(422, "category rejected"));
        }
        let id = state.allocate_id();
        let created = RemoteCategory {
            knowledge_base_id: body.knowledge_base_id,
            ..category(id, &body.name, body.parent_id.map(|p| p.0))
        };
        state.categories.insert(id, created.clone());
        Ok(created)
    }

    async fn list_articles(&self, category: CategoryId) -> Result<Vec<RemoteArticle>> {
        let mut state = self.lock();
        state.calls.push(Call::ListArticles(category.0));
        Ok(state
            .articles
            .values()
            .filter(|a| a.knowledge_category_id == Some(category))
            .cloned()
            .collect())
    }

    async fn create_article(&self, body: &NewArticle) -> Result<RemoteArticle> {
        let mut state = self.lock();
        state.calls.push(Call::CreateArticle {
            name: body.name.clone(),
            category: body.knowledge_category_id.0,
        });
        if !state.categories.contains_key(&body.knowledge_category_id.0) {
            return Err(KbSyncError::remote(422, "unknown knowledgeCategoryID"));
        }
        let id = state.allocate_id();
        let created = RemoteArticle {
            body: body.body.clone(),
            ..article(id, body.knowledge_category_id.0, &body.name)
        };
        state.articles.insert(id, created.clone());
        Ok(created)
    }

    async fn update_article(&self, id: ArticleId, body: &UpdateArticle) -> Result<RemoteArticle> {
        let mut state = self.lock();
        state.calls.push(Call::UpdateArticle(id.0));
        let existing = state
            .articles
            .get_mut(&id.0)
            .ok_or_else(|| KbSyncError::remote(404, "Article not found"))?;
        existing.body = body.body.clone();
        existing.name = body.name.clone();
        existing.knowledge_category_id = Some(body.knowledge_category_id);
        Ok(existing.clone())
    }

    async fn set_article_status(
        &self,
        id: ArticleId,
        status: ArticleStatus,
    ) -> Result<RemoteArticle> {
        let mut state = self.lock();
        state.calls.push(Call::SetStatus(id.0, status));
        if state.failing_status.contains(&id.0) {
            return Err(KbSyncError::Transport("timed out".into()));
        }
        let existing = state
            .articles
            .get_mut(&id.0)
            .ok_or_else(|| KbSyncError::remote(404, "Article not found"))?;
        existing.status = Some(status);
        Ok(existing.clone())
    }

    async fn delete_category(&self, id: CategoryId) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::DeleteCategory(id.0));
        let counts = state.counts(id.0);
        if counts.article_count != 0 || counts.child_category_count != 0 {
            return Err(KbSyncError::remote(409, "category is not empty"));
        }
        state
            .categories
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| KbSyncError::remote(404, "Category not found"))
    }

    async fn upload_media(&self, file_name: &str, _bytes: Vec<u8>) -> Result<MediaUpload> {
        let mut state = self.lock();
        state.calls.push(Call::UploadMedia(file_name.to_string()));
        let media_id = state.allocate_id();
        Ok(MediaUpload {
            url: format!("https://cdn.example.com/{media_id}/{file_name}"),
            media_id,
            name: file_name.to_string(),
        })
    }
}
