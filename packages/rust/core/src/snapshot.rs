//! In-memory view of the remote categories and articles for one run.
//!
//! Fetched once up front, then owned by the reconciler, which appends the
//! results of successful create/update calls. Nothing is persisted.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use kbsync_markdown::source_path;
use kbsync_remote::KnowledgeBaseClient;
use kbsync_shared::{ArticleStatus, CategoryId, RemoteArticle, RemoteCategory, Result};

#[derive(Debug, Clone, Default)]
pub struct RemoteSnapshot {
    categories: Vec<RemoteCategory>,
    articles: Vec<RemoteArticle>,
}

impl RemoteSnapshot {
    pub fn new(categories: Vec<RemoteCategory>, articles: Vec<RemoteArticle>) -> Self {
        Self {
            categories,
            articles,
        }
    }

    /// Fetch every category, then every category's articles.
    ///
    /// Article listings are independent reads and run concurrently, bounded by
    /// `read_concurrency`. A failed listing is logged and treated as empty; a
    /// failed category listing aborts since nothing can be reconciled without it.
    #[instrument(skip_all)]
    pub async fn fetch(
        client: Arc<dyn KnowledgeBaseClient>,
        read_concurrency: usize,
    ) -> Result<Self> {
        let categories = client.list_categories().await?;
        let semaphore = Arc::new(Semaphore::new(read_concurrency.max(1)));

        let mut handles = Vec::with_capacity(categories.len());
        for category in &categories {
            let id = category.knowledge_category_id;
            let client = client.clone();
            let sem = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await;
                (id, client.list_articles(id).await)
            }));
        }

        let mut articles = Vec::new();
        for handle in handles {
            match handle.await {
                Ok((_, Ok(mut listed))) => articles.append(&mut listed),
                Ok((id, Err(e))) => {
                    warn!(category_id = %id, error = %e, "failed to list articles, treating as empty");
                }
                Err(e) => warn!(error = %e, "article listing task failed"),
            }
        }

        info!(
            categories = categories.len(),
            articles = articles.len(),
            "remote snapshot fetched"
        );

        Ok(Self::new(categories, articles))
    }

    pub fn categories(&self) -> &[RemoteCategory] {
        &self.categories
    }

    pub fn articles(&self) -> &[RemoteArticle] {
        &self.articles
    }

    pub fn category(&self, id: CategoryId) -> Option<&RemoteCategory> {
        self.categories
            .iter()
            .rev()
            .find(|c| c.knowledge_category_id == id)
    }

    /// Record a category returned by the service. Entries are appended, never
    /// replaced: several categories may share a display name.
    pub fn push_category(&mut self, category: RemoteCategory) {
        self.categories.push(category);
    }

    pub fn push_article(&mut self, article: RemoteArticle) {
        self.articles.push(article);
    }

    /// Display names from the root down to `id`, or `None` when the chain is
    /// broken (unknown parent) or cyclic.
    pub fn name_chain(&self, id: CategoryId) -> Option<Vec<String>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(id);

        while let Some(cid) = current {
            if !seen.insert(cid) {
                debug!(category_id = %cid, "cycle in remote category parents");
                return None;
            }
            let category = self.category(cid)?;
            chain.push(category.name.clone());
            current = category.parent_id;
        }

        chain.reverse();
        Some(chain)
    }

    /// The category whose ancestry of display names equals `chain`.
    ///
    /// When several match, the lowest id (the oldest record) wins.
    pub fn find_by_name_chain(&self, chain: &[String]) -> Option<&RemoteCategory> {
        let leaf = chain.last()?;
        self.categories
            .iter()
            .filter(|c| &c.name == leaf)
            .filter(|c| self.name_chain(c.knowledge_category_id).as_deref() == Some(chain))
            .min_by_key(|c| c.knowledge_category_id)
    }

    fn live_articles(&self) -> impl Iterator<Item = &RemoteArticle> {
        self.articles
            .iter()
            .rev()
            .filter(|a| a.status != Some(ArticleStatus::Deleted))
    }

    /// Latest live article called `name` inside `category`.
    pub fn article_named(&self, category: CategoryId, name: &str) -> Option<&RemoteArticle> {
        self.live_articles()
            .find(|a| a.knowledge_category_id == Some(category) && a.name == name)
    }

    /// Latest live article whose body carries the source marker for `path`.
    pub fn article_by_source(&self, path: &str) -> Option<&RemoteArticle> {
        self.live_articles().find(|a| source_path(&a.body) == Some(path))
    }

    /// Latest live article called `name`, in any category.
    pub fn article_titled(&self, name: &str) -> Option<&RemoteArticle> {
        self.live_articles().find(|a| a.name == name)
    }

    /// The remote copy of the file at `path` inside `category`: matched on the
    /// source marker first, then on each of `names` in order.
    pub fn find_article(
        &self,
        category: CategoryId,
        path: &str,
        names: &[String],
    ) -> Option<&RemoteArticle> {
        self.live_articles()
            .find(|a| {
                a.knowledge_category_id == Some(category) && source_path(&a.body) == Some(path)
            })
            .or_else(|| names.iter().find_map(|name| self.article_named(category, name)))
    }
}
