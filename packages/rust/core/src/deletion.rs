//! Cascading category deletion.
//!
//! The service refuses to delete a category that still holds articles or
//! child categories, so removal works bottom-up: soft-delete the articles,
//! recurse into children, and hard-delete only once both counts read zero.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use kbsync_remote::KnowledgeBaseClient;
use kbsync_shared::{ArticleId, ArticleStatus, CategoryId};

/// Remove `root` and everything beneath it.
///
/// Returns `true` when the subtree is gone (or was already gone) and `false`
/// when a step made no progress: an article could not be soft-deleted, a
/// reported child could not be found, or the final delete was refused.
/// Without `confirmed` nothing is touched and `true` is returned.
#[instrument(skip_all, fields(root = %root, confirmed))]
pub async fn delete_category(
    client: &dyn KnowledgeBaseClient,
    root: CategoryId,
    confirmed: bool,
) -> bool {
    if !confirmed {
        info!("deletion not confirmed, leaving category in place");
        return true;
    }

    let mut stack = vec![root];
    let mut attempted_articles: HashSet<ArticleId> = HashSet::new();
    let mut visited_children: HashSet<CategoryId> = HashSet::new();

    while let Some(&current) = stack.last() {
        let counts = match client.get_category(current).await {
            Ok(counts) => counts,
            Err(e) => {
                debug!(category_id = %current, error = %e, "count query failed, treating as deleted");
                stack.pop();
                continue;
            }
        };

        if counts.article_count > 0 {
            if !soft_delete_articles(client, current, &mut attempted_articles).await {
                warn!(category_id = %current, "articles could not be removed");
                return false;
            }
            continue;
        }

        if counts.child_category_count > 0 {
            let categories = match client.list_categories().await {
                Ok(categories) => categories,
                Err(e) => {
                    warn!(category_id = %current, error = %e, "could not list child categories");
                    return false;
                }
            };
            let child = categories
                .into_iter()
                .find(|c| {
                    c.parent_id == Some(current)
                        && !visited_children.contains(&c.knowledge_category_id)
                })
                .map(|c| c.knowledge_category_id);

            match child {
                Some(child) => {
                    visited_children.insert(child);
                    stack.push(child);
                    continue;
                }
                None => {
                    warn!(category_id = %current, "reported children not found");
                    return false;
                }
            }
        }

        if let Err(e) = client.delete_category(current).await {
            warn!(category_id = %current, error = %e, "delete refused");
            return false;
        }
        info!(category_id = %current, "category deleted");
        stack.pop();
    }

    true
}

/// Soft-delete the live articles of `category` not attempted before.
///
/// `false` when there was nothing left to try or every attempt failed.
async fn soft_delete_articles(
    client: &dyn KnowledgeBaseClient,
    category: CategoryId,
    attempted: &mut HashSet<ArticleId>,
) -> bool {
    let articles = match client.list_articles(category).await {
        Ok(articles) => articles,
        Err(e) => {
            warn!(category_id = %category, error = %e, "could not list articles");
            return false;
        }
    };

    let pending: Vec<ArticleId> = articles
        .into_iter()
        .filter(|a| a.status != Some(ArticleStatus::Deleted))
        .map(|a| a.article_id)
        .filter(|id| attempted.insert(*id))
        .collect();

    let mut removed = 0usize;
    for id in &pending {
        match client.set_article_status(*id, ArticleStatus::Deleted).await {
            Ok(_) => removed += 1,
            Err(e) => warn!(article_id = %id, error = %e, "soft delete failed"),
        }
    }

    removed > 0
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    pub deleted: Vec<CategoryId>,
    pub failed: Vec<CategoryId>,
}

/// Delete every category that reports no articles and no children.
///
/// Runs a single pass; a parent emptied by this pass is picked up next time.
#[instrument(skip(client))]
pub async fn prune_empty_categories(
    client: &dyn KnowledgeBaseClient,
    confirmed: bool,
) -> kbsync_shared::Result<PruneReport> {
    let mut report = PruneReport::default();
    let empty: Vec<CategoryId> = client
        .list_categories()
        .await?
        .into_iter()
        .filter(|c| c.article_count == 0 && c.child_category_count == 0)
        .map(|c| c.knowledge_category_id)
        .collect();

    if !confirmed {
        info!(candidates = empty.len(), "prune not confirmed, skipping");
        return Ok(report);
    }

    for id in empty {
        match client.delete_category(id).await {
            Ok(()) => report.deleted.push(id),
            Err(e) => {
                warn!(category_id = %id, error = %e, "failed to prune category");
                report.failed.push(id);
            }
        }
    }

    info!(
        deleted = report.deleted.len(),
        failed = report.failed.len(),
        "prune finished"
    );
    Ok(report)
}
