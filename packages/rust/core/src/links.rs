//! Rewriting of relative links between synced documents.
//!
//! A `[text](../guide/setup.md)` link only works inside the repository. Once
//! reconciliation has given every changed document a remote URL, this pass
//! points such links at the hosted articles and pushes the updated bodies.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use kbsync_markdown::{
    internal_links, replace_link, resolve_relative, title_from_body, with_source_marker,
};
use kbsync_remote::KnowledgeBaseClient;
use kbsync_shared::{ArticleId, ArticleProcedure, RemoteArticle, UpdateArticle};

use crate::procedures::{article_name, parent_path};
use crate::reconcile::{CompletedRecord, OutcomeStatus, ProcedureKind, ReconcileReport};
use crate::snapshot::RemoteSnapshot;

/// Result of the link pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkReport {
    /// Articles whose body was rewritten and pushed.
    pub updated: Vec<ArticleId>,
    /// Link targets (relative to the docs root) with no remote article.
    pub unresolved: Vec<String>,
    /// Articles whose update call failed.
    pub failed: Vec<ArticleId>,
}

/// Articles applied during this run, keyed by source path.
fn applied_articles(report: &ReconcileReport) -> HashMap<&str, &RemoteArticle> {
    let by_id: HashMap<ArticleId, &RemoteArticle> = report
        .completed
        .iter()
        .filter_map(|record| match record {
            CompletedRecord::Article(a) => Some((a.article_id, a)),
            CompletedRecord::Category(_) => None,
        })
        .collect();

    report
        .outcomes
        .iter()
        .filter(|o| o.kind == ProcedureKind::Article)
        .filter_map(|o| match o.status {
            OutcomeStatus::Created { id } | OutcomeStatus::Updated { id } => {
                by_id.get(&ArticleId(id)).map(|a| (o.path.as_str(), *a))
            }
            _ => None,
        })
        .collect()
}

/// Remote URL of the document at `target`: an article applied this run,
/// then one carrying its source marker, then the latest live article whose
/// name matches the document's title.
fn target_url(
    target: &str,
    docs_root: &Path,
    applied: &HashMap<&str, &RemoteArticle>,
    snapshot: &RemoteSnapshot,
) -> Option<String> {
    if let Some(article) = applied.get(target) {
        return article.url.clone();
    }
    if let Some(article) = snapshot.article_by_source(target) {
        return article.url.clone();
    }

    let file_name = target.rsplit('/').next().unwrap_or(target);
    let dir_name = parent_path(target).map(|dir| dir.rsplit('/').next().unwrap_or(dir));
    let name = std::fs::read_to_string(docs_root.join(target))
        .ok()
        .and_then(|body| title_from_body(&body))
        .unwrap_or_else(|| article_name(file_name, dir_name));

    snapshot.article_titled(&name).and_then(|a| a.url.clone())
}

/// Point relative `.md` links in `articles` at the remote articles they
/// reference and update every article whose body changed.
///
/// `articles` carry the bodies as sent during reconciliation. Only articles
/// created or updated in this run are touched; a failed update is recorded
/// and the pass moves on.
#[instrument(skip_all, fields(articles = articles.len()))]
pub async fn rewrite_internal_links(
    client: &dyn KnowledgeBaseClient,
    docs_root: &Path,
    articles: Vec<ArticleProcedure>,
    report: &ReconcileReport,
    snapshot: &RemoteSnapshot,
) -> LinkReport {
    let applied = applied_articles(report);
    let mut links = LinkReport::default();

    for article in articles {
        let Some(remote) = applied.get(article.path.as_str()) else {
            debug!(article = %article.path, "not applied this run, leaving links");
            continue;
        };
        let Some(category) = remote.knowledge_category_id else {
            continue;
        };

        let mut body = article.body.clone();
        for link in internal_links(&article.body) {
            let target = resolve_relative(parent_path(&article.path), &link);
            let url = target
                .as_deref()
                .and_then(|t| target_url(t, docs_root, &applied, snapshot));

            match url {
                Some(url) => {
                    debug!(article = %article.path, %link, %url, "rewriting link");
                    body = replace_link(&body, &link, &url);
                }
                None => {
                    let missing = target.unwrap_or(link);
                    warn!(article = %article.path, target = %missing, "link target not found remotely");
                    if !links.unresolved.contains(&missing) {
                        links.unresolved.push(missing);
                    }
                }
            }
        }

        if body == article.body {
            continue;
        }

        let id = remote.article_id;
        let update = UpdateArticle {
            knowledge_category_id: category,
            name: article.name.clone(),
            body: with_source_marker(&body, &article.path),
            format: article.format.clone(),
        };
        match client.update_article(id, &update).await {
            Ok(_) => links.updated.push(id),
            Err(e) => {
                warn!(article_id = %id, error = %e, "failed to push rewritten links");
                links.failed.push(id);
            }
        }
    }

    info!(
        updated = links.updated.len(),
        unresolved = links.unresolved.len(),
        failed = links.failed.len(),
        "internal links rewritten"
    );
    links
}
