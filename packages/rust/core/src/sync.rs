//! End-to-end sync: change list → procedures → local bodies → remote snapshot
//! → reconcile → internal links → deletion.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use kbsync_markdown::{image_references, internal_links, replace_reference, title_from_body};
use kbsync_remote::KnowledgeBaseClient;
use kbsync_shared::{
    AppConfig, ArticleProcedure, CategoryId, ChangeEntry, KbSyncError, Procedure, Result,
};

use crate::deletion::{PruneReport, delete_category, prune_empty_categories};
use crate::links::{LinkReport, rewrite_internal_links};
use crate::procedures::{ProcedureDefaults, build_procedures, parent_path};
use crate::reconcile::{ProcedureOutcome, ReconcileOptions, ReconcileReport, Reconciler};
use crate::snapshot::RemoteSnapshot;

/// Directory under the docs root searched when a relative image reference
/// does not resolve.
const ASSETS_DIR: &str = "assets";

/// Configuration for one sync run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Local directory the change entries are relative to.
    pub docs_root: PathBuf,
    /// Changed paths, relative to `docs_root`.
    pub changes: Vec<ChangeEntry>,
    pub procedure_defaults: ProcedureDefaults,
    pub reconcile: ReconcileOptions,
    pub upload_images: bool,
    /// Gate for cascading deletion and pruning.
    pub confirm_deletes: bool,
    pub prune_empty_categories: bool,
    /// Rewrite relative `.md` links once every article has a remote URL.
    pub rewrite_links: bool,
    /// Bound on concurrent article listings while fetching the snapshot.
    pub read_concurrency: usize,
}

impl SyncConfig {
    pub fn from_app_config(config: &AppConfig, docs_root: PathBuf, changes: Vec<ChangeEntry>) -> Self {
        Self {
            docs_root,
            changes,
            procedure_defaults: ProcedureDefaults::from(config),
            reconcile: ReconcileOptions::from(config),
            upload_images: config.sync.upload_images,
            confirm_deletes: config.sync.confirm_deletes,
            prune_empty_categories: config.sync.prune_empty_categories,
            rewrite_links: config.sync.rewrite_internal_links,
            read_concurrency: config.remote.read_concurrency,
        }
    }
}

/// Result of a sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Number of procedures built from the change list.
    pub procedures: usize,
    pub uploaded_images: usize,
    pub reconcile: ReconcileReport,
    pub links: LinkReport,
    pub deleted_categories: Vec<CategoryId>,
    pub failed_deletions: Vec<CategoryId>,
    pub pruned: Option<PruneReport>,
    pub elapsed: Duration,
}

impl SyncReport {
    pub fn failed(&self) -> usize {
        self.reconcile.failures().count() + self.links.failed.len() + self.failed_deletions.len()
    }
}

/// Progress callback for reporting sync status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each procedure has been applied.
    fn procedure_applied(&self, outcome: &ProcedureOutcome, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, report: &SyncReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn procedure_applied(&self, _outcome: &ProcedureOutcome, _current: usize, _total: usize) {}
    fn done(&self, _report: &SyncReport) {}
}

/// Build procedures and load local state without touching the remote.
///
/// Procedures whose path no longer exists under `docs_root` are flagged for
/// deletion. Article bodies are read from disk and a leading `# Title`
/// replaces the name derived from the file name, which is kept as an alias
/// so articles created under it are still found.
#[instrument(skip_all, fields(changes = config.changes.len()))]
pub fn plan(config: &SyncConfig) -> Result<Vec<Procedure>> {
    let mut procedures = build_procedures(&config.changes, &config.procedure_defaults);

    for procedure in procedures.iter_mut() {
        match procedure {
            Procedure::Category(category) => {
                if !config.docs_root.join(&category.path).is_dir() {
                    category.flagged_for_delete = true;
                }
            }
            Procedure::Article(article) => {
                let file = config.docs_root.join(&article.path);
                match std::fs::read_to_string(&file) {
                    Ok(body) => {
                        if let Some(title) = title_from_body(&body) {
                            if title != article.name {
                                let derived = std::mem::replace(&mut article.name, title);
                                article.aliases.push(derived);
                            }
                        }
                        article.body = body;
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        article.flagged_for_delete = true;
                    }
                    Err(e) => return Err(KbSyncError::io(file, e)),
                }
            }
        }
    }

    let flagged = procedures.iter().filter(|p| p.is_flagged_for_delete()).count();
    info!(procedures = procedures.len(), flagged, "plan built");
    Ok(procedures)
}

/// Run a full sync against `client`.
#[instrument(skip_all, fields(root = %config.docs_root.display()))]
pub async fn sync(
    config: &SyncConfig,
    client: Arc<dyn KnowledgeBaseClient>,
    progress: &dyn ProgressReporter,
) -> Result<SyncReport> {
    let start = Instant::now();
    let run_id = Uuid::now_v7();
    let started_at = Utc::now();
    info!(%run_id, "starting sync");

    progress.phase("Planning");
    let mut procedures = plan(config)?;
    let procedure_count = procedures.len();

    let uploaded_images = if config.upload_images {
        progress.phase("Uploading images");
        upload_images(&mut procedures, &config.docs_root, client.as_ref()).await
    } else {
        0
    };

    let linked: Vec<ArticleProcedure> = if config.rewrite_links {
        procedures
            .iter()
            .filter_map(|p| match p {
                Procedure::Article(a)
                    if !a.flagged_for_delete && !internal_links(&a.body).is_empty() =>
                {
                    Some(a.clone())
                }
                _ => None,
            })
            .collect()
    } else {
        Vec::new()
    };

    progress.phase("Fetching remote state");
    let mut snapshot = RemoteSnapshot::fetch(client.clone(), config.read_concurrency).await?;

    progress.phase("Reconciling");
    let reconcile = Reconciler::new(client.as_ref(), config.reconcile.clone())
        .reconcile(procedures, &mut snapshot, progress)
        .await;

    let links = if linked.is_empty() {
        LinkReport::default()
    } else {
        progress.phase("Rewriting internal links");
        rewrite_internal_links(client.as_ref(), &config.docs_root, linked, &reconcile, &snapshot)
            .await
    };

    let mut deleted_categories = Vec::new();
    let mut failed_deletions = Vec::new();
    let mut pruned = None;

    if config.confirm_deletes {
        if !reconcile.pending_deletions.is_empty() {
            progress.phase("Deleting categories");
        }
        for &id in &reconcile.pending_deletions {
            if delete_category(client.as_ref(), id, true).await {
                deleted_categories.push(id);
            } else {
                failed_deletions.push(id);
            }
        }

        if config.prune_empty_categories {
            progress.phase("Pruning empty categories");
            match prune_empty_categories(client.as_ref(), true).await {
                Ok(report) => pruned = Some(report),
                Err(e) => warn!(error = %e, "prune skipped"),
            }
        }
    } else if !reconcile.pending_deletions.is_empty() {
        info!(
            pending = reconcile.pending_deletions.len(),
            "category deletions not confirmed, leaving them in place"
        );
    }

    let report = SyncReport {
        run_id,
        started_at,
        procedures: procedure_count,
        uploaded_images,
        reconcile,
        links,
        deleted_categories,
        failed_deletions,
        pruned,
        elapsed: start.elapsed(),
    };

    info!(
        %run_id,
        procedures = report.procedures,
        completed = report.reconcile.completed.len(),
        failed = report.failed(),
        links = report.links.updated.len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "sync complete"
    );
    progress.done(&report);

    Ok(report)
}

/// Upload images referenced by article bodies and point the links at the
/// hosted copies. Returns the number of files uploaded.
///
/// A file is uploaded at most once per run. Missing files and failed uploads
/// leave the original reference in place.
async fn upload_images(
    procedures: &mut [Procedure],
    docs_root: &Path,
    client: &dyn KnowledgeBaseClient,
) -> usize {
    let mut hosted: HashMap<PathBuf, String> = HashMap::new();
    let mut uploaded = 0;

    for procedure in procedures.iter_mut() {
        let Procedure::Article(article) = procedure else {
            continue;
        };
        if article.flagged_for_delete {
            continue;
        }

        let article_dir = match parent_path(&article.path) {
            Some(parent) => docs_root.join(parent),
            None => docs_root.to_path_buf(),
        };

        for reference in image_references(&article.body) {
            let Some(file) = resolve_image(docs_root, &article_dir, &reference) else {
                warn!(article = %article.path, %reference, "image not found, keeping reference");
                continue;
            };

            let url = match hosted.get(&file) {
                Some(url) => url.clone(),
                None => match upload_one(client, &file).await {
                    Ok(url) => {
                        uploaded += 1;
                        hosted.insert(file.clone(), url.clone());
                        url
                    }
                    Err(e) => {
                        warn!(file = %file.display(), error = %e, "image upload failed, keeping reference");
                        continue;
                    }
                },
            };

            debug!(article = %article.path, %reference, %url, "rewriting image link");
            article.body = replace_reference(&article.body, &reference, &url);
        }
    }

    uploaded
}

async fn upload_one(client: &dyn KnowledgeBaseClient, file: &Path) -> Result<String> {
    let bytes = tokio::fs::read(file)
        .await
        .map_err(|e| KbSyncError::io(file, e))?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(client.upload_media(&name, bytes).await?.url)
}

/// Locate a referenced image: relative to the article first, then by file
/// name under `<docs_root>/assets`. Paths that resolve outside `docs_root`
/// (through `..` or a symlink) are never returned.
fn resolve_image(docs_root: &Path, article_dir: &Path, reference: &str) -> Option<PathBuf> {
    let root = docs_root.canonicalize().ok()?;
    let inside = |candidate: PathBuf| -> Option<PathBuf> {
        let resolved = candidate.canonicalize().ok()?;
        if !resolved.starts_with(&root) {
            warn!(path = %resolved.display(), "image outside docs root, ignoring");
            return None;
        }
        resolved.is_file().then_some(resolved)
    };

    if let Some(found) = inside(article_dir.join(reference)) {
        return Some(found);
    }

    let name = Path::new(reference).file_name()?;
    inside(root.join(ASSETS_DIR).join(name))
}
