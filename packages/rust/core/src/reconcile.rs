//! Reconciliation executor: applies an ordered procedure sequence against the
//! remote service.
//!
//! Procedures are processed strictly one at a time. A category created at
//! step *k* may be the parent of the procedure at step *k + 1*, so each remote
//! call completes before the next procedure is resolved. A failing procedure
//! is recorded in the report and the run moves on; nothing is rolled back.

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use kbsync_markdown::{display_name, with_source_marker};
use kbsync_remote::KnowledgeBaseClient;
use kbsync_shared::{
    AppConfig, ArticleId, ArticleProcedure, ArticleStatus, CategoryId, CategoryProcedure,
    KbSyncError, KnowledgeBaseId, NewArticle, NewCategory, Procedure, RemoteArticle,
    RemoteCategory, UnresolvedParentPolicy, UpdateArticle,
};

use crate::procedures::parent_path;
use crate::snapshot::RemoteSnapshot;
use crate::sync::ProgressReporter;

// ---------------------------------------------------------------------------
// Move detection
// ---------------------------------------------------------------------------

/// Verdict of a [`MoveComparator`] for one category procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveCheck {
    /// A category with this name exists under another parent: create a new
    /// one with the given name under the procedure's parent.
    Moved(String),
    /// The category already exists where it belongs; reuse it.
    Existing(CategoryId),
    /// Nothing with this name exists.
    NoMatch,
}

/// Decides whether a category procedure maps onto an existing remote category.
///
/// Called with the procedure's `parent_id` already resolved.
pub trait MoveComparator: Send + Sync {
    fn check(&self, existing: &[RemoteCategory], procedure: &CategoryProcedure) -> MoveCheck;
}

/// Matches on display name, then on parent.
///
/// Among several same-name categories under the resolved parent the lowest id
/// wins, so repeated runs keep attaching to the oldest record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameParentComparator;

impl MoveComparator for NameParentComparator {
    fn check(&self, existing: &[RemoteCategory], procedure: &CategoryProcedure) -> MoveCheck {
        let mut same_name = existing.iter().filter(|c| c.name == procedure.name).peekable();
        if same_name.peek().is_none() {
            return MoveCheck::NoMatch;
        }

        same_name
            .filter(|c| c.parent_id == procedure.parent_id)
            .map(|c| c.knowledge_category_id)
            .min()
            .map(MoveCheck::Existing)
            .unwrap_or_else(|| MoveCheck::Moved(procedure.name.clone()))
    }
}

// ---------------------------------------------------------------------------
// Options & report
// ---------------------------------------------------------------------------

/// Policy knobs for a reconciliation run.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Bucket for regular documentation categories.
    pub docs_kb: KnowledgeBaseId,
    /// Bucket for categories under a release-notes tree.
    pub release_notes_kb: KnowledgeBaseId,
    /// Case-insensitive path marker selecting `release_notes_kb`.
    pub release_notes_marker: String,
    pub unresolved_parent: UnresolvedParentPolicy,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ReconcileOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            docs_kb: KnowledgeBaseId(config.knowledge_bases.docs),
            release_notes_kb: KnowledgeBaseId(config.knowledge_bases.release_notes),
            release_notes_marker: config.knowledge_bases.release_notes_marker.to_lowercase(),
            unresolved_parent: config.sync.unresolved_parent,
        }
    }
}

/// A record the service now holds as a result of this run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "recordType", rename_all = "lowercase")]
pub enum CompletedRecord {
    Category(RemoteCategory),
    Article(RemoteArticle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcedureKind {
    Category,
    Article,
}

/// What happened to one procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Created { id: u64 },
    /// Same-name category found under another parent; a new one was created.
    Moved { id: u64 },
    /// An existing category was reused without a remote call.
    Reused { id: u64 },
    Updated { id: u64 },
    /// Article soft-deleted (status transition).
    Deleted { id: u64 },
    /// Category handed to the cascading-deletion pass.
    QueuedForDeletion { id: u64 },
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcedureOutcome {
    pub path: String,
    pub kind: ProcedureKind,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl ProcedureOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed { .. })
    }
}

/// Result of a reconciliation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// Successfully applied records, in application order.
    pub completed: Vec<CompletedRecord>,
    /// One entry per input procedure, in input order.
    pub outcomes: Vec<ProcedureOutcome>,
    /// Categories to remove with cascading deletion.
    pub pending_deletions: Vec<CategoryId>,
    /// Paths whose parent could not be found and were applied at the top level.
    pub defaulted_to_top_level: Vec<String>,
}

impl ReconcileReport {
    pub fn failures(&self) -> impl Iterator<Item = &ProcedureOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Sequential executor for a procedure sequence.
pub struct Reconciler<'a> {
    client: &'a dyn KnowledgeBaseClient,
    comparator: Box<dyn MoveComparator>,
    options: ReconcileOptions,
}

/// Per-run bookkeeping: categories resolved so far, by source path.
#[derive(Default)]
struct RunState {
    resolved: Vec<(String, CategoryId)>,
}

impl RunState {
    fn lookup(&self, path: &str) -> Option<CategoryId> {
        self.resolved
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .map(|(_, id)| *id)
    }
}

impl<'a> Reconciler<'a> {
    pub fn new(client: &'a dyn KnowledgeBaseClient, options: ReconcileOptions) -> Self {
        Self {
            client,
            comparator: Box::new(NameParentComparator),
            options,
        }
    }

    /// Replace the default [`NameParentComparator`].
    pub fn with_comparator(mut self, comparator: impl MoveComparator + 'static) -> Self {
        self.comparator = Box::new(comparator);
        self
    }

    /// Apply `procedures` in order, folding every result into `snapshot`.
    #[instrument(skip_all, fields(procedures = procedures.len()))]
    pub async fn reconcile(
        &self,
        procedures: Vec<Procedure>,
        snapshot: &mut RemoteSnapshot,
        progress: &dyn ProgressReporter,
    ) -> ReconcileReport {
        let total = procedures.len();
        let mut run = RunState::default();
        let mut report = ReconcileReport::default();

        for (idx, procedure) in procedures.into_iter().enumerate() {
            let path = procedure.path().to_string();
            let (kind, status) = match procedure {
                Procedure::Category(category) => (
                    ProcedureKind::Category,
                    self.apply_category(category, snapshot, &mut run, &mut report)
                        .await,
                ),
                Procedure::Article(article) => (
                    ProcedureKind::Article,
                    self.apply_article(article, snapshot, &mut run, &mut report)
                        .await,
                ),
            };

            match &status {
                OutcomeStatus::Failed { reason } => {
                    warn!(%path, %reason, "procedure failed, continuing");
                }
                other => debug!(%path, outcome = ?other, "procedure applied"),
            }

            let outcome = ProcedureOutcome { path, kind, status };
            progress.procedure_applied(&outcome, idx + 1, total);
            report.outcomes.push(outcome);
        }

        info!(
            completed = report.completed.len(),
            failed = report.failures().count(),
            pending_deletions = report.pending_deletions.len(),
            "reconciliation finished"
        );

        report
    }

    /// Find the category id of `path`'s parent directory.
    ///
    /// Looks at categories resolved earlier in this run first, then at the
    /// remote snapshot by display-name ancestry. `Ok(None)` means top level.
    fn resolve_parent(
        &self,
        path: &str,
        snapshot: &RemoteSnapshot,
        run: &RunState,
    ) -> Result<Option<CategoryId>, KbSyncError> {
        let Some(parent) = parent_path(path) else {
            return Ok(None);
        };

        if let Some(id) = run.lookup(parent) {
            return Ok(Some(id));
        }

        let chain: Vec<String> = parent.split('/').map(display_name).collect();
        snapshot
            .find_by_name_chain(&chain)
            .map(|c| Some(c.knowledge_category_id))
            .ok_or_else(|| KbSyncError::UnresolvedParent {
                path: path.to_string(),
            })
    }

    fn bucket_for(&self, path: &str) -> KnowledgeBaseId {
        if path.to_lowercase().contains(&self.options.release_notes_marker) {
            self.options.release_notes_kb
        } else {
            self.options.docs_kb
        }
    }

    async fn apply_category(
        &self,
        mut procedure: CategoryProcedure,
        snapshot: &mut RemoteSnapshot,
        run: &mut RunState,
        report: &mut ReconcileReport,
    ) -> OutcomeStatus {
        let parent = match self.resolve_parent(&procedure.path, snapshot, run) {
            Ok(parent) => parent,
            Err(_) if procedure.flagged_for_delete => {
                return OutcomeStatus::Skipped {
                    reason: "parent not present remotely".into(),
                };
            }
            Err(e) => match self.options.unresolved_parent {
                UnresolvedParentPolicy::Skip => {
                    return OutcomeStatus::Failed {
                        reason: e.to_string(),
                    };
                }
                UnresolvedParentPolicy::TopLevel => {
                    warn!(path = %procedure.path, "parent unresolved, creating at top level");
                    report.defaulted_to_top_level.push(procedure.path.clone());
                    None
                }
            },
        };
        procedure.parent_id = parent;
        procedure.knowledge_base_id = self.bucket_for(&procedure.path);

        let verdict = self.comparator.check(snapshot.categories(), &procedure);

        if procedure.flagged_for_delete {
            return match verdict {
                MoveCheck::Existing(id) => {
                    report.pending_deletions.push(id);
                    OutcomeStatus::QueuedForDeletion { id: id.0 }
                }
                MoveCheck::Moved(_) | MoveCheck::NoMatch => OutcomeStatus::Skipped {
                    reason: "not present remotely".into(),
                },
            };
        }

        let (name, moved) = match verdict {
            MoveCheck::Existing(id) => {
                run.resolved.push((procedure.path.clone(), id));
                if let Some(existing) = snapshot.category(id) {
                    report
                        .completed
                        .push(CompletedRecord::Category(existing.clone()));
                }
                return OutcomeStatus::Reused { id: id.0 };
            }
            MoveCheck::Moved(new_name) => {
                info!(path = %procedure.path, name = %new_name, "category moved, creating under new parent");
                (new_name, true)
            }
            MoveCheck::NoMatch => (procedure.name.clone(), false),
        };

        let body = NewCategory {
            name,
            parent_id: procedure.parent_id,
            knowledge_base_id: procedure.knowledge_base_id,
        };

        match self.client.create_category(&body).await {
            Ok(created) => {
                let id = created.knowledge_category_id;
                run.resolved.push((procedure.path.clone(), id));
                snapshot.push_category(created.clone());
                report.completed.push(CompletedRecord::Category(created));
                if moved {
                    OutcomeStatus::Moved { id: id.0 }
                } else {
                    OutcomeStatus::Created { id: id.0 }
                }
            }
            Err(e) => OutcomeStatus::Failed {
                reason: e.to_string(),
            },
        }
    }

    async fn apply_article(
        &self,
        mut procedure: ArticleProcedure,
        snapshot: &mut RemoteSnapshot,
        run: &mut RunState,
        report: &mut ReconcileReport,
    ) -> OutcomeStatus {
        let category = match self.resolve_parent(&procedure.path, snapshot, run) {
            Ok(Some(id)) => id,
            Ok(None) => {
                return OutcomeStatus::Failed {
                    reason: "top-level files have no category to live in".into(),
                };
            }
            Err(_) if procedure.flagged_for_delete => {
                return OutcomeStatus::Skipped {
                    reason: "parent not present remotely".into(),
                };
            }
            Err(e) => {
                return OutcomeStatus::Failed {
                    reason: e.to_string(),
                };
            }
        };
        procedure.knowledge_category_id = Some(category);

        let existing: Option<ArticleId> = procedure.article_id.or_else(|| {
            let mut names = Vec::with_capacity(procedure.aliases.len() + 1);
            names.push(procedure.name.clone());
            names.extend(procedure.aliases.iter().cloned());
            snapshot
                .find_article(category, &procedure.path, &names)
                .map(|a| a.article_id)
        });

        if procedure.flagged_for_delete {
            let Some(id) = existing else {
                return OutcomeStatus::Skipped {
                    reason: "not present remotely".into(),
                };
            };
            return match self.client.set_article_status(id, ArticleStatus::Deleted).await {
                Ok(deleted) => {
                    snapshot.push_article(deleted);
                    OutcomeStatus::Deleted { id: id.0 }
                }
                Err(e) => OutcomeStatus::Failed {
                    reason: e.to_string(),
                },
            };
        }

        let marked = with_source_marker(&procedure.body, &procedure.path);
        let result = match existing {
            Some(id) => {
                let body = UpdateArticle {
                    knowledge_category_id: category,
                    name: procedure.name.clone(),
                    body: marked.clone(),
                    format: procedure.format.clone(),
                };
                self.client
                    .update_article(id, &body)
                    .await
                    .map(|a| (a, true))
            }
            None => {
                let body = NewArticle {
                    knowledge_category_id: category,
                    name: procedure.name.clone(),
                    body: marked,
                    format: procedure.format.clone(),
                    locale: procedure.locale.clone(),
                };
                self.client.create_article(&body).await.map(|a| (a, false))
            }
        };

        match result {
            Ok((applied, updated)) => {
                let id = applied.article_id.0;
                snapshot.push_article(applied.clone());
                report.completed.push(CompletedRecord::Article(applied));
                if updated {
                    OutcomeStatus::Updated { id }
                } else {
                    OutcomeStatus::Created { id }
                }
            }
            Err(e) => OutcomeStatus::Failed {
                reason: e.to_string(),
            },
        }
    }
}
