//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use kbsync_core::changes::{ChangeFilter, git_change_list, read_change_list};
use kbsync_core::deletion::{delete_category, prune_empty_categories};
use kbsync_core::reconcile::{OutcomeStatus, ProcedureOutcome};
use kbsync_core::sync::{ProgressReporter, SyncConfig, SyncReport, plan, sync};
use kbsync_remote::{ClientOptions, HttpKnowledgeBaseClient, KnowledgeBaseClient};
use kbsync_shared::{
    AppConfig, CategoryId, ChangeEntry, init_config, load_config, resolve_api_token,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// kbsync: keep a hosted knowledge base in step with a markdown tree.
#[derive(Parser)]
#[command(
    name = "kbsync",
    version,
    about = "Mirror a markdown documentation tree into a hosted knowledge base.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Where the change list comes from and where the docs live.
#[derive(Args, Debug)]
pub(crate) struct SourceArgs {
    /// File with one changed path per line.
    #[arg(long, conflicts_with = "base")]
    pub changes: Option<PathBuf>,

    /// Git ref to diff the working tree against.
    #[arg(long)]
    pub base: Option<String>,

    /// Repository root the change list is relative to.
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Docs directory (defaults to `<repo>/<sync.watched_dir>`).
    #[arg(long)]
    pub root: Option<PathBuf>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Apply changed files to the knowledge base.
    Sync {
        #[command(flatten)]
        source: SourceArgs,

        /// Allow cascading deletion and pruning of categories.
        #[arg(long)]
        confirm_deletes: bool,

        /// Print the procedures instead of applying them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the procedures a sync would apply, as JSON.
    Plan {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Delete a category with everything beneath it.
    DeleteCategory {
        /// Remote category id.
        id: u64,

        /// Actually delete; without it nothing is touched.
        #[arg(long)]
        confirm: bool,
    },

    /// Delete every category without articles or children.
    Prune {
        /// Actually delete; without it nothing is touched.
        #[arg(long)]
        confirm: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "kbsync=info",
        1 => "kbsync=debug",
        _ => "kbsync=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so `plan` output stays pipeable.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Sync {
            source,
            confirm_deletes,
            dry_run,
        } => cmd_sync(&source, confirm_deletes, dry_run).await,
        Command::Plan { source } => cmd_plan(&source),
        Command::DeleteCategory { id, confirm } => cmd_delete_category(id, confirm).await,
        Command::Prune { confirm } => cmd_prune(confirm).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn connect(config: &AppConfig) -> Result<Arc<dyn KnowledgeBaseClient>> {
    let token = resolve_api_token(config)?;
    let options = ClientOptions::from_config(config, token)?;
    Ok(Arc::new(HttpKnowledgeBaseClient::new(options)?))
}

fn collect_changes(source: &SourceArgs, config: &AppConfig) -> Result<Vec<ChangeEntry>> {
    let filter = ChangeFilter::from(&config.sync);
    let entries = match (&source.changes, &source.base) {
        (Some(file), _) => read_change_list(file, &filter)?,
        (None, Some(base)) => git_change_list(&source.repo, base, &filter)?,
        (None, None) => return Err(eyre!("either --changes or --base is required")),
    };
    info!(entries = entries.len(), "change list loaded");
    Ok(entries)
}

fn sync_config(source: &SourceArgs, config: &AppConfig) -> Result<SyncConfig> {
    let changes = collect_changes(source, config)?;
    let docs_root = source
        .root
        .clone()
        .unwrap_or_else(|| source.repo.join(&config.sync.watched_dir));
    ensure_dir(&docs_root)?;
    Ok(SyncConfig::from_app_config(config, docs_root, changes))
}

fn ensure_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(eyre!("docs directory '{}' does not exist", path.display()))
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_sync(source: &SourceArgs, confirm_deletes: bool, dry_run: bool) -> Result<()> {
    let config = load_config()?;
    let mut sync_config = sync_config(source, &config)?;
    sync_config.confirm_deletes |= confirm_deletes;

    if dry_run {
        let procedures = plan(&sync_config)?;
        println!("{}", serde_json::to_string_pretty(&procedures)?);
        return Ok(());
    }

    if sync_config.changes.is_empty() {
        println!("Nothing to sync.");
        return Ok(());
    }

    let client = connect(&config)?;
    info!(
        root = %sync_config.docs_root.display(),
        changes = sync_config.changes.len(),
        confirm_deletes = sync_config.confirm_deletes,
        "syncing knowledge base"
    );

    let reporter = CliProgress::new();
    let report = sync(&sync_config, client, &reporter).await?;
    print_summary(&report);

    match report.failed() {
        0 => Ok(()),
        n => Err(eyre!("{n} item(s) failed, see log for details")),
    }
}

fn cmd_plan(source: &SourceArgs) -> Result<()> {
    let config = load_config()?;
    let procedures = plan(&sync_config(source, &config)?)?;
    println!("{}", serde_json::to_string_pretty(&procedures)?);
    Ok(())
}

async fn cmd_delete_category(id: u64, confirm: bool) -> Result<()> {
    if !confirm {
        println!("Dry run: pass --confirm to delete category {id} and its contents.");
        return Ok(());
    }

    let config = load_config()?;
    let client = connect(&config)?;

    if delete_category(client.as_ref(), CategoryId(id), true).await {
        println!("Category {id} deleted.");
        Ok(())
    } else {
        Err(eyre!("category {id} could not be fully deleted"))
    }
}

async fn cmd_prune(confirm: bool) -> Result<()> {
    let config = load_config()?;
    let client = connect(&config)?;

    let report = prune_empty_categories(client.as_ref(), confirm).await?;
    if !confirm {
        println!("Dry run: pass --confirm to delete empty categories.");
        return Ok(());
    }

    println!("  Pruned: {}", report.deleted.len());
    if !report.failed.is_empty() {
        println!("  Failed: {}", report.failed.len());
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_summary(report: &SyncReport) {
    let mut created = 0;
    let mut updated = 0;
    let mut reused = 0;
    let mut removed = 0;
    let mut skipped = 0;
    for outcome in &report.reconcile.outcomes {
        match outcome.status {
            OutcomeStatus::Created { .. } | OutcomeStatus::Moved { .. } => created += 1,
            OutcomeStatus::Updated { .. } => updated += 1,
            OutcomeStatus::Reused { .. } => reused += 1,
            OutcomeStatus::Deleted { .. } | OutcomeStatus::QueuedForDeletion { .. } => {
                removed += 1
            }
            OutcomeStatus::Skipped { .. } => skipped += 1,
            OutcomeStatus::Failed { .. } => {}
        }
    }

    println!();
    println!("  Sync finished ({})", report.run_id);
    println!("  Created:   {created}");
    println!("  Updated:   {updated}");
    println!("  Unchanged: {reused}");
    println!("  Removed:   {removed}");
    println!("  Skipped:   {skipped}");
    println!("  Failed:    {}", report.failed());
    if report.uploaded_images > 0 {
        println!("  Images:    {}", report.uploaded_images);
    }
    if !report.links.updated.is_empty() {
        println!("  Links:     {}", report.links.updated.len());
    }
    for target in &report.links.unresolved {
        println!("  warning: link target {target} has no remote article");
    }
    if !report.deleted_categories.is_empty() {
        println!("  Categories deleted: {}", report.deleted_categories.len());
    }
    if let Some(pruned) = &report.pruned {
        println!("  Empty categories pruned: {}", pruned.deleted.len());
    }
    for path in &report.reconcile.defaulted_to_top_level {
        println!("  warning: {path} was created at the top level");
    }
    for failure in report.reconcile.failures() {
        if let OutcomeStatus::Failed { reason } = &failure.status {
            println!("  failed: {} ({reason})", failure.path);
        }
    }
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn procedure_applied(&self, outcome: &ProcedureOutcome, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Applying [{current}/{total}] {}", outcome.path));
    }

    fn done(&self, _report: &SyncReport) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn changes_and_base_conflict() {
        let parsed = Cli::try_parse_from(["kbsync", "plan", "--changes", "c.txt", "--base", "main"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn parses_sync_flags() {
        let cli = Cli::try_parse_from([
            "kbsync",
            "-vv",
            "sync",
            "--base",
            "origin/main",
            "--confirm-deletes",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Sync {
            source,
            confirm_deletes,
            dry_run,
        } = cli.command
        else {
            panic!("expected sync");
        };
        assert_eq!(source.base.as_deref(), Some("origin/main"));
        assert_eq!(source.repo, PathBuf::from("."));
        assert!(confirm_deletes);
        assert!(!dry_run);
    }
}
