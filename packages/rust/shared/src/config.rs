//! Application configuration for kbsync.
//!
//! User config lives at `~/.kbsync/kbsync.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{KbSyncError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "kbsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".kbsync";

// ---------------------------------------------------------------------------
// Config structs (matching kbsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote service connection settings.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Knowledge-base buckets categories are created in.
    #[serde(default)]
    pub knowledge_bases: KnowledgeBasesConfig,

    /// Sync behavior.
    #[serde(default)]
    pub sync: SyncSettings,
}

/// `[remote]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// API root, e.g. `https://community.example.com/api/v2`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the bearer token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Pause before every mutating request, in milliseconds.
    #[serde(default)]
    pub request_delay_ms: u64,

    /// Maximum concurrent read-only requests when fetching the snapshot.
    #[serde(default = "default_read_concurrency")]
    pub read_concurrency: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
            request_delay_ms: 0,
            read_concurrency: default_read_concurrency(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api/v2".into()
}
fn default_token_env() -> String {
    "KBSYNC_API_TOKEN".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_read_concurrency() -> usize {
    4
}

/// `[knowledge_bases]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBasesConfig {
    /// Bucket for regular documentation categories.
    #[serde(default = "default_docs_kb")]
    pub docs: u64,

    /// Bucket for release-notes categories.
    #[serde(default = "default_release_notes_kb")]
    pub release_notes: u64,

    /// Case-insensitive path substring that routes a category to `release_notes`.
    #[serde(default = "default_release_notes_marker")]
    pub release_notes_marker: String,
}

impl Default for KnowledgeBasesConfig {
    fn default() -> Self {
        Self {
            docs: default_docs_kb(),
            release_notes: default_release_notes_kb(),
            release_notes_marker: default_release_notes_marker(),
        }
    }
}

fn default_docs_kb() -> u64 {
    1
}
fn default_release_notes_kb() -> u64 {
    2
}
fn default_release_notes_marker() -> String {
    "release-notes".into()
}

/// What to do with a procedure whose parent category cannot be found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnresolvedParentPolicy {
    /// Fail the procedure and report it.
    #[default]
    Skip,
    /// Apply it at the top level (no parent) and report a warning.
    TopLevel,
}

/// `[sync]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Directory (relative to the repo root) whose contents are mirrored.
    #[serde(default = "default_watched_dir")]
    pub watched_dir: String,

    /// File suffixes that become articles.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Article locale.
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Article body format.
    #[serde(default = "default_format")]
    pub format: String,

    /// Upload referenced images and rewrite their links.
    #[serde(default = "default_true")]
    pub upload_images: bool,

    /// Safety gate: destructive calls are no-ops unless this is set.
    #[serde(default)]
    pub confirm_deletes: bool,

    /// Delete categories left without articles or children after a run.
    #[serde(default = "default_true")]
    pub prune_empty_categories: bool,

    /// Point relative `.md` links at the remote articles they reference.
    #[serde(default = "default_true")]
    pub rewrite_internal_links: bool,

    /// Handling of procedures whose parent category is missing.
    #[serde(default)]
    pub unresolved_parent: UnresolvedParentPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            watched_dir: default_watched_dir(),
            extensions: default_extensions(),
            locale: default_locale(),
            format: default_format(),
            upload_images: true,
            confirm_deletes: false,
            prune_empty_categories: true,
            rewrite_internal_links: true,
            unresolved_parent: UnresolvedParentPolicy::default(),
        }
    }
}

fn default_watched_dir() -> String {
    "knowledgeBase".into()
}
fn default_extensions() -> Vec<String> {
    vec![".md".into()]
}
fn default_locale() -> String {
    "en".into()
}
fn default_format() -> String {
    "markdown".into()
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.kbsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| KbSyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.kbsync/kbsync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| KbSyncError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        KbSyncError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    url::Url::parse(&config.remote.base_url).map_err(|e| {
        KbSyncError::config(format!(
            "invalid remote.base_url '{}': {e}",
            config.remote.base_url
        ))
    })?;

    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| KbSyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| KbSyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| KbSyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the API token from the env var named in the config.
pub fn resolve_api_token(config: &AppConfig) -> Result<String> {
    let var_name = &config.remote.token_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(KbSyncError::config(format!(
            "API token not found. Set the {var_name} environment variable."
        ))),
    }
}
