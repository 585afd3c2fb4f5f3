//! Shared types, error model, and configuration for kbsync.
//!
//! This crate is the foundation depended on by all other kbsync crates.
//! It provides:
//! - [`KbSyncError`]: the unified error type
//! - Domain types ([`Procedure`], [`RemoteCategory`], [`RemoteArticle`], ...)
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, KnowledgeBasesConfig, RemoteConfig, SyncSettings, UnresolvedParentPolicy,
    config_dir, config_file_path, init_config, load_config, load_config_from,
    resolve_api_token,
};
pub use error::{KbSyncError, Result};
pub use types::{
    ArticleId, ArticleProcedure, ArticleStatus, CategoryCounts, CategoryId, CategoryProcedure,
    ChangeEntry, KnowledgeBaseId, MediaUpload, NewArticle, NewCategory, Procedure,
    RemoteArticle, RemoteCategory, UpdateArticle,
};
