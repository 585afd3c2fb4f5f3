//! Core sync logic for kbsync.
//!
//! This crate turns a list of changed documentation files into an ordered
//! sequence of category/article procedures, reconciles them against a remote
//! knowledge base, and removes categories whose source tree is gone.

pub mod changes;
pub mod deletion;
pub mod links;
pub mod procedures;
pub mod reconcile;
pub mod snapshot;
pub mod sync;

#[cfg(test)]
mod test_support;
