//! Markdown text helpers used when turning files into remote articles.
//!
//! - [`display_name`] derives a human-readable title from a path segment
//! - [`title_from_body`] picks the first H1 of a document
//! - [`image_references`] / [`replace_reference`] find and rewrite local asset links
//! - [`internal_links`] / [`replace_link`] do the same for links between documents
//! - [`with_source_marker`] / [`source_path`] tie a remote body to its file

mod links;
mod media;
mod names;
mod source;

pub use links::{internal_links, replace_link, resolve_relative};
pub use media::{SUPPORTED_MEDIA_TYPES, image_references, is_supported_media_type, replace_reference};
pub use names::{display_name, title_from_body};
pub use source::{source_marker, source_path, with_source_marker};
