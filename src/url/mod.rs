//! URL handling for discovered links
//!
//! The crawl core treats links as opaque strings. This module is used by the default
//! extractor to turn raw `href` values into absolute, comparable links so the frontier's
//! duplicate detection sees one spelling per page.

mod normalize;

pub use normalize::{normalize_link, resolve_link};
