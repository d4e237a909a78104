//! The library code for the `ogham` static site generator. A build is a
//! one-way pipeline:
//!
//! 1. Scanning the content root for Markdown sources and static assets
//!    ([`crate::scan`])
//! 2. Parsing each source into a [`crate::document::Document`]: front matter,
//!    body, and the metadata derived from both ([`crate::document`])
//! 3. Rendering document bodies to HTML with links between documents
//!    resolved ([`crate::markdown`])
//! 4. Assembling every output file in memory: document pages wrapped in their
//!    layouts, paginated index pages for all posts and for each category and
//!    tag, copied assets, and plugin output such as the feed and sitemap
//!    ([`crate::assemble`])
//! 5. Publishing the files to the destination directory ([`crate::publish`])
//!
//! [`crate::build`] drives the stages, and [`crate::watch`] re-drives them
//! incrementally as sources change.
//!
//! The fourth stage is the most involved, because every listing (the main
//! index and one per category and tag) is sorted newest-first and split into
//! pages of a configurable size, and every output must land at a distinct
//! path.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod artifact;
pub mod assemble;
pub mod build;
pub mod config;
pub mod document;
pub mod feed;
pub mod frontmatter;
pub mod htmlrenderer;
pub mod index;
pub mod label;
pub mod layout;
pub mod markdown;
pub mod plugin;
pub mod publish;
pub mod scaffold;
pub mod scan;
pub mod sitemap;
pub mod url;
pub mod value;
pub mod watch;
