//! The [`Artifact`] type: one file of the finished site, held in memory until
//! it is published.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

/// The media type of an artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentType(pub &'static str);

impl ContentType {
    pub const HTML: ContentType = ContentType("text/html");
    pub const ATOM: ContentType = ContentType("application/atom+xml");
    pub const XML: ContentType = ContentType("application/xml");
    pub const OCTET_STREAM: ContentType = ContentType("application/octet-stream");

    /// Guesses the content type of a copied asset from its extension.
    pub fn from_path(path: &Path) -> ContentType {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("html") | Some("htm") => ContentType::HTML,
            Some("xml") => ContentType::XML,
            Some("css") => ContentType("text/css"),
            Some("js") => ContentType("text/javascript"),
            Some("json") => ContentType("application/json"),
            Some("txt") => ContentType("text/plain"),
            Some("svg") => ContentType("image/svg+xml"),
            Some("png") => ContentType("image/png"),
            Some("jpg") | Some("jpeg") => ContentType("image/jpeg"),
            Some("gif") => ContentType("image/gif"),
            Some("webp") => ContentType("image/webp"),
            Some("ico") => ContentType("image/x-icon"),
            Some("pdf") => ContentType("application/pdf"),
            Some("woff2") => ContentType("font/woff2"),
            _ => ContentType::OCTET_STREAM,
        }
    }
}

/// One output file.
#[derive(Clone, Debug)]
pub struct Artifact {
    /// Path relative to the destination root. Unique within a build.
    pub path: PathBuf,

    pub contents: Vec<u8>,

    pub content_type: ContentType,

    /// The date of the document the artifact was rendered from, if any.
    pub date: Option<NaiveDate>,

    /// Whether the artifact belongs in the sitemap.
    pub indexable: bool,

    /// The source path the artifact came from, for collision reports.
    /// Generated artifacts name what generated them.
    pub origin: String,
}

impl Artifact {
    pub fn is_html(&self) -> bool {
        self.content_type == ContentType::HTML
    }
}
