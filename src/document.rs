//! Defines the [`Document`] type and the logic for deriving its typed
//! metadata (kind, date, labels, layout, output path) from a scanned
//! [`Source`] and its front matter.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::config::Config;
use crate::frontmatter::{self, Field, FrontMatter};
use crate::label::{Label, Labels};
use crate::scan::{Source, DRAFTS_DIRECTORY, POSTS_DIRECTORY};

/// Whether a document is a dated post or a standalone page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Post,
    Page,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Post => "post",
            Kind::Page => "page",
        }
    }
}

/// Which layout a document asked for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayoutRef {
    /// Named explicitly in the front matter. It must exist.
    Named(String),

    /// Not named; the kind's default (`post` or `page`) is used if the site
    /// has it, and the document is emitted bare otherwise.
    Fallback(&'static str),

    /// Explicitly no layout (`layout: none` or `layout: null`).
    Bare,
}

/// One source content file with its metadata. Immutable once parsed.
#[derive(Clone, Debug)]
pub struct Document {
    /// Source path relative to the content root.
    pub source: PathBuf,

    /// The raw front-matter map (empty when the file had none).
    pub front_matter: FrontMatter,

    /// The raw Markdown body.
    pub body: String,

    pub kind: Kind,

    pub title: String,

    /// The publish date. Always set for posts.
    pub date: Option<NaiveDate>,

    pub categories: Labels,

    pub tags: Labels,

    pub layout: LayoutRef,

    pub draft: bool,

    /// Output path relative to the destination root.
    pub output: PathBuf,

    /// Whether the document should be listed in the sitemap.
    pub sitemap: bool,
}

/// The result of [`Document::parse`]: a document plus an optional non-fatal
/// problem (a page whose front matter had to be replaced with defaults).
#[derive(Debug)]
pub struct Parsed {
    pub document: Document,
    pub warning: Option<MetadataError>,
}

impl Document {
    /// Parses a scanned [`Source`] into a [`Document`]. Posts must have valid
    /// front matter and a date; pages fall back to defaults derived from the
    /// file name.
    pub fn parse(source: Source) -> Result<Parsed> {
        let Source { path, text } = source;
        let (kind, in_drafts) = kind_of(&path);

        let (front_matter, body, warning) = match frontmatter::split(&text) {
            Ok(split) => {
                let parsed = match split.front_matter {
                    None => Ok(None),
                    Some(yaml) => FrontMatter::parse(yaml).map(Some),
                };
                match (parsed, kind) {
                    (Ok(Some(front_matter)), _) => (front_matter, split.body, None),
                    (Ok(None), Kind::Page) => (FrontMatter::new(), split.body, None),
                    (Ok(None), Kind::Post) => {
                        return Err(MetadataError::MissingFrontMatter(path));
                    }
                    (Err(err), Kind::Post) => {
                        return Err(MetadataError::FrontMatter { path, err });
                    }
                    (Err(err), Kind::Page) => (
                        FrontMatter::new(),
                        split.body,
                        Some(MetadataError::FrontMatter {
                            path: path.clone(),
                            err,
                        }),
                    ),
                }
            }
            Err(err) => match kind {
                Kind::Post => return Err(MetadataError::FrontMatter { path, err }),
                Kind::Page => (
                    FrontMatter::new(),
                    text.as_str(),
                    Some(MetadataError::FrontMatter {
                        path: path.clone(),
                        err,
                    }),
                ),
            },
        };

        let (file_date, stem) = split_file_stem(&path);
        let date = match front_matter.get("date") {
            None | Some(Field::Null) => file_date,
            Some(field) => {
                let value = field.as_text().unwrap_or_default();
                Some(parse_date(&value).ok_or_else(|| MetadataError::InvalidDate {
                    path: path.clone(),
                    value,
                })?)
            }
        };
        let date = match (kind, date) {
            (Kind::Post, None) => return Err(MetadataError::MissingDate(path)),
            (_, date) => date,
        };

        let title = match front_matter.get("title").and_then(Field::as_text) {
            Some(title) => title,
            None => title_from_stem(&stem),
        };

        let mut categories = labels(front_matter.get("categories"));
        categories.extend(labels(front_matter.get("category")));
        let mut tags = labels(front_matter.get("tags"));
        tags.extend(labels(front_matter.get("tag")));

        let layout = match front_matter.get("layout") {
            None => LayoutRef::Fallback(kind.as_str()),
            Some(Field::Null) => LayoutRef::Bare,
            Some(field) => match field.as_text() {
                Some(name) if name == "none" => LayoutRef::Bare,
                Some(name) => LayoutRef::Named(name),
                None => LayoutRef::Fallback(kind.as_str()),
            },
        };

        let draft = in_drafts
            || front_matter.get("draft").and_then(Field::as_bool) == Some(true)
            || front_matter.get("published").and_then(Field::as_bool) == Some(false);

        let output = match front_matter.get("permalink").and_then(Field::as_text) {
            Some(permalink) => permalink_path(&permalink).ok_or_else(|| {
                MetadataError::InvalidPermalink {
                    path: path.clone(),
                    value: permalink.clone(),
                }
            })?,
            None => default_output(kind, &path, date, &stem),
        };

        let sitemap = front_matter.get("sitemap").and_then(Field::as_bool) != Some(false);
        tracing::debug!(source = %path.display(), output = %output.display(), "parsed document");

        let body = body.to_owned();
        Ok(Parsed {
            document: Document {
                source: path,
                front_matter,
                body,
                kind,
                title,
                date,
                categories,
                tags,
                layout,
                draft,
                output,
                sitemap,
            },
            warning,
        })
    }

    /// Whether the document is published in a build with the given config.
    pub fn is_published(&self, config: &Config) -> bool {
        !self.draft || config.drafts
    }
}

// Returns the kind and whether the document lives in the drafts directory.
fn kind_of(path: &Path) -> (Kind, bool) {
    match path.components().next() {
        Some(Component::Normal(first)) if first == POSTS_DIRECTORY => (Kind::Post, false),
        Some(Component::Normal(first)) if first == DRAFTS_DIRECTORY => (Kind::Post, true),
        _ => (Kind::Page, false),
    }
}

// Splits a `YYYY-MM-DD-slug` file stem into its date and the remainder.
fn split_file_stem(path: &Path) -> (Option<NaiveDate>, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if stem.len() > 11 && stem.is_char_boundary(10) && stem.as_bytes()[10] == b'-' {
        if let Ok(date) = NaiveDate::parse_from_str(&stem[..10], "%Y-%m-%d") {
            return (Some(date), stem[11..].to_owned());
        }
    }
    (None, stem)
}

fn title_from_stem(stem: &str) -> String {
    let words = stem.replace(|c: char| c == '-' || c == '_', " ");
    let mut chars = words.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Parses a front-matter date. Accepts plain calendar dates, RFC 3339
/// timestamps, and `YYYY-MM-DD HH:MM[:SS]` with an optional numeric offset.
/// Only the calendar date is kept.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Some(datetime.date_naive());
    }
    for format in &["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%d %H:%M %z"] {
        if let Ok(datetime) = DateTime::parse_from_str(value, format) {
            return Some(datetime.date_naive());
        }
    }
    for format in &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(value, format) {
            return Some(datetime.date());
        }
    }
    None
}

// Normalizes a `categories`/`tags` value: a list of scalars, or a
// whitespace-separated string.
fn labels(field: Option<&Field>) -> Labels {
    let mut labels = Labels::new();
    match field {
        Some(Field::List(items)) => {
            for item in items {
                if let Some(label) = item.as_text().as_deref().and_then(Label::new) {
                    labels.insert(label);
                }
            }
        }
        Some(field) => {
            if let Some(text) = field.as_text() {
                labels.extend(text.split_whitespace().filter_map(Label::new));
            }
        }
        None => {}
    }
    labels
}

fn default_output(kind: Kind, source: &Path, date: Option<NaiveDate>, stem: &str) -> PathBuf {
    match (kind, date) {
        (Kind::Post, Some(date)) => {
            let slug = match slug::slugify(stem) {
                s if s.is_empty() => String::from("untitled"),
                s => s,
            };
            PathBuf::from(date.format("%Y/%m/%d").to_string()).join(format!("{}.html", slug))
        }
        _ => source.with_extension("html"),
    }
}

// Converts a `permalink` value into an output path. A trailing slash means
// `index.html` inside that directory; a path without an extension gets
// `.html`. Paths escaping the destination are rejected.
fn permalink_path(permalink: &str) -> Option<PathBuf> {
    let trimmed = permalink.trim().trim_start_matches('/');
    let mut path = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if trimmed.is_empty() || trimmed.ends_with('/') {
        path.push("index.html");
    } else if path.extension().is_none() {
        path.set_extension("html");
    }
    Some(path)
}

/// Represents the result of parsing a [`Document`].
pub type Result<T> = std::result::Result<T, MetadataError>;

/// Missing or malformed metadata. Always names the offending document.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Returned when a post has no front-matter block.
    #[error("`{}`: posts must begin with a `---` front-matter block", .0.display())]
    MissingFrontMatter(PathBuf),

    /// Returned when the front-matter block can't be split or parsed.
    #[error("`{}`: {err}", .path.display())]
    FrontMatter {
        path: PathBuf,
        err: frontmatter::Error,
    },

    /// Returned when a post has no `date` field and no date in its file name.
    #[error("`{}`: posts need a `date` field or a `YYYY-MM-DD-` file name prefix", .0.display())]
    MissingDate(PathBuf),

    /// Returned when the `date` field isn't a calendar date.
    #[error("`{}`: invalid date `{value}`", .path.display())]
    InvalidDate { path: PathBuf, value: String },

    /// Returned when the `permalink` field points outside the destination.
    #[error("`{}`: invalid permalink `{value}`", .path.display())]
    InvalidPermalink { path: PathBuf, value: String },
}

impl MetadataError {
    /// The source path of the offending document.
    pub fn path(&self) -> &Path {
        match self {
            MetadataError::MissingFrontMatter(path) | MetadataError::MissingDate(path) => path,
            MetadataError::FrontMatter { path, .. }
            | MetadataError::InvalidDate { path, .. }
            | MetadataError::InvalidPermalink { path, .. } => path,
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::config::Overrides;

    pub(crate) fn config() -> Config {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(crate::config::CONFIG_FILE);
        std::fs::write(&path, "url: https://example.org/\n").unwrap();
        Config::from_project_file(&path, &Overrides::default()).unwrap()
    }

    fn parse(path: &str, text: &str) -> Result<Parsed> {
        Document::parse(Source {
            path: PathBuf::from(path),
            text: text.to_owned(),
        })
    }

    fn names(labels: &Labels) -> Vec<&str> {
        labels.iter().map(|l| l.name.as_str()).collect()
    }

    #[test]
    fn test_post() -> Result<()> {
        let parsed = parse(
            "_posts/2021-04-16-hello.md",
            "---\ntitle: Hello, world!\ndate: 2021-04-17 10:30:00 +0200\n\
             categories: notes life\ntags: [greet, Rust]\n---\n# Hello\n",
        )?;
        assert!(parsed.warning.is_none());
        let doc = parsed.document;
        assert_eq!(Kind::Post, doc.kind);
        assert_eq!("Hello, world!", doc.title);
        assert_eq!(NaiveDate::from_ymd_opt(2021, 4, 17), doc.date);
        assert_eq!(vec!["life", "notes"], names(&doc.categories));
        assert_eq!(vec!["greet", "Rust"], names(&doc.tags));
        assert_eq!(LayoutRef::Fallback("post"), doc.layout);
        assert_eq!(PathBuf::from("2021/04/17/hello.html"), doc.output);
        assert_eq!("# Hello\n", doc.body);
        assert!(!doc.draft);
        Ok(())
    }

    #[test]
    fn test_post_date_from_file_name() -> Result<()> {
        let doc = parse("_posts/2020-02-29-leap-day.md", "---\n---\nbody")?.document;
        assert_eq!(NaiveDate::from_ymd_opt(2020, 2, 29), doc.date);
        assert_eq!("Leap day", doc.title);
        Ok(())
    }

    #[test]
    fn test_post_without_date() {
        assert!(matches!(
            parse("_posts/undated.md", "---\ntitle: x\n---\n"),
            Err(MetadataError::MissingDate(_))
        ));
    }

    #[test]
    fn test_post_with_malformed_date() {
        let err = parse("_posts/a.md", "---\ndate: 2023-13-45\n---\n").unwrap_err();
        assert!(matches!(err, MetadataError::InvalidDate { .. }));
        assert_eq!(Path::new("_posts/a.md"), err.path());
        assert!(err.to_string().contains("_posts/a.md"));
    }

    #[test]
    fn test_post_without_front_matter() {
        assert!(matches!(
            parse("_posts/2023-01-01-a.md", "just text"),
            Err(MetadataError::MissingFrontMatter(_))
        ));
    }

    #[test]
    fn test_post_with_malformed_front_matter() {
        assert!(matches!(
            parse("_posts/2023-01-01-a.md", "---\ntitle: [unclosed\n---\n"),
            Err(MetadataError::FrontMatter { .. })
        ));
    }

    #[test]
    fn test_page_defaults() -> Result<()> {
        let parsed = parse("docs/getting_started.md", "# Getting started\n")?;
        assert!(parsed.warning.is_none());
        let doc = parsed.document;
        assert_eq!(Kind::Page, doc.kind);
        assert_eq!("Getting started", doc.title);
        assert_eq!(None, doc.date);
        assert_eq!(LayoutRef::Fallback("page"), doc.layout);
        assert_eq!(PathBuf::from("docs/getting_started.html"), doc.output);
        assert_eq!("# Getting started\n", doc.body);
        Ok(())
    }

    #[test]
    fn test_page_with_malformed_front_matter_is_defaulted() -> Result<()> {
        let parsed = parse("about.md", "---\ntitle: [unclosed\n---\nbody")?;
        assert!(matches!(parsed.warning, Some(MetadataError::FrontMatter { .. })));
        assert_eq!("About", parsed.document.title);
        assert_eq!("body", parsed.document.body);
        Ok(())
    }

    #[test]
    fn test_drafts() -> Result<()> {
        assert!(parse("_drafts/idea.md", "---\ndate: 2023-01-01\n---\n")?.document.draft);
        assert!(parse("_posts/2023-01-01-a.md", "---\ndraft: true\n---\n")?.document.draft);
        assert!(parse("_posts/2023-01-01-a.md", "---\npublished: false\n---\n")?.document.draft);
        Ok(())
    }

    #[test]
    fn test_layout_and_permalink() -> Result<()> {
        let doc = parse("about.md", "---\nlayout: wide\npermalink: /about/\nsitemap: false\n---\n")?
            .document;
        assert_eq!(LayoutRef::Named(String::from("wide")), doc.layout);
        assert_eq!(PathBuf::from("about/index.html"), doc.output);
        assert!(!doc.sitemap);

        let doc = parse("x.md", "---\nlayout: none\npermalink: /misc/x\n---\n")?.document;
        assert_eq!(LayoutRef::Bare, doc.layout);
        assert_eq!(PathBuf::from("misc/x.html"), doc.output);

        assert!(matches!(
            parse("x.md", "---\npermalink: ../../etc/passwd\n---\n"),
            Err(MetadataError::InvalidPermalink { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_parse_date() {
        let day = NaiveDate::from_ymd_opt(2023, 1, 2);
        assert_eq!(day, parse_date("2023-01-02"));
        assert_eq!(day, parse_date("2023-01-02T08:00:00Z"));
        assert_eq!(day, parse_date("2023-01-02 08:00"));
        assert_eq!(None, parse_date("January 2nd"));
    }
}
