//! Creates new post and page sources with starter front matter.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;

use crate::config::Config;
use crate::document::Kind;
use crate::frontmatter::{self, Field, FrontMatter};
use crate::scan::POSTS_DIRECTORY;
use crate::value::DATE_FORMAT;

/// Writes a new source for a document titled `title` and returns its path.
/// Posts go to `_posts/YYYY-MM-DD-slug.md`, pages to `slug.md` at the root.
/// No `layout` is written, so the document gets the default layout for its
/// kind if the site has one. An existing file is never overwritten.
pub fn scaffold(config: &Config, kind: Kind, title: &str, date: NaiveDate) -> Result<PathBuf> {
    let slug = slug::slugify(title);
    if slug.is_empty() {
        return Err(Error::Title(title.to_owned()));
    }

    let mut front_matter = FrontMatter::new();
    front_matter.insert("title", title);
    let path = match kind {
        Kind::Post => {
            front_matter.insert("date", date.format(DATE_FORMAT).to_string());
            front_matter.insert("categories", Field::List(Vec::new()));
            front_matter.insert("tags", Field::List(Vec::new()));
            config
                .root
                .join(POSTS_DIRECTORY)
                .join(format!("{}-{}.md", date.format(DATE_FORMAT), slug))
        }
        Kind::Page => config.root.join(format!("{}.md", slug)),
    };

    let text = front_matter.serialize()?;
    create(&path, &text)?;
    tracing::info!(path = %path.display(), kind = kind.as_str(), "created");
    Ok(path)
}

fn create(path: &Path, text: &str) -> Result<()> {
    let io_error = |err| Error::Io {
        path: path.to_owned(),
        err,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            return Err(Error::Exists(path.to_owned()))
        }
        Err(err) => return Err(io_error(err)),
    };
    writeln!(file, "{}", text).map_err(io_error)
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("`{}` already exists", .0.display())]
    Exists(PathBuf),

    #[error("can't make a file name from the title {0:?}")]
    Title(String),

    #[error("serializing front matter: {0}")]
    FrontMatter(#[from] frontmatter::Error),

    #[error("writing `{}`: {err}", .path.display())]
    Io { path: PathBuf, err: io::Error },
}
