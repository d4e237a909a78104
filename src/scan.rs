//! The source scanner: walks the content root and classifies what it finds
//! into documents (Markdown sources whose text is read eagerly per entry) and
//! static assets (copied verbatim later). The walk is lazy and restartable;
//! each call to [`Scanner::entries`] starts over from the root.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// File extensions treated as Markdown documents.
pub const CONTENT_EXTENSIONS: &[&str] = &["md", "markdown"];

/// The top-level directory holding posts.
pub const POSTS_DIRECTORY: &str = "_posts";

/// The top-level directory holding unpublished posts.
pub const DRAFTS_DIRECTORY: &str = "_drafts";

/// A document source file read into memory.
#[derive(Clone, Debug)]
pub struct Source {
    /// Path relative to the content root.
    pub path: PathBuf,

    /// The file contents.
    pub text: String,
}

/// One item yielded by [`Scanner::entries`].
#[derive(Debug)]
pub enum Entry {
    /// A Markdown source.
    Document(Source),

    /// A static asset, as a path relative to the content root.
    Asset(PathBuf),

    /// A file (or directory) that could not be read. Not fatal; the caller
    /// reports it and moves on.
    Unreadable { path: PathBuf, error: io::Error },
}

/// The classification of a single path, see [`Scanner::classify`].
#[derive(Debug, PartialEq)]
pub enum Class {
    Document,
    Asset,
    Skipped,
}

/// Walks a content root.
pub struct Scanner<'a> {
    root: &'a Path,

    /// Absolute paths (files or directories) that are never visited.
    excluded: &'a [PathBuf],
}

impl<'a> Scanner<'a> {
    pub fn new(root: &'a Path, excluded: &'a [PathBuf]) -> Scanner<'a> {
        Scanner { root, excluded }
    }

    /// Returns a lazy iterator over every document and asset under the root,
    /// in file-name order. Fails only when the root itself can't be read.
    pub fn entries(&self) -> Result<impl Iterator<Item = Entry> + '_> {
        let metadata = fs::metadata(self.root).map_err(|err| ScanError::Root {
            path: self.root.to_owned(),
            err,
        })?;
        if !metadata.is_dir() {
            return Err(ScanError::NotADirectory(self.root.to_owned()));
        }
        // Surface permission problems on the root up front rather than as a
        // per-entry warning.
        fs::read_dir(self.root).map_err(|err| ScanError::Root {
            path: self.root.to_owned(),
            err,
        })?;

        Ok(self.walk(self.root, 0))
    }

    /// Every document and asset at or below `relative`, by the same rules as
    /// [`Scanner::entries`]. Empty if the path itself is skipped. Used by
    /// watch mode when a whole directory appears.
    pub fn entries_under(&self, relative: &Path) -> Vec<Entry> {
        let depth = relative.components().count();
        if depth > 0 && self.classify(relative) == Class::Skipped {
            return Vec::new();
        }
        self.walk(&self.root.join(relative), depth).collect()
    }

    // `depth` is how far `start` is below the root.
    fn walk(&self, start: &Path, depth: usize) -> impl Iterator<Item = Entry> + '_ {
        WalkDir::new(start)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| entry.depth() == 0 || !self.skipped(entry, depth))
            .filter_map(move |result| match result {
                Err(err) => {
                    let path = err
                        .path()
                        .map(|p| self.relative(p))
                        .unwrap_or_default();
                    Some(Entry::Unreadable {
                        path,
                        error: err.into(),
                    })
                }
                Ok(entry) if entry.file_type().is_dir() => None,
                Ok(entry) => Some(self.read(&self.relative(entry.path()))),
            })
    }

    /// Classifies a path relative to the root by applying the same skip rules
    /// the walk applies, to every component of the path.
    pub fn classify(&self, relative: &Path) -> Class {
        if self.is_excluded(&self.root.join(relative)) {
            return Class::Skipped;
        }
        let components: Vec<_> = relative.components().collect();
        if components.is_empty() {
            return Class::Skipped;
        }
        for (i, component) in components.iter().enumerate() {
            match component {
                Component::Normal(name) => {
                    if skip_name(&name.to_string_lossy(), i + 1) {
                        return Class::Skipped;
                    }
                }
                _ => return Class::Skipped,
            }
        }
        match is_content(relative) {
            true => Class::Document,
            false => Class::Asset,
        }
    }

    /// Reads a single file relative to the root. Used both by the walk and by
    /// watch mode when one file changes.
    pub fn read(&self, relative: &Path) -> Entry {
        if !is_content(relative) {
            return Entry::Asset(relative.to_owned());
        }
        match fs::read_to_string(self.root.join(relative)) {
            Ok(text) => Entry::Document(Source {
                path: relative.to_owned(),
                text,
            }),
            Err(error) => Entry::Unreadable {
                path: relative.to_owned(),
                error,
            },
        }
    }

    fn skipped(&self, entry: &DirEntry, depth: usize) -> bool {
        skip_name(&entry.file_name().to_string_lossy(), depth + entry.depth())
            || self.is_excluded(entry.path())
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.excluded.iter().any(|excluded| path.starts_with(excluded))
    }

    fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(self.root).unwrap_or(path).to_owned()
    }
}

// Hidden files, editor backups, and `_`-prefixed system paths are skipped,
// except for the top-level post directories.
fn skip_name(name: &str, depth: usize) -> bool {
    if name.starts_with('.') || name.ends_with('~') {
        return true;
    }
    if name.starts_with('_') {
        return !(depth == 1 && (name == POSTS_DIRECTORY || name == DRAFTS_DIRECTORY));
    }
    false
}

/// Whether the path has a Markdown extension.
pub fn is_content(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| CONTENT_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Represents the result of a scan.
pub type Result<T> = std::result::Result<T, ScanError>;

/// A fatal scanning problem: the content root itself is unusable.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("reading content root `{}`: {err}", .path.display())]
    Root { path: PathBuf, err: io::Error },

    #[error("content root `{}` is not a directory", .0.display())]
    NotADirectory(PathBuf),
}
