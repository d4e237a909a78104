//! Exports [`Site`] and [`build_site`], which stitch together the high-level
//! steps of a build: scanning the content root ([`crate::scan`]), parsing
//! documents ([`crate::document`]), rendering them ([`crate::markdown`]),
//! assembling pages, indexes and derived files ([`crate::assemble`]), and
//! publishing the result ([`crate::publish`]).
//!
//! Fatal errors abort the build before anything is published. Everything
//! else is a [`Warning`], logged when it happens and collected in the
//! [`Report`].

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::artifact::Artifact;
use crate::assemble::{self, read_asset, AssetError, Assembler, CollisionError};
use crate::config::Config;
use crate::document::{Document, Kind, MetadataError};
use crate::index::SiteIndex;
use crate::layout::{LayoutError, Layouts};
use crate::markdown::{render_all, RenderWarning, RenderedDocument, Renderer};
use crate::plugin;
use crate::publish::{self, publish, publish_changes, Lock, Manifest};
use crate::scan::{Class, Entry, ScanError, Scanner, Source};
use crate::url::LinkIndex;

/// A non-fatal problem found during a build.
#[derive(Debug, Error)]
pub enum Warning {
    #[error("skipping unreadable `{}`: {error}", .path.display())]
    Unreadable { path: PathBuf, error: io::Error },

    #[error("{0} (using default metadata)")]
    Metadata(MetadataError),

    #[error(transparent)]
    Render(#[from] RenderWarning),

    #[error("{0} (skipped)")]
    Asset(#[from] AssetError),

    #[error("plugin `{0}` is not supported (ignored)")]
    IgnoredPlugin(String),
}

/// The end-of-build summary.
#[derive(Debug, Default)]
pub struct Report {
    /// Documents parsed, published or not.
    pub documents: usize,
    pub posts: usize,
    pub pages: usize,

    /// Drafts found. They count as posts or pages when drafts are published.
    pub drafts: usize,

    pub warnings: Vec<Warning>,
    pub written: usize,
    pub unchanged: usize,
    pub removed: usize,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "{} documents ({} posts, {} pages, {} drafts): {} written, {} unchanged, {} removed",
            self.documents,
            self.posts,
            self.pages,
            self.drafts,
            self.written,
            self.unchanged,
            self.removed,
        )?;
        match self.warnings.len() {
            0 => Ok(()),
            n => {
                writeln!(f, "{} warning{}:", n, if n == 1 { "" } else { "s" })?;
                for warning in &self.warnings {
                    writeln!(f, "  {}", warning)?;
                }
                Ok(())
            }
        }
    }
}

// What the last successful build saw. Watch mode updates this
// incrementally.
#[derive(Clone)]
struct State {
    /// Every parsed document, drafts included, by source path.
    documents: BTreeMap<PathBuf, Document>,

    /// Published documents only.
    rendered: BTreeMap<PathBuf, RenderedDocument>,

    assets: BTreeMap<PathBuf, Artifact>,

    manifest: Manifest,
}

impl State {
    // Drops every document and asset at or below `relative`. Returns whether
    // there was anything to drop.
    fn forget(&mut self, relative: &Path) -> bool {
        let before = self.documents.len() + self.assets.len();
        self.documents.retain(|source, _| !source.starts_with(relative));
        self.rendered.retain(|source, _| !source.starts_with(relative));
        self.assets.retain(|source, _| !source.starts_with(relative));
        before != self.documents.len() + self.assets.len()
    }
}

/// A site being built, possibly repeatedly.
pub struct Site {
    config: Config,
    state: Option<State>,
}

impl Site {
    pub fn new(config: Config) -> Site {
        Site {
            config,
            state: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the whole pipeline and replaces the destination. The caller is
    /// expected to hold the destination's [`Lock`].
    pub fn build(&mut self) -> Result<Report> {
        let config = &self.config;
        let mut report = Report::default();
        for plugin in &config.ignored_plugins {
            warn(&mut report, Warning::IgnoredPlugin(plugin.clone()));
        }

        tracing::info!(root = %config.root.display(), "scanning");
        let scanner = Scanner::new(&config.root, &config.excluded);
        let mut sources = Vec::new();
        let mut asset_paths = Vec::new();
        for entry in scanner.entries()? {
            match entry {
                Entry::Document(source) => sources.push(source),
                Entry::Asset(path) => asset_paths.push(path),
                Entry::Unreadable { path, error } => {
                    warn(&mut report, Warning::Unreadable { path, error })
                }
            }
        }

        let mut documents = BTreeMap::new();
        for source in sources {
            let document = parse(source, &mut report)?;
            documents.insert(document.source.clone(), document);
        }

        let mut assets = BTreeMap::new();
        for path in asset_paths {
            match read_asset(&config.root, &path) {
                Ok(asset) => {
                    assets.insert(path, asset);
                }
                Err(err) => warn(&mut report, Warning::Asset(err)),
            }
        }

        let published: Vec<Document> = documents
            .values()
            .filter(|d| d.is_published(config))
            .cloned()
            .collect();
        let links = LinkIndex::new(&config.url, &published);
        tracing::info!(documents = published.len(), threads = config.threads, "rendering");
        let (rendered, warnings) = render_all(&Renderer::new(&links), published, config.threads);
        for warning in warnings {
            warn(&mut report, Warning::Render(warning));
        }
        let rendered: BTreeMap<PathBuf, RenderedDocument> = rendered
            .into_iter()
            .map(|r| (r.document.source.clone(), r))
            .collect();

        let artifacts = assemble_site(config, &rendered, &assets)?;
        let manifest = publish(&config.destination, &artifacts)?;
        report.written = artifacts.len();

        count(&mut report, config, &documents);
        self.state = Some(State {
            documents,
            rendered,
            assets,
            manifest,
        });
        Ok(report)
    }

    /// Rebuilds after the given files changed, re-parsing and re-rendering
    /// only those documents and publishing only the artifacts whose content
    /// changed. Paths are absolute. Returns `None` when none of the paths
    /// affect the site. Runs a full [`Site::build`] if there was no previous
    /// successful build.
    ///
    /// Other documents are not re-rendered, so links from them to a document
    /// whose output path changed stay stale until the next full build.
    pub fn update(&mut self, changed: &[PathBuf]) -> Result<Option<Report>> {
        let mut state = match self.state.clone() {
            Some(state) => state,
            None => return self.build().map(Some),
        };
        let config = &self.config;
        let scanner = Scanner::new(&config.root, &config.excluded);
        let mut report = Report::default();
        let mut relevant = false;
        let mut reparsed: Vec<PathBuf> = Vec::new();

        for path in changed {
            if path == &config.config_file {
                tracing::warn!(
                    path = %path.display(),
                    "configuration changed; restart to pick up the new settings"
                );
                continue;
            }
            if is_layout(config, path) {
                relevant = true;
                continue;
            }
            let relative = match path.strip_prefix(&config.root) {
                Ok(relative) => relative,
                Err(_) => continue,
            };

            // Whatever the path covered before, a file or a whole directory,
            // is forgotten and then read back from disk.
            if state.forget(relative) {
                relevant = true;
                tracing::debug!(path = %relative.display(), "forgot previous sources");
            }
            let entries = match path.is_dir() {
                true => scanner.entries_under(relative),
                false => match scanner.classify(relative) {
                    Class::Skipped => continue,
                    _ if !path.exists() => {
                        relevant = true;
                        continue;
                    }
                    _ => vec![scanner.read(relative)],
                },
            };
            for entry in entries {
                relevant = true;
                match entry {
                    Entry::Document(source) => {
                        let document = parse(source, &mut report)?;
                        reparsed.push(document.source.clone());
                        state.documents.insert(document.source.clone(), document);
                    }
                    Entry::Asset(asset) => match read_asset(&config.root, &asset) {
                        Ok(artifact) => {
                            state.assets.insert(asset, artifact);
                        }
                        Err(err) => warn(&mut report, Warning::Asset(err)),
                    },
                    Entry::Unreadable { path, error } => {
                        warn(&mut report, Warning::Unreadable { path, error })
                    }
                }
            }
        }
        if !relevant {
            return Ok(None);
        }

        let all: Vec<Document> = state
            .documents
            .values()
            .filter(|d| d.is_published(config))
            .cloned()
            .collect();
        let links = LinkIndex::new(&config.url, &all);
        let to_render: Vec<Document> = reparsed
            .iter()
            .filter_map(|source| state.documents.get(source))
            .filter(|d| d.is_published(config))
            .cloned()
            .collect();
        tracing::info!(documents = to_render.len(), "re-rendering");
        let (rendered, warnings) = render_all(&Renderer::new(&links), to_render, config.threads);
        for warning in warnings {
            warn(&mut report, Warning::Render(warning));
        }
        for rendered in rendered {
            state.rendered.insert(rendered.document.source.clone(), rendered);
        }

        let artifacts = assemble_site(config, &state.rendered, &state.assets)?;
        let (manifest, changes) =
            publish_changes(&config.destination, &artifacts, &state.manifest)?;
        report.written = changes.written.len();
        report.unchanged = changes.unchanged;
        report.removed = changes.removed.len();

        count(&mut report, config, &state.documents);
        state.manifest = manifest;
        self.state = Some(state);
        Ok(Some(report))
    }
}

/// Builds the site described by `config` into its destination, holding the
/// destination lock for the duration.
pub fn build_site(config: &Config) -> Result<Report> {
    let _lock = Lock::acquire(&config.destination)?;
    Site::new(config.clone()).build()
}

fn warn(report: &mut Report, warning: Warning) {
    tracing::warn!("{}", warning);
    report.warnings.push(warning);
}

fn parse(source: Source, report: &mut Report) -> Result<Document> {
    let parsed = Document::parse(source)?;
    if let Some(warning) = parsed.warning {
        warn(report, Warning::Metadata(warning));
    }
    Ok(parsed.document)
}

fn is_layout(config: &Config, path: &Path) -> bool {
    config
        .layout_directories
        .iter()
        .any(|directory| path.starts_with(directory))
}

fn count(report: &mut Report, config: &Config, documents: &BTreeMap<PathBuf, Document>) {
    report.documents = documents.len();
    for document in documents.values() {
        if document.draft {
            report.drafts += 1;
        }
        if !document.is_published(config) {
            continue;
        }
        match document.kind {
            Kind::Post => report.posts += 1,
            Kind::Page => report.pages += 1,
        }
    }
}

// Stage 4 over the current state: index, layouts, pages, derived files.
fn assemble_site(
    config: &Config,
    rendered: &BTreeMap<PathBuf, RenderedDocument>,
    assets: &BTreeMap<PathBuf, Artifact>,
) -> Result<Vec<Artifact>> {
    let layouts = Layouts::load(&config.layout_directories)?;
    let rendered: Vec<RenderedDocument> = rendered.values().cloned().collect();
    let index = SiteIndex::new(&rendered, config.page_size);
    tracing::info!(
        posts = index.posts.len(),
        pages = index.pages.len(),
        categories = index.categories.len(),
        tags = index.tags.len(),
        "assembling"
    );
    let artifacts = Assembler::new(config, &layouts).assemble(&index, assets.values().cloned())?;
    Ok(artifacts)
}

/// Represents the result of a build.
pub type Result<T> = std::result::Result<T, Error>;

/// A fatal build error. Nothing is published when one occurs.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Collision(#[from] CollisionError),

    #[error(transparent)]
    Plugin(#[from] plugin::Error),

    #[error(transparent)]
    Publish(#[from] publish::Error),
}

impl From<assemble::Error> for Error {
    fn from(err: assemble::Error) -> Error {
        match err {
            assemble::Error::Layout(err) => Error::Layout(err),
            assemble::Error::Collision(err) => Error::Collision(err),
            assemble::Error::Plugin(err) => Error::Plugin(err),
        }
    }
}
