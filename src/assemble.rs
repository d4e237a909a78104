//! Turns rendered documents into the complete, in-memory set of output
//! [`Artifact`]s: document pages wrapped in their layouts, paginated index
//! pages for the main post list and for every category and tag, copied
//! assets, and whatever the enabled plugins derive from all of that.
//!
//! Index pages live under `pages/` (`pages/index.html`, `pages/2.html`, ...)
//! and the label indexes under `categories/<slug>/` and `tags/<slug>/` with
//! the same naming. Unless a document claims it, `index.html` at the root is
//! a copy of the first main index page.

use std::collections::btree_map::{BTreeMap, Entry};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use gtmpl::Value;
use thiserror::Error;

use crate::artifact::{Artifact, ContentType};
use crate::config::Config;
use crate::index::{paginate, SiteIndex};
use crate::label::Label;
use crate::layout::{Layout, LayoutError, Layouts};
use crate::markdown::RenderedDocument;
use crate::plugin::{self, Derivation};
use crate::value;

/// The directory holding the main index pages.
pub const INDEX_DIRECTORY: &str = "pages";

/// The directory holding category index pages.
pub const CATEGORIES: &str = "categories";

/// The directory holding tag index pages.
pub const TAGS: &str = "tags";

const ROOT_INDEX: &str = "index.html";

/// The directory for a label's index pages, e.g. `tags/rust`.
pub fn label_directory(kind: &str, label: &Label) -> PathBuf {
    Path::new(kind).join(&label.slug)
}

/// The path of the `number`th (1-based) page of the index in `directory`.
pub fn index_page_path(directory: &Path, number: usize) -> PathBuf {
    match number {
        0 | 1 => directory.join(ROOT_INDEX),
        n => directory.join(format!("{}.html", n)),
    }
}

/// Reads a static asset into an artifact.
pub fn read_asset(root: &Path, path: &Path) -> std::result::Result<Artifact, AssetError> {
    let contents = fs::read(root.join(path)).map_err(|err| AssetError {
        path: path.to_owned(),
        err,
    })?;
    let content_type = ContentType::from_path(path);
    Ok(Artifact {
        path: path.to_owned(),
        contents,
        content_type,
        date: None,
        indexable: content_type == ContentType::HTML,
        origin: path.to_string_lossy().into_owned(),
    })
}

/// An asset that couldn't be read. Not fatal; the asset is left out.
#[derive(Debug, Error)]
#[error("reading asset `{}`: {err}", .path.display())]
pub struct AssetError {
    pub path: PathBuf,
    pub err: io::Error,
}

/// One index: a list of posts paginated under a directory.
struct Listing<'a, 'b> {
    directory: PathBuf,
    title: String,
    label: Value,
    posts: &'b [&'a RenderedDocument],
}

/// Assembles artifacts. Holds no state between builds.
pub struct Assembler<'a> {
    config: &'a Config,
    layouts: &'a Layouts,
}

impl<'a> Assembler<'a> {
    pub fn new(config: &'a Config, layouts: &'a Layouts) -> Assembler<'a> {
        Assembler { config, layouts }
    }

    /// Builds every artifact of the site, sorted by path. `assets` are
    /// already-read static files.
    pub fn assemble(
        &self,
        index: &SiteIndex,
        assets: impl IntoIterator<Item = Artifact>,
    ) -> Result<Vec<Artifact>> {
        let mut artifacts = Artifacts::default();

        for (i, post) in index.posts.iter().enumerate() {
            let newer = match i {
                0 => None,
                _ => index.posts.get(i - 1),
            };
            let older = index.posts.get(i + 1);
            artifacts.insert(self.document_page(
                post,
                newer.map(|p| p.url.as_str()),
                older.map(|p| p.url.as_str()),
            )?)?;
        }
        for page in &index.pages {
            artifacts.insert(self.document_page(page, None, None)?)?;
        }

        if !index.posts.is_empty() {
            let listings = self.listings(index);
            let chain = self.layouts.resolve(
                &Path::new(INDEX_DIRECTORY).join(ROOT_INDEX),
                &self.config.index_layout,
            )?;
            for listing in &listings {
                for artifact in self.index_pages(&chain, listing, index.page_size())? {
                    artifacts.insert(artifact)?;
                }
            }
        }

        for asset in assets {
            artifacts.insert(asset)?;
        }

        // The root alias never collides: it only exists when nothing else
        // claims the path.
        let first_index = index_page_path(Path::new(INDEX_DIRECTORY), 1);
        if !artifacts.contains(Path::new(ROOT_INDEX)) {
            if let Some(first) = artifacts.get(&first_index) {
                let mut alias = first.clone();
                alias.path = PathBuf::from(ROOT_INDEX);
                alias.indexable = false;
                alias.origin = first_index.to_string_lossy().into_owned();
                artifacts.insert(alias)?;
            }
        }

        let mut derived = Vec::with_capacity(self.config.plugins.len());
        {
            let pages: Vec<Artifact> = artifacts.values().cloned().collect();
            let derivation = Derivation {
                config: self.config,
                index,
                artifacts: &pages,
            };
            for plugin in &self.config.plugins {
                let generator = plugin.generator();
                tracing::debug!(plugin = generator.name(), "running plugin");
                derived.push(generator.produce(&derivation)?);
            }
        }
        for artifact in derived {
            artifacts.insert(artifact)?;
        }

        Ok(artifacts.into_sorted())
    }

    fn base_context(&self, page: Value) -> HashMap<String, Value> {
        let mut context: HashMap<String, Value> = HashMap::new();
        context.insert("site".to_owned(), value::site(self.config));
        context.insert("page".to_owned(), page);
        context.insert("paginator".to_owned(), Value::Nil);
        context.insert("prev".to_owned(), Value::Nil);
        context.insert("next".to_owned(), Value::Nil);
        context
    }

    fn document_page(
        &self,
        rendered: &RenderedDocument,
        prev: Option<&str>,
        next: Option<&str>,
    ) -> Result<Artifact> {
        let document = &rendered.document;
        let chain = self.layouts.chain(&document.source, &document.layout)?;
        let mut context = self.base_context(value::page(&self.config.url, rendered));
        context.insert("prev".to_owned(), value::url(prev));
        context.insert("next".to_owned(), value::url(next));
        let html = Layouts::apply(&chain, &document.source, rendered.html.clone(), &context)?;
        Ok(Artifact {
            path: document.output.clone(),
            contents: html.into_bytes(),
            content_type: ContentType::HTML,
            date: document.date,
            indexable: document.sitemap && !document.draft,
            origin: document.source.to_string_lossy().into_owned(),
        })
    }

    // The main index first, then categories and tags in slug order.
    fn listings<'b, 'c>(&self, index: &'c SiteIndex<'b>) -> Vec<Listing<'b, 'c>> {
        let mut listings = vec![Listing {
            directory: PathBuf::from(INDEX_DIRECTORY),
            title: self.config.title.clone(),
            label: Value::Nil,
            posts: &index.posts,
        }];
        for &(kind, labels) in &[(CATEGORIES, &index.categories), (TAGS, &index.tags)] {
            for (label, posts) in labels.iter() {
                listings.push(Listing {
                    directory: label_directory(kind, label),
                    title: label.name.clone(),
                    label: value::label(&self.config.url, kind, label),
                    posts,
                });
            }
        }
        listings
    }

    fn index_pages(
        &self,
        chain: &[&Layout],
        listing: &Listing,
        page_size: usize,
    ) -> Result<Vec<Artifact>> {
        let groups = paginate(listing.posts, page_size);
        let total_pages = groups.len();
        let url_of = |number: usize| {
            crate::url::absolute(
                &self.config.url,
                &index_page_path(&listing.directory, number),
            )
        };

        let mut pages = Vec::with_capacity(total_pages);
        for (i, group) in groups.into_iter().enumerate() {
            let number = i + 1;
            let path = index_page_path(&listing.directory, number);
            let prev = match number {
                1 => None,
                n => Some(url_of(n - 1)),
            };
            let next = match number < total_pages {
                true => Some(url_of(number + 1)),
                false => None,
            };

            let mut paginator: HashMap<String, Value> = HashMap::new();
            paginator.insert(
                "posts".to_owned(),
                Value::Array(
                    group
                        .iter()
                        .map(|post| value::page(&self.config.url, post))
                        .collect(),
                ),
            );
            paginator.insert("page".to_owned(), Value::from(number as u64));
            paginator.insert("total_pages".to_owned(), Value::from(total_pages as u64));
            paginator.insert("prev".to_owned(), value::url(prev.as_deref()));
            paginator.insert("next".to_owned(), value::url(next.as_deref()));
            paginator.insert("label".to_owned(), listing.label.clone());

            let mut page: HashMap<String, Value> = HashMap::new();
            page.insert("title".to_owned(), Value::String(listing.title.clone()));
            page.insert("url".to_owned(), Value::String(url_of(number)));
            page.insert("kind".to_owned(), Value::String(String::from("index")));

            let mut context = self.base_context(Value::Object(page));
            context.insert("paginator".to_owned(), Value::Object(paginator));
            context.insert("prev".to_owned(), value::url(prev.as_deref()));
            context.insert("next".to_owned(), value::url(next.as_deref()));

            let html = Layouts::apply(chain, &path, String::new(), &context)?;
            pages.push(Artifact {
                origin: path.to_string_lossy().into_owned(),
                path,
                contents: html.into_bytes(),
                content_type: ContentType::HTML,
                date: None,
                indexable: true,
            });
        }
        Ok(pages)
    }
}

// Artifacts by path, refusing duplicates.
#[derive(Default)]
struct Artifacts(BTreeMap<PathBuf, Artifact>);

impl Artifacts {
    fn insert(&mut self, artifact: Artifact) -> std::result::Result<(), CollisionError> {
        match self.0.entry(artifact.path.clone()) {
            Entry::Occupied(existing) => Err(CollisionError {
                path: artifact.path,
                first: existing.get().origin.clone(),
                second: artifact.origin,
            }),
            Entry::Vacant(slot) => {
                slot.insert(artifact);
                Ok(())
            }
        }
    }

    fn contains(&self, path: &Path) -> bool {
        self.0.contains_key(path)
    }

    fn get(&self, path: &Path) -> Option<&Artifact> {
        self.0.get(path)
    }

    fn values(&self) -> impl Iterator<Item = &Artifact> {
        self.0.values()
    }

    fn into_sorted(self) -> Vec<Artifact> {
        self.0.into_values().collect()
    }
}

/// Two artifacts want the same destination path.
#[derive(Debug, Error)]
#[error("`{}` is produced by both `{first}` and `{second}`", .path.display())]
pub struct CollisionError {
    pub path: PathBuf,
    pub first: String,
    pub second: String,
}

/// Represents the result of assembling a site.
pub type Result<T> = std::result::Result<T, Error>;

/// A fatal assembly problem.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Collision(#[from] CollisionError),

    #[error(transparent)]
    Plugin(#[from] plugin::Error),
}
