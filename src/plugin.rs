//! Derived-artifact generators. A generator sees the finished site (the
//! config, the [`SiteIndex`], and every page artifact) and produces one more
//! artifact from it. Generators are enabled by name from the `plugins` list
//! in the project file; there is no dynamic loading.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::artifact::Artifact;
use crate::config::Config;
use crate::feed::FeedGenerator;
use crate::index::SiteIndex;
use crate::sitemap::SitemapGenerator;

/// Everything a generator may look at.
pub struct Derivation<'a> {
    pub config: &'a Config,
    pub index: &'a SiteIndex<'a>,

    /// Every artifact assembled so far (pages, index pages, assets), sorted
    /// by path.
    pub artifacts: &'a [Artifact],
}

/// Produces one artifact derived from the rest of the site.
pub trait DerivedArtifactGenerator {
    /// The canonical plugin name, for logs and errors.
    fn name(&self) -> &'static str;

    fn produce(&self, derivation: &Derivation) -> Result<Artifact>;
}

/// The generators this build knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Plugin {
    /// An Atom feed of posts at `feed.xml`.
    Feed,

    /// A `sitemap.xml` listing every indexable page.
    Sitemap,
}

impl Plugin {
    /// Creates the generator for this plugin.
    pub fn generator(&self) -> Box<dyn DerivedArtifactGenerator> {
        match self {
            Plugin::Feed => Box::new(FeedGenerator),
            Plugin::Sitemap => Box::new(SitemapGenerator),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plugin::Feed => "feed",
            Plugin::Sitemap => "sitemap",
        }
    }
}

impl fmt::Display for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plugin {
    type Err = UnknownPlugin;

    /// Accepts the canonical names plus the Jekyll gem names, so existing
    /// project files keep working.
    fn from_str(s: &str) -> std::result::Result<Plugin, UnknownPlugin> {
        match s.trim() {
            "feed" | "jekyll-feed" => Ok(Plugin::Feed),
            "sitemap" | "jekyll-sitemap" => Ok(Plugin::Sitemap),
            other => Err(UnknownPlugin(other.to_owned())),
        }
    }
}

/// Returned when a plugin name has no generator.
#[derive(Debug, Error, PartialEq)]
#[error("unknown plugin `{0}`")]
pub struct UnknownPlugin(pub String);

/// Represents the result of running a generator.
pub type Result<T> = std::result::Result<T, Error>;

/// A generator failed. Fatal to the build.
#[derive(Debug, Error)]
#[error("plugin `{plugin}`: {message}")]
pub struct Error {
    pub plugin: &'static str,
    pub message: String,
}
