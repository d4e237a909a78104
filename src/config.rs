//! Loads the site-wide [`Config`] from a `_config.yml` project file. The
//! config is built once per process and handed to every pipeline stage by
//! reference; nothing mutates it afterwards.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::plugin::Plugin;

/// The name of the project file. [`Config::from_directory`] looks for it in
/// the given directory and then in each parent directory.
pub const CONFIG_FILE: &str = "_config.yml";

/// Paths that are never content, regardless of the `exclude` setting.
const DEFAULT_EXCLUDES: &[&str] = &["Gemfile", "Gemfile.lock", "node_modules", "vendor"];

#[derive(Deserialize)]
struct PageSize(usize);
impl Default for PageSize {
    fn default() -> Self {
        PageSize(10)
    }
}

fn default_destination() -> PathBuf {
    PathBuf::from("_site")
}

fn default_index_layout() -> String {
    String::from("home")
}

#[derive(Deserialize)]
struct Project {
    #[serde(default)]
    title: String,

    url: Url,

    #[serde(default)]
    description: Option<String>,

    #[serde(default)]
    author: Option<AuthorSpec>,

    #[serde(default)]
    paginate: PageSize,

    #[serde(default)]
    theme: Option<PathBuf>,

    #[serde(default)]
    remote_theme: Option<String>,

    #[serde(default)]
    plugins: Vec<String>,

    #[serde(default = "default_destination")]
    destination: PathBuf,

    #[serde(default)]
    exclude: Vec<PathBuf>,

    #[serde(default = "default_index_layout")]
    index_layout: String,
}

// `author` may be written as a bare name or as a map.
#[derive(Deserialize)]
#[serde(untagged)]
enum AuthorSpec {
    Name(String),
    Full(Author),
}

/// The site author, used for the feed.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Author {
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,
}

/// Settings that come from the command line rather than the project file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    /// Replaces the configured `destination`.
    pub destination: Option<PathBuf>,

    /// Publish drafts as if they were regular documents.
    pub drafts: bool,

    /// Number of rendering threads. Defaults to the number of cores.
    pub threads: Option<usize>,
}

/// The immutable, fully-resolved site configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// The content root (the directory containing the project file).
    pub root: PathBuf,

    /// The project file itself.
    pub config_file: PathBuf,

    pub title: String,

    /// The canonical base URL. Always ends with a trailing slash so that
    /// [`Url::join`] treats it as a directory.
    pub url: Url,

    pub description: Option<String>,

    pub author: Option<Author>,

    /// Posts per index page. Always at least 1.
    pub page_size: usize,

    /// Directories searched for layouts, highest priority first.
    pub layout_directories: Vec<PathBuf>,

    /// The local theme directory, if any.
    pub theme_directory: Option<PathBuf>,

    /// Recorded so it can be reported; fetching remote themes is not
    /// supported.
    pub remote_theme: Option<String>,

    /// Enabled derived-artifact generators, in configuration order.
    pub plugins: Vec<Plugin>,

    /// Plugin names from the project file that have no generator here.
    pub ignored_plugins: Vec<String>,

    /// The output directory.
    pub destination: PathBuf,

    /// Absolute paths the scanner must never descend into.
    pub excluded: Vec<PathBuf>,

    /// The layout used for index pages.
    pub index_layout: String,

    pub drafts: bool,

    pub threads: usize,
}

impl Config {
    /// Searches `dir` and its ancestors for a [`CONFIG_FILE`] and loads the
    /// first one found.
    pub fn from_directory(dir: &Path, overrides: &Overrides) -> Result<Config> {
        for ancestor in dir.ancestors() {
            let path = ancestor.join(CONFIG_FILE);
            if path.is_file() {
                return Config::from_project_file(&path, overrides);
            }
        }
        Err(Error::NotFound(dir.to_owned()))
    }

    /// Loads the config from a specific project file. Relative paths in the
    /// file are resolved against the file's directory.
    pub fn from_project_file(path: &Path, overrides: &Overrides) -> Result<Config> {
        let file = File::open(path).map_err(|err| Error::Open {
            path: path.to_owned(),
            err,
        })?;
        let project: Project = serde_yaml::from_reader(file).map_err(|err| Error::Parse {
            path: path.to_owned(),
            err,
        })?;
        let parent = path
            .parent()
            .ok_or_else(|| Error::NoParent(path.to_owned()))?;
        let root = parent
            .canonicalize()
            .unwrap_or_else(|_| parent.to_owned());
        Config::from_project(project, root, overrides)
    }

    fn from_project(project: Project, root: PathBuf, overrides: &Overrides) -> Result<Config> {
        if project.paginate.0 < 1 {
            return Err(Error::PageSize(project.paginate.0));
        }

        let mut url = project.url;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        let mut plugins = Vec::new();
        let mut ignored_plugins = Vec::new();
        for name in &project.plugins {
            match name.parse::<Plugin>() {
                Ok(plugin) if !plugins.contains(&plugin) => plugins.push(plugin),
                Ok(_) => {}
                Err(_) => ignored_plugins.push(name.clone()),
            }
        }

        let destination = match &overrides.destination {
            Some(destination) => destination.clone(),
            None => root.join(&project.destination),
        };
        let theme_directory = project.theme.as_ref().map(|theme| root.join(theme));

        let mut layout_directories = vec![root.join("_layouts")];
        if let Some(theme) = &theme_directory {
            layout_directories.push(theme.join("_layouts"));
        }

        let config_file = root.join(CONFIG_FILE);
        let mut excluded: Vec<PathBuf> = vec![destination.clone(), config_file.clone()];
        excluded.extend(theme_directory.iter().cloned());
        excluded.extend(project.exclude.iter().map(|p| root.join(p)));
        excluded.extend(DEFAULT_EXCLUDES.iter().map(|p| root.join(p)));

        Ok(Config {
            title: project.title,
            url,
            description: project.description,
            author: project.author.map(|author| match author {
                AuthorSpec::Name(name) => Author { name, email: None },
                AuthorSpec::Full(author) => author,
            }),
            page_size: project.paginate.0,
            layout_directories,
            theme_directory,
            remote_theme: project.remote_theme,
            plugins,
            ignored_plugins,
            destination,
            excluded,
            index_layout: project.index_layout,
            drafts: overrides.drafts,
            threads: match overrides.threads {
                None => num_cpus::get(),
                Some(threads) => threads.max(1),
            },
            config_file,
            root,
        })
    }
}

/// Represents the result of loading a [`Config`].
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading a [`Config`].
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when no project file exists in the directory or any parent.
    #[error("could not find `{}` in `{}` or any parent directory", CONFIG_FILE, .0.display())]
    NotFound(PathBuf),

    /// Returned when the project file can't be opened.
    #[error("opening project file `{}`: {err}", .path.display())]
    Open { path: PathBuf, err: std::io::Error },

    /// Returned when the project file isn't valid.
    #[error("parsing project file `{}`: {err}", .path.display())]
    Parse {
        path: PathBuf,
        err: serde_yaml::Error,
    },

    /// Returned when the project file path has no parent directory.
    #[error("can't get parent directory for project file `{}`", .0.display())]
    NoParent(PathBuf),

    /// Returned when `paginate` is zero.
    #[error("`paginate` must be at least 1, got {0}")]
    PageSize(usize),
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    fn load(yaml: &str) -> Result<Config> {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), yaml).unwrap();
        let nested = dir.path().join("_posts");
        fs::create_dir(&nested).unwrap();
        Config::from_directory(&nested, &Overrides::default())
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let config = load("url: https://example.org/blog\n")?;
        assert_eq!("https://example.org/blog/", config.url.as_str());
        assert_eq!(10, config.page_size);
        assert_eq!("home", config.index_layout);
        assert!(config.plugins.is_empty());
        assert_eq!(config.root.join("_site"), config.destination);
        assert_eq!(vec![config.root.join("_layouts")], config.layout_directories);
        Ok(())
    }

    #[test]
    fn test_full() -> Result<()> {
        let config = load(
            "title: Notes\n\
             url: https://example.org/\n\
             author: Jo\n\
             paginate: 3\n\
             theme: minimal\n\
             plugins: [jekyll-feed, sitemap, jemoji, feed]\n\
             exclude: [drafts.txt]\n",
        )?;
        assert_eq!("Notes", config.title);
        assert_eq!(3, config.page_size);
        assert_eq!(
            Some(Author {
                name: String::from("Jo"),
                email: None
            }),
            config.author
        );
        assert_eq!(vec![Plugin::Feed, Plugin::Sitemap], config.plugins);
        assert_eq!(vec![String::from("jemoji")], config.ignored_plugins);
        assert_eq!(
            config.root.join("minimal").join("_layouts"),
            config.layout_directories[1]
        );
        assert!(config.excluded.contains(&config.root.join("drafts.txt")));
        assert!(config.excluded.contains(&config.root.join("minimal")));
        Ok(())
    }

    #[test]
    fn test_zero_page_size() {
        assert!(matches!(
            load("url: https://example.org/\npaginate: 0\n"),
            Err(Error::PageSize(0))
        ));
    }

    #[test]
    fn test_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::from_directory(dir.path(), &Overrides::default()),
            Err(Error::NotFound(_))
        ));
    }
}
