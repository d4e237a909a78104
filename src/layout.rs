//! Layouts are [`gtmpl`] templates stored as `<name>.html` in the layout
//! directories. A layout may begin with a front-matter block naming a
//! `layout` of its own, in which case its output becomes that parent's
//! `content`. Chains are resolved eagerly into explicit lists so that a
//! missing parent or a cycle is found before anything is rendered.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use gtmpl::{Context, Template, Value};
use thiserror::Error;
use walkdir::WalkDir;

use crate::document::LayoutRef;
use crate::frontmatter::{self, Field, FrontMatter};

const LAYOUT_EXTENSION: &str = "html";

/// A parsed layout template.
pub struct Layout {
    pub name: String,

    /// The layout this one is wrapped in, if any.
    pub parent: Option<String>,

    template: Template,
}

/// Every layout available to the site, by name.
#[derive(Default)]
pub struct Layouts {
    layouts: HashMap<String, Layout>,
}

impl Layouts {
    /// Loads every `*.html` file directly inside `directories`. When two
    /// directories define the same name, the earlier directory wins. Missing
    /// directories are fine.
    pub fn load(directories: &[PathBuf]) -> Result<Layouts> {
        let mut layouts = Layouts::default();
        for directory in directories {
            if !directory.is_dir() {
                continue;
            }
            for entry in WalkDir::new(directory)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
            {
                let entry = entry.map_err(|err| LayoutError::Io {
                    path: directory.clone(),
                    err: err.into(),
                })?;
                let path = entry.path();
                if !entry.file_type().is_file()
                    || path.extension().and_then(|e| e.to_str()) != Some(LAYOUT_EXTENSION)
                {
                    continue;
                }
                let name = match path.file_stem() {
                    Some(stem) => stem.to_string_lossy().into_owned(),
                    None => continue,
                };
                if layouts.layouts.contains_key(&name) {
                    tracing::debug!(layout = %name, path = %path.display(), "layout is overridden");
                    continue;
                }
                let text = fs::read_to_string(path).map_err(|err| LayoutError::Io {
                    path: path.to_owned(),
                    err,
                })?;
                layouts.insert(&name, &text)?;
            }
        }
        tracing::debug!(count = layouts.layouts.len(), "loaded layouts");
        Ok(layouts)
    }

    /// Builds layouts from `(name, text)` pairs rather than files.
    pub fn from_sources<'a>(
        sources: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Layouts> {
        let mut layouts = Layouts::default();
        for (name, text) in sources {
            layouts.insert(name, text)?;
        }
        Ok(layouts)
    }

    fn insert(&mut self, name: &str, text: &str) -> Result<()> {
        let parse_error = |message: String| LayoutError::Parse {
            layout: name.to_owned(),
            message,
        };
        let split = frontmatter::split(text).map_err(|err| parse_error(err.to_string()))?;
        let parent = match split.front_matter {
            None => None,
            Some(yaml) => FrontMatter::parse(yaml)
                .map_err(|err| parse_error(err.to_string()))?
                .get("layout")
                .and_then(Field::as_text)
                .filter(|parent| parent != "none"),
        };

        let mut template = Template::default();
        template.parse(split.body).map_err(parse_error)?;
        self.layouts.insert(
            name.to_owned(),
            Layout {
                name: name.to_owned(),
                parent,
                template,
            },
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.layouts.contains_key(name)
    }

    /// Resolves the layout chain for a document, innermost first. Fallback
    /// layouts that don't exist resolve to an empty chain.
    pub fn chain(&self, document: &Path, reference: &LayoutRef) -> Result<Vec<&Layout>> {
        match reference {
            LayoutRef::Bare => Ok(Vec::new()),
            LayoutRef::Fallback(name) if !self.contains(name) => Ok(Vec::new()),
            LayoutRef::Fallback(name) => self.resolve(document, name),
            LayoutRef::Named(name) => self.resolve(document, name),
        }
    }

    /// Resolves the chain starting at `name`, which must exist, as must every
    /// parent. `document` names the requester in errors.
    pub fn resolve(&self, document: &Path, name: &str) -> Result<Vec<&Layout>> {
        let mut chain: Vec<&Layout> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut next = Some(name);
        while let Some(name) = next {
            if !seen.insert(name) {
                let mut names: Vec<String> = chain.iter().map(|l| l.name.clone()).collect();
                names.push(name.to_owned());
                return Err(LayoutError::Cycle {
                    document: document.to_owned(),
                    chain: names,
                });
            }
            let layout = self.layouts.get(name).ok_or_else(|| LayoutError::Missing {
                document: document.to_owned(),
                layout: name.to_owned(),
            })?;
            chain.push(layout);
            next = layout.parent.as_deref();
        }
        Ok(chain)
    }

    /// Applies `chain` to `content`. Each layout sees the fields of `context`
    /// plus `content`: the document body for the innermost layout, and the
    /// previous layout's output for the rest.
    pub fn apply(
        chain: &[&Layout],
        document: &Path,
        content: String,
        context: &HashMap<String, Value>,
    ) -> Result<String> {
        let mut content = content;
        for layout in chain {
            let execute_error = |message: String| LayoutError::Execute {
                document: document.to_owned(),
                layout: layout.name.clone(),
                message,
            };
            let mut fields = context.clone();
            fields.insert(String::from("content"), Value::String(content));
            let context = Context::from(Value::Object(fields)).map_err(execute_error)?;
            let mut out: Vec<u8> = Vec::new();
            layout.template.execute(&mut out, &context).map_err(execute_error)?;
            content = String::from_utf8(out).map_err(|err| execute_error(err.to_string()))?;
        }
        Ok(content)
    }
}

/// Represents the result of a layout operation.
pub type Result<T> = std::result::Result<T, LayoutError>;

/// A problem with a layout. Always fatal.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// Returned when a document (or a layout's `layout` field) names a layout
    /// that doesn't exist.
    #[error("`{}`: layout `{layout}` does not exist", .document.display())]
    Missing { document: PathBuf, layout: String },

    /// Returned when a chain of parent layouts loops.
    #[error("`{}`: layout cycle {}", .document.display(), .chain.join(" -> "))]
    Cycle { document: PathBuf, chain: Vec<String> },

    /// Returned when a layout file isn't a valid template.
    #[error("parsing layout `{layout}`: {message}")]
    Parse { layout: String, message: String },

    /// Returned when a template fails while rendering a document.
    #[error("`{}`: applying layout `{layout}`: {message}", .document.display())]
    Execute {
        document: PathBuf,
        layout: String,
        message: String,
    },

    /// Returned when a layout file or directory can't be read.
    #[error("reading layout `{}`: {err}", .path.display())]
    Io { path: PathBuf, err: std::io::Error },
}

#[cfg(test)]
mod test {
    use super::*;

    fn layouts() -> Layouts {
        Layouts::from_sources(vec![
            ("base", "<html>{{ .content }}</html>"),
            (
                "post",
                "---\nlayout: base\n---\n<article><h1>{{ .title }}</h1>{{ .content }}</article>",
            ),
            ("loop-a", "---\nlayout: loop-b\n---\n{{ .content }}"),
            ("loop-b", "---\nlayout: loop-a\n---\n{{ .content }}"),
            ("orphan", "---\nlayout: gone\n---\n{{ .content }}"),
        ])
        .unwrap()
    }

    fn names(chain: &[&Layout]) -> Vec<String> {
        chain.iter().map(|l| l.name.clone()).collect()
    }

    #[test]
    fn test_chain() -> Result<()> {
        let layouts = layouts();
        let doc = Path::new("_posts/a.md");
        assert_eq!(
            vec!["post", "base"],
            names(&layouts.chain(doc, &LayoutRef::Named(String::from("post")))?)
        );
        assert!(layouts.chain(doc, &LayoutRef::Bare)?.is_empty());
        assert!(layouts.chain(doc, &LayoutRef::Fallback("page"))?.is_empty());
        assert_eq!(vec!["post", "base"], names(&layouts.chain(doc, &LayoutRef::Fallback("post"))?));
        Ok(())
    }

    #[test]
    fn test_missing() {
        let layouts = layouts();
        let doc = Path::new("_posts/a.md");
        match layouts.chain(doc, &LayoutRef::Named(String::from("missing-layout"))) {
            Err(err @ LayoutError::Missing { .. }) => {
                let message = err.to_string();
                assert!(message.contains("_posts/a.md"));
                assert!(message.contains("missing-layout"));
            }
            other => panic!("unexpected result: {:?}", other.map(|c| names(&c))),
        }
        assert!(matches!(
            layouts.resolve(doc, "orphan"),
            Err(LayoutError::Missing { layout, .. }) if layout == "gone"
        ));
    }

    #[test]
    fn test_cycle() {
        let layouts = layouts();
        match layouts.resolve(Path::new("a.md"), "loop-a") {
            Err(LayoutError::Cycle { chain, .. }) => {
                assert_eq!(vec!["loop-a", "loop-b", "loop-a"], chain)
            }
            other => panic!("unexpected result: {:?}", other.map(|c| names(&c))),
        }
    }

    #[test]
    fn test_apply() -> Result<()> {
        let layouts = layouts();
        let doc = Path::new("_posts/a.md");
        let chain = layouts.resolve(doc, "post")?;
        let mut context = HashMap::new();
        context.insert(String::from("title"), Value::String(String::from("Hi")));
        let html = Layouts::apply(&chain, doc, String::from("<p>body</p>"), &context)?;
        assert_eq!("<html><article><h1>Hi</h1><p>body</p></article></html>", html);
        Ok(())
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            Layouts::from_sources(vec![("bad", "{{ if }}")]),
            Err(LayoutError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_prefers_earlier_directories() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let site = dir.path().join("_layouts");
        let theme = dir.path().join("theme").join("_layouts");
        fs::create_dir_all(&site).unwrap();
        fs::create_dir_all(&theme).unwrap();
        fs::write(site.join("page.html"), "site {{ .content }}").unwrap();
        fs::write(theme.join("page.html"), "theme {{ .content }}").unwrap();
        fs::write(theme.join("home.html"), "home").unwrap();
        fs::write(theme.join("notes.txt"), "ignored").unwrap();

        let layouts = Layouts::load(&[site, theme, dir.path().join("missing")])?;
        assert!(layouts.contains("home"));
        assert!(!layouts.contains("notes"));
        let doc = Path::new("about.md");
        let chain = layouts.resolve(doc, "page")?;
        assert_eq!(
            "site x",
            Layouts::apply(&chain, doc, String::from("x"), &HashMap::new())?
        );
        Ok(())
    }
}
