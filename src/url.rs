//! Link handling: mapping output paths to absolute site URLs, and rewriting
//! links found in Markdown bodies so that links between sources (`foo.md`)
//! point at the rendered pages instead.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use url::{ParseError, Url};

use crate::document::Document;
use crate::scan::is_content;

/// Returns the absolute URL of an output path. `index.html` files are
/// addressed by their directory.
pub fn absolute(site_url: &Url, output: &Path) -> String {
    let mut relative = output
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    if relative == "index.html" {
        relative.clear();
    } else if relative.ends_with("/index.html") {
        relative.truncate(relative.len() - "index.html".len());
    }
    // The `./` keeps a first segment containing `:` from parsing as a scheme.
    match site_url.join(&format!("./{}", relative)) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{}{}", site_url, relative),
    }
}

/// Knows where every document will be published, so that links between
/// sources can be converted into links between output pages.
pub struct LinkIndex {
    site_url: Url,

    /// Source path (relative to the content root) to output path.
    targets: HashMap<PathBuf, PathBuf>,
}

impl LinkIndex {
    pub fn new<'a>(site_url: &Url, documents: impl IntoIterator<Item = &'a Document>) -> LinkIndex {
        LinkIndex {
            site_url: site_url.clone(),
            targets: documents
                .into_iter()
                .map(|d| (d.source.clone(), d.output.clone()))
                .collect(),
        }
    }

    pub fn site_url(&self) -> &Url {
        &self.site_url
    }

    /// The absolute URL of a document's output page.
    pub fn url_of(&self, document: &Document) -> String {
        absolute(&self.site_url, &document.output)
    }

    /// Converts `href`, found in the source at `from`, into its output form.
    ///
    /// * Absolute URLs (with a scheme) and fragment-only links are returned
    ///   unchanged.
    /// * Links to Markdown sources become the absolute URL of the rendered
    ///   page, keeping any fragment. A link to a source that isn't part of the
    ///   site is an [`Unresolved`] error.
    /// * Any other relative link (images, downloads) becomes the absolute URL
    ///   of the copied asset.
    pub fn convert(&self, from: &Path, href: &str) -> Result<String, Unresolved> {
        if href.is_empty() || href.starts_with('#') {
            return Ok(href.to_owned());
        }
        match Url::parse(href) {
            Ok(_) => return Ok(href.to_owned()),
            Err(ParseError::RelativeUrlWithoutBase) => {}
            Err(_) => return Ok(href.to_owned()),
        }

        let (path, fragment) = match href.find(|c: char| c == '#' || c == '?') {
            Some(i) => (&href[..i], &href[i..]),
            None => (href, ""),
        };
        let target = match path.strip_prefix('/') {
            Some(rooted) => normalize(Path::new(rooted)),
            None => normalize(&from.parent().unwrap_or_else(|| Path::new("")).join(path)),
        };
        let target = match target {
            Some(target) => target,
            // Escapes the content root; nothing we can do with it.
            None => return Ok(href.to_owned()),
        };

        if is_content(&target) {
            return match self.targets.get(&target) {
                Some(output) => Ok(format!("{}{}", absolute(&self.site_url, output), fragment)),
                None => Err(Unresolved(href.to_owned())),
            };
        }
        let mut url = absolute(&self.site_url, &target);
        if path.ends_with('/') && !url.ends_with('/') {
            url.push('/');
        }
        Ok(format!("{}{}", url, fragment))
    }
}

/// A link to a Markdown source that isn't part of the site.
#[derive(Debug, PartialEq)]
pub struct Unresolved(pub String);

// Lexically resolves `.` and `..`. Returns `None` if the path escapes its
// root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::document::Document;
    use crate::scan::Source;

    type Result<T> = std::result::Result<T, Unresolved>;

    fn index() -> LinkIndex {
        let documents: Vec<Document> = [
            ("_posts/2021-01-01-relative.md", "---\n---\n"),
            ("_posts/bundle/index.md", "---\ndate: 2021-01-02\n---\n"),
            ("about.md", ""),
            ("docs/index.md", ""),
        ]
        .iter()
        .map(|(path, text)| {
            Document::parse(Source {
                path: PathBuf::from(path),
                text: text.to_string(),
            })
            .unwrap()
            .document
        })
        .collect();
        LinkIndex::new(&Url::parse("https://example.org/").unwrap(), &documents)
    }

    fn fixture(from: &str, wanted: &str, target: &str) -> Result<()> {
        assert_eq!(wanted, index().convert(Path::new(from), target)?);
        Ok(())
    }

    #[test]
    fn test_convert_relative_post() -> Result<()> {
        fixture(
            "_posts/2021-01-03-other.md",
            "https://example.org/2021/01/01/relative.html",
            "2021-01-01-relative.md",
        )
    }

    #[test]
    fn test_convert_relative_post_leading_dotslash() -> Result<()> {
        fixture(
            "_posts/2021-01-03-other.md",
            "https://example.org/2021/01/01/relative.html#part",
            "./2021-01-01-relative.md#part",
        )
    }

    #[test]
    fn test_convert_relative_post_redundancies() -> Result<()> {
        fixture(
            "_posts/2021-01-03-other.md",
            "https://example.org/2021/01/01/relative.html",
            "../_posts/2021-01-01-relative.md",
        )
    }

    #[test]
    fn test_convert_page_to_post() -> Result<()> {
        fixture(
            "docs/index.md",
            "https://example.org/2021/01/02/",
            "../_posts/bundle/index.md",
        )
    }

    #[test]
    fn test_convert_rooted_page() -> Result<()> {
        fixture(
            "_posts/2021-01-03-other.md",
            "https://example.org/docs/",
            "/docs/index.md",
        )
    }

    #[test]
    fn test_convert_relative_asset() -> Result<()> {
        fixture(
            "_posts/2021-01-03-other.md",
            "https://example.org/assets/cat.jpg",
            "../assets/cat.jpg",
        )
    }

    #[test]
    fn test_convert_absolute_untouched() -> Result<()> {
        fixture("about.md", "https://remote.org/x.md", "https://remote.org/x.md")?;
        fixture("about.md", "mailto:me@example.org", "mailto:me@example.org")?;
        fixture("about.md", "#top", "#top")
    }

    #[test]
    fn test_convert_unknown_document() {
        assert_eq!(
            Err(Unresolved(String::from("missing.md"))),
            index().convert(Path::new("about.md"), "missing.md")
        );
    }

    #[test]
    fn test_absolute() {
        let base = Url::parse("https://example.org/blog/").unwrap();
        assert_eq!("https://example.org/blog/", absolute(&base, Path::new("index.html")));
        assert_eq!(
            "https://example.org/blog/tags/rust/",
            absolute(&base, Path::new("tags/rust/index.html"))
        );
        assert_eq!(
            "https://example.org/blog/pages/2.html",
            absolute(&base, Path::new("pages/2.html"))
        );
    }
}
