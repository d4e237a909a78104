//! Support for creating Atom feeds from the site's posts.

use std::path::PathBuf;

use atom_syndication::{Category, Entry, Feed, Link, Person, Text};
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};

use crate::artifact::{Artifact, ContentType};
use crate::config::Author;
use crate::markdown::RenderedDocument;
use crate::plugin::{DerivedArtifactGenerator, Derivation, Error, Result};

/// Where the feed is published, relative to the destination.
pub const FEED_PATH: &str = "feed.xml";

/// The number of most recent posts included in the feed.
pub const POSTS_LIMIT: usize = 10;

const NAME: &str = "feed";

/// The `feed` plugin.
pub struct FeedGenerator;

impl DerivedArtifactGenerator for FeedGenerator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn produce(&self, derivation: &Derivation) -> Result<Artifact> {
        let config = derivation.config;
        let posts = &derivation.index.posts;
        let feed_url = crate::url::absolute(&config.url, &PathBuf::from(FEED_PATH));

        // The newest post date rather than the current time, so that
        // rebuilding unchanged sources gives an identical feed.
        let newest = derivation.index.latest().and_then(|post| post.document.date);
        let updated = timestamp(newest.unwrap_or_default())?;

        let mut feed = Feed::default();
        feed.set_title(config.title.as_str());
        feed.set_id(config.url.as_str());
        feed.set_updated(updated);
        feed.set_authors(people(config.author.as_ref()));
        feed.set_links(vec![
            link(config.url.as_str(), "alternate", "text/html"),
            link(&feed_url, "self", ContentType::ATOM.0),
        ]);
        if let Some(description) = &config.description {
            feed.set_subtitle(Text::plain(description.as_str()));
        }
        feed.set_entries(
            posts
                .iter()
                .take(POSTS_LIMIT)
                .map(|post| entry(post, config.author.as_ref()))
                .collect::<Result<Vec<Entry>>>()?,
        );

        let contents = feed.write_to(Vec::new()).map_err(|err| Error {
            plugin: NAME,
            message: err.to_string(),
        })?;
        tracing::debug!(entries = posts.len().min(POSTS_LIMIT), "generated feed");
        Ok(Artifact {
            path: PathBuf::from(FEED_PATH),
            contents,
            content_type: ContentType::ATOM,
            date: newest,
            indexable: false,
            origin: String::from(NAME),
        })
    }
}

fn entry(post: &RenderedDocument, author: Option<&Author>) -> Result<Entry> {
    let document = &post.document;
    let date = timestamp(document.date.unwrap_or_default())?;

    let mut entry = Entry::default();
    entry.set_id(post.url.as_str());
    entry.set_title(document.title.as_str());
    entry.set_updated(date);
    entry.set_published(Some(date));
    entry.set_authors(people(author));
    entry.set_links(vec![link(&post.url, "alternate", "text/html")]);
    entry.set_summary(Some(Text::html(post.excerpt.as_str())));
    entry.set_categories(
        document
            .categories
            .iter()
            .chain(document.tags.iter())
            .map(|label| {
                let mut category = Category::default();
                category.set_term(label.name.as_str());
                category
            })
            .collect::<Vec<Category>>(),
    );
    Ok(entry)
}

fn link(href: &str, rel: &str, mime_type: &str) -> Link {
    let mut link = Link::default();
    link.set_href(href);
    link.set_rel(rel);
    link.set_mime_type(Some(mime_type.to_owned()));
    link
}

fn people(author: Option<&Author>) -> Vec<Person> {
    match author {
        Some(author) => {
            let mut person = Person::default();
            person.set_name(author.name.as_str());
            person.set_email(author.email.clone());
            vec![person]
        }
        None => Vec::new(),
    }
}

// Dates are calendar days; the feed wants instants. Use midnight UTC.
fn timestamp(date: NaiveDate) -> Result<DateTime<FixedOffset>> {
    let midnight = date.and_hms_opt(0, 0, 0);
    let utc = FixedOffset::east_opt(0);
    match (midnight, utc) {
        (Some(midnight), Some(utc)) => Ok(utc.from_utc_datetime(&midnight)),
        _ => Err(Error {
            plugin: NAME,
            message: format!("can't convert {} to a timestamp", date),
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::document::test::config;
    use crate::document::Document;
    use crate::index::SiteIndex;
    use crate::markdown::Renderer;
    use crate::scan::Source;
    use crate::url::LinkIndex;

    fn produce(files: &[(&str, &str)]) -> String {
        let config = config();
        let documents: Vec<Document> = files
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
        let links = LinkIndex::new(&config.url, &documents);
        let renderer = Renderer::new(&links);
        let rendered: Vec<RenderedDocument> =
            documents.into_iter().map(|d| renderer.render(d).0).collect();
        let index = SiteIndex::new(&rendered, config.page_size);
        let artifact = FeedGenerator
            .produce(&Derivation {
                config: &config,
                index: &index,
                artifacts: &[],
            })
            .unwrap();
        assert_eq!(PathBuf::from(FEED_PATH), artifact.path);
        assert!(!artifact.indexable);
        String::from_utf8(artifact.contents).unwrap()
    }

    #[test]
    fn test_feed() {
        let xml = produce(&[
            (
                "_posts/2023-01-01-first.md",
                "---\ntitle: First\ntags: [rust]\n---\nHello & welcome.\n",
            ),
            ("_posts/2023-02-01-second.md", "---\ntitle: Second\n---\nMore.\n"),
            ("about.md", "About.\n"),
        ]);
        assert!(xml.contains("<title>First</title>"));
        assert!(xml.contains("<title>Second</title>"));
        assert!(!xml.contains("About."));
        assert!(xml.contains("https://example.org/2023/01/01/first.html"));
        assert!(xml.contains("2023-02-01T00:00:00"));
        assert!(xml.contains(r#"term="rust""#));
        // Newest first.
        assert!(xml.find("Second").unwrap() < xml.find("First").unwrap());
    }

    #[test]
    fn test_feed_is_deterministic() {
        let files = [("_posts/2023-01-01-first.md", "---\ntitle: First\n---\nHello.\n")];
        assert_eq!(produce(&files), produce(&files));
    }
}
