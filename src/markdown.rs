//! Renders document bodies from Markdown into HTML fragments. Rendering never
//! fails: problems are reported as [`RenderWarning`]s alongside best-effort
//! output.

use std::ops::Range;
use std::path::PathBuf;
use std::thread;

use pulldown_cmark::escape::escape_html;
use pulldown_cmark::{CodeBlockKind, CowStr, Event, LinkType, Options, Parser, Tag};
use thiserror::Error;

use crate::document::{Document, Kind};
use crate::frontmatter::Field;
use crate::htmlrenderer::HtmlRenderer;
use crate::url::{LinkIndex, Unresolved};

/// Marks the end of a post's excerpt.
const FOLD_TAG: &str = "<!-- more -->";

const WORDS_PER_MINUTE: usize = 200;

/// A [`Document`] with its body rendered.
#[derive(Clone, Debug)]
pub struct RenderedDocument {
    pub document: Document,

    /// The absolute URL of the document's output page.
    pub url: String,

    /// The rendered body.
    pub html: String,

    /// An HTML fragment summarizing the document, for index pages and feeds.
    pub excerpt: String,

    /// Estimated minutes to read. Only set for posts.
    pub reading_time: Option<u32>,
}

/// A degraded-but-successful rendering.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("`{}`: {message}", .path.display())]
pub struct RenderWarning {
    /// The source path of the document.
    pub path: PathBuf,
    pub message: String,
}

/// Renders documents against a fixed [`LinkIndex`].
pub struct Renderer<'a> {
    links: &'a LinkIndex,
}

impl<'a> Renderer<'a> {
    pub fn new(links: &'a LinkIndex) -> Renderer<'a> {
        Renderer { links }
    }

    /// Renders one document. Depends only on the document and the link index.
    pub fn render(&self, document: Document) -> (RenderedDocument, Vec<RenderWarning>) {
        let url = self.links.url_of(&document);
        let mut warnings = Vec::new();
        let mut warn = |message: String| {
            warnings.push(RenderWarning {
                path: document.source.clone(),
                message,
            })
        };

        let body = document.body.as_str();
        let mut html = String::with_capacity(body.len() * 3 / 2);
        let mut writer = HtmlRenderer::with_footnote_prefix(&url);
        let mut words = 0;
        let mut failed = false;
        for (event, range) in Parser::new_ext(body, options()).into_offset_iter() {
            let event = match event {
                Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                    if !fence_is_closed(&body[range]) {
                        warn(String::from("unterminated fenced code block"));
                    }
                    Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info)))
                }
                Event::Start(tag @ (Tag::Link(..) | Tag::Image(..))) => {
                    match self.convert_tag(&document, tag) {
                        Ok(tag) => Event::Start(tag),
                        Err((tag, Unresolved(href))) => {
                            warn(format!("link to unknown document `{}`", href));
                            Event::Start(tag)
                        }
                    }
                }
                Event::Text(text) => {
                    words += text.split_whitespace().count();
                    Event::Text(text)
                }
                event => event,
            };
            // Writing into a `String` only fails if a formatter does; keep
            // going and report it once.
            if let Err(err) = writer.on_event(&mut html, event) {
                if !failed {
                    warn(format!("writing HTML: {}", err));
                    failed = true;
                }
            }
        }

        let excerpt = match document.front_matter.get("excerpt").and_then(Field::as_text) {
            Some(text) => {
                let mut excerpt = String::from("<p>");
                let _ = escape_html(&mut excerpt, &text);
                excerpt.push_str("</p>\n");
                excerpt
            }
            None => excerpt_of(&html).to_owned(),
        };
        let reading_time = match document.kind {
            Kind::Post => Some(reading_time(words)),
            Kind::Page => None,
        };
        tracing::debug!(source = %document.source.display(), words, "rendered document");

        (
            RenderedDocument {
                document,
                url,
                html,
                excerpt,
                reading_time,
            },
            warnings,
        )
    }

    // Rewrites the destination of a link or image. On failure the tag is
    // handed back unchanged.
    fn convert_tag<'b>(
        &self,
        document: &Document,
        tag: Tag<'b>,
    ) -> Result<Tag<'b>, (Tag<'b>, Unresolved)> {
        let source = &document.source;
        match tag {
            // Autolinks and email links are always absolute.
            Tag::Link(link_type @ (LinkType::Autolink | LinkType::Email), dest, title) => {
                Ok(Tag::Link(link_type, dest, title))
            }
            Tag::Link(link_type, dest, title) => match self.links.convert(source, &dest) {
                Ok(href) => Ok(Tag::Link(link_type, CowStr::from(href), title)),
                Err(err) => Err((Tag::Link(link_type, dest, title), err)),
            },
            Tag::Image(link_type, dest, title) => match self.links.convert(source, &dest) {
                Ok(href) => Ok(Tag::Image(link_type, CowStr::from(href), title)),
                Err(err) => Err((Tag::Image(link_type, dest, title), err)),
            },
            tag => Ok(tag),
        }
    }
}

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

// Checks that the source of a fenced code block ends with a closing fence at
// least as long as the opening one, made of the same character.
fn fence_is_closed(block: &str) -> bool {
    fn strip(line: &str) -> &str {
        line.trim_start_matches(|c: char| c == '>' || c.is_whitespace())
    }

    let mut lines = block.trim_end_matches(|c: char| c == '\n' || c == '\r').lines();
    let opening = match lines.next() {
        Some(line) => strip(line),
        None => return false,
    };
    let fence = match opening.chars().next() {
        Some(c @ ('`' | '~')) => c,
        _ => return false,
    };
    let length = opening.chars().take_while(|&c| c == fence).count();
    match lines.last() {
        None => false,
        Some(line) => {
            let closing = strip(line).trim_end();
            closing.len() >= length && closing.chars().all(|c| c == fence)
        }
    }
}

// The HTML before the fold marker, else the first paragraph, else the whole
// body.
fn excerpt_of(html: &str) -> &str {
    if let Some(i) = html.find(FOLD_TAG) {
        return &html[..i];
    }
    if let Some(Range { start, end }) = first_paragraph(html) {
        return &html[start..end];
    }
    html
}

fn first_paragraph(html: &str) -> Option<Range<usize>> {
    const CLOSE: &str = "</p>";
    let start = html.find("<p>")?;
    let end = start + html[start..].find(CLOSE)? + CLOSE.len();
    Some(start..end)
}

fn reading_time(words: usize) -> u32 {
    let minutes = (words + WORDS_PER_MINUTE - 1) / WORDS_PER_MINUTE;
    minutes.max(1) as u32
}

/// Renders `documents` on up to `threads` worker threads. The results come
/// back sorted by source path regardless of scheduling; warnings are sorted
/// the same way.
pub fn render_all(
    renderer: &Renderer,
    documents: Vec<Document>,
    threads: usize,
) -> (Vec<RenderedDocument>, Vec<RenderWarning>) {
    let mut results = match threads < 2 || documents.len() < 2 {
        true => documents
            .into_iter()
            .map(|document| renderer.render(document))
            .collect::<Vec<_>>(),
        false => render_parallel(renderer, documents, threads),
    };
    results.sort_by(|(a, _), (b, _)| a.document.source.cmp(&b.document.source));

    let mut rendered = Vec::with_capacity(results.len());
    let mut warnings = Vec::new();
    for (document, document_warnings) in results {
        rendered.push(document);
        warnings.extend(document_warnings);
    }
    (rendered, warnings)
}

fn render_parallel(
    renderer: &Renderer,
    documents: Vec<Document>,
    threads: usize,
) -> Vec<(RenderedDocument, Vec<RenderWarning>)> {
    use crossbeam_channel::unbounded;

    let (tx, rx) = unbounded::<Document>();
    let (results_tx, results_rx) = unbounded();
    let workers = threads.min(documents.len());
    tracing::debug!(workers, documents = documents.len(), "rendering in parallel");

    thread::scope(|scope| {
        for _ in 0..workers {
            let rx = rx.clone();
            let results_tx = results_tx.clone();
            scope.spawn(move || {
                for document in rx {
                    if results_tx.send(renderer.render(document)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(results_tx);

        for document in documents {
            // Receivers only disappear once the workers have exited.
            let _ = tx.send(document);
        }
        drop(tx);

        results_rx.iter().collect()
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scan::Source;
    use url::Url;

    fn document(path: &str, text: &str) -> Document {
        Document::parse(Source {
            path: PathBuf::from(path),
            text: text.to_owned(),
        })
        .unwrap()
        .document
    }

    fn links(documents: &[Document]) -> LinkIndex {
        LinkIndex::new(&Url::parse("https://example.org/").unwrap(), documents)
    }

    #[test]
    fn test_render_post() {
        let doc = document(
            "_posts/2023-01-02-hello.md",
            "---\ntitle: Hello\n---\nFirst *paragraph*.\n\nSecond, see [about](../about.md#me).\n",
        );
        let about = document("about.md", "# About\n");
        let index = links(&[doc.clone(), about]);
        let (rendered, warnings) = Renderer::new(&index).render(doc);

        assert!(warnings.is_empty());
        assert_eq!("https://example.org/2023/01/02/hello.html", rendered.url);
        assert!(rendered
            .html
            .contains(r#"<a href="https://example.org/about.html#me">about</a>"#));
        assert_eq!("<p>First <em>paragraph</em>.</p>", rendered.excerpt);
        assert_eq!(Some(1), rendered.reading_time);
    }

    #[test]
    fn test_fold_excerpt() {
        let doc = document(
            "_posts/2023-01-02-fold.md",
            "---\n---\nOne.\n\nTwo.\n\n<!-- more -->\n\nThree.\n",
        );
        let index = links(&[doc.clone()]);
        let (rendered, _) = Renderer::new(&index).render(doc);
        assert_eq!("<p>One.</p>\n<p>Two.</p>\n", rendered.excerpt);
    }

    #[test]
    fn test_front_matter_excerpt_is_escaped() {
        let doc = document("page.md", "---\nexcerpt: Fish & <chips>\n---\nBody.\n");
        let index = links(&[doc.clone()]);
        let (rendered, _) = Renderer::new(&index).render(doc);
        assert_eq!("<p>Fish &amp; &lt;chips&gt;</p>\n", rendered.excerpt);
        assert_eq!(None, rendered.reading_time);
    }

    #[test]
    fn test_unterminated_fence() {
        let doc = document("notes.md", "Intro.\n\n```rust\nfn main() {\n");
        let index = links(&[doc.clone()]);
        let (rendered, warnings) = Renderer::new(&index).render(doc);
        assert_eq!(1, warnings.len());
        assert_eq!(PathBuf::from("notes.md"), warnings[0].path);
        assert!(rendered.html.contains(r#"<pre><code class="language-rust">fn main() {"#));
    }

    #[test]
    fn test_fence_is_closed() {
        assert!(fence_is_closed("```\ncode\n```\n"));
        assert!(fence_is_closed("~~~~ text\ncode\n~~~~~"));
        assert!(fence_is_closed("> ```\n> code\n> ```\n"));
        assert!(!fence_is_closed("```\ncode\n"));
        assert!(!fence_is_closed("````\ncode\n```\n"));
        assert!(!fence_is_closed("```\n"));
    }

    #[test]
    fn test_unknown_document_link() {
        let doc = document("a.md", "[missing](b.md)\n");
        let index = links(&[doc.clone()]);
        let (rendered, warnings) = Renderer::new(&index).render(doc);
        assert_eq!(1, warnings.len());
        assert!(warnings[0].message.contains("b.md"));
        assert!(rendered.html.contains(r#"<a href="b.md">"#));
    }

    #[test]
    fn test_reading_time() {
        assert_eq!(1, reading_time(0));
        assert_eq!(1, reading_time(200));
        assert_eq!(2, reading_time(201));
    }

    #[test]
    fn test_render_all_is_sorted() {
        let documents: Vec<Document> = (0..20)
            .map(|i| document(&format!("page-{:02}.md", i), "[x](nowhere.md)\n"))
            .collect();
        let index = links(&documents);
        let renderer = Renderer::new(&index);
        let (rendered, warnings) = render_all(&renderer, documents.into_iter().rev().collect(), 4);

        let sources: Vec<_> = rendered.iter().map(|r| r.document.source.clone()).collect();
        let mut sorted = sources.clone();
        sorted.sort();
        assert_eq!(sorted, sources);
        assert_eq!(20, warnings.len());
        assert_eq!(PathBuf::from("page-00.md"), warnings[0].path);
    }
}
