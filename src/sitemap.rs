//! Sitemap generation.
//!
//! Lists every indexable HTML page of the site for search engines:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
//!   <url>
//!     <loc>https://example.org/2023/01/02/hello.html</loc>
//!     <lastmod>2023-01-02</lastmod>
//!   </url>
//! </urlset>
//! ```

use std::fmt::Write;
use std::path::PathBuf;

use crate::artifact::{Artifact, ContentType};
use crate::plugin::{DerivedArtifactGenerator, Derivation, Error, Result};
use crate::value::DATE_FORMAT;

/// Where the sitemap is published, relative to the destination.
pub const SITEMAP_PATH: &str = "sitemap.xml";

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

const NAME: &str = "sitemap";

/// The `sitemap` plugin.
pub struct SitemapGenerator;

impl DerivedArtifactGenerator for SitemapGenerator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn produce(&self, derivation: &Derivation) -> Result<Artifact> {
        let mut xml = String::with_capacity(4096);
        write_sitemap(&mut xml, derivation).map_err(|err| Error {
            plugin: NAME,
            message: err.to_string(),
        })?;
        Ok(Artifact {
            path: PathBuf::from(SITEMAP_PATH),
            contents: xml.into_bytes(),
            content_type: ContentType::XML,
            date: None,
            indexable: false,
            origin: String::from(NAME),
        })
    }
}

fn write_sitemap(xml: &mut String, derivation: &Derivation) -> std::fmt::Result {
    writeln!(xml, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(xml, r#"<urlset xmlns="{}">"#, SITEMAP_NS)?;
    let mut count = 0;
    for artifact in derivation.artifacts {
        if !artifact.indexable || !artifact.is_html() {
            continue;
        }
        let loc = crate::url::absolute(&derivation.config.url, &artifact.path);
        xml.push_str("  <url>\n");
        writeln!(xml, "    <loc>{}</loc>", escape_xml(&loc))?;
        if let Some(date) = artifact.date {
            writeln!(xml, "    <lastmod>{}</lastmod>", date.format(DATE_FORMAT))?;
        }
        xml.push_str("  </url>\n");
        count += 1;
    }
    xml.push_str("</urlset>\n");
    tracing::debug!(urls = count, "generated sitemap");
    Ok(())
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::document::test::config;
    use crate::index::SiteIndex;
    use chrono::NaiveDate;

    fn artifact(
        path: &str,
        content_type: ContentType,
        date: Option<NaiveDate>,
        indexable: bool,
    ) -> Artifact {
        Artifact {
            path: PathBuf::from(path),
            contents: Vec::new(),
            content_type,
            date,
            indexable,
            origin: String::from(path),
        }
    }

    fn produce(artifacts: &[Artifact]) -> String {
        let config = config();
        let index = SiteIndex::new(&[], config.page_size);
        let artifact = SitemapGenerator
            .produce(&Derivation {
                config: &config,
                index: &index,
                artifacts,
            })
            .unwrap();
        String::from_utf8(artifact.contents).unwrap()
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(
            "a &amp; &lt;b&gt; &quot;c&quot; &apos;d&apos;",
            escape_xml(r#"a & <b> "c" 'd'"#)
        );
    }

    #[test]
    fn test_sitemap() {
        let xml = produce(&[
            artifact(
                "2023/01/02/hello.html",
                ContentType::HTML,
                NaiveDate::from_ymd_opt(2023, 1, 2),
                true,
            ),
            artifact("about/index.html", ContentType::HTML, None, true),
            artifact("hidden.html", ContentType::HTML, None, false),
            artifact("css/site.css", ContentType("text/css"), None, true),
        ]);
        let lines: Vec<&str> = xml.lines().collect();
        assert_eq!(r#"<?xml version="1.0" encoding="UTF-8"?>"#, lines[0]);
        assert!(xml.contains("<loc>https://example.org/2023/01/02/hello.html</loc>"));
        assert!(xml.contains("<lastmod>2023-01-02</lastmod>"));
        assert!(xml.contains("<loc>https://example.org/about/</loc>"));
        assert!(!xml.contains("hidden"));
        assert!(!xml.contains("site.css"));
        assert_eq!(2, xml.matches("<url>").count());
    }

    #[test]
    fn test_empty_sitemap() {
        let xml = produce(&[]);
        assert!(xml.contains(&format!(r#"<urlset xmlns="{}">"#, SITEMAP_NS)));
        assert!(!xml.contains("<url>"));
    }
}
