//! The [`SiteIndex`]: published posts in chronological order, grouped by
//! category and tag, plus the non-post pages.

use std::collections::BTreeMap;

use crate::document::Kind;
use crate::label::Label;
use crate::markdown::RenderedDocument;

/// Indexes a set of published, rendered documents. Borrowed from the
/// documents; built fresh for every build.
pub struct SiteIndex<'a> {
    /// Posts, newest first.
    pub posts: Vec<&'a RenderedDocument>,

    /// Posts by category, each list in the same order as `posts`.
    pub categories: BTreeMap<Label, Vec<&'a RenderedDocument>>,

    /// Posts by tag, each list in the same order as `posts`.
    pub tags: BTreeMap<Label, Vec<&'a RenderedDocument>>,

    /// Everything that isn't a post, by source path.
    pub pages: Vec<&'a RenderedDocument>,

    page_size: usize,
}

impl<'a> SiteIndex<'a> {
    /// Indexes `documents`. The caller is responsible for filtering out
    /// unpublished documents.
    pub fn new(documents: &'a [RenderedDocument], page_size: usize) -> SiteIndex<'a> {
        let mut posts: Vec<&RenderedDocument> = Vec::new();
        let mut pages: Vec<&RenderedDocument> = Vec::new();
        for rendered in documents {
            match rendered.document.kind {
                Kind::Post => posts.push(rendered),
                Kind::Page => pages.push(rendered),
            }
        }

        // Oldest first with ties in path order, then reversed: newest first,
        // equal dates in descending path order.
        posts.sort_by(|a, b| {
            (a.document.date, &a.document.source).cmp(&(b.document.date, &b.document.source))
        });
        posts.reverse();
        pages.sort_by(|a, b| a.document.source.cmp(&b.document.source));

        let mut categories: BTreeMap<Label, Vec<&RenderedDocument>> = BTreeMap::new();
        let mut tags: BTreeMap<Label, Vec<&RenderedDocument>> = BTreeMap::new();
        for &post in &posts {
            for category in &post.document.categories {
                categories.entry(category.clone()).or_default().push(post);
            }
            for tag in &post.document.tags {
                tags.entry(tag.clone()).or_default().push(post);
            }
        }

        SiteIndex {
            posts,
            categories,
            tags,
            pages,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// The pagination groups of the main index.
    pub fn groups(&self) -> Vec<&[&'a RenderedDocument]> {
        paginate(&self.posts, self.page_size)
    }

    /// The newest post, if any.
    pub fn latest(&self) -> Option<&'a RenderedDocument> {
        self.posts.first().copied()
    }
}

/// Splits `items` into groups of `size`; only the last may be short. An empty
/// list has no groups.
pub fn paginate<T>(items: &[T], size: usize) -> Vec<&[T]> {
    items.chunks(size.max(1)).collect()
}
