//! Defines the [`Label`] type, which represents a category or a tag on a
//! [`crate::document::Document`].

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

/// A category or tag. The `name` is kept as written in the front matter for
/// display; the `slug` is what identifies the label, so e.g. `macOS` and
/// `MacOS` resolve to the same label and the same index pages.
#[derive(Clone, Debug)]
pub struct Label {
    /// The label as written by the author.
    pub name: String,

    /// The slugified name. Used for index directory names and equality.
    pub slug: String,
}

/// The normalized set of labels on a document.
pub type Labels = BTreeSet<Label>;

impl Label {
    /// Creates a label from a name. Returns `None` if the name has no
    /// slug-able characters at all (e.g., `"!!!"`).
    pub fn new(name: &str) -> Option<Label> {
        let name = name.trim();
        let slug = slug::slugify(name);
        match slug.is_empty() {
            true => None,
            false => Some(Label {
                name: name.to_owned(),
                slug,
            }),
        }
    }
}

impl Hash for Label {
    /// Implements [`Hash`] for [`Label`] by delegating directly to the `slug`
    /// field.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.slug.hash(state)
    }
}

impl PartialEq for Label {
    /// Implements [`PartialEq`] and [`Eq`] for [`Label`] by delegating
    /// directly to the `slug` field.
    fn eq(&self, other: &Self) -> bool {
        self.slug == other.slug
    }
}
impl Eq for Label {}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> Ordering {
        self.slug.cmp(&other.slug)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_labels_compare_by_slug() {
        let a = Label::new("macOS").unwrap();
        let b = Label::new(" MacOS ").unwrap();
        assert_eq!(a, b);
        assert_eq!("macOS", a.name);
        assert_eq!("MacOS", b.name);

        let mut set = Labels::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(1, set.len());
    }

    #[test]
    fn test_unsluggable_label() {
        assert!(Label::new("!!!").is_none());
        assert!(Label::new("   ").is_none());
    }
}
