//! Conversions into [`gtmpl_value::Value`] for the template context.

use std::collections::HashMap;

use chrono::NaiveDate;
use gtmpl_value::Value;
use url::Url;

use crate::config::{Author, Config};
use crate::frontmatter::{Field, FrontMatter};
use crate::label::{Label, Labels};
use crate::markdown::RenderedDocument;

/// The date format exposed to templates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

impl From<&Field> for Value {
    fn from(field: &Field) -> Value {
        match field {
            Field::Null => Value::Nil,
            Field::Bool(b) => Value::Bool(*b),
            Field::Integer(i) => Value::from(*i),
            Field::Float(f) => Value::from(*f),
            Field::Text(s) => Value::String(s.clone()),
            Field::List(items) => Value::Array(items.iter().map(Value::from).collect()),
            Field::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&FrontMatter> for Value {
    fn from(front_matter: &FrontMatter) -> Value {
        Value::Object(object(front_matter))
    }
}

fn object(front_matter: &FrontMatter) -> HashMap<String, Value> {
    front_matter
        .iter()
        .map(|(k, v)| (k.clone(), Value::from(v)))
        .collect()
}

fn string(s: &str) -> Value {
    Value::String(s.to_owned())
}

fn optional<T, F: FnOnce(T) -> Value>(option: Option<T>, f: F) -> Value {
    match option {
        Some(t) => f(t),
        None => Value::Nil,
    }
}

fn date(date: Option<NaiveDate>) -> Value {
    optional(date, |d| Value::String(d.format(DATE_FORMAT).to_string()))
}

impl From<&Author> for Value {
    fn from(author: &Author) -> Value {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("name".to_owned(), string(&author.name));
        m.insert("email".to_owned(), optional(author.email.as_deref(), string));
        Value::Object(m)
    }
}

/// The `site` variable.
pub fn site(config: &Config) -> Value {
    let mut m: HashMap<String, Value> = HashMap::new();
    m.insert("title".to_owned(), string(&config.title));
    m.insert("url".to_owned(), string(config.url.as_str()));
    m.insert(
        "description".to_owned(),
        optional(config.description.as_deref(), string),
    );
    m.insert("author".to_owned(), optional(config.author.as_ref(), Value::from));
    Value::Object(m)
}

/// A label as `{name, slug, url}`, where `url` is the label's first index
/// page.
pub fn label(site_url: &Url, kind: &str, label: &Label) -> Value {
    let mut m: HashMap<String, Value> = HashMap::new();
    m.insert("name".to_owned(), string(&label.name));
    m.insert("slug".to_owned(), string(&label.slug));
    m.insert(
        "url".to_owned(),
        Value::String(crate::url::absolute(
            site_url,
            &crate::assemble::label_directory(kind, label).join("index.html"),
        )),
    );
    Value::Object(m)
}

fn labels(site_url: &Url, kind: &str, labels: &Labels) -> Value {
    Value::Array(labels.iter().map(|l| label(site_url, kind, l)).collect())
}

/// The `page` variable for a document page, and the shape of each post in an
/// index page's `paginator.posts`: every front-matter field, then the
/// computed fields on top.
pub fn page(site_url: &Url, rendered: &RenderedDocument) -> Value {
    let document = &rendered.document;
    let mut m = object(&document.front_matter);
    m.insert("title".to_owned(), string(&document.title));
    m.insert("url".to_owned(), string(&rendered.url));
    m.insert("date".to_owned(), date(document.date));
    m.insert(
        "categories".to_owned(),
        labels(site_url, crate::assemble::CATEGORIES, &document.categories),
    );
    m.insert(
        "tags".to_owned(),
        labels(site_url, crate::assemble::TAGS, &document.tags),
    );
    m.insert("excerpt".to_owned(), string(&rendered.excerpt));
    m.insert(
        "reading_time".to_owned(),
        optional(rendered.reading_time, |t| Value::from(t as i64)),
    );
    m.insert("kind".to_owned(), string(document.kind.as_str()));
    m.insert(
        "source".to_owned(),
        string(&document.source.to_string_lossy()),
    );
    m.insert("draft".to_owned(), Value::Bool(document.draft));
    Value::Object(m)
}

/// An optional URL.
pub fn url(url: Option<&str>) -> Value {
    optional(url, string)
}

#[cfg(test)]
mod test {
    use super::*;

    fn get<'a>(value: &'a Value, key: &str) -> &'a Value {
        match value {
            Value::Object(m) => &m[key],
            _ => panic!("not an object"),
        }
    }

    fn text(value: &Value) -> &str {
        match value {
            Value::String(s) => s,
            _ => panic!("not a string"),
        }
    }

    #[test]
    fn test_field() {
        let front_matter =
            FrontMatter::parse("title: x\ncount: 3\nlist: [a, true]\nnothing: ~\n").unwrap();
        let value = Value::from(&front_matter);
        assert_eq!("x", text(get(&value, "title")));
        assert!(matches!(get(&value, "count"), Value::Number(_)));
        match get(&value, "list") {
            Value::Array(items) => {
                assert_eq!("a", text(&items[0]));
                assert!(matches!(items[1], Value::Bool(true)));
            }
            _ => panic!("not an array"),
        }
        assert!(matches!(get(&value, "nothing"), Value::Nil));
    }

    #[test]
    fn test_label_url() {
        let site_url = Url::parse("https://example.org/blog/").unwrap();
        let value = label(&site_url, crate::assemble::TAGS, &Label::new("Rust Lang").unwrap());
        assert_eq!("Rust Lang", text(get(&value, "name")));
        assert_eq!(
            "https://example.org/blog/tags/rust-lang/",
            text(get(&value, "url"))
        );
    }
}
