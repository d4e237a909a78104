//! Splitting source files into a YAML front-matter block and a body, and the
//! [`FrontMatter`] map the block parses into.
//!
//! A source file with front matter looks like this:
//!
//! ```md
//! ---
//! title: Hello, world!
//! date: 2021-04-16
//! tags: [greet]
//! ---
//! # Hello
//!
//! World
//! ```
//!
//! The block must begin on the very first line. It ends at the next line that
//! is exactly `---` (or the YAML document-end marker `...`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const FENCE: &str = "---";
const END_MARKER: &str = "...";

/// A single front-matter value. Front matter is expected to be a flat map of
/// scalars and lists, but nested maps are kept rather than rejected so that
/// theme-specific keys survive into the template context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Field {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<Field>),
    Map(BTreeMap<String, Field>),
}

impl Field {
    /// Returns the scalar value as text. Lists, maps, and nulls have no
    /// textual form.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Field::Bool(b) => Some(b.to_string()),
            Field::Integer(i) => Some(i.to_string()),
            Field::Float(f) => Some(f.to_string()),
            Field::Text(s) => Some(s.clone()),
            Field::Null | Field::List(_) | Field::Map(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Field::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for Field {
    fn from(s: &str) -> Field {
        Field::Text(s.to_owned())
    }
}

impl From<String> for Field {
    fn from(s: String) -> Field {
        Field::Text(s)
    }
}

/// The parsed front-matter block: string keys mapped to [`Field`]s, ordered
/// by key so serialization is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrontMatter(BTreeMap<String, Field>);

impl FrontMatter {
    pub fn new() -> FrontMatter {
        FrontMatter::default()
    }

    /// Parses the YAML between the fences. An empty block is an empty map.
    pub fn parse(yaml: &str) -> Result<FrontMatter> {
        if yaml.trim().is_empty() {
            return Ok(FrontMatter::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Serializes the map as a complete fenced block (including both
    /// fences and a trailing newline), ready to be followed by a body.
    /// [`FrontMatter::parse`] on the text between the fences gives back an
    /// equal map.
    pub fn serialize(&self) -> Result<String> {
        let mut yaml = String::new();
        write_map(&mut yaml, 0, &self.0)?;
        Ok(format!("{}\n{}{}\n", FENCE, yaml, FENCE))
    }

    pub fn get(&self, key: &str) -> Option<&Field> {
        self.0.get(key)
    }

    pub fn insert<V: Into<Field>>(&mut self, key: &str, value: V) {
        self.0.insert(key.to_owned(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Field)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A source file split at its front-matter fences.
#[derive(Debug, PartialEq)]
pub struct Split<'a> {
    /// The raw YAML between the fences, or `None` if the file has no
    /// front-matter block.
    pub front_matter: Option<&'a str>,

    /// Everything after the closing fence (or the whole input when there is
    /// no block).
    pub body: &'a str,
}

/// Locates the front-matter block at the start of `input`.
pub fn split(input: &str) -> Result<Split> {
    let input = input.trim_start_matches('\u{feff}');
    let (first, mut offset) = match next_line(input, 0) {
        Some(line) => line,
        None => {
            return Ok(Split {
                front_matter: None,
                body: input,
            })
        }
    };
    if first != FENCE {
        return Ok(Split {
            front_matter: None,
            body: input,
        });
    }

    let yaml_start = offset;
    while let Some((line, next)) = next_line(input, offset) {
        if line == FENCE || line == END_MARKER {
            return Ok(Split {
                front_matter: Some(&input[yaml_start..offset]),
                body: &input[next..],
            });
        }
        offset = next;
    }
    Err(Error::Unterminated)
}

/// Splits `input` and parses the front matter, if any.
pub fn parse(input: &str) -> Result<(Option<FrontMatter>, &str)> {
    let split = split(input)?;
    let front_matter = match split.front_matter {
        Some(yaml) => Some(FrontMatter::parse(yaml)?),
        None => None,
    };
    Ok((front_matter, split.body))
}

// Block-style YAML, one key or list item per line. Scalars come from
// serde_yaml; see `scalar`.
fn write_map(out: &mut String, indent: usize, map: &BTreeMap<String, Field>) -> Result<()> {
    for (key, value) in map {
        out.push_str(&" ".repeat(indent));
        out.push_str(&text(key)?);
        out.push(':');
        write_value(out, indent, value)?;
    }
    Ok(())
}

fn write_list(out: &mut String, indent: usize, items: &[Field]) -> Result<()> {
    for item in items {
        out.push_str(&" ".repeat(indent));
        out.push('-');
        write_value(out, indent, item)?;
    }
    Ok(())
}

// Writes what follows a `key:` or `-`, including the line terminator.
fn write_value(out: &mut String, indent: usize, value: &Field) -> Result<()> {
    match value {
        Field::List(items) if !items.is_empty() => {
            out.push('\n');
            write_list(out, indent + 2, items)
        }
        Field::Map(map) if !map.is_empty() => {
            out.push('\n');
            write_map(out, indent + 2, map)
        }
        scalar => {
            out.push(' ');
            out.push_str(&self::scalar(scalar)?);
            out.push('\n');
            Ok(())
        }
    }
}

fn scalar(field: &Field) -> Result<String> {
    match field {
        Field::Text(s) => text(s),
        Field::List(_) => Ok(String::from("[]")),
        Field::Map(_) => Ok(String::from("{}")),
        other => emit(other),
    }
}

// serde_yaml leaves some strings unquoted that read back as something else
// (`0o17` comes back as an integer). Such strings are double-quoted.
fn text(s: &str) -> Result<String> {
    let plain = emit(s)?;
    let same = !plain.contains('\n')
        && matches!(serde_yaml::from_str::<Field>(&plain), Ok(Field::Text(t)) if t == s);
    Ok(match same {
        true => plain,
        false => quote(s),
    })
}

// A single scalar as serde_yaml writes it, without the document marker.
fn emit<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let yaml = serde_yaml::to_string(value)?;
    Ok(yaml.trim_start_matches(FENCE).trim().to_owned())
}

fn quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if c.is_control() => quoted.push_str(&format!("\\u{:04x}", c as u32)),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

// Returns the line starting at `start` (without its line terminator) and the
// offset of the following line.
fn next_line(input: &str, start: usize) -> Option<(&str, usize)> {
    if start >= input.len() {
        return None;
    }
    let rest = &input[start..];
    let (line, next) = match rest.find('\n') {
        Some(i) => (&rest[..i], start + i + 1),
        None => (rest, input.len()),
    };
    Some((line.trim_end_matches('\r').trim_end(), next))
}

/// Represents the result of a front-matter operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error splitting or parsing front matter.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when the opening `---` fence has no closing counterpart.
    #[error("front matter is missing its closing `---`")]
    Unterminated,

    /// Returned when the block is not valid YAML, or not a YAML mapping.
    #[error("invalid front matter: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_split_with_front_matter() -> Result<()> {
        let split = split("---\ntitle: Hi\n---\nbody\n")?;
        assert_eq!(Some("title: Hi\n"), split.front_matter);
        assert_eq!("body\n", split.body);
        Ok(())
    }

    #[test]
    fn test_split_without_front_matter() -> Result<()> {
        let input = "# Heading\n\n---\n\nafter a rule\n";
        let split = split(input)?;
        assert_eq!(None, split.front_matter);
        assert_eq!(input, split.body);
        Ok(())
    }

    #[test]
    fn test_split_crlf_and_end_marker() -> Result<()> {
        let split = split("\u{feff}---\r\ntitle: Hi\r\n...\r\nbody")?;
        assert_eq!(Some("title: Hi\r\n"), split.front_matter);
        assert_eq!("body", split.body);
        Ok(())
    }

    #[test]
    fn test_split_ignores_dashes_inside_values() -> Result<()> {
        let split = split("---\ntitle: a---b\n---\nbody")?;
        assert_eq!(Some("title: a---b\n"), split.front_matter);
        Ok(())
    }

    #[test]
    fn test_split_unterminated() {
        assert!(matches!(
            split("---\ntitle: Hi\nno closing fence\n"),
            Err(Error::Unterminated)
        ));
    }

    #[test]
    fn test_empty_block() -> Result<()> {
        let (front_matter, body) = parse("---\n---\nbody")?;
        assert_eq!(Some(FrontMatter::new()), front_matter);
        assert_eq!("body", body);
        Ok(())
    }

    #[test]
    fn test_non_mapping_is_an_error() {
        assert!(matches!(parse("---\n- a\n- b\n---\n"), Err(Error::Yaml(_))));
    }

    fn round_trip(front_matter: &FrontMatter) -> Result<()> {
        let serialized = front_matter.serialize()?;
        assert!(serialized.starts_with("---\n"), "{:?}", serialized);
        assert!(serialized.ends_with("\n---\n") || serialized == "---\n---\n");
        let (parsed, body) = parse(&serialized)?;
        assert_eq!(Some(front_matter), parsed.as_ref(), "serialized as {:?}", serialized);
        assert_eq!("", body);
        Ok(())
    }

    #[test]
    fn test_round_trip() -> Result<()> {
        let mut front_matter = FrontMatter::new();
        front_matter.insert("title", "Hello: a story");
        front_matter.insert("date", "2023-01-02");
        front_matter.insert("draft", Field::Bool(false));
        front_matter.insert("weight", Field::Integer(3));
        front_matter.insert("ratio", Field::Float(1.5));
        front_matter.insert(
            "tags",
            Field::List(vec![Field::from("rust"), Field::from("true")]),
        );
        front_matter.insert("layout", Field::Null);
        front_matter.insert("empty", Field::List(Vec::new()));
        round_trip(&front_matter)?;
        round_trip(&FrontMatter::new())
    }

    #[test]
    fn test_round_trip_ambiguous_text() -> Result<()> {
        let values = [
            "0o17", "0x1F", "1e3", "-12", "~", "null", "Null", ".inf", "-.inf", ".nan",
            "True", "false", "yes", "---", "...", "", " ", " padded ", "-", "- item",
            "a: b", "# comment", "trailing #", "[a]", "{a: b}", "'single'", "\"double\"",
            "back\\slash", "line\nbreak", "carriage\rreturn", "tab\there", "bell\u{7}",
            "*alias", "&anchor", "!tag", "%directive", "@at", "`tick`", "|", ">", "? key",
        ];
        for value in values.iter() {
            let mut front_matter = FrontMatter::new();
            front_matter.insert("k", *value);
            round_trip(&front_matter)?;

            let mut front_matter = FrontMatter::new();
            front_matter.insert(value, "v");
            front_matter.insert("list", Field::List(vec![Field::from(*value)]));
            let mut nested = BTreeMap::new();
            nested.insert(value.to_string(), Field::from(*value));
            front_matter.insert("map", Field::Map(nested));
            round_trip(&front_matter)?;
        }
        Ok(())
    }

    #[test]
    fn test_round_trip_nested() -> Result<()> {
        let mut inner = BTreeMap::new();
        inner.insert(String::from("name"), Field::from("Ada"));
        inner.insert(
            String::from("links"),
            Field::List(vec![Field::from("a"), Field::List(vec![Field::from("0o17")])]),
        );
        let mut front_matter = FrontMatter::new();
        front_matter.insert("author", Field::Map(inner.clone()));
        front_matter.insert("people", Field::List(vec![Field::Map(inner), Field::Null]));
        front_matter.insert("nothing", Field::Map(BTreeMap::new()));
        round_trip(&front_matter)
    }

    #[test]
    fn test_quote() {
        assert_eq!(r#""a\"b\\c\nd\u0007""#, quote("a\"b\\c\nd\u{7}"));
    }

    #[test]
    fn test_field_text() {
        assert_eq!(Some("2023".to_owned()), Field::Integer(2023).as_text());
        assert_eq!(None, Field::List(Vec::new()).as_text());
    }
}
