//! Decoding filter expressions from query strings.
//!
//! Web frameworks hand over a query string such as
//! `?filters[title][$eq]=hello&filters[id][$in][]=1&filters[id][$in][]=2`
//! as a list of percent-decoded key/value pairs. [`from_query_pairs`]
//! rebuilds the nested [`Expression`] those bracketed keys describe:
//!
//! ```rust
//! use filter_query::Expression;
//! use filter_query::params::from_query_pairs;
//!
//! let pairs = [
//!     ("filters[title][$eq]", "hello"),
//!     ("filters[$or][0][id]", "1"),
//!     ("filters[$or][1][id]", "2"),
//!     ("page", "3"),
//! ];
//! let filters = from_query_pairs("filters", pairs).unwrap();
//! assert_eq!(
//!     filters,
//!     Expression::map()
//!         .with("title", Expression::map().with("$eq", "hello"))
//!         .with("$or", Expression::list([
//!             Expression::map().with("id", "1"),
//!             Expression::map().with("id", "2"),
//!         ])),
//! );
//! ```
//!
//! Named brackets build maps, numeric or empty brackets build lists.
//! Values are kept as text. Pairs whose key does not start with the
//! root name are ignored.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::expression::{Expression, Scalar};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("malformed filter parameter '{0}'")]
    MalformedKey(String),
    #[error("filter parameter '{0}' conflicts with an earlier parameter")]
    Conflict(String),
    #[error("filter parameter '{0}' has a list index above {}", MAX_INDEX)]
    IndexTooLarge(String),
}

/// The largest numeric bracket index accepted.
pub const MAX_INDEX: usize = 1024;

static KEY: OnceLock<Regex> = OnceLock::new();
static SEGMENT: OnceLock<Regex> = OnceLock::new();

fn key_regex() -> &'static Regex {
    KEY.get_or_init(|| {
        Regex::new(r"^([^\[\]]+)((?:\[[^\[\]]*\])+)$").expect("static regex")
    })
}

fn segment_regex() -> &'static Regex {
    SEGMENT.get_or_init(|| Regex::new(r"\[([^\[\]]*)\]").expect("static regex"))
}

#[derive(Debug)]
enum Slot {
    Empty,
    Leaf(String),
    Map(Vec<(String, Slot)>),
    // indices only order the items; gaps are not materialised
    List(BTreeMap<usize, Slot>),
}

enum Segment<'a> {
    Push,
    Index(usize),
    Key(&'a str),
}

impl<'a> Segment<'a> {
    fn parse(s: &'a str) -> Self {
        if s.is_empty() {
            Segment::Push
        } else if s.bytes().all(|b| b.is_ascii_digit()) {
            Segment::Index(s.parse().unwrap_or(usize::MAX))
        } else {
            Segment::Key(s)
        }
    }
}

impl Slot {
    fn insert(&mut self, segments: &[Segment<'_>], value: &str) -> Result<(), ()> {
        let (first, rest) = match segments.split_first() {
            Some(split) => split,
            None => {
                return match self {
                    Slot::Empty => {
                        *self = Slot::Leaf(value.to_string());
                        Ok(())
                    }
                    _ => Err(()),
                }
            }
        };

        match first {
            Segment::Key(key) => {
                if let Slot::Empty = self {
                    *self = Slot::Map(Vec::new());
                }
                let entries = match self {
                    Slot::Map(entries) => entries,
                    _ => return Err(()),
                };
                let pos = match entries.iter().position(|(k, _)| k == key) {
                    Some(pos) => pos,
                    None => {
                        entries.push((key.to_string(), Slot::Empty));
                        entries.len() - 1
                    }
                };
                entries[pos].1.insert(rest, value)
            }
            Segment::Push | Segment::Index(_) => {
                if let Slot::Empty = self {
                    *self = Slot::List(BTreeMap::new());
                }
                let items = match self {
                    Slot::List(items) => items,
                    _ => return Err(()),
                };
                let index = match first {
                    Segment::Index(i) => *i,
                    _ => items.keys().next_back().map_or(0, |last| last + 1),
                };
                items.entry(index).or_insert(Slot::Empty).insert(rest, value)
            }
        }
    }

    fn into_expression(self) -> Option<Expression> {
        match self {
            Slot::Empty => None,
            Slot::Leaf(s) => Some(Expression::Scalar(Scalar::Text(s))),
            Slot::Map(entries) => Some(Expression::Map(
                entries
                    .into_iter()
                    .filter_map(|(k, v)| v.into_expression().map(|v| (k, v)))
                    .collect(),
            )),
            Slot::List(items) => Some(Expression::List(
                items
                    .into_values()
                    .filter_map(Slot::into_expression)
                    .collect(),
            )),
        }
    }
}

/// Rebuild the filter expression rooted at parameter `root` from
/// decoded query string pairs.
///
/// With no matching pairs the result is an empty map.
pub fn from_query_pairs<I, K, V>(root: &str, pairs: I) -> Result<Expression, ParamError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut tree = Slot::Map(Vec::new());

    for (key, value) in pairs {
        let key = key.as_ref();
        if key != root && !key.starts_with(&format!("{}[", root)) {
            continue;
        }
        let captures = key_regex()
            .captures(key)
            .filter(|c| &c[1] == root)
            .ok_or_else(|| ParamError::MalformedKey(key.to_string()))?;
        let segments: Vec<Segment<'_>> = segment_regex()
            .captures_iter(captures.get(2).map_or("", |m| m.as_str()))
            .filter_map(|c| c.get(1))
            .map(|m| Segment::parse(m.as_str()))
            .collect();
        if let Some(Segment::Push | Segment::Index(_)) = segments.first() {
            return Err(ParamError::Conflict(key.to_string()));
        }
        if segments
            .iter()
            .any(|s| matches!(s, Segment::Index(i) if *i > MAX_INDEX))
        {
            return Err(ParamError::IndexTooLarge(key.to_string()));
        }
        tree.insert(&segments, value.as_ref())
            .map_err(|()| ParamError::Conflict(key.to_string()))?;
    }

    Ok(tree.into_expression().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested() {
        let pairs = vec![
            ("filters[title][$eq]", "hello"),
            ("filters[id][$in][]", "1"),
            ("filters[id][$in][]", "2"),
            ("filters[comments][author][name]", "ann"),
            ("sort", "title"),
        ];
        let filters = from_query_pairs("filters", pairs).unwrap();
        assert_eq!(
            filters,
            Expression::map()
                .with("title", Expression::map().with("$eq", "hello"))
                .with("id", Expression::map().with("$in", vec!["1", "2"]))
                .with(
                    "comments",
                    Expression::map().with("author", Expression::map().with("name", "ann"))
                )
        );
    }

    #[test]
    fn indexed_lists_keep_position() {
        let pairs = [
            ("filters[$or][1][title]", "b"),
            ("filters[$or][0][title]", "a"),
        ];
        let filters = from_query_pairs("filters", pairs).unwrap();
        assert_eq!(
            filters,
            Expression::map().with(
                "$or",
                Expression::list([
                    Expression::map().with("title", "a"),
                    Expression::map().with("title", "b"),
                ])
            )
        );
    }

    #[test]
    fn no_pairs() {
        let pairs: [(&str, &str); 1] = [("page", "2")];
        assert_eq!(from_query_pairs("filters", pairs).unwrap(), Expression::map());
    }

    #[test]
    fn errors() {
        assert_eq!(
            from_query_pairs("filters", [("filters", "x")]),
            Err(ParamError::MalformedKey("filters".to_string()))
        );
        assert_eq!(
            from_query_pairs("filters", [("filters[title", "x")]),
            Err(ParamError::MalformedKey("filters[title".to_string()))
        );
        assert_eq!(
            from_query_pairs(
                "filters",
                [("filters[title]", "x"), ("filters[title][$eq]", "y")]
            ),
            Err(ParamError::Conflict("filters[title][$eq]".to_string()))
        );
        assert_eq!(
            from_query_pairs(
                "filters",
                [("filters[id][$in][]", "1"), ("filters[id][$in][a]", "2")]
            ),
            Err(ParamError::Conflict("filters[id][$in][a]".to_string()))
        );
        assert_eq!(
            from_query_pairs("filters", [("filters[0]", "x")]),
            Err(ParamError::Conflict("filters[0]".to_string()))
        );
    }

    #[test]
    fn huge_indices() {
        for key in [
            "filters[$or][18446744073709551615][id]",
            "filters[$or][99999999999999999999999][id]",
            "filters[id][$in][1000000000000]",
        ] {
            assert_eq!(
                from_query_pairs("filters", [(key, "1")]),
                Err(ParamError::IndexTooLarge(key.to_string()))
            );
        }
    }

    #[test]
    fn sparse_indices() {
        let pairs = [
            ("filters[id][$in][1024]", "c"),
            ("filters[id][$in][7]", "b"),
            ("filters[id][$in][]", "d"),
            ("filters[id][$in][0]", "a"),
        ];
        assert_eq!(
            from_query_pairs("filters", pairs).unwrap(),
            Expression::map().with(
                "id",
                Expression::map().with("$in", vec!["a", "b", "c", "d"])
            )
        );
    }
}
