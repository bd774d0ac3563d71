//! # Filter expressions
//!
//! A filter expression is the untrusted input to filtering. It is
//! either a scalar, which stands for an equality test, a sequence of
//! expressions, or a map from keys to expressions. Keys name fields,
//! relations, dotted relation paths, operator tokens (`$gt`) or
//! logical tokens (`$and`, `$or`).
//!
//! Expressions are usually decoded from a request, either from JSON
//! via the [`From<serde_json::Value>`](Expression#impl-From<Value>-for-Expression)
//! implementation, or from query string pairs via
//! [`params::from_query_pairs`](crate::params::from_query_pairs). They
//! can also be built by hand:
//!
//! ```rust
//! use filter_query::{Expression, Scalar};
//!
//! let expr = Expression::map()
//!     .with("title", "hello")
//!     .with("rating", Expression::map().with("$gte", 3));
//!
//! assert_eq!(expr.get("title"), Some(&Expression::Scalar(Scalar::from("hello"))));
//! ```

use std::fmt::{self, Display};

/// A single value at the leaf of a filter expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// The textual form of this value, if it has a natural one.
    ///
    /// Numbers are rendered, booleans and null have no textual form.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Scalar::Text(s) => Some(s.clone()),
            Scalar::Int(i) => Some(i.to_string()),
            Scalar::Float(f) => Some(f.to_string()),
            Scalar::Null | Scalar::Bool(_) => None,
        }
    }

    /// Interpret this value as a flag.
    ///
    /// Query strings carry no types, so `"true"`, `"1"`, `"false"` and
    /// `"0"` are accepted alongside real booleans and the integers 0
    /// and 1.
    pub fn to_flag(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            Scalar::Int(1) => Some(true),
            Scalar::Int(0) => Some(false),
            Scalar::Text(s) => match s.as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<i32> for Scalar {
    fn from(i: i32) -> Self {
        Scalar::Int(i.into())
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<u32> for Scalar {
    fn from(i: u32) -> Self {
        Scalar::Int(i.into())
    }
}

impl From<f64> for Scalar {
    fn from(x: f64) -> Self {
        Scalar::Float(x)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl<T> From<Option<T>> for Scalar
where
    T: Into<Scalar>,
{
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Scalar::Null)
    }
}

/// A nested filter expression.
///
/// Maps keep the order their entries were given in, so that errors
/// and emitted constraints are reported in a predictable order, but
/// that order carries no meaning: two maps with the same entries
/// resolve to the same constraints.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Scalar(Scalar),
    List(Vec<Expression>),
    Map(Vec<(String, Expression)>),
}

impl Default for Expression {
    fn default() -> Self {
        Expression::map()
    }
}

impl Expression {
    /// An empty map, which filters nothing.
    pub fn map() -> Self {
        Expression::Map(Vec::new())
    }

    /// A sequence of expressions.
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Expression>,
    {
        Expression::List(items.into_iter().map(Into::into).collect())
    }

    /// Add `key` to a map, replacing any existing entry for it.
    ///
    /// Anything other than a map is first replaced by an empty map.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Expression>) -> Self {
        self.insert(key, value);
        self
    }

    /// In-place version of [`with`](Expression::with).
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Expression>) {
        if !matches!(self, Expression::Map(_)) {
            *self = Expression::map();
        }
        if let Expression::Map(entries) = self {
            let key = key.into();
            let value = value.into();
            if let Some(slot) = entries.iter_mut().find(|(k, _)| *k == key) {
                slot.1 = value;
            } else {
                entries.push((key, value));
            }
        }
    }

    /// Look up `key` if this is a map.
    pub fn get(&self, key: &str) -> Option<&Expression> {
        self.as_map()
            .and_then(|entries| entries.iter().find(|(k, _)| k == key).map(|(_, v)| v))
    }

    pub fn as_map(&self) -> Option<&[(String, Expression)]> {
        match self {
            Expression::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Expression]> {
        match self {
            Expression::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Expression::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// True for empty maps and empty sequences.
    pub fn is_empty(&self) -> bool {
        match self {
            Expression::Map(entries) => entries.is_empty(),
            Expression::List(items) => items.is_empty(),
            Expression::Scalar(_) => false,
        }
    }

    /// Collapse a one-element sequence to its element.
    ///
    /// Anything else, including sequences of any other length, is
    /// returned as it is.
    pub fn unwrap_single(&self) -> &Expression {
        match self {
            Expression::List(items) if items.len() == 1 => &items[0],
            other => other,
        }
    }
}

impl From<Scalar> for Expression {
    fn from(s: Scalar) -> Self {
        Expression::Scalar(s)
    }
}

macro_rules! scalar_expression {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Expression {
                fn from(v: $t) -> Self {
                    Expression::Scalar(v.into())
                }
            }
        )*
    };
}

scalar_expression!(bool, i32, i64, u32, f64, &str, String);

impl<T> From<Vec<T>> for Expression
where
    T: Into<Expression>,
{
    fn from(items: Vec<T>) -> Self {
        Expression::list(items)
    }
}

impl From<serde_json::Value> for Expression {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Expression::Scalar(Scalar::Null),
            Value::Bool(b) => Expression::Scalar(Scalar::Bool(b)),
            Value::Number(n) => Expression::Scalar(if let Some(i) = n.as_i64() {
                Scalar::Int(i)
            } else {
                // u64 values beyond i64 and all floats land here
                Scalar::Float(n.as_f64().unwrap_or(f64::NAN))
            }),
            Value::String(s) => Expression::Scalar(Scalar::Text(s)),
            Value::Array(items) => Expression::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                Expression::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json() {
        let expr = Expression::from(json!({
            "title": "x",
            "id": { "$in": [1, 2] },
            "price": 2.5,
            "deleted_at": null,
        }));
        assert_eq!(expr.get("title"), Some(&Expression::from("x")));
        assert_eq!(
            expr.get("id").and_then(|e| e.get("$in")),
            Some(&Expression::list([1, 2]))
        );
        assert_eq!(expr.get("price"), Some(&Expression::from(2.5)));
        assert_eq!(
            expr.get("deleted_at"),
            Some(&Expression::Scalar(Scalar::Null))
        );
    }

    #[test]
    fn insert_replaces() {
        let expr = Expression::map().with("a", 1).with("b", 2).with("a", 3);
        assert_eq!(
            expr,
            Expression::Map(vec![
                ("a".to_string(), Expression::from(3)),
                ("b".to_string(), Expression::from(2)),
            ])
        );
    }

    #[test]
    fn unwrap_single() {
        let one = Expression::list(["x"]);
        assert_eq!(one.unwrap_single(), &Expression::from("x"));

        let two = Expression::list(["x", "y"]);
        assert_eq!(two.unwrap_single(), &two);

        let none = Expression::List(Vec::new());
        assert_eq!(none.unwrap_single(), &none);

        let scalar = Expression::from(4);
        assert_eq!(scalar.unwrap_single(), &scalar);
    }

    #[test]
    fn flags() {
        assert_eq!(Scalar::from("true").to_flag(), Some(true));
        assert_eq!(Scalar::from("0").to_flag(), Some(false));
        assert_eq!(Scalar::from(1).to_flag(), Some(true));
        assert_eq!(Scalar::from("maybe").to_flag(), None);
        assert_eq!(Scalar::Null.to_flag(), None);
    }
}
