//! Structural validation of filter expressions.

use crate::expression::Expression;
use crate::filtering::ops::{BuiltinOperator, Registry};
use crate::filtering::FilterError;

/// Checks that every path through an expression ends in an operator.
///
/// A path ends well when it reaches a registered operator token (what
/// lies under the token is the strategy's concern), or a scalar under
/// a non-operator key, which stands for an implicit `$eq`. Empty maps,
/// empty logical groups and sequences under a non-operator key do not
/// end well.
///
/// Every entry of every map is checked, so the outcome never depends
/// on the order entries were given in.
#[derive(Clone, Copy, Debug)]
pub struct Validator<'r> {
    registry: &'r Registry,
}

impl<'r> Validator<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Validate the top level filter `key` with right hand side
    /// `value`, on behalf of model `model`.
    pub fn validate(&self, key: &str, value: &Expression, model: &str) -> Result<(), FilterError> {
        if self.entry_terminates(key, value) {
            Ok(())
        } else {
            Err(FilterError::NoOperatorMatch {
                key: key.to_string(),
                model: model.to_string(),
                operators: self.registry.keys().to_vec(),
            })
        }
    }

    fn entry_terminates(&self, key: &str, value: &Expression) -> bool {
        if BuiltinOperator::is_logical(key) {
            return match value {
                Expression::List(items) => {
                    !items.is_empty() && items.iter().all(|item| self.map_terminates(item))
                }
                Expression::Map(_) => self.map_terminates(value),
                Expression::Scalar(_) => false,
            };
        }
        if self.registry.contains(key) {
            return true;
        }
        match value {
            Expression::Scalar(_) => true,
            Expression::List(_) => false,
            Expression::Map(_) => self.map_terminates(value),
        }
    }

    fn map_terminates(&self, expr: &Expression) -> bool {
        match expr {
            Expression::Map(entries) => {
                !entries.is_empty() && entries.iter().all(|(k, v)| self.entry_terminates(k, v))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(key: &str, value: serde_json::Value) -> Result<(), FilterError> {
        let registry = Registry::default();
        Validator::new(&registry).validate(key, &value.into(), "Post")
    }

    #[test]
    fn accepts() {
        check("title", json!("x")).unwrap();
        check("title", json!({ "$eq": "x" })).unwrap();
        check("id", json!({ "$in": [] })).unwrap();
        check("comments", json!({ "content": { "$like": "%a%" } })).unwrap();
        check("comments", json!({ "content": "a", "id": { "$gt": 1 } })).unwrap();
        check("$or", json!([{ "title": "a" }, { "title": { "$ne": "b" } }])).unwrap();
        check("$and", json!({ "title": "a" })).unwrap();
        // unregistered tokens are left for resolution to report
        check("title", json!({ "$regex": "a" })).unwrap();
    }

    #[test]
    fn rejects() {
        for (key, value) in [
            ("title", json!({})),
            ("title", json!(["a", "b"])),
            ("comments", json!({ "content": {} })),
            ("comments", json!({ "content": "a", "author": {} })),
            ("$or", json!([])),
            ("$or", json!("a")),
            ("$and", json!([{ "title": "a" }, {}])),
        ] {
            match check(key, value.clone()) {
                Err(FilterError::NoOperatorMatch {
                    key: k,
                    model,
                    operators,
                }) => {
                    assert_eq!(k, key);
                    assert_eq!(model, "Post");
                    assert!(operators.contains(&"$eq".to_string()));
                }
                other => panic!("{} => {}: expected NoOperatorMatch, got {:?}", key, value, other),
            }
        }
    }

    #[test]
    fn order_independent() {
        let registry = Registry::default();
        let v = Validator::new(&registry);
        let a = Expression::map()
            .with("content", "a")
            .with("author", Expression::map());
        let b = Expression::map()
            .with("author", Expression::map())
            .with("content", "a");
        assert!(v.validate("comments", &a, "Post").is_err());
        assert!(v.validate("comments", &b, "Post").is_err());
    }
}
