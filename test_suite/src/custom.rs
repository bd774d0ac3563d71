#![cfg(test)]

use serde_json::json;

use filter_query::filtering::ops::{BuiltinOperator, Condition, Predicate, Registry, Strategy};
use filter_query::mock::MockQuery;
use filter_query::{Expression, FilterError, FilterSet, Scalar};

use crate::models::Post;

/// `$word`: the column contains the operand as a whole, space
/// separated word.
struct Word;

impl Strategy for Word {
    fn operator(&self) -> &str {
        "$word"
    }

    fn instantiate(&self, column: &str, operand: &Expression) -> Result<Predicate, FilterError> {
        let word = match operand.as_scalar().and_then(Scalar::to_text) {
            Some(word) if !word.is_empty() && !word.contains(' ') => word,
            _ => return Err(anyhow::anyhow!("$word needs a single word").into()),
        };
        Ok(Predicate::Condition(Condition::Like {
            column: column.to_string(),
            pattern: format!("% {} %", word),
            negated: false,
        }))
    }
}

fn set(silent: bool) -> FilterSet<Post> {
    let registry = Registry::builder()
        .register(BuiltinOperator::Eq)
        .register(BuiltinOperator::Or)
        .register(Word)
        .build();
    FilterSet::with_registry(registry, silent)
}

#[test_log::test]
fn test_custom_strategy() {
    let mut query = MockQuery::new();
    set(false)
        .apply(&mut query, &json!({ "body": { "$word": "rust" } }).into())
        .unwrap();
    assert_eq!(query.to_string(), "posts.content LIKE '% rust %'");
}

#[test_log::test]
fn test_custom_strategy_respects_restrictions() {
    // title is restricted to built-in operators only
    assert!(matches!(
        set(false).resolve(&json!({ "title": { "$word": "rust" } }).into()),
        Err(FilterError::OperatorNotSupported { operator, .. }) if operator == "$word"
    ));
}

#[test_log::test]
fn test_custom_strategy_errors_are_fatal() {
    for silent in [false, true] {
        let err = set(silent)
            .resolve(&json!({ "id": 1, "body": { "$word": "two words" } }).into())
            .unwrap_err();
        assert!(matches!(err, FilterError::Strategy(_)));
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "$word needs a single word");
    }
}
