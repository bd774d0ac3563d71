#![cfg(test)]

use serde_json::json;

use filter_query::mock::MockQuery;
use filter_query::{Config, Expression, FilterError, FilterSet};

use crate::models::{strict, Post};

#[test]
fn test_implicit_eq() {
    assert_eq!(
        strict(json!({ "title": "hello" })).unwrap(),
        "posts.title = 'hello'"
    );
    assert_eq!(
        strict(json!({ "published": true })).unwrap(),
        "posts.published = true"
    );
}

#[test]
fn test_operators() {
    assert_eq!(
        strict(json!({ "rating": { "$gte": 3, "$lte": 5 } })).unwrap(),
        "posts.rating >= 3 AND posts.rating <= 5"
    );
    assert_eq!(
        strict(json!({ "rating": { "$between": [1, 3] } })).unwrap(),
        "posts.rating BETWEEN 1 AND 3"
    );
    assert_eq!(
        strict(json!({ "id": { "$nin": [1, 2] } })).unwrap(),
        "posts.id NOT IN (1, 2)"
    );
    assert_eq!(
        strict(json!({ "title": { "$startsWith": "50%" } })).unwrap(),
        "posts.title LIKE '50\\%%'"
    );
}

#[test]
fn test_single_element_unwrap() {
    assert_eq!(strict(json!({ "id": { "$eq": [7] } })).unwrap(), "posts.id = 7");
    // a list directly under a field is not an operator
    match strict(json!({ "id": [7] })) {
        Err(FilterError::NoOperatorMatch {
            key,
            model,
            operators,
        }) => {
            assert_eq!(key, "id");
            assert_eq!(model, "Post");
            assert_eq!(operators, Config::default().operators);
        }
        other => panic!("expected NoOperatorMatch, got {:?}", other),
    }
    assert_eq!(
        strict(json!({ "id": { "$in": [7] } })).unwrap(),
        "posts.id IN (7)"
    );
}

#[test]
fn test_renamed_field() {
    assert_eq!(
        strict(json!({ "body": { "$contains": "rust" } })).unwrap(),
        "posts.content LIKE '%rust%'"
    );
    assert!(matches!(
        strict(json!({ "content": "rust" })),
        Err(FilterError::FieldNotSupported { key, .. }) if key == "content"
    ));
}

#[test]
fn test_nulls() {
    assert_eq!(
        strict(json!({ "body": { "$null": true } })).unwrap(),
        "posts.content IS NULL"
    );
    assert_eq!(
        strict(json!({ "body": { "$null": false } })).unwrap(),
        "posts.content IS NOT NULL"
    );
    assert_eq!(
        strict(json!({ "body": { "$notNull": true } })).unwrap(),
        "posts.content IS NOT NULL"
    );
}

#[test]
fn test_or() {
    assert_eq!(
        strict(json!({ "$or": [{ "title": "a" }, { "rating": { "$gte": 4 } }] })).unwrap(),
        "((posts.title = 'a') OR (posts.rating >= 4))"
    );
}

#[test]
fn test_and() {
    assert_eq!(
        strict(json!({ "$and": [{ "title": "a" }, { "id": 2 }] })).unwrap(),
        "(posts.title = 'a') AND (posts.id = 2)"
    );
}

#[test]
fn test_nested_logical() {
    assert_eq!(
        strict(json!({
            "$or": [
                { "$and": [{ "id": 1 }, { "rating": 2 }] },
                { "title": "x" },
            ]
        }))
        .unwrap(),
        "(((posts.id = 1) AND (posts.rating = 2)) OR (posts.title = 'x'))"
    );
}

#[test]
fn test_empty_filter() {
    let set = FilterSet::<Post>::new();
    let mut query = MockQuery::new();
    let plan = set.apply(&mut query, &Expression::map()).unwrap();
    assert!(plan.is_empty());
    assert!(plan.skipped().is_empty());
    assert!(query.is_empty());
}

#[test]
fn test_restriction_rejected() {
    match strict(json!({ "title": { "$ne": "a" } })) {
        Err(FilterError::OperatorNotSupported {
            field,
            operator,
            model,
            allowed,
        }) => {
            assert_eq!(field, "title");
            assert_eq!(operator, "$ne");
            assert_eq!(model, "Post");
            assert_eq!(allowed, vec!["$eq", "$like", "$contains", "$startsWith"]);
        }
        other => panic!("expected OperatorNotSupported, got {:?}", other),
    }
}

#[test]
fn test_unknown_field() {
    match strict(json!({ "nope": 1 })) {
        Err(FilterError::FieldNotSupported {
            key,
            model,
            available,
        }) => {
            assert_eq!(key, "nope");
            assert_eq!(model, "Post");
            assert!(available.contains(&"title".to_string()));
            assert!(available.contains(&"replies".to_string()));
            assert!(!available.contains(&"content".to_string()));
        }
        other => panic!("expected FieldNotSupported, got {:?}", other),
    }
}

#[test]
fn test_unregistered_operator() {
    match strict(json!({ "title": { "$regex": "x" } })) {
        Err(FilterError::UnregisteredOperator {
            field,
            operator,
            allowed,
            ..
        }) => {
            assert_eq!(field, "title");
            assert_eq!(operator, "$regex");
            assert_eq!(allowed, vec!["$eq", "$like", "$contains", "$startsWith"]);
        }
        other => panic!("expected UnregisteredOperator, got {:?}", other),
    }
    match strict(json!({ "id": { "$regex": "x" } })) {
        Err(FilterError::UnregisteredOperator { allowed, .. }) => {
            assert_eq!(allowed, Config::default().operators);
        }
        other => panic!("expected UnregisteredOperator, got {:?}", other),
    }
}

#[test]
fn test_invalid_operand() {
    assert!(matches!(
        strict(json!({ "rating": { "$between": [1] } })),
        Err(FilterError::InvalidOperand { field, operator, .. })
            if field == "rating" && operator == "$between"
    ));
    assert!(matches!(
        strict(json!({ "id": { "$eq": { "$eq": 1 } } })),
        Err(FilterError::InvalidOperand { .. })
    ));
}

#[test]
fn test_no_operator() {
    assert!(matches!(
        strict(json!({ "title": {} })),
        Err(FilterError::NoOperatorMatch { key, .. }) if key == "title"
    ));
    assert!(matches!(
        strict(json!({ "$or": [] })),
        Err(FilterError::NoOperatorMatch { key, .. }) if key == "$or"
    ));
    assert!(matches!(
        strict(json!([{ "title": "a" }])),
        Err(FilterError::NoOperatorMatch { key, .. }) if key.is_empty()
    ));
}

#[test]
fn test_error_applies_nothing() {
    let set = FilterSet::<Post>::new();
    let mut query = MockQuery::new();
    let filters = Expression::from(json!({ "id": 1, "nope": 2 }));
    assert!(set.apply(&mut query, &filters).is_err());
    assert!(query.is_empty());
}

#[test]
fn test_configured_operators() {
    let config = Config::from_json(r#"{ "operators": ["$eq", "$or"] }"#).unwrap();
    assert!(!config.silent);

    let set = FilterSet::<Post>::with_config(&config).unwrap();
    assert_eq!(set.registry().keys(), &["$eq".to_string(), "$or".to_string()]);

    let mut query = MockQuery::new();
    set.apply(
        &mut query,
        &json!({ "$or": [{ "title": "a" }, { "id": 1 }] }).into(),
    )
    .unwrap();
    assert_eq!(query.to_string(), "((posts.title = 'a') OR (posts.id = 1))");

    match set.resolve(&json!({ "rating": { "$gte": 1 } }).into()) {
        Err(FilterError::UnregisteredOperator { allowed, .. }) => {
            assert_eq!(allowed, vec!["$eq", "$gte", "$lte", "$between"]);
        }
        other => panic!("expected UnregisteredOperator, got {:?}", other),
    }

    assert!(matches!(
        FilterSet::<Post>::with_config(&Config::from_json(r#"{ "operators": ["$eq", "$fuzzy"] }"#).unwrap()),
        Err(FilterError::UnknownStrategy(op)) if op == "$fuzzy"
    ));
}

#[test]
fn test_resolver_is_reusable() {
    let set = FilterSet::<Post>::new();
    let resolver = set.resolver();
    let policy = std::sync::Arc::new(set.policy().clone());
    for id in 0..3 {
        let plan = resolver
            .resolve(&json!({ "id": id }).into(), policy.clone())
            .unwrap();
        assert_eq!(plan.clauses().len(), 1);
    }
}
