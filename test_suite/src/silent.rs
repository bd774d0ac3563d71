#![cfg(test)]

use serde_json::json;

use filter_query::FilterError;

use crate::models::silent;

fn skipped(plan: &filter_query::Plan) -> Vec<&str> {
    plan.skipped().iter().map(|(key, _)| key.as_str()).collect()
}

#[test_log::test]
fn test_skips_unknown_field() {
    let (rendered, plan) = silent(json!({ "nope": 1, "title": "a" })).unwrap();
    assert_eq!(rendered, "posts.title = 'a'");
    assert_eq!(skipped(&plan), vec!["nope"]);
    assert!(matches!(
        plan.skipped()[0].1,
        FilterError::FieldNotSupported { .. }
    ));
}

#[test_log::test]
fn test_skips_restricted_operator() {
    let (rendered, plan) = silent(json!({ "title": { "$ne": "x" }, "id": 1 })).unwrap();
    assert_eq!(rendered, "posts.id = 1");
    assert_eq!(skipped(&plan), vec!["title"]);
}

#[test_log::test]
fn test_skips_structural_errors() {
    let (rendered, plan) = silent(json!({
        "body": {},
        "rating": { "$between": "x" },
        "published": false,
    }))
    .unwrap();
    assert_eq!(rendered, "posts.published = false");
    assert_eq!(skipped(&plan), vec!["body", "rating"]);
}

#[test_log::test]
fn test_unregistered_is_fatal() {
    assert!(matches!(
        silent(json!({ "id": 1, "title": { "$regex": "x" } })),
        Err(FilterError::UnregisteredOperator { .. })
    ));
    assert!(matches!(
        silent(json!({ "author": { "name": { "$regex": "x" } } })),
        Err(FilterError::UnregisteredOperator { .. })
    ));
}

#[test_log::test]
fn test_whole_key_skipped() {
    // one bad entry drops everything under its top level key
    let (rendered, plan) = silent(json!({
        "author": { "name": "a", "password": "x" },
        "id": 1,
    }))
    .unwrap();
    assert_eq!(rendered, "posts.id = 1");
    assert_eq!(skipped(&plan), vec!["author"]);
}

#[test_log::test]
fn test_skips_inside_groups() {
    let (rendered, plan) = silent(json!({ "$or": [{ "title": "a" }, { "nope": 1 }] })).unwrap();
    assert_eq!(rendered, "((posts.title = 'a'))");
    assert!(plan.skipped().is_empty());

    let (rendered, _) = silent(json!({ "$or": [{ "nope": 1 }], "id": 2 })).unwrap();
    assert_eq!(rendered, "posts.id = 2");
}

#[test_log::test]
fn test_all_skipped() {
    let (rendered, plan) = silent(json!({ "nope": 1, "title": {} })).unwrap();
    assert_eq!(rendered, "");
    assert!(plan.is_empty());
    assert_eq!(plan.skipped().len(), 2);
}
