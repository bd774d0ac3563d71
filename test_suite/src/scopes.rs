#![cfg(test)]

use serde_json::json;

use filter_query::mock::MockQuery;
use filter_query::{FilterError, FilterSet, ModelPolicy};

use crate::models::Post;

fn render(set: &FilterSet<Post>, filters: serde_json::Value) -> Result<String, FilterError> {
    let mut query = MockQuery::new();
    set.apply(&mut query, &filters.into())?;
    Ok(query.to_string())
}

fn narrowed(f: impl FnOnce(ModelPolicy) -> ModelPolicy) -> FilterSet<Post> {
    let set = FilterSet::<Post>::new();
    let policy = f(set.policy().clone());
    set.with_policy(policy)
}

#[test_log::test]
fn test_only_fields_and_relations() {
    let set = narrowed(|p| p.only_fields(["title"]).only_relations(["author"]));

    assert_eq!(
        render(&set, json!({ "title": "a", "author.name": "ann" })).unwrap(),
        "posts.title = 'a' AND EXISTS author (users.name = 'ann')"
    );
    assert!(matches!(
        render(&set, json!({ "rating": 1 })),
        Err(FilterError::FieldNotSupported { key, .. }) if key == "rating"
    ));
    assert!(matches!(
        render(&set, json!({ "replies.id": 1 })),
        Err(FilterError::FieldNotSupported { .. })
    ));
}

#[test_log::test]
fn test_replaced_restrictions() {
    let set = narrowed(|p| {
        p.to_builder()
            .clear_restrictions()
            .restrict("title", ["$eq"])
            .build()
    });

    assert_eq!(
        render(&set, json!({ "rating": { "$gt": 3 } })).unwrap(),
        "posts.rating > 3"
    );
    assert!(matches!(
        render(&set, json!({ "title": { "$like": "%a%" } })),
        Err(FilterError::OperatorNotSupported { operator, .. }) if operator == "$like"
    ));
}

#[test_log::test]
fn test_renamed_for_one_query() {
    let set = narrowed(|p| p.to_builder().renamed_field("headline", "title").build());
    assert_eq!(
        render(&set, json!({ "headline": "x" })).unwrap(),
        "posts.title = 'x'"
    );
}

#[test_log::test]
fn test_only_operators() {
    let set = narrowed(|p| p.only_operators(["$eq", "$or"]));

    assert_eq!(
        render(&set, json!({ "$or": [{ "id": 1 }, { "id": 2 }] })).unwrap(),
        "((posts.id = 1) OR (posts.id = 2))"
    );
    assert!(matches!(
        render(&set, json!({ "id": { "$in": [1] } })),
        Err(FilterError::OperatorNotSupported { operator, .. }) if operator == "$in"
    ));
}

#[test_log::test]
fn test_declared_policy_unchanged() {
    let _ = narrowed(|p| p.only_fields(["title"]));
    assert_eq!(
        render(&FilterSet::new(), json!({ "rating": { "$gte": 3 } })).unwrap(),
        "posts.rating >= 3"
    );
}
