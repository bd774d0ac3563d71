#![cfg(test)]

use serde_json::json;

use filter_query::FilterError;

use crate::models::strict;

#[test]
fn test_nested_relation() {
    assert_eq!(
        strict(json!({ "author": { "name": "ann" } })).unwrap(),
        "EXISTS author (users.name = 'ann')"
    );
    assert_eq!(
        strict(json!({ "author": { "id": 1, "name": "ann" } })).unwrap(),
        "EXISTS author (users.id = 1 AND users.name = 'ann')"
    );
}

#[test]
fn test_renamed_relation() {
    assert_eq!(
        strict(json!({ "replies": { "content": "hi" } })).unwrap(),
        "EXISTS comments (comments.content = 'hi')"
    );
    assert!(matches!(
        strict(json!({ "comments": { "content": "hi" } })),
        Err(FilterError::FieldNotSupported { key, .. }) if key == "comments"
    ));
}

#[test]
fn test_deep_relation() {
    assert_eq!(
        strict(json!({ "replies": { "author": { "name": { "$startsWith": "a" } } } })).unwrap(),
        "EXISTS comments (EXISTS author (users.name LIKE 'a%'))"
    );
}

#[test]
fn test_sibling_restores_model() {
    assert_eq!(
        strict(json!({ "author": { "name": "ann" }, "title": "t" })).unwrap(),
        "EXISTS author (users.name = 'ann') AND posts.title = 't'"
    );
    assert_eq!(
        strict(json!({
            "replies": { "author": { "name": "ann" }, "content": "c" },
            "title": "t",
        }))
        .unwrap(),
        "EXISTS comments (EXISTS author (users.name = 'ann') AND comments.content = 'c') AND posts.title = 't'"
    );
}

#[test]
fn test_dotted_path() {
    assert_eq!(
        strict(json!({ "author.name": "ann" })).unwrap(),
        "EXISTS author (users.name = 'ann')"
    );
    assert_eq!(
        strict(json!({ "replies.author.name": { "$ne": "bob" } })).unwrap(),
        "EXISTS comments (EXISTS author (users.name != 'bob'))"
    );
    assert_eq!(
        strict(json!({ "author.name": "ann", "id": 3 })).unwrap(),
        "EXISTS author (users.name = 'ann') AND posts.id = 3"
    );
    assert_eq!(
        strict(json!({ "replies.author": { "name": "ann" } })).unwrap(),
        "EXISTS comments (EXISTS author (users.name = 'ann'))"
    );
}

#[test]
fn test_dotted_path_errors() {
    assert!(matches!(
        strict(json!({ "title.length": 1 })),
        Err(FilterError::FieldNotSupported { key, model, .. })
            if key == "title.length" && model == "Post"
    ));
    assert!(matches!(
        strict(json!({ "author.password": "x" })),
        Err(FilterError::FieldNotSupported { key, model, .. })
            if key == "author.password" && model == "User"
    ));
}

#[test]
fn test_cyclic_models() {
    assert_eq!(
        strict(json!({ "author": { "posts": { "title": "x" } } })).unwrap(),
        "EXISTS author (EXISTS posts (posts.title = 'x'))"
    );
}

#[test]
fn test_related_policy_applies() {
    match strict(json!({ "replies": { "content": { "$like": "%a%" } } })) {
        Err(FilterError::OperatorNotSupported {
            field,
            model,
            allowed,
            ..
        }) => {
            assert_eq!(field, "content");
            assert_eq!(model, "PostComment");
            assert_eq!(allowed, vec!["$eq", "$ne", "$in", "$and", "$or"]);
        }
        other => panic!("expected OperatorNotSupported, got {:?}", other),
    }
    assert!(matches!(
        strict(json!({ "author": { "password": "x" } })),
        Err(FilterError::FieldNotSupported { key, model, .. })
            if key == "password" && model == "User"
    ));
}

#[test]
fn test_relation_needs_map() {
    assert!(matches!(
        strict(json!({ "author": "ann" })),
        Err(FilterError::NoOperatorMatch { key, .. }) if key == "author"
    ));
}

#[test]
fn test_logical_inside_relation() {
    assert_eq!(
        strict(json!({ "author": { "$or": [{ "name": "a" }, { "name": "b" }] } })).unwrap(),
        "EXISTS author (((users.name = 'a') OR (users.name = 'b')))"
    );
}

#[test]
fn test_relations_inside_logical() {
    assert_eq!(
        strict(json!({
            "$or": [
                { "author.name": "a" },
                { "replies": { "content": "b" } },
            ]
        }))
        .unwrap(),
        "((EXISTS author (users.name = 'a')) OR (EXISTS comments (comments.content = 'b')))"
    );
}
