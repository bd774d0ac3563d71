#![cfg(test)]
#![allow(dead_code)]

use filter_query::{Filterable, ModelPolicy};

use crate::models::{Comment, Post, User};

#[derive(Filterable)]
struct BlogTag {
    label: String,
}

#[derive(Filterable)]
#[filter(table = "")]
#[filter(restrict = "kind:$eq", restrict = "kind:$in")]
struct Bare {
    kind: String,
    #[filter(op("$gt"))]
    #[filter(op("$lt"))]
    size: i64,
}

#[derive(Filterable)]
#[filter(table = "wrappers")]
struct Wrapper<T> {
    value: T,
    #[filter(relation)]
    tag: Option<Box<BlogTag>>,
}

fn names<'a>(it: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    it.collect()
}

#[test]
fn test_post_policy() {
    let policy = Post::policy();
    assert_eq!(policy.model(), "Post");
    assert_eq!(policy.table(), "posts");
    assert_eq!(
        names(policy.fields()),
        vec!["body", "id", "published", "rating", "title"]
    );
    assert_eq!(names(policy.relations()), vec!["author", "replies"]);
    assert_eq!(policy.real_column("body"), "content");
    assert_eq!(policy.real_column("title"), "title");
    assert_eq!(policy.real_relation("replies"), "comments");
    assert_eq!(
        policy.allowed_operators("rating").unwrap(),
        &["$eq", "$gte", "$lte", "$between"]
    );
    assert_eq!(
        policy.allowed_operators("title").unwrap(),
        &["$eq", "$like", "$contains", "$startsWith"]
    );
    assert!(policy.allowed_operators("id").is_none());
    assert!(policy.model_operators().is_none());
}

#[test]
fn test_excluded_field() {
    let policy = User::policy();
    assert!(policy.is_field("name"));
    assert!(!policy.is_field("password"));
    assert!(!policy.available().contains(&"password".to_string()));
}

#[test]
fn test_related_policies() {
    let post = Post::policy();
    let replies = post.related_policy("replies").unwrap();
    assert_eq!(replies.model(), "PostComment");
    assert_eq!(
        replies.model_operators().unwrap(),
        &["$eq", "$ne", "$in", "$and", "$or"]
    );
    let author = replies.related_policy("author").unwrap();
    assert_eq!(author.model(), "User");
    let posts = author.related_policy("posts").unwrap();
    assert_eq!(posts.model(), "Post");
    assert!(post.related_policy("title").is_none());
    assert_eq!(Comment::policy().table(), "comments");
}

#[test]
fn test_defaults() {
    let policy = BlogTag::policy();
    assert_eq!(policy.model(), "BlogTag");
    assert_eq!(policy.table(), "blog_tag");
    assert_eq!(names(policy.fields()), vec!["label"]);
}

#[test]
fn test_repeated_attributes() {
    let policy = Bare::policy();
    assert_eq!(policy.table(), "");
    assert_eq!(policy.allowed_operators("kind").unwrap(), &["$eq", "$in"]);
    assert_eq!(policy.allowed_operators("size").unwrap(), &["$gt", "$lt"]);
}

#[test]
fn test_generic() {
    let policy = Wrapper::<i32>::policy();
    assert!(policy.is_field("value"));
    assert_eq!(
        policy.related_policy("tag").map(|p| p.table().to_string()),
        Some("blog_tag".to_string())
    );
}

#[test]
fn test_builder_matches_derive() {
    let built = ModelPolicy::builder("BlogTag", "blog_tag")
        .field("label")
        .build();
    let derived = BlogTag::policy();
    assert_eq!(names(built.fields()), names(derived.fields()));
    assert_eq!(built.table(), derived.table());
}
