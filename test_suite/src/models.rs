#![cfg(test)]
#![allow(dead_code)]

use filter_query::mock::MockQuery;
use filter_query::{Config, Expression, FilterError, FilterSet, Filterable, Plan};

#[derive(Filterable)]
#[filter(table = "users")]
pub struct User {
    pub id: i64,
    pub name: String,
    #[filter(exclude)]
    pub password: String,
    #[filter(relation)]
    pub posts: Vec<Post>,
}

#[derive(Filterable)]
#[filter(table = "posts", restrict = "rating:$eq,$gte,$lte,$between")]
pub struct Post {
    pub id: i64,
    #[filter(op("$eq", "$like", "$contains", "$startsWith"))]
    pub title: String,
    pub rating: i32,
    #[filter(rename = "body")]
    pub content: String,
    pub published: bool,
    #[filter(relation)]
    pub author: User,
    #[filter(relation, rename = "replies")]
    pub comments: Vec<Comment>,
}

#[derive(Filterable)]
#[filter(
    table = "comments",
    model = "PostComment",
    operators("$eq", "$ne", "$in", "$and", "$or")
)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    #[filter(relation)]
    pub author: User,
}

/// Resolve `filters` for `Post` with `config`, rendering what was
/// applied.
pub fn run(config: &Config, filters: serde_json::Value) -> Result<(String, Plan), FilterError> {
    let set = FilterSet::<Post>::with_config(config)?;
    let mut query = MockQuery::new();
    let plan = set.apply(&mut query, &Expression::from(filters))?;
    Ok((query.to_string(), plan))
}

pub fn strict(filters: serde_json::Value) -> Result<String, FilterError> {
    run(&Config::default(), filters).map(|(rendered, _)| rendered)
}

pub fn silent(filters: serde_json::Value) -> Result<(String, Plan), FilterError> {
    run(&Config::default().silent(true), filters)
}
