#![cfg(test)]

use filter_query::mock::MockQuery;
use filter_query::params::{from_query_pairs, ParamError};
use filter_query::{Config, FilterError, FilterSet};

use crate::models::Post;

fn apply(query_string: &str, config: &Config) -> Result<String, FilterError> {
    let pairs = query_string.split('&').filter_map(|p| p.split_once('='));
    let filters = from_query_pairs("filters", pairs).expect("well formed parameters");
    let mut query = MockQuery::new();
    FilterSet::<Post>::with_config(config)?.apply(&mut query, &filters)?;
    Ok(query.to_string())
}

#[test_log::test]
fn test_query_string() {
    assert_eq!(
        apply(
            "filters[title][$eq]=a&filters[$or][0][rating][$gte]=4&filters[$or][1][id][$in][]=1&filters[$or][1][id][$in][]=2&page=2",
            &Config::default()
        )
        .unwrap(),
        "posts.title = 'a' AND ((posts.rating >= '4') OR (posts.id IN ('1', '2')))"
    );
}

#[test_log::test]
fn test_text_flags() {
    assert_eq!(
        apply("filters[body][$null]=true", &Config::default()).unwrap(),
        "posts.content IS NULL"
    );
    assert_eq!(
        apply("filters[body][$notNull]=0", &Config::default()).unwrap(),
        "posts.content IS NULL"
    );
}

#[test_log::test]
fn test_dotted_keys() {
    assert_eq!(
        apply("filters[author.name][$eq]=ann", &Config::default()).unwrap(),
        "EXISTS author (users.name = 'ann')"
    );
}

#[test_log::test]
fn test_implicit_and_silent() {
    assert_eq!(
        apply(
            "filters[title]=a&filters[secret]=b",
            &Config::default().silent(true)
        )
        .unwrap(),
        "posts.title = 'a'"
    );
}

#[test]
fn test_bad_parameters() {
    assert_eq!(
        from_query_pairs("filters", [("filters[title]]", "a")]),
        Err(ParamError::MalformedKey("filters[title]]".to_string()))
    );
    assert!(matches!(
        from_query_pairs(
            "filters",
            [("filters[$or][0][id]", "1"), ("filters[$or][title]", "a")]
        ),
        Err(ParamError::Conflict(_))
    ));
}

#[test]
fn test_oversized_index() {
    let key = "filters[$or][18446744073709551615][id]";
    assert_eq!(
        from_query_pairs("filters", [(key, "1")]),
        Err(ParamError::IndexTooLarge(key.to_string()))
    );
    assert!(from_query_pairs("filters", [("filters[id][$in][1024]", "1")]).is_ok());
}
