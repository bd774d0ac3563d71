//! # Describe what may be filtered on a model
//!
//! Every model that can be filtered publishes a [`ModelPolicy`]: the
//! fields and relations exposed to filters, the operators each field
//! accepts, and the real column behind any renamed field. Filtering
//! reads a policy but never changes it.
//!
//! The usual way to produce a policy is to derive [`Filterable`]:
//!
//! ```rust
//! use filter_query::Filterable;
//!
//! #[derive(Filterable)]
//! #[filter(table = "comments")]
//! struct Comment {
//!     content: String,
//! }
//!
//! #[derive(Filterable)]
//! #[filter(table = "posts", restrict = "id:$eq,$in")]
//! struct Post {
//!     id: i64,
//!     #[filter(rename = "headline", op("$eq", "$like"))]
//!     title: String,
//!     #[filter(relation)]
//!     comments: Vec<Comment>,
//!     #[filter(exclude)]
//!     secret: String,
//! }
//!
//! let policy = Post::policy();
//! assert!(policy.is_field("headline"));
//! assert_eq!(policy.real_column("headline"), "title");
//! assert!(policy.is_relation("comments"));
//! assert!(!policy.is_field("secret"));
//! ```
//!
//! Policies can also be built by hand with [`ModelPolicy::builder`],
//! which is what the derive macro expands to.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use thiserror::Error;

/// Something which can describe how it may be filtered.
///
/// This is the main derivable trait of the crate; see the
/// [module documentation](crate::policy) for the attributes the
/// derive macro understands.
pub trait Filterable {
    /// Produce the filter policy for this type.
    fn policy() -> ModelPolicy;
}

impl<T: Filterable> Filterable for Vec<T> {
    fn policy() -> ModelPolicy {
        T::policy()
    }
}

impl<T: Filterable> Filterable for Option<T> {
    fn policy() -> ModelPolicy {
        T::policy()
    }
}

impl<T: Filterable> Filterable for Box<T> {
    fn policy() -> ModelPolicy {
        T::policy()
    }
}

impl<T: Filterable> Filterable for Arc<T> {
    fn policy() -> ModelPolicy {
        T::policy()
    }
}

/// Errors produced when parsing a `"field:op1,op2"` restriction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseRestrictionError {
    #[error("restriction '{0}' has no ':' between field and operators")]
    MissingSeparator(String),
    #[error("restriction '{0}' names no field")]
    EmptyField(String),
    #[error("restriction '{0}' contains an empty operator")]
    EmptyOperator(String),
}

/// The operators a single field is restricted to.
///
/// Restrictions can be written either as a field and a list of
/// operators, or as a single string of the form `"field:op1,op2"`.
/// Both forms produce the same value:
///
/// ```rust
/// use filter_query::Restriction;
///
/// let a = Restriction::new("title", ["$eq", "$like"]);
/// let b: Restriction = "title:$eq,$like".parse().unwrap();
/// assert_eq!(a, b);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Restriction {
    field: String,
    operators: Vec<String>,
}

impl Restriction {
    pub fn new<I, S>(field: impl Into<String>, operators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field: field.into(),
            operators: operators.into_iter().map(Into::into).collect(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operators(&self) -> &[String] {
        &self.operators
    }
}

impl FromStr for Restriction {
    type Err = ParseRestrictionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, operators) = s
            .split_once(':')
            .ok_or_else(|| ParseRestrictionError::MissingSeparator(s.to_string()))?;
        let field = field.trim();
        if field.is_empty() {
            return Err(ParseRestrictionError::EmptyField(s.to_string()));
        }
        let operators = operators
            .split(',')
            .map(str::trim)
            .map(|op| {
                if op.is_empty() {
                    Err(ParseRestrictionError::EmptyOperator(s.to_string()))
                } else {
                    Ok(op.to_string())
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Restriction::new(field, operators))
    }
}

#[derive(Clone)]
enum Related {
    // built on first use; clones of the policy share the cell
    Declared(fn() -> ModelPolicy, Arc<OnceLock<Arc<ModelPolicy>>>),
    Shared(Arc<ModelPolicy>),
}

impl Related {
    fn declared(make: fn() -> ModelPolicy) -> Self {
        Related::Declared(make, Arc::new(OnceLock::new()))
    }

    fn policy(&self) -> Arc<ModelPolicy> {
        match self {
            Related::Declared(make, cell) => cell.get_or_init(|| Arc::new(make())).clone(),
            Related::Shared(p) => p.clone(),
        }
    }
}

impl fmt::Debug for Related {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Related::Declared(_, cell) => match cell.get() {
                Some(p) => write!(f, "Declared({})", p.model),
                None => write!(f, "Declared"),
            },
            Related::Shared(p) => write!(f, "Shared({})", p.model),
        }
    }
}

#[derive(Clone, Debug)]
struct RelationPolicy {
    // the name the query builder knows the relation by
    name: String,
    related: Related,
}

/// The filter whitelist for one model.
///
/// Exposed names are what filter expressions use; everything
/// downstream of the policy (columns, relation names handed to the
/// query) uses the real names.
#[derive(Clone, Debug)]
pub struct ModelPolicy {
    model: String,
    table: String,
    fields: BTreeSet<String>,
    relations: BTreeMap<String, RelationPolicy>,
    restrictions: BTreeMap<String, Vec<String>>,
    renames: BTreeMap<String, String>,
    operators: Option<Vec<String>>,
}

impl ModelPolicy {
    /// Start describing model `model`, stored in table `table`.
    ///
    /// The table is used to qualify columns; pass an empty string to
    /// leave columns unqualified.
    pub fn builder(model: impl Into<String>, table: impl Into<String>) -> ModelPolicyBuilder {
        ModelPolicyBuilder {
            policy: ModelPolicy {
                model: model.into(),
                table: table.into(),
                fields: BTreeSet::new(),
                relations: BTreeMap::new(),
                restrictions: BTreeMap::new(),
                renames: BTreeMap::new(),
                operators: None,
            },
        }
    }

    /// The model's type name, used in error messages.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    pub fn relations(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(String::as_str)
    }

    pub fn is_field(&self, name: &str) -> bool {
        self.fields.contains(name)
    }

    pub fn is_relation(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// Everything a filter key may name on this model, for error reports.
    pub fn available(&self) -> Vec<String> {
        self.fields
            .iter()
            .chain(self.relations.keys())
            .cloned()
            .collect()
    }

    /// The operators `field` is restricted to, or `None` when any
    /// registered operator may be used.
    pub fn allowed_operators(&self, field: &str) -> Option<&[String]> {
        self.restrictions.get(field).map(Vec::as_slice)
    }

    /// The operators this model accepts at all, when it narrows the
    /// registry.
    pub fn model_operators(&self) -> Option<&[String]> {
        self.operators.as_deref()
    }

    /// The column behind exposed field `field`.
    pub fn real_column<'a>(&'a self, field: &'a str) -> &'a str {
        self.renames.get(field).map(String::as_str).unwrap_or(field)
    }

    /// The name the query knows relation `relation` by.
    pub fn real_relation<'a>(&'a self, relation: &'a str) -> &'a str {
        self.relations
            .get(relation)
            .map(|r| r.name.as_str())
            .unwrap_or(relation)
    }

    /// The policy of the model reached by following `relation`.
    pub fn related_policy(&self, relation: &str) -> Option<Arc<ModelPolicy>> {
        self.relations.get(relation).map(|r| r.related.policy())
    }

    /// Reopen this policy for further declarations.
    pub fn to_builder(&self) -> ModelPolicyBuilder {
        ModelPolicyBuilder {
            policy: self.clone(),
        }
    }

    /// Keep only the exposed fields named in `names`.
    ///
    /// Names that are not already exposed are ignored, so this can
    /// only narrow the policy.
    pub fn only_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keep: BTreeSet<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
        self.fields.retain(|f| keep.contains(f));
        let fields = &self.fields;
        self.renames.retain(|f, _| fields.contains(f));
        self.restrictions.retain(|f, _| fields.contains(f));
        self
    }

    /// Keep only the exposed relations named in `names`.
    pub fn only_relations<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keep: BTreeSet<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
        self.relations.retain(|r, _| keep.contains(r));
        self
    }

    /// Accept only `operators` on this model.
    ///
    /// An existing model-wide list is intersected rather than replaced.
    pub fn only_operators<I, S>(mut self, operators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut operators: Vec<String> = operators.into_iter().map(Into::into).collect();
        if let Some(existing) = &self.operators {
            operators.retain(|op| existing.contains(op));
        }
        self.operators = Some(operators);
        self
    }
}

/// Builder for [`ModelPolicy`].
#[derive(Debug)]
pub struct ModelPolicyBuilder {
    policy: ModelPolicy,
}

impl ModelPolicyBuilder {
    /// Expose column `name` under its own name.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.policy.fields.insert(name.into());
        self
    }

    pub fn fields<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().fold(self, |b, name| b.field(name))
    }

    /// Expose column `column` as `exposed`.
    pub fn renamed_field(mut self, exposed: impl Into<String>, column: impl Into<String>) -> Self {
        let exposed = exposed.into();
        self.policy.renames.insert(exposed.clone(), column.into());
        self.policy.fields.insert(exposed);
        self
    }

    /// Expose relation `name`, leading to model `T`.
    ///
    /// The related policy is produced on demand, so models may refer
    /// to each other in cycles.
    pub fn relation<T: Filterable>(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.insert_relation(name.clone(), name, Related::declared(T::policy))
    }

    /// Expose relation `relation` as `exposed`, leading to model `T`.
    pub fn renamed_relation<T: Filterable>(
        self,
        exposed: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        self.insert_relation(exposed.into(), relation.into(), Related::declared(T::policy))
    }

    /// Expose relation `name`, leading to an already built policy.
    pub fn relation_policy(self, name: impl Into<String>, related: Arc<ModelPolicy>) -> Self {
        let name = name.into();
        self.insert_relation(name.clone(), name, Related::Shared(related))
    }

    fn insert_relation(mut self, exposed: String, name: String, related: Related) -> Self {
        self.policy
            .relations
            .insert(exposed, RelationPolicy { name, related });
        self
    }

    /// Restrict `field` to `operators`.
    ///
    /// Restricting the same field twice accepts the union.
    pub fn restrict<I, S>(self, field: impl Into<String>, operators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.restriction(Restriction::new(field, operators))
    }

    pub fn restriction(mut self, restriction: Restriction) -> Self {
        let Restriction { field, operators } = restriction;
        let allowed = self.policy.restrictions.entry(field).or_default();
        for op in operators {
            if !allowed.contains(&op) {
                allowed.push(op);
            }
        }
        self
    }

    /// Drop every field restriction declared so far.
    pub fn clear_restrictions(mut self) -> Self {
        self.policy.restrictions.clear();
        self
    }

    /// Accept only `operators` on this model, out of those registered.
    pub fn operators<I, S>(mut self, operators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.policy.operators = Some(operators.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> ModelPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tag;

    impl Filterable for Tag {
        fn policy() -> ModelPolicy {
            ModelPolicy::builder("Tag", "tags").field("name").build()
        }
    }

    #[test]
    fn parse_restriction() {
        let r: Restriction = "title : $eq, $ne".parse().unwrap();
        assert_eq!(r.field(), "title");
        assert_eq!(r.operators(), &["$eq".to_string(), "$ne".to_string()]);

        assert_eq!(
            "title".parse::<Restriction>(),
            Err(ParseRestrictionError::MissingSeparator("title".to_string()))
        );
        assert_eq!(
            ":$eq".parse::<Restriction>(),
            Err(ParseRestrictionError::EmptyField(":$eq".to_string()))
        );
        assert_eq!(
            "title:$eq,".parse::<Restriction>(),
            Err(ParseRestrictionError::EmptyOperator("title:$eq,".to_string()))
        );
    }

    #[test]
    fn both_restriction_forms_agree() {
        let a = ModelPolicy::builder("Post", "posts")
            .field("title")
            .restrict("title", ["$eq", "$ne"])
            .build();
        let b = ModelPolicy::builder("Post", "posts")
            .field("title")
            .restriction("title:$eq,$ne".parse().unwrap())
            .build();
        assert_eq!(a.allowed_operators("title"), b.allowed_operators("title"));
        assert_eq!(a.allowed_operators("other"), None);
    }

    #[test]
    fn restrictions_merge() {
        let p = ModelPolicy::builder("Post", "posts")
            .restrict("title", ["$eq"])
            .restrict("title", ["$eq", "$like"])
            .build();
        assert_eq!(
            p.allowed_operators("title"),
            Some(&["$eq".to_string(), "$like".to_string()][..])
        );
    }

    #[test]
    fn renames() {
        let p = ModelPolicy::builder("Post", "posts")
            .field("id")
            .renamed_field("headline", "title")
            .build();
        assert!(p.is_field("headline"));
        assert!(!p.is_field("title"));
        assert_eq!(p.real_column("headline"), "title");
        assert_eq!(p.real_column("id"), "id");
    }

    #[test]
    fn relations() {
        let shared = Arc::new(ModelPolicy::builder("User", "users").field("name").build());
        let p = ModelPolicy::builder("Post", "posts")
            .relation::<Vec<Tag>>("tags")
            .renamed_relation::<Tag>("labels", "tags")
            .relation_policy("author", shared)
            .build();

        assert_eq!(p.related_policy("tags").unwrap().model(), "Tag");
        assert_eq!(p.related_policy("author").unwrap().table(), "users");
        assert_eq!(p.real_relation("labels"), "tags");
        assert!(p.related_policy("comments").is_none());
        assert_eq!(
            p.relations().collect::<Vec<_>>(),
            vec!["author", "labels", "tags"]
        );
    }

    #[test]
    fn declared_relations_are_built_once() {
        let p = ModelPolicy::builder("Post", "posts")
            .relation::<Tag>("tags")
            .build();
        let first = p.related_policy("tags").unwrap();
        let second = p.related_policy("tags").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let copy = p.clone();
        assert!(Arc::ptr_eq(&first, &copy.related_policy("tags").unwrap()));
    }

    #[test]
    fn narrowing() {
        let p = ModelPolicy::builder("Post", "posts")
            .fields(["id", "rating"])
            .renamed_field("body", "content")
            .restrict("rating", ["$eq", "$gte"])
            .restrict("body", ["$like"])
            .relation::<Tag>("tags")
            .relation::<Tag>("labels")
            .operators(["$eq", "$gte", "$like", "$and"])
            .build()
            .only_fields(["rating", "secret"])
            .only_relations(["labels"])
            .only_operators(["$eq", "$in", "$gte"]);

        assert_eq!(p.fields().collect::<Vec<_>>(), vec!["rating"]);
        assert_eq!(p.relations().collect::<Vec<_>>(), vec!["labels"]);
        assert_eq!(p.real_column("body"), "body");
        assert_eq!(p.allowed_operators("body"), None);
        assert_eq!(
            p.model_operators(),
            Some(&["$eq".to_string(), "$gte".to_string()][..])
        );
    }

    #[test]
    fn reopen() {
        let p = ModelPolicy::builder("Post", "posts")
            .field("id")
            .restrict("id", ["$eq"])
            .build()
            .to_builder()
            .clear_restrictions()
            .renamed_field("headline", "title")
            .restrict("headline", ["$like"])
            .build();
        assert_eq!(p.fields().collect::<Vec<_>>(), vec!["headline", "id"]);
        assert_eq!(p.allowed_operators("id"), None);
        assert_eq!(p.real_column("headline"), "title");
        assert_eq!(p.allowed_operators("headline").unwrap(), &["$like"]);
    }
}
