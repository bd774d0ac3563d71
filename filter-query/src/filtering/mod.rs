//! # Turn filter expressions into query constraints
//!
//! Filters arrive as nested maps, usually decoded from a query string
//! such as `?filters[title][$eq]=hello`. The simplest entries are
//! things like `title: "hello"`, which means the column behind the
//! exposed field `title` must equal `"hello"`. More precisely, it
//! means: "apply the `$eq` operator to that column with a right hand
//! side of `"hello"`".
//!
//! There are three ways this simple model is extended. Firstly, a
//! field can map to operators instead of a value, as in
//! `rating: { "$gte": 3, "$lt": 5 }`, and each operator adds one
//! constraint.
//!
//! Secondly, models can have relations. If `comments` is a relation of
//! a post, then `comments: { content: "hi" }` means "posts with at
//! least one comment whose content is `hi`". The same thing can be
//! written as a dotted path, `"comments.content": "hi"`, and paths can
//! run through several relations.
//!
//! Thirdly, `$and` and `$or` take a list of filter maps, and combine
//! them. Each map in the list is resolved against the same model as
//! the key itself.
//!
//! Every step is checked against the model's [`ModelPolicy`]: unknown
//! keys, and operators a field is not allowed to use, are rejected.
//! In silent mode, rejected keys are dropped instead, and the rest of
//! the filter still applies.
//!
//! ## Overview
//!
//! A [`FilterSet`] can be constructed for any
//! [`Filterable`](crate::Filterable) type. It resolves an
//! [`Expression`] into a [`Plan`], a tree of [`Clause`]s, and applies
//! that to anything implementing [`QueryScope`].
//!
//! Example:
//! ```rust
//! use filter_query::{Expression, Filterable, FilterSet};
//! use filter_query::mock::MockQuery;
//!
//! #[derive(Filterable)]
//! #[filter(table = "comments")]
//! struct Comment {
//!     content: String,
//! }
//!
//! #[derive(Filterable)]
//! #[filter(table = "posts")]
//! struct Post {
//!     title: String,
//!     #[filter(relation)]
//!     comments: Vec<Comment>,
//! }
//!
//! let filters = Expression::from(serde_json::json!({
//!     "title": { "$ne": "draft" },
//!     "comments": { "content": "first!" },
//! }));
//!
//! let mut query = MockQuery::new();
//! FilterSet::<Post>::new().apply(&mut query, &filters).unwrap();
//! assert_eq!(
//!     query.to_string(),
//!     "EXISTS comments (comments.content = 'first!') AND posts.title != 'draft'"
//! );
//! ```

pub mod context;
pub mod ops;
pub mod validate;

use std::marker::PhantomData;
use std::sync::Arc;

use log::{debug, trace};
use serde::Deserialize;
use strum::IntoEnumIterator;
use thiserror::Error;

use crate::expression::Expression;
use crate::policy::{Filterable, ModelPolicy};

use self::context::Context;
use self::ops::{BuiltinOperator, Condition, Conjunction, Predicate, Registry};
use self::validate::Validator;

/// Errors produced by filtering.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Some path through the filter never reaches an operator.
    #[error("filter '{key}' on {model} does not end in an operator; expected one of: {}", .operators.join(", "))]
    NoOperatorMatch {
        key: String,
        model: String,
        operators: Vec<String>,
    },
    /// An operator was given a right hand side of the wrong shape.
    #[error("operator '{operator}' on '{field}' expects {expected}")]
    InvalidOperand {
        field: String,
        operator: String,
        expected: &'static str,
    },
    /// The key is not an exposed field or relation of the model.
    #[error("'{key}' is not a filterable field or relation of {model}; available: {}", .available.join(", "))]
    FieldNotSupported {
        key: String,
        model: String,
        available: Vec<String>,
    },
    /// The operator is registered, but not allowed here.
    #[error("operator '{operator}' is not allowed on '{field}' of {model}; allowed: {}", .allowed.join(", "))]
    OperatorNotSupported {
        field: String,
        operator: String,
        model: String,
        allowed: Vec<String>,
    },
    /// The operator has no registered strategy. This is a setup
    /// problem and is never silenced.
    #[error("operator '{operator}' used on '{field}' of {model} is not registered; supported: {}", .allowed.join(", "))]
    UnregisteredOperator {
        field: String,
        operator: String,
        model: String,
        allowed: Vec<String>,
    },
    /// Configuration named an operator with no built-in strategy.
    #[error("no built-in strategy for operator '{0}'")]
    UnknownStrategy(String),
    /// A custom strategy failed.
    #[error(transparent)]
    Strategy(#[from] anyhow::Error),
}

impl FilterError {
    /// Whether silent mode may drop the offending key and carry on.
    ///
    /// Errors caused by the filter itself are recoverable; errors
    /// caused by setup are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FilterError::NoOperatorMatch { .. }
                | FilterError::InvalidOperand { .. }
                | FilterError::FieldNotSupported { .. }
                | FilterError::OperatorNotSupported { .. }
        )
    }
}

/// Filtering configuration.
///
/// `operators` lists the built-in strategies to register, in order.
/// When `silent` is set, keys that fail validation or policy checks
/// are skipped rather than reported.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub silent: bool,
    pub operators: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            silent: false,
            operators: BuiltinOperator::iter()
                .map(|op| op.as_ref().to_string())
                .collect(),
        }
    }
}

impl Config {
    /// Read a configuration such as
    /// `{"silent": true, "operators": ["$eq", "$in", "$or"]}`.
    /// Missing keys take their default values.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }
}

/// The query being constrained.
///
/// This is implemented by the host's query builder. Every method adds
/// to the scope it is called on; sub-scopes are built by the callback
/// and then attached.
pub trait QueryScope: Sized {
    /// Add `condition`, AND-ed with what is already there.
    fn and_where(&mut self, condition: Condition);
    /// Add a parenthesised sub-scope, AND-ed with what is already there.
    fn and_group<F: FnOnce(&mut Self)>(&mut self, build: F);
    /// Add a parenthesised sub-scope, OR-ed with what is already there.
    fn or_group<F: FnOnce(&mut Self)>(&mut self, build: F);
    /// Require at least one record reached through `relation` to
    /// match the sub-scope.
    fn where_has<F: FnOnce(&mut Self)>(&mut self, relation: &str, build: F);
}

/// A resolved constraint, ready to apply to a [`QueryScope`].
#[derive(Clone, Debug, PartialEq)]
pub enum Clause {
    Condition(Condition),
    Group {
        conjunction: Conjunction,
        branches: Vec<Vec<Clause>>,
    },
    Exists {
        relation: String,
        clauses: Vec<Clause>,
    },
}

impl Clause {
    pub fn apply<Q: QueryScope>(&self, query: &mut Q) {
        match self {
            Clause::Condition(c) => query.and_where(c.clone()),
            Clause::Group {
                conjunction: Conjunction::And,
                branches,
            } => {
                for branch in branches {
                    query.and_group(|sub| apply_all(branch, sub));
                }
            }
            Clause::Group {
                conjunction: Conjunction::Or,
                branches,
            } => query.and_group(|outer| {
                for branch in branches {
                    outer.or_group(|sub| apply_all(branch, sub));
                }
            }),
            Clause::Exists { relation, clauses } => {
                query.where_has(relation, |sub| apply_all(clauses, sub))
            }
        }
    }
}

fn apply_all<Q: QueryScope>(clauses: &[Clause], query: &mut Q) {
    for clause in clauses {
        clause.apply(query);
    }
}

/// The result of resolving one top level key.
#[derive(Debug)]
pub enum Outcome {
    Applied(Vec<Clause>),
    Skipped(FilterError),
}

/// A resolved filter.
///
/// Besides the clauses to apply, a plan records which top level keys
/// silent mode skipped, and why.
#[derive(Debug, Default)]
pub struct Plan {
    clauses: Vec<Clause>,
    skipped: Vec<(String, FilterError)>,
}

impl Plan {
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn skipped(&self) -> &[(String, FilterError)] {
        &self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn apply<Q: QueryScope>(&self, query: &mut Q) {
        apply_all(&self.clauses, query)
    }
}

/// The resolution engine.
///
/// A resolver holds only shared, immutable state: it can be reused
/// for any number of resolutions, on any thread. Each call to
/// [`resolve`](Resolver::resolve) works on a fresh [`Context`].
#[derive(Clone, Copy, Debug)]
pub struct Resolver<'r> {
    registry: &'r Registry,
    validator: Validator<'r>,
    silent: bool,
}

impl<'r> Resolver<'r> {
    pub fn new(registry: &'r Registry, silent: bool) -> Self {
        Self {
            registry,
            validator: Validator::new(registry),
            silent,
        }
    }

    /// Resolve and apply `filters` for the model described by `policy`.
    pub fn apply<Q: QueryScope>(
        &self,
        query: &mut Q,
        filters: &Expression,
        policy: Arc<ModelPolicy>,
    ) -> Result<Plan, FilterError> {
        let plan = self.resolve(filters, policy)?;
        plan.apply(query);
        Ok(plan)
    }

    /// Resolve `filters` for the model described by `policy`.
    pub fn resolve(
        &self,
        filters: &Expression,
        policy: Arc<ModelPolicy>,
    ) -> Result<Plan, FilterError> {
        let mut ctx = Context::new(policy);
        let mut plan = Plan::default();

        let entries = match filters {
            Expression::Map(entries) => entries,
            _ => {
                let err = FilterError::NoOperatorMatch {
                    key: String::new(),
                    model: ctx.policy().model().to_string(),
                    operators: self.registry.keys().to_vec(),
                };
                return match self.guard(Err(err))? {
                    Outcome::Skipped(e) => {
                        debug!("Skipping filter: {}", e);
                        plan.skipped.push((String::new(), e));
                        Ok(plan)
                    }
                    Outcome::Applied(_) => Ok(plan),
                };
            }
        };

        for (key, value) in entries {
            match self.resolve_top(&mut ctx, key, value)? {
                Outcome::Applied(clauses) => plan.clauses.extend(clauses),
                Outcome::Skipped(e) => {
                    debug!("Skipping filter '{}': {}", key, e);
                    plan.skipped.push((key.clone(), e));
                }
            }
        }

        Ok(plan)
    }

    fn resolve_top(
        &self,
        ctx: &mut Context,
        key: &str,
        value: &Expression,
    ) -> Result<Outcome, FilterError> {
        let model = ctx.policy().model().to_string();
        let result = self
            .validator
            .validate(key, value, &model)
            .and_then(|()| self.resolve_key(ctx, key, value));
        self.guard(result)
    }

    fn guard(&self, result: Result<Vec<Clause>, FilterError>) -> Result<Outcome, FilterError> {
        match result {
            Ok(clauses) => Ok(Outcome::Applied(clauses)),
            Err(e) if self.silent && e.is_recoverable() => Ok(Outcome::Skipped(e)),
            Err(e) => Err(e),
        }
    }

    fn resolve_key(
        &self,
        ctx: &mut Context,
        key: &str,
        value: &Expression,
    ) -> Result<Vec<Clause>, FilterError> {
        let depth = ctx.depth();
        let result = self
            .resolve_path(ctx, key, value)
            .map(|clauses| ctx.flush(depth, clauses));
        ctx.unwind(depth);
        result
    }

    fn resolve_path(
        &self,
        ctx: &mut Context,
        key: &str,
        value: &Expression,
    ) -> Result<Vec<Clause>, FilterError> {
        trace!("Resolving '{}' on {}", key, ctx.policy().model());

        let target = if self.is_direct(ctx.policy(), key) {
            key
        } else if let Some((path, last)) = key.rsplit_once('.') {
            for relation in path.split('.') {
                if !ctx.policy().is_relation(relation) {
                    return Err(self.field_not_supported(ctx, key));
                }
                ctx.enter(relation)?;
            }
            last
        } else {
            key
        };

        let policy = ctx.policy();
        if BuiltinOperator::is_logical(target) {
            self.resolve_logical(ctx, target, value)
        } else if policy.is_relation(target) {
            self.resolve_relation(ctx, target, value)
        } else if policy.is_field(target) {
            self.resolve_field(ctx, target, value)
        } else {
            Err(self.field_not_supported(ctx, key))
        }
    }

    fn is_direct(&self, policy: &ModelPolicy, key: &str) -> bool {
        BuiltinOperator::is_logical(key) || policy.is_field(key) || policy.is_relation(key)
    }

    fn field_not_supported(&self, ctx: &Context, key: &str) -> FilterError {
        FilterError::FieldNotSupported {
            key: key.to_string(),
            model: ctx.policy().model().to_string(),
            available: ctx.policy().available(),
        }
    }

    fn resolve_relation(
        &self,
        ctx: &mut Context,
        relation: &str,
        value: &Expression,
    ) -> Result<Vec<Clause>, FilterError> {
        let entries = value
            .as_map()
            .ok_or_else(|| FilterError::NoOperatorMatch {
                key: relation.to_string(),
                model: ctx.policy().model().to_string(),
                operators: self.registry.keys().to_vec(),
            })?;
        ctx.enter(relation)?;
        let mut clauses = Vec::new();
        for (key, value) in entries {
            clauses.extend(self.resolve_key(ctx, key, value)?);
        }
        Ok(clauses)
    }

    fn resolve_logical(
        &self,
        ctx: &Context,
        token: &str,
        value: &Expression,
    ) -> Result<Vec<Clause>, FilterError> {
        let policy = ctx.policy();
        let strategy = self.registry.resolve(token).ok_or_else(|| {
            FilterError::UnregisteredOperator {
                field: token.to_string(),
                operator: token.to_string(),
                model: policy.model().to_string(),
                allowed: self.registry.keys().to_vec(),
            }
        })?;
        if let Some(allowed) = policy.model_operators() {
            if !allowed.iter().any(|op| op == token) {
                return Err(FilterError::OperatorNotSupported {
                    field: token.to_string(),
                    operator: token.to_string(),
                    model: policy.model().to_string(),
                    allowed: allowed.to_vec(),
                });
            }
        }

        match strategy.instantiate("", value)? {
            Predicate::Group {
                conjunction,
                branches,
            } => {
                let shared = ctx.shared_policy();
                let mut resolved = Vec::with_capacity(branches.len());
                for branch in &branches {
                    let clauses = self.resolve(branch, shared.clone())?.clauses;
                    // a branch emptied by silent skips constrains nothing
                    if !clauses.is_empty() {
                        resolved.push(clauses);
                    }
                }
                trace!("{} group of {} on {}", token, resolved.len(), policy.model());
                if resolved.is_empty() {
                    return Ok(Vec::new());
                }
                Ok(vec![Clause::Group {
                    conjunction,
                    branches: resolved,
                }])
            }
            Predicate::Condition(c) => Ok(vec![Clause::Condition(c)]),
        }
    }

    fn resolve_field(
        &self,
        ctx: &Context,
        field: &str,
        value: &Expression,
    ) -> Result<Vec<Clause>, FilterError> {
        let policy = ctx.policy();
        let column = ctx.column(field);

        let implicit;
        let operators: &[(String, Expression)] = match value {
            Expression::Map(entries) => entries,
            other => {
                implicit = [(BuiltinOperator::Eq.as_ref().to_string(), other.clone())];
                &implicit
            }
        };

        let mut clauses = Vec::with_capacity(operators.len());
        for (operator, operand) in operators {
            let operand = operand.unwrap_single();

            let strategy = match self.registry.resolve(operator) {
                Some(strategy) => strategy,
                None if operator.starts_with('$') => {
                    return Err(FilterError::UnregisteredOperator {
                        field: field.to_string(),
                        operator: operator.clone(),
                        model: policy.model().to_string(),
                        allowed: policy
                            .allowed_operators(field)
                            .unwrap_or_else(|| self.registry.keys())
                            .to_vec(),
                    })
                }
                None => {
                    return Err(FilterError::NoOperatorMatch {
                        key: field.to_string(),
                        model: policy.model().to_string(),
                        operators: self.registry.keys().to_vec(),
                    })
                }
            };

            for allowed in [policy.model_operators(), policy.allowed_operators(field)]
                .into_iter()
                .flatten()
            {
                if !allowed.iter().any(|op| op == operator) {
                    return Err(FilterError::OperatorNotSupported {
                        field: field.to_string(),
                        operator: operator.clone(),
                        model: policy.model().to_string(),
                        allowed: allowed.to_vec(),
                    });
                }
            }

            let predicate = strategy.instantiate(&column, operand).map_err(|e| match e {
                FilterError::InvalidOperand {
                    operator, expected, ..
                } => FilterError::InvalidOperand {
                    field: field.to_string(),
                    operator,
                    expected,
                },
                e => e,
            })?;
            match predicate {
                Predicate::Condition(c) => {
                    trace!("Adding {}", c);
                    clauses.push(Clause::Condition(c));
                }
                Predicate::Group { .. } => {
                    return Err(FilterError::InvalidOperand {
                        field: field.to_string(),
                        operator: operator.clone(),
                        expected: "a column operator, not a logical one",
                    })
                }
            }
        }
        Ok(clauses)
    }
}

/// Filtering for one [`Filterable`] type.
///
/// A [`FilterSet`] owns a [`Registry`], the configuration, and the
/// type's [`ModelPolicy`]. It is immutable, so one instance can be
/// built at start up and shared between requests.
pub struct FilterSet<R> {
    registry: Registry,
    silent: bool,
    policy: Arc<ModelPolicy>,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Filterable> Default for FilterSet<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Filterable> FilterSet<R> {
    /// Create a new [`FilterSet`] with every built-in operator, in
    /// strict mode.
    pub fn new() -> Self {
        Self::with_registry(Registry::default(), false)
    }

    /// Create a new [`FilterSet`] with the operators named by `config`.
    pub fn with_config(config: &Config) -> Result<Self, FilterError> {
        Ok(Self::with_registry(
            Registry::from_config(config)?,
            config.silent,
        ))
    }

    /// Create a new [`FilterSet`] with a prepared registry, which may
    /// hold custom strategies.
    pub fn with_registry(registry: Registry, silent: bool) -> Self {
        Self {
            registry,
            silent,
            policy: Arc::new(R::policy()),
            _marker: PhantomData,
        }
    }

    /// Filter with `policy` instead of the one `R` declares.
    ///
    /// This is how a single query narrows or reshapes the whitelist,
    /// usually starting from [`FilterSet::policy`] and
    /// [`ModelPolicy::only_fields`] or [`ModelPolicy::to_builder`].
    pub fn with_policy(mut self, policy: ModelPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn policy(&self) -> &ModelPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.registry, self.silent)
    }

    /// Resolve `filters` without applying them.
    pub fn resolve(&self, filters: &Expression) -> Result<Plan, FilterError> {
        self.resolver().resolve(filters, self.policy.clone())
    }

    /// Resolve `filters` and apply them to `query`.
    ///
    /// On error nothing is applied.
    pub fn apply<Q: QueryScope>(
        &self,
        query: &mut Q,
        filters: &Expression,
    ) -> Result<Plan, FilterError> {
        self.resolver().apply(query, filters, self.policy.clone())
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::filtering::ops::Comparison;
    use crate::mock::MockQuery;
    use serde_json::json;

    fn policy() -> Arc<ModelPolicy> {
        let author = Arc::new(ModelPolicy::builder("User", "users").field("name").build());
        Arc::new(
            ModelPolicy::builder("Post", "posts")
                .fields(["id", "title"])
                .restrict("id", ["$eq", "$in"])
                .relation_policy("author", author)
                .build(),
        )
    }

    #[test]
    fn config() {
        let config = Config::from_json(r#"{ "silent": true }"#).unwrap();
        assert!(config.silent);
        assert_eq!(config.operators, Config::default().operators);
        assert_eq!(Config::default().operators.first().map(String::as_str), Some("$eq"));
        assert!(Config::from_json(r#"{ "silent": "yes" }"#).is_err());
    }

    #[test]
    fn recoverable() {
        assert!(FilterError::InvalidOperand {
            field: "id".into(),
            operator: "$in".into(),
            expected: "a list of values",
        }
        .is_recoverable());
        assert!(!FilterError::UnknownStrategy("$x".into()).is_recoverable());
        assert!(!FilterError::Strategy(anyhow::anyhow!("boom")).is_recoverable());
    }

    #[test_log::test]
    fn clause_tree() {
        let registry = Registry::default();
        let resolver = Resolver::new(&registry, false);
        let filters = Expression::map()
            .with("author.name", "ann")
            .with("id", Expression::map().with("$in", vec![1, 2]));
        let plan = resolver.resolve(&filters, policy()).unwrap();
        assert_eq!(
            plan.clauses(),
            &[
                Clause::Exists {
                    relation: "author".into(),
                    clauses: vec![Clause::Condition(Condition::Compare {
                        column: "users.name".into(),
                        op: Comparison::Eq,
                        value: "ann".into(),
                    })],
                },
                Clause::Condition(Condition::In {
                    column: "posts.id".into(),
                    values: vec![1.into(), 2.into()],
                    negated: false,
                }),
            ]
        );
    }

    #[test_log::test]
    fn apply_or() {
        let registry = Registry::default();
        let mut query = MockQuery::new();
        Resolver::new(&registry, false)
            .apply(
                &mut query,
                &json!({ "$or": [{ "id": 1 }, { "title": "x" }] }).into(),
                policy(),
            )
            .unwrap();
        assert_eq!(query.to_string(), "((posts.id = 1) OR (posts.title = 'x'))");
    }

    #[test_log::test]
    fn silent_plan() {
        let registry = Registry::default();
        let filters: Expression = json!({ "id": { "$gt": 1 }, "title": "x" }).into();

        let err = Resolver::new(&registry, false)
            .resolve(&filters, policy())
            .unwrap_err();
        assert!(matches!(err, FilterError::OperatorNotSupported { .. }));

        let plan = Resolver::new(&registry, true)
            .resolve(&filters, policy())
            .unwrap();
        assert_eq!(plan.clauses().len(), 1);
        assert_eq!(plan.skipped().len(), 1);
        assert_eq!(plan.skipped()[0].0, "id");

        let plan = Resolver::new(&registry, true)
            .resolve(&Expression::list([1]), policy())
            .unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.skipped().len(), 1);
    }

    struct Post;

    impl Filterable for Post {
        fn policy() -> ModelPolicy {
            policy().as_ref().clone()
        }
    }

    #[test_log::test]
    fn per_query_policy() {
        let set = FilterSet::<Post>::new();
        let narrowed = set.policy().clone().only_fields(["title"]);
        let set = set.with_policy(narrowed);

        assert!(matches!(
            set.resolve(&json!({ "id": 1 }).into()),
            Err(FilterError::FieldNotSupported { .. })
        ));
        let mut query = MockQuery::new();
        set.apply(&mut query, &json!({ "title": "x" }).into()).unwrap();
        assert_eq!(query.to_string(), "posts.title = 'x'");
    }
}
