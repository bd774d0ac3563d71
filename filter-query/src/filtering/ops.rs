//! Operator strategies, and the registry that maps tokens to them.
//!
//! A [`Strategy`] turns an operator token applied to a column into a
//! [`Predicate`]. The built-in strategies are the variants of
//! [`BuiltinOperator`]:
//!
//! Token          | Operand                     | Predicate
//! ---------------|-----------------------------|--------------------------------
//! `$eq`          | scalar                      | `column = value`
//! `$ne`          | scalar                      | `column != value`
//! `$gt`          | scalar                      | `column > value`
//! `$gte`         | scalar                      | `column >= value`
//! `$lt`          | scalar                      | `column < value`
//! `$lte`         | scalar                      | `column <= value`
//! `$in`          | sequence of scalars         | `column IN (...)`
//! `$nin`         | sequence of scalars         | `column NOT IN (...)`
//! `$between`     | `[low, high]`               | `column BETWEEN low AND high`
//! `$notBetween`  | `[low, high]`               | `column NOT BETWEEN low AND high`
//! `$like`        | pattern                     | `column LIKE pattern`
//! `$notLike`     | pattern                     | `column NOT LIKE pattern`
//! `$contains`    | text                        | `column LIKE '%text%'`
//! `$notContains` | text                        | `column NOT LIKE '%text%'`
//! `$startsWith`  | text                        | `column LIKE 'text%'`
//! `$endsWith`    | text                        | `column LIKE '%text'`
//! `$null`        | flag                        | `column IS NULL` (or `IS NOT NULL` for false)
//! `$notNull`     | flag                        | `column IS NOT NULL` (or `IS NULL` for false)
//! `$and`         | sequence of expressions     | each expression AND-ed as its own group
//! `$or`          | sequence of expressions     | the expressions OR-ed inside one group
//!
//! A [`Registry`] is built once, at start up, from a list of tokens
//! or strategies and is read-only afterwards.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::Arc;

use strum::IntoEnumIterator;

use crate::expression::{Expression, Scalar};
use crate::filtering::{Config, FilterError};

/// A relational comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::AsRefStr)]
pub enum Comparison {
    #[strum(serialize = "=")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Gte,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Lte,
}

/// How the members of a group combine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::AsRefStr)]
pub enum Conjunction {
    #[strum(serialize = "AND")]
    And,
    #[strum(serialize = "OR")]
    Or,
}

/// One constraint on one column, as handed to a query.
///
/// The `column` is already renamed and qualified with the table alias
/// of the model it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Compare {
        column: String,
        op: Comparison,
        value: Scalar,
    },
    In {
        column: String,
        values: Vec<Scalar>,
        negated: bool,
    },
    Between {
        column: String,
        low: Scalar,
        high: Scalar,
        negated: bool,
    },
    Like {
        column: String,
        pattern: String,
        negated: bool,
    },
    Null {
        column: String,
        negated: bool,
    },
}

impl Condition {
    pub fn column(&self) -> &str {
        match self {
            Condition::Compare { column, .. }
            | Condition::In { column, .. }
            | Condition::Between { column, .. }
            | Condition::Like { column, .. }
            | Condition::Null { column, .. } => column,
        }
    }
}

struct Literal<'a>(&'a Scalar);

impl<'a> Display for Literal<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Scalar::Null => write!(f, "NULL"),
            Scalar::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            other => write!(f, "{}", other),
        }
    }
}

fn not(negated: bool) -> &'static str {
    if negated {
        "NOT "
    } else {
        ""
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Compare { column, op, value } => {
                write!(f, "{} {} {}", column, op.as_ref(), Literal(value))
            }
            Condition::In {
                column,
                values,
                negated,
            } => {
                write!(f, "{} {}IN (", column, not(*negated))?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", Literal(v))?;
                }
                write!(f, ")")
            }
            Condition::Between {
                column,
                low,
                high,
                negated,
            } => write!(
                f,
                "{} {}BETWEEN {} AND {}",
                column,
                not(*negated),
                Literal(low),
                Literal(high)
            ),
            Condition::Like {
                column,
                pattern,
                negated,
            } => write!(
                f,
                "{} {}LIKE {}",
                column,
                not(*negated),
                Literal(&Scalar::Text(pattern.clone()))
            ),
            Condition::Null { column, negated } => {
                write!(f, "{} IS {}NULL", column, not(*negated))
            }
        }
    }
}

/// A deferred constraint produced by a [`Strategy`].
///
/// Conditions constrain a column directly. Groups carry
/// sub-expressions which the resolver resolves against the same model
/// before they are combined with `conjunction`.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Condition(Condition),
    Group {
        conjunction: Conjunction,
        branches: Vec<Expression>,
    },
}

/// Turns one operator applied to one column into a [`Predicate`].
///
/// Strategies are registered once in a [`Registry`] and shared
/// between every resolution, so they hold no per-request state.
pub trait Strategy: Send + Sync {
    /// The token this strategy is registered under, e.g. `"$gt"`.
    fn operator(&self) -> &str;
    /// Build the predicate for `column` with right hand side
    /// `operand`. Logical strategies receive an empty `column`.
    fn instantiate(&self, column: &str, operand: &Expression) -> Result<Predicate, FilterError>;
}

/// The strategies provided by this crate.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    strum::AsRefStr,
    strum::EnumIter,
    strum::EnumString,
)]
pub enum BuiltinOperator {
    #[strum(serialize = "$eq")]
    Eq,
    #[strum(serialize = "$ne")]
    Ne,
    #[strum(serialize = "$gt")]
    Gt,
    #[strum(serialize = "$gte")]
    Gte,
    #[strum(serialize = "$lt")]
    Lt,
    #[strum(serialize = "$lte")]
    Lte,
    #[strum(serialize = "$in")]
    In,
    #[strum(serialize = "$nin")]
    NotIn,
    #[strum(serialize = "$between")]
    Between,
    #[strum(serialize = "$notBetween")]
    NotBetween,
    #[strum(serialize = "$like")]
    Like,
    #[strum(serialize = "$notLike")]
    NotLike,
    #[strum(serialize = "$contains")]
    Contains,
    #[strum(serialize = "$notContains")]
    NotContains,
    #[strum(serialize = "$startsWith")]
    StartsWith,
    #[strum(serialize = "$endsWith")]
    EndsWith,
    #[strum(serialize = "$null")]
    Null,
    #[strum(serialize = "$notNull")]
    NotNull,
    #[strum(serialize = "$and")]
    And,
    #[strum(serialize = "$or")]
    Or,
}

impl BuiltinOperator {
    /// True for `$and` and `$or`, which combine expressions rather
    /// than constrain a column.
    pub fn is_logical(token: &str) -> bool {
        matches!(
            BuiltinOperator::from_str(token),
            Ok(BuiltinOperator::And | BuiltinOperator::Or)
        )
    }
}

struct Operand<'a> {
    column: &'a str,
    operator: &'a str,
    value: &'a Expression,
}

impl<'a> Operand<'a> {
    fn invalid(&self, expected: &'static str) -> FilterError {
        FilterError::InvalidOperand {
            field: self.column.to_string(),
            operator: self.operator.to_string(),
            expected,
        }
    }

    fn scalar(&self) -> Result<Scalar, FilterError> {
        self.value
            .as_scalar()
            .cloned()
            .ok_or_else(|| self.invalid("a single value"))
    }

    fn scalars(&self) -> Result<Vec<Scalar>, FilterError> {
        match self.value {
            Expression::Scalar(s) => Ok(vec![s.clone()]),
            Expression::List(items) => items
                .iter()
                .map(|i| i.as_scalar().cloned())
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| self.invalid("a list of values")),
            Expression::Map(_) => Err(self.invalid("a list of values")),
        }
    }

    fn range(&self) -> Result<(Scalar, Scalar), FilterError> {
        match self.value.as_list() {
            Some([Expression::Scalar(low), Expression::Scalar(high)]) => {
                Ok((low.clone(), high.clone()))
            }
            _ => Err(self.invalid("a [low, high] pair")),
        }
    }

    fn text(&self) -> Result<String, FilterError> {
        self.value
            .as_scalar()
            .and_then(Scalar::to_text)
            .ok_or_else(|| self.invalid("a text value"))
    }

    fn flag(&self) -> Result<bool, FilterError> {
        self.value
            .as_scalar()
            .and_then(Scalar::to_flag)
            .ok_or_else(|| self.invalid("true or false"))
    }

    fn branches(&self) -> Result<Vec<Expression>, FilterError> {
        match self.value {
            Expression::Map(_) => Ok(vec![self.value.clone()]),
            Expression::List(items) if items.iter().all(|i| i.as_map().is_some()) => {
                Ok(items.clone())
            }
            _ => Err(self.invalid("a list of filter maps")),
        }
    }
}

/// Escape the LIKE wildcards in `s`.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl Strategy for BuiltinOperator {
    fn operator(&self) -> &str {
        self.as_ref()
    }

    fn instantiate(&self, column: &str, operand: &Expression) -> Result<Predicate, FilterError> {
        use BuiltinOperator::*;

        let operand = Operand {
            column,
            operator: self.as_ref(),
            value: operand,
        };
        let column = column.to_string();

        let compare = |op: Comparison| -> Result<Predicate, FilterError> {
            Ok(Predicate::Condition(Condition::Compare {
                column: column.clone(),
                op,
                value: operand.scalar()?,
            }))
        };
        let like = |pattern: String, negated: bool| -> Result<Predicate, FilterError> {
            Ok(Predicate::Condition(Condition::Like {
                column: column.clone(),
                pattern,
                negated,
            }))
        };

        match self {
            Eq => compare(Comparison::Eq),
            Ne => compare(Comparison::Ne),
            Gt => compare(Comparison::Gt),
            Gte => compare(Comparison::Gte),
            Lt => compare(Comparison::Lt),
            Lte => compare(Comparison::Lte),
            In | NotIn => Ok(Predicate::Condition(Condition::In {
                column: column.clone(),
                values: operand.scalars()?,
                negated: *self == NotIn,
            })),
            Between | NotBetween => {
                let (low, high) = operand.range()?;
                Ok(Predicate::Condition(Condition::Between {
                    column: column.clone(),
                    low,
                    high,
                    negated: *self == NotBetween,
                }))
            }
            Like => like(operand.text()?, false),
            NotLike => like(operand.text()?, true),
            Contains => like(format!("%{}%", escape_like(&operand.text()?)), false),
            NotContains => like(format!("%{}%", escape_like(&operand.text()?)), true),
            StartsWith => like(format!("{}%", escape_like(&operand.text()?)), false),
            EndsWith => like(format!("%{}", escape_like(&operand.text()?)), false),
            Null | NotNull => {
                let flag = operand.flag()?;
                Ok(Predicate::Condition(Condition::Null {
                    column: column.clone(),
                    negated: flag == (*self == NotNull),
                }))
            }
            And => Ok(Predicate::Group {
                conjunction: Conjunction::And,
                branches: operand.branches()?,
            }),
            Or => Ok(Predicate::Group {
                conjunction: Conjunction::Or,
                branches: operand.branches()?,
            }),
        }
    }
}

/// The set of strategies available to filtering, keyed by token.
///
/// A registry is immutable once built; construct one with
/// [`Registry::builder`], [`Registry::from_config`] or
/// [`Registry::default`], which holds every [`BuiltinOperator`].
#[derive(Clone)]
pub struct Registry {
    strategies: BTreeMap<String, Arc<dyn Strategy>>,
    order: Vec<String>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("operators", &self.order)
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        BuiltinOperator::iter()
            .fold(Registry::builder(), |b, op| b.register(op))
            .build()
    }
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            registry: Registry {
                strategies: BTreeMap::new(),
                order: Vec::new(),
            },
        }
    }

    /// Build a registry holding the built-in strategies named by
    /// `config`, in the order given.
    pub fn from_config(config: &Config) -> Result<Self, FilterError> {
        let mut builder = Registry::builder();
        for token in &config.operators {
            let op = BuiltinOperator::from_str(token)
                .map_err(|_| FilterError::UnknownStrategy(token.clone()))?;
            builder = builder.register(op);
        }
        Ok(builder.build())
    }

    /// Look up the strategy for `token`.
    pub fn resolve(&self, token: &str) -> Option<&dyn Strategy> {
        self.strategies.get(token).map(|s| s.as_ref())
    }

    pub fn contains(&self, token: &str) -> bool {
        self.strategies.contains_key(token)
    }

    /// The registered tokens, in registration order.
    pub fn keys(&self) -> &[String] {
        &self.order
    }
}

/// Builder for [`Registry`].
pub struct RegistryBuilder {
    registry: Registry,
}

impl RegistryBuilder {
    /// Add `strategy` under its own token. A later strategy for the
    /// same token replaces an earlier one.
    pub fn register<S: Strategy + 'static>(mut self, strategy: S) -> Self {
        let token = strategy.operator().to_string();
        if !self.registry.strategies.contains_key(&token) {
            self.registry.order.push(token.clone());
        }
        self.registry.strategies.insert(token, Arc::new(strategy));
        self
    }

    pub fn build(self) -> Registry {
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition(op: BuiltinOperator, operand: impl Into<Expression>) -> Condition {
        match op.instantiate("posts.x", &operand.into()).unwrap() {
            Predicate::Condition(c) => c,
            other => panic!("expected a condition, got {:?}", other),
        }
    }

    #[test]
    fn comparisons() {
        assert_eq!(
            condition(BuiltinOperator::Gte, 3).to_string(),
            "posts.x >= 3"
        );
        assert_eq!(
            condition(BuiltinOperator::Ne, "it's").to_string(),
            "posts.x != 'it''s'"
        );
        assert!(matches!(
            BuiltinOperator::Eq.instantiate("posts.x", &Expression::list([1, 2])),
            Err(FilterError::InvalidOperand { .. })
        ));
    }

    #[test]
    fn membership() {
        assert_eq!(
            condition(BuiltinOperator::In, vec![1, 2]).to_string(),
            "posts.x IN (1, 2)"
        );
        assert_eq!(
            condition(BuiltinOperator::NotIn, "a").to_string(),
            "posts.x NOT IN ('a')"
        );
    }

    #[test]
    fn ranges() {
        assert_eq!(
            condition(BuiltinOperator::Between, vec![1, 5]).to_string(),
            "posts.x BETWEEN 1 AND 5"
        );
        assert_eq!(
            condition(BuiltinOperator::NotBetween, vec![1, 5]).to_string(),
            "posts.x NOT BETWEEN 1 AND 5"
        );
        assert!(matches!(
            BuiltinOperator::Between.instantiate("posts.x", &Expression::list([1])),
            Err(FilterError::InvalidOperand { .. })
        ));
    }

    #[test]
    fn patterns() {
        assert_eq!(
            condition(BuiltinOperator::Like, "a%").to_string(),
            "posts.x LIKE 'a%'"
        );
        assert_eq!(
            condition(BuiltinOperator::Contains, "50%").to_string(),
            "posts.x LIKE '%50\\%%'"
        );
        assert_eq!(
            condition(BuiltinOperator::StartsWith, "ab").to_string(),
            "posts.x LIKE 'ab%'"
        );
        assert_eq!(
            condition(BuiltinOperator::EndsWith, "ab").to_string(),
            "posts.x LIKE '%ab'"
        );
        assert_eq!(
            condition(BuiltinOperator::NotContains, "ab").to_string(),
            "posts.x NOT LIKE '%ab%'"
        );
    }

    #[test]
    fn nulls() {
        assert_eq!(
            condition(BuiltinOperator::Null, true).to_string(),
            "posts.x IS NULL"
        );
        assert_eq!(
            condition(BuiltinOperator::Null, "false").to_string(),
            "posts.x IS NOT NULL"
        );
        assert_eq!(
            condition(BuiltinOperator::NotNull, true).to_string(),
            "posts.x IS NOT NULL"
        );
    }

    #[test]
    fn groups() {
        let branches = Expression::list([
            Expression::map().with("a", 1),
            Expression::map().with("b", 2),
        ]);
        match BuiltinOperator::Or.instantiate("", &branches).unwrap() {
            Predicate::Group {
                conjunction,
                branches,
            } => {
                assert_eq!(conjunction, Conjunction::Or);
                assert_eq!(branches.len(), 2);
            }
            other => panic!("expected a group, got {:?}", other),
        }
        assert!(BuiltinOperator::And
            .instantiate("", &Expression::list([1]))
            .is_err());
    }

    #[test]
    fn registry_order_and_lookup() {
        let r = Registry::default();
        assert_eq!(r.keys().first().map(String::as_str), Some("$eq"));
        assert_eq!(r.keys().len(), BuiltinOperator::iter().count());
        assert_eq!(r.resolve("$gt").map(|s| s.operator()), Some("$gt"));
        assert!(r.resolve("$regex").is_none());
        assert!(BuiltinOperator::is_logical("$or"));
        assert!(!BuiltinOperator::is_logical("$eq"));
    }

    #[test]
    fn registry_from_config() {
        let config = Config {
            operators: vec!["$eq".into(), "$or".into()],
            ..Config::default()
        };
        let r = Registry::from_config(&config).unwrap();
        assert_eq!(r.keys(), &["$eq".to_string(), "$or".to_string()]);

        let config = Config {
            operators: vec!["$regex".into()],
            ..Config::default()
        };
        assert!(matches!(
            Registry::from_config(&config),
            Err(FilterError::UnknownStrategy(t)) if t == "$regex"
        ));
    }

    struct Regex;

    impl Strategy for Regex {
        fn operator(&self) -> &str {
            "$regex"
        }
        fn instantiate(
            &self,
            column: &str,
            operand: &Expression,
        ) -> Result<Predicate, FilterError> {
            let pattern = operand
                .as_scalar()
                .and_then(Scalar::to_text)
                .ok_or_else(|| anyhow::anyhow!("bad regex operand"))?;
            Ok(Predicate::Condition(Condition::Like {
                column: column.to_string(),
                pattern,
                negated: false,
            }))
        }
    }

    #[test]
    fn custom_strategy() {
        let r = Registry::builder()
            .register(BuiltinOperator::Eq)
            .register(Regex)
            .build();
        assert_eq!(r.keys(), &["$eq".to_string(), "$regex".to_string()]);
        assert!(matches!(
            r.resolve("$regex")
                .unwrap()
                .instantiate("c", &Expression::list([1, 2])),
            Err(FilterError::Strategy(_))
        ));
    }
}
