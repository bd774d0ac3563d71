#![cfg(feature = "mock")]
//! A recording [`QueryScope`] for tests.
//!
//! [`MockQuery`] keeps every call made on it, and renders the result
//! as an SQL-like string:
//!
//! ```rust
//! use filter_query::QueryScope;
//! use filter_query::filtering::ops::{Comparison, Condition};
//! use filter_query::mock::MockQuery;
//!
//! let mut query = MockQuery::new();
//! query.and_where(Condition::Compare {
//!     column: "posts.id".to_string(),
//!     op: Comparison::Gt,
//!     value: 3.into(),
//! });
//! query.and_group(|q| {
//!     q.or_group(|q| q.and_where(Condition::Null { column: "posts.title".to_string(), negated: false }));
//!     q.or_group(|q| q.where_has("comments", |q| q.and_where(Condition::Null {
//!         column: "comments.content".to_string(),
//!         negated: true,
//!     })));
//! });
//! assert_eq!(
//!     query.to_string(),
//!     "posts.id > 3 AND ((posts.title IS NULL) OR (EXISTS comments (comments.content IS NOT NULL)))"
//! );
//! ```

use std::fmt::{self, Display};

use log::trace;

use crate::filtering::ops::{Condition, Conjunction};
use crate::filtering::QueryScope;

/// One recorded call.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Where(Condition),
    Group(MockQuery),
    Exists(String, MockQuery),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MockQuery {
    nodes: Vec<(Conjunction, Node)>,
}

impl MockQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[(Conjunction, Node)] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every condition recorded, at any depth, in call order.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Condition>) {
        for (_, node) in &self.nodes {
            match node {
                Node::Where(c) => out.push(c),
                Node::Group(q) | Node::Exists(_, q) => q.collect(out),
            }
        }
    }

    /// The relations opened, at any depth, in call order.
    pub fn relations(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_relations(&mut out);
        out
    }

    fn collect_relations<'a>(&'a self, out: &mut Vec<&'a str>) {
        for (_, node) in &self.nodes {
            match node {
                Node::Where(_) => {}
                Node::Group(q) => q.collect_relations(out),
                Node::Exists(r, q) => {
                    out.push(r);
                    q.collect_relations(out);
                }
            }
        }
    }

    fn sub<F: FnOnce(&mut Self)>(build: F) -> Self {
        let mut q = MockQuery::new();
        build(&mut q);
        q
    }
}

impl QueryScope for MockQuery {
    fn and_where(&mut self, condition: Condition) {
        trace!("where {}", condition);
        self.nodes.push((Conjunction::And, Node::Where(condition)));
    }

    fn and_group<F: FnOnce(&mut Self)>(&mut self, build: F) {
        let q = Self::sub(build);
        self.nodes.push((Conjunction::And, Node::Group(q)));
    }

    fn or_group<F: FnOnce(&mut Self)>(&mut self, build: F) {
        let q = Self::sub(build);
        self.nodes.push((Conjunction::Or, Node::Group(q)));
    }

    fn where_has<F: FnOnce(&mut Self)>(&mut self, relation: &str, build: F) {
        trace!("exists {}", relation);
        let q = Self::sub(build);
        self.nodes
            .push((Conjunction::And, Node::Exists(relation.to_string(), q)));
    }
}

impl Display for MockQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (conjunction, node)) in self.nodes.iter().enumerate() {
            if i > 0 {
                write!(f, " {} ", conjunction.as_ref())?;
            }
            match node {
                Node::Where(c) => write!(f, "{}", c)?,
                Node::Group(q) => write!(f, "({})", q)?,
                Node::Exists(r, q) => write!(f, "EXISTS {} ({})", r, q)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filtering::ops::Comparison;

    fn eq(column: &str, value: i64) -> Condition {
        Condition::Compare {
            column: column.to_string(),
            op: Comparison::Eq,
            value: value.into(),
        }
    }

    #[test]
    fn empty() {
        let q = MockQuery::new();
        assert!(q.is_empty());
        assert_eq!(q.to_string(), "");
    }

    #[test]
    fn render() {
        let mut q = MockQuery::new();
        q.and_where(eq("a.x", 1));
        q.where_has("b", |q| {
            q.and_where(eq("b.y", 2));
            q.where_has("c", |q| q.and_where(eq("c.z", 3)));
        });
        q.and_group(|q| {
            q.or_group(|q| q.and_where(eq("a.x", 4)));
            q.or_group(|q| q.and_where(eq("a.x", 5)));
        });
        assert_eq!(
            q.to_string(),
            "a.x = 1 AND EXISTS b (b.y = 2 AND EXISTS c (c.z = 3)) AND ((a.x = 4) OR (a.x = 5))"
        );
        assert_eq!(q.relations(), vec!["b", "c"]);
        assert_eq!(q.conditions().len(), 5);
    }
}
