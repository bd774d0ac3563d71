//! The call-local state of one resolution.

use std::mem;
use std::sync::Arc;

use crate::filtering::{Clause, FilterError};
use crate::policy::ModelPolicy;

/// Tracks which model a resolution is currently looking at.
///
/// Following a relation pushes the current model and table onto a
/// stack and records the relation as pending; leaving it pops them
/// again. Pending relations become nested existential scopes when the
/// constraints found beneath them are flushed.
///
/// A context belongs to exactly one resolution call and is never
/// shared.
#[derive(Debug)]
pub struct Context {
    policy: Arc<ModelPolicy>,
    table: String,
    pending: Vec<String>,
    previous: Vec<(Arc<ModelPolicy>, String)>,
}

impl Context {
    pub fn new(policy: Arc<ModelPolicy>) -> Self {
        let table = policy.table().to_string();
        Self {
            policy,
            table,
            pending: Vec::new(),
            previous: Vec::new(),
        }
    }

    pub fn policy(&self) -> &ModelPolicy {
        &self.policy
    }

    pub fn shared_policy(&self) -> Arc<ModelPolicy> {
        self.policy.clone()
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// How many relations are currently entered.
    pub fn depth(&self) -> usize {
        self.pending.len()
    }

    /// The pending relation names, outermost first.
    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    /// Follow exposed relation `relation` of the current model.
    pub fn enter(&mut self, relation: &str) -> Result<(), FilterError> {
        let related = self
            .policy
            .related_policy(relation)
            .ok_or_else(|| FilterError::FieldNotSupported {
                key: relation.to_string(),
                model: self.policy.model().to_string(),
                available: self.policy.available(),
            })?;
        let name = self.policy.real_relation(relation).to_string();
        let table = related.table().to_string();
        let policy = mem::replace(&mut self.policy, related);
        let table = mem::replace(&mut self.table, table);
        self.previous.push((policy, table));
        self.pending.push(name);
        Ok(())
    }

    /// Return to the model the innermost relation was entered from.
    pub fn leave(&mut self) {
        if let Some((policy, table)) = self.previous.pop() {
            self.policy = policy;
            self.table = table;
        }
        self.pending.pop();
    }

    /// Leave relations until only `depth` remain entered.
    pub fn unwind(&mut self, depth: usize) {
        while self.depth() > depth {
            self.leave();
        }
    }

    /// Wrap `clauses` in one existential scope per relation entered
    /// since `depth`, innermost first.
    ///
    /// Nothing is wrapped around an empty set of clauses, so a
    /// relation that produced no constraints opens no scope.
    pub fn flush(&self, depth: usize, clauses: Vec<Clause>) -> Vec<Clause> {
        if clauses.is_empty() {
            return clauses;
        }
        self.pending[depth..]
            .iter()
            .rev()
            .fold(clauses, |inner, relation| {
                vec![Clause::Exists {
                    relation: relation.clone(),
                    clauses: inner,
                }]
            })
    }

    /// The qualified column behind exposed field `field` of the
    /// current model.
    pub fn column(&self, field: &str) -> String {
        let column = self.policy.real_column(field);
        if self.table.is_empty() {
            column.to_string()
        } else {
            format!("{}.{}", self.table, column)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filtering::ops::{Comparison, Condition};

    fn policies() -> Arc<ModelPolicy> {
        let user = Arc::new(ModelPolicy::builder("User", "users").field("name").build());
        let comment = Arc::new(
            ModelPolicy::builder("Comment", "comments")
                .renamed_field("body", "content")
                .relation_policy("author", user)
                .build(),
        );
        Arc::new(
            ModelPolicy::builder("Post", "posts")
                .field("title")
                .relation_policy("comments", comment)
                .build(),
        )
    }

    #[test]
    fn enter_and_leave() {
        let mut ctx = Context::new(policies());
        assert_eq!(ctx.column("title"), "posts.title");

        ctx.enter("comments").unwrap();
        assert_eq!(ctx.policy().model(), "Comment");
        assert_eq!(ctx.column("body"), "comments.content");

        ctx.enter("author").unwrap();
        assert_eq!(ctx.table(), "users");
        assert_eq!(ctx.pending(), &["comments".to_string(), "author".to_string()]);

        ctx.unwind(0);
        assert_eq!(ctx.policy().model(), "Post");
        assert_eq!(ctx.table(), "posts");
        assert!(ctx.pending().is_empty());
    }

    #[test]
    fn enter_unknown() {
        let mut ctx = Context::new(policies());
        assert!(matches!(
            ctx.enter("tags"),
            Err(FilterError::FieldNotSupported { key, model, .. }) if key == "tags" && model == "Post"
        ));
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn flush_wraps_innermost_first() {
        let mut ctx = Context::new(policies());
        ctx.enter("comments").unwrap();
        let depth = ctx.depth();
        ctx.enter("author").unwrap();

        let cond = Clause::Condition(Condition::Compare {
            column: ctx.column("name"),
            op: Comparison::Eq,
            value: "x".into(),
        });
        let flushed = ctx.flush(0, vec![cond.clone()]);
        assert_eq!(
            flushed,
            vec![Clause::Exists {
                relation: "comments".to_string(),
                clauses: vec![Clause::Exists {
                    relation: "author".to_string(),
                    clauses: vec![cond.clone()],
                }],
            }]
        );

        let partial = ctx.flush(depth, vec![cond.clone()]);
        assert_eq!(
            partial,
            vec![Clause::Exists {
                relation: "author".to_string(),
                clauses: vec![cond],
            }]
        );

        assert!(ctx.flush(0, Vec::new()).is_empty());
    }
}
