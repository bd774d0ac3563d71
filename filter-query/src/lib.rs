//! # Resolve untrusted filter expressions into query constraints
//!
//! This crate takes nested filter expressions, typically decoded from
//! a query string or a JSON body, and turns them into constraints on a
//! query, checking each step against a whitelist published by the
//! model being filtered.
//!
//! ```rust
//! use filter_query::{Expression, Filterable, FilterSet};
//! use filter_query::mock::MockQuery;
//! use filter_query::params::from_query_pairs;
//!
//! #[derive(Filterable)]
//! #[filter(table = "users")]
//! struct User {
//!     name: String,
//! }
//!
//! #[derive(Filterable)]
//! #[filter(table = "posts", restrict = "rating:$gte,$lte")]
//! struct Post {
//!     title: String,
//!     rating: i32,
//!     #[filter(relation)]
//!     author: User,
//! }
//!
//! let filters = from_query_pairs(
//!     "filters",
//!     [
//!         ("filters[rating][$gte]", "3"),
//!         ("filters[author.name][$startsWith]", "Al"),
//!     ],
//! )
//! .unwrap();
//!
//! let mut query = MockQuery::new();
//! FilterSet::<Post>::new().apply(&mut query, &filters).unwrap();
//! assert_eq!(
//!     query.to_string(),
//!     "posts.rating >= '3' AND EXISTS author (users.name LIKE 'Al%')"
//! );
//! ```
//!
//! The main pieces are:
//!
//! - [`Expression`], the nested filter input.
//! - [`ModelPolicy`], the whitelist for one model, usually produced by
//!   deriving [`Filterable`].
//! - [`Registry`](filtering::ops::Registry), the operator strategies
//!   available, built from a [`Config`].
//! - [`FilterSet`] and [`Resolver`], which resolve an expression into
//!   a [`Plan`] and apply it to a [`QueryScope`].
//!
//! With the `mock` feature, which is on by default,
//! [`MockQuery`](mock::MockQuery) provides a [`QueryScope`] that
//! records what it was given, for tests.

pub mod expression;
pub mod filtering;
pub mod params;
pub mod policy;

pub mod mock;

pub use crate::expression::{Expression, Scalar};
pub use crate::filtering::{Config, FilterError, FilterSet, Plan, QueryScope, Resolver};
pub use crate::policy::{Filterable, ModelPolicy, Restriction};
pub use filter_query_derive::Filterable;
