//! Structured queries and their PostgreSQL rendering.
//!
//! Queries are described as data ([`SelectQuery`] holding a list of
//! [`Condition`]s) and only become SQL inside a [`Renderer`]. Values never
//! reach the SQL text: every operand is a bound parameter, and identifiers
//! are validated before being double-quoted.
//!
//! # Example
//!
//! ```ignore
//! use lca_finder::{FilterMap, OrderSpec, PgRenderer, Renderer, SelectQuery, Source};
//!
//! let query = SelectQuery::new(Source::new("processes")?)
//!     .filter(&FilterMap::new().with("category", "wood"))
//!     .order_by(OrderSpec::new().asc("name"))
//!     .limit(10);
//!
//! let statement = PgRenderer.render_select(&query)?;
//! // SELECT * FROM "processes" WHERE "category" = $1 ORDER BY "name" ASC LIMIT $2
//! ```

mod condition;
mod filter;
mod helpers;
mod keyword;
mod order;
mod render;
mod select;


pub use condition::Condition;
pub use filter::{FilterMap, FilterValue};
pub use helpers::{
    check_placeholders, placeholder_indices, quote_identifier, validate_identifier,
    validate_relation,
};
pub use keyword::KeywordSearch;
pub use order::{OrderDirection, OrderSpec, Pagination};
pub use render::{PgRenderer, Renderer, Statement};
pub use select::SelectQuery;
