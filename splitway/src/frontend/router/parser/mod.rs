//! Query parser.

pub mod cache;
pub mod column;
pub mod key;
pub mod placeholders;
pub mod query;
pub mod rewrite;
pub mod table;
pub mod where_clause;

pub use super::Error;
pub use cache::Cache;
pub use column::Column;
pub use key::Key;
pub use query::{Plan, QueryParser};
pub use table::Table;
pub use where_clause::{Predicate, WhereClause};
