//! Shard topology and coordinate resolution.

pub mod error;
pub mod expression;
pub mod rule;
pub mod template;
pub mod topology;

pub use error::Error;
pub use expression::{Expression, ShardValues};
pub use rule::RouteRule;
pub use template::NameTemplate;
pub use topology::{LogicDatabase, LogicTable, Topology};
