//! Logical side: connections and statements the application uses,
//! and the routers deciding where their statements go.

pub mod context;
pub mod error;
pub mod ha_connection;
pub mod logical_session;
pub mod router;
pub mod sharding_connection;

pub use context::{ExecutionContext, HandlerContext};
pub use error::Error;
pub use ha_connection::HaConnection;
pub use logical_session::{Canceller, LogicalConnection, LogicalSession, Statement, StatementRegistry};
pub use sharding_connection::ShardingConnection;
