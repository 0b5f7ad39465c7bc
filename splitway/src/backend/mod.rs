//! Physical side: datasources, connections, read/write splitting and fan-out.

pub mod connection;
pub mod db_index;
pub mod error;
pub mod fanout;
pub mod ha;
pub mod request;
pub mod result;


pub use connection::{
    bind, Connection, ConnectionProvider, ConnectionSettings, Holdability, IsolationLevel,
    PhysicalConnection,
};
pub use db_index::DbIndex;
pub use error::Error;
pub use fanout::{Connections, FanOut};
pub use ha::{Classifier, ConnectionRouter, Hints};
pub use request::{ExecuteKind, Keys, Request};
pub use result::{Executed, MergedResult, Outcome, ResultCursor};
