//! Query router.

pub mod error;
pub mod parser;
pub mod route;
pub mod sharding;

pub use error::Error;
pub use parser::{Plan, QueryParser};
pub use route::{RouteSet, SqlRouteInfo};
pub use sharding::Topology;

use tracing::debug;

use super::HandlerContext;

/// Routes statements of sharded logical connections.
#[derive(Debug, Clone)]
pub struct ShardRouter {
    topology: Topology,
    default_database: Option<String>,
}

impl ShardRouter {
    /// Create new router.
    pub fn new(topology: Topology, default_database: Option<String>) -> Self {
        Self {
            topology,
            default_database,
        }
    }

    /// Route the statement in the context and record the
    /// targets and whether it only reads data.
    pub fn route(&self, context: &mut HandlerContext) -> Result<&RouteSet, Error> {
        let plan = QueryParser::new(&self.topology, &context.params)
            .default_database(self.default_database.as_deref())
            .all_shards(context.execution.all_shards)
            .parse(&context.sql)?;

        debug!(
            "{} routes [{}]",
            plan.routes.len(),
            if plan.read { "read" } else { "write" }
        );

        context.query = plan.read;
        context.routes = plan.routes;

        Ok(&context.routes)
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }
}
