//! Per-call context passed down to the routers.
use crate::backend::{Hints, MergedResult};
use crate::frontend::router::RouteSet;
use crate::value::Value;

/// Routing instructions supplied by the caller for one execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    /// Datasources the statement may run on.
    pub hints: Hints,
    /// Send a SELECT to every shard of its table.
    pub all_shards: bool,
}

impl ExecutionContext {
    /// Restrict the statement to the named datasources.
    pub fn hinted<S: ToString>(datasources: impl IntoIterator<Item = S>) -> Self {
        Self {
            hints: Hints::new(datasources),
            ..Default::default()
        }
    }

    /// Broadcast the statement.
    pub fn broadcast() -> Self {
        Self {
            all_shards: true,
            ..Default::default()
        }
    }
}

/// Statement being routed by the sharding router.
#[derive(Debug, Clone, Default)]
pub struct HandlerContext {
    /// Logical statement.
    pub sql: String,
    /// Bound parameters.
    pub params: Vec<Value>,
    pub execution: ExecutionContext,
    /// Targets, filled in by the router.
    pub routes: RouteSet,
    /// Statement only reads data, filled in by the router.
    pub query: bool,
    /// Sum of the targets' update counts, filled in after execution.
    pub update_count: Option<u64>,
    /// Merged result, filled in after execution.
    pub result: Option<MergedResult>,
}

impl HandlerContext {
    pub fn new(sql: &str, params: &[Value], execution: &ExecutionContext) -> Self {
        Self {
            sql: sql.to_owned(),
            params: params.to_vec(),
            execution: execution.clone(),
            routes: RouteSet::default(),
            query: false,
            update_count: None,
            result: None,
        }
    }
}
