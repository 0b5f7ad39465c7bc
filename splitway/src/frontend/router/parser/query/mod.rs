//! Route statements of a sharded logical connection.
use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;
use pg_query::{
    protobuf::{self, InsertStmt, SelectStmt, UpdateStmt},
    NodeEnum, NodeRef, ParseResult,
};
use tracing::{debug, trace};

use super::{
    placeholders, rewrite::rename_table, Cache, Column, Error, Key, Table, WhereClause,
};
use crate::frontend::router::{
    sharding::{self, LogicTable, ShardValues, Topology},
    RouteSet, SqlRouteInfo,
};
use crate::value::Value;

mod delete;
mod insert;
mod select;
mod shared;
mod update;

/// Routing decision for one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    /// Rewritten statements, one per physical target.
    pub routes: RouteSet,
    /// Statement only reads data.
    pub read: bool,
}

/// Query parser.
///
/// It's re-created for each statement we route. It holds the external
/// context for the duration of the parsing.
#[derive(Debug)]
pub struct QueryParser<'a> {
    topology: &'a Topology,
    params: &'a [Value],
    default_database: Option<&'a str>,
    all_shards: bool,
}

impl<'a> QueryParser<'a> {
    pub fn new(topology: &'a Topology, params: &'a [Value]) -> Self {
        Self {
            topology,
            params,
            default_database: None,
            all_shards: false,
        }
    }

    /// Physical database for statements that don't touch sharded tables.
    pub fn default_database(mut self, database: Option<&'a str>) -> Self {
        self.default_database = database;
        self
    }

    /// Send the statement to every shard.
    pub fn all_shards(mut self, all_shards: bool) -> Self {
        self.all_shards = all_shards;
        self
    }

    /// Route a statement.
    pub fn parse(&self, query: &str) -> Result<Plan, Error> {
        let converted = placeholders::convert(query)?;
        let statement = Cache::get()
            .parse(&converted.query)
            .map_err(Error::PgQuery)?;

        debug!("{}", converted.query);
        trace!("{:#?}", statement.ast());

        let ast = statement.ast();
        let root = match ast.protobuf.stmts.len() {
            0 => return Err(Error::EmptyQuery),
            1 => ast.protobuf.stmts[0]
                .stmt
                .as_ref()
                .ok_or(Error::EmptyQuery)?,
            // Scripts go to the default database as written.
            _ => {
                debug!("{} statements in one query", ast.protobuf.stmts.len());
                return self.passthrough(&converted.query, false);
            }
        };

        let plan = match root.node {
            Some(NodeEnum::SelectStmt(ref stmt)) => self.select(stmt, ast, &converted.query),
            Some(NodeEnum::InsertStmt(ref stmt)) => self.insert(stmt, ast, &converted.query),
            Some(NodeEnum::UpdateStmt(ref stmt)) => self.update(stmt, ast, &converted.query),
            Some(NodeEnum::DeleteStmt(ref stmt)) => self.delete(stmt, ast, &converted.query),
            // CALL, DDL and everything else is never split.
            _ => self.passthrough(&converted.query, false),
        }?;

        debug!(
            "query router decision: {} target(s), {}",
            plan.routes.len(),
            if plan.read { "read" } else { "write" }
        );

        statement.update_stats(&plan.routes);

        Ok(plan)
    }
}

#[cfg(test)]
mod test;
