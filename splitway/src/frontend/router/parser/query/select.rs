use super::*;
use crate::backend::ha::classifier::read_only;

impl QueryParser<'_> {
    /// Handle SELECT statement.
    pub(super) fn select(
        &self,
        stmt: &SelectStmt,
        ast: &ParseResult,
        query: &str,
    ) -> Result<Plan, Error> {
        let read = read_only(stmt);
        let tables = Table::walk(ast);

        let Some((logic, table)) = self.logical_table(&tables)? else {
            return self.passthrough(query, read);
        };

        let canonical = Self::canonical(ast)?;

        if self.all_shards {
            return Ok(Plan {
                routes: self.broadcast(&logic, &canonical)?,
                read,
            });
        }

        // Shard predicates live next to the table, which
        // can be inside a sub-select or a CTE.
        let scope = Self::scope(ast, logic.name()).unwrap_or(stmt);

        let routes = match WhereClause::new(&scope.where_clause) {
            Some(where_clause) => self.narrow(&logic, &table, &where_clause, &canonical)?,
            None => None,
        };

        let routes = match routes {
            Some(routes) => routes,
            // No shard predicate: scan every shard.
            None => self.broadcast(&logic, &canonical)?,
        };

        Ok(Plan { routes, read })
    }

    /// The SELECT that reads the table in its FROM clause.
    fn scope<'t>(ast: &'t ParseResult, name: &str) -> Option<&'t SelectStmt> {
        ast.protobuf
            .nodes()
            .into_iter()
            .find_map(|(node, ..)| match node {
                NodeRef::SelectStmt(select)
                    if Table::from_items(&select.from_clause)
                        .iter()
                        .any(|table| table.name == name) =>
                {
                    Some(select)
                }
                _ => None,
            })
    }
}
