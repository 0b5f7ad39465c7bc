use super::*;

impl QueryParser<'_> {
    /// Handle DELETE statement.
    pub(super) fn delete(
        &self,
        stmt: &protobuf::DeleteStmt,
        ast: &ParseResult,
        query: &str,
    ) -> Result<Plan, Error> {
        let Some(where_clause) = WhereClause::new(&stmt.where_clause) else {
            return Err(Error::rewrite("DELETE without a WHERE clause"));
        };
        self.check_write()?;

        let mut tables = vec![];
        tables.extend(stmt.relation.as_ref().map(Table::from));
        tables.extend(Table::from_items(&stmt.using_clause));

        let Some((logic, table)) = self.write_target(&tables, ast)? else {
            return self.passthrough(query, false);
        };

        let canonical = Self::canonical(ast)?;
        let routes = self
            .narrow(&logic, &table, &where_clause, &canonical)?
            .ok_or_else(|| Self::no_route(&logic, &where_clause))?;

        Ok(Plan {
            routes,
            read: false,
        })
    }
}
