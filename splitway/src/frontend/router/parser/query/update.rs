use super::*;

impl QueryParser<'_> {
    /// Handle UPDATE statement.
    pub(super) fn update(
        &self,
        stmt: &UpdateStmt,
        ast: &ParseResult,
        query: &str,
    ) -> Result<Plan, Error> {
        let Some(where_clause) = WhereClause::new(&stmt.where_clause) else {
            return Err(Error::rewrite("UPDATE without a WHERE clause"));
        };
        self.check_write()?;

        let mut tables = vec![];
        tables.extend(stmt.relation.as_ref().map(Table::from));
        tables.extend(Table::from_items(&stmt.from_clause));

        let Some((logic, table)) = self.write_target(&tables, ast)? else {
            return self.passthrough(query, false);
        };

        // Moving rows between shards isn't supported.
        for target in &stmt.target_list {
            if let Ok(column) = Column::try_from(target) {
                if logic.is_shard_column(column.name) {
                    return Err(Error::rewrite(format!(
                        "UPDATE of shard column \"{}\"",
                        column.name
                    )));
                }
            }
        }

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
