use super::*;

impl QueryParser<'_> {
    /// Handle INSERT statement.
    ///
    /// Every VALUES row is routed on its own. Rows going to the same
    /// physical table are sent in one statement.
    pub(super) fn insert(
        &self,
        stmt: &InsertStmt,
        ast: &ParseResult,
        query: &str,
    ) -> Result<Plan, Error> {
        let Some(table) = stmt.relation.as_ref().map(Table::from) else {
            return Err(Error::EmptyQuery);
        };
        let Some((logic, _)) = self.write_target(&[table], ast)? else {
            return self.passthrough(query, false);
        };
        self.check_write()?;

        let columns = stmt
            .cols
            .iter()
            .map(Column::try_from)
            .collect::<Result<Vec<_>, ()>>()
            .map_err(|_| Error::rewrite("unsupported INSERT column list"))?;
        if columns.is_empty() {
            return Err(Error::rewrite(format!(
                "INSERT into sharded table \"{}\" without a column list",
                logic.name()
            )));
        }

        let rows = match stmt.select_stmt.as_deref().and_then(|s| s.node.as_ref()) {
            Some(NodeEnum::SelectStmt(select))
                if !select.values_lists.is_empty() && select.from_clause.is_empty() =>
            {
                &select.values_lists
            }
            _ => return Err(Error::rewrite("INSERT ... SELECT into a sharded table")),
        };

        // Rows by target, in the order they appear.
        let mut targets: IndexMap<(String, String), Vec<protobuf::Node>> = IndexMap::new();

        for row in rows {
            let Some(NodeEnum::List(ref values)) = row.node else {
                return Err(Error::rewrite("unsupported VALUES row"));
            };
            if values.items.len() != columns.len() {
                return Err(Error::rewrite(format!(
                    "INSERT has {} columns but {} values",
                    columns.len(),
                    values.items.len()
                )));
            }

            let mut shard_values = ShardValues::new();
            for (column, item) in columns.iter().zip(values.items.iter()) {
                if !logic.is_shard_column(column.name) {
                    continue;
                }
                let value = match Key::from_node(item) {
                    Some(key) => key.value(self.params)?,
                    None => None,
                };
                if let Some(value) = value {
                    shard_values.insert(column.name.to_owned(), value);
                }
            }

            let coordinate = logic.coordinate(&shard_values)?;
            targets.entry(coordinate).or_default().push(row.clone());
        }

        let mut routes = RouteSet::default();

        if targets.len() == 1 {
            let canonical = Self::canonical(ast)?;
            self.emit(&mut routes, &logic, &canonical, targets.into_keys());
        } else {
            debug!("splitting INSERT into {} statements", targets.len());

            for (coordinate, rows) in targets {
                let canonical = Self::with_rows(ast, rows)?;
                self.emit(&mut routes, &logic, &canonical, [coordinate]);
            }
        }

        Ok(Plan {
            routes,
            read: false,
        })
    }

    /// Canonical INSERT text with only the given VALUES rows.
    fn with_rows(ast: &ParseResult, rows: Vec<protobuf::Node>) -> Result<String, Error> {
        let mut protobuf = ast.protobuf.clone();

        let select = protobuf
            .stmts
            .first_mut()
            .and_then(|stmt| stmt.stmt.as_mut())
            .and_then(|stmt| match stmt.node {
                Some(NodeEnum::InsertStmt(ref mut insert)) => insert.select_stmt.as_mut(),
                _ => None,
            })
            .and_then(|select| match select.node {
                Some(NodeEnum::SelectStmt(ref mut select)) => Some(select),
                _ => None,
            })
            .ok_or(Error::EmptyQuery)?;

        select.values_lists = rows;

        protobuf.deparse().map_err(Error::PgQuery)
    }
}
