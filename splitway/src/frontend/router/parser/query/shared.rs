use super::*;

impl QueryParser<'_> {
    /// Find the single sharded table among the tables referenced by the statement.
    pub(super) fn logical_table<'t>(
        &self,
        tables: &[Table<'t>],
    ) -> Result<Option<(Arc<LogicTable>, Table<'t>)>, Error> {
        let mut found: Option<(Arc<LogicTable>, Table<'t>)> = None;

        for table in tables {
            let Some(logic) = self.topology.table(table.name) else {
                continue;
            };

            match found {
                None => found = Some((logic.clone(), *table)),
                Some((ref existing, _)) if existing.name() == logic.name() => {
                    return Err(Error::rewrite(format!(
                        "sharded table \"{}\" is referenced more than once",
                        logic.name()
                    )))
                }
                Some((ref existing, _)) => {
                    return Err(Error::rewrite(format!(
                        "statement references more than one sharded table: \"{}\", \"{}\"",
                        existing.name(),
                        logic.name()
                    )))
                }
            }
        }

        Ok(found)
    }

    /// Sharded table a write statement targets. A sharded table that
    /// the write only reads from a sub-select can't be routed with it.
    pub(super) fn write_target<'t>(
        &self,
        direct: &[Table<'_>],
        ast: &'t ParseResult,
    ) -> Result<Option<(Arc<LogicTable>, Table<'t>)>, Error> {
        match self.logical_table(&Table::walk(ast))? {
            Some((logic, _)) if !direct.iter().any(|table| table.name == logic.name()) => {
                Err(Error::rewrite(format!(
                    "sharded table \"{}\" is only referenced in a subquery",
                    logic.name()
                )))
            }
            found => Ok(found),
        }
    }

    /// Shard column value maps from the WHERE clause: the cross product
    /// of every shard column's candidate values. Empty if the clause
    /// doesn't narrow down the shards.
    pub(super) fn shard_values(
        &self,
        logic: &LogicTable,
        table: &Table<'_>,
        where_clause: &WhereClause<'_>,
    ) -> Result<Vec<ShardValues>, Error> {
        let mut candidates: IndexMap<String, Vec<Value>> = IndexMap::new();

        for predicate in where_clause.predicates() {
            let column = &predicate.column;
            if !column.belongs_to(table) || !logic.is_shard_column(column.name) {
                continue;
            }
            // First comparison on a column wins.
            if candidates.contains_key(column.name) {
                continue;
            }

            let mut values = vec![];
            for key in &predicate.keys {
                if let Some(value) = key.value(self.params)? {
                    if !values.contains(&value) {
                        values.push(value);
                    }
                }
            }

            if !values.is_empty() {
                trace!("shard column {} => {:?}", column, values);
                candidates.insert(column.name.to_owned(), values);
            }
        }

        if candidates.is_empty() {
            return Ok(vec![]);
        }

        let mut maps = vec![ShardValues::new()];
        for (column, values) in candidates {
            let mut product = Vec::with_capacity(maps.len() * values.len());
            for map in &maps {
                for value in &values {
                    let mut map = map.clone();
                    map.insert(column.clone(), value.clone());
                    product.push(map);
                }
            }
            maps = product;
        }

        Ok(maps)
    }

    /// Add one rewritten statement per coordinate.
    pub(super) fn emit(
        &self,
        routes: &mut RouteSet,
        logic: &LogicTable,
        canonical: &str,
        coordinates: impl IntoIterator<Item = (String, String)>,
    ) {
        for (database, table) in coordinates {
            let sql = rename_table(canonical, logic.name(), &table);
            trace!("[{}] {}", database, sql);
            routes.add(SqlRouteInfo {
                database,
                table: Some(table),
                sql,
                params: self.params.to_vec(),
            });
        }
    }

    /// Every physical table of a logical table.
    pub(super) fn broadcast(&self, logic: &LogicTable, canonical: &str) -> Result<RouteSet, Error> {
        let coordinates = logic.all_coordinates();
        if coordinates.is_empty() {
            return Err(Error::rewrite(format!(
                "sharded table \"{}\" has no physical tables to broadcast to",
                logic.name()
            )));
        }

        debug!(
            "broadcasting to {} tables of \"{}\"",
            coordinates.len(),
            logic.name()
        );

        let mut routes = RouteSet::default();
        self.emit(&mut routes, logic, canonical, coordinates);
        Ok(routes)
    }

    /// Resolve shard values to targets. No values means there
    /// is nothing to route a write with.
    pub(super) fn narrow(
        &self,
        logic: &LogicTable,
        table: &Table<'_>,
        where_clause: &WhereClause<'_>,
        canonical: &str,
    ) -> Result<Option<RouteSet>, Error> {
        let maps = self.shard_values(logic, table, where_clause)?;
        if maps.is_empty() {
            return Ok(None);
        }

        let coordinates = maps
            .iter()
            .map(|values| logic.coordinate(values))
            .collect::<Result<Vec<_>, _>>()?;

        let mut routes = RouteSet::default();
        self.emit(&mut routes, logic, canonical, coordinates);
        Ok(Some(routes))
    }

    /// Write without a usable shard predicate.
    pub(super) fn no_route(logic: &LogicTable, where_clause: &WhereClause<'_>) -> Error {
        let columns = where_clause
            .predicates()
            .iter()
            .map(|p| p.column.name.to_owned())
            .collect::<BTreeSet<_>>();

        sharding::Error::NoRouteRule {
            table: logic.name().to_owned(),
            columns: columns.into_iter().collect(),
        }
        .into()
    }

    /// Writes can't be broadcast.
    pub(super) fn check_write(&self) -> Result<(), Error> {
        if self.all_shards {
            Err(Error::rewrite(
                "sending to all shards is only allowed for SELECT",
            ))
        } else {
            Ok(())
        }
    }

    /// Statement that doesn't touch a sharded table.
    pub(super) fn passthrough(&self, query: &str, read: bool) -> Result<Plan, Error> {
        let database = self.default_database.ok_or_else(|| {
            Error::rewrite("statement doesn't reference a sharded table and no default database is configured")
        })?;

        debug!("passthrough to \"{}\"", database);

        let mut routes = RouteSet::default();
        routes.add(SqlRouteInfo {
            database: database.to_owned(),
            table: None,
            sql: query.to_owned(),
            params: self.params.to_vec(),
        });

        Ok(Plan { routes, read })
    }

    /// Canonical statement text.
    pub(super) fn canonical(ast: &ParseResult) -> Result<String, Error> {
        ast.deparse().map_err(Error::PgQuery)
    }
}
