//! Logical databases and tables and the physical names they resolve to.
use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use super::{rule, Error, NameTemplate, RouteRule, ShardValues};

/// Logical database split across physical databases.
#[derive(Debug, Clone)]
pub struct LogicDatabase {
    name: String,
    template: NameTemplate,
    rules: Vec<RouteRule>,
}

impl LogicDatabase {
    pub fn new(name: &str, format: &str, rules: Vec<RouteRule>) -> Result<Self, Error> {
        Ok(Self {
            name: name.to_owned(),
            template: NameTemplate::new(format)?,
            rules,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Physical database name encoded with the naming template.
    pub fn format(&self, index: i64) -> Result<String, Error> {
        self.template.format(index)
    }

    /// Inverse of [`LogicDatabase::format`].
    pub fn parse_index(&self, physical: &str) -> Result<i64, Error> {
        self.template.parse_index(physical)
    }
}

/// Logical table split across physical databases and tables.
#[derive(Debug, Clone)]
pub struct LogicTable {
    name: String,
    database: Arc<LogicDatabase>,
    template: Option<NameTemplate>,
    table_rules: Vec<RouteRule>,
    database_rules: Option<Vec<RouteRule>>,
    physical: IndexMap<String, Vec<String>>,
}

impl LogicTable {
    /// Create a logical table. Tables without a naming template
    /// keep their name in every physical database.
    pub fn new(
        name: &str,
        database: Arc<LogicDatabase>,
        format: Option<&str>,
        table_rules: Vec<RouteRule>,
    ) -> Result<Self, Error> {
        let template = format.map(NameTemplate::new).transpose()?;

        if template.is_some() != !table_rules.is_empty() {
            return Err(Error::invalid_rule(
                name,
                "table naming template and table rules must be configured together",
            ));
        }

        Ok(Self {
            name: name.to_lowercase(),
            database,
            template,
            table_rules,
            database_rules: None,
            physical: IndexMap::new(),
        })
    }

    /// Override the logical database's rules for this table.
    pub fn with_database_rules(mut self, rules: Vec<RouteRule>) -> Self {
        self.database_rules = Some(rules);
        self
    }

    /// Static map of physical database to physical tables,
    /// used to reach every shard.
    pub fn with_physical(mut self, physical: IndexMap<String, Vec<String>>) -> Self {
        self.physical = physical;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> &LogicDatabase {
        &self.database
    }

    fn database_rules(&self) -> &[RouteRule] {
        self.database_rules
            .as_deref()
            .unwrap_or_else(|| self.database.rules())
    }

    fn no_rule(&self, values: &ShardValues) -> Error {
        Error::NoRouteRule {
            table: self.name.clone(),
            columns: values.keys().cloned().collect(),
        }
    }

    /// Physical database holding the rows matching the values.
    pub fn resolve_database(&self, values: &ShardValues) -> Result<String, Error> {
        let rule =
            rule::select(self.database_rules(), values).ok_or_else(|| self.no_rule(values))?;
        let index = rule.evaluate(values)?;
        let database = self.database.format(index)?;

        trace!(
            "{}: database rule \"{}\" => {} [{}]",
            self.name,
            rule.text(),
            database,
            index
        );

        Ok(database)
    }

    /// Physical table holding the rows matching the values.
    pub fn resolve_table(&self, values: &ShardValues) -> Result<String, Error> {
        let template = match self.template {
            Some(ref template) => template,
            None => return Ok(self.name.clone()),
        };

        let rule = rule::select(&self.table_rules, values).ok_or_else(|| self.no_rule(values))?;
        let index = rule.evaluate(values)?;
        let table = template.format(index)?;

        trace!(
            "{}: table rule \"{}\" => {} [{}]",
            self.name,
            rule.text(),
            table,
            index
        );

        Ok(table)
    }

    /// Physical (database, table) pair for the values.
    pub fn coordinate(&self, values: &ShardValues) -> Result<(String, String), Error> {
        Ok((self.resolve_database(values)?, self.resolve_table(values)?))
    }

    /// Column is used by any database or table rule.
    pub fn is_shard_column(&self, column: &str) -> bool {
        self.database_rules()
            .iter()
            .chain(self.table_rules.iter())
            .any(|rule| rule.uses(column))
    }

    /// Shard index of a physical table name.
    pub fn parse_index(&self, physical: &str) -> Result<i64, Error> {
        match self.template {
            Some(ref template) => template.parse_index(physical),
            None => Err(Error::InvalidName {
                name: physical.to_owned(),
                template: self.name.clone(),
            }),
        }
    }

    /// Every physical (database, table) pair from the static map.
    pub fn all_coordinates(&self) -> Vec<(String, String)> {
        self.physical
            .iter()
            .flat_map(|(database, tables)| {
                tables
                    .iter()
                    .map(move |table| (database.clone(), table.clone()))
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, Arc<LogicTable>>,
}

/// All logical tables, by name.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    inner: Arc<Inner>,
}

impl Topology {
    pub fn new(tables: impl IntoIterator<Item = LogicTable>) -> Self {
        let tables = tables
            .into_iter()
            .map(|table| (table.name.clone(), Arc::new(table)))
            .collect();

        Self {
            inner: Arc::new(Inner { tables }),
        }
    }

    /// Find a logical table.
    pub fn table(&self, name: &str) -> Option<&Arc<LogicTable>> {
        self.inner.tables.get(&name.to_lowercase())
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<LogicTable>> {
        self.inner.tables.values()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tables.is_empty()
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::value::Value;

    /// Two databases (`user_db_0`, `user_db_1`) with two tables each.
    pub fn users() -> LogicTable {
        let database = LogicDatabase::new(
            "user_db",
            "user_db_{}",
            vec![RouteRule::new("${user_id} % 2").unwrap()],
        )
        .unwrap();

        let mut physical = IndexMap::new();
        physical.insert(
            "user_db_0".to_string(),
            vec!["users_0".to_string(), "users_2".to_string()],
        );
        physical.insert(
            "user_db_1".to_string(),
            vec!["users_1".to_string(), "users_3".to_string()],
        );

        LogicTable::new(
            "users",
            Arc::new(database),
            Some("users_{}"),
            vec![RouteRule::new("${user_id} % 4").unwrap()],
        )
        .unwrap()
        .with_physical(physical)
    }

    fn values(user_id: i64) -> ShardValues {
        let mut values = ShardValues::new();
        values.insert("user_id".into(), Value::Integer(user_id));
        values
    }

    #[test]
    fn test_resolve() {
        let table = users();
        assert_eq!(table.resolve_database(&values(7)).unwrap(), "user_db_1");
        assert_eq!(table.resolve_table(&values(7)).unwrap(), "users_3");
        assert_eq!(
            table.coordinate(&values(6)).unwrap(),
            ("user_db_0".to_string(), "users_2".to_string())
        );
        // Same input, same coordinate.
        assert_eq!(
            table.coordinate(&values(6)).unwrap(),
            table.coordinate(&values(6)).unwrap()
        );
    }

    #[test]
    fn test_missing_column() {
        let table = users();
        let mut values = ShardValues::new();
        values.insert("name".into(), Value::from("bob"));

        let err = table.resolve_database(&values).unwrap_err();
        assert_eq!(
            err,
            Error::NoRouteRule {
                table: "users".into(),
                columns: vec!["name".into()],
            }
        );
        assert!(matches!(
            table.resolve_table(&values),
            Err(Error::NoRouteRule { .. })
        ));
    }

    #[test]
    fn test_shard_columns_and_index() {
        let table = users().with_database_rules(vec![RouteRule::new("${tenant} % 2").unwrap()]);
        assert!(table.is_shard_column("user_id"));
        assert!(table.is_shard_column("tenant"));
        assert!(!table.is_shard_column("email"));

        assert_eq!(table.parse_index("users_3").unwrap(), 3);
        assert_eq!(table.database().parse_index("user_db_1").unwrap(), 1);
        assert!(table.parse_index("orders_3").is_err());
    }

    #[test]
    fn test_all_coordinates() {
        let table = users();
        assert_eq!(
            table.all_coordinates(),
            vec![
                ("user_db_0".to_string(), "users_0".to_string()),
                ("user_db_0".to_string(), "users_2".to_string()),
                ("user_db_1".to_string(), "users_1".to_string()),
                ("user_db_1".to_string(), "users_3".to_string()),
            ]
        );
    }

    #[test]
    fn test_unsplit_table() {
        let table = users();
        let table = LogicTable::new("profiles", Arc::new(table.database().clone()), None, vec![])
            .unwrap();
        assert_eq!(table.resolve_table(&values(3)).unwrap(), "profiles");
        assert_eq!(table.resolve_database(&values(3)).unwrap(), "user_db_1");

        let topology = Topology::new([table]);
        assert!(topology.table("PROFILES").is_some());
        assert!(topology.table("users").is_none());
    }
}
