//! Routing output: one rewritten statement per physical target.
use indexmap::{map::Entry, IndexMap};
use serde::{ser::SerializeSeq, Serialize, Serializer};

use crate::value::Value;

/// Statement rewritten for one physical database and table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlRouteInfo {
    /// Physical database (datasource name).
    pub database: String,
    /// Physical table, if the statement touches a sharded table.
    pub table: Option<String>,
    /// Rewritten statement.
    pub sql: String,
    /// Bound parameters, identical for every target.
    pub params: Vec<Value>,
}

impl SqlRouteInfo {
    pub fn key(&self) -> (String, Option<String>) {
        (self.database.clone(), self.table.clone())
    }
}

/// Targets of one statement, unique by (database, table),
/// in the order they were resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteSet {
    routes: IndexMap<(String, Option<String>), SqlRouteInfo>,
}

impl RouteSet {
    /// Add a target. A target already in the set is kept as is:
    /// the same (database, table) always gets the same statement.
    pub fn add(&mut self, route: SqlRouteInfo) -> bool {
        match self.routes.entry(route.key()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(route);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SqlRouteInfo> {
        self.routes.values()
    }

    pub fn get(&self, database: &str, table: Option<&str>) -> Option<&SqlRouteInfo> {
        self.routes
            .get(&(database.to_owned(), table.map(|t| t.to_owned())))
    }

    /// Physical databases, in route order, without duplicates.
    pub fn databases(&self) -> Vec<&str> {
        let mut databases: Vec<&str> = vec![];
        for route in self.iter() {
            if !databases.contains(&route.database.as_str()) {
                databases.push(&route.database);
            }
        }
        databases
    }
}

impl IntoIterator for RouteSet {
    type Item = SqlRouteInfo;
    type IntoIter = indexmap::map::IntoValues<(String, Option<String>), SqlRouteInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.routes.into_values()
    }
}

impl FromIterator<SqlRouteInfo> for RouteSet {
    fn from_iter<T: IntoIterator<Item = SqlRouteInfo>>(iter: T) -> Self {
        let mut routes = Self::default();
        for route in iter {
            routes.add(route);
        }
        routes
    }
}

impl Serialize for RouteSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for route in self.iter() {
            seq.serialize_element(route)?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn route(database: &str, table: &str, sql: &str) -> SqlRouteInfo {
        SqlRouteInfo {
            database: database.into(),
            table: Some(table.into()),
            sql: sql.into(),
            params: vec![],
        }
    }

    #[test]
    fn test_unique_targets() {
        let mut routes = RouteSet::default();
        assert!(routes.add(route("db_1", "t_1", "SELECT 1")));
        assert!(routes.add(route("db_0", "t_0", "SELECT 0")));
        assert!(!routes.add(route("db_1", "t_1", "SELECT 1")));
        assert!(routes.add(route("db_1", "t_3", "SELECT 3")));

        assert_eq!(routes.len(), 3);
        assert_eq!(routes.databases(), vec!["db_1", "db_0"]);
        assert_eq!(routes.get("db_0", Some("t_0")).unwrap().sql, "SELECT 0");

        let json = serde_json::to_value(&routes).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 3);
        assert_eq!(json[0]["database"], "db_1");
    }
}
