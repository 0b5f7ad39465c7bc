//! Configuration.

pub mod error;

use std::collections::HashSet;
use std::fmt::Display;
use std::fs::read_to_string;
use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::info;

pub use error::Error;

use crate::frontend::router::sharding::{
    LogicDatabase, LogicTable, NameTemplate, RouteRule, Topology,
};

static CONFIG: Lazy<ArcSwap<Config>> = Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// Load configuration from disk, validate it and make it current.
pub fn load(path: &Path) -> Result<Arc<Config>, Error> {
    let config = Config::load(path)?;
    set(config)
}

/// Parse configuration from TOML text.
pub fn from_str(text: &str) -> Result<Config, Error> {
    let config: Config = toml::from_str(text)?;
    config.check()?;
    Ok(config)
}

/// Current configuration.
pub fn config() -> Arc<Config> {
    CONFIG.load().clone()
}

/// Replace current configuration.
pub fn set(config: Config) -> Result<Arc<Config>, Error> {
    config.check()?;
    let config = Arc::new(config);
    CONFIG.store(config.clone());
    Ok(config)
}

/// Configuration file, e.g. `splitway.toml`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub datasources: Vec<Datasource>,
    #[serde(default)]
    pub databases: Vec<Database>,
    #[serde(default)]
    pub tables: Vec<Table>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = read_to_string(path)?;
        let config = from_str(&text)?;
        info!("loaded \"{}\"", path.display());
        Ok(config)
    }

    /// Validate settings that serde can't check.
    pub fn check(&self) -> Result<(), Error> {
        let mut names = HashSet::new();
        for datasource in &self.datasources {
            if !names.insert(datasource.name.as_str()) {
                return Err(Error::invalid(format!(
                    "datasource \"{}\" is configured more than once",
                    datasource.name
                )));
            }
        }

        if !self.datasources.is_empty() && !self.datasources.iter().any(|d| d.role == Role::Write)
        {
            return Err(Error::invalid("at least one write datasource is required"));
        }

        if let Some(ref database) = self.general.default_database {
            if !names.contains(database.as_str()) {
                return Err(Error::invalid(format!(
                    "default database \"{}\" is not a datasource",
                    database
                )));
            }
        }

        // Physical database names must be datasources.
        let mut templates = IndexMap::new();
        for database in &self.databases {
            let template = NameTemplate::new(&database.format)?;
            if !names.is_empty() && !names.iter().any(|name| template.parse_index(name).is_ok()) {
                return Err(Error::invalid(format!(
                    "database \"{}\" format \"{}\" matches no datasource",
                    database.name, database.format
                )));
            }
            templates.insert(database.name.as_str(), template);
        }

        for table in &self.tables {
            let Some(template) = templates.get(table.database.as_str()) else {
                return Err(Error::invalid(format!(
                    "table \"{}\" references unknown database \"{}\"",
                    table.name, table.database
                )));
            };

            for database in table.physical.keys() {
                if !names.contains(database.as_str()) {
                    return Err(Error::invalid(format!(
                        "table \"{}\" maps to unknown datasource \"{}\"",
                        table.name, database
                    )));
                }
                if template.parse_index(database).is_err() {
                    return Err(Error::invalid(format!(
                        "table \"{}\" maps to \"{}\", which doesn't match \"{}\"",
                        table.name, database, table.database
                    )));
                }
            }
        }

        Ok(())
    }

    /// Build logical databases and tables.
    pub fn topology(&self) -> Result<Topology, Error> {
        let mut databases = IndexMap::new();
        for database in &self.databases {
            let rules = Rule::compile_all(&database.rules)?;
            let logic = LogicDatabase::new(&database.name, &database.format, rules)?;
            databases.insert(database.name.as_str(), Arc::new(logic));
        }

        let mut tables = vec![];
        for table in &self.tables {
            let database = databases
                .get(table.database.as_str())
                .cloned()
                .ok_or_else(|| Error::invalid(format!("unknown database \"{}\"", table.database)))?;

            let mut logic = LogicTable::new(
                &table.name,
                database.clone(),
                table.format.as_deref(),
                Rule::compile_all(&table.table_rules)?,
            )?
            .with_physical(table.physical.clone());

            if let Some(ref rules) = table.database_rules {
                logic = logic.with_database_rules(Rule::compile_all(rules)?);
            }

            let no_rules = match table.database_rules {
                Some(ref rules) => rules.is_empty(),
                None => database.rules().is_empty(),
            };
            if no_rules {
                return Err(Error::invalid(format!(
                    "table \"{}\" has no database rules",
                    table.name
                )));
            }

            tables.push(logic);
        }

        Ok(Topology::new(tables))
    }

    /// Datasources with the role.
    pub fn datasources(&self, role: Role) -> impl Iterator<Item = &Datasource> {
        self.datasources.iter().filter(move |d| d.role == role)
    }
}

/// General settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct General {
    /// How many times a failed read is retried on another read datasource.
    #[serde(default = "General::read_retries")]
    pub read_retries: usize,
    /// How statements sent to multiple databases are executed.
    #[serde(default)]
    pub fanout: Fanout,
    /// How read datasources are picked.
    #[serde(default)]
    pub load_balancing_strategy: LoadBalancingStrategy,
    /// Read/write classifier cache capacity.
    #[serde(default = "General::cache_size")]
    pub classifier_cache_size: usize,
    /// AST cache capacity.
    #[serde(default = "General::cache_size")]
    pub ast_cache_size: usize,
    /// Physical database for statements that don't touch sharded tables.
    #[serde(default)]
    pub default_database: Option<String>,
}

impl General {
    fn read_retries() -> usize {
        2
    }

    fn cache_size() -> usize {
        1024
    }
}

impl Default for General {
    fn default() -> Self {
        Self {
            read_retries: Self::read_retries(),
            fanout: Fanout::default(),
            load_balancing_strategy: LoadBalancingStrategy::default(),
            classifier_cache_size: Self::cache_size(),
            ast_cache_size: Self::cache_size(),
            default_database: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Fanout {
    #[default]
    Parallel,
    Sequential,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    #[default]
    Random,
    RoundRobin,
}

/// Datasource role.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Read,
    #[default]
    Write,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// Physical datasource.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Datasource {
    pub name: String,
    #[serde(default)]
    pub role: Role,
    /// Passed as-is to the connection provider.
    #[serde(default)]
    pub url: String,
}

/// Logical database.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Database {
    pub name: String,
    /// Physical name template, e.g. `user_db_{:02}`.
    pub format: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Logical table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Table {
    pub name: String,
    /// Logical database the table lives in.
    pub database: String,
    /// Physical table name template. Tables without one keep
    /// their name in every database.
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub table_rules: Vec<Rule>,
    /// Override the logical database's rules.
    #[serde(default)]
    pub database_rules: Option<Vec<Rule>>,
    /// Physical database => physical tables.
    #[serde(default)]
    pub physical: IndexMap<String, Vec<String>>,
}

/// Route rule, either as text or with its shard columns spelled out.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Rule {
    Text(String),
    Declared { rule: String, columns: Vec<String> },
}

impl Rule {
    pub fn compile(&self) -> Result<RouteRule, Error> {
        Ok(match self {
            Self::Text(text) => RouteRule::new(text)?,
            Self::Declared { rule, columns } => RouteRule::declared(rule, columns)?,
        })
    }

    fn compile_all(rules: &[Rule]) -> Result<Vec<RouteRule>, Error> {
        rules.iter().map(Rule::compile).collect()
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::frontend::router::sharding;

    /// Two write datasources sharding `users`, plus a replica.
    pub fn sharded() -> &'static str {
        r#"
[general]
read_retries = 1
fanout = "sequential"
default_database = "user_db_0"

[[datasources]]
name = "user_db_0"
role = "write"
url = "postgres://localhost/user_db_0"

[[datasources]]
name = "user_db_1"
role = "write"

[[datasources]]
name = "replica"
role = "read"

[[databases]]
name = "user_db"
format = "user_db_{}"
rules = ["${user_id} % 2"]

[[tables]]
name = "users"
database = "user_db"
format = "users_{}"
table_rules = [{ rule = "${user_id} % 4", columns = ["user_id"] }]

[tables.physical]
user_db_0 = ["users_0", "users_2"]
user_db_1 = ["users_1", "users_3"]
"#
    }

    #[test]
    fn test_parse() {
        let config = from_str(sharded()).unwrap();
        assert_eq!(config.general.read_retries, 1);
        assert_eq!(config.general.fanout, Fanout::Sequential);
        assert_eq!(config.general.ast_cache_size, 1024);
        assert_eq!(config.datasources(Role::Write).count(), 2);
        assert_eq!(config.datasources(Role::Read).count(), 1);
        assert_eq!(config.tables[0].physical["user_db_1"], vec!["users_1", "users_3"]);

        let topology = config.topology().unwrap();
        let users = topology.table("users").unwrap();
        assert_eq!(users.all_coordinates().len(), 4);
        assert!(users.is_shard_column("user_id"));
    }

    #[test]
    fn test_defaults() {
        let config = from_str("").unwrap();
        assert_eq!(config.general, General::default());
        assert_eq!(
            config.general.load_balancing_strategy,
            LoadBalancingStrategy::Random
        );
        assert!(config.topology().unwrap().is_empty());
    }

    #[test]
    fn test_invalid() {
        let duplicate = r#"
[[datasources]]
name = "a"

[[datasources]]
name = "a"
"#;
        assert!(matches!(from_str(duplicate), Err(Error::Invalid(_))));

        let no_writer = r#"
[[datasources]]
name = "a"
role = "read"
"#;
        assert!(matches!(from_str(no_writer), Err(Error::Invalid(_))));

        let unknown_database = r#"
[[tables]]
name = "users"
database = "nope"
"#;
        assert!(matches!(from_str(unknown_database), Err(Error::Invalid(_))));

        assert!(matches!(from_str("[general]\nfoo = 1"), Err(Error::Toml(_))));
    }

    #[test]
    fn test_database_format_matches_datasources() {
        let unmatched = sharded().replace("format = \"user_db_{}\"", "format = \"shard_{}\"");
        assert!(matches!(from_str(&unmatched), Err(Error::Invalid(_))));

        let foreign = sharded().replace(
            "user_db_1 = [\"users_1\", \"users_3\"]",
            "replica = [\"users_1\", \"users_3\"]",
        );
        assert!(matches!(from_str(&foreign), Err(Error::Invalid(_))));
    }

    #[test]
    fn test_bad_rules() {
        let config = from_str(&sharded().replace("${user_id} % 2", "user_id % 2")).unwrap();
        assert!(matches!(
            config.topology(),
            Err(Error::Sharding(sharding::Error::InvalidRule { .. }))
        ));

        let config = from_str(&sharded().replace("columns = [\"user_id\"]", "columns = [\"id\"]"))
            .unwrap();
        assert!(matches!(
            config.topology(),
            Err(Error::Sharding(sharding::Error::InvalidRule { .. }))
        ));
    }

    #[test]
    fn test_global() {
        let config = set(from_str(sharded()).unwrap()).unwrap();
        assert_eq!(config.general.read_retries, 1);
        assert_eq!(super::config().general.read_retries, 1);
    }
}
