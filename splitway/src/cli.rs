use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;

use crate::backend::Classifier;
use crate::config::{self, Config};
use crate::frontend::router::{self, parser::Cache, RouteSet, ShardRouter};
use crate::frontend::{ExecutionContext, HandlerContext};
use crate::value::Value;

/// Splitway routes SQL statements to replicated and sharded databases.
#[derive(Parser, Debug)]
#[command(name = "", version = concat!("Splitway v", env!("CARGO_PKG_VERSION")))]
pub struct Cli {
    /// Path to the configuration file. Default: "splitway.toml"
    #[arg(short, long, default_value = "splitway.toml")]
    pub config: PathBuf,
    /// Subcommand.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Check configuration.
    Configcheck,

    /// Show where a statement would be sent.
    Route {
        /// Statement to route.
        #[arg(short, long)]
        sql: String,
        /// Bound parameter, in order. Repeat for more.
        #[arg(short, long)]
        param: Vec<String>,
        /// Send a SELECT to every shard.
        #[arg(long, default_value = "false")]
        all_shards: bool,
    },

    /// Classify a statement as a read or a write.
    Classify {
        /// Statement to classify.
        #[arg(short, long)]
        sql: String,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Config(#[from] config::Error),

    #[error("{0}")]
    Router(#[from] router::Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

/// Routing decision printed by the `route` command.
#[derive(Debug, Serialize)]
pub struct RouteOutput {
    pub read: bool,
    pub routes: RouteSet,
}

/// Confirm that the configuration and the topology it describes are valid.
pub fn config_check(path: &Path) -> Result<Config, Error> {
    let config = Config::load(path)?;
    config.topology()?;
    Ok(config)
}

/// Route a statement with the configured topology.
pub fn route(
    config: &Config,
    sql: &str,
    params: &[String],
    all_shards: bool,
) -> Result<RouteOutput, Error> {
    Cache::resize(config.general.ast_cache_size);

    let router = ShardRouter::new(config.topology()?, config.general.default_database.clone());
    let params = params
        .iter()
        .map(|param| Value::guess(param))
        .collect::<Vec<_>>();
    let execution = ExecutionContext {
        all_shards,
        ..Default::default()
    };

    let mut context = HandlerContext::new(sql, &params, &execution);
    router.route(&mut context)?;

    Ok(RouteOutput {
        read: context.query,
        routes: context.routes,
    })
}

/// "read" or "write".
pub fn classify(sql: &str) -> &'static str {
    if Classifier::new(1).is_query(sql) {
        "read"
    } else {
        "write"
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_route() {
        let config = config::from_str(config::test::sharded()).unwrap();
        let output = route(
            &config,
            "SELECT * FROM users WHERE user_id = ?",
            &["5".into()],
            false,
        )
        .unwrap();

        assert!(output.read);
        let route = output.routes.get("user_db_1", Some("users_1")).unwrap();
        assert_eq!(route.params, vec![Value::Integer(5)]);

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["routes"][0]["database"], "user_db_1");
        assert_eq!(json["routes"][0]["params"][0], 5);
    }

    #[test]
    fn test_route_all_shards() {
        let config = config::from_str(config::test::sharded()).unwrap();
        let output = route(&config, "SELECT * FROM users", &[], true).unwrap();
        assert_eq!(output.routes.len(), 4);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("SELECT 1"), "read");
        assert_eq!(classify("SELECT 1 FOR UPDATE"), "write");
        assert_eq!(classify("INSERT INTO t VALUES (1)"), "write");
    }

    #[test]
    fn test_config_check_missing_file() {
        let err = config_check(Path::new("/nonexistent/splitway.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(config::Error::Io(_))));
    }
}
