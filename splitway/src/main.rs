//! Splitway, read/write splitting and sharding router.

use std::process::exit;

use clap::Parser;
use splitway::cli::{self, Commands};
use tracing::info;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::Cli::parse();

    splitway::logger();

    match args.command {
        Commands::Configcheck => {
            if let Err(e) = cli::config_check(&args.config) {
                eprintln!("Configuration error: {}", e);
                exit(1);
            }

            println!("Configuration valid");
        }

        Commands::Route {
            sql,
            param,
            all_shards,
        } => {
            let config = splitway::config::load(&args.config)?;
            info!(
                "{} datasources, {} sharded tables",
                config.datasources.len(),
                config.tables.len()
            );
            let output = cli::route(&config, &sql, &param, all_shards)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Commands::Classify { sql } => {
            println!("{}", cli::classify(&sql));
        }
    }

    Ok(())
}
