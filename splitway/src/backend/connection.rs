//! Physical connections and the provider creating them.
use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{DbIndex, Error, Executed, Request};
use crate::config::Role;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Holdability {
    HoldCursorsOverCommit,
    #[default]
    CloseCursorsAtCommit,
}

/// Settings of a logical connection copied onto every physical
/// connection it binds. The read-only flag is not one of them:
/// read/write routing decides where statements go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub auto_commit: bool,
    pub isolation: Option<IsolationLevel>,
    pub holdability: Holdability,
    pub client_info: BTreeMap<String, String>,
    pub catalog: Option<String>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            auto_commit: true,
            isolation: None,
            holdability: Holdability::default(),
            client_info: BTreeMap::new(),
            catalog: None,
        }
    }
}

/// Connection to one physical datasource.
#[async_trait]
pub trait PhysicalConnection: Debug + Send + Sync {
    /// Datasource this connection is bound to.
    fn index(&self) -> &DbIndex;

    /// Prepare, bind and execute a statement, fetching its results.
    async fn execute(&mut self, request: &Request) -> Result<Executed, Error>;

    /// Ask the server to stop the statement in flight.
    async fn cancel(&mut self) -> Result<(), Error>;

    /// Apply logical connection settings.
    async fn apply(&mut self, settings: &ConnectionSettings) -> Result<(), Error>;

    async fn commit(&mut self) -> Result<(), Error>;

    async fn rollback(&mut self) -> Result<(), Error>;

    async fn close(&mut self) -> Result<(), Error>;
}

/// Owned physical connection.
pub type Connection = Box<dyn PhysicalConnection>;

/// Creates physical connections.
#[async_trait]
pub trait ConnectionProvider: Debug + Send + Sync {
    /// Open a connection to the datasource.
    async fn connect(&self, index: &DbIndex) -> Result<Connection, Error>;

    /// Configured datasources with the role.
    fn indexes(&self, role: Role) -> Vec<DbIndex>;

    /// Find a configured datasource by name.
    fn index(&self, name: &str) -> Option<DbIndex> {
        [Role::Write, Role::Read]
            .into_iter()
            .flat_map(|role| self.indexes(role))
            .find(|index| index.name() == name)
    }
}

/// Connect and apply settings, closing the connection if that fails.
pub async fn bind(
    provider: &dyn ConnectionProvider,
    index: &DbIndex,
    settings: &ConnectionSettings,
) -> Result<Connection, Error> {
    let mut connection = provider.connect(index).await?;
    if let Err(err) = connection.apply(settings).await {
        let _ = connection.close().await;
        return Err(err);
    }
    Ok(connection)
}
