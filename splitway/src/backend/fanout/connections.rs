//! Physical connections of a sharded logical connection.
use std::sync::Arc;

use futures::future::join_all;
use indexmap::IndexMap;
use tracing::{debug, warn};

use super::super::{bind, Connection, ConnectionProvider, ConnectionSettings, Error};

/// Connections by physical database.
///
/// With autoCommit on, connections live for one statement. With autoCommit
/// off, they stay pinned until the transaction ends.
#[derive(Debug)]
pub struct Connections {
    provider: Arc<dyn ConnectionProvider>,
    settings: ConnectionSettings,
    pinned: IndexMap<String, Connection>,
}

impl Connections {
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            provider,
            settings: ConnectionSettings::default(),
            pinned: IndexMap::new(),
        }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Change settings and push them to every pinned connection.
    pub async fn update_settings(
        &mut self,
        update: impl FnOnce(&mut ConnectionSettings),
    ) -> Result<(), Error> {
        update(&mut self.settings);

        let settings = &self.settings;
        let results = join_all(
            self.pinned
                .values_mut()
                .map(|connection| connection.apply(settings)),
        )
        .await;

        results.into_iter().collect()
    }

    /// Take the pinned connection to the database or open a new one.
    pub async fn checkout(&mut self, database: &str) -> Result<Connection, Error> {
        if let Some(connection) = self.pinned.shift_remove(database) {
            return Ok(connection);
        }

        let index = self
            .provider
            .index(database)
            .ok_or_else(|| Error::UnknownDatasource(database.to_owned()))?;

        bind(self.provider.as_ref(), &index, &self.settings).await
    }

    /// Give back a connection taken with [`Connections::checkout`].
    pub async fn checkin(&mut self, connection: Connection) {
        if self.settings.auto_commit {
            Self::close(connection).await;
        } else {
            let database = connection.index().name().to_owned();
            if !self.pinned.contains_key(&database) {
                debug!("pinned {}", connection.index());
            }
            self.pinned.insert(database, connection);
        }
    }

    /// Databases with a pinned connection.
    pub fn pinned(&self) -> impl Iterator<Item = &str> {
        self.pinned.keys().map(|database| database.as_str())
    }

    /// Commit on every pinned connection and release them.
    ///
    /// Each database commits on its own; a failure on one
    /// doesn't undo the others.
    pub async fn commit(&mut self) -> Result<(), Error> {
        let results = join_all(
            self.pinned
                .values_mut()
                .map(|connection| connection.commit()),
        )
        .await;
        self.release().await;
        results.into_iter().collect()
    }

    /// Roll back every pinned connection and release them.
    pub async fn rollback(&mut self) -> Result<(), Error> {
        let results = join_all(
            self.pinned
                .values_mut()
                .map(|connection| connection.rollback()),
        )
        .await;
        self.release().await;
        results.into_iter().collect()
    }

    /// Close every pinned connection.
    pub async fn release(&mut self) {
        for (_, connection) in self.pinned.drain(..) {
            debug!("unpinning {}", connection.index());
            Self::close(connection).await;
        }
    }

    async fn close(mut connection: Connection) {
        if let Err(err) = connection.close().await {
            warn!("error closing {}: {}", connection.index(), err);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::test::{Event, Failure, MockProvider, Script};
    use crate::backend::DbIndex;

    fn connections(provider: &MockProvider) -> Connections {
        Connections::new(Arc::new(provider.clone()))
    }

    #[tokio::test]
    async fn test_auto_commit_closes() {
        let provider = MockProvider::new(vec![DbIndex::write("a")]);
        let mut connections = connections(&provider);

        let connection = connections.checkout("a").await.unwrap();
        connections.checkin(connection).await;
        assert_eq!(connections.pinned().count(), 0);
        assert!(provider.events().contains(&Event::Close("a".into())));

        let err = connections.checkout("b").await.unwrap_err();
        assert!(matches!(err, Error::UnknownDatasource(name) if name == "b"));
    }

    #[tokio::test]
    async fn test_transaction_pins() {
        let provider = MockProvider::new(vec![DbIndex::write("a"), DbIndex::write("b")]);
        let mut connections = connections(&provider);
        connections
            .update_settings(|settings| settings.auto_commit = false)
            .await
            .unwrap();

        for database in ["a", "b", "a"] {
            let connection = connections.checkout(database).await.unwrap();
            connections.checkin(connection).await;
        }
        assert_eq!(connections.pinned().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(provider.count(|e| matches!(e, Event::Connect(_))), 2);

        connections.commit().await.unwrap();
        assert_eq!(provider.count(|e| matches!(e, Event::Commit(_))), 2);
        assert_eq!(provider.count(|e| matches!(e, Event::Close(_))), 2);
        assert_eq!(connections.pinned().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_connect() {
        let provider = MockProvider::new(vec![DbIndex::write("a")]);
        provider.script(
            "a",
            Script {
                connect_error: Some(Failure::Connection("refused".into())),
                ..Default::default()
            },
        );
        let mut connections = connections(&provider);
        let err = connections.checkout("a").await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }
}
