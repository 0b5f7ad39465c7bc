//! Read/write splitting for a logical connection.
//!
//! The router keeps at most one physical connection pinned. Statements
//! either reuse it or replace it, depending on the transaction state,
//! routing hints and whether the statement reads or writes.

pub mod classifier;
pub mod hint;
pub mod selector;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

pub use classifier::Classifier;
pub use hint::Hints;
pub use selector::Selector;

use super::{bind, Connection, ConnectionProvider, ConnectionSettings, DbIndex, Error};
use crate::config::{LoadBalancingStrategy, Role};

// -------------------------------------------------------------------------------------------------
// ----- Public Interface --------------------------------------------------------------------------

#[derive(Debug)]
pub struct ConnectionRouter {
    provider: Arc<dyn ConnectionProvider>,
    selector: Selector,
    classifier: Arc<Classifier>,
    pinned: Option<Connection>,
    settings: ConnectionSettings,
}

impl ConnectionRouter {
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        strategy: LoadBalancingStrategy,
        classifier: Arc<Classifier>,
    ) -> Self {
        Self {
            provider,
            selector: Selector::new(strategy),
            classifier,
            pinned: None,
            settings: ConnectionSettings::default(),
        }
    }

    /// Select the physical connection for a statement.
    ///
    /// 1. Transactions always run on a write datasource.
    /// 2. Hints from the execution context, then hints in the statement,
    ///    pick among the named datasources.
    /// 3. Reads go to a read datasource, writes to a write datasource.
    pub async fn select(&mut self, sql: &str, hints: &Hints) -> Result<&mut Connection, Error> {
        if !self.settings.auto_commit {
            return self.select_write().await;
        }

        if !hints.is_empty() {
            return self.select_hinted(hints).await;
        }

        if let Some(hints) = Hints::extract(sql) {
            return self.select_hinted(&hints).await;
        }

        if self.classifier.is_query(sql) {
            self.select_read().await
        } else {
            self.select_write().await
        }
    }

    /// Keep the pinned write connection or bind a new one.
    pub async fn select_write(&mut self) -> Result<&mut Connection, Error> {
        if self.pinned_role() == Some(Role::Write) {
            return self.pinned_mut();
        }

        let candidates = self.provider.indexes(Role::Write);
        let index = self
            .selector
            .pick(&candidates)
            .ok_or(Error::NoDatasource(Role::Write))?;

        self.bind(index).await
    }

    /// Keep the pinned read connection or bind a new one.
    pub async fn select_read(&mut self) -> Result<&mut Connection, Error> {
        if self.pinned_role() == Some(Role::Read) {
            return self.pinned_mut();
        }

        let candidates = self.read_candidates(&HashSet::new());
        let index = self
            .selector
            .pick(&candidates)
            .ok_or(Error::NoDatasource(Role::Read))?;

        self.bind(index).await
    }

    /// Bind a read connection to a datasource outside of the excluded set.
    /// Returns `None` if no candidates are left.
    pub async fn select_read_excluding(
        &mut self,
        excluded: &HashSet<DbIndex>,
    ) -> Result<Option<&mut Connection>, Error> {
        let candidates = self.read_candidates(excluded);
        match self.selector.pick(&candidates) {
            Some(index) => Ok(Some(self.bind(index).await?)),
            None => Ok(None),
        }
    }

    /// Datasource of the pinned connection.
    pub fn pinned(&self) -> Option<&DbIndex> {
        self.pinned.as_ref().map(|connection| connection.index())
    }

    /// Pinned connection, if any.
    pub fn connection(&mut self) -> Option<&mut Connection> {
        self.pinned.as_mut()
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Change settings and push them to the pinned connection.
    pub async fn update_settings(
        &mut self,
        update: impl FnOnce(&mut ConnectionSettings),
    ) -> Result<(), Error> {
        update(&mut self.settings);

        if let Some(ref mut connection) = self.pinned {
            connection.apply(&self.settings).await?;
        }

        Ok(())
    }

    /// Release the pinned connection.
    pub async fn unpin(&mut self) -> Result<(), Error> {
        if let Some(mut connection) = self.pinned.take() {
            debug!("unpinning {}", connection.index());
            connection.close().await?;
        }

        Ok(())
    }

    /// Close and drop the pinned connection if it's bound to the
    /// datasource. Used after the datasource failed.
    pub async fn discard(&mut self, index: &DbIndex) {
        if self.pinned() != Some(index) {
            return;
        }

        if let Some(mut connection) = self.pinned.take() {
            debug!("discarding {}", index);
            if let Err(err) = connection.close().await {
                warn!("closing {} failed: {}", index, err);
            }
        }
    }

    // ---------------------------------------------------------------------------------------------
    // ----- Private -------------------------------------------------------------------------------

    fn pinned_role(&self) -> Option<Role> {
        self.pinned().map(|index| index.role())
    }

    fn pinned_mut(&mut self) -> Result<&mut Connection, Error> {
        self.pinned.as_mut().ok_or(Error::Closed)
    }

    /// Readers, or writers if there are no readers.
    fn read_candidates(&self, excluded: &HashSet<DbIndex>) -> Vec<DbIndex> {
        let mut candidates = self.provider.indexes(Role::Read);
        if candidates.is_empty() {
            candidates = self.provider.indexes(Role::Write);
        }
        candidates.retain(|index| !excluded.contains(index));
        candidates
    }

    async fn select_hinted(&mut self, hints: &Hints) -> Result<&mut Connection, Error> {
        let candidates = hints
            .datasources()
            .iter()
            .map(|name| {
                self.provider
                    .index(name)
                    .ok_or_else(|| Error::UnknownDatasource(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let satisfied = self
            .pinned()
            .is_some_and(|pinned| candidates.contains(pinned));
        if satisfied {
            return self.pinned_mut();
        }

        let index = Selector::random(&candidates).ok_or(Error::RoutingExhausted)?;
        self.bind(index).await
    }

    /// Pin a connection to the datasource, replacing the pinned one.
    async fn bind(&mut self, index: DbIndex) -> Result<&mut Connection, Error> {
        if self.pinned() == Some(&index) {
            return self.pinned_mut();
        }

        let connection = bind(self.provider.as_ref(), &index, &self.settings).await?;

        if let Some(mut previous) = self.pinned.replace(connection) {
            debug!("replacing {} with {}", previous.index(), index);
            // The new connection is already in place.
            let _ = previous.close().await;
        } else {
            debug!("pinned {}", index);
        }

        self.pinned_mut()
    }
}
