//! Logical connection over sharded tables.
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{router::ShardRouter, Error, ExecutionContext, HandlerContext, LogicalConnection};
use crate::backend::{
    ConnectionProvider, Connections, ExecuteKind, FanOut, Holdability, IsolationLevel, Keys,
    MergedResult,
};
use crate::config::{Config, Fanout};
use crate::value::Value;

#[derive(Debug)]
pub struct ShardingConnection {
    router: ShardRouter,
    fanout: FanOut,
    connections: Connections,
    closed: bool,
}

impl ShardingConnection {
    pub fn new(router: ShardRouter, provider: Arc<dyn ConnectionProvider>, fanout: Fanout) -> Self {
        Self {
            router,
            fanout: FanOut::new(fanout),
            connections: Connections::new(provider),
            closed: false,
        }
    }

    /// Connection using the configured topology.
    pub fn from_config(config: &Config, provider: Arc<dyn ConnectionProvider>) -> Result<Self, Error> {
        let router = ShardRouter::new(config.topology()?, config.general.default_database.clone());
        Ok(Self::new(router, provider, config.general.fanout))
    }

    /// Route a statement without executing it.
    pub fn route(
        &self,
        sql: &str,
        params: &[Value],
        context: &ExecutionContext,
    ) -> Result<HandlerContext, Error> {
        let mut handler = HandlerContext::new(sql, params, context);
        self.router.route(&mut handler)?;
        Ok(handler)
    }

    pub fn auto_commit(&self) -> bool {
        self.connections.settings().auto_commit
    }

    /// Turning autoCommit back on commits the open transaction.
    pub async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), Error> {
        if auto_commit == self.auto_commit() {
            return Ok(());
        }

        if auto_commit {
            self.connections.commit().await?;
        }

        self.connections
            .update_settings(|settings| settings.auto_commit = auto_commit)
            .await?;

        Ok(())
    }

    /// Commit on every database the transaction touched. There is
    /// no two-phase commit: databases commit independently.
    pub async fn commit(&mut self) -> Result<(), Error> {
        self.transaction()?;
        debug!(
            "committing on [{}]",
            self.connections.pinned().collect::<Vec<_>>().join(", ")
        );
        self.connections.commit().await?;
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<(), Error> {
        self.transaction()?;
        self.connections.rollback().await?;
        Ok(())
    }

    pub async fn set_isolation(&mut self, isolation: IsolationLevel) -> Result<(), Error> {
        self.connections
            .update_settings(|settings| settings.isolation = Some(isolation))
            .await?;
        Ok(())
    }

    pub async fn set_holdability(&mut self, holdability: Holdability) -> Result<(), Error> {
        self.connections
            .update_settings(|settings| settings.holdability = holdability)
            .await?;
        Ok(())
    }

    pub async fn set_client_info(&mut self, name: &str, value: &str) -> Result<(), Error> {
        self.connections
            .update_settings(|settings| {
                settings.client_info.insert(name.to_owned(), value.to_owned());
            })
            .await?;
        Ok(())
    }

    /// Databases holding a connection for the open transaction.
    pub fn pinned(&self) -> Vec<&str> {
        self.connections.pinned().collect()
    }

    fn transaction(&self) -> Result<(), Error> {
        if self.closed {
            Err(Error::ConnectionClosed)
        } else if self.auto_commit() {
            Err(Error::NotInTransaction)
        } else {
            Ok(())
        }
    }

    /// Execute a routed statement on its targets and
    /// store the merged result in the context.
    pub async fn handle(
        &mut self,
        handler: &mut HandlerContext,
        kind: &ExecuteKind,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }

        let result = self
            .fanout
            .execute(&handler.routes, kind, &mut self.connections, cancel)
            .await?;

        handler.update_count = result.update_count;
        handler.result = Some(result);

        Ok(())
    }

    async fn routed(
        &mut self,
        sql: &str,
        params: &[Value],
        kind: &ExecuteKind,
        context: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<MergedResult, Error> {
        let mut handler = self.route(sql, params, context)?;
        self.handle(&mut handler, kind, cancel).await?;
        Ok(handler.result.unwrap_or_default())
    }
}

#[async_trait]
impl LogicalConnection for ShardingConnection {
    async fn execute(
        &mut self,
        sql: &str,
        params: &[Value],
        kind: &ExecuteKind,
        context: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<MergedResult, Error> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }

        match kind {
            ExecuteKind::Query
            | ExecuteKind::Update(_)
            | ExecuteKind::Execute(_)
            | ExecuteKind::Call => self.routed(sql, params, kind, context, cancel).await,

            ExecuteKind::Batch(statements) => {
                let kind = ExecuteKind::Update(Keys::None);
                let mut batch_counts = Vec::with_capacity(statements.len());

                for sql in statements {
                    let result = self.routed(sql, &[], &kind, context, cancel).await?;
                    batch_counts.push(result.update_count.unwrap_or_default());
                }

                Ok(MergedResult {
                    update_count: Some(batch_counts.iter().sum()),
                    batch_counts,
                    ..Default::default()
                })
            }
        }
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.closed = true;
        self.connections.release().await;
        Ok(())
    }
}
