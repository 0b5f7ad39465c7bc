//! Logical connection splitting reads and writes across replicated datasources.
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Error, ExecutionContext, LogicalConnection};
use crate::backend::{
    self, fanout::merge, Classifier, Connection, ConnectionProvider, ConnectionRouter,
    ExecuteKind, Hints, Holdability, IsolationLevel, Keys, MergedResult, Request,
};
use crate::config::General;
use crate::value::Value;

#[derive(Debug)]
pub struct HaConnection {
    router: ConnectionRouter,
    read_retries: usize,
    read_only: bool,
    closed: bool,
}

impl HaConnection {
    /// Create a connection. The classifier is usually shared
    /// by every connection.
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        classifier: Arc<Classifier>,
        general: &General,
    ) -> Self {
        Self {
            router: ConnectionRouter::new(provider, general.load_balancing_strategy, classifier),
            read_retries: general.read_retries,
            read_only: false,
            closed: false,
        }
    }

    pub fn router(&self) -> &ConnectionRouter {
        &self.router
    }

    pub fn auto_commit(&self) -> bool {
        self.router.settings().auto_commit
    }

    /// Turning autoCommit off starts a transaction on a write datasource.
    pub async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), Error> {
        if auto_commit == self.auto_commit() {
            return Ok(());
        }

        if !auto_commit {
            self.router.select_write().await?;
        }

        self.router
            .update_settings(|settings| settings.auto_commit = auto_commit)
            .await?;

        Ok(())
    }

    pub async fn commit(&mut self) -> Result<(), Error> {
        self.transaction()?;
        if let Some(connection) = self.router.connection() {
            connection.commit().await?;
        }
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<(), Error> {
        self.transaction()?;
        if let Some(connection) = self.router.connection() {
            connection.rollback().await?;
        }
        Ok(())
    }

    /// Create a savepoint in the current transaction.
    pub async fn savepoint(&mut self, name: &str) -> Result<(), Error> {
        self.transaction()?;
        self.write(&format!("SAVEPOINT {}", name)).await
    }

    pub async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), Error> {
        self.transaction()?;
        self.write(&format!("ROLLBACK TO SAVEPOINT {}", name)).await
    }

    pub async fn set_isolation(&mut self, isolation: IsolationLevel) -> Result<(), Error> {
        self.router
            .update_settings(|settings| settings.isolation = Some(isolation))
            .await?;
        Ok(())
    }

    pub async fn set_holdability(&mut self, holdability: Holdability) -> Result<(), Error> {
        self.router
            .update_settings(|settings| settings.holdability = holdability)
            .await?;
        Ok(())
    }

    pub async fn set_client_info(&mut self, name: &str, value: &str) -> Result<(), Error> {
        self.router
            .update_settings(|settings| {
                settings.client_info.insert(name.to_owned(), value.to_owned());
            })
            .await?;
        Ok(())
    }

    pub async fn set_catalog(&mut self, catalog: Option<&str>) -> Result<(), Error> {
        self.router
            .update_settings(|settings| settings.catalog = catalog.map(|c| c.to_owned()))
            .await?;
        Ok(())
    }

    /// Kept locally. Read/write routing decides where statements run,
    /// so physical connections never see it.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn read_only(&self) -> bool {
        self.read_only
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

    async fn write(&mut self, sql: &str) -> Result<(), Error> {
        let connection = self.router.select_write().await?;
        let request = Request::new(sql, &[], &ExecuteKind::Execute(Keys::None));
        run(connection, &request, &CancellationToken::new()).await?;
        Ok(())
    }

    /// Execute on the selected datasource, moving failed reads
    /// to other read datasources.
    async fn routed(
        &mut self,
        request: &Request,
        hints: &Hints,
        cancel: &CancellationToken,
    ) -> Result<MergedResult, Error> {
        let connection = self.router.select(&request.sql, hints).await?;
        let index = connection.index().clone();

        match run(connection, request, cancel).await {
            Ok(result) => Ok(result),
            Err(err) if err.retryable() && index.is_read() && self.auto_commit() => {
                warn!("read on {} failed: {}", index, err);
                self.router.discard(&index).await;
                self.failover(index, request, cancel).await
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn failover(
        &mut self,
        failed: backend::DbIndex,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<MergedResult, Error> {
        let mut excluded = HashSet::from([failed]);

        for attempt in 1..=self.read_retries {
            let Some(connection) = self.router.select_read_excluding(&excluded).await? else {
                break;
            };
            let index = connection.index().clone();
            warn!(
                "retrying read on {} [{}/{}]",
                index, attempt, self.read_retries
            );

            match run(connection, request, cancel).await {
                Ok(result) => return Ok(result),
                Err(err) if err.retryable() => {
                    warn!("read on {} failed: {}", index, err);
                    self.router.discard(&index).await;
                    excluded.insert(index);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(backend::Error::RoutingExhausted.into())
    }

    async fn batch(
        &mut self,
        statements: &[String],
        cancel: &CancellationToken,
    ) -> Result<MergedResult, Error> {
        let connection = self.router.select_write().await?;
        let kind = ExecuteKind::Update(Keys::None);
        let mut batch_counts = Vec::with_capacity(statements.len());

        for sql in statements {
            let result = run(connection, &Request::new(sql, &[], &kind), cancel).await?;
            batch_counts.push(result.update_count.unwrap_or_default());
        }

        Ok(MergedResult {
            update_count: Some(batch_counts.iter().sum()),
            batch_counts,
            ..Default::default()
        })
    }
}

#[async_trait]
impl LogicalConnection for HaConnection {
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
            ExecuteKind::Query | ExecuteKind::Update(_) | ExecuteKind::Execute(_) => {
                let request = Request::new(sql, params, kind);
                self.routed(&request, &context.hints, cancel).await
            }

            ExecuteKind::Batch(statements) => self.batch(statements, cancel).await,

            ExecuteKind::Call => {
                let connection = self.router.select_write().await?;
                let request = Request::new(sql, params, kind);
                Ok(run(connection, &request, cancel).await?)
            }
        }
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.closed = true;
        self.router.unpin().await?;
        Ok(())
    }
}

/// Execute one request, cancelling it on the server if asked to.
async fn run(
    connection: &mut Connection,
    request: &Request,
    cancel: &CancellationToken,
) -> Result<MergedResult, backend::Error> {
    let executed = select! {
        executed = connection.execute(request) => Some(executed),
        _ = cancel.cancelled() => None,
    };

    match executed {
        Some(executed) => merge(&request.kind, [executed?]),
        None => {
            debug!("cancelling statement on {}", connection.index());
            connection.cancel().await?;
            Err(backend::Error::Cancelled)
        }
    }
}
