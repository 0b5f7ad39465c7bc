//! # Logical sessions
//!
//! A logical connection hides one or more physical connections behind
//! a single connection-like interface. A session wraps it and hands out
//! statements. Each statement executes one logical statement at a time,
//! holds its last result and can be cancelled from another task.
//!
//! Closing the session closes every statement still open on it,
//! cancelling whatever they are executing, and then the logical
//! connection itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Error, ExecutionContext};
use crate::backend::{ExecuteKind, Keys, MergedResult, ResultCursor};
use crate::value::Value;

// -----------------------------------------------------------------------------
// ----- LogicalConnection -----------------------------------------------------

/// Connection executing logical statements on physical datasources.
#[async_trait]
pub trait LogicalConnection: Send {
    /// Execute a logical statement.
    ///
    /// For [`ExecuteKind::Batch`], the statements come from the kind and
    /// `sql` and `params` are ignored. Execution stops as soon as `cancel`
    /// is cancelled.
    async fn execute(
        &mut self,
        sql: &str,
        params: &[Value],
        kind: &ExecuteKind,
        context: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<MergedResult, Error>;

    /// Release all physical connections.
    async fn close(&mut self) -> Result<(), Error>;
}

// -----------------------------------------------------------------------------
// ----- StatementRegistry -----------------------------------------------------

/// Cancels the statement currently executing.
#[derive(Debug, Clone, Default)]
pub struct Canceller {
    token: Arc<Mutex<CancellationToken>>,
    closed: Arc<AtomicBool>,
}

impl Canceller {
    pub fn cancel(&self) {
        self.token.lock().cancel();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.cancel();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Fresh token for the next execution.
    fn reset(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.token.lock() = token.clone();
        token
    }
}

/// Statements open on a logical connection.
#[derive(Debug, Default)]
pub struct StatementRegistry {
    statements: Mutex<HashMap<usize, Canceller>>,
    next_id: AtomicUsize,
}

impl StatementRegistry {
    fn register(&self) -> (usize, Canceller) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let canceller = Canceller::default();
        self.statements.lock().insert(id, canceller.clone());
        (id, canceller)
    }

    fn remove(&self, id: usize) {
        self.statements.lock().remove(&id);
    }

    /// Cancel and close every open statement.
    pub fn close_all(&self) {
        let statements = std::mem::take(&mut *self.statements.lock());
        debug!("closing {} statements", statements.len());
        for canceller in statements.into_values() {
            canceller.close();
        }
    }

    pub fn len(&self) -> usize {
        self.statements.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// -----------------------------------------------------------------------------
// ----- LogicalSession --------------------------------------------------------

#[derive(Debug)]
pub struct LogicalSession<C> {
    connection: Arc<AsyncMutex<C>>,
    statements: Arc<StatementRegistry>,
    closed: AtomicBool,
}

impl<C: LogicalConnection> LogicalSession<C> {
    pub fn new(connection: C) -> Self {
        Self {
            connection: Arc::new(AsyncMutex::new(connection)),
            statements: Arc::new(StatementRegistry::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Open a statement.
    pub fn statement(&self) -> Result<Statement<C>, Error> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let (id, canceller) = self.statements.register();

        Ok(Statement {
            id,
            canceller,
            connection: self.connection.clone(),
            registry: self.statements.clone(),
            context: ExecutionContext::default(),
            result: None,
        })
    }

    /// Exclusive access to the logical connection, e.g. to commit.
    pub async fn lock(&self) -> MutexGuard<'_, C> {
        self.connection.lock().await
    }

    /// Statements still open.
    pub fn statements(&self) -> &StatementRegistry {
        &self.statements
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Close all statements, then the connection.
    pub async fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::Relaxed) {
            return Ok(());
        }

        self.statements.close_all();
        self.connection.lock().await.close().await
    }
}

// -----------------------------------------------------------------------------
// ----- Statement -------------------------------------------------------------

#[derive(Debug)]
pub struct Statement<C> {
    id: usize,
    canceller: Canceller,
    connection: Arc<AsyncMutex<C>>,
    registry: Arc<StatementRegistry>,
    context: ExecutionContext,
    result: Option<MergedResult>,
}

impl<C: LogicalConnection> Statement<C> {
    /// Routing instructions for the following executions.
    pub fn set_context(&mut self, context: ExecutionContext) {
        self.context = context;
    }

    /// Execute a statement, replacing the previous result.
    pub async fn execute(
        &mut self,
        sql: &str,
        params: &[Value],
        kind: ExecuteKind,
    ) -> Result<&MergedResult, Error> {
        if self.canceller.is_closed() {
            return Err(Error::StatementClosed);
        }

        self.result = None;
        let token = self.canceller.reset();

        let result = self
            .connection
            .lock()
            .await
            .execute(sql, params, &kind, &self.context, &token)
            .await?;

        Ok(self.result.insert(result))
    }

    /// Execute a statement returning rows.
    pub async fn query(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<&mut ResultCursor>, Error> {
        self.execute(sql, params, ExecuteKind::Query).await?;
        Ok(self.rows())
    }

    /// Execute a statement returning an update count.
    pub async fn update(&mut self, sql: &str, params: &[Value], keys: Keys) -> Result<u64, Error> {
        self.execute(sql, params, ExecuteKind::Update(keys)).await?;
        Ok(self.update_count().unwrap_or_default())
    }

    /// Execute statements as one batch, returning their update counts.
    pub async fn batch(&mut self, statements: Vec<String>) -> Result<Vec<u64>, Error> {
        let result = self.execute("", &[], ExecuteKind::Batch(statements)).await?;
        Ok(result.batch_counts.clone())
    }

    /// Call a stored procedure.
    pub async fn call(&mut self, sql: &str, params: &[Value]) -> Result<&MergedResult, Error> {
        self.execute(sql, params, ExecuteKind::Call).await
    }

    /// Cancel the execution in flight, if any.
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    /// Handle to cancel executions from another task.
    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    pub fn result(&self) -> Option<&MergedResult> {
        self.result.as_ref()
    }

    pub fn rows(&mut self) -> Option<&mut ResultCursor> {
        self.result.as_mut().and_then(|result| result.rows.as_mut())
    }

    pub fn update_count(&self) -> Option<u64> {
        self.result.as_ref().and_then(|result| result.update_count)
    }

    pub fn generated_keys(&self) -> Option<&ResultCursor> {
        self.result
            .as_ref()
            .and_then(|result| result.generated_keys.as_ref())
    }

    pub fn is_closed(&self) -> bool {
        self.canceller.is_closed()
    }

    /// Cancel anything in flight and release the result.
    pub fn close(&mut self) {
        self.canceller.close();
        self.registry.remove(self.id);
        self.result = None;
    }
}

impl<C> Drop for Statement<C> {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;
    use crate::backend::Error as BackendError;

    /// Returns the statement as a single row, or sleeps until cancelled.
    #[derive(Debug, Default)]
    struct Echo {
        closed: bool,
    }

    #[async_trait]
    impl LogicalConnection for Echo {
        async fn execute(
            &mut self,
            sql: &str,
            _params: &[Value],
            kind: &ExecuteKind,
            _context: &ExecutionContext,
            cancel: &CancellationToken,
        ) -> Result<MergedResult, Error> {
            if sql == "sleep" {
                cancel.cancelled().await;
                return Err(BackendError::Cancelled.into());
            }

            Ok(match kind {
                ExecuteKind::Query | ExecuteKind::Call => MergedResult {
                    rows: Some(ResultCursor::new(
                        vec!["sql".into()],
                        vec![vec![Value::from(sql)]],
                    )),
                    ..Default::default()
                },
                ExecuteKind::Update(_) | ExecuteKind::Execute(_) => MergedResult {
                    update_count: Some(1),
                    ..Default::default()
                },
                ExecuteKind::Batch(statements) => MergedResult {
                    update_count: Some(statements.len() as u64),
                    batch_counts: vec![1; statements.len()],
                    ..Default::default()
                },
            })
        }

        async fn close(&mut self) -> Result<(), Error> {
            self.closed = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_statement_results() {
        let session = LogicalSession::new(Echo::default());
        let mut statement = session.statement().unwrap();

        let rows = statement.query("SELECT 1", &[]).await.unwrap().unwrap();
        assert_eq!(rows.next(), Some(&[Value::from("SELECT 1")][..]));

        // Previous result is released.
        assert_eq!(statement.update("DELETE", &[], Keys::None).await.unwrap(), 1);
        assert!(statement.rows().is_none());

        let counts = statement
            .batch(vec!["UPDATE a".into(), "UPDATE b".into()])
            .await
            .unwrap();
        assert_eq!(counts, vec![1, 1]);
    }

    #[tokio::test]
    async fn test_cancel() {
        let session = LogicalSession::new(Echo::default());
        let mut statement = session.statement().unwrap();
        let canceller = statement.canceller();

        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = statement.query("sleep", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Backend(BackendError::Cancelled)));

        // The next execution isn't affected.
        assert!(statement.query("SELECT 1", &[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_close_session() {
        let session = LogicalSession::new(Echo::default());
        let mut first = session.statement().unwrap();
        let second = session.statement().unwrap();
        assert_eq!(session.statements().len(), 2);

        drop(second);
        assert_eq!(session.statements().len(), 1);

        session.close().await.unwrap();
        assert!(session.lock().await.closed);
        assert!(first.is_closed());
        assert!(matches!(
            first.query("SELECT 1", &[]).await,
            Err(Error::StatementClosed)
        ));
        assert!(matches!(session.statement(), Err(Error::ConnectionClosed)));
        assert!(session.statements().is_empty());
    }

    #[tokio::test]
    async fn test_close_statement() {
        let session = LogicalSession::new(Echo::default());
        let mut statement = session.statement().unwrap();
        statement.query("SELECT 1", &[]).await.unwrap();
        statement.close();
        assert!(statement.result().is_none());
        assert!(session.statements().is_empty());
        assert!(matches!(
            statement.update("DELETE", &[], Keys::None).await,
            Err(Error::StatementClosed)
        ));
    }
}
