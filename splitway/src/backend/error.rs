//! Backend errors.
use thiserror::Error;

use crate::config::Role;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no datasources left to retry the read on")]
    RoutingExhausted,

    #[error("target \"{target}\" failed: {source}")]
    TargetExecution {
        target: String,
        #[source]
        source: Box<Error>,
    },

    /// Driver error that another datasource might not have.
    #[error("connection error: {0}")]
    Connection(String),

    /// Driver error caused by the statement itself.
    #[error("statement error: {0}")]
    Statement(String),

    #[error("statement cancelled")]
    Cancelled,

    #[error("connection is closed")]
    Closed,

    #[error("no {0} datasource configured")]
    NoDatasource(Role),

    #[error("unknown datasource \"{0}\"")]
    UnknownDatasource(String),

    #[error("results don't match across targets: {0}")]
    ResultMismatch(String),

    #[error("{0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Failure of the datasource, not the statement.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    pub(crate) fn target(target: impl ToString, source: Error) -> Self {
        Self::TargetExecution {
            target: target.to_string(),
            source: Box::new(source),
        }
    }
}
