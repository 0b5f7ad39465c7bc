//! Query router errors.
use thiserror::Error;

use super::sharding;

#[derive(Debug, Error)]
pub enum Error {
    #[error("rewrite: {0}")]
    Rewrite(String),

    #[error("{0}")]
    PgQuery(pg_query::Error),

    #[error("{0}")]
    Sharding(#[from] sharding::Error),

    #[error("parameter ${0} is not bound")]
    MissingParameter(usize),

    #[error("empty query")]
    EmptyQuery,
}

impl Error {
    pub(crate) fn rewrite(reason: impl ToString) -> Self {
        Self::Rewrite(reason.to_string())
    }
}
