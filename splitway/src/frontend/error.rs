//! Errors returned by logical connections and statements.
use thiserror::Error;

use crate::{backend, config};

use super::router;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Router(#[from] router::Error),

    #[error("{0}")]
    Backend(#[from] backend::Error),

    #[error("{0}")]
    Config(#[from] config::Error),

    #[error("not in a transaction")]
    NotInTransaction,

    #[error("statement is closed")]
    StatementClosed,

    #[error("connection is closed")]
    ConnectionClosed,
}
