//! Configuration errors.

use thiserror::Error;

use crate::frontend::router::sharding;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Sharding(#[from] sharding::Error),
}

impl Error {
    pub(crate) fn invalid(reason: impl ToString) -> Self {
        Self::Invalid(reason.to_string())
    }
}
