//! What the caller asked a statement to do.
use serde::Serialize;

use crate::value::Value;

/// Generated keys requested with an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub enum Keys {
    #[default]
    None,
    /// Driver-chosen key columns.
    Auto,
    ColumnIndexes(Vec<usize>),
    ColumnNames(Vec<String>),
}

impl Keys {
    pub fn requested(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Statement execution kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExecuteKind {
    /// Statement returning rows.
    Query,
    /// Statement returning an update count.
    Update(Keys),
    /// Statement returning either.
    Execute(Keys),
    /// Several statements, each returning an update count.
    Batch(Vec<String>),
    /// Stored procedure call.
    Call,
}

impl ExecuteKind {
    pub fn keys(&self) -> &Keys {
        match self {
            Self::Update(keys) | Self::Execute(keys) => keys,
            Self::Query | Self::Batch(_) | Self::Call => &Keys::None,
        }
    }
}

/// One statement sent to one physical connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub sql: String,
    pub params: Vec<Value>,
    pub kind: ExecuteKind,
}

impl Request {
    pub fn new(sql: &str, params: &[Value], kind: &ExecuteKind) -> Self {
        Self {
            sql: sql.to_owned(),
            params: params.to_vec(),
            kind: kind.clone(),
        }
    }
}
