//! Statement results.
use serde::Serialize;

use super::Error;
use crate::value::Value;

/// Rows returned by a statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultCursor {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    #[serde(skip)]
    position: usize,
}

impl ResultCursor {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            position: 0,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Next row, advancing the cursor.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&[Value]> {
        let row = self.rows.get(self.position)?;
        self.position += 1;
        Some(row)
    }

    /// Append rows of a cursor with the same columns.
    pub fn append(&mut self, other: ResultCursor) -> Result<(), Error> {
        if self.columns != other.columns {
            return Err(Error::ResultMismatch(format!(
                "columns [{}] vs [{}]",
                self.columns.join(", "),
                other.columns.join(", ")
            )));
        }
        self.rows.extend(other.rows);
        Ok(())
    }
}

/// What a statement produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Outcome {
    Rows(ResultCursor),
    Count(u64),
}

/// Result of one statement on one physical connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Executed {
    pub outcome: Outcome,
    pub generated_keys: Option<ResultCursor>,
}

impl Executed {
    pub fn rows(cursor: ResultCursor) -> Self {
        Self {
            outcome: Outcome::Rows(cursor),
            generated_keys: None,
        }
    }

    pub fn count(count: u64) -> Self {
        Self {
            outcome: Outcome::Count(count),
            generated_keys: None,
        }
    }
}

/// Result of a logical statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergedResult {
    /// Sum of update counts.
    pub update_count: Option<u64>,
    /// Concatenated rows.
    pub rows: Option<ResultCursor>,
    /// Concatenated generated keys, when requested.
    pub generated_keys: Option<ResultCursor>,
    /// Update count of every statement in a batch.
    pub batch_counts: Vec<u64>,
}
