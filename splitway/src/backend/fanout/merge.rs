//! Combine per-target results into one logical result.
use super::super::{Error, ExecuteKind, Executed, MergedResult, Outcome, ResultCursor};

/// Accumulates results in target order.
#[derive(Debug, Default)]
pub struct Merge {
    rows: Option<ResultCursor>,
    count: Option<u64>,
    keys: Option<ResultCursor>,
    keys_requested: bool,
}

impl Merge {
    /// Generated keys are only kept if the statement asked for them.
    pub fn new(kind: &ExecuteKind) -> Self {
        Self {
            keys_requested: kind.keys().requested(),
            ..Default::default()
        }
    }

    /// Add the result of the next target.
    pub fn add(&mut self, executed: Executed) -> Result<(), Error> {
        match executed.outcome {
            Outcome::Rows(cursor) => {
                if self.count.is_some() {
                    return Err(mixed());
                }
                Self::concat(&mut self.rows, cursor)?;
            }

            Outcome::Count(count) => {
                if self.rows.is_some() {
                    return Err(mixed());
                }
                self.count = Some(self.count.unwrap_or_default().saturating_add(count));
            }
        }

        match executed.generated_keys {
            Some(keys) if self.keys_requested => Self::concat(&mut self.keys, keys)?,
            _ => (),
        }

        Ok(())
    }

    pub fn finish(self) -> MergedResult {
        MergedResult {
            update_count: self.count,
            rows: self.rows,
            generated_keys: self.keys,
            batch_counts: vec![],
        }
    }

    fn concat(merged: &mut Option<ResultCursor>, cursor: ResultCursor) -> Result<(), Error> {
        match merged {
            Some(merged) => merged.append(cursor),
            None => {
                *merged = Some(cursor);
                Ok(())
            }
        }
    }
}

/// Merge results, in target order.
pub fn merge(
    kind: &ExecuteKind,
    results: impl IntoIterator<Item = Executed>,
) -> Result<MergedResult, Error> {
    let mut merge = Merge::new(kind);
    for executed in results {
        merge.add(executed)?;
    }
    Ok(merge.finish())
}

fn mixed() -> Error {
    Error::ResultMismatch("rows and update counts".into())
}
