//! Read/write statement classifier.
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use pg_query::{protobuf::SelectStmt, NodeEnum};
use tracing::trace;

use crate::frontend::router::parser::placeholders;

/// Tells reads from writes, caching the answer per statement text.
#[derive(Debug)]
pub struct Classifier {
    cache: Mutex<LruCache<String, bool>>,
}

impl Classifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Statement only reads data.
    pub fn is_query(&self, sql: &str) -> bool {
        if let Some(read) = self.cache.lock().get(sql) {
            return *read;
        }

        // Classify without holding the lock.
        let read = Self::classify(sql);
        trace!("classified as {}: {}", if read { "read" } else { "write" }, sql);
        self.cache.lock().put(sql.to_owned(), read);

        read
    }

    /// Statements that can't be parsed are writes.
    fn classify(sql: &str) -> bool {
        let Ok(converted) = placeholders::convert(sql) else {
            return false;
        };
        let Ok(ast) = pg_query::parse(&converted.query) else {
            return false;
        };

        let mut statements = ast.protobuf.stmts.iter().peekable();
        if statements.peek().is_none() {
            return false;
        }

        statements.all(|stmt| {
            matches!(
                stmt.stmt.as_ref().and_then(|stmt| stmt.node.as_ref()),
                Some(NodeEnum::SelectStmt(select)) if read_only(select)
            ) || matches!(
                stmt.stmt.as_ref().and_then(|stmt| stmt.node.as_ref()),
                Some(NodeEnum::VariableShowStmt(_)) | Some(NodeEnum::ExplainStmt(_))
            )
        })
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// SELECT without FOR UPDATE/SHARE and without writing CTEs.
pub fn read_only(stmt: &SelectStmt) -> bool {
    if !stmt.locking_clause.is_empty() {
        return false;
    }

    let cte_writes = stmt.with_clause.as_ref().is_some_and(|with| {
        with.ctes.iter().any(|cte| match cte.node {
            Some(NodeEnum::CommonTableExpr(ref expr)) => matches!(
                expr.ctequery.as_ref().and_then(|query| query.node.as_ref()),
                Some(NodeEnum::InsertStmt(_))
                    | Some(NodeEnum::UpdateStmt(_))
                    | Some(NodeEnum::DeleteStmt(_))
            ),
            _ => false,
        })
    });

    let sides = [&stmt.larg, &stmt.rarg]
        .into_iter()
        .flatten()
        .all(|side| read_only(side));

    !cte_writes && sides
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_classify() {
        let classifier = Classifier::new(16);
        for (sql, read) in [
            ("SELECT * FROM users WHERE id = ?", true),
            ("/*+ route(a) */ select 1", true),
            ("SELECT 1 UNION SELECT 2", true),
            ("SHOW search_path", true),
            ("SELECT * FROM users FOR UPDATE", false),
            ("WITH d AS (DELETE FROM users RETURNING *) SELECT * FROM d", false),
            ("INSERT INTO users (id) VALUES (?)", false),
            ("UPDATE users SET a = 1", false),
            ("CALL refresh()", false),
            ("SELECT 1; DELETE FROM users", false),
            ("not sql", false),
            ("", false),
        ] {
            assert_eq!(classifier.is_query(sql), read, "{}", sql);
        }
        assert_eq!(classifier.len(), 12);
    }

    #[test]
    fn test_cache_bounded() {
        let classifier = Classifier::new(2);
        classifier.is_query("SELECT 1");
        classifier.is_query("SELECT 2");
        classifier.is_query("SELECT 3");
        assert_eq!(classifier.len(), 2);
    }
}
