//! Routing hints.
//!
//! Hints name the datasources a statement may run on. They come from
//! the execution context of the call or from a comment in the statement:
//!
//! ```sql
//! /*+ route(replica_1, replica_2) */ SELECT * FROM users
//! ```
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ROUTE: Regex = Regex::new(r"/\*\+\s*route\s*\(([^)]*)\)\s*\*/").unwrap();
}

/// Datasources a statement is allowed to run on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hints {
    datasources: Vec<String>,
}

impl Hints {
    pub fn new<S: ToString>(datasources: impl IntoIterator<Item = S>) -> Self {
        let mut hints = Self::default();
        for datasource in datasources {
            hints.push(&datasource.to_string());
        }
        hints
    }

    pub fn push(&mut self, datasource: &str) {
        let datasource = datasource.trim();
        if !datasource.is_empty() && !self.datasources.iter().any(|d| d == datasource) {
            self.datasources.push(datasource.to_owned());
        }
    }

    pub fn clear(&mut self) {
        self.datasources.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.datasources.is_empty()
    }

    pub fn datasources(&self) -> &[String] {
        &self.datasources
    }

    /// Hint embedded in the statement text.
    pub fn extract(sql: &str) -> Option<Self> {
        let captures = ROUTE.captures(sql)?;
        let hints = Self::new(captures.get(1)?.as_str().split(','));

        if hints.is_empty() {
            None
        } else {
            Some(hints)
        }
    }
}
