//! Sharding errors.
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("invalid route rule \"{rule}\": {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("rule evaluation: {0}")]
    RuleEvaluation(String),

    #[error("no route rule of \"{table}\" matches columns [{}]", columns.join(", "))]
    NoRouteRule { table: String, columns: Vec<String> },

    #[error("\"{name}\" doesn't match naming template \"{template}\"")]
    InvalidName { name: String, template: String },

    #[error("invalid naming template \"{0}\"")]
    InvalidTemplate(String),
}

impl Error {
    pub(crate) fn invalid_rule(rule: &str, reason: impl ToString) -> Self {
        Self::InvalidRule {
            rule: rule.to_owned(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn evaluation(reason: impl ToString) -> Self {
        Self::RuleEvaluation(reason.to_string())
    }
}
