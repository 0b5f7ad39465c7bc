//! Route rules.
use super::{Error, Expression, ShardValues};

/// Expression computing a shard index from shard column values.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRule {
    expression: Expression,
}

impl RouteRule {
    /// Compile a rule. It must reference at least one shard column.
    pub fn new(text: &str) -> Result<Self, Error> {
        if text.trim().is_empty() {
            return Err(Error::invalid_rule(text, "rule is empty"));
        }

        let expression = Expression::compile(text)?;

        if expression.columns().is_empty() {
            return Err(Error::invalid_rule(
                text,
                "rule doesn't reference any ${column}",
            ));
        }

        Ok(Self { expression })
    }

    /// Compile a rule that declares its shard columns explicitly.
    /// The declaration must match the placeholders used in the rule.
    pub fn declared(text: &str, columns: &[String]) -> Result<Self, Error> {
        let rule = Self::new(text)?;

        let mut declared = columns.to_vec();
        let mut found = rule.columns().to_vec();
        declared.sort();
        declared.dedup();
        found.sort();

        if declared != found {
            return Err(Error::invalid_rule(
                text,
                format!(
                    "declared columns [{}] don't match rule columns [{}]",
                    declared.join(", "),
                    found.join(", ")
                ),
            ));
        }

        Ok(rule)
    }

    /// Shard columns this rule depends on.
    pub fn columns(&self) -> &[String] {
        self.expression.columns()
    }

    /// Rule text.
    pub fn text(&self) -> &str {
        self.expression.text()
    }

    /// Values contain every column this rule needs.
    pub fn applicable(&self, values: &ShardValues) -> bool {
        self.columns().iter().all(|column| values.contains_key(column))
    }

    /// Rule references the column.
    pub fn uses(&self, column: &str) -> bool {
        self.columns().iter().any(|c| c == column)
    }

    /// Compute the shard index.
    pub fn evaluate(&self, values: &ShardValues) -> Result<i64, Error> {
        self.expression.evaluate(values)
    }
}

/// Pick the first applicable rule, in registration order.
pub fn select<'a>(rules: &'a [RouteRule], values: &ShardValues) -> Option<&'a RouteRule> {
    rules.iter().find(|rule| rule.applicable(values))
}
