use std::fmt::Display;

use pg_query::{protobuf::RangeVar, Node, NodeEnum, NodeRef, ParseResult};

/// Table name in a query.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Table<'a> {
    /// Table name.
    pub name: &'a str,
    /// Schema name, if specified.
    pub schema: Option<&'a str>,
    /// Alias, if specified.
    pub alias: Option<&'a str>,
}

impl Display for Table<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(schema) = self.schema {
            write!(f, "{}.{}", schema, self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

impl<'a> Table<'a> {
    /// Name used to qualify columns of this table.
    pub fn matches(&self, qualifier: &str) -> bool {
        match self.alias {
            Some(alias) => alias == qualifier,
            None => self.name == qualifier,
        }
    }

    /// All tables referenced by FROM/USING items, including both
    /// sides of joins. Sub-selects and functions are skipped.
    pub fn from_items(nodes: &'a [Node]) -> Vec<Table<'a>> {
        let mut tables = vec![];
        for node in nodes {
            Self::collect(node, &mut tables);
        }
        tables
    }

    /// Every table in the statement, wherever it appears: FROM items,
    /// sub-selects, CTEs and WHERE sublinks. Outer tables come first.
    pub fn walk(ast: &'a ParseResult) -> Vec<Table<'a>> {
        ast.protobuf
            .nodes()
            .into_iter()
            .filter_map(|(node, ..)| match node {
                NodeRef::RangeVar(range_var) => Some(range_var.into()),
                _ => None,
            })
            .collect()
    }

    fn collect(node: &'a Node, tables: &mut Vec<Table<'a>>) {
        match node.node {
            Some(NodeEnum::RangeVar(ref range_var)) => tables.push(range_var.into()),
            Some(NodeEnum::JoinExpr(ref join)) => {
                for side in [&join.larg, &join.rarg].into_iter().flatten() {
                    Self::collect(side, tables);
                }
            }
            _ => (),
        }
    }
}

impl<'a> TryFrom<&'a Node> for Table<'a> {
    type Error = ();

    fn try_from(value: &'a Node) -> Result<Self, Self::Error> {
        if let Some(NodeEnum::RangeVar(range_var)) = &value.node {
            return Ok(range_var.into());
        }

        Err(())
    }
}

impl<'a> From<&'a RangeVar> for Table<'a> {
    fn from(range_var: &'a RangeVar) -> Self {
        Self {
            name: range_var.relname.as_str(),
            schema: if !range_var.schemaname.is_empty() {
                Some(range_var.schemaname.as_str())
            } else {
                None
            },
            alias: range_var
                .alias
                .as_ref()
                .map(|alias| alias.aliasname.as_str()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_items() {
        let ast = pg_query::parse(
            "SELECT * FROM users u JOIN orders ON orders.user_id = u.id, public.items",
        )
        .unwrap();
        let stmt = ast.protobuf.stmts[0].stmt.as_ref().unwrap();
        let Some(NodeEnum::SelectStmt(ref select)) = stmt.node else {
            panic!("not a select");
        };

        let tables = Table::from_items(&select.from_clause);
        assert_eq!(
            tables,
            vec![
                Table {
                    name: "users",
                    schema: None,
                    alias: Some("u"),
                },
                Table {
                    name: "orders",
                    schema: None,
                    alias: None,
                },
                Table {
                    name: "items",
                    schema: Some("public"),
                    alias: None,
                },
            ]
        );
        assert!(tables[0].matches("u"));
        assert!(!tables[0].matches("users"));
    }

    #[test]
    fn test_walk() {
        let ast = pg_query::parse(
            "WITH recent AS (SELECT * FROM orders) \
             SELECT * FROM (SELECT * FROM users) u \
             WHERE u.id IN (SELECT user_id FROM recent JOIN items ON true)",
        )
        .unwrap();

        let mut names = Table::walk(&ast)
            .into_iter()
            .map(|table| table.name)
            .collect::<Vec<_>>();
        names.sort();
        assert_eq!(names, vec!["items", "orders", "recent", "users"]);
    }
}
