//! WHERE clause of a SELECT, UPDATE or DELETE.
//!
//! Flattens AND-connected equality and IN comparisons into a list of
//! predicates. OR and NOT branches can't narrow the set of shards,
//! so they are skipped.

use pg_query::{
    protobuf::{AExprKind, BoolExprType},
    Node, NodeEnum,
};

use super::{Column, Key};

/// Comparison of a column with one or more keys.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate<'a> {
    pub column: Column<'a>,
    /// One key for `=`, one per member for `IN`.
    pub keys: Vec<Key>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause<'a> {
    predicates: Vec<Predicate<'a>>,
}

impl<'a> WhereClause<'a> {
    /// Extract predicates from the WHERE clause, if there is one.
    pub fn new(where_clause: &'a Option<Box<Node>>) -> Option<Self> {
        let root = where_clause.as_deref()?;
        let mut predicates = vec![];
        Self::visit(root, &mut predicates);
        Some(Self { predicates })
    }

    pub fn predicates(&self) -> &[Predicate<'a>] {
        &self.predicates
    }

    fn visit(node: &'a Node, predicates: &mut Vec<Predicate<'a>>) {
        match node.node {
            Some(NodeEnum::BoolExpr(ref expr)) => {
                if expr.boolop() == BoolExprType::AndExpr {
                    for arg in &expr.args {
                        Self::visit(arg, predicates);
                    }
                }
            }

            Some(NodeEnum::AExpr(ref expr)) => {
                if !Self::is_equality(&expr.name) {
                    return;
                }
                let (Some(left), Some(right)) = (expr.lexpr.as_deref(), expr.rexpr.as_deref())
                else {
                    return;
                };

                match expr.kind() {
                    AExprKind::AexprOp => {
                        // col = value, or value = col.
                        let predicate = Self::comparison(left, right)
                            .or_else(|| Self::comparison(right, left));
                        predicates.extend(predicate);
                    }

                    AExprKind::AexprIn => {
                        if let Some(NodeEnum::List(ref list)) = right.node {
                            predicates.extend(Self::list(left, &list.items));
                        }
                    }

                    // col = ANY(ARRAY[...])
                    AExprKind::AexprOpAny => {
                        if let Some(NodeEnum::AArrayExpr(ref array)) = right.node {
                            predicates.extend(Self::list(left, &array.elements));
                        }
                    }

                    _ => (),
                }
            }

            _ => (),
        }
    }

    fn is_equality(name: &[Node]) -> bool {
        matches!(
            name.first().and_then(|node| node.node.as_ref()),
            Some(NodeEnum::String(string)) if string.sval == "="
        )
    }

    fn comparison(column: &'a Node, value: &'a Node) -> Option<Predicate<'a>> {
        let column = Column::try_from(column).ok()?;
        let key = Key::from_node(value)?;
        Some(Predicate {
            column,
            keys: vec![key],
        })
    }

    /// Every member must be a key, otherwise the list can't be used.
    fn list(column: &'a Node, items: &'a [Node]) -> Option<Predicate<'a>> {
        let column = Column::try_from(column).ok()?;
        let keys = items
            .iter()
            .map(Key::from_node)
            .collect::<Option<Vec<_>>>()?;
        Some(Predicate { column, keys })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::Value;

    fn predicates(query: &str) -> Vec<(String, Vec<Key>)> {
        let ast = pg_query::parse(query).unwrap();
        let stmt = ast.protobuf.stmts[0].stmt.as_ref().unwrap();
        let where_clause = match stmt.node {
            Some(NodeEnum::SelectStmt(ref stmt)) => &stmt.where_clause,
            Some(NodeEnum::UpdateStmt(ref stmt)) => &stmt.where_clause,
            Some(NodeEnum::DeleteStmt(ref stmt)) => &stmt.where_clause,
            _ => panic!("no where clause"),
        };
        WhereClause::new(where_clause)
            .unwrap()
            .predicates()
            .iter()
            .map(|p| (p.column.to_string(), p.keys.clone()))
            .collect()
    }

    #[test]
    fn test_and_chain() {
        let result = predicates(
            "SELECT * FROM users WHERE id = 1 AND 'bob' = users.name AND age > 5 AND email IN ($1, $2)",
        );
        assert_eq!(
            result,
            vec![
                ("id".into(), vec![Key::Constant(Value::Integer(1))]),
                (
                    "users.name".into(),
                    vec![Key::Constant(Value::Text("bob".into()))]
                ),
                ("email".into(), vec![Key::Parameter(1), Key::Parameter(2)]),
            ]
        );
    }

    #[test]
    fn test_or_not_skipped() {
        let result = predicates(
            "DELETE FROM users WHERE (id = 1 OR id = 2) AND NOT tenant = 3 AND region = $3",
        );
        assert_eq!(result, vec![("region".into(), vec![Key::Parameter(3)])]);
    }

    #[test]
    fn test_any_and_casts() {
        let result = predicates("SELECT * FROM t WHERE id = ANY(ARRAY[1, 2]) AND k = '7'::bigint");
        assert_eq!(
            result,
            vec![
                (
                    "id".into(),
                    vec![
                        Key::Constant(Value::Integer(1)),
                        Key::Constant(Value::Integer(2))
                    ]
                ),
                ("k".into(), vec![Key::Constant(Value::Text("7".into()))]),
            ]
        );
    }

    #[test]
    fn test_not_in_ignored() {
        let result = predicates("UPDATE t SET a = 1 WHERE id NOT IN (1, 2) AND b = now()");
        assert!(result.is_empty());
    }
}
