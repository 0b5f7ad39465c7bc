//! Column name reference.

use pg_query::{protobuf::String as PgQueryString, Node, NodeEnum};
use std::fmt::{Display, Formatter, Result as FmtResult};

use super::Table;

/// Column name extracted from a query.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Column<'a> {
    /// Column name.
    pub name: &'a str,
    /// Table name or alias qualifying the column.
    pub table: Option<&'a str>,
}

impl<'a> Column<'a> {
    /// Column belongs to the table, or is unqualified.
    pub fn belongs_to(&self, table: &Table<'_>) -> bool {
        match self.table {
            Some(qualifier) => table.matches(qualifier),
            None => true,
        }
    }
}

impl Display for Column<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.table {
            Some(table) => write!(f, "{}.{}", table, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl<'a> TryFrom<&'a Node> for Column<'a> {
    type Error = ();

    fn try_from(value: &'a Node) -> Result<Self, Self::Error> {
        Column::try_from(&value.node)
    }
}

impl<'a> TryFrom<&'a Option<NodeEnum>> for Column<'a> {
    type Error = ();

    fn try_from(value: &'a Option<NodeEnum>) -> Result<Self, Self::Error> {
        fn from_node(node: &Node) -> Option<&str> {
            if let Some(NodeEnum::String(PgQueryString { sval })) = &node.node {
                Some(sval.as_str())
            } else {
                None
            }
        }

        // schema.table.column, table.column or column.
        fn from_slice(nodes: &[Node]) -> Result<Column<'_>, ()> {
            let (name, qualifiers) = nodes.split_last().ok_or(())?;
            if qualifiers.len() > 2 {
                return Err(());
            }
            let name = from_node(name).ok_or(())?;
            let table = match qualifiers.last() {
                Some(node) => Some(from_node(node).ok_or(())?),
                None => None,
            };

            Ok(Column { name, table })
        }

        match value {
            Some(NodeEnum::ResTarget(res_target)) => Ok(Self {
                name: res_target.name.as_str(),
                ..Default::default()
            }),

            Some(NodeEnum::ColumnRef(column_ref)) => from_slice(&column_ref.fields),

            // Casts on the column side: col::text = '1'.
            Some(NodeEnum::TypeCast(cast)) => match cast.arg {
                Some(ref arg) => Column::try_from(&arg.node),
                None => Err(()),
            },

            _ => Err(()),
        }
    }
}
