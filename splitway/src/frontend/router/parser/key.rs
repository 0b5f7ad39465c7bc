//! Sharding key in a query.
use pg_query::{
    protobuf::{a_const::Val, AConst},
    Node, NodeEnum,
};

use super::Error;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    /// Parameter, like $1, $2, referring to a value
    /// bound by the caller.
    Parameter(usize),
    /// A constant from the query text.
    Constant(Value),
    /// NULL literal.
    Null,
}

impl Key {
    /// Extract a key from an expression node. Expressions that aren't
    /// constants or parameters (function calls, sub-selects) don't produce one.
    pub fn from_node(node: &Node) -> Option<Self> {
        match node.node {
            Some(NodeEnum::AConst(ref aconst)) => Some(Self::constant(aconst)),
            Some(NodeEnum::ParamRef(ref param)) if param.number > 0 => {
                Some(Self::Parameter(param.number as usize))
            }
            Some(NodeEnum::TypeCast(ref cast)) => cast.arg.as_deref().and_then(Self::from_node),
            _ => None,
        }
    }

    fn constant(aconst: &AConst) -> Self {
        if aconst.isnull {
            return Self::Null;
        }

        match aconst.val {
            Some(Val::Ival(ref int)) => Self::Constant(Value::Integer(int.ival as i64)),
            Some(Val::Sval(ref string)) => Self::Constant(Value::Text(string.sval.clone())),
            Some(Val::Boolval(ref boolean)) => Self::Constant(Value::Bool(boolean.boolval)),
            // Integers that don't fit into 32 bits are stored as floats.
            Some(Val::Fval(ref float)) => Self::Constant(Value::guess(&float.fval)),
            Some(Val::Bsval(ref bits)) => Self::Constant(Value::Text(bits.bsval.clone())),
            None => Self::Null,
        }
    }

    /// Resolve the key against bound parameters.
    /// NULL never matches a shard, so it resolves to nothing.
    pub fn value(&self, params: &[Value]) -> Result<Option<Value>, Error> {
        match self {
            Self::Constant(value) => Ok(Some(value.clone())),
            Self::Parameter(pos) => match params.get(pos - 1) {
                Some(Value::Null) => Ok(None),
                Some(value) => Ok(Some(value.clone())),
                None => Err(Error::MissingParameter(*pos)),
            },
            Self::Null => Ok(None),
        }
    }
}
