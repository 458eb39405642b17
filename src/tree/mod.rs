mod node;
mod spec;

use std::fmt;

pub use node::ComputationNode;
pub use spec::ExprSpec;

use crate::{
    error::{EngineError, Result},
    storage::Grid,
};

/// The operation a tree node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Add,
    Multiply,
    Transpose,
    Negate,
    Matrix,
}

impl NodeKind {
    /// Maps an operator symbol to its kind.
    ///
    /// # Arguments
    /// * `symbol` - One of `+`, `*`, `-` or `T`.
    ///
    /// # Returns
    /// The kind or an `InvalidArgument` error for an unknown symbol.
    pub fn from_symbol(symbol: &str) -> Result<Self> {
        match symbol.trim() {
            "+" => Ok(Self::Add),
            "*" => Ok(Self::Multiply),
            "-" => Ok(Self::Negate),
            "T" => Ok(Self::Transpose),
            other => Err(EngineError::invalid(format!("unknown operator {other:?}"))),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Multiply => "*",
            Self::Negate => "-",
            Self::Transpose => "T",
            Self::Matrix => "matrix",
        }
    }

    /// Whether a run of this operator can be regrouped without changing the result.
    pub fn is_associative(self) -> bool {
        matches!(self, Self::Add | Self::Multiply)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// The expression tree driven by the engine.
///
/// A node is either a `Matrix` leaf holding a row-major grid or an operator whose children
/// are its operands, in order.
pub trait ExpressionTree: Sized {
    fn node_kind(&self) -> NodeKind;

    /// The operands of this node, empty for a leaf.
    fn children(&self) -> &[Self];

    /// The grid held by a `Matrix` leaf, `None` for operators.
    fn matrix(&self) -> Option<&[Vec<f64>]>;

    /// Finds the next node whose operands are all matrices.
    ///
    /// # Returns
    /// That node, or `self` if it already qualifies or is a leaf.
    fn find_resolvable(&mut self) -> &mut Self;

    /// Regroups the run of the same associative operator rooted at this node.
    ///
    /// Calling it on a node that isn't the root of such a run leaves the tree untouched.
    fn rebalance_associative(&mut self);

    /// Replaces this node and its subtree with a `Matrix` leaf holding `grid`.
    fn resolve(&mut self, grid: Grid);

    fn is_resolved(&self) -> bool {
        self.node_kind() == NodeKind::Matrix
    }
}
