use std::mem;

use super::{ExpressionTree, NodeKind};
use crate::{
    error::{EngineError, Result},
    storage::Grid,
};

/// An owned expression tree node.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputationNode {
    kind: NodeKind,
    children: Vec<ComputationNode>,
    grid: Option<Grid>,
}

impl ComputationNode {
    /// Creates a new `Matrix` leaf.
    pub fn matrix(grid: Grid) -> Self {
        Self {
            kind: NodeKind::Matrix,
            children: Vec::new(),
            grid: Some(grid),
        }
    }

    /// Creates a new operator node.
    ///
    /// # Arguments
    /// * `kind` - The operator, `Matrix` leaves are built with `ComputationNode::matrix`.
    /// * `children` - The operands in order, at least two for `Add` and `Multiply`, exactly
    ///   one for `Transpose` and `Negate`.
    ///
    /// # Returns
    /// The node or an `InvalidArgument` error if the operand count doesn't fit the operator.
    pub fn operator(kind: NodeKind, children: Vec<Self>) -> Result<Self> {
        let valid = match kind {
            NodeKind::Add | NodeKind::Multiply => children.len() >= 2,
            NodeKind::Transpose | NodeKind::Negate => children.len() == 1,
            NodeKind::Matrix => false,
        };

        if !valid {
            return Err(EngineError::invalid(format!(
                "operator {kind} can't take {} operand(s)",
                children.len()
            )));
        }

        Ok(Self::branch(kind, children))
    }

    /// Creates a new operator node from its symbol, see `NodeKind::from_symbol`.
    pub fn from_symbol(symbol: &str, children: Vec<Self>) -> Result<Self> {
        Self::operator(NodeKind::from_symbol(symbol)?, children)
    }

    /// Consumes a resolved tree.
    ///
    /// # Returns
    /// The root's grid or an `InvalidState` error if the root is still an operator.
    pub fn into_matrix(self) -> Result<Grid> {
        self.grid.ok_or_else(|| {
            EngineError::InvalidState(format!("root is an unresolved {} node", self.kind))
        })
    }

    fn branch(kind: NodeKind, children: Vec<Self>) -> Self {
        Self {
            kind,
            children,
            grid: None,
        }
    }

    /// The child indices leading to the leftmost node whose operands are all leaves.
    fn resolvable_path(&self) -> Vec<usize> {
        let mut path = Vec::new();
        let mut node = self;

        while let Some(i) = node.children.iter().position(|c| !c.is_resolved()) {
            path.push(i);
            node = &node.children[i];
        }

        path
    }
}

impl ExpressionTree for ComputationNode {
    fn node_kind(&self) -> NodeKind {
        self.kind
    }

    fn children(&self) -> &[Self] {
        &self.children
    }

    fn matrix(&self) -> Option<&[Vec<f64>]> {
        self.grid.as_deref()
    }

    fn find_resolvable(&mut self) -> &mut Self {
        let mut node = self;

        for i in node.resolvable_path() {
            node = &mut node.children[i];
        }

        node
    }

    fn rebalance_associative(&mut self) {
        let kind = self.kind;

        if !kind.is_associative() {
            return;
        }

        let mut operands = Vec::with_capacity(self.children.len());
        for child in mem::take(&mut self.children) {
            flatten(kind, child, &mut operands);
        }

        if operands.len() <= 2 {
            self.children = operands;
            return;
        }

        *self = balance(kind, operands);
    }

    fn resolve(&mut self, grid: Grid) {
        *self = Self::matrix(grid);
    }
}

fn flatten(kind: NodeKind, node: ComputationNode, operands: &mut Vec<ComputationNode>) {
    if node.kind != kind {
        operands.push(node);
        return;
    }

    for child in node.children {
        flatten(kind, child, operands);
    }
}

/// Groups `operands` into a balanced binary tree of `kind` nodes, keeping their order.
fn balance(kind: NodeKind, mut operands: Vec<ComputationNode>) -> ComputationNode {
    if operands.len() > 1 {
        let right = operands.split_off(operands.len().div_ceil(2));
        return ComputationNode::branch(kind, vec![balance(kind, operands), balance(kind, right)]);
    }

    operands
        .pop()
        .unwrap_or_else(|| ComputationNode::matrix(Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(x: f64) -> ComputationNode {
        ComputationNode::matrix(vec![vec![x]])
    }

    fn op(kind: NodeKind, children: Vec<ComputationNode>) -> ComputationNode {
        ComputationNode::operator(kind, children).unwrap()
    }

    /// Renders the shape of a tree, leaves show their single value.
    fn shape(node: &ComputationNode) -> String {
        match node.matrix() {
            Some(grid) => grid[0][0].to_string(),
            None => {
                let operands: Vec<_> = node.children().iter().map(shape).collect();
                format!("({})", operands.join(node.node_kind().symbol()))
            }
        }
    }

    #[test]
    fn test_operator_arity() {
        assert!(ComputationNode::operator(NodeKind::Add, vec![leaf(1.)]).is_err());
        assert!(ComputationNode::operator(NodeKind::Negate, vec![leaf(1.), leaf(2.)]).is_err());
        assert!(ComputationNode::operator(NodeKind::Transpose, vec![]).is_err());
        assert!(ComputationNode::operator(NodeKind::Matrix, vec![]).is_err());
        assert!(ComputationNode::operator(NodeKind::Multiply, vec![leaf(1.), leaf(2.), leaf(3.)]).is_ok());
        assert!(ComputationNode::from_symbol("?", vec![leaf(1.)]).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_find_resolvable_is_leftmost_deepest() {
        let mut tree = op(
            NodeKind::Add,
            vec![
                op(NodeKind::Negate, vec![op(NodeKind::Transpose, vec![leaf(1.)])]),
                op(NodeKind::Negate, vec![leaf(2.)]),
            ],
        );

        let node = tree.find_resolvable();
        assert_eq!(node.node_kind(), NodeKind::Transpose);
        assert_eq!(shape(node), "(1)");
    }

    #[test]
    fn test_find_resolvable_on_ready_node_and_leaf() {
        let mut ready = op(NodeKind::Add, vec![leaf(1.), leaf(2.)]);
        assert_eq!(ready.find_resolvable().node_kind(), NodeKind::Add);

        let mut resolved = leaf(3.);
        assert!(resolved.find_resolvable().is_resolved());
    }

    #[test]
    fn test_rebalance_flattens_run_into_balanced_tree() {
        let mut tree = op(
            NodeKind::Add,
            vec![
                op(
                    NodeKind::Add,
                    vec![op(NodeKind::Add, vec![leaf(1.), leaf(2.)]), leaf(3.)],
                ),
                leaf(4.),
            ],
        );

        tree.rebalance_associative();
        assert_eq!(shape(&tree), "((1+2)+(3+4))");
    }

    #[test]
    fn test_rebalance_nary_node_keeps_order() {
        let mut tree = op(
            NodeKind::Multiply,
            (1..=5).map(|x| leaf(x as f64)).collect(),
        );

        tree.rebalance_associative();
        assert_eq!(shape(&tree), "(((1*2)*3)*(4*5))");
    }

    #[test]
    fn test_rebalance_is_idempotent() {
        let mut tree = op(NodeKind::Add, (1..=6).map(|x| leaf(x as f64)).collect());
        tree.rebalance_associative();
        let once = tree.clone();

        tree.rebalance_associative();
        assert_eq!(tree, once);
    }

    #[test]
    fn test_rebalance_stops_at_other_operators() {
        let product = op(NodeKind::Multiply, vec![leaf(2.), leaf(3.)]);
        let mut tree = op(NodeKind::Add, vec![leaf(1.), product]);
        let before = tree.clone();

        tree.rebalance_associative();
        assert_eq!(tree, before);

        let mut negation = op(NodeKind::Negate, vec![leaf(1.)]);
        negation.rebalance_associative();
        assert_eq!(shape(&negation), "(1)");
    }

    #[test]
    fn test_resolve_and_into_matrix() {
        let mut tree = op(NodeKind::Negate, vec![leaf(5.)]);
        assert!(matches!(
            tree.clone().into_matrix(),
            Err(EngineError::InvalidState(_))
        ));

        tree.find_resolvable().resolve(vec![vec![-5.]]);
        assert!(tree.is_resolved());
        assert!(tree.children().is_empty());
        assert_eq!(tree.into_matrix(), Ok(vec![vec![-5.]]));
    }
}
