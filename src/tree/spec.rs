use serde::{Deserialize, Serialize};

use super::ComputationNode;
use crate::{error::EngineError, storage::Grid};

/// The serialized form of an expression.
///
/// A bare grid is a matrix leaf, anything else names an operator symbol and its operands:
///
/// ```json
/// { "operator": "*", "operands": [[[1, 2]], { "operator": "T", "operands": [[[3, 4]]] }] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExprSpec {
    Matrix(Grid),
    Operator {
        operator: String,
        operands: Vec<ExprSpec>,
    },
}

impl TryFrom<ExprSpec> for ComputationNode {
    type Error = EngineError;

    fn try_from(spec: ExprSpec) -> Result<Self, Self::Error> {
        match spec {
            ExprSpec::Matrix(grid) => Ok(ComputationNode::matrix(grid)),
            ExprSpec::Operator { operator, operands } => {
                let children = operands
                    .into_iter()
                    .map(ComputationNode::try_from)
                    .collect::<Result<_, _>>()?;

                ComputationNode::from_symbol(&operator, children)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ExpressionTree, NodeKind};

    #[test]
    fn test_parse_nested_expression() {
        let spec: ExprSpec = serde_json::from_str(
            r#"{ "operator": "+", "operands": [
                [[1, 2], [3, 4]],
                { "operator": "-", "operands": [[[5, 6], [7, 8]]] }
            ] }"#,
        )
        .unwrap();

        let tree = ComputationNode::try_from(spec).unwrap();

        assert_eq!(tree.node_kind(), NodeKind::Add);
        assert_eq!(tree.children()[0].matrix(), Some(&[vec![1., 2.], vec![3., 4.]][..]));
        assert_eq!(tree.children()[1].node_kind(), NodeKind::Negate);
    }

    #[test]
    fn test_bare_grid_is_a_leaf() {
        let spec: ExprSpec = serde_json::from_str("[[1.5]]").unwrap();
        assert_eq!(spec, ExprSpec::Matrix(vec![vec![1.5]]));
        assert!(ComputationNode::try_from(spec).unwrap().is_resolved());
    }

    #[test]
    fn test_bad_operators_are_rejected() {
        let unknown = ExprSpec::Operator {
            operator: "%".into(),
            operands: vec![ExprSpec::Matrix(vec![vec![1.]])],
        };
        assert!(ComputationNode::try_from(unknown).unwrap_err().is_invalid_argument());

        let lonely = ExprSpec::Operator {
            operator: "*".into(),
            operands: vec![ExprSpec::Matrix(vec![vec![1.]])],
        };
        assert!(ComputationNode::try_from(lonely).is_err());
    }
}
