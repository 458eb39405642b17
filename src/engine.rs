use std::sync::Arc;

use log::{debug, info};

use crate::{
    config::EngineConfig,
    error::{EngineError, Result},
    scheduling::{Task, TiredExecutor, WorkerReport},
    storage::{SharedMatrix, SharedVector},
    tree::{ExpressionTree, NodeKind},
};

type Operand<'a> = &'a [Vec<f64>];

/// Evaluates expression trees one resolvable node at a time on a tired worker pool.
///
/// Every node is computed over two matrix slots: its operands are loaded into them, one
/// task per row of the left slot is submitted to the pool and the left slot is read back
/// as the node's result.
#[derive(Debug)]
pub struct LinearAlgebraEngine {
    left: Arc<SharedMatrix>,
    right: Arc<SharedMatrix>,
    executor: TiredExecutor,
    report: Option<WorkerReport>,
}

impl LinearAlgebraEngine {
    /// Creates a new `LinearAlgebraEngine` and starts its worker pool.
    ///
    /// # Returns
    /// The engine or an `InvalidArgument` error for a zero thread count.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let executor = TiredExecutor::with_rng(config.threads, &mut config.rng())?;

        Ok(Self {
            left: Arc::new(SharedMatrix::new()),
            right: Arc::new(SharedMatrix::new()),
            executor,
            report: None,
        })
    }

    pub fn with_threads(threads: usize) -> Result<Self> {
        Self::new(EngineConfig::new(threads))
    }

    /// Resolves `root` until it's a single matrix.
    ///
    /// The worker report is recorded and the pool is shut down once the evaluation is
    /// over, whether it succeeded or not, so an engine runs at most one tree.
    ///
    /// # Arguments
    /// * `root` - The tree to evaluate.
    ///
    /// # Returns
    /// The resolved tree, an `InvalidState` error if the pool was already shut down, or
    /// the first error hit while evaluating a node.
    pub fn run<T: ExpressionTree>(&mut self, mut root: T) -> Result<T> {
        if self.executor.is_shut_down() {
            return Err(EngineError::InvalidState(
                "the engine's worker pool has been shut down".into(),
            ));
        }

        let outcome = self.evaluate(&mut root);

        let report = self.executor.worker_report();
        info!("worker report:\n{report}");
        self.report = Some(report);
        self.executor.shutdown();

        outcome.map(|()| root)
    }

    /// Computes a single node whose operands are all matrices.
    ///
    /// On success the result can be read back from the left slot; the node itself isn't
    /// modified.
    ///
    /// # Returns
    /// An `InvalidArgument` error for unresolved or mismatched operands, or a
    /// `PoolCrashed` error if a row task failed.
    pub fn load_and_compute<T: ExpressionTree>(&self, node: &T) -> Result<()> {
        let kind = node.node_kind();

        let operands = node
            .children()
            .iter()
            .map(|child| {
                child.matrix().ok_or_else(|| {
                    EngineError::invalid(format!(
                        "operand of {kind} is an unresolved {} node",
                        child.node_kind()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(operator = kind.symbol(), operands = operands.len(); "evaluating node");

        let tasks = match kind {
            NodeKind::Add => {
                let (lhs, rhs) = binary(kind, &operands)?;
                self.left.load_row_major(lhs)?;
                self.right.load_row_major(rhs)?;
                self.add_tasks()?
            }
            NodeKind::Multiply => {
                let (lhs, rhs) = binary(kind, &operands)?;
                self.left.load_row_major(lhs)?;
                self.right.load_column_major(rhs)?;
                self.multiply_tasks()?
            }
            NodeKind::Transpose => {
                self.left.load_row_major(unary(kind, &operands)?)?;
                self.row_tasks(SharedVector::transpose)
            }
            NodeKind::Negate => {
                self.left.load_row_major(unary(kind, &operands)?)?;
                self.row_tasks(SharedVector::negate)
            }
            NodeKind::Matrix => {
                let grid = node.matrix().unwrap_or_default();
                self.left.load_row_major(grid)?;
                Vec::new()
            }
        };

        debug!(operator = kind.symbol(), tasks = tasks.len(); "submitting batch");
        self.executor.submit_all(tasks)
    }

    /// The report recorded by the last run, or a live one if nothing ran yet.
    pub fn worker_report(&self) -> WorkerReport {
        self.report
            .clone()
            .unwrap_or_else(|| self.executor.worker_report())
    }

    pub fn executor(&self) -> &TiredExecutor {
        &self.executor
    }

    fn evaluate<T: ExpressionTree>(&self, root: &mut T) -> Result<()> {
        while !root.is_resolved() {
            let node = root.find_resolvable();
            node.rebalance_associative();

            let node = node.find_resolvable();
            self.load_and_compute(node)?;
            node.resolve(self.left.read_row_major()?);
        }

        Ok(())
    }

    fn add_tasks(&self) -> Result<Vec<Task>> {
        let left = self.left.vectors();
        let right = self.right.vectors();

        if left.len() != right.len() {
            return Err(EngineError::DimensionMismatch {
                expected: left.len(),
                found: right.len(),
            });
        }

        if let (Some(l), Some(r)) = (left.first(), right.first()) {
            if l.len() != r.len() {
                return Err(EngineError::DimensionMismatch {
                    expected: l.len(),
                    found: r.len(),
                });
            }
        }

        Ok(left
            .iter()
            .zip(right.iter())
            .map(|(dst, src)| {
                let dst = Arc::clone(dst);
                let src = Arc::clone(src);
                Box::new(move || dst.add(&src)) as Task
            })
            .collect())
    }

    fn multiply_tasks(&self) -> Result<Vec<Task>> {
        let rows = self.left.vectors();
        let width = rows.first().map_or(0, |row| row.len());

        if !rows.is_empty() {
            match self.right.vectors().first() {
                None if width > 0 => {
                    return Err(EngineError::invalid("can't multiply by an empty matrix"));
                }
                Some(column) if column.len() != width => {
                    return Err(EngineError::DimensionMismatch {
                        expected: width,
                        found: column.len(),
                    });
                }
                _ => {}
            }
        }

        Ok(rows
            .iter()
            .map(|row| {
                let row = Arc::clone(row);
                let right = Arc::clone(&self.right);
                Box::new(move || row.vec_mat_mul(&right)) as Task
            })
            .collect())
    }

    fn row_tasks(&self, op: fn(&SharedVector)) -> Vec<Task> {
        self.left
            .vectors()
            .iter()
            .map(|row| {
                let row = Arc::clone(row);
                Box::new(move || {
                    op(&row);
                    Ok(())
                }) as Task
            })
            .collect()
    }
}

fn binary<'a>(kind: NodeKind, operands: &[Operand<'a>]) -> Result<(Operand<'a>, Operand<'a>)> {
    match operands {
        [lhs, rhs] => Ok((*lhs, *rhs)),
        _ => Err(EngineError::invalid(format!(
            "{kind} expects 2 operands, got {}",
            operands.len()
        ))),
    }
}

fn unary<'a>(kind: NodeKind, operands: &[Operand<'a>]) -> Result<Operand<'a>> {
    match operands {
        [operand] => Ok(*operand),
        _ => Err(EngineError::invalid(format!(
            "{kind} expects 1 operand, got {}",
            operands.len()
        ))),
    }
}
