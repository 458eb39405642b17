pub mod config;
pub mod engine;
pub mod error;
pub mod scheduling;
pub mod storage;
pub mod tree;

pub use config::EngineConfig;
pub use engine::LinearAlgebraEngine;
pub use error::{EngineError, Result};
pub use scheduling::{Task, TiredExecutor, Worker, WorkerReport, WorkerStats};
pub use storage::{Grid, Orientation, SharedMatrix, SharedVector};
pub use tree::{ComputationNode, ExprSpec, ExpressionTree, NodeKind};
