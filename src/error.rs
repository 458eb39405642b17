use std::fmt;

/// The specific result type used across the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

/// All errors that can occur while storing, scheduling or evaluating matrices.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Invalid construction input or an unsupported operand combination.
    InvalidArgument(String),
    /// Two operands disagree on a length or row count.
    DimensionMismatch { expected: usize, found: usize },
    /// Two vectors were combined with different orientations.
    OrientationMismatch,
    /// An index fell outside `[0, len)`, or an empty matrix was queried.
    OutOfRange { index: usize, len: usize },
    /// A task was handed to a worker that can't accept it.
    InvalidState(String),
    /// A pool task failed, the pool can no longer complete batches.
    PoolCrashed(String),
}

impl EngineError {
    /// Whether this error belongs to the invalid argument family.
    ///
    /// # Returns
    /// `true` for `InvalidArgument`, `DimensionMismatch` and `OrientationMismatch`.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_) | Self::DimensionMismatch { .. } | Self::OrientationMismatch
        )
    }

    /// Shorthand for building an `InvalidArgument` error.
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::DimensionMismatch { expected, found } => {
                write!(f, "dimension mismatch: expected {expected}, found {found}")
            }
            Self::OrientationMismatch => f.write_str("orientation mismatch between vectors"),
            Self::OutOfRange { index, len } => {
                write!(f, "index {index} out of range for length {len}")
            }
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::PoolCrashed(msg) => write!(f, "worker pool crashed: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
