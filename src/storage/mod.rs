mod matrix;
mod vector;

pub use matrix::SharedMatrix;
pub use vector::{Orientation, SharedVector};

/// A row-major grid of numbers, the exchange format between the storage and its callers.
pub type Grid = Vec<Vec<f64>>;
