use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use super::SharedMatrix;
use crate::error::{EngineError, Result};

/// Source of the identity tokens that decide lock acquisition order.
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Whether a numeric sequence represents a row or a column of a logical matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Row,
    Column,
}

impl Orientation {
    /// Returns the opposite orientation.
    pub fn flipped(self) -> Self {
        match self {
            Self::Row => Self::Column,
            Self::Column => Self::Row,
        }
    }
}

#[derive(Debug)]
struct VectorData {
    values: Vec<f64>,
    orientation: Orientation,
}

/// A numeric vector guarded by its own read-write lock.
///
/// Every vector receives a unique, monotonically assigned id at construction. Operations
/// involving two distinct vectors always lock the one with the lower id first, no matter
/// which of the two is the receiver, so concurrent calls over the same pair can't wait on
/// each other in a cycle.
#[derive(Debug)]
pub struct SharedVector {
    id: u64,
    data: RwLock<VectorData>,
}

impl SharedVector {
    /// Creates a new `SharedVector`.
    ///
    /// # Arguments
    /// * `values` - The initial contents of the vector.
    /// * `orientation` - Whether the vector is a row or a column.
    ///
    /// # Returns
    /// A new `SharedVector` instance.
    pub fn new(values: Vec<f64>, orientation: Orientation) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            data: RwLock::new(VectorData {
                values,
                orientation,
            }),
        }
    }

    /// The identity token used for lock ordering.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Reads a single element.
    ///
    /// # Arguments
    /// * `index` - The position of the element.
    ///
    /// # Returns
    /// The element or an `OutOfRange` error.
    pub fn get(&self, index: usize) -> Result<f64> {
        let data = self.data.read();
        data.values
            .get(index)
            .copied()
            .ok_or(EngineError::OutOfRange {
                index,
                len: data.values.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.data.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn orientation(&self) -> Orientation {
        self.data.read().orientation
    }

    /// Copies the current contents of the vector.
    pub fn to_vec(&self) -> Vec<f64> {
        self.data.read().values.clone()
    }

    /// Flips the sign of every element in place.
    pub fn negate(&self) {
        self.data.write().values.iter_mut().for_each(|x| *x = -*x);
    }

    /// Flips the orientation tag.
    ///
    /// The buffer isn't touched, the same numbers are reinterpreted as a row or a column.
    pub fn transpose(&self) {
        let mut data = self.data.write();
        data.orientation = data.orientation.flipped();
    }

    /// Adds `other` into this vector element-wise.
    ///
    /// Adding a vector to itself doubles every element under a single write lock.
    ///
    /// # Arguments
    /// * `other` - The vector to add, it must share length and orientation.
    ///
    /// # Returns
    /// A `DimensionMismatch` or `OrientationMismatch` error, in which case
    /// neither vector is modified.
    pub fn add(&self, other: &SharedVector) -> Result<()> {
        if self.id == other.id {
            self.data.write().values.iter_mut().for_each(|x| *x += *x);
            return Ok(());
        }

        let (mut dst, src) = self.lock_write_read(other);

        if dst.values.len() != src.values.len() {
            return Err(EngineError::DimensionMismatch {
                expected: dst.values.len(),
                found: src.values.len(),
            });
        }

        if dst.orientation != src.orientation {
            return Err(EngineError::OrientationMismatch);
        }

        dst.values
            .iter_mut()
            .zip(&src.values)
            .for_each(|(acc, x)| *acc += x);

        Ok(())
    }

    /// Computes the dot product between a row and a column vector.
    ///
    /// # Arguments
    /// * `other` - A distinct vector of the opposite orientation and equal length.
    ///
    /// # Returns
    /// The scalar product, or an error if `other` is this same vector, shares its
    /// orientation or has a different length.
    pub fn dot(&self, other: &SharedVector) -> Result<f64> {
        if self.id == other.id {
            return Err(EngineError::invalid("a vector can't be dotted with itself"));
        }

        let (lhs, rhs) = self.lock_read_read(other);

        if lhs.values.len() != rhs.values.len() {
            return Err(EngineError::DimensionMismatch {
                expected: lhs.values.len(),
                found: rhs.values.len(),
            });
        }

        if lhs.orientation == rhs.orientation {
            return Err(EngineError::invalid(
                "dot product requires a row and a column vector",
            ));
        }

        Ok(dot_slices(&lhs.values, &rhs.values))
    }

    /// Replaces this row vector with the product `self × matrix`.
    ///
    /// The receiver stays write-locked for the whole computation while the matrix
    /// vectors are read-locked one at a time. If the matrix stores rows, the result is
    /// accumulated row by row, if it stores columns, every result element is the dot
    /// product against one column.
    ///
    /// # Arguments
    /// * `matrix` - The right hand side operand.
    ///
    /// # Returns
    /// An `InvalidArgument` error if the receiver is a column vector, the matrix is empty
    /// while the receiver isn't, or the matrix contains the receiver; a `DimensionMismatch`
    /// if the inner dimensions disagree.
    pub fn vec_mat_mul(&self, matrix: &SharedMatrix) -> Result<()> {
        let vectors = matrix.vectors();

        if vectors.iter().any(|v| v.id == self.id) {
            return Err(EngineError::invalid(
                "a vector can't multiply a matrix that contains it",
            ));
        }

        let mut data = self.data.write();

        if vectors.is_empty() {
            if data.values.is_empty() {
                return Ok(());
            }

            return Err(EngineError::invalid("can't multiply by a matrix with no rows"));
        }

        if data.orientation != Orientation::Row {
            return Err(EngineError::invalid(
                "only row vectors may initiate a vector-matrix product",
            ));
        }

        let result = match vectors[0].orientation() {
            Orientation::Row => {
                if vectors.len() != data.values.len() {
                    return Err(EngineError::DimensionMismatch {
                        expected: data.values.len(),
                        found: vectors.len(),
                    });
                }

                let width = vectors[0].len();
                let mut result = vec![0.; width];

                for (scale, row) in data.values.iter().zip(vectors.iter()) {
                    let row = row.data.read();

                    if row.values.len() != width {
                        return Err(EngineError::DimensionMismatch {
                            expected: width,
                            found: row.values.len(),
                        });
                    }

                    result
                        .iter_mut()
                        .zip(&row.values)
                        .for_each(|(acc, x)| *acc += scale * x);
                }

                result
            }
            Orientation::Column => vectors
                .iter()
                .map(|column| {
                    let column = column.data.read();

                    if column.values.len() != data.values.len() {
                        return Err(EngineError::DimensionMismatch {
                            expected: data.values.len(),
                            found: column.values.len(),
                        });
                    }

                    Ok(dot_slices(&data.values, &column.values))
                })
                .collect::<Result<Vec<_>>>()?,
        };

        data.values = result;
        Ok(())
    }

    /// Write-locks `self` and read-locks `other`, lower id first.
    fn lock_write_read<'a>(
        &'a self,
        other: &'a SharedVector,
    ) -> (RwLockWriteGuard<'a, VectorData>, RwLockReadGuard<'a, VectorData>) {
        if self.id < other.id {
            let dst = self.data.write();
            let src = other.data.read();
            (dst, src)
        } else {
            let src = other.data.read();
            let dst = self.data.write();
            (dst, src)
        }
    }

    /// Read-locks both vectors, lower id first.
    fn lock_read_read<'a>(
        &'a self,
        other: &'a SharedVector,
    ) -> (RwLockReadGuard<'a, VectorData>, RwLockReadGuard<'a, VectorData>) {
        if self.id < other.id {
            let lhs = self.data.read();
            let rhs = other.data.read();
            (lhs, rhs)
        } else {
            let rhs = other.data.read();
            let lhs = self.data.read();
            (lhs, rhs)
        }
    }
}

fn dot_slices(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    fn row(values: &[f64]) -> SharedVector {
        SharedVector::new(values.to_vec(), Orientation::Row)
    }

    fn column(values: &[f64]) -> SharedVector {
        SharedVector::new(values.to_vec(), Orientation::Column)
    }

    #[test]
    fn test_ids_are_unique() {
        let a = row(&[1.]);
        let b = row(&[1.]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_get_bounds() {
        let v = row(&[7., 8., 9.]);
        assert_eq!(v.get(2), Ok(9.));
        assert_eq!(v.get(100), Err(EngineError::OutOfRange { index: 100, len: 3 }));
    }

    #[test]
    fn test_add() {
        let alpha = row(&[0., 1., 2., 3., 4.]);
        let beta = row(&[2.; 5]);
        alpha.add(&beta).unwrap();

        assert_eq!(alpha.to_vec(), [2., 3., 4., 5., 6.]);
        assert_eq!(beta.to_vec(), [2.; 5]);
    }

    #[test]
    fn test_add_self_doubles() {
        let v = row(&[1., -2., 3.5]);
        v.add(&v).unwrap();
        assert_eq!(v.to_vec(), [2., -4., 7.]);
    }

    #[test]
    fn test_add_is_commutative() {
        let a1 = row(&[1.5, 2., -3.]);
        let b1 = row(&[4., 0.25, 6.]);
        let a2 = row(&[1.5, 2., -3.]);
        let b2 = row(&[4., 0.25, 6.]);

        a1.add(&b1).unwrap();
        b2.add(&a2).unwrap();
        assert_eq!(a1.to_vec(), b2.to_vec());
    }

    #[test]
    fn test_add_mismatch_leaves_operands_untouched() {
        let gamma = row(&[10., 20.]);
        let delta = row(&[10., 20., 30.]);
        let empty = row(&[]);
        let vertical = column(&[10., 20.]);

        assert!(matches!(
            gamma.add(&delta),
            Err(EngineError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            gamma.add(&empty),
            Err(EngineError::DimensionMismatch { .. })
        ));
        assert_eq!(gamma.add(&vertical), Err(EngineError::OrientationMismatch));

        assert_eq!(gamma.to_vec(), [10., 20.]);
        assert_eq!(delta.to_vec(), [10., 20., 30.]);
        assert_eq!(vertical.to_vec(), [10., 20.]);
    }

    #[test]
    fn test_dot() {
        let r = row(&[1., 2., 3.]);
        let c = column(&[4., 5., 6.]);
        assert_eq!(r.dot(&c), Ok(32.));
        assert_eq!(c.dot(&r), Ok(32.));
    }

    #[test]
    fn test_dot_rejections() {
        let r = row(&[1., 2.]);
        let same = row(&[3., 4.]);
        let short = column(&[1.]);

        assert!(r.dot(&r).unwrap_err().is_invalid_argument());
        assert!(r.dot(&same).unwrap_err().is_invalid_argument());
        assert!(matches!(
            r.dot(&short),
            Err(EngineError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_negate_and_transpose() {
        let v = row(&[-1.5, 3., 0., -10.5]);
        v.negate();
        assert_eq!(v.to_vec(), [1.5, -3., 0., 10.5]);

        v.transpose();
        assert_eq!(v.orientation(), Orientation::Column);
        assert_eq!(v.to_vec(), [1.5, -3., 0., 10.5]);

        v.transpose();
        assert_eq!(v.orientation(), Orientation::Row);
    }

    #[test]
    fn test_vec_mat_mul_row_and_column_storage_agree() {
        let grid = vec![vec![1., 1.], vec![2., 2.], vec![3., 3.]];

        let by_rows = row(&[2., 2., 2.]);
        by_rows.vec_mat_mul(&SharedMatrix::from_rows(&grid).unwrap()).unwrap();

        let by_columns = row(&[2., 2., 2.]);
        let columns = SharedMatrix::new();
        columns.load_column_major(&grid).unwrap();
        by_columns.vec_mat_mul(&columns).unwrap();

        assert_eq!(by_rows.to_vec(), [12., 12.]);
        assert_eq!(by_columns.to_vec(), by_rows.to_vec());
    }

    #[test]
    fn test_vec_mat_mul_rejections() {
        let short = row(&[1., 1.]);
        let tall = SharedMatrix::from_rows(&[vec![1.], vec![1.], vec![1.]]).unwrap();
        assert!(matches!(
            short.vec_mat_mul(&tall),
            Err(EngineError::DimensionMismatch { .. })
        ));
        assert_eq!(short.to_vec(), [1., 1.]);

        let vertical = column(&[1., 1.]);
        let simple = SharedMatrix::from_rows(&[vec![5.]]).unwrap();
        assert!(vertical.vec_mat_mul(&simple).unwrap_err().is_invalid_argument());

        let lonely = row(&[1.]);
        assert!(lonely.vec_mat_mul(&SharedMatrix::new()).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_vec_mat_mul_empty_is_noop() {
        let empty = row(&[]);
        empty.vec_mat_mul(&SharedMatrix::new()).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_vec_mat_mul_rejects_own_matrix() {
        let matrix = SharedMatrix::from_rows(&[vec![1.]]).unwrap();
        let inner = matrix.get(0).unwrap();
        assert!(inner.vec_mat_mul(&matrix).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_opposite_direction_adds_do_not_deadlock() {
        const ROUNDS: usize = 2_000;

        let a = Arc::new(row(&[0.; 8]));
        let b = Arc::new(row(&[1.; 8]));

        thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..ROUNDS {
                    a.add(&b).unwrap();
                }
            });
            s.spawn(|| {
                for _ in 0..ROUNDS {
                    b.add(&a).unwrap();
                    let _ = b.dot(&a);
                }
            });
        });

        assert_eq!(a.len(), 8);
        assert_eq!(b.len(), 8);
    }
}
