use std::sync::Arc;

use parking_lot::RwLock;

use super::{Grid, Orientation, SharedVector};
use crate::error::{EngineError, Result};

/// An ordered sequence of `SharedVector`s of equal length and orientation.
///
/// Loading builds a brand new sequence and publishes it in a single step, callers that
/// grabbed the previous sequence keep observing it unchanged. Concurrent loads on the same
/// matrix are not synchronized with each other, elements are only ever mutated through
/// the vectors themselves.
#[derive(Debug)]
pub struct SharedMatrix {
    vectors: RwLock<Arc<[Arc<SharedVector>]>>,
}

impl Default for SharedMatrix {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedMatrix {
    /// Creates a new, empty `SharedMatrix`.
    pub fn new() -> Self {
        Self {
            vectors: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Creates a new `SharedMatrix` storing `grid` row by row.
    ///
    /// # Arguments
    /// * `grid` - A rectangular row-major grid.
    ///
    /// # Returns
    /// The new matrix or a `DimensionMismatch` if `grid` is ragged.
    pub fn from_rows(grid: &[Vec<f64>]) -> Result<Self> {
        let matrix = Self::new();
        matrix.load_row_major(grid)?;
        Ok(matrix)
    }

    /// Replaces the contents with one row vector per row of `grid`.
    ///
    /// # Arguments
    /// * `grid` - A rectangular row-major grid.
    ///
    /// # Returns
    /// A `DimensionMismatch` if `grid` is ragged, the previous contents are kept.
    pub fn load_row_major(&self, grid: &[Vec<f64>]) -> Result<()> {
        check_rectangular(grid)?;

        let vectors: Vec<_> = grid
            .iter()
            .map(|row| Arc::new(SharedVector::new(row.clone(), Orientation::Row)))
            .collect();

        self.publish(vectors);
        Ok(())
    }

    /// Replaces the contents with one column vector per column of `grid`.
    ///
    /// # Arguments
    /// * `grid` - A rectangular row-major grid, it's transposed while loading.
    ///
    /// # Returns
    /// A `DimensionMismatch` if `grid` is ragged, the previous contents are kept.
    pub fn load_column_major(&self, grid: &[Vec<f64>]) -> Result<()> {
        check_rectangular(grid)?;

        let ncols = grid.first().map_or(0, Vec::len);
        let vectors: Vec<_> = (0..ncols)
            .map(|c| {
                let column = grid.iter().map(|row| row[c]).collect();
                Arc::new(SharedVector::new(column, Orientation::Column))
            })
            .collect();

        self.publish(vectors);
        Ok(())
    }

    /// Reads the whole matrix back as a row-major grid.
    ///
    /// Every vector is copied under its own read lock. When the stored vectors are
    /// columns, as reported by the first one, the copy is transposed back.
    ///
    /// # Returns
    /// A fresh grid, empty for an empty matrix, or a `DimensionMismatch` if the stored
    /// columns no longer share a length.
    pub fn read_row_major(&self) -> Result<Grid> {
        let vectors = self.vectors();

        let Some(first) = vectors.first() else {
            return Ok(Vec::new());
        };

        let orientation = first.orientation();
        let copies: Grid = vectors.iter().map(|v| v.to_vec()).collect();

        match orientation {
            Orientation::Row => Ok(copies),
            Orientation::Column => {
                let nrows = copies[0].len();

                if let Some(column) = copies.iter().find(|c| c.len() != nrows) {
                    return Err(EngineError::DimensionMismatch {
                        expected: nrows,
                        found: column.len(),
                    });
                }

                Ok((0..nrows)
                    .map(|r| copies.iter().map(|column| column[r]).collect())
                    .collect())
            }
        }
    }

    /// Returns the vector at `index`.
    ///
    /// # Returns
    /// The vector or an `OutOfRange` error.
    pub fn get(&self, index: usize) -> Result<Arc<SharedVector>> {
        let vectors = self.vectors.read();
        vectors
            .get(index)
            .cloned()
            .ok_or(EngineError::OutOfRange {
                index,
                len: vectors.len(),
            })
    }

    /// The amount of stored vectors.
    pub fn len(&self) -> usize {
        self.vectors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The orientation of the first stored vector.
    ///
    /// # Returns
    /// The orientation or an `OutOfRange` error if the matrix is empty.
    pub fn orientation(&self) -> Result<Orientation> {
        self.get(0).map(|v| v.orientation())
    }

    /// A snapshot of the current vector sequence.
    pub(crate) fn vectors(&self) -> Arc<[Arc<SharedVector>]> {
        Arc::clone(&self.vectors.read())
    }

    fn publish(&self, vectors: Vec<Arc<SharedVector>>) {
        *self.vectors.write() = Arc::from(vectors);
    }
}

fn check_rectangular(grid: &[Vec<f64>]) -> Result<()> {
    let Some(first) = grid.first() else {
        return Ok(());
    };

    match grid.iter().find(|row| row.len() != first.len()) {
        Some(row) => Err(EngineError::DimensionMismatch {
            expected: first.len(),
            found: row.len(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_round_trip() {
        let grid = vec![vec![10.5, 11.5], vec![12.5, 13.5]];
        let matrix = SharedMatrix::from_rows(&grid).unwrap();

        assert_eq!(matrix.read_row_major().unwrap(), grid);
        assert_eq!(matrix.orientation(), Ok(Orientation::Row));
        assert_eq!(matrix.len(), 2);
    }

    #[test]
    fn test_column_major_storage() {
        let grid = vec![vec![1.1, 2.2, 3.3], vec![4.4, 5.5, 6.6]];
        let matrix = SharedMatrix::new();
        matrix.load_column_major(&grid).unwrap();

        assert_eq!(matrix.len(), 3);
        assert_eq!(matrix.orientation(), Ok(Orientation::Column));
        assert_eq!(matrix.get(1).unwrap().to_vec(), [2.2, 5.5]);
        assert_eq!(matrix.read_row_major().unwrap(), grid);
    }

    #[test]
    fn test_empty_matrix() {
        let matrix = SharedMatrix::new();
        assert!(matrix.read_row_major().unwrap().is_empty());
        assert_eq!(
            matrix.orientation(),
            Err(EngineError::OutOfRange { index: 0, len: 0 })
        );

        matrix.load_column_major(&[]).unwrap();
        assert!(matrix.is_empty());
        assert!(matrix.read_row_major().unwrap().is_empty());
    }

    #[test]
    fn test_reload_switches_layout() {
        let grid = vec![vec![5., 6.], vec![7., 8.]];
        let matrix = SharedMatrix::from_rows(&[vec![9.9]]).unwrap();

        matrix.load_column_major(&grid).unwrap();
        assert_eq!(matrix.orientation(), Ok(Orientation::Column));
        assert_eq!(matrix.read_row_major().unwrap(), grid);

        matrix.load_row_major(&grid).unwrap();
        assert_eq!(matrix.orientation(), Ok(Orientation::Row));
        assert_eq!(matrix.read_row_major().unwrap(), grid);
    }

    #[test]
    fn test_get_bounds() {
        let matrix =
            SharedMatrix::from_rows(&[vec![100., 200., 300.], vec![400., 500., 600.]]).unwrap();

        assert_eq!(matrix.get(1).unwrap().get(0), Ok(400.));
        assert_eq!(
            matrix.get(10).unwrap_err(),
            EngineError::OutOfRange { index: 10, len: 2 }
        );
    }

    #[test]
    fn test_ragged_grid_is_rejected() {
        let ragged = vec![vec![1., 2.], vec![3.]];
        let matrix = SharedMatrix::from_rows(&[vec![1.]]).unwrap();

        assert!(matches!(
            matrix.load_row_major(&ragged),
            Err(EngineError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            matrix.load_column_major(&ragged),
            Err(EngineError::DimensionMismatch { .. })
        ));
        assert_eq!(matrix.read_row_major().unwrap(), vec![vec![1.]]);
    }

    #[test]
    fn test_old_snapshot_survives_reload() {
        let matrix = SharedMatrix::from_rows(&[vec![1., 2.]]).unwrap();
        let snapshot = matrix.vectors();

        matrix.load_row_major(&[vec![3.], vec![4.]]).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].to_vec(), [1., 2.]);
        assert_eq!(matrix.len(), 2);
    }

    #[test]
    fn test_transposed_rows_read_back_as_columns() {
        let matrix = SharedMatrix::from_rows(&[vec![1., 2.], vec![3., 4.]]).unwrap();
        for i in 0..matrix.len() {
            matrix.get(i).unwrap().transpose();
        }

        assert_eq!(matrix.orientation(), Ok(Orientation::Column));
        assert_eq!(
            matrix.read_row_major().unwrap(),
            vec![vec![1., 3.], vec![2., 4.]]
        );
    }
}
