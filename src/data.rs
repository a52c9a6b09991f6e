use serde::{Deserialize, Serialize};

/// Contiguous Column Major Matrix data container.
///
/// This structure holds a dense matrix of values in a single contiguous memory block.
/// It follows column-major order (Fortran-style), so a single feature column is a
/// contiguous slice. The `index` field selects which rows an operation visits,
/// which lets cross-validation describe a fold as a view over the same buffer.
///
/// # Type Parameters
/// * `T` - The numeric type of the data (e.g., `f32`, `f64`).
pub struct Matrix<'a, T> {
    /// The raw data stored in a single slice.
    pub data: &'a [T],
    /// Indices into the data row-wise.
    pub index: Vec<usize>,
    /// Number of rows in the matrix.
    pub rows: usize,
    /// Number of columns in the matrix.
    pub cols: usize,
    stride1: usize,
    stride2: usize,
}

impl<'a, T> Matrix<'a, T> {
    // Defaults to column major
    /// Create a new Matrix.
    pub fn new(data: &'a [T], rows: usize, cols: usize) -> Self {
        Matrix {
            data,
            index: (0..rows).collect(),
            rows,
            cols,
            stride1: rows,
            stride2: 1,
        }
    }

    /// Create a view over the same data that only visits the given rows.
    ///
    /// * `index` - The rows to visit, in order.
    pub fn with_index(data: &'a [T], rows: usize, cols: usize, index: Vec<usize>) -> Self {
        let mut m = Matrix::new(data, rows, cols);
        m.index = index;
        m
    }

    /// Number of rows selected by the index.
    pub fn n_selected(&self) -> usize {
        self.index.len()
    }

    /// Get a single reference to an item in the matrix.
    ///
    /// * `i` - The ith row of the data to get.
    /// * `j` - the jth column of the data to get.
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[self.item_index(i, j)]
    }

    fn item_index(&self, i: usize, j: usize) -> usize {
        let mut idx = self.stride2 * i;
        idx += j * self.stride1;
        idx
    }

    /// Get access to a row of the data, as an iterator.
    pub fn get_row_iter(&self, row: usize) -> std::iter::StepBy<std::iter::Skip<std::slice::Iter<'a, T>>> {
        self.data.iter().skip(row).step_by(self.rows)
    }
}

impl<'a, T> Matrix<'a, T>
where
    T: Copy,
{
    /// Get a row of the data as a vector.
    pub fn get_row(&self, row: usize) -> Vec<T> {
        if self.cols == 0 {
            return Vec::new();
        }
        self.get_row_iter(row).copied().collect()
    }
}

/// A lightweight row major matrix that owns its data.
///
/// A fitted model keeps its training rows in this layout, so the distance
/// computation walks one contiguous slice per training row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowMajorMatrix<T> {
    /// The raw data in row-major order.
    pub data: Vec<T>,
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
}

impl<T> RowMajorMatrix<T> {
    /// Get a row as a contiguous slice.
    pub fn get_row(&self, i: usize) -> &[T] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Add rows to the matrix, this can be multiple
    /// rows, if they are in sequential order in the items.
    pub fn append_row(&mut self, items: Vec<T>) {
        assert!(self.cols == 0 || items.len() % self.cols == 0);
        let new_rows = if self.cols == 0 { 1 } else { items.len() / self.cols };
        self.rows += new_rows;
        self.data.extend(items);
    }
}

impl<T> RowMajorMatrix<T>
where
    T: Copy,
{
    /// Copy the rows selected by a column major matrix's index into row major order.
    pub fn from_matrix(m: &Matrix<T>) -> Self {
        let mut out = RowMajorMatrix {
            data: Vec::with_capacity(m.index.len() * m.cols),
            rows: 0,
            cols: m.cols,
        };
        for &row in &m.index {
            out.append_row(m.get_row(row));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rowmatrix_append() {
        let v = vec![1, 2, 3, 5, 6, 7];
        let mut m = RowMajorMatrix::from_matrix(&Matrix::new(&v, 2, 3));
        assert_eq!(m.get_row(1), &[2, 5, 7]);
        m.append_row(vec![-1, -2, -3]);
        assert_eq!(m.rows, 3);
        assert_eq!(m.get_row(2), &[-1, -2, -3]);
    }

    #[test]
    fn test_matrix_get() {
        let v = vec![1, 2, 3, 5, 6, 7];
        let m = Matrix::new(&v, 2, 3);
        assert_eq!(m.get(0, 0), &1);
        assert_eq!(m.get(1, 0), &2);
    }

    #[test]
    fn test_matrix_row() {
        let v = vec![1, 2, 3, 5, 6, 7];
        let m = Matrix::new(&v, 3, 2);
        assert_eq!(m.get_row(2), vec![3, 7]);
        assert_eq!(m.get_row(0), vec![1, 5]);
        assert_eq!(m.get_row(1), vec![2, 6]);
    }

    #[test]
    fn test_matrix_without_columns() {
        let v: Vec<f64> = Vec::new();
        let m = Matrix::new(&v, 4, 0);
        assert!(m.get_row(3).is_empty());
        let rm = RowMajorMatrix::from_matrix(&m);
        assert_eq!(rm.rows, 4);
        assert!(rm.get_row(2).is_empty());
    }

    #[test]
    fn test_from_matrix_follows_index() {
        let v = vec![1, 2, 3, 5, 6, 7];
        let m = Matrix::with_index(&v, 3, 2, vec![2, 0]);
        let rm = RowMajorMatrix::from_matrix(&m);
        assert_eq!(rm.rows, 2);
        assert_eq!(rm.get_row(0), &[3, 7]);
        assert_eq!(rm.get_row(1), &[1, 5]);
    }
}
