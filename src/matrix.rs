//! Dense 2-D matrix utility.
//!
//! A `Matrix` is a row-major `f32` buffer with an explicit shape. It provides
//! exactly the operations backpropagation needs: matrix products (including
//! the transposed variants used by the backward pass), bias broadcast,
//! element-wise ops, and per-column reductions.
//!
//! Shape mismatches are treated as programmer error and panic via `assert!`,
//! matching the crate's hot-path policy (see the crate docs).

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    /// Row-major: element `(r, c)` lives at `r * cols + c`.
    data: Vec<f32>,
}

impl Matrix {
    #[inline]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build a matrix from a row-major buffer.
    #[inline]
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "data len {} does not match shape ({rows}, {cols})",
            data.len()
        );
        Self { rows, cols, data }
    }

    /// Build a single-column matrix (shape `(values.len(), 1)`).
    #[inline]
    pub fn column(values: &[f32]) -> Self {
        Self {
            rows: values.len(),
            cols: 1,
            data: values.to_vec(),
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> f32 {
        debug_assert!(r < self.rows && c < self.cols);
        self.data[r * self.cols + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, value: f32) {
        debug_assert!(r < self.rows && c < self.cols);
        self.data[r * self.cols + c] = value;
    }

    /// Materialized transpose.
    pub fn transposed(&self) -> Matrix {
        let mut out = Matrix::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        out
    }

    /// `self * rhs`, shape `(self.rows, rhs.cols)`.
    pub fn matmul(&self, rhs: &Matrix) -> Matrix {
        assert_eq!(
            self.cols, rhs.rows,
            "matmul shape mismatch: ({}, {}) * ({}, {})",
            self.rows, self.cols, rhs.rows, rhs.cols
        );

        let mut out = Matrix::zeros(self.rows, rhs.cols);
        for r in 0..self.rows {
            let lhs_row = r * self.cols;
            for k in 0..self.cols {
                let a = self.data[lhs_row + k];
                let rhs_row = k * rhs.cols;
                let out_row = r * rhs.cols;
                for c in 0..rhs.cols {
                    out.data[out_row + c] = a.mul_add(rhs.data[rhs_row + c], out.data[out_row + c]);
                }
            }
        }
        out
    }

    /// `selfᵗ * rhs`, shape `(self.cols, rhs.cols)`.
    ///
    /// Used for `Wᵗ · g` without materializing a transpose.
    pub fn matmul_t_lhs(&self, rhs: &Matrix) -> Matrix {
        assert_eq!(
            self.rows, rhs.rows,
            "matmul_t_lhs shape mismatch: ({}, {})ᵗ * ({}, {})",
            self.rows, self.cols, rhs.rows, rhs.cols
        );

        let mut out = Matrix::zeros(self.cols, rhs.cols);
        for k in 0..self.rows {
            let lhs_row = k * self.cols;
            let rhs_row = k * rhs.cols;
            for r in 0..self.cols {
                let a = self.data[lhs_row + r];
                let out_row = r * rhs.cols;
                for c in 0..rhs.cols {
                    out.data[out_row + c] = a.mul_add(rhs.data[rhs_row + c], out.data[out_row + c]);
                }
            }
        }
        out
    }

    /// `self * rhsᵗ`, shape `(self.rows, rhs.rows)`.
    ///
    /// Used for the weight gradient `g · xᵗ`; for single-column operands this
    /// is the outer product.
    pub fn matmul_t_rhs(&self, rhs: &Matrix) -> Matrix {
        assert_eq!(
            self.cols, rhs.cols,
            "matmul_t_rhs shape mismatch: ({}, {}) * ({}, {})ᵗ",
            self.rows, self.cols, rhs.rows, rhs.cols
        );

        let mut out = Matrix::zeros(self.rows, rhs.rows);
        for r in 0..self.rows {
            let lhs_row = r * self.cols;
            for c in 0..rhs.rows {
                let rhs_row = c * rhs.cols;
                let mut sum = 0.0_f32;
                for k in 0..self.cols {
                    sum = self.data[lhs_row + k].mul_add(rhs.data[rhs_row + k], sum);
                }
                out.data[r * rhs.rows + c] = sum;
            }
        }
        out
    }

    /// Add a `(rows, 1)` column to every column of `self`.
    pub fn add_col_broadcast(&self, col: &Matrix) -> Matrix {
        assert_eq!(
            col.rows, self.rows,
            "broadcast column has {} rows, matrix has {}",
            col.rows, self.rows
        );
        assert_eq!(col.cols, 1, "broadcast operand must be a single column");

        let mut out = self.clone();
        for r in 0..self.rows {
            let b = col.data[r];
            let row = r * self.cols;
            for c in 0..self.cols {
                out.data[row + c] += b;
            }
        }
        out
    }

    /// Element-wise product. Shapes must match exactly.
    pub fn hadamard(&self, other: &Matrix) -> Matrix {
        assert_eq!(
            (self.rows, self.cols),
            (other.rows, other.cols),
            "hadamard shape mismatch"
        );

        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a * b)
            .collect();
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data,
        }
    }

    /// Element-wise difference. Shapes must match exactly.
    pub fn sub(&self, other: &Matrix) -> Matrix {
        assert_eq!(
            (self.rows, self.cols),
            (other.rows, other.cols),
            "sub shape mismatch"
        );

        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a - b)
            .collect();
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data,
        }
    }

    /// `self += scale * other`, element-wise.
    pub fn add_scaled(&mut self, scale: f32, other: &Matrix) {
        assert_eq!(
            (self.rows, self.cols),
            (other.rows, other.cols),
            "add_scaled shape mismatch"
        );

        for (v, &g) in self.data.iter_mut().zip(&other.data) {
            *v = g.mul_add(scale, *v);
        }
    }

    pub fn map<F: Fn(f32) -> f32>(&self, f: F) -> Matrix {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Mean across the column dimension, shape `(rows, 1)`.
    pub fn col_mean(&self) -> Matrix {
        assert!(self.cols > 0, "col_mean requires at least one column");

        let inv_n = 1.0 / self.cols as f32;
        let mut out = Matrix::zeros(self.rows, 1);
        for r in 0..self.rows {
            let row = r * self.cols;
            let mut sum = 0.0_f32;
            for c in 0..self.cols {
                sum += self.data[row + c];
            }
            out.data[r] = sum * inv_n;
        }
        out
    }

    /// Row index of the largest value in column `c` (first on ties).
    pub fn col_argmax(&self, c: usize) -> usize {
        assert!(c < self.cols, "column {c} out of range ({})", self.cols);
        assert!(self.rows > 0, "col_argmax requires at least one row");

        let mut best = 0;
        let mut best_val = self.data[c];
        for r in 1..self.rows {
            let v = self.data[r * self.cols + c];
            if v > best_val {
                best_val = v;
                best = r;
            }
        }
        best
    }

    #[inline]
    pub fn all_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matmul_matches_hand_computed_product() {
        let a = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = Matrix::from_vec(3, 2, vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        let c = a.matmul(&b);
        assert_eq!(c.data(), &[58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn transposed_products_agree_with_materialized_transpose() {
        let a = Matrix::from_vec(3, 2, vec![1.0, -2.0, 0.5, 4.0, -1.5, 3.0]);
        let g = Matrix::from_vec(3, 1, vec![0.25, -1.0, 2.0]);

        assert_eq!(a.matmul_t_lhs(&g), a.transposed().matmul(&g));

        let x = Matrix::from_vec(4, 1, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(g.matmul_t_rhs(&x), g.matmul(&x.transposed()));
    }

    #[test]
    fn broadcast_adds_bias_to_every_column() {
        let m = Matrix::from_vec(2, 3, vec![0.0; 6]);
        let b = Matrix::column(&[1.0, -1.0]);
        let out = m.add_col_broadcast(&b);
        assert_eq!(out.data(), &[1.0, 1.0, 1.0, -1.0, -1.0, -1.0]);
    }

    #[test]
    fn col_mean_and_argmax() {
        let m = Matrix::from_vec(2, 2, vec![1.0, 3.0, 5.0, 1.0]);
        let mean = m.col_mean();
        assert_eq!(mean.data(), &[2.0, 3.0]);
        assert_eq!(m.col_argmax(0), 1);
        assert_eq!(m.col_argmax(1), 0);
    }

    #[test]
    fn all_finite_detects_nan_and_inf() {
        let ok = Matrix::from_vec(1, 2, vec![1.0, -2.0]);
        assert!(ok.all_finite());
        let nan = Matrix::from_vec(1, 2, vec![1.0, f32::NAN]);
        assert!(!nan.all_finite());
        let inf = Matrix::from_vec(1, 2, vec![f32::INFINITY, 0.0]);
        assert!(!inf.all_finite());
    }

    #[test]
    #[should_panic]
    fn matmul_panics_on_shape_mismatch() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(2, 3);
        let _ = a.matmul(&b);
    }
}
