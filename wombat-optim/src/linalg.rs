//! Dense linear algebra for the KKT solve.
//!
//! A small row-major dense matrix and LU factorization with partial
//! pivoting. KKT systems at this layer's scale are dense enough that a
//! direct dense factorization beats bringing in a sparse solver.

use num_traits::Float;

/// Row-major dense square matrix.
#[derive(Debug, Clone)]
pub struct DenseMatrix<F> {
    data: Vec<F>,
    n: usize,
}

impl<F: Float> DenseMatrix<F> {
    pub fn zeros(n: usize) -> Self {
        DenseMatrix {
            data: vec![F::zero(); n * n],
            n,
        }
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> F {
        self.data[r * self.n + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, v: F) {
        self.data[r * self.n + c] = v;
    }

    #[inline]
    pub fn add_to(&mut self, r: usize, c: usize, v: F) {
        self.data[r * self.n + c] = self.data[r * self.n + c] + v;
    }
}

/// LU factors with partial pivoting: L below the unit diagonal, U on and
/// above it, plus the row permutation.
pub struct LuFactors<F> {
    lu: DenseMatrix<F>,
    perm: Vec<usize>,
}

/// Factor a square matrix. Returns `None` on a zero (or near-zero) pivot.
pub fn lu_factor<F: Float>(a: &DenseMatrix<F>) -> Option<LuFactors<F>> {
    let n = a.dim();
    let mut lu = a.clone();
    let mut perm: Vec<usize> = (0..n).collect();
    let eps = F::from(1e-14).unwrap_or_else(F::epsilon);

    for col in 0..n {
        let mut max_val = lu.get(col, col).abs();
        let mut max_row = col;
        for row in (col + 1)..n {
            let v = lu.get(row, col).abs();
            if v > max_val {
                max_val = v;
                max_row = row;
            }
        }
        if max_val < eps {
            return None;
        }
        if max_row != col {
            for j in 0..n {
                let tmp = lu.get(col, j);
                lu.set(col, j, lu.get(max_row, j));
                lu.set(max_row, j, tmp);
            }
            perm.swap(col, max_row);
        }
        let pivot = lu.get(col, col);
        for row in (col + 1)..n {
            let factor = lu.get(row, col) / pivot;
            lu.set(row, col, factor);
            for j in (col + 1)..n {
                let v = lu.get(row, j) - factor * lu.get(col, j);
                lu.set(row, j, v);
            }
        }
    }
    Some(LuFactors { lu, perm })
}

/// Solve against a precomputed factorization.
pub fn lu_back_solve<F: Float>(factors: &LuFactors<F>, b: &[F]) -> Vec<F> {
    let n = factors.lu.dim();
    debug_assert_eq!(b.len(), n);

    let mut y = vec![F::zero(); n];
    for i in 0..n {
        y[i] = b[factors.perm[i]];
    }
    for i in 1..n {
        for j in 0..i {
            let v = y[i] - factors.lu.get(i, j) * y[j];
            y[i] = v;
        }
    }
    let mut x = vec![F::zero(); n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum = sum - factors.lu.get(i, j) * x[j];
        }
        x[i] = sum / factors.lu.get(i, i);
    }
    x
}

/// Factor and solve `A x = b` in one call. `None` if `A` is singular.
pub fn lu_solve<F: Float>(a: &DenseMatrix<F>, b: &[F]) -> Option<Vec<F>> {
    let factors = lu_factor(a)?;
    Some(lu_back_solve(&factors, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mat(n: usize, rows: &[&[f64]]) -> DenseMatrix<f64> {
        let mut m = DenseMatrix::zeros(n);
        for (i, row) in rows.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                m.set(i, j, v);
            }
        }
        m
    }

    #[test]
    fn solve_2x2() {
        // [2 1][x0]   [5]
        // [1 3][x1] = [7]
        let a = mat(2, &[&[2.0, 1.0], &[1.0, 3.0]]);
        let x = lu_solve(&a, &[5.0, 7.0]).unwrap();
        assert!((x[0] - 1.6).abs() < 1e-12);
        assert!((x[1] - 1.8).abs() < 1e-12);
    }

    #[test]
    fn singular_returns_none() {
        let a = mat(2, &[&[1.0, 2.0], &[2.0, 4.0]]);
        assert!(lu_solve(&a, &[3.0, 6.0]).is_none());
    }

    #[test]
    fn pivoting_handles_zero_leading_entry() {
        let a = mat(2, &[&[0.0, 1.0], &[1.0, 0.0]]);
        let x = lu_solve(&a, &[3.0, 7.0]).unwrap();
        assert!((x[0] - 7.0).abs() < 1e-12);
        assert!((x[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn factor_once_solve_twice() {
        let a = mat(3, &[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0], &[7.0, 8.0, 0.0]]);
        let f = lu_factor(&a).unwrap();
        for b in [[14.0, 32.0, 23.0], [1.0, 0.0, 0.0]] {
            let x = lu_back_solve(&f, &b);
            let x_ref = lu_solve(&a, &b).unwrap();
            for i in 0..3 {
                assert!((x[i] - x_ref[i]).abs() < 1e-10);
            }
        }
    }
}
