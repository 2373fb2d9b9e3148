//! Parallel row evaluation over rayon.
//!
//! Programs are plain integer vectors and leaf values are snapshotted into
//! per-row buffers before the parallel region, so worker threads only read
//! shared program data and write disjoint output ranges. Variable values
//! are read once, serially, and stay untouched for the whole call.

use rayon::prelude::*;

use super::{interp, Evaluator, RowKind};
use crate::error::StructureError;

impl Evaluator {
    /// Like [`evaluate`](Self::evaluate), with constraint rows partitioned
    /// across the rayon thread pool.
    pub fn evaluate_par(&self, out: &mut [f64]) -> Result<(), StructureError> {
        let s = self.structure()?;
        assert_eq!(out.len(), s.rows.len(), "output length must equal row count");
        let stack_size = s.stack_size;
        let tasks: Vec<(&RowKind, Vec<f64>)> = s
            .rows
            .iter()
            .map(|row| (&row.kind, row.leaf_values()))
            .collect();
        out.par_iter_mut()
            .zip(tasks.par_iter())
            .try_for_each(|(o, (kind, values))| {
                let mut stack = Vec::with_capacity(stack_size);
                *o = interp::eval_row(kind, values, &mut stack)?;
                Ok(())
            })
    }

    /// Like [`evaluate_csr_jacobian`](Self::evaluate_csr_jacobian), with
    /// rows partitioned across the rayon thread pool. Each row writes its
    /// own disjoint range of `values`.
    pub fn evaluate_csr_jacobian_par(
        &self,
        values: &mut [f64],
        col_ndx: &mut [usize],
        row_nnz: &mut [usize],
    ) -> Result<(), StructureError> {
        let s = self.structure()?;
        assert_eq!(row_nnz.len(), s.row_nnz.len(), "row_nnz length must be m + 1");
        assert_eq!(values.len(), s.col_ndx.len(), "values length must equal nnz");
        assert_eq!(col_ndx.len(), s.col_ndx.len(), "col_ndx length must equal nnz");
        row_nnz.copy_from_slice(&s.row_nnz);
        col_ndx.copy_from_slice(&s.col_ndx);

        let stack_size = s.stack_size;
        let tasks: Vec<(&RowKind, Vec<f64>)> = s
            .rows
            .iter()
            .map(|row| (&row.kind, row.leaf_values()))
            .collect();

        // Split the value array into one mutable range per row.
        let mut slices: Vec<&mut [f64]> = Vec::with_capacity(s.rows.len());
        let mut rest = values;
        for i in 0..s.rows.len() {
            let len = s.row_nnz[i + 1] - s.row_nnz[i];
            let (head, tail) = rest.split_at_mut(len);
            slices.push(head);
            rest = tail;
        }

        slices
            .into_par_iter()
            .zip(tasks.par_iter())
            .try_for_each(|(out, (kind, values))| {
                let mut stack = Vec::with_capacity(stack_size);
                interp::jac_row(kind, values, out, &mut stack)
            })
    }
}
