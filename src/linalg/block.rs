//! Row/column block partitioning over dense matrices and vectors, without
//! copying the underlying storage.
//!
//! `StageFactor` needs a feedforward vector split into four stacked
//! segments `[kff, zff, lff, yff]` and a feedback matrix split into four
//! stacked block-rows `[K, Z, L, A]` (spec.md §3). This module provides the
//! small bookkeeping layer (`BlockLayout`) plus thin wrappers
//! (`BlockVector`, `BlockMatrix`) that hand out `nalgebra` views into
//! contiguous row ranges of a single owned `DVector`/`DMatrix`, mirroring
//! `BlkMatrix::blockSegment`/`blockRow` in the reference implementation.

use nalgebra::{DMatrix, DMatrixView, DMatrixViewMut, DVector, DVectorView, DVectorViewMut};

use crate::scalar::Scalar;

/// Describes how a contiguous range of rows is partitioned into blocks of
/// given sizes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockLayout {
    dims: Vec<usize>,
    offsets: Vec<usize>,
}

impl BlockLayout {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        let dims = dims.into();
        let mut offsets = Vec::with_capacity(dims.len() + 1);
        let mut acc = 0usize;
        offsets.push(0);
        for &d in &dims {
            acc += d;
            offsets.push(acc);
        }
        Self { dims, offsets }
    }

    pub fn num_blocks(&self) -> usize {
        self.dims.len()
    }

    pub fn dim(&self, i: usize) -> usize {
        self.dims[i]
    }

    pub fn offset(&self, i: usize) -> usize {
        self.offsets[i]
    }

    pub fn total(&self) -> usize {
        *self.offsets.last().unwrap_or(&0)
    }
}

/// A vector whose rows are conceptually split into `layout.num_blocks()`
/// contiguous segments.
#[derive(Clone, Debug)]
pub struct BlockVector {
    pub layout: BlockLayout,
    pub data: DVector<Scalar>,
}

impl BlockVector {
    pub fn zeros(dims: impl Into<Vec<usize>>) -> Self {
        let layout = BlockLayout::new(dims);
        let data = DVector::zeros(layout.total());
        Self { layout, data }
    }

    pub fn segment(&self, i: usize) -> DVectorView<'_, Scalar> {
        self.data.rows(self.layout.offset(i), self.layout.dim(i))
    }

    pub fn segment_mut(&mut self, i: usize) -> DVectorViewMut<'_, Scalar> {
        self.data.rows_mut(self.layout.offset(i), self.layout.dim(i))
    }

    /// View over the concatenation of the first `k` segments (used for
    /// solving the reduced KKT system against `[kff; zff]` in one shot).
    pub fn top_segments(&self, k: usize) -> DVectorView<'_, Scalar> {
        let n: usize = (0..k).map(|i| self.layout.dim(i)).sum();
        self.data.rows(0, n)
    }

    pub fn top_segments_mut(&mut self, k: usize) -> DVectorViewMut<'_, Scalar> {
        let n: usize = (0..k).map(|i| self.layout.dim(i)).sum();
        self.data.rows_mut(0, n)
    }

    pub fn fill(&mut self, value: Scalar) {
        self.data.fill(value);
    }
}

/// A matrix whose rows are conceptually split into `layout.num_blocks()`
/// contiguous block-rows, each spanning all `ncols` columns. Used for the
/// feedback gains `[K; Z; L; A]`.
#[derive(Clone, Debug)]
pub struct BlockMatrix {
    pub layout: BlockLayout,
    pub ncols: usize,
    pub data: DMatrix<Scalar>,
}

impl BlockMatrix {
    pub fn zeros(dims: impl Into<Vec<usize>>, ncols: usize) -> Self {
        let layout = BlockLayout::new(dims);
        let data = DMatrix::zeros(layout.total(), ncols);
        Self { layout, ncols, data }
    }

    pub fn block_row(&self, i: usize) -> DMatrixView<'_, Scalar> {
        self.data.rows(self.layout.offset(i), self.layout.dim(i))
    }

    pub fn block_row_mut(&mut self, i: usize) -> DMatrixViewMut<'_, Scalar> {
        self.data.rows_mut(self.layout.offset(i), self.layout.dim(i))
    }

    pub fn top_blk_rows(&self, k: usize) -> DMatrixView<'_, Scalar> {
        let n: usize = (0..k).map(|i| self.layout.dim(i)).sum();
        self.data.rows(0, n)
    }

    pub fn top_blk_rows_mut(&mut self, k: usize) -> DMatrixViewMut<'_, Scalar> {
        let n: usize = (0..k).map(|i| self.layout.dim(i)).sum();
        self.data.rows_mut(0, n)
    }

    pub fn fill(&mut self, value: Scalar) {
        self.data.fill(value);
    }
}

/// A matrix whose columns are split into named blocks (e.g. `[Jx | Ju]`),
/// used by the projected-Jacobian correction in the multiplier engine.
#[derive(Clone, Debug)]
pub struct ColBlockMatrix {
    pub layout: BlockLayout,
    pub nrows: usize,
    pub data: DMatrix<Scalar>,
}

impl ColBlockMatrix {
    pub fn zeros(nrows: usize, col_dims: impl Into<Vec<usize>>) -> Self {
        let layout = BlockLayout::new(col_dims);
        let data = DMatrix::zeros(nrows, layout.total());
        Self { layout, nrows, data }
    }

    pub fn block_col(&self, i: usize) -> DMatrixView<'_, Scalar> {
        self.data.columns(self.layout.offset(i), self.layout.dim(i))
    }

    pub fn block_col_mut(&mut self, i: usize) -> DMatrixViewMut<'_, Scalar> {
        self.data.columns_mut(self.layout.offset(i), self.layout.dim(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_offsets() {
        let l = BlockLayout::new(vec![2, 3, 1]);
        assert_eq!(l.total(), 6);
        assert_eq!(l.offset(0), 0);
        assert_eq!(l.offset(1), 2);
        assert_eq!(l.offset(2), 5);
        assert_eq!(l.dim(1), 3);
    }

    #[test]
    fn block_vector_segments_are_views_into_shared_storage() {
        let mut bv = BlockVector::zeros(vec![2, 2]);
        bv.segment_mut(1).fill(3.0);
        assert_eq!(bv.data.as_slice(), &[0.0, 0.0, 3.0, 3.0]);
        assert_eq!(bv.segment(0).iter().copied().collect::<Vec<_>>(), vec![0.0, 0.0]);
    }

    #[test]
    fn block_matrix_rows() {
        let mut bm = BlockMatrix::zeros(vec![1, 1], 2);
        bm.block_row_mut(0).fill(1.0);
        bm.block_row_mut(1).fill(2.0);
        assert_eq!(bm.block_row(0)[(0, 0)], 1.0);
        assert_eq!(bm.block_row(1)[(0, 1)], 2.0);
    }

    #[test]
    fn col_block_matrix() {
        let mut cb = ColBlockMatrix::zeros(2, vec![1, 2]);
        cb.block_col_mut(1).fill(5.0);
        assert_eq!(cb.block_col(1)[(0, 0)], 5.0);
        assert_eq!(cb.block_col(0)[(0, 0)], 0.0);
    }
}
