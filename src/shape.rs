//! Matrix shapes and memory layout descriptors.
//!
//! All matrices are column-major: element `(i, j)` lives at
//! `offset + i * row_stride + j * col_stride`. A [`Layout`] summarizes the
//! facts the access-strategy selector needs about one operand without
//! touching its data.

use std::fmt;

use crate::{MatEvalError, Result};

/// Number of rows and columns of a matrix or expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    nrows: usize,
    ncols: usize,
}

impl Shape {
    /// Create a shape from unsigned dimensions.
    #[inline]
    pub const fn new(nrows: usize, ncols: usize) -> Self {
        Self { nrows, ncols }
    }

    /// Create a shape from signed dimensions, rejecting negative values.
    ///
    /// # Errors
    /// Returns [`MatEvalError::InvalidShape`] if either dimension is negative.
    pub fn try_new(nrows: isize, ncols: isize) -> Result<Self> {
        if nrows < 0 || ncols < 0 {
            return Err(MatEvalError::InvalidShape {
                rows: nrows,
                cols: ncols,
            });
        }
        Ok(Self::new(nrows as usize, ncols as usize))
    }

    #[inline]
    pub const fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline]
    pub const fn ncols(&self) -> usize {
        self.ncols
    }

    /// Total number of elements (`nrows * ncols`).
    #[inline]
    pub const fn nelems(&self) -> usize {
        self.nrows * self.ncols
    }

    /// True if either dimension is zero.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.nrows == 0 || self.ncols == 0
    }

    #[inline]
    pub const fn is_column(&self) -> bool {
        self.ncols == 1
    }

    #[inline]
    pub const fn is_row(&self) -> bool {
        self.nrows == 1
    }

    /// True for a single row or a single column, where linear and per-column
    /// traversal visit elements in the same order.
    #[inline]
    pub const fn is_vector(&self) -> bool {
        self.is_column() || self.is_row()
    }

    #[inline]
    pub const fn is_scalar(&self) -> bool {
        self.nrows == 1 && self.ncols == 1
    }

    /// Shapes with swapped dimensions.
    #[inline]
    pub const fn transposed(&self) -> Self {
        Self::new(self.ncols, self.nrows)
    }

    /// Fail with `ShapeMismatch` unless `self == other`.
    #[inline]
    pub fn ensure_same(&self, other: &Shape) -> Result<()> {
        if self != other {
            return Err(MatEvalError::ShapeMismatch(*self, *other));
        }
        Ok(())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.nrows, self.ncols)
    }
}

impl From<(usize, usize)> for Shape {
    fn from((nrows, ncols): (usize, usize)) -> Self {
        Self::new(nrows, ncols)
    }
}

/// Layout facts about one operand, derived from its shape and strides.
///
/// `is_contiguous` implies `is_percol_contiguous`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    shape: Shape,
    row_stride: isize,
    col_stride: isize,
    contiguous: bool,
    percol_contiguous: bool,
}

impl Layout {
    /// Derive a layout from a shape and element strides.
    pub fn strided(shape: Shape, row_stride: isize, col_stride: isize) -> Self {
        let percol_contiguous = shape.is_empty() || shape.nrows() <= 1 || row_stride == 1;
        let contiguous = shape.is_empty()
            || (percol_contiguous
                && (shape.ncols() <= 1 || col_stride == shape.nrows() as isize));
        Self {
            shape,
            row_stride,
            col_stride,
            contiguous,
            percol_contiguous,
        }
    }

    /// Layout of a packed column-major matrix.
    pub fn dense(shape: Shape) -> Self {
        Self::strided(shape, 1, shape.nrows() as isize)
    }

    #[inline]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.shape.nrows()
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.shape.ncols()
    }

    #[inline]
    pub fn nelems(&self) -> usize {
        self.shape.nelems()
    }

    #[inline]
    pub fn row_stride(&self) -> isize {
        self.row_stride
    }

    #[inline]
    pub fn col_stride(&self) -> isize {
        self.col_stride
    }

    /// Linear indices `0..nelems` map to consecutive memory.
    #[inline]
    pub fn is_contiguous(&self) -> bool {
        self.contiguous
    }

    /// Every column on its own is unit-stride.
    #[inline]
    pub fn is_percol_contiguous(&self) -> bool {
        self.percol_contiguous
    }

    /// Memory step between consecutive linear indices, when there is a
    /// single one: 1 for contiguous layouts, otherwise the stride along the
    /// only non-trivial dimension of a row or column.
    #[inline]
    pub fn linear_step(&self) -> Option<isize> {
        if self.contiguous {
            Some(1)
        } else if self.shape.ncols() == 1 {
            Some(self.row_stride)
        } else if self.shape.nrows() == 1 {
            Some(self.col_stride)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_dimension_rejected() {
        let err = Shape::try_new(-1, 3).unwrap_err();
        assert!(matches!(err, MatEvalError::InvalidShape { rows: -1, cols: 3 }));
        assert_eq!(Shape::try_new(2, 0).unwrap(), Shape::new(2, 0));
    }

    #[test]
    fn test_shape_queries() {
        let s = Shape::new(3, 4);
        assert_eq!(s.nelems(), 12);
        assert!(!s.is_empty());
        assert!(Shape::new(0, 5).is_empty());
        assert!(Shape::new(1, 5).is_vector());
        assert!(Shape::new(1, 1).is_scalar());
        assert_eq!(s.transposed(), Shape::new(4, 3));
        assert_eq!(s.to_string(), "3x4");
    }

    #[test]
    fn test_layout_classification() {
        let dense = Layout::dense(Shape::new(3, 4));
        assert!(dense.is_contiguous());
        assert!(dense.is_percol_contiguous());

        let block = Layout::strided(Shape::new(3, 4), 1, 5);
        assert!(!block.is_contiguous());
        assert!(block.is_percol_contiguous());

        let grid = Layout::strided(Shape::new(3, 3), 2, 20);
        assert!(!grid.is_contiguous());
        assert!(!grid.is_percol_contiguous());
    }

    #[test]
    fn test_degenerate_layouts_are_contiguous() {
        // A single column only needs unit row stride.
        let col = Layout::strided(Shape::new(5, 1), 1, 99);
        assert!(col.is_contiguous());
        // A single row needs unit column stride.
        let row = Layout::strided(Shape::new(1, 4), 7, 1);
        assert!(row.is_contiguous());
        let strided_row = Layout::strided(Shape::new(1, 4), 1, 3);
        assert!(!strided_row.is_contiguous());
        assert!(strided_row.is_percol_contiguous());
    }

    #[test]
    fn test_linear_step() {
        assert_eq!(Layout::dense(Shape::new(3, 4)).linear_step(), Some(1));
        assert_eq!(Layout::strided(Shape::new(1, 8), 1, 8).linear_step(), Some(8));
        assert_eq!(Layout::strided(Shape::new(6, 1), -2, 1).linear_step(), Some(-2));
        assert_eq!(Layout::strided(Shape::new(3, 4), 1, 5).linear_step(), None);
    }
}
