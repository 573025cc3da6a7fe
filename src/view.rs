//! Column-major strided matrix views and an owned dense matrix.
//!
//! These types are the storage side of the engine: they own or borrow the
//! memory and answer the narrow set of questions the evaluators ask
//! (shape, strides, contiguity, element and column access).
//!
//! - [`MatView`]: immutable view with arbitrary row and column strides
//! - [`MatViewMut`]: mutable view, used as an evaluation destination
//! - [`DenseMat`]: owned, packed column-major matrix
//!
//! Three layout families are covered by the same view type:
//! packed (`dense`), column blocks with a leading dimension (`block`), and
//! grids strided in both directions (`grid`).

use std::ops::{Index, IndexMut};

use crate::shape::{Layout, Shape};
use crate::{MatEvalError, Result};

// ============================================================================
// Validation helpers
// ============================================================================

/// Validate that every addressed element lies within `[0, len)`.
fn validate_bounds(
    len: usize,
    shape: Shape,
    row_stride: isize,
    col_stride: isize,
    offset: usize,
) -> Result<()> {
    if shape.is_empty() {
        return Ok(());
    }
    let offset = isize::try_from(offset).map_err(|_| MatEvalError::OffsetOverflow)?;
    let mut min_offset = offset;
    let mut max_offset = offset;
    for (dim, stride) in [(shape.nrows(), row_stride), (shape.ncols(), col_stride)] {
        if dim > 1 {
            let last = isize::try_from(dim - 1).map_err(|_| MatEvalError::OffsetOverflow)?;
            let end = stride
                .checked_mul(last)
                .ok_or(MatEvalError::OffsetOverflow)?;
            if end >= 0 {
                max_offset = max_offset
                    .checked_add(end)
                    .ok_or(MatEvalError::OffsetOverflow)?;
            } else {
                min_offset = min_offset
                    .checked_add(end)
                    .ok_or(MatEvalError::OffsetOverflow)?;
            }
        }
    }
    if min_offset < 0 || max_offset as usize >= len {
        return Err(MatEvalError::OffsetOverflow);
    }
    Ok(())
}

#[inline(always)]
fn element_offset(offset: usize, row_stride: isize, col_stride: isize, i: usize, j: usize) -> usize {
    (offset as isize + i as isize * row_stride + j as isize * col_stride) as usize
}

// ============================================================================
// MatView
// ============================================================================

/// An immutable column-major strided view.
///
/// Element `(i, j)` is `data[offset + i * row_stride + j * col_stride]`.
#[derive(Debug, Clone, Copy)]
pub struct MatView<'a, T> {
    data: &'a [T],
    shape: Shape,
    row_stride: isize,
    col_stride: isize,
    offset: usize,
}

impl<'a, T> MatView<'a, T> {
    /// Create a view with explicit strides and offset.
    ///
    /// # Errors
    /// Returns [`MatEvalError::OffsetOverflow`] if the view would address
    /// memory outside `data`.
    pub fn from_parts(
        data: &'a [T],
        nrows: usize,
        ncols: usize,
        row_stride: isize,
        col_stride: isize,
        offset: usize,
    ) -> Result<Self> {
        let shape = Shape::new(nrows, ncols);
        validate_bounds(data.len(), shape, row_stride, col_stride, offset)?;
        Ok(Self {
            data,
            shape,
            row_stride,
            col_stride,
            offset,
        })
    }

    /// Packed column-major view over the first `nrows * ncols` elements.
    pub fn dense(data: &'a [T], nrows: usize, ncols: usize) -> Result<Self> {
        Self::from_parts(data, nrows, ncols, 1, nrows as isize, 0)
    }

    /// Column-major view whose columns are `ldim` elements apart.
    ///
    /// Each column is contiguous; the matrix as a whole is not unless
    /// `ldim == nrows`.
    pub fn block(data: &'a [T], nrows: usize, ncols: usize, ldim: usize) -> Result<Self> {
        if ldim < nrows {
            return Err(MatEvalError::OffsetOverflow);
        }
        Self::from_parts(data, nrows, ncols, 1, ldim as isize, 0)
    }

    /// View strided in both directions: rows `row_step` apart, columns
    /// `col_step` apart.
    pub fn grid(
        data: &'a [T],
        nrows: usize,
        ncols: usize,
        row_step: isize,
        col_step: isize,
    ) -> Result<Self> {
        Self::from_parts(data, nrows, ncols, row_step, col_step, 0)
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
    pub fn is_empty(&self) -> bool {
        self.shape.is_empty()
    }

    #[inline]
    pub fn row_stride(&self) -> isize {
        self.row_stride
    }

    #[inline]
    pub fn col_stride(&self) -> isize {
        self.col_stride
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Layout descriptor consumed by the access-strategy selector.
    #[inline]
    pub fn layout(&self) -> Layout {
        Layout::strided(self.shape, self.row_stride, self.col_stride)
    }

    #[inline]
    pub fn is_contiguous(&self) -> bool {
        self.layout().is_contiguous()
    }

    #[inline]
    pub fn is_percol_contiguous(&self) -> bool {
        self.layout().is_percol_contiguous()
    }

    /// The whole matrix as one slice, when it is contiguous.
    ///
    /// An empty view yields an empty slice whatever its offset.
    pub fn as_slice(&self) -> Option<&'a [T]> {
        if self.is_empty() {
            return Some(&[]);
        }
        if !self.is_contiguous() {
            return None;
        }
        let data: &'a [T] = self.data;
        Some(&data[self.offset..self.offset + self.nelems()])
    }

    /// Column `j` as a slice, when columns are unit-stride.
    pub fn column_slice(&self, j: usize) -> Option<&'a [T]> {
        assert!(j < self.ncols(), "column index out of bounds");
        if self.nrows() == 0 {
            return Some(&[]);
        }
        if !self.is_percol_contiguous() {
            return None;
        }
        let start = element_offset(self.offset, self.row_stride, self.col_stride, 0, j);
        let data: &'a [T] = self.data;
        Some(&data[start..start + self.nrows()])
    }

    /// Sub-view of column `j` (an `nrows x 1` view).
    pub fn column(&self, j: usize) -> MatView<'a, T> {
        assert!(j < self.ncols(), "column index out of bounds");
        MatView {
            data: self.data,
            shape: Shape::new(self.nrows(), 1),
            row_stride: self.row_stride,
            col_stride: self.col_stride,
            offset: element_offset(self.offset, self.row_stride, self.col_stride, 0, j),
        }
    }

    /// Sub-view of row `i` (a `1 x ncols` view).
    pub fn row(&self, i: usize) -> MatView<'a, T> {
        assert!(i < self.nrows(), "row index out of bounds");
        MatView {
            data: self.data,
            shape: Shape::new(1, self.ncols()),
            row_stride: self.row_stride,
            col_stride: self.col_stride,
            offset: element_offset(self.offset, self.row_stride, self.col_stride, i, 0),
        }
    }

    /// Transposed view (zero-copy: swaps the shape and strides).
    #[inline]
    pub fn t(&self) -> MatView<'a, T> {
        MatView {
            data: self.data,
            shape: self.shape.transposed(),
            row_stride: self.col_stride,
            col_stride: self.row_stride,
            offset: self.offset,
        }
    }
}

impl<T: Copy> MatView<'_, T> {
    /// Element `(i, j)`.
    ///
    /// # Panics
    /// Panics if the index is out of bounds.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> T {
        assert!(
            i < self.nrows() && j < self.ncols(),
            "index out of bounds"
        );
        self.data[element_offset(self.offset, self.row_stride, self.col_stride, i, j)]
    }

    /// Element at column-major linear index `k`.
    #[inline]
    pub fn get_linear(&self, k: usize) -> T {
        let m = self.nrows();
        self.get(k % m, k / m)
    }

    /// Copy the elements into a packed column-major vector.
    pub fn to_vec(&self) -> Vec<T> {
        if let Some(s) = self.as_slice() {
            return s.to_vec();
        }
        let mut out = Vec::with_capacity(self.nelems());
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                out.push(self.get(i, j));
            }
        }
        out
    }
}

// ============================================================================
// MatViewMut
// ============================================================================

/// A mutable column-major strided view.
#[derive(Debug)]
pub struct MatViewMut<'a, T> {
    data: &'a mut [T],
    shape: Shape,
    row_stride: isize,
    col_stride: isize,
    offset: usize,
}

impl<'a, T> MatViewMut<'a, T> {
    /// Create a mutable view with explicit strides and offset.
    pub fn from_parts(
        data: &'a mut [T],
        nrows: usize,
        ncols: usize,
        row_stride: isize,
        col_stride: isize,
        offset: usize,
    ) -> Result<Self> {
        let shape = Shape::new(nrows, ncols);
        validate_bounds(data.len(), shape, row_stride, col_stride, offset)?;
        Ok(Self {
            data,
            shape,
            row_stride,
            col_stride,
            offset,
        })
    }

    pub fn dense(data: &'a mut [T], nrows: usize, ncols: usize) -> Result<Self> {
        Self::from_parts(data, nrows, ncols, 1, nrows as isize, 0)
    }

    pub fn block(data: &'a mut [T], nrows: usize, ncols: usize, ldim: usize) -> Result<Self> {
        if ldim < nrows {
            return Err(MatEvalError::OffsetOverflow);
        }
        Self::from_parts(data, nrows, ncols, 1, ldim as isize, 0)
    }

    pub fn grid(
        data: &'a mut [T],
        nrows: usize,
        ncols: usize,
        row_step: isize,
        col_step: isize,
    ) -> Result<Self> {
        Self::from_parts(data, nrows, ncols, row_step, col_step, 0)
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

    #[inline]
    pub fn layout(&self) -> Layout {
        Layout::strided(self.shape, self.row_stride, self.col_stride)
    }

    #[inline]
    pub fn is_contiguous(&self) -> bool {
        self.layout().is_contiguous()
    }

    #[inline]
    pub fn is_percol_contiguous(&self) -> bool {
        self.layout().is_percol_contiguous()
    }

    /// The whole matrix as one mutable slice, when it is contiguous.
    pub fn as_mut_slice(&mut self) -> Option<&mut [T]> {
        if self.shape.is_empty() {
            return Some(&mut []);
        }
        if !self.is_contiguous() {
            return None;
        }
        let len = self.nelems();
        Some(&mut self.data[self.offset..self.offset + len])
    }

    /// Column `j` as a mutable slice, when columns are unit-stride.
    pub fn column_slice_mut(&mut self, j: usize) -> Option<&mut [T]> {
        assert!(j < self.ncols(), "column index out of bounds");
        if self.nrows() == 0 {
            return Some(&mut []);
        }
        if !self.is_percol_contiguous() {
            return None;
        }
        let start = element_offset(self.offset, self.row_stride, self.col_stride, 0, j);
        let m = self.nrows();
        Some(&mut self.data[start..start + m])
    }

    /// Reborrow as an immutable view.
    pub fn as_view(&self) -> MatView<'_, T> {
        MatView {
            data: self.data,
            shape: self.shape,
            row_stride: self.row_stride,
            col_stride: self.col_stride,
            offset: self.offset,
        }
    }

    /// Reborrow mutably with a shorter lifetime.
    pub fn rb_mut(&mut self) -> MatViewMut<'_, T> {
        MatViewMut {
            data: self.data,
            shape: self.shape,
            row_stride: self.row_stride,
            col_stride: self.col_stride,
            offset: self.offset,
        }
    }

    /// Mutable sub-view of column `j`, consuming this view.
    pub fn into_column(self, j: usize) -> MatViewMut<'a, T> {
        assert!(j < self.ncols(), "column index out of bounds");
        let offset = element_offset(self.offset, self.row_stride, self.col_stride, 0, j);
        MatViewMut {
            data: self.data,
            shape: Shape::new(self.shape.nrows(), 1),
            row_stride: self.row_stride,
            col_stride: self.col_stride,
            offset,
        }
    }

    /// Mutable transposed view, consuming this view.
    pub fn into_t(self) -> MatViewMut<'a, T> {
        MatViewMut {
            data: self.data,
            shape: self.shape.transposed(),
            row_stride: self.col_stride,
            col_stride: self.row_stride,
            offset: self.offset,
        }
    }

    /// Storage offset of element `(i, j)`, unchecked against the shape.
    #[inline(always)]
    pub(crate) fn offset_of(&self, i: usize, j: usize) -> usize {
        element_offset(self.offset, self.row_stride, self.col_stride, i, j)
    }

    #[inline(always)]
    pub(crate) fn raw_data_mut(&mut self) -> &mut [T] {
        self.data
    }
}

impl<T: Copy> MatViewMut<'_, T> {
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> T {
        assert!(
            i < self.nrows() && j < self.ncols(),
            "index out of bounds"
        );
        self.data[self.offset_of(i, j)]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: T) {
        assert!(
            i < self.nrows() && j < self.ncols(),
            "index out of bounds"
        );
        let k = self.offset_of(i, j);
        self.data[k] = value;
    }

    /// Mutable reference to element `(i, j)`.
    #[inline]
    pub fn get_mut(&mut self, i: usize, j: usize) -> &mut T {
        assert!(
            i < self.nrows() && j < self.ncols(),
            "index out of bounds"
        );
        let k = self.offset_of(i, j);
        &mut self.data[k]
    }
}

// ============================================================================
// DenseMat
// ============================================================================

/// Owned packed column-major matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMat<T> {
    data: Vec<T>,
    shape: Shape,
}

impl<T: Copy> DenseMat<T> {
    /// Matrix with every element equal to `value`.
    pub fn filled(nrows: usize, ncols: usize, value: T) -> Self {
        Self {
            data: vec![value; nrows * ncols],
            shape: Shape::new(nrows, ncols),
        }
    }

    /// Matrix with element `(i, j) = f(i, j)`.
    pub fn from_fn(nrows: usize, ncols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(nrows * ncols);
        for j in 0..ncols {
            for i in 0..nrows {
                data.push(f(i, j));
            }
        }
        Self {
            data,
            shape: Shape::new(nrows, ncols),
        }
    }

    /// Wrap a column-major vector.
    ///
    /// # Errors
    /// Returns [`MatEvalError::ShapeMismatch`] if `data.len() != nrows * ncols`.
    pub fn from_col_major(data: Vec<T>, nrows: usize, ncols: usize) -> Result<Self> {
        let shape = Shape::new(nrows, ncols);
        if data.len() != shape.nelems() {
            return Err(MatEvalError::ShapeMismatch(
                shape,
                Shape::new(data.len(), 1),
            ));
        }
        Ok(Self { data, shape })
    }

    /// Build from row-major nested data (convenient for literals).
    pub fn from_rows<R: AsRef<[T]>>(rows: &[R]) -> Result<Self> {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, |r| r.as_ref().len());
        if let Some(bad) = rows.iter().find(|r| r.as_ref().len() != ncols) {
            return Err(MatEvalError::ShapeMismatch(
                Shape::new(nrows, ncols),
                Shape::new(1, bad.as_ref().len()),
            ));
        }
        Ok(Self::from_fn(nrows, ncols, |i, j| rows[i].as_ref()[j]))
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> T {
        self[(i, j)]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: T) {
        self[(i, j)] = value;
    }
}

impl<T: Copy + Default> DenseMat<T> {
    /// Matrix of `T::default()` (zero for floats).
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self::filled(nrows, ncols, T::default())
    }
}

impl<T> DenseMat<T> {
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
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Immutable packed view.
    pub fn view(&self) -> MatView<'_, T> {
        MatView {
            data: &self.data,
            shape: self.shape,
            row_stride: 1,
            col_stride: self.shape.nrows() as isize,
            offset: 0,
        }
    }

    /// Mutable packed view.
    pub fn view_mut(&mut self) -> MatViewMut<'_, T> {
        let shape = self.shape;
        MatViewMut {
            data: &mut self.data,
            shape,
            row_stride: 1,
            col_stride: shape.nrows() as isize,
            offset: 0,
        }
    }

    pub fn column(&self, j: usize) -> MatView<'_, T> {
        self.view().column(j)
    }

    pub fn row(&self, i: usize) -> MatView<'_, T> {
        self.view().row(i)
    }
}

impl<T> Index<(usize, usize)> for DenseMat<T> {
    type Output = T;

    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &T {
        assert!(i < self.nrows() && j < self.ncols(), "index out of bounds");
        &self.data[i + j * self.nrows()]
    }
}

impl<T> IndexMut<(usize, usize)> for DenseMat<T> {
    #[inline]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        assert!(i < self.nrows() && j < self.ncols(), "index out of bounds");
        let m = self.nrows();
        &mut self.data[i + j * m]
    }
}
