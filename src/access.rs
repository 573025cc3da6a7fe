//! Bound operand accessors.
//!
//! An expression is bound once per call into an accessor tree matching the
//! selected traversal. Linear accessors serve one running index over all
//! elements; per-column accessors serve a row index within the current
//! column and advance with [`ColAccessor::next_column`].
//!
//! Binding decides, per leaf, whether the caller's memory can be read in
//! place. When it cannot, the leaf is copied once into a scratch buffer
//! owned by the accessor, which is dropped when the call returns.

use std::borrow::Cow;

use log::debug;

use crate::broadcast::RepeatSource;
use crate::element::Element;
use crate::expr::{BinaryOp, Expr, UnaryOp};
use crate::view::MatView;

type UnaryFn<'e, T> = &'e (dyn Fn(T) -> T + 'e);
type BinaryFn<'e, T> = &'e (dyn Fn(T, T) -> T + 'e);

#[inline(always)]
fn load_slice<T: Copy, const W: usize>(s: &[T], at: usize) -> [T; W] {
    std::array::from_fn(|l| s[at + l])
}

fn cache_leaf<T: Element>(view: &MatView<'_, T>, reason: &str) -> Vec<T> {
    debug!(
        "caching {} {} operand (row stride {}, col stride {}) for {}",
        view.shape(),
        T::NAME,
        view.row_stride(),
        view.col_stride(),
        reason
    );
    view.to_vec()
}

// ============================================================================
// Linear access
// ============================================================================

/// Accessor for a single running index `k` in `0..nrows * ncols`.
pub(crate) enum LinearAccessor<'e, T: Clone> {
    /// Contiguous elements, borrowed or cached.
    Slice(Cow<'e, [T]>),
    /// Single row or column read through its one stride.
    Strided(MatView<'e, T>),
    Const(T),
    /// Column of length `m` repeated: element `k` is `col[k % m]`.
    RepCol { col: Cow<'e, [T]>, m: usize },
    /// Row repeated over `m` rows: element `k` is `row[k / m]`.
    RepRow { row: Cow<'e, [T]>, m: usize },
    Unary {
        op: UnaryOp,
        arg: Box<Self>,
    },
    Map {
        f: UnaryFn<'e, T>,
        arg: Box<Self>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Self>,
        rhs: Box<Self>,
    },
    Zip {
        f: BinaryFn<'e, T>,
        lhs: Box<Self>,
        rhs: Box<Self>,
    },
    Cond {
        mask: Box<Self>,
        then: Box<Self>,
        otherwise: Box<Self>,
    },
}

impl<'e, T: Element> LinearAccessor<'e, T> {
    /// Bind `expr` for linear traversal. Non-contiguous leaves are cached
    /// unless they have a single row or column.
    pub(crate) fn bind<'a: 'e>(expr: &'e Expr<'a, T>) -> Self {
        match expr {
            Expr::Leaf(v) => match v.as_slice() {
                Some(s) => LinearAccessor::Slice(Cow::Borrowed(s)),
                None if v.shape().is_vector() => LinearAccessor::Strided(*v),
                None => LinearAccessor::Slice(Cow::Owned(cache_leaf(v, "linear access"))),
            },
            Expr::Constant { value, .. } => LinearAccessor::Const(*value),
            Expr::RepeatCol { col, .. } => match RepeatSource::from_view(col) {
                RepeatSource::Scalar(v) => LinearAccessor::Const(v),
                RepeatSource::Buffer(buf) => LinearAccessor::RepCol {
                    col: buf,
                    m: col.nrows(),
                },
            },
            Expr::RepeatRow { row, nrows } => match RepeatSource::from_view(row) {
                RepeatSource::Scalar(v) => LinearAccessor::Const(v),
                RepeatSource::Buffer(buf) => LinearAccessor::RepRow {
                    row: buf,
                    m: *nrows,
                },
            },
            Expr::Unary { op, arg } => LinearAccessor::Unary {
                op: *op,
                arg: Box::new(Self::bind(arg)),
            },
            Expr::Map { f, arg } => LinearAccessor::Map {
                f: &**f,
                arg: Box::new(Self::bind(arg)),
            },
            Expr::Binary { op, lhs, rhs } => LinearAccessor::Binary {
                op: *op,
                lhs: Box::new(Self::bind(lhs)),
                rhs: Box::new(Self::bind(rhs)),
            },
            Expr::Zip { f, lhs, rhs } => LinearAccessor::Zip {
                f: &**f,
                lhs: Box::new(Self::bind(lhs)),
                rhs: Box::new(Self::bind(rhs)),
            },
            Expr::Cond {
                mask,
                then,
                otherwise,
            } => LinearAccessor::Cond {
                mask: Box::new(Self::bind(mask)),
                then: Box::new(Self::bind(then)),
                otherwise: Box::new(Self::bind(otherwise)),
            },
        }
    }

    #[inline(always)]
    pub(crate) fn get(&self, k: usize) -> T {
        match self {
            LinearAccessor::Slice(s) => s[k],
            LinearAccessor::Strided(view) => view.get_linear(k),
            LinearAccessor::Const(v) => *v,
            LinearAccessor::RepCol { col, m } => col[k % *m],
            LinearAccessor::RepRow { row, m } => row[k / *m],
            LinearAccessor::Unary { op, arg } => op.apply(arg.get(k)),
            LinearAccessor::Map { f, arg } => f(arg.get(k)),
            LinearAccessor::Binary { op, lhs, rhs } => op.apply(lhs.get(k), rhs.get(k)),
            LinearAccessor::Zip { f, lhs, rhs } => f(lhs.get(k), rhs.get(k)),
            LinearAccessor::Cond {
                mask,
                then,
                otherwise,
            } => {
                if mask.get(k) != T::zero() {
                    then.get(k)
                } else {
                    otherwise.get(k)
                }
            }
        }
    }

    /// Load elements `k..k + W`. The caller guarantees `k + W <= len`.
    #[inline(always)]
    pub(crate) fn load<const W: usize>(&self, k: usize) -> [T; W] {
        match self {
            LinearAccessor::Slice(s) => load_slice(s, k),
            LinearAccessor::Strided(view) => std::array::from_fn(|l| view.get_linear(k + l)),
            LinearAccessor::Const(v) => [*v; W],
            LinearAccessor::RepCol { col, m } => std::array::from_fn(|l| col[(k + l) % *m]),
            LinearAccessor::RepRow { row, m } => std::array::from_fn(|l| row[(k + l) / *m]),
            LinearAccessor::Unary { op, arg } => op.apply_pack(arg.load::<W>(k)),
            LinearAccessor::Map { f, arg } => arg.load::<W>(k).map(|x| f(x)),
            LinearAccessor::Binary { op, lhs, rhs } => {
                op.apply_pack(lhs.load::<W>(k), rhs.load::<W>(k))
            }
            LinearAccessor::Zip { f, lhs, rhs } => {
                let (a, b) = (lhs.load::<W>(k), rhs.load::<W>(k));
                std::array::from_fn(|l| f(a[l], b[l]))
            }
            LinearAccessor::Cond {
                mask,
                then,
                otherwise,
            } => {
                let (c, a, b) = (mask.load::<W>(k), then.load::<W>(k), otherwise.load::<W>(k));
                std::array::from_fn(|l| if c[l] != T::zero() { a[l] } else { b[l] })
            }
        }
    }

    /// Number of scratch buffers owned by this accessor tree.
    #[cfg(test)]
    pub(crate) fn cached_count(&self) -> usize {
        match self {
            LinearAccessor::Slice(Cow::Owned(_))
            | LinearAccessor::RepCol {
                col: Cow::Owned(_), ..
            }
            | LinearAccessor::RepRow {
                row: Cow::Owned(_), ..
            } => 1,
            LinearAccessor::Slice(_)
            | LinearAccessor::Strided(_)
            | LinearAccessor::Const(_)
            | LinearAccessor::RepCol { .. }
            | LinearAccessor::RepRow { .. } => 0,
            LinearAccessor::Unary { arg, .. } | LinearAccessor::Map { arg, .. } => {
                arg.cached_count()
            }
            LinearAccessor::Binary { lhs, rhs, .. } | LinearAccessor::Zip { lhs, rhs, .. } => {
                lhs.cached_count() + rhs.cached_count()
            }
            LinearAccessor::Cond {
                mask,
                then,
                otherwise,
            } => mask.cached_count() + then.cached_count() + otherwise.cached_count(),
        }
    }
}

// ============================================================================
// Per-column access
// ============================================================================

/// Accessor for row index `i` within the current column.
///
/// Every accessor starts at column 0. `next_column` must be called once
/// between consecutive columns on the whole tree.
pub(crate) enum ColAccessor<'e, T: Clone> {
    /// Unit-stride columns read in place.
    Dense {
        view: MatView<'e, T>,
        col: &'e [T],
        j: usize,
    },
    /// Arbitrary strides, read element by element. Scalar traversal only.
    Strided { view: MatView<'e, T>, j: usize },
    /// Packed copy of the operand; `base` is the start of the current column.
    Cached { buf: Vec<T>, m: usize, base: usize },
    Const(T),
    /// The same column for every column index.
    RepCol(Cow<'e, [T]>),
    /// One value per column, taken from a repeated row.
    RepRow {
        row: Cow<'e, [T]>,
        j: usize,
        value: T,
    },
    Unary {
        op: UnaryOp,
        arg: Box<Self>,
    },
    Map {
        f: UnaryFn<'e, T>,
        arg: Box<Self>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Self>,
        rhs: Box<Self>,
    },
    Zip {
        f: BinaryFn<'e, T>,
        lhs: Box<Self>,
        rhs: Box<Self>,
    },
    Cond {
        mask: Box<Self>,
        then: Box<Self>,
        otherwise: Box<Self>,
    },
}

impl<'e, T: Element> ColAccessor<'e, T> {
    /// Bind `expr` for per-column traversal.
    ///
    /// With `vectorized`, leaves whose columns are not unit-stride are
    /// cached; otherwise they are read through their strides.
    pub(crate) fn bind<'a: 'e>(expr: &'e Expr<'a, T>, vectorized: bool) -> Self {
        match expr {
            Expr::Leaf(v) => {
                if v.is_percol_contiguous() {
                    let col = if v.ncols() > 0 {
                        v.column_slice(0).unwrap_or(&[])
                    } else {
                        &[]
                    };
                    ColAccessor::Dense {
                        view: *v,
                        col,
                        j: 0,
                    }
                } else if vectorized {
                    ColAccessor::Cached {
                        buf: cache_leaf(v, "per-column vector access"),
                        m: v.nrows(),
                        base: 0,
                    }
                } else {
                    ColAccessor::Strided { view: *v, j: 0 }
                }
            }
            Expr::Constant { value, .. } => ColAccessor::Const(*value),
            Expr::RepeatCol { col, .. } => match RepeatSource::from_view(col) {
                RepeatSource::Scalar(v) => ColAccessor::Const(v),
                RepeatSource::Buffer(buf) => ColAccessor::RepCol(buf),
            },
            Expr::RepeatRow { row, .. } => match RepeatSource::from_view(row) {
                RepeatSource::Scalar(v) => ColAccessor::Const(v),
                RepeatSource::Buffer(buf) => {
                    let value = buf.first().copied().unwrap_or_else(T::zero);
                    ColAccessor::RepRow { row: buf, j: 0, value }
                }
            },
            Expr::Unary { op, arg } => ColAccessor::Unary {
                op: *op,
                arg: Box::new(Self::bind(arg, vectorized)),
            },
            Expr::Map { f, arg } => ColAccessor::Map {
                f: &**f,
                arg: Box::new(Self::bind(arg, vectorized)),
            },
            Expr::Binary { op, lhs, rhs } => ColAccessor::Binary {
                op: *op,
                lhs: Box::new(Self::bind(lhs, vectorized)),
                rhs: Box::new(Self::bind(rhs, vectorized)),
            },
            Expr::Zip { f, lhs, rhs } => ColAccessor::Zip {
                f: &**f,
                lhs: Box::new(Self::bind(lhs, vectorized)),
                rhs: Box::new(Self::bind(rhs, vectorized)),
            },
            Expr::Cond {
                mask,
                then,
                otherwise,
            } => ColAccessor::Cond {
                mask: Box::new(Self::bind(mask, vectorized)),
                then: Box::new(Self::bind(then, vectorized)),
                otherwise: Box::new(Self::bind(otherwise, vectorized)),
            },
        }
    }

    /// Advance every stateful accessor in the tree to the next column.
    pub(crate) fn next_column(&mut self) {
        match self {
            ColAccessor::Dense { view, col, j } => {
                *j += 1;
                if *j < view.ncols() {
                    *col = view.column_slice(*j).unwrap_or(&[]);
                }
            }
            ColAccessor::Strided { j, .. } => *j += 1,
            ColAccessor::Cached { m, base, .. } => *base += *m,
            ColAccessor::Const(_) | ColAccessor::RepCol(_) => {}
            ColAccessor::RepRow { row, j, value } => {
                *j += 1;
                if let Some(&v) = row.get(*j) {
                    *value = v;
                }
            }
            ColAccessor::Unary { arg, .. } | ColAccessor::Map { arg, .. } => arg.next_column(),
            ColAccessor::Binary { lhs, rhs, .. } | ColAccessor::Zip { lhs, rhs, .. } => {
                lhs.next_column();
                rhs.next_column();
            }
            ColAccessor::Cond {
                mask,
                then,
                otherwise,
            } => {
                mask.next_column();
                then.next_column();
                otherwise.next_column();
            }
        }
    }

    #[inline(always)]
    pub(crate) fn get(&self, i: usize) -> T {
        match self {
            ColAccessor::Dense { col, .. } => col[i],
            ColAccessor::Strided { view, j } => view.get(i, *j),
            ColAccessor::Cached { buf, base, .. } => buf[*base + i],
            ColAccessor::Const(v) => *v,
            ColAccessor::RepCol(col) => col[i],
            ColAccessor::RepRow { value, .. } => *value,
            ColAccessor::Unary { op, arg } => op.apply(arg.get(i)),
            ColAccessor::Map { f, arg } => f(arg.get(i)),
            ColAccessor::Binary { op, lhs, rhs } => op.apply(lhs.get(i), rhs.get(i)),
            ColAccessor::Zip { f, lhs, rhs } => f(lhs.get(i), rhs.get(i)),
            ColAccessor::Cond {
                mask,
                then,
                otherwise,
            } => {
                if mask.get(i) != T::zero() {
                    then.get(i)
                } else {
                    otherwise.get(i)
                }
            }
        }
    }

    /// Load rows `i..i + W` of the current column. The caller guarantees
    /// `i + W <= nrows`.
    #[inline(always)]
    pub(crate) fn load<const W: usize>(&self, i: usize) -> [T; W] {
        match self {
            ColAccessor::Dense { col, .. } => load_slice(col, i),
            ColAccessor::Strided { view, j } => std::array::from_fn(|l| view.get(i + l, *j)),
            ColAccessor::Cached { buf, base, .. } => load_slice(buf, *base + i),
            ColAccessor::Const(v) => [*v; W],
            ColAccessor::RepCol(col) => load_slice(col, i),
            ColAccessor::RepRow { value, .. } => [*value; W],
            ColAccessor::Unary { op, arg } => op.apply_pack(arg.load::<W>(i)),
            ColAccessor::Map { f, arg } => arg.load::<W>(i).map(|x| f(x)),
            ColAccessor::Binary { op, lhs, rhs } => {
                op.apply_pack(lhs.load::<W>(i), rhs.load::<W>(i))
            }
            ColAccessor::Zip { f, lhs, rhs } => {
                let (a, b) = (lhs.load::<W>(i), rhs.load::<W>(i));
                std::array::from_fn(|l| f(a[l], b[l]))
            }
            ColAccessor::Cond {
                mask,
                then,
                otherwise,
            } => {
                let (c, a, b) = (mask.load::<W>(i), then.load::<W>(i), otherwise.load::<W>(i));
                std::array::from_fn(|l| if c[l] != T::zero() { a[l] } else { b[l] })
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn cached_count(&self) -> usize {
        match self {
            ColAccessor::Cached { .. }
            | ColAccessor::RepCol(Cow::Owned(_))
            | ColAccessor::RepRow {
                row: Cow::Owned(_), ..
            } => 1,
            ColAccessor::Dense { .. }
            | ColAccessor::Strided { .. }
            | ColAccessor::Const(_)
            | ColAccessor::RepCol(_)
            | ColAccessor::RepRow { .. } => 0,
            ColAccessor::Unary { arg, .. } | ColAccessor::Map { arg, .. } => arg.cached_count(),
            ColAccessor::Binary { lhs, rhs, .. } | ColAccessor::Zip { lhs, rhs, .. } => {
                lhs.cached_count() + rhs.cached_count()
            }
            ColAccessor::Cond {
                mask,
                then,
                otherwise,
            } => mask.cached_count() + then.cached_count() + otherwise.cached_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(n: usize) -> Vec<f64> {
        (0..n).map(|x| x as f64).collect()
    }

    #[test]
    fn test_linear_borrows_contiguous_and_caches_block() {
        let data = seq(20);
        let dense = Expr::leaf(MatView::dense(&data, 4, 5).unwrap());
        let acc = LinearAccessor::bind(&dense);
        assert_eq!(acc.cached_count(), 0);
        assert_eq!(acc.get(7), 7.0);
        assert_eq!(acc.load::<4>(4), [4.0, 5.0, 6.0, 7.0]);

        let block = Expr::leaf(MatView::block(&data, 3, 4, 5).unwrap());
        let acc = LinearAccessor::bind(&block);
        assert_eq!(acc.cached_count(), 1);
        // Linear index 4 is (1, 1), stored at 1 + 5.
        assert_eq!(acc.get(4), 6.0);
    }

    #[test]
    fn test_linear_strided_vector_read_in_place() {
        let data = seq(24);
        let m = MatView::dense(&data, 4, 6).unwrap();
        let row = Expr::leaf(m.row(1));
        let acc = LinearAccessor::bind(&row);
        assert_eq!(acc.cached_count(), 0);
        assert_eq!(acc.get(2), 9.0);
        assert_eq!(acc.load::<2>(4), [17.0, 21.0]);

        let col = Expr::leaf(MatView::grid(&data, 5, 1, 3, 1).unwrap());
        let acc = LinearAccessor::bind(&col);
        assert_eq!(acc.cached_count(), 0);
        assert_eq!(acc.load::<4>(1), [3.0, 6.0, 9.0, 12.0]);
    }

    #[test]
    fn test_linear_repeat_indexing() {
        let data = [1.0f64, 2.0, 3.0];
        let col = MatView::dense(&data, 3, 1).unwrap();
        let row = MatView::dense(&data, 1, 3).unwrap();

        let rc = Expr::repeat_col(col, 2);
        let acc = LinearAccessor::bind(&rc);
        assert_eq!(
            (0..6).map(|k| acc.get(k)).collect::<Vec<_>>(),
            vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]
        );

        let rr = Expr::repeat_row(row, 2);
        let acc = LinearAccessor::bind(&rr);
        assert_eq!(acc.load::<4>(0), [1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_percol_strided_vs_cached() {
        let data = seq(60);
        let grid = Expr::leaf(MatView::grid(&data, 3, 3, 2, 20).unwrap());

        let mut scalar = ColAccessor::bind(&grid, false);
        assert_eq!(scalar.cached_count(), 0);
        let mut vector = ColAccessor::bind(&grid, true);
        assert_eq!(vector.cached_count(), 1);

        for j in 0..3 {
            if j > 0 {
                scalar.next_column();
                vector.next_column();
            }
            for i in 0..3 {
                let expected = (2 * i + 20 * j) as f64;
                assert_eq!(scalar.get(i), expected);
                assert_eq!(vector.get(i), expected);
            }
        }
    }

    #[test]
    fn test_percol_dense_columns_advance() {
        let data = seq(12);
        let e = Expr::leaf(MatView::block(&data, 2, 3, 4).unwrap()) + Expr::constant(0.5, 2, 3);
        let mut acc = ColAccessor::bind(&e, true);
        assert_eq!(acc.cached_count(), 0);
        assert_eq!(acc.load::<2>(0), [0.5, 1.5]);
        acc.next_column();
        assert_eq!(acc.load::<2>(0), [4.5, 5.5]);
        acc.next_column();
        assert_eq!(acc.get(1), 9.5);
    }

    #[test]
    fn test_percol_repeat_row_value_per_column() {
        let data = seq(9);
        let m = MatView::dense(&data, 3, 3).unwrap();
        let e = Expr::repeat_row(m.row(2), 4);
        let mut acc = ColAccessor::bind(&e, true);
        assert_eq!(acc.cached_count(), 1);
        assert_eq!(acc.load::<4>(0), [2.0; 4]);
        acc.next_column();
        assert_eq!(acc.get(3), 5.0);
        acc.next_column();
        assert_eq!(acc.get(0), 8.0);
    }

    #[test]
    fn test_cond_selects_lanes() {
        let a = [1.0f64, 5.0, 2.0, 8.0];
        let b = [4.0f64, 4.0, 4.0, 4.0];
        let av = MatView::dense(&a, 4, 1).unwrap();
        let bv = MatView::dense(&b, 4, 1).unwrap();
        let e = Expr::cond(
            Expr::leaf(av).elem_gt(Expr::leaf(bv)),
            Expr::leaf(av),
            Expr::leaf(bv),
        );
        let acc = LinearAccessor::bind(&e);
        assert_eq!(acc.load::<4>(0), [4.0, 5.0, 4.0, 8.0]);
        assert_eq!(acc.get(2), 4.0);
    }
}
