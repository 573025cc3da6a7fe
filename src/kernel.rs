//! Traversal bodies for the four access strategies.
//!
//! Each body binds nothing and decides nothing: it walks an already bound
//! accessor tree in the order its strategy prescribes and hands every value
//! (or lane pack) to a [`Sink`]. Vector bodies finish a partial trailing
//! pack with scalar steps and never touch positions past the logical end.

use crate::access::{ColAccessor, LinearAccessor};
use crate::element::Element;
use crate::expr::Expr;
use crate::policy::{Policy, Strategy};
use crate::shape::Shape;
use crate::simd;

/// Consumer of evaluated values.
///
/// Linear bodies pass the running index as `i` and never call the column
/// hooks. Per-column bodies call `begin_column(j)`, then pass row indices
/// within column `j`, then call `end_column(j)`.
pub(crate) trait Sink<T> {
    #[inline(always)]
    fn begin_column(&mut self, _j: usize) {}

    #[inline(always)]
    fn end_column(&mut self, _j: usize) {}

    fn scalar(&mut self, i: usize, v: T);

    fn pack<const W: usize>(&mut self, i: usize, v: [T; W]);
}

pub(crate) fn linear_scalar<T: Element, S: Sink<T>>(
    src: &LinearAccessor<'_, T>,
    len: usize,
    sink: &mut S,
) {
    for k in 0..len {
        sink.scalar(k, src.get(k));
    }
}

pub(crate) fn linear_vector<T: Element, S: Sink<T>, const W: usize>(
    src: &LinearAccessor<'_, T>,
    len: usize,
    sink: &mut S,
) {
    simd::dispatch_if_large(len, || {
        let main = len - len % W;
        let mut k = 0;
        while k < main {
            sink.pack::<W>(k, src.load::<W>(k));
            k += W;
        }
        for k in main..len {
            sink.scalar(k, src.get(k));
        }
    })
}

pub(crate) fn percol_scalar<T: Element, S: Sink<T>>(
    src: &mut ColAccessor<'_, T>,
    shape: Shape,
    sink: &mut S,
) {
    let (m, n) = (shape.nrows(), shape.ncols());
    for j in 0..n {
        if j > 0 {
            src.next_column();
        }
        sink.begin_column(j);
        for i in 0..m {
            sink.scalar(i, src.get(i));
        }
        sink.end_column(j);
    }
}

pub(crate) fn percol_vector<T: Element, S: Sink<T>, const W: usize>(
    src: &mut ColAccessor<'_, T>,
    shape: Shape,
    sink: &mut S,
) {
    let (m, n) = (shape.nrows(), shape.ncols());
    let main = m - m % W;
    simd::dispatch_if_large(shape.nelems(), || {
        for j in 0..n {
            if j > 0 {
                src.next_column();
            }
            sink.begin_column(j);
            let mut i = 0;
            while i < main {
                sink.pack::<W>(i, src.load::<W>(i));
                i += W;
            }
            for i in main..m {
                sink.scalar(i, src.get(i));
            }
            sink.end_column(j);
        }
    })
}

/// Bind `expr` for `policy` and run the matching traversal into `sink`.
///
/// Lane widths without a vector body fall back to the scalar body of the
/// same traversal order.
pub(crate) fn run<T: Element, S: Sink<T>>(
    expr: &Expr<'_, T>,
    policy: Policy,
    shape: Shape,
    sink: &mut S,
) {
    match policy.strategy() {
        Strategy::LinearVector | Strategy::LinearScalar => {
            let src = LinearAccessor::bind(expr);
            let len = shape.nelems();
            match (policy.is_vector(), policy.lanes()) {
                (true, 2) => linear_vector::<T, S, 2>(&src, len, sink),
                (true, 4) => linear_vector::<T, S, 4>(&src, len, sink),
                (true, 8) => linear_vector::<T, S, 8>(&src, len, sink),
                (true, 16) => linear_vector::<T, S, 16>(&src, len, sink),
                _ => linear_scalar(&src, len, sink),
            }
        }
        Strategy::PerColVector | Strategy::PerColScalar => {
            let mut src = ColAccessor::bind(expr, policy.is_vector());
            match (policy.is_vector(), policy.lanes()) {
                (true, 2) => percol_vector::<T, S, 2>(&mut src, shape, sink),
                (true, 4) => percol_vector::<T, S, 4>(&mut src, shape, sink),
                (true, 8) => percol_vector::<T, S, 8>(&mut src, shape, sink),
                (true, 16) => percol_vector::<T, S, 16>(&mut src, shape, sink),
                _ => percol_scalar(&mut src, shape, sink),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::MatView;

    /// Records every position the traversal visits.
    #[derive(Default)]
    struct Trace {
        column: usize,
        visits: Vec<(usize, usize, f64)>,
        packs: usize,
        columns_ended: usize,
    }

    impl Sink<f64> for Trace {
        fn begin_column(&mut self, j: usize) {
            self.column = j;
        }

        fn end_column(&mut self, _j: usize) {
            self.columns_ended += 1;
        }

        fn scalar(&mut self, i: usize, v: f64) {
            self.visits.push((i, self.column, v));
        }

        fn pack<const W: usize>(&mut self, i: usize, v: [f64; W]) {
            self.packs += 1;
            for (l, x) in v.into_iter().enumerate() {
                self.visits.push((i + l, self.column, x));
            }
        }
    }

    fn expr_data() -> Vec<f64> {
        (0..15).map(|x| x as f64).collect()
    }

    #[test]
    fn test_linear_vector_tail_is_scalar() {
        let data = expr_data();
        let e = Expr::leaf(MatView::dense(&data, 5, 3).unwrap());
        let mut sink = Trace::default();
        run(&e, Policy::linear_vector(4), Shape::new(5, 3), &mut sink);
        assert_eq!(sink.packs, 3);
        assert_eq!(sink.visits.len(), 15);
        for (k, &(i, _, v)) in sink.visits.iter().enumerate() {
            assert_eq!(i, k);
            assert_eq!(v, k as f64);
        }
        assert_eq!(sink.columns_ended, 0);
    }

    #[test]
    fn test_percol_vector_visits_each_position_once() {
        let data = expr_data();
        let e = Expr::leaf(MatView::dense(&data, 5, 3).unwrap());
        let mut sink = Trace::default();
        run(&e, Policy::percol_vector(2), Shape::new(5, 3), &mut sink);
        assert_eq!(sink.packs, 6);
        assert_eq!(sink.columns_ended, 3);
        let mut seen: Vec<(usize, usize)> = sink.visits.iter().map(|&(i, j, _)| (i, j)).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 15);
        for &(i, j, v) in &sink.visits {
            assert_eq!(v, (i + 5 * j) as f64);
        }
    }

    #[test]
    fn test_unsupported_width_runs_scalar() {
        let data = expr_data();
        let e = Expr::leaf(MatView::dense(&data, 5, 3).unwrap());
        let mut sink = Trace::default();
        run(&e, Policy::linear_vector(3), Shape::new(5, 3), &mut sink);
        assert_eq!(sink.packs, 0);
        assert_eq!(sink.visits.len(), 15);
    }

    #[test]
    fn test_empty_shape_visits_nothing() {
        let data: Vec<f64> = Vec::new();
        let e = Expr::leaf(MatView::dense(&data, 0, 4).unwrap());
        let mut sink = Trace::default();
        run(&e, Policy::percol_vector(2), Shape::new(0, 4), &mut sink);
        assert!(sink.visits.is_empty());
        assert_eq!(sink.columns_ended, 4);
    }
}
