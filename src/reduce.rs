//! Reductions: folding a whole matrix, its columns or its rows.
//!
//! A scalar pass keeps one accumulator. A vector pass keeps one accumulator
//! per lane and combines the lanes horizontally at the end, so the order in
//! which elements are combined is unspecified and floating-point sums may
//! differ from a sequential sum by rounding. The caller's initial value is
//! combined last: `fold(Sum, v0, e) == v0 + fold(Sum, 0, e)`.

use log::debug;

use crate::element::Element;
use crate::expr::Expr;
use crate::kernel::{self, Sink};
use crate::lanes::{capability, max_lane_width, EvalConfig, LaneCapable};
use crate::policy::{select, select_among, Policy, Strategy};
use crate::shape::{Layout, Shape};
use crate::view::{MatView, MatViewMut};
use crate::Result;

const MAX_LANES: usize = 16;

// ============================================================================
// Reductors
// ============================================================================

/// An associative combining function with an identity element.
pub trait Reductor<T: Element>: LaneCapable {
    fn identity(&self) -> T;

    fn combine(&self, a: T, b: T) -> T;

    /// Combine a pack into `W` accumulators; `acc.len() == W`.
    #[inline(always)]
    fn combine_pack<const W: usize>(&self, acc: &mut [T], v: [T; W]) {
        for (a, v) in acc.iter_mut().zip(v) {
            *a = self.combine(*a, v);
        }
    }

    /// Combine per-lane accumulators into one value.
    fn horizontal(&self, lanes: &[T]) -> T {
        lanes
            .iter()
            .fold(self.identity(), |acc, &x| self.combine(acc, x))
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct Sum;

#[derive(Copy, Clone, Debug, Default)]
pub struct Max;

#[derive(Copy, Clone, Debug, Default)]
pub struct Min;

/// Logical and over truth values. Nonzero is true; results are 1 or 0.
#[derive(Copy, Clone, Debug, Default)]
pub struct All;

/// Logical or over truth values. Nonzero is true; results are 1 or 0.
#[derive(Copy, Clone, Debug, Default)]
pub struct Any;

impl LaneCapable for Sum {}
impl LaneCapable for Max {}
impl LaneCapable for Min {}
impl LaneCapable for All {}
impl LaneCapable for Any {}

impl<T: Element> Reductor<T> for Sum {
    #[inline(always)]
    fn identity(&self) -> T {
        T::zero()
    }

    #[inline(always)]
    fn combine(&self, a: T, b: T) -> T {
        a + b
    }

    fn horizontal(&self, lanes: &[T]) -> T {
        // Pairwise, to keep the rounding error of the lane sum small.
        match lanes.len() {
            0 => T::zero(),
            1 => lanes[0],
            n => {
                let (lo, hi) = lanes.split_at(n / 2);
                Reductor::<T>::horizontal(self, lo) + Reductor::<T>::horizontal(self, hi)
            }
        }
    }
}

impl<T: Element> Reductor<T> for Max {
    #[inline(always)]
    fn identity(&self) -> T {
        T::neg_infinity()
    }

    #[inline(always)]
    fn combine(&self, a: T, b: T) -> T {
        a.max(b)
    }
}

impl<T: Element> Reductor<T> for Min {
    #[inline(always)]
    fn identity(&self) -> T {
        T::infinity()
    }

    #[inline(always)]
    fn combine(&self, a: T, b: T) -> T {
        a.min(b)
    }
}

impl<T: Element> Reductor<T> for All {
    #[inline(always)]
    fn identity(&self) -> T {
        T::one()
    }

    #[inline(always)]
    fn combine(&self, a: T, b: T) -> T {
        T::from_bool(a != T::zero() && b != T::zero())
    }
}

impl<T: Element> Reductor<T> for Any {
    #[inline(always)]
    fn identity(&self) -> T {
        T::zero()
    }

    #[inline(always)]
    fn combine(&self, a: T, b: T) -> T {
        T::from_bool(a != T::zero() || b != T::zero())
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Scalar accumulator plus one accumulator per lane.
struct Accumulator<T> {
    scalar: T,
    lanes: [T; MAX_LANES],
}

impl<T: Element> Accumulator<T> {
    fn new<R: Reductor<T> + ?Sized>(r: &R) -> Self {
        Self {
            scalar: r.identity(),
            lanes: [r.identity(); MAX_LANES],
        }
    }

    #[inline(always)]
    fn push<R: Reductor<T> + ?Sized>(&mut self, r: &R, v: T) {
        self.scalar = r.combine(self.scalar, v);
    }

    #[inline(always)]
    fn push_pack<R: Reductor<T> + ?Sized, const W: usize>(&mut self, r: &R, v: [T; W]) {
        // Traversal bodies exist only for widths up to MAX_LANES.
        debug_assert!(W <= MAX_LANES);
        r.combine_pack(&mut self.lanes[..W], v);
    }

    fn finish<R: Reductor<T> + ?Sized>(&self, r: &R, init: T) -> T {
        r.combine(init, r.combine(self.scalar, r.horizontal(&self.lanes)))
    }
}

struct FoldSink<'r, T, R: ?Sized> {
    r: &'r R,
    acc: Accumulator<T>,
}

impl<T: Element, R: Reductor<T> + ?Sized> Sink<T> for FoldSink<'_, T, R> {
    #[inline(always)]
    fn scalar(&mut self, _i: usize, v: T) {
        self.acc.push(self.r, v);
    }

    #[inline(always)]
    fn pack<const W: usize>(&mut self, _i: usize, v: [T; W]) {
        self.acc.push_pack(self.r, v);
    }
}

/// One result per column.
struct ColwiseSink<'r, T, R: ?Sized> {
    r: &'r R,
    init: T,
    acc: Accumulator<T>,
    results: Vec<T>,
}

impl<T: Element, R: Reductor<T> + ?Sized> Sink<T> for ColwiseSink<'_, T, R> {
    fn begin_column(&mut self, _j: usize) {
        self.acc = Accumulator::new(self.r);
    }

    fn end_column(&mut self, _j: usize) {
        self.results.push(self.acc.finish(self.r, self.init));
    }

    #[inline(always)]
    fn scalar(&mut self, _i: usize, v: T) {
        self.acc.push(self.r, v);
    }

    #[inline(always)]
    fn pack<const W: usize>(&mut self, _i: usize, v: [T; W]) {
        self.acc.push_pack(self.r, v);
    }
}

/// One running accumulator per row.
struct RowwiseSink<'r, T, R: ?Sized> {
    r: &'r R,
    acc: Vec<T>,
}

impl<T: Element, R: Reductor<T> + ?Sized> Sink<T> for RowwiseSink<'_, T, R> {
    #[inline(always)]
    fn scalar(&mut self, i: usize, v: T) {
        self.acc[i] = self.r.combine(self.acc[i], v);
    }

    #[inline(always)]
    fn pack<const W: usize>(&mut self, i: usize, v: [T; W]) {
        // Packs never run past the end of a column.
        debug_assert!(i + W <= self.acc.len());
        self.r.combine_pack(&mut self.acc[i..i + W], v);
    }
}

// ============================================================================
// Generic folds
// ============================================================================

fn usable_lanes<T: Element, R: Reductor<T> + ?Sized>(
    r: &R,
    expr: &Expr<'_, T>,
    config: &EvalConfig,
) -> Option<usize> {
    if expr.is_vectorizable() {
        max_lane_width::<T, R>(r, config)
    } else {
        None
    }
}

/// Fold every element of `expr` into `init` under `config`.
pub fn fold_with<T: Element, R: Reductor<T> + ?Sized>(
    reductor: &R,
    init: T,
    expr: &Expr<'_, T>,
    config: &EvalConfig,
) -> Result<T> {
    let shape = expr.shape()?;
    if shape.is_empty() {
        return Ok(init);
    }
    let lanes = usable_lanes(reductor, expr, config);
    let policy = select(&expr.operands(), &Layout::dense(shape), lanes, config);
    Ok(run_fold(reductor, init, expr, shape, policy))
}

/// Fold every element of `expr` into `init` with the default configuration.
///
/// An empty expression returns `init` unchanged.
pub fn fold<T: Element, R: Reductor<T> + ?Sized>(
    reductor: &R,
    init: T,
    expr: &Expr<'_, T>,
) -> Result<T> {
    fold_with(reductor, init, expr, &EvalConfig::default())
}

/// Fold under an explicit policy. Unsupported vector policies are
/// downgraded to the scalar strategy of the same traversal order.
pub fn fold_with_policy<T: Element, R: Reductor<T> + ?Sized>(
    reductor: &R,
    init: T,
    expr: &Expr<'_, T>,
    policy: Policy,
) -> Result<T> {
    let shape = expr.shape()?;
    if shape.is_empty() {
        return Ok(init);
    }
    let policy = if policy.is_vector()
        && !(expr.is_vectorizable() && capability::<T, R>(reductor, policy.lanes()))
    {
        debug!(
            "{:?} with {} lanes unsupported for fold, downgrading to scalar",
            policy.strategy(),
            policy.lanes()
        );
        Policy::new(policy.strategy().to_scalar(), 1)
    } else {
        policy
    };
    Ok(run_fold(reductor, init, expr, shape, policy))
}

fn run_fold<T: Element, R: Reductor<T> + ?Sized>(
    reductor: &R,
    init: T,
    expr: &Expr<'_, T>,
    shape: Shape,
    policy: Policy,
) -> T {
    let mut sink = FoldSink {
        r: reductor,
        acc: Accumulator::new(reductor),
    };
    kernel::run(expr, policy, shape, &mut sink);
    sink.acc.finish(reductor, init)
}

fn percol_policy<T: Element, R: Reductor<T> + ?Sized>(
    reductor: &R,
    expr: &Expr<'_, T>,
    shape: Shape,
) -> Policy {
    let config = EvalConfig::default();
    let lanes = usable_lanes(reductor, expr, &config);
    select_among(
        &[Strategy::PerColVector, Strategy::PerColScalar],
        &expr.operands(),
        &Layout::dense(shape),
        lanes,
        &config,
    )
}

/// Fold each column of `expr` into `out[(0, j)]`, starting from `init`.
///
/// # Errors
/// Returns [`MatEvalError::ShapeMismatch`](crate::MatEvalError::ShapeMismatch) unless `out` is `1 x ncols`.
pub fn colwise_fold<T: Element, R: Reductor<T> + ?Sized>(
    reductor: &R,
    init: T,
    expr: &Expr<'_, T>,
    out: &mut MatViewMut<'_, T>,
) -> Result<()> {
    let shape = expr.shape()?;
    let expected = Shape::new(1, shape.ncols());
    out.shape().ensure_same(&expected)?;
    if shape.ncols() == 0 {
        return Ok(());
    }
    if shape.nrows() == 0 {
        for j in 0..shape.ncols() {
            out.set(0, j, init);
        }
        return Ok(());
    }

    let policy = percol_policy(reductor, expr, shape);
    let mut sink = ColwiseSink {
        r: reductor,
        init,
        acc: Accumulator::new(reductor),
        results: Vec::with_capacity(shape.ncols()),
    };
    kernel::run(expr, policy, shape, &mut sink);
    for (j, v) in sink.results.into_iter().enumerate() {
        out.set(0, j, v);
    }
    Ok(())
}

/// Fold each row of `expr` into `out[(i, 0)]`, starting from `init`.
///
/// # Errors
/// Returns [`MatEvalError::ShapeMismatch`](crate::MatEvalError::ShapeMismatch) unless `out` is `nrows x 1`.
pub fn rowwise_fold<T: Element, R: Reductor<T> + ?Sized>(
    reductor: &R,
    init: T,
    expr: &Expr<'_, T>,
    out: &mut MatViewMut<'_, T>,
) -> Result<()> {
    let shape = expr.shape()?;
    let expected = Shape::new(shape.nrows(), 1);
    out.shape().ensure_same(&expected)?;
    if shape.nrows() == 0 {
        return Ok(());
    }

    let mut sink = RowwiseSink {
        r: reductor,
        acc: vec![reductor.identity(); shape.nrows()],
    };
    if shape.ncols() > 0 {
        let policy = percol_policy(reductor, expr, shape);
        kernel::run(expr, policy, shape, &mut sink);
    }
    for (i, v) in sink.acc.into_iter().enumerate() {
        out.set(i, 0, reductor.combine(init, v));
    }
    Ok(())
}

// ============================================================================
// Derived reductions
// ============================================================================

/// Sum of all elements (0 for an empty expression).
pub fn sum<T: Element>(expr: &Expr<'_, T>) -> Result<T> {
    if let Some(s) = expr.as_leaf().and_then(|v| v.as_slice()) {
        if let Some(total) = T::try_simd_sum(s) {
            return Ok(total);
        }
    }
    fold(&Sum, T::zero(), expr)
}

/// Arithmetic mean (NaN for an empty expression).
pub fn mean<T: Element>(expr: &Expr<'_, T>) -> Result<T> {
    let shape = expr.shape()?;
    if shape.is_empty() {
        return Ok(T::nan());
    }
    Ok(sum(expr)? / T::from_count(shape.nelems()))
}

/// Largest element (negative infinity for an empty expression).
pub fn maximum<T: Element>(expr: &Expr<'_, T>) -> Result<T> {
    fold(&Max, T::neg_infinity(), expr)
}

/// Smallest element (positive infinity for an empty expression).
pub fn minimum<T: Element>(expr: &Expr<'_, T>) -> Result<T> {
    fold(&Min, T::infinity(), expr)
}

/// Sum of absolute values.
pub fn asum<T: Element>(a: MatView<'_, T>) -> Result<T> {
    fold(&Sum, T::zero(), &Expr::leaf(a).abs())
}

/// Largest absolute value (0 for an empty matrix).
pub fn amax<T: Element>(a: MatView<'_, T>) -> Result<T> {
    fold(&Max, T::zero(), &Expr::leaf(a).abs())
}

/// Sum of squares.
pub fn sqsum<T: Element>(a: MatView<'_, T>) -> Result<T> {
    fold(&Sum, T::zero(), &Expr::leaf(a).sqr())
}

/// Sum of element-wise products.
pub fn dot<T: Element>(a: MatView<'_, T>, b: MatView<'_, T>) -> Result<T> {
    a.shape().ensure_same(&b.shape())?;
    if let (Some(sa), Some(sb)) = (a.as_slice(), b.as_slice()) {
        if let Some(total) = T::try_simd_dot(sa, sb) {
            return Ok(total);
        }
    }
    fold(&Sum, T::zero(), &(Expr::leaf(a) * Expr::leaf(b)))
}

/// Sum of absolute differences.
pub fn diff_asum<T: Element>(a: MatView<'_, T>, b: MatView<'_, T>) -> Result<T> {
    fold(&Sum, T::zero(), &(Expr::leaf(a) - Expr::leaf(b)).abs())
}

/// Sum of squared differences.
pub fn diff_sqsum<T: Element>(a: MatView<'_, T>, b: MatView<'_, T>) -> Result<T> {
    fold(&Sum, T::zero(), &(Expr::leaf(a) - Expr::leaf(b)).sqr())
}

/// Largest absolute difference (0 for empty matrices).
pub fn diff_amax<T: Element>(a: MatView<'_, T>, b: MatView<'_, T>) -> Result<T> {
    fold(&Max, T::zero(), &(Expr::leaf(a) - Expr::leaf(b)).abs())
}

/// Entry-wise vector norms.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Norm {
    L1,
    L2,
    Linf,
}

pub fn norm<T: Element>(a: MatView<'_, T>, kind: Norm) -> Result<T> {
    match kind {
        Norm::L1 => asum(a),
        Norm::L2 => Ok(sqsum(a)?.sqrt()),
        Norm::Linf => amax(a),
    }
}

/// Norm of `a - b`.
pub fn diff_norm<T: Element>(a: MatView<'_, T>, b: MatView<'_, T>, kind: Norm) -> Result<T> {
    match kind {
        Norm::L1 => diff_asum(a, b),
        Norm::L2 => Ok(diff_sqsum(a, b)?.sqrt()),
        Norm::Linf => diff_amax(a, b),
    }
}

pub fn colwise_sum<T: Element>(expr: &Expr<'_, T>, out: &mut MatViewMut<'_, T>) -> Result<()> {
    colwise_fold(&Sum, T::zero(), expr, out)
}

pub fn colwise_maximum<T: Element>(
    expr: &Expr<'_, T>,
    out: &mut MatViewMut<'_, T>,
) -> Result<()> {
    colwise_fold(&Max, T::neg_infinity(), expr, out)
}

pub fn colwise_minimum<T: Element>(
    expr: &Expr<'_, T>,
    out: &mut MatViewMut<'_, T>,
) -> Result<()> {
    colwise_fold(&Min, T::infinity(), expr, out)
}

fn update_each<T: Element>(out: &mut MatViewMut<'_, T>, f: impl Fn(T) -> T) {
    for j in 0..out.ncols() {
        for i in 0..out.nrows() {
            let v = out.get(i, j);
            out.set(i, j, f(v));
        }
    }
}

/// Column means (NaN for columns with no rows).
pub fn colwise_mean<T: Element>(expr: &Expr<'_, T>, out: &mut MatViewMut<'_, T>) -> Result<()> {
    let m = T::from_count(expr.shape()?.nrows());
    colwise_sum(expr, out)?;
    update_each(out, |v| v / m);
    Ok(())
}

pub fn colwise_sqsum<T: Element>(a: MatView<'_, T>, out: &mut MatViewMut<'_, T>) -> Result<()> {
    colwise_fold(&Sum, T::zero(), &Expr::leaf(a).sqr(), out)
}

/// Norm of each column of `a`, written into the `1 x ncols` matrix `out`.
pub fn colwise_norm<T: Element>(
    a: MatView<'_, T>,
    kind: Norm,
    out: &mut MatViewMut<'_, T>,
) -> Result<()> {
    match kind {
        Norm::L1 => colwise_fold(&Sum, T::zero(), &Expr::leaf(a).abs(), out),
        Norm::L2 => {
            colwise_sqsum(a, out)?;
            update_each(out, |v| v.sqrt());
            Ok(())
        }
        Norm::Linf => colwise_fold(&Max, T::zero(), &Expr::leaf(a).abs(), out),
    }
}

/// Dot product of each pair of corresponding columns.
pub fn colwise_dot<T: Element>(
    a: MatView<'_, T>,
    b: MatView<'_, T>,
    out: &mut MatViewMut<'_, T>,
) -> Result<()> {
    colwise_fold(&Sum, T::zero(), &(Expr::leaf(a) * Expr::leaf(b)), out)
}

/// 1 for columns whose elements are all nonzero, else 0.
pub fn colwise_all<T: Element>(expr: &Expr<'_, T>, out: &mut MatViewMut<'_, T>) -> Result<()> {
    colwise_fold(&All, T::one(), expr, out)
}

/// 1 for columns with at least one nonzero element, else 0.
pub fn colwise_any<T: Element>(expr: &Expr<'_, T>, out: &mut MatViewMut<'_, T>) -> Result<()> {
    colwise_fold(&Any, T::zero(), expr, out)
}

pub fn rowwise_sum<T: Element>(expr: &Expr<'_, T>, out: &mut MatViewMut<'_, T>) -> Result<()> {
    rowwise_fold(&Sum, T::zero(), expr, out)
}

pub fn rowwise_maximum<T: Element>(
    expr: &Expr<'_, T>,
    out: &mut MatViewMut<'_, T>,
) -> Result<()> {
    rowwise_fold(&Max, T::neg_infinity(), expr, out)
}

pub fn rowwise_minimum<T: Element>(
    expr: &Expr<'_, T>,
    out: &mut MatViewMut<'_, T>,
) -> Result<()> {
    rowwise_fold(&Min, T::infinity(), expr, out)
}

/// Row means (NaN for rows with no columns).
pub fn rowwise_mean<T: Element>(expr: &Expr<'_, T>, out: &mut MatViewMut<'_, T>) -> Result<()> {
    let n = T::from_count(expr.shape()?.ncols());
    rowwise_sum(expr, out)?;
    update_each(out, |v| v / n);
    Ok(())
}

pub fn rowwise_sqsum<T: Element>(a: MatView<'_, T>, out: &mut MatViewMut<'_, T>) -> Result<()> {
    rowwise_fold(&Sum, T::zero(), &Expr::leaf(a).sqr(), out)
}

/// Norm of each row of `a`, written into the `nrows x 1` matrix `out`.
pub fn rowwise_norm<T: Element>(
    a: MatView<'_, T>,
    kind: Norm,
    out: &mut MatViewMut<'_, T>,
) -> Result<()> {
    match kind {
        Norm::L1 => rowwise_fold(&Sum, T::zero(), &Expr::leaf(a).abs(), out),
        Norm::L2 => {
            rowwise_sqsum(a, out)?;
            update_each(out, |v| v.sqrt());
            Ok(())
        }
        Norm::Linf => rowwise_fold(&Max, T::zero(), &Expr::leaf(a).abs(), out),
    }
}

/// Dot product of each pair of corresponding rows.
pub fn rowwise_dot<T: Element>(
    a: MatView<'_, T>,
    b: MatView<'_, T>,
    out: &mut MatViewMut<'_, T>,
) -> Result<()> {
    rowwise_fold(&Sum, T::zero(), &(Expr::leaf(a) * Expr::leaf(b)), out)
}

pub fn rowwise_all<T: Element>(expr: &Expr<'_, T>, out: &mut MatViewMut<'_, T>) -> Result<()> {
    rowwise_fold(&All, T::one(), expr, out)
}

pub fn rowwise_any<T: Element>(expr: &Expr<'_, T>, out: &mut MatViewMut<'_, T>) -> Result<()> {
    rowwise_fold(&Any, T::zero(), expr, out)
}

/// Whether every element is nonzero (true for an empty expression).
pub fn all<T: Element>(expr: &Expr<'_, T>) -> Result<bool> {
    Ok(fold(&All, T::one(), expr)? != T::zero())
}

/// Whether some element is nonzero (false for an empty expression).
pub fn any<T: Element>(expr: &Expr<'_, T>) -> Result<bool> {
    Ok(fold(&Any, T::zero(), expr)? != T::zero())
}
