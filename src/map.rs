//! Element-wise evaluation into a destination.
//!
//! Every entry point validates shapes before touching the destination,
//! selects (or accepts) a [`Policy`], and runs the matching traversal with
//! an [`EwiseKernel`] deciding how each value lands in the destination.

use log::{debug, trace};

use crate::broadcast::fill_with;
use crate::element::Element;
use crate::expr::Expr;
use crate::kernel::{self, Sink};
use crate::lanes::{capability, max_lane_width, EvalConfig, LaneCapable};
use crate::policy::{select, Policy};
use crate::view::{DenseMat, MatViewMut};
use crate::Result;

// ============================================================================
// Kernels
// ============================================================================

/// How a computed value is written into a destination element.
pub trait EwiseKernel<T: Element>: LaneCapable {
    fn apply(&self, s: T, d: &mut T);

    /// Apply to `W` consecutive destination elements; `d.len() == W`.
    #[inline(always)]
    fn apply_pack<const W: usize>(&self, s: [T; W], d: &mut [T]) {
        for (d, s) in d.iter_mut().zip(s) {
            self.apply(s, d);
        }
    }
}

/// `d = s`
#[derive(Copy, Clone, Debug, Default)]
pub struct CopyKernel;

impl LaneCapable for CopyKernel {}

impl<T: Element> EwiseKernel<T> for CopyKernel {
    #[inline(always)]
    fn apply(&self, s: T, d: &mut T) {
        *d = s;
    }

    #[inline(always)]
    fn apply_pack<const W: usize>(&self, s: [T; W], d: &mut [T]) {
        d.copy_from_slice(&s);
    }
}

/// `d += s`
#[derive(Copy, Clone, Debug, Default)]
pub struct AccumKernel;

impl LaneCapable for AccumKernel {}

impl<T: Element> EwiseKernel<T> for AccumKernel {
    #[inline(always)]
    fn apply(&self, s: T, d: &mut T) {
        *d = *d + s;
    }
}

/// `d += c * s`
#[derive(Copy, Clone, Debug)]
pub struct ScaledAccumKernel<T>(pub T);

impl<T> LaneCapable for ScaledAccumKernel<T> {}

impl<T: Element> EwiseKernel<T> for ScaledAccumKernel<T> {
    #[inline(always)]
    fn apply(&self, s: T, d: &mut T) {
        *d = *d + self.0 * s;
    }
}

/// `d = f(s)` with a scalar closure. Never vectorized.
pub struct MapKernel<F>(pub F);

impl<F> LaneCapable for MapKernel<F> {
    fn supports_lane_width(&self, _width: usize) -> bool {
        false
    }
}

impl<T: Element, F: Fn(T) -> T> EwiseKernel<T> for MapKernel<F> {
    #[inline(always)]
    fn apply(&self, s: T, d: &mut T) {
        *d = (self.0)(s);
    }
}

// ============================================================================
// Destination sink
// ============================================================================

/// Writes traversal output through a kernel into destination storage.
struct DestSink<'d, 'k, T, K: ?Sized> {
    data: &'d mut [T],
    offset: usize,
    col_stride: isize,
    /// Storage step between consecutive inner indices.
    step: isize,
    /// Storage index of inner index 0 in the current column.
    base: usize,
    kernel: &'k K,
}

impl<'d, 'k, T: Element, K: EwiseKernel<T> + ?Sized> DestSink<'d, 'k, T, K> {
    /// Under linear traversal the destination must have a linear step.
    fn new(dest: &'d mut MatViewMut<'_, T>, kernel: &'k K, linear: bool) -> Self {
        let offset = dest.offset_of(0, 0);
        let col_stride = dest.col_stride();
        let step = if linear {
            dest.layout().linear_step().unwrap_or(1)
        } else {
            dest.row_stride()
        };
        Self {
            data: dest.raw_data_mut(),
            offset,
            col_stride,
            step,
            base: offset,
            kernel,
        }
    }

    #[inline(always)]
    fn index(&self, i: usize) -> usize {
        (self.base as isize + i as isize * self.step) as usize
    }
}

impl<T: Element, K: EwiseKernel<T> + ?Sized> Sink<T> for DestSink<'_, '_, T, K> {
    #[inline(always)]
    fn begin_column(&mut self, j: usize) {
        self.base = (self.offset as isize + j as isize * self.col_stride) as usize;
    }

    #[inline(always)]
    fn scalar(&mut self, i: usize, v: T) {
        let idx = self.index(i);
        self.kernel.apply(v, &mut self.data[idx]);
    }

    #[inline(always)]
    fn pack<const W: usize>(&mut self, i: usize, v: [T; W]) {
        if self.step == 1 {
            // Traversals never emit a pack past the end of a column.
            let idx = self.index(i);
            debug_assert!(idx + W <= self.data.len());
            self.kernel.apply_pack(v, &mut self.data[idx..idx + W]);
        } else {
            // Strided row or column under linear traversal.
            for (l, s) in v.into_iter().enumerate() {
                let idx = self.index(i + l);
                self.kernel.apply(s, &mut self.data[idx]);
            }
        }
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Run `kernel` under `policy`, staging through scratch when the
/// destination cannot be written directly under that policy.
fn execute<T: Element, K: EwiseKernel<T> + ?Sized>(
    kernel: &K,
    expr: &Expr<'_, T>,
    dest: &mut MatViewMut<'_, T>,
    policy: Policy,
) {
    let shape = dest.shape();
    if policy.strategy().accepts_destination(&dest.layout()) {
        let mut sink = DestSink::new(dest, kernel, policy.is_linear());
        kernel::run(expr, policy, shape, &mut sink);
        return;
    }

    debug!(
        "staging {} destination (row stride {}, col stride {}) through scratch for {:?}",
        shape,
        dest.row_stride(),
        dest.col_stride(),
        policy.strategy()
    );
    let mut scratch = DenseMat::from_fn(shape.nrows(), shape.ncols(), |i, j| dest.get(i, j));
    {
        let mut view = scratch.view_mut();
        let mut sink = DestSink::new(&mut view, kernel, policy.is_linear());
        kernel::run(expr, policy, shape, &mut sink);
    }
    for j in 0..shape.ncols() {
        for i in 0..shape.nrows() {
            dest.set(i, j, scratch[(i, j)]);
        }
    }
}

/// Evaluate `expr` into `dest` through `kernel`, selecting the policy
/// under `config`. Returns the policy used.
///
/// # Errors
/// Returns [`MatEvalError::ShapeMismatch`](crate::MatEvalError::ShapeMismatch)
/// if the expression is malformed or its shape differs from `dest`. The
/// destination is untouched on error.
pub fn ewise_into<T: Element, K: EwiseKernel<T> + ?Sized>(
    kernel: &K,
    expr: &Expr<'_, T>,
    dest: &mut MatViewMut<'_, T>,
    config: &EvalConfig,
) -> Result<Policy> {
    let shape = expr.shape()?;
    dest.shape().ensure_same(&shape)?;

    let lanes = if expr.is_vectorizable() {
        max_lane_width::<T, K>(kernel, config)
    } else {
        None
    };
    let policy = select(&expr.operands(), &dest.layout(), lanes, config);
    if shape.is_empty() {
        return Ok(policy);
    }
    if let Some(value) = expr.single_value() {
        trace!("single-value broadcast into {}: fill", shape);
        fill_with(kernel, value, dest);
        return Ok(policy);
    }
    execute(kernel, expr, dest, policy);
    Ok(policy)
}

/// Evaluate with an explicit policy instead of selecting one.
///
/// A vector policy the kernel or expression cannot honor is downgraded to
/// the scalar strategy of the same traversal order.
pub fn ewise_into_with_policy<T: Element, K: EwiseKernel<T> + ?Sized>(
    kernel: &K,
    expr: &Expr<'_, T>,
    dest: &mut MatViewMut<'_, T>,
    policy: Policy,
) -> Result<()> {
    let shape = expr.shape()?;
    dest.shape().ensure_same(&shape)?;
    if shape.is_empty() {
        return Ok(());
    }
    if let Some(value) = expr.single_value() {
        fill_with(kernel, value, dest);
        return Ok(());
    }
    let policy = if policy.is_vector()
        && !(expr.is_vectorizable() && capability::<T, K>(kernel, policy.lanes()))
    {
        debug!(
            "{:?} with {} lanes unsupported, downgrading to scalar",
            policy.strategy(),
            policy.lanes()
        );
        Policy::new(policy.strategy().to_scalar(), 1)
    } else {
        policy
    };
    execute(kernel, expr, dest, policy);
    Ok(())
}

/// `dest = expr` with the default configuration.
pub fn evaluate<T: Element>(expr: &Expr<'_, T>, dest: &mut MatViewMut<'_, T>) -> Result<()> {
    ewise_into(&CopyKernel, expr, dest, &EvalConfig::default()).map(|_| ())
}

/// `dest = expr` under `config`. Returns the policy used.
pub fn evaluate_with<T: Element>(
    expr: &Expr<'_, T>,
    dest: &mut MatViewMut<'_, T>,
    config: &EvalConfig,
) -> Result<Policy> {
    ewise_into(&CopyKernel, expr, dest, config)
}

/// `dest = expr` under an explicit policy.
pub fn evaluate_with_policy<T: Element>(
    expr: &Expr<'_, T>,
    dest: &mut MatViewMut<'_, T>,
    policy: Policy,
) -> Result<()> {
    ewise_into_with_policy(&CopyKernel, expr, dest, policy)
}

/// `dest += expr`
pub fn accum_into<T: Element>(expr: &Expr<'_, T>, dest: &mut MatViewMut<'_, T>) -> Result<()> {
    ewise_into(&AccumKernel, expr, dest, &EvalConfig::default()).map(|_| ())
}

/// `dest += c * expr`
pub fn accum_scaled_into<T: Element>(
    c: T,
    expr: &Expr<'_, T>,
    dest: &mut MatViewMut<'_, T>,
) -> Result<()> {
    ewise_into(&ScaledAccumKernel(c), expr, dest, &EvalConfig::default()).map(|_| ())
}

/// `dest = f(expr)` element-wise.
pub fn map_into<T: Element, F: Fn(T) -> T>(
    expr: &Expr<'_, T>,
    dest: &mut MatViewMut<'_, T>,
    f: F,
) -> Result<()> {
    ewise_into(&MapKernel(f), expr, dest, &EvalConfig::default()).map(|_| ())
}
