//! BLAS-style conveniences over views.
//!
//! Each one builds a small expression and runs it through the element-wise
//! evaluator, so layouts and strategy selection are handled the same way as
//! for [`evaluate`](crate::evaluate).

use crate::broadcast::fill_with;
use crate::element::Element;
use crate::expr::Expr;
use crate::map::{accum_scaled_into, evaluate, CopyKernel};
use crate::view::{MatView, MatViewMut};
use crate::Result;

/// `dest = src`
pub fn copy_into<T: Element>(dest: &mut MatViewMut<'_, T>, src: MatView<'_, T>) -> Result<()> {
    evaluate(&Expr::leaf(src), dest)
}

/// `dest = alpha * src`
pub fn copy_scale<T: Element>(
    dest: &mut MatViewMut<'_, T>,
    src: MatView<'_, T>,
    alpha: T,
) -> Result<()> {
    let e = Expr::constant(alpha, src.nrows(), src.ncols()) * Expr::leaf(src);
    evaluate(&e, dest)
}

/// Set every element of `dest` to `value`, whatever its layout.
pub fn fill<T: Element>(dest: &mut MatViewMut<'_, T>, value: T) {
    fill_with(&CopyKernel, value, dest);
}

pub fn zero<T: Element>(dest: &mut MatViewMut<'_, T>) {
    fill(dest, T::zero());
}

/// `dest = a + b`
pub fn add<T: Element>(
    dest: &mut MatViewMut<'_, T>,
    a: MatView<'_, T>,
    b: MatView<'_, T>,
) -> Result<()> {
    evaluate(&(Expr::leaf(a) + Expr::leaf(b)), dest)
}

/// `dest = a * b` element-wise.
pub fn mul<T: Element>(
    dest: &mut MatViewMut<'_, T>,
    a: MatView<'_, T>,
    b: MatView<'_, T>,
) -> Result<()> {
    evaluate(&(Expr::leaf(a) * Expr::leaf(b)), dest)
}

/// `dest += alpha * x`
pub fn axpy<T: Element>(dest: &mut MatViewMut<'_, T>, x: MatView<'_, T>, alpha: T) -> Result<()> {
    accum_scaled_into(alpha, &Expr::leaf(x), dest)
}
