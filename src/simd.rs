//! Runtime instruction-set dispatch for the evaluation hot paths.
//!
//! Two things here are used by the evaluators:
//!
//! - [`dispatch`] wraps the vector traversal bodies in `kernel`, so the
//!   fixed-width lane arrays that accessors load and sinks store are
//!   compiled with the widest instruction set `pulp` detects.
//! - [`MaybeSimdOps`] gives `sum` and `dot` a fast path when every operand
//!   is a single contiguous leaf.
//!
//! Without the `simd` feature both reduce to the portable code.

#[inline(always)]
pub(crate) fn dispatch<R>(f: impl FnOnce() -> R) -> R {
    #[cfg(feature = "simd")]
    {
        pulp::Arch::new().dispatch(f)
    }
    #[cfg(not(feature = "simd"))]
    {
        f()
    }
}

/// [`dispatch`] for traversals of at least 64 elements; shorter ones run
/// directly.
#[inline(always)]
pub(crate) fn dispatch_if_large<R>(len: usize, f: impl FnOnce() -> R) -> R {
    if len >= 64 {
        dispatch(f)
    } else {
        f()
    }
}

/// Whole-slice sum and dot product for elements with a pulp kernel.
///
/// `None` means no kernel is available and the caller folds through the
/// generic reduction path instead. With the `simd` feature, `f32` and `f64`
/// return `Some` for slices of equal length.
pub trait MaybeSimdOps: Copy + Sized {
    fn try_simd_sum(_src: &[Self]) -> Option<Self> {
        None
    }
    fn try_simd_dot(_a: &[Self], _b: &[Self]) -> Option<Self> {
        None
    }
}

#[cfg(not(feature = "simd"))]
impl MaybeSimdOps for f32 {}

#[cfg(not(feature = "simd"))]
impl MaybeSimdOps for f64 {}

#[cfg(feature = "simd")]
mod simd_impls {
    use super::MaybeSimdOps;
    use pulp::{Simd, WithSimd};

    macro_rules! impl_simd_ops {
        ($t:ty, $as_simd:ident, $splat:ident, $add:ident, $mul_add:ident, $reduce:ident) => {
            impl MaybeSimdOps for $t {
                fn try_simd_sum(src: &[$t]) -> Option<$t> {
                    struct Sum<'a>(&'a [$t]);
                    impl WithSimd for Sum<'_> {
                        type Output = $t;

                        #[inline(always)]
                        fn with_simd<S: Simd>(self, simd: S) -> $t {
                            let (head, tail) = S::$as_simd(self.0);
                            let mut acc0 = simd.$splat(0.0);
                            let mut acc1 = simd.$splat(0.0);
                            let mut pairs = head.chunks_exact(2);
                            for pair in &mut pairs {
                                acc0 = simd.$add(acc0, pair[0]);
                                acc1 = simd.$add(acc1, pair[1]);
                            }
                            for &v in pairs.remainder() {
                                acc0 = simd.$add(acc0, v);
                            }
                            let mut total = simd.$reduce(simd.$add(acc0, acc1));
                            for &x in tail {
                                total += x;
                            }
                            total
                        }
                    }

                    Some(pulp::Arch::new().dispatch(Sum(src)))
                }

                fn try_simd_dot(a: &[$t], b: &[$t]) -> Option<$t> {
                    if a.len() != b.len() {
                        return None;
                    }
                    struct Dot<'a> {
                        a: &'a [$t],
                        b: &'a [$t],
                    }
                    impl WithSimd for Dot<'_> {
                        type Output = $t;

                        #[inline(always)]
                        fn with_simd<S: Simd>(self, simd: S) -> $t {
                            let (a_head, a_tail) = S::$as_simd(self.a);
                            let (b_head, b_tail) = S::$as_simd(self.b);
                            let mut acc = simd.$splat(0.0);
                            for (&x, &y) in a_head.iter().zip(b_head.iter()) {
                                acc = simd.$mul_add(x, y, acc);
                            }
                            let mut total = simd.$reduce(acc);
                            for (&x, &y) in a_tail.iter().zip(b_tail.iter()) {
                                total += x * y;
                            }
                            total
                        }
                    }

                    Some(pulp::Arch::new().dispatch(Dot { a, b }))
                }
            }
        };
    }

    impl_simd_ops!(f32, as_simd_f32s, splat_f32s, add_f32s, mul_add_f32s, reduce_sum_f32s);
    impl_simd_ops!(f64, as_simd_f64s, splat_f64s, add_f64s, mul_add_f64s, reduce_sum_f64s);
}
