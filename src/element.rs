//! Numeric element types accepted by the evaluation engine.
//!
//! The engine is generic over a small closed set of floating-point element
//! types. Each type reports its size so the capability query can derive how
//! many values fit in one vector register of a given [`SimdKind`].
//!
//! [`SimdKind`]: crate::SimdKind

use std::fmt::Debug;

use num_traits::Float;

use crate::simd::MaybeSimdOps;

/// Element type of a matrix operand.
///
/// Implemented for `f32` and `f64`. Both types support vector lanes; the
/// `SIMD_CAPABLE` flag exists so that scalar-only element types can be added
/// without touching the selector.
pub trait Element: Float + Default + Debug + MaybeSimdOps + 'static {
    /// Whether values of this type can be packed into vector lanes.
    const SIMD_CAPABLE: bool;

    /// Short type name used in log messages.
    const NAME: &'static str;

    /// Convert a boolean predicate into a numeric mask value (1 or 0).
    #[inline(always)]
    fn from_bool(b: bool) -> Self {
        if b {
            Self::one()
        } else {
            Self::zero()
        }
    }

    /// Convert an element count into this type (used by `mean`).
    fn from_count(n: usize) -> Self;
}

macro_rules! impl_element {
    ($($t:ty),*) => {
        $(
            impl Element for $t {
                const SIMD_CAPABLE: bool = true;
                const NAME: &'static str = stringify!($t);

                #[inline(always)]
                fn from_count(n: usize) -> Self {
                    n as $t
                }
            }
        )*
    };
}

impl_element!(f32, f64);
