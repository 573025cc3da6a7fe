//! Expression evaluation over strided dense matrices.
//!
//! This crate evaluates element-wise and reduction expressions over
//! column-major matrices stored in heterogeneous layouts: fully packed,
//! column blocks with a leading dimension, and grids strided in both
//! directions. For every call it picks one of four access strategies from a
//! small cost model, then runs a monomorphized traversal body.
//!
//! # Core Types
//!
//! - [`MatView`] / [`MatViewMut`]: zero-copy column-major strided views
//! - [`DenseMat`]: owned packed matrix
//! - [`Expr`]: expression tree (leaves, constants, repeated vectors, unary,
//!   binary and conditional nodes)
//! - [`Policy`] / [`Strategy`]: the access strategy chosen for one call
//! - [`EvalConfig`]: SIMD width and cost constants threaded into selection
//!
//! # Access Strategies
//!
//! | Strategy         | Traversal                         | Requires                     |
//! |------------------|-----------------------------------|------------------------------|
//! | `LinearVector`   | one index, vector lanes           | contiguous, a single row or column (or cached) |
//! | `LinearScalar`   | one index, one element at a time  | contiguous, a single row or column (or cached) |
//! | `PerColVector`   | column by column, vector lanes    | unit-stride columns (or cached) |
//! | `PerColScalar`   | column by column, scalar          | nothing                      |
//!
//! Operands that cannot serve a strategy directly are copied once into a
//! scratch buffer owned by the call. Selection never fails: when no vector
//! width is usable a scalar strategy is chosen.
//!
//! # Primary API
//!
//! ## Element-wise
//!
//! - [`evaluate`], [`evaluate_with`], [`evaluate_with_policy`]: `dest = expr`
//! - [`accum_into`], [`accum_scaled_into`]: `dest += expr`, `dest += c * expr`
//! - [`map_into`], [`ewise_into`]: custom closures and kernels
//!
//! ## Reductions
//!
//! - [`fold`], [`fold_with`], [`fold_with_policy`]
//! - [`sum`], [`mean`], [`maximum`], [`minimum`], [`asum`], [`amax`], [`sqsum`], [`dot`]
//! - [`diff_asum`], [`diff_sqsum`], [`diff_amax`], [`norm`], [`diff_norm`]
//! - [`all`], [`any`] over comparison masks
//! - column-wise: [`colwise_fold`], [`colwise_sum`], [`colwise_maximum`], [`colwise_minimum`],
//!   [`colwise_mean`], [`colwise_sqsum`], [`colwise_norm`], [`colwise_dot`], [`colwise_all`],
//!   [`colwise_any`]
//! - row-wise: [`rowwise_fold`], [`rowwise_sum`], [`rowwise_maximum`], [`rowwise_minimum`],
//!   [`rowwise_mean`], [`rowwise_sqsum`], [`rowwise_norm`], [`rowwise_dot`], [`rowwise_all`],
//!   [`rowwise_any`]
//!
//! # Example
//!
//! ```rust
//! use strided_mateval::{evaluate, sum, DenseMat, Expr, MatView};
//!
//! let a = DenseMat::from_fn(3, 4, |i, j| (i + 3 * j) as f64);
//! let row_data = [10.0, 20.0, 30.0, 40.0];
//! let row = MatView::dense(&row_data, 1, 4).unwrap();
//!
//! // d = a + repeat_row(row, 3)
//! let expr = Expr::leaf(a.view()) + Expr::repeat_row(row, 3);
//! let mut d = DenseMat::zeros(3, 4);
//! evaluate(&expr, &mut d.view_mut()).unwrap();
//! assert_eq!(d[(2, 3)], 11.0 + 40.0);
//!
//! let total = sum(&Expr::leaf(d.view())).unwrap();
//! assert_eq!(total, 66.0 + 3.0 * 100.0);
//! ```

mod access;
mod broadcast;
mod element;
mod expr;
mod kernel;
mod lanes;
mod map;
mod ops;
mod policy;
mod reduce;
mod shape;
mod simd;
mod view;

pub use element::Element;
pub use expr::{BinaryOp, Expr, UnaryOp};
pub use lanes::{capability, cost, max_lane_width, EvalConfig, LaneCapable, SimdKind};
pub use map::{
    accum_into, accum_scaled_into, evaluate, evaluate_with, evaluate_with_policy, ewise_into,
    ewise_into_with_policy, map_into, AccumKernel, CopyKernel, EwiseKernel, MapKernel,
    ScaledAccumKernel,
};
pub use ops::{add, axpy, copy_into, copy_scale, fill, mul, zero};
pub use policy::{select, Operand, Policy, Strategy};
pub use reduce::{
    all, amax, any, asum, colwise_all, colwise_any, colwise_dot, colwise_fold, colwise_maximum,
    colwise_mean, colwise_minimum, colwise_norm, colwise_sqsum, colwise_sum, diff_amax,
    diff_asum, diff_norm, diff_sqsum, dot, fold, fold_with, fold_with_policy, maximum, mean,
    minimum, norm, rowwise_all, rowwise_any, rowwise_dot, rowwise_fold, rowwise_maximum,
    rowwise_mean, rowwise_minimum, rowwise_norm, rowwise_sqsum, rowwise_sum, sqsum, sum, All,
    Any, Max, Min, Norm, Reductor, Sum,
};
pub use shape::{Layout, Shape};
pub use simd::MaybeSimdOps;
pub use view::{DenseMat, MatView, MatViewMut};

// ============================================================================
// Error types
// ============================================================================

/// Errors reported by the evaluation engine.
///
/// Every error is returned before any element of the destination is written.
#[derive(Debug, thiserror::Error)]
pub enum MatEvalError {
    /// A dimension was negative.
    #[error("invalid shape: rows={rows}, cols={cols}")]
    InvalidShape { rows: isize, cols: isize },

    /// Operand and destination shapes are incompatible.
    #[error("shape mismatch: {0} vs {1}")]
    ShapeMismatch(Shape, Shape),

    /// A view would address memory outside its buffer, or its offset
    /// computation overflowed.
    #[error("offset overflow while computing element position")]
    OffsetOverflow,
}

/// Result type for evaluation operations.
pub type Result<T> = std::result::Result<T, MatEvalError>;
