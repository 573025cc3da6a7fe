//! Vector-lane capability query and the access cost model.
//!
//! Costs are ordinal integers, not time estimates. Only their relative
//! ordering matters to the selector, and the constants live in
//! [`EvalConfig`] so callers can tune them.

use std::sync::OnceLock;

use crate::element::Element;
use crate::policy::{Operand, Strategy};
use crate::shape::Shape;

/// Width of the vector registers the engine plans for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SimdKind {
    /// No vector lanes.
    Scalar,
    /// 128-bit registers (SSE2 on x86-64, NEON on AArch64).
    Sse,
    /// 256-bit registers.
    Avx,
    /// 512-bit registers.
    Avx512,
}

impl SimdKind {
    /// Register width in bytes (0 for scalar).
    #[inline]
    pub const fn register_bytes(self) -> usize {
        match self {
            Self::Scalar => 0,
            Self::Sse => 16,
            Self::Avx => 32,
            Self::Avx512 => 64,
        }
    }

    /// Number of `T` values per register (1 for scalar).
    #[inline]
    pub fn lanes<T>(self) -> usize {
        match self {
            Self::Scalar => 1,
            kind => (kind.register_bytes() / std::mem::size_of::<T>()).max(1),
        }
    }

    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Sse => "sse",
            Self::Avx => "avx",
            Self::Avx512 => "avx512",
        }
    }

    /// Best kind supported by the running CPU. Cached after the first call.
    #[inline]
    pub fn detect() -> SimdKind {
        *DETECTED.get_or_init(detect_uncached)
    }
}

impl std::fmt::Display for SimdKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

static DETECTED: OnceLock<SimdKind> = OnceLock::new();

#[cold]
fn detect_uncached() -> SimdKind {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx512f") {
            SimdKind::Avx512
        } else if is_x86_feature_detected!("avx") {
            SimdKind::Avx
        } else {
            SimdKind::Sse
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        SimdKind::Sse
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        SimdKind::Scalar
    }
}

/// Explicit evaluation configuration.
///
/// The default plans for 128-bit lanes, which every x86-64 and AArch64
/// target provides. Use [`EvalConfig::native`] to plan for the detected
/// register width instead.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EvalConfig {
    pub simd: SimdKind,
    /// Cost of copying a non-contiguous operand into scratch.
    pub cache_cost: u32,
    /// Penalty for per-column traversal of short columns.
    pub short_percol_cost: u32,
    /// Columns shorter than this pay `short_percol_cost`.
    pub short_length_threshold: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            simd: SimdKind::Sse,
            cache_cost: 1000,
            short_percol_cost: 200,
            short_length_threshold: 4,
        }
    }
}

impl EvalConfig {
    /// Default costs with the SIMD kind detected at runtime.
    pub fn native() -> Self {
        Self {
            simd: SimdKind::detect(),
            ..Self::default()
        }
    }

    /// Default costs with scalar-only evaluation.
    pub fn scalar() -> Self {
        Self {
            simd: SimdKind::Scalar,
            ..Self::default()
        }
    }

    pub fn with_simd(mut self, simd: SimdKind) -> Self {
        self.simd = simd;
        self
    }
}

/// Kernels and reductors report which lane widths they can process.
pub trait LaneCapable {
    fn supports_lane_width(&self, width: usize) -> bool {
        let _ = width;
        true
    }
}

impl<K: LaneCapable + ?Sized> LaneCapable for &K {
    fn supports_lane_width(&self, width: usize) -> bool {
        (**self).supports_lane_width(width)
    }
}

/// Whether `kernel` can run on `T` values packed `width` to a register.
///
/// Only the widths 2, 4, 8 and 16 have vectorized traversal bodies.
pub fn capability<T: Element, K: LaneCapable + ?Sized>(kernel: &K, width: usize) -> bool {
    matches!(width, 2 | 4 | 8 | 16) && T::SIMD_CAPABLE && kernel.supports_lane_width(width)
}

/// Largest lane width usable for `kernel` under `config`, halving from the
/// register width until the kernel accepts one.
pub fn max_lane_width<T: Element, K: LaneCapable + ?Sized>(
    kernel: &K,
    config: &EvalConfig,
) -> Option<usize> {
    let mut width = config.simd.lanes::<T>();
    while width >= 2 {
        if capability::<T, K>(kernel, width) {
            return Some(width);
        }
        width /= 2;
    }
    None
}

/// Penalty for per-column strategies on short columns.
///
/// Vector traversal is also penalized when a column holds fewer elements
/// than one register.
pub(crate) fn short_penalty(
    strategy: Strategy,
    shape: Shape,
    lanes: usize,
    config: &EvalConfig,
) -> u32 {
    if !strategy.is_percol() || shape.is_empty() {
        return 0;
    }
    let m = shape.nrows();
    let short = m < config.short_length_threshold || (strategy.is_vector() && m < lanes);
    if short {
        config.short_percol_cost
    } else {
        0
    }
}

/// Cost of serving `operand` under `strategy`, excluding shape penalties.
pub(crate) fn access_cost(strategy: Strategy, operand: &Operand, config: &EvalConfig) -> u32 {
    match *operand {
        Operand::Constant(_) => 0,
        Operand::Leaf(layout) => {
            let direct = match strategy {
                Strategy::LinearVector | Strategy::LinearScalar => layout.linear_step().is_some(),
                Strategy::PerColVector => layout.is_percol_contiguous(),
                Strategy::PerColScalar => true,
            };
            if direct {
                0
            } else {
                config.cache_cost
            }
        }
        Operand::RepeatCol { target, .. } | Operand::RepeatRow { target, .. } => {
            if strategy.is_linear() && !target.is_vector() && !target.is_empty() {
                config.cache_cost
            } else {
                0
            }
        }
    }
}

/// Ordinal cost of one operand under `strategy`: its access cost plus the
/// short-column penalty of its shape. Never negative.
pub fn cost(strategy: Strategy, operand: &Operand, lanes: usize, config: &EvalConfig) -> u32 {
    access_cost(strategy, operand, config)
        + short_penalty(strategy, operand.shape(), lanes, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Layout;

    struct NoWide;

    impl LaneCapable for NoWide {
        fn supports_lane_width(&self, width: usize) -> bool {
            width <= 4
        }
    }

    struct Any;
    impl LaneCapable for Any {}

    #[test]
    fn test_lane_counts() {
        assert_eq!(SimdKind::Sse.lanes::<f64>(), 2);
        assert_eq!(SimdKind::Sse.lanes::<f32>(), 4);
        assert_eq!(SimdKind::Avx.lanes::<f64>(), 4);
        assert_eq!(SimdKind::Avx512.lanes::<f32>(), 16);
        assert_eq!(SimdKind::Scalar.lanes::<f64>(), 1);
    }

    #[test]
    fn test_detection_is_cached() {
        assert_eq!(SimdKind::detect(), SimdKind::detect());
    }

    #[test]
    fn test_capability_widths() {
        assert!(capability::<f64, _>(&Any, 4));
        assert!(!capability::<f64, _>(&Any, 3));
        assert!(!capability::<f64, _>(&Any, 1));
        assert!(!capability::<f64, _>(&NoWide, 8));
    }

    #[test]
    fn test_max_lane_width_downgrades() {
        let avx512 = EvalConfig::default().with_simd(SimdKind::Avx512);
        assert_eq!(max_lane_width::<f32, _>(&Any, &avx512), Some(16));
        assert_eq!(max_lane_width::<f32, _>(&NoWide, &avx512), Some(4));
        assert_eq!(max_lane_width::<f64, _>(&Any, &EvalConfig::scalar()), None);
    }

    #[test]
    fn test_leaf_costs() {
        let config = EvalConfig::default();
        let dense = Operand::Leaf(Layout::dense(Shape::new(8, 8)));
        let block = Operand::Leaf(Layout::strided(Shape::new(8, 8), 1, 10));
        let grid = Operand::Leaf(Layout::strided(Shape::new(8, 8), 2, 20));

        assert_eq!(cost(Strategy::LinearVector, &dense, 2, &config), 0);
        assert_eq!(cost(Strategy::LinearScalar, &block, 2, &config), 1000);
        assert_eq!(cost(Strategy::PerColVector, &block, 2, &config), 0);
        assert_eq!(cost(Strategy::PerColVector, &grid, 2, &config), 1000);
        assert_eq!(cost(Strategy::PerColScalar, &grid, 2, &config), 0);

        let strided_row = Operand::Leaf(Layout::strided(Shape::new(1, 8), 1, 8));
        assert_eq!(cost(Strategy::LinearVector, &strided_row, 2, &config), 0);
    }

    #[test]
    fn test_short_column_penalty() {
        let config = EvalConfig::default();
        let short = Operand::Leaf(Layout::dense(Shape::new(3, 10)));
        assert_eq!(cost(Strategy::PerColScalar, &short, 2, &config), 200);
        assert_eq!(cost(Strategy::LinearScalar, &short, 2, &config), 0);

        // Column of 5 is long enough, but shorter than 8 lanes.
        let medium = Operand::Leaf(Layout::dense(Shape::new(5, 10)));
        assert_eq!(cost(Strategy::PerColScalar, &medium, 8, &config), 0);
        assert_eq!(cost(Strategy::PerColVector, &medium, 8, &config), 200);
    }

    #[test]
    fn test_repeat_costs() {
        let config = EvalConfig::default();
        let rep = Operand::RepeatCol {
            vector: Layout::dense(Shape::new(6, 1)),
            target: Shape::new(6, 5),
        };
        assert_eq!(cost(Strategy::LinearVector, &rep, 2, &config), 1000);
        assert_eq!(cost(Strategy::PerColVector, &rep, 2, &config), 0);

        let rep_vec = Operand::RepeatRow {
            vector: Layout::dense(Shape::new(1, 5)),
            target: Shape::new(1, 5),
        };
        assert_eq!(cost(Strategy::LinearScalar, &rep_vec, 2, &config), 0);
    }
}
