//! Access-strategy selection.
//!
//! A [`Policy`] is chosen once per evaluation call from the layouts of the
//! operands and the destination, then consumed immediately.

use log::trace;

use crate::lanes::{access_cost, short_penalty, EvalConfig};
use crate::shape::{Layout, Shape};

/// The four canonical traversal strategies, in selection order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// One running index over all elements, vector lanes.
    LinearVector,
    /// One running index over all elements, one element at a time.
    LinearScalar,
    /// Column by column, vector lanes within each column.
    PerColVector,
    /// Column by column, one element at a time.
    PerColScalar,
}

impl Strategy {
    /// Candidates in canonical order. Earlier entries win ties.
    pub const CANDIDATES: [Strategy; 4] = [
        Strategy::LinearVector,
        Strategy::LinearScalar,
        Strategy::PerColVector,
        Strategy::PerColScalar,
    ];

    #[inline]
    pub const fn is_linear(self) -> bool {
        matches!(self, Self::LinearVector | Self::LinearScalar)
    }

    #[inline]
    pub const fn is_percol(self) -> bool {
        !self.is_linear()
    }

    #[inline]
    pub const fn is_vector(self) -> bool {
        matches!(self, Self::LinearVector | Self::PerColVector)
    }

    /// The scalar strategy with the same traversal order.
    #[inline]
    pub const fn to_scalar(self) -> Self {
        match self {
            Self::LinearVector | Self::LinearScalar => Self::LinearScalar,
            Self::PerColVector | Self::PerColScalar => Self::PerColScalar,
        }
    }

    /// Whether a destination with `layout` can be written directly.
    ///
    /// Linear strategies write rows and columns through their one stride.
    #[inline]
    pub fn accepts_destination(self, layout: &Layout) -> bool {
        match self {
            Self::LinearVector | Self::LinearScalar => layout.linear_step().is_some(),
            Self::PerColVector => layout.is_percol_contiguous(),
            Self::PerColScalar => true,
        }
    }
}

/// Selected strategy and lane width. Scalar strategies carry one lane.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Policy {
    strategy: Strategy,
    lanes: usize,
}

impl Policy {
    /// Build a policy. Vector strategies with fewer than two lanes become
    /// their scalar counterpart.
    pub fn new(strategy: Strategy, lanes: usize) -> Self {
        if strategy.is_vector() && lanes >= 2 {
            Self { strategy, lanes }
        } else {
            Self {
                strategy: strategy.to_scalar(),
                lanes: 1,
            }
        }
    }

    pub fn linear_vector(lanes: usize) -> Self {
        Self::new(Strategy::LinearVector, lanes)
    }

    pub fn linear_scalar() -> Self {
        Self::new(Strategy::LinearScalar, 1)
    }

    pub fn percol_vector(lanes: usize) -> Self {
        Self::new(Strategy::PerColVector, lanes)
    }

    pub fn percol_scalar() -> Self {
        Self::new(Strategy::PerColScalar, 1)
    }

    #[inline]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    #[inline]
    pub fn lanes(&self) -> usize {
        self.lanes
    }

    #[inline]
    pub fn is_linear(&self) -> bool {
        self.strategy.is_linear()
    }

    #[inline]
    pub fn is_vector(&self) -> bool {
        self.strategy.is_vector()
    }
}

/// Layout summary of one expression operand, as seen by the selector.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    /// A matrix view.
    Leaf(Layout),
    /// A scalar broadcast to a shape.
    Constant(Shape),
    /// A column vector repeated to fill `target`.
    RepeatCol { vector: Layout, target: Shape },
    /// A row vector repeated to fill `target`.
    RepeatRow { vector: Layout, target: Shape },
}

impl Operand {
    /// Shape the operand presents to the traversal.
    pub fn shape(&self) -> Shape {
        match *self {
            Operand::Leaf(layout) => layout.shape(),
            Operand::Constant(shape) => shape,
            Operand::RepeatCol { target, .. } | Operand::RepeatRow { target, .. } => target,
        }
    }
}

/// Select the access strategy for one call.
///
/// `lanes` is the usable vector width, or `None` when the kernel or the
/// expression cannot be vectorized. Candidates are tried in
/// [`Strategy::CANDIDATES`] order; a candidate is eligible when the
/// destination accepts it and, for vector strategies, lanes are available.
/// Per-column vector traversal is skipped when a column is shorter than one
/// register, since it could never emit a pack.
/// Operands never make a candidate ineligible: an operand that cannot serve
/// a strategy directly is cached and charged `cache_cost`. The cheapest
/// eligible candidate wins and ties go to the earlier one. Rows and columns
/// are read through their single stride under linear traversal at no cost,
/// so single-row and single-column shapes default to linear traversal.
pub fn select(
    operands: &[Operand],
    dest: &Layout,
    lanes: Option<usize>,
    config: &EvalConfig,
) -> Policy {
    select_among(&Strategy::CANDIDATES, operands, dest, lanes, config)
}

/// [`select`] restricted to `candidates`, which must end with
/// `PerColScalar` or another always-eligible strategy.
pub(crate) fn select_among(
    candidates: &[Strategy],
    operands: &[Operand],
    dest: &Layout,
    lanes: Option<usize>,
    config: &EvalConfig,
) -> Policy {
    let shape = dest.shape();
    let width = lanes.unwrap_or(1);
    let mut best: Option<(Strategy, u32)> = None;

    for &strategy in candidates {
        if strategy.is_vector() && lanes.is_none() {
            continue;
        }
        if strategy == Strategy::PerColVector && !shape.is_empty() && shape.nrows() < width {
            continue;
        }
        if !strategy.accepts_destination(dest) {
            continue;
        }
        let total = operands
            .iter()
            .map(|op| access_cost(strategy, op, config))
            .fold(short_penalty(strategy, shape, width, config), u32::saturating_add);
        trace!("candidate {:?} for {}: cost {}", strategy, shape, total);
        if best.map_or(true, |(_, c)| total < c) {
            best = Some((strategy, total));
        }
    }

    // PerColScalar is always eligible, so `best` is set.
    let strategy = best.map_or(Strategy::PerColScalar, |(s, _)| s);
    let policy = Policy::new(strategy, width);
    trace!(
        "selected {:?} ({} lanes) for {} with {} operands",
        policy.strategy(),
        policy.lanes(),
        shape,
        operands.len()
    );
    policy
}
