//! Expression trees over matrix views.
//!
//! An [`Expr`] is an explicit tagged tree: leaves are matrix views,
//! constants or repeated vectors; inner nodes apply element-wise unary,
//! binary or conditional operations. Building a tree never fails; shapes
//! are validated by [`Expr::shape`] when the tree is evaluated.

use std::fmt;
use std::ops;

use crate::element::Element;
use crate::policy::Operand;
use crate::shape::Shape;
use crate::view::MatView;
use crate::{MatEvalError, Result};

/// Element-wise unary operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Abs,
    Sqr,
    Sqrt,
    Recip,
    Exp,
    Ln,
    Floor,
    Ceil,
}

impl UnaryOp {
    #[inline(always)]
    pub fn apply<T: Element>(self, x: T) -> T {
        match self {
            UnaryOp::Neg => -x,
            UnaryOp::Abs => x.abs(),
            UnaryOp::Sqr => x * x,
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Recip => x.recip(),
            UnaryOp::Exp => x.exp(),
            UnaryOp::Ln => x.ln(),
            UnaryOp::Floor => x.floor(),
            UnaryOp::Ceil => x.ceil(),
        }
    }

    #[inline(always)]
    pub fn apply_pack<T: Element, const W: usize>(self, x: [T; W]) -> [T; W] {
        match self {
            UnaryOp::Neg => x.map(|v| -v),
            UnaryOp::Abs => x.map(|v| v.abs()),
            UnaryOp::Sqr => x.map(|v| v * v),
            op => x.map(|v| op.apply(v)),
        }
    }
}

/// Element-wise binary operations. Comparisons produce 1/0 masks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    #[inline(always)]
    pub fn apply<T: Element>(self, a: T, b: T) -> T {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Max => a.max(b),
            BinaryOp::Min => a.min(b),
            BinaryOp::Pow => a.powf(b),
            BinaryOp::Eq => T::from_bool(a == b),
            BinaryOp::Ne => T::from_bool(a != b),
            BinaryOp::Lt => T::from_bool(a < b),
            BinaryOp::Le => T::from_bool(a <= b),
            BinaryOp::Gt => T::from_bool(a > b),
            BinaryOp::Ge => T::from_bool(a >= b),
        }
    }

    #[inline(always)]
    pub fn apply_pack<T: Element, const W: usize>(self, a: [T; W], b: [T; W]) -> [T; W] {
        match self {
            BinaryOp::Add => std::array::from_fn(|l| a[l] + b[l]),
            BinaryOp::Sub => std::array::from_fn(|l| a[l] - b[l]),
            BinaryOp::Mul => std::array::from_fn(|l| a[l] * b[l]),
            BinaryOp::Div => std::array::from_fn(|l| a[l] / b[l]),
            op => std::array::from_fn(|l| op.apply(a[l], b[l])),
        }
    }
}

/// Scalar-only unary closure.
pub(crate) type MapFn<'a, T> = Box<dyn Fn(T) -> T + 'a>;
/// Scalar-only binary closure.
pub(crate) type ZipFn<'a, T> = Box<dyn Fn(T, T) -> T + 'a>;

/// An element-wise expression over column-major matrices.
pub enum Expr<'a, T> {
    /// A matrix operand.
    Leaf(MatView<'a, T>),
    /// `value` broadcast to `shape`.
    Constant { value: T, shape: Shape },
    /// An `m x 1` column repeated `ncols` times.
    RepeatCol { col: MatView<'a, T>, ncols: usize },
    /// A `1 x n` row repeated `nrows` times.
    RepeatRow { row: MatView<'a, T>, nrows: usize },
    Unary {
        op: UnaryOp,
        arg: Box<Expr<'a, T>>,
    },
    /// Custom closure; never vectorized.
    Map {
        f: MapFn<'a, T>,
        arg: Box<Expr<'a, T>>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr<'a, T>>,
        rhs: Box<Expr<'a, T>>,
    },
    /// Custom two-argument closure; never vectorized.
    Zip {
        f: ZipFn<'a, T>,
        lhs: Box<Expr<'a, T>>,
        rhs: Box<Expr<'a, T>>,
    },
    /// `then` where `mask != 0`, else `otherwise`.
    Cond {
        mask: Box<Expr<'a, T>>,
        then: Box<Expr<'a, T>>,
        otherwise: Box<Expr<'a, T>>,
    },
}

impl<'a, T: Element> Expr<'a, T> {
    // ------------------------------------------------------------------
    // Leaves
    // ------------------------------------------------------------------

    pub fn leaf(view: MatView<'a, T>) -> Self {
        Expr::Leaf(view)
    }

    pub fn constant(value: T, nrows: usize, ncols: usize) -> Self {
        Expr::Constant {
            value,
            shape: Shape::new(nrows, ncols),
        }
    }

    /// Repeat the column vector `col` across `ncols` columns.
    pub fn repeat_col(col: MatView<'a, T>, ncols: usize) -> Self {
        Expr::RepeatCol { col, ncols }
    }

    /// Repeat the row vector `row` across `nrows` rows.
    pub fn repeat_row(row: MatView<'a, T>, nrows: usize) -> Self {
        Expr::RepeatRow { row, nrows }
    }

    // ------------------------------------------------------------------
    // Inner nodes
    // ------------------------------------------------------------------

    pub fn unary(op: UnaryOp, arg: Self) -> Self {
        Expr::Unary {
            op,
            arg: Box::new(arg),
        }
    }

    pub fn binary(op: BinaryOp, lhs: Self, rhs: Self) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn cond(mask: Self, then: Self, otherwise: Self) -> Self {
        Expr::Cond {
            mask: Box::new(mask),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    /// Apply a scalar closure to every element.
    pub fn map(self, f: impl Fn(T) -> T + 'a) -> Self {
        Expr::Map {
            f: Box::new(f),
            arg: Box::new(self),
        }
    }

    /// Combine with `other` through a scalar closure.
    pub fn zip(self, other: Self, f: impl Fn(T, T) -> T + 'a) -> Self {
        Expr::Zip {
            f: Box::new(f),
            lhs: Box::new(self),
            rhs: Box::new(other),
        }
    }

    pub fn abs(self) -> Self {
        Self::unary(UnaryOp::Abs, self)
    }

    pub fn sqr(self) -> Self {
        Self::unary(UnaryOp::Sqr, self)
    }

    pub fn sqrt(self) -> Self {
        Self::unary(UnaryOp::Sqrt, self)
    }

    pub fn recip(self) -> Self {
        Self::unary(UnaryOp::Recip, self)
    }

    pub fn exp(self) -> Self {
        Self::unary(UnaryOp::Exp, self)
    }

    pub fn ln(self) -> Self {
        Self::unary(UnaryOp::Ln, self)
    }

    pub fn floor(self) -> Self {
        Self::unary(UnaryOp::Floor, self)
    }

    pub fn ceil(self) -> Self {
        Self::unary(UnaryOp::Ceil, self)
    }

    pub fn max(self, other: Self) -> Self {
        Self::binary(BinaryOp::Max, self, other)
    }

    pub fn min(self, other: Self) -> Self {
        Self::binary(BinaryOp::Min, self, other)
    }

    pub fn pow(self, other: Self) -> Self {
        Self::binary(BinaryOp::Pow, self, other)
    }

    pub fn elem_eq(self, other: Self) -> Self {
        Self::binary(BinaryOp::Eq, self, other)
    }

    pub fn elem_ne(self, other: Self) -> Self {
        Self::binary(BinaryOp::Ne, self, other)
    }

    pub fn elem_lt(self, other: Self) -> Self {
        Self::binary(BinaryOp::Lt, self, other)
    }

    pub fn elem_le(self, other: Self) -> Self {
        Self::binary(BinaryOp::Le, self, other)
    }

    pub fn elem_gt(self, other: Self) -> Self {
        Self::binary(BinaryOp::Gt, self, other)
    }

    pub fn elem_ge(self, other: Self) -> Self {
        Self::binary(BinaryOp::Ge, self, other)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Shape of the expression.
    ///
    /// # Errors
    /// Returns [`MatEvalError::ShapeMismatch`] if two operands of a node
    /// disagree, or a repeated vector is not a single column / single row.
    pub fn shape(&self) -> Result<Shape> {
        match self {
            Expr::Leaf(v) => Ok(v.shape()),
            Expr::Constant { shape, .. } => Ok(*shape),
            Expr::RepeatCol { col, ncols } => {
                if col.ncols() != 1 {
                    return Err(MatEvalError::ShapeMismatch(
                        col.shape(),
                        Shape::new(col.nrows(), 1),
                    ));
                }
                Ok(Shape::new(col.nrows(), *ncols))
            }
            Expr::RepeatRow { row, nrows } => {
                if row.nrows() != 1 {
                    return Err(MatEvalError::ShapeMismatch(
                        row.shape(),
                        Shape::new(1, row.ncols()),
                    ));
                }
                Ok(Shape::new(*nrows, row.ncols()))
            }
            Expr::Unary { arg, .. } | Expr::Map { arg, .. } => arg.shape(),
            Expr::Binary { lhs, rhs, .. } | Expr::Zip { lhs, rhs, .. } => {
                let a = lhs.shape()?;
                a.ensure_same(&rhs.shape()?)?;
                Ok(a)
            }
            Expr::Cond {
                mask,
                then,
                otherwise,
            } => {
                let s = mask.shape()?;
                s.ensure_same(&then.shape()?)?;
                s.ensure_same(&otherwise.shape()?)?;
                Ok(s)
            }
        }
    }

    /// False if any node is a custom closure.
    pub fn is_vectorizable(&self) -> bool {
        match self {
            Expr::Leaf(_)
            | Expr::Constant { .. }
            | Expr::RepeatCol { .. }
            | Expr::RepeatRow { .. } => true,
            Expr::Map { .. } | Expr::Zip { .. } => false,
            Expr::Unary { arg, .. } => arg.is_vectorizable(),
            Expr::Binary { lhs, rhs, .. } => lhs.is_vectorizable() && rhs.is_vectorizable(),
            Expr::Cond {
                mask,
                then,
                otherwise,
            } => mask.is_vectorizable() && then.is_vectorizable() && otherwise.is_vectorizable(),
        }
    }

    /// Operand layouts, leaves first in tree order.
    pub fn operands(&self) -> Vec<Operand> {
        let mut out = Vec::new();
        self.collect_operands(&mut out);
        out
    }

    fn collect_operands(&self, out: &mut Vec<Operand>) {
        match self {
            Expr::Leaf(v) => out.push(Operand::Leaf(v.layout())),
            Expr::Constant { shape, .. } => out.push(Operand::Constant(*shape)),
            Expr::RepeatCol { col, ncols } => out.push(Operand::RepeatCol {
                vector: col.layout(),
                target: Shape::new(col.nrows(), *ncols),
            }),
            Expr::RepeatRow { row, nrows } => out.push(Operand::RepeatRow {
                vector: row.layout(),
                target: Shape::new(*nrows, row.ncols()),
            }),
            Expr::Unary { arg, .. } | Expr::Map { arg, .. } => arg.collect_operands(out),
            Expr::Binary { lhs, rhs, .. } | Expr::Zip { lhs, rhs, .. } => {
                lhs.collect_operands(out);
                rhs.collect_operands(out);
            }
            Expr::Cond {
                mask,
                then,
                otherwise,
            } => {
                mask.collect_operands(out);
                then.collect_operands(out);
                otherwise.collect_operands(out);
            }
        }
    }

    /// The broadcast value when the whole expression is one scalar:
    /// a constant, or a repeated vector holding a single element.
    pub(crate) fn single_value(&self) -> Option<T> {
        match self {
            Expr::Constant { value, .. } => Some(*value),
            Expr::RepeatCol { col, .. } if col.nrows() == 1 && col.ncols() == 1 => {
                Some(col.get(0, 0))
            }
            Expr::RepeatRow { row, .. } if row.nrows() == 1 && row.ncols() == 1 => {
                Some(row.get(0, 0))
            }
            _ => None,
        }
    }

    /// The view, when the expression is a bare leaf.
    pub(crate) fn as_leaf(&self) -> Option<&MatView<'a, T>> {
        match self {
            Expr::Leaf(v) => Some(v),
            _ => None,
        }
    }
}

macro_rules! impl_binary_operator {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<'a, T: Element> ops::$trait for Expr<'a, T> {
            type Output = Expr<'a, T>;

            fn $method(self, rhs: Self) -> Self::Output {
                Expr::binary($op, self, rhs)
            }
        }
    };
}

impl_binary_operator!(Add, add, BinaryOp::Add);
impl_binary_operator!(Sub, sub, BinaryOp::Sub);
impl_binary_operator!(Mul, mul, BinaryOp::Mul);
impl_binary_operator!(Div, div, BinaryOp::Div);

impl<'a, T: Element> ops::Neg for Expr<'a, T> {
    type Output = Expr<'a, T>;

    fn neg(self) -> Self::Output {
        Expr::unary(UnaryOp::Neg, self)
    }
}

impl<T: fmt::Debug> fmt::Debug for Expr<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Leaf(v) => f
                .debug_struct("Leaf")
                .field("shape", &v.shape())
                .field("row_stride", &v.row_stride())
                .field("col_stride", &v.col_stride())
                .finish(),
            Expr::Constant { value, shape } => f
                .debug_struct("Constant")
                .field("value", value)
                .field("shape", shape)
                .finish(),
            Expr::RepeatCol { col, ncols } => f
                .debug_struct("RepeatCol")
                .field("len", &col.nrows())
                .field("ncols", ncols)
                .finish(),
            Expr::RepeatRow { row, nrows } => f
                .debug_struct("RepeatRow")
                .field("len", &row.ncols())
                .field("nrows", nrows)
                .finish(),
            Expr::Unary { op, arg } => f.debug_tuple("Unary").field(op).field(arg).finish(),
            Expr::Map { arg, .. } => f.debug_tuple("Map").field(arg).finish(),
            Expr::Binary { op, lhs, rhs } => f
                .debug_tuple("Binary")
                .field(op)
                .field(lhs)
                .field(rhs)
                .finish(),
            Expr::Zip { lhs, rhs, .. } => f.debug_tuple("Zip").field(lhs).field(rhs).finish(),
            Expr::Cond {
                mask,
                then,
                otherwise,
            } => f
                .debug_tuple("Cond")
                .field(mask)
                .field(then)
                .field(otherwise)
                .finish(),
        }
    }
}
