//! Repeated-vector broadcasting.
//!
//! A row or column repeated to fill a larger shape is never materialized.
//! The vector itself is bound once per call in one of three ways:
//!
//! - a single element becomes a scalar, and a whole-expression broadcast
//!   of one scalar is evaluated as a fill over any destination layout;
//! - a contiguous vector is read in place for every repetition;
//! - a strided vector is copied once into a scratch buffer owned by the call.

use std::borrow::Cow;

use log::debug;

use crate::element::Element;
use crate::map::EwiseKernel;
use crate::view::{MatView, MatViewMut};

/// How a repeated vector is read during one evaluation.
#[derive(Debug, Clone)]
pub(crate) enum RepeatSource<'e, T: Clone> {
    /// The vector holds exactly one element.
    Scalar(T),
    /// The vector's elements, borrowed when contiguous, cached otherwise.
    Buffer(Cow<'e, [T]>),
}

impl<'e, T: Element> RepeatSource<'e, T> {
    /// Bind a row or column vector.
    pub(crate) fn from_view(vector: &MatView<'e, T>) -> Self {
        if vector.nelems() == 1 {
            return RepeatSource::Scalar(vector.get(0, 0));
        }
        match vector.as_slice() {
            Some(s) => RepeatSource::Buffer(Cow::Borrowed(s)),
            None => {
                debug!(
                    "caching strided {} repeat vector of {} {} elements",
                    vector.shape(),
                    vector.nelems(),
                    T::NAME
                );
                RepeatSource::Buffer(Cow::Owned(vector.to_vec()))
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_cached(&self) -> bool {
        matches!(self, RepeatSource::Buffer(Cow::Owned(_)))
    }
}

/// Apply `kernel` with the same source value to every destination element.
///
/// Works for every destination layout: contiguous destinations are handled
/// as one slice, unit-stride columns one slice at a time, and anything else
/// element by element.
pub(crate) fn fill_with<T: Element, K: EwiseKernel<T> + ?Sized>(
    kernel: &K,
    value: T,
    dest: &mut MatViewMut<'_, T>,
) {
    let (m, n) = (dest.nrows(), dest.ncols());
    if m == 0 || n == 0 {
        return;
    }
    if let Some(slice) = dest.as_mut_slice() {
        for d in slice.iter_mut() {
            kernel.apply(value, d);
        }
        return;
    }
    if dest.is_percol_contiguous() {
        for j in 0..n {
            if let Some(col) = dest.column_slice_mut(j) {
                for d in col.iter_mut() {
                    kernel.apply(value, d);
                }
            }
        }
        return;
    }
    for j in 0..n {
        for i in 0..m {
            kernel.apply(value, dest.get_mut(i, j));
        }
    }
}
