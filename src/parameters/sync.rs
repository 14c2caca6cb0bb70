//! Forced equality between parameter-vector entries.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// After every denormalization `params[to] = params[from]`.
///
/// Used to share a width or position across all peaks of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConstraint {
    /// Source index
    pub from: usize,

    /// Target index, overwritten with the source value
    pub to: usize,
}

impl SyncConstraint {
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }
}

/// Copy `params[from]` into `params[to]` for each constraint, in list order.
///
/// A later constraint may read a value written by an earlier one, which is
/// how chained sharing (a → b → c) propagates.
pub fn apply_sync(params: &mut Array1<f64>, constraints: &[SyncConstraint]) {
    for constraint in constraints {
        params[constraint.to] = params[constraint.from];
    }
}
