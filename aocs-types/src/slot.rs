use crate::{datum::Datum, ids::RowLocator};

/// A materialized row handed back by scans and fetches.
///
/// `values` always has one entry per table column. Columns outside the scan's projection
/// are left as [`Datum::Null`].
#[derive(Clone, Debug, PartialEq)]
pub struct TupleSlot {
    pub locator: RowLocator,
    pub values: Vec<Datum>,
}

impl TupleSlot {
    pub fn new(locator: RowLocator, values: Vec<Datum>) -> Self {
        Self { locator, values }
    }

    #[inline]
    pub fn value(&self, column: usize) -> Option<&Datum> {
        self.values.get(column)
    }
}
