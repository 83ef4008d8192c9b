use std::ops::Range;

use aocs_result::{Error, Result};
use aocs_types::{MAX_ROW_NUMBER, RowNumber};

/// Per-segment row-number allocator.
///
/// Writers reserve ranges up front and may leave part of a range unused, so row numbers
/// are unique and increasing but can have holes.
#[derive(Debug, Clone, Default)]
pub struct FastSequence {
    next: RowNumber,
    allocations: u64,
}

impl FastSequence {
    /// Reserve `count` row numbers.
    pub fn reserve(&mut self, count: u64) -> Result<Range<RowNumber>> {
        let start = self.next;
        let end = start
            .checked_add(count)
            .filter(|end| *end <= MAX_ROW_NUMBER + 1)
            .ok_or_else(|| {
                Error::Internal(format!(
                    "row number space exhausted: cannot reserve {count} rows after {start}"
                ))
            })?;
        self.next = end;
        self.allocations += 1;
        Ok(start..end)
    }

    /// First row number not yet handed out.
    pub fn next_row(&self) -> RowNumber {
        self.next
    }

    /// How many reservations have been made.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservations_are_disjoint() {
        let mut seq = FastSequence::default();
        assert_eq!(seq.reserve(100).unwrap(), 0..100);
        assert_eq!(seq.reserve(5).unwrap(), 100..105);
        assert_eq!(seq.allocations(), 2);
    }

    #[test]
    fn exhausted_space_errors() {
        let mut seq = FastSequence::default();
        seq.reserve(MAX_ROW_NUMBER).unwrap();
        assert!(seq.reserve(1).is_ok());
        assert!(matches!(seq.reserve(1), Err(Error::Internal(_))));
    }
}
