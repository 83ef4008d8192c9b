//! Feeding an index build.

use aocs_result::Result;
use aocs_storage::pager::Pager;
use aocs_types::{Datum, LogicalBlock, RowLocator};

use crate::interrupt::Interrupt;
use crate::scan::{Projection, RangeScan, TableScan};
use crate::table::AocsTable;

/// Scan `[start_block, start_block + num_blocks)`, or the whole table when `num_blocks` is
/// `None`, and hand every stored row to `callback` together with whether it is alive.
///
/// Builds the block directory first if the table has none. Returns the number of live rows.
pub fn index_build_range_scan<P, F>(
    table: &AocsTable<P>,
    projection: &Projection,
    start_block: Option<LogicalBlock>,
    num_blocks: Option<u64>,
    interrupt: Interrupt,
    mut callback: F,
) -> Result<f64>
where
    P: Pager,
    F: FnMut(RowLocator, &[Datum], bool) -> Result<()>,
{
    let mut scan = RangeScan::begin(table, projection, start_block, num_blocks, interrupt)?;
    let mut reltuples = 0.0;
    let mut seen = 0u64;
    while let Some((slot, alive)) = scan.next_with_liveness()? {
        seen += 1;
        if alive {
            reltuples += 1.0;
        }
        callback(slot.locator, &slot.values, alive)?;
    }
    scan.end();
    tracing::debug!(
        "[AOCS] table {} index build scan: {seen} rows, {reltuples} alive, {} bytes",
        table.id(),
        scan.total_bytes_read()
    );
    Ok(reltuples)
}
