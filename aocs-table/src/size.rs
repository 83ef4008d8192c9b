//! Size figures for the planner.

use aocs_storage::pager::Pager;
use aocs_transaction::ReadView;
use aocs_types::ids::{block_segno, logical_blocks_for_rows, segment_first_block};
use aocs_types::{ColumnIndex, LogicalBlock, SegmentNo};

use crate::table::AocsTable;

/// Bytes in one planner page.
pub const PAGE_SIZE_BYTES: u64 = 32 * 1024;

/// Size estimate of a table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelSizeEstimate {
    /// Uncompressed bytes expressed in pages of [`PAGE_SIZE_BYTES`].
    pub pages: u64,
    pub tuples: f64,
    /// Index-only scans never visit table pages for visibility, so this is always `1.0`.
    pub allvisfrac: f64,
}

/// A run of logical blocks owned by one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSequence {
    pub start: LogicalBlock,
    pub nblocks: u64,
}

/// Compressed bytes stored for `column`, or for every column when `None`, summed over all
/// segments under the latest snapshot.
///
/// Segments created before a column was added hold no file for it and contribute nothing.
pub fn relation_size<P: Pager>(table: &AocsTable<P>, column: Option<ColumnIndex>) -> u64 {
    let view = ReadView::Mvcc(table.txn_manager().latest_snapshot());
    let catalog = table.catalog();
    catalog
        .totals(&view, table.txn_manager())
        .iter()
        .map(|totals| match column {
            Some(col) if col < totals.vp_entries => totals.eof[col],
            Some(_) => 0,
            None => totals.eof.iter().sum(),
        })
        .sum()
}

pub fn estimate_rel_size<P: Pager>(table: &AocsTable<P>) -> RelSizeEstimate {
    let view = ReadView::Mvcc(table.txn_manager().latest_snapshot());
    let (tuples, bytes) = table
        .catalog()
        .totals(&view, table.txn_manager())
        .iter()
        .fold((0u64, 0u64), |(t, b), totals| {
            (
                t + totals.total_tuples,
                b + totals.eof_uncompressed.iter().sum::<u64>(),
            )
        });
    let pages = if tuples == 0 {
        0
    } else {
        bytes.div_ceil(PAGE_SIZE_BYTES)
    };
    tracing::trace!(
        "[AOCS] table {} size estimate: {tuples} tuples, {bytes} uncompressed bytes, {pages} pages",
        table.id()
    );
    RelSizeEstimate {
        pages,
        tuples: tuples as f64,
        allvisfrac: 1.0,
    }
}

fn block_sequence_of<P: Pager>(table: &AocsTable<P>, segno: SegmentNo) -> BlockSequence {
    let next_row = table
        .catalog()
        .segment(segno)
        .map_or(0, |s| s.fast_sequence().next_row());
    BlockSequence {
        start: segment_first_block(segno),
        nblocks: logical_blocks_for_rows(next_row),
    }
}

/// One sequence per segment, covering every row number the segment has handed out.
pub fn relation_get_block_sequences<P: Pager>(table: &AocsTable<P>) -> Vec<BlockSequence> {
    let segnos: Vec<SegmentNo> = table.catalog().segments().map(|s| s.segno()).collect();
    segnos
        .into_iter()
        .map(|segno| block_sequence_of(table, segno))
        .collect()
}

/// Sequence of the segment that owns `block`. Empty if the segment does not exist.
pub fn relation_get_block_sequence<P: Pager>(
    table: &AocsTable<P>,
    block: LogicalBlock,
) -> BlockSequence {
    block_sequence_of(table, block_segno(block))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use aocs_storage::pager::MemPager;
    use aocs_transaction::TxnIdManager;
    use aocs_types::{ColumnDef, ColumnType, Datum};

    use super::*;
    use crate::config::AocsConfig;
    use crate::dml::DmlContext;

    #[test]
    fn pages_count_uncompressed_bytes() {
        let mgr = TxnIdManager::new();
        let table = AocsTable::create(
            5,
            vec![
                ColumnDef::new("a", ColumnType::Integer),
                ColumnDef::new("b", ColumnType::Utf8),
            ],
            Arc::new(MemPager::new()),
            mgr.clone(),
            AocsConfig::default().with_block_row_limit(1000),
        )
        .unwrap();
        assert_eq!(estimate_rel_size(&table).pages, 0);

        let txn = mgr.begin_transaction();
        let mut ctx = DmlContext::new(txn);
        ctx.begin(&table).unwrap();
        let rows = (0..20_000i64)
            .map(|i| vec![Datum::Integer(i), Datum::from(format!("value-{i:05}"))])
            .collect();
        ctx.multi_insert(5, rows).unwrap();
        ctx.end(5).unwrap();
        mgr.mark_committed(txn.txn_id);

        let view = ReadView::Mvcc(mgr.latest_snapshot());
        let bytes: u64 = table
            .catalog()
            .totals(&view, table.txn_manager())
            .iter()
            .map(|t| t.eof_uncompressed.iter().sum::<u64>())
            .sum();
        let estimate = estimate_rel_size(&table);
        assert_eq!(estimate.tuples, 20_000.0);
        assert!(estimate.pages > 1);
        assert!(estimate.pages * PAGE_SIZE_BYTES >= bytes);
        assert!((estimate.pages - 1) * PAGE_SIZE_BYTES < bytes);
    }
}
