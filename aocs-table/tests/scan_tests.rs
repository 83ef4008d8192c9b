//! Reading tables back: sequential, index, bitmap and sample scans plus sizing and
//! statistics sampling.

use std::sync::Arc;

use aocs_result::Error;
use aocs_storage::pager::MemPager;
use aocs_table::scan::{
    BernoulliSampler, BitmapScan, IndexFetch, Projection, SampleScan, SampleSource, ScanDesc,
    ScanState, SeqScan, TableScan, TbmPage,
};
use aocs_table::{
    AocsConfig, AocsTable, BlockSequence, DmlContext, Interrupt, acquire_sample_rows,
    estimate_rel_size, relation_get_block_sequence, relation_get_block_sequences, relation_size,
};
use aocs_transaction::{ReadView, TxnIdManager};
use aocs_types::ids::segment_first_block;
use aocs_types::{ColumnDef, ColumnType, Datum, RowLocator, TableId, TupleSlot};

const TABLE: TableId = 3;

fn new_table(mgr: &TxnIdManager) -> AocsTable<MemPager> {
    AocsTable::create(
        TABLE,
        vec![
            ColumnDef::new("col_a", ColumnType::Integer),
            ColumnDef::new("col_b", ColumnType::Utf8),
        ],
        Arc::new(MemPager::new()),
        mgr.clone(),
        AocsConfig::default().with_block_row_limit(16),
    )
    .unwrap()
}

fn row(i: i64) -> Vec<Datum> {
    vec![Datum::Integer(i), Datum::from(format!("b{i}"))]
}

fn insert_committed(
    mgr: &TxnIdManager,
    table: &AocsTable<MemPager>,
    rows: impl IntoIterator<Item = Vec<Datum>>,
) -> Vec<RowLocator> {
    let txn = mgr.begin_transaction();
    let mut ctx = DmlContext::new(txn);
    ctx.begin(table).unwrap();
    let locators = ctx.multi_insert(TABLE, rows.into_iter().collect()).unwrap();
    ctx.end(TABLE).unwrap();
    mgr.mark_committed(txn.txn_id);
    locators
}

fn delete_committed(mgr: &TxnIdManager, table: &AocsTable<MemPager>, locators: &[RowLocator]) {
    let txn = mgr.begin_transaction();
    let mut ctx = DmlContext::new(txn);
    ctx.begin(table).unwrap();
    for loc in locators {
        ctx.delete(TABLE, *loc).unwrap();
    }
    ctx.end(TABLE).unwrap();
    mgr.mark_committed(txn.txn_id);
}

fn latest(mgr: &TxnIdManager) -> ReadView {
    ReadView::Mvcc(mgr.latest_snapshot())
}

fn drain(scan: &mut impl TableScan) -> Vec<TupleSlot> {
    std::iter::from_fn(|| scan.next().unwrap()).collect()
}

fn seq_scan(table: &AocsTable<MemPager>, view: ReadView, projection: Projection) -> Vec<TupleSlot> {
    let mut scan = SeqScan::begin(table, view, &projection, Interrupt::new()).unwrap();
    let rows = drain(&mut scan);
    scan.end();
    rows
}

/// 100 rows in segment 1, rows 50..60 deleted afterwards.
fn hundred_rows_minus_ten(mgr: &TxnIdManager) -> (AocsTable<MemPager>, Vec<RowLocator>) {
    let table = new_table(mgr);
    let locators = insert_committed(mgr, &table, (0..100).map(row));
    delete_committed(mgr, &table, &locators[50..60]);
    (table, locators)
}

#[test]
fn scan_after_delete_yields_the_ninety_survivors() {
    aocs_test_utils::init_tracing_for_tests();
    let mgr = TxnIdManager::new();
    let table = new_table(&mgr);
    let locators = insert_committed(&mgr, &table, (0..100).map(row));
    assert!(
        locators
            .iter()
            .enumerate()
            .all(|(i, l)| *l == RowLocator::from_parts(1, i as u64))
    );
    let before = latest(&mgr);
    delete_committed(&mgr, &table, &locators[50..60]);

    let rows = seq_scan(&table, latest(&mgr), Projection::Some(vec![0]));
    let expected: Vec<u64> = (0..50).chain(60..100).collect();
    let got: Vec<u64> = rows.iter().map(|s| s.locator.row_number()).collect();
    assert_eq!(got, expected);
    for slot in &rows {
        assert_eq!(slot.values[0], Datum::Integer(slot.locator.row_number() as i64));
        assert_eq!(slot.values[1], Datum::Null);
    }

    assert_eq!(seq_scan(&table, before, Projection::All).len(), 100);

    let sample = acquire_sample_rows(&table, &latest(&mgr), 100, 11, &Interrupt::new()).unwrap();
    assert_eq!(sample.rows.len(), 90);
    assert_eq!((sample.live_rows, sample.dead_rows), (90, 10));
    assert_eq!((sample.total_rows, sample.total_dead_rows), (90, 10));
}

#[test]
fn partial_sample_stays_within_target() {
    let mgr = TxnIdManager::new();
    let (table, _) = hundred_rows_minus_ten(&mgr);
    let sample = acquire_sample_rows(&table, &latest(&mgr), 20, 5, &Interrupt::new()).unwrap();
    assert_eq!(sample.live_rows + sample.dead_rows, 20);
    assert_eq!(sample.rows.len() as u64, sample.live_rows);
    assert!(sample.rows.windows(2).all(|w| w[0].locator < w[1].locator));
    assert!(sample.rows.iter().all(|s| {
        let r = s.locator.row_number();
        !(50..60).contains(&r)
    }));
    assert_eq!(sample.total_rows, 90);
}

#[test]
fn sequence_gaps_are_skipped() {
    let mgr = TxnIdManager::new();
    let table = new_table(&mgr);
    // Each statement reserves a fresh chunk of 100 row numbers and uses 5.
    insert_committed(&mgr, &table, (0..5).map(row));
    insert_committed(&mgr, &table, (5..10).map(row));

    let rows = seq_scan(&table, latest(&mgr), Projection::All);
    let got: Vec<u64> = rows.iter().map(|s| s.locator.row_number()).collect();
    assert_eq!(got, vec![0, 1, 2, 3, 4, 100, 101, 102, 103, 104]);
    let ids: Vec<Datum> = rows.iter().map(|s| s.values[0].clone()).collect();
    assert_eq!(ids, (0..10).map(Datum::Integer).collect::<Vec<_>>());
}

#[test]
fn segments_awaiting_drop_leave_a_hole() {
    let mgr = TxnIdManager::new();
    let table = new_table(&mgr);

    let (t1, t2) = (mgr.begin_transaction(), mgr.begin_transaction());
    let (mut a, mut b) = (DmlContext::new(t1), DmlContext::new(t2));
    a.begin(&table).unwrap();
    b.begin(&table).unwrap();
    a.multi_insert(TABLE, (0..3).map(row).collect()).unwrap();
    b.multi_insert(TABLE, (10..13).map(row).collect()).unwrap();
    a.end(TABLE).unwrap();
    b.end(TABLE).unwrap();
    mgr.mark_committed(t1.txn_id);
    mgr.mark_committed(t2.txn_id);

    table.mark_segment_awaiting_drop(1).unwrap();
    let rows = seq_scan(&table, latest(&mgr), Projection::All);
    assert!(rows.iter().all(|s| s.locator.segno() == 2));
    assert_eq!(rows.len(), 3);

    table.clear_segment(1).unwrap();
    let locators = insert_committed(&mgr, &table, (20..22).map(row));
    assert_eq!(locators[0], RowLocator::from_parts(1, 100));

    let rows = seq_scan(&table, latest(&mgr), Projection::All);
    let got: Vec<RowLocator> = rows.iter().map(|s| s.locator).collect();
    assert!(got.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(
        got,
        vec![
            RowLocator::from_parts(1, 100),
            RowLocator::from_parts(1, 101),
            RowLocator::from_parts(2, 0),
            RowLocator::from_parts(2, 1),
            RowLocator::from_parts(2, 2),
        ]
    );
}

#[test]
fn clearing_a_live_segment_is_refused() {
    let mgr = TxnIdManager::new();
    let table = new_table(&mgr);
    insert_committed(&mgr, &table, (0..3).map(row));
    assert!(matches!(table.clear_segment(1), Err(Error::ProgrammingError(_))));
    assert!(matches!(table.clear_segment(9), Err(Error::NotFound)));
}

#[test]
fn seq_scan_lifecycle() {
    let mgr = TxnIdManager::new();
    let table = new_table(&mgr);
    insert_committed(&mgr, &table, (0..40).map(row));

    let scan = SeqScan::begin(&table, latest(&mgr), &Projection::Any, Interrupt::new()).unwrap();
    assert_eq!(scan.projection(), &[0]);
    let mut scan = ScanDesc::Sequential(scan);
    assert_eq!(drain(&mut scan).len(), 40);
    assert_eq!(scan.state(), ScanState::Exhausted);
    let bytes = scan.total_bytes_read();
    assert!(bytes > 0);

    scan.rescan().unwrap();
    assert_eq!(scan.state(), ScanState::Open);
    assert_eq!(drain(&mut scan).len(), 40);
    assert!(scan.total_bytes_read() > bytes);

    scan.end();
    assert_eq!(scan.state(), ScanState::Closed);
    assert!(scan.next().unwrap().is_none());
}

#[test]
fn seq_scan_observes_interrupts() {
    let mgr = TxnIdManager::new();
    let table = new_table(&mgr);
    insert_committed(&mgr, &table, (0..10).map(row));
    let interrupt = Interrupt::new();
    let mut scan = SeqScan::begin(&table, latest(&mgr), &Projection::All, interrupt.clone()).unwrap();
    assert!(scan.next().unwrap().is_some());
    interrupt.raise();
    assert!(matches!(scan.next(), Err(Error::Interrupted)));
}

#[test]
fn projection_of_dropped_or_unknown_columns_fails() {
    let mgr = TxnIdManager::new();
    let table = new_table(&mgr);
    table.drop_column(1).unwrap();
    assert!(matches!(table.drop_column(0), Err(Error::InvalidArgumentError(_))));
    assert!(
        SeqScan::begin(&table, latest(&mgr), &Projection::Some(vec![1]), Interrupt::new()).is_err()
    );
    assert!(
        SeqScan::begin(&table, latest(&mgr), &Projection::Some(vec![5]), Interrupt::new()).is_err()
    );

    insert_committed(&mgr, &table, [vec![Datum::Integer(1), Datum::from("ignored")]]);
    let rows = seq_scan(&table, latest(&mgr), Projection::All);
    assert_eq!(rows[0].values, vec![Datum::Integer(1), Datum::Null]);
}

#[test]
fn added_columns_report_their_missing_value() {
    let mgr = TxnIdManager::new();
    let table = new_table(&mgr);
    insert_committed(&mgr, &table, (0..3).map(row));
    assert!(matches!(
        table.add_column(ColumnDef::new("flag", ColumnType::Boolean), Datum::Integer(1)),
        Err(Error::InvalidArgumentError(_))
    ));
    let flag = table
        .add_column(ColumnDef::new("flag", ColumnType::Boolean), Datum::Boolean(true))
        .unwrap();
    assert_eq!(flag, 2);
    insert_committed(
        &mgr,
        &table,
        (3..5).map(|i| vec![Datum::Integer(i), Datum::from("new"), Datum::Boolean(false)]),
    );

    let rows = seq_scan(&table, latest(&mgr), Projection::Some(vec![flag]));
    let got: Vec<(u64, Datum)> = rows
        .iter()
        .map(|s| (s.locator.row_number(), s.values[flag].clone()))
        .collect();
    assert_eq!(
        got,
        vec![
            (0, Datum::Boolean(true)),
            (1, Datum::Boolean(true)),
            (2, Datum::Boolean(true)),
            (100, Datum::Boolean(false)),
            (101, Datum::Boolean(false)),
        ]
    );

    let mut fetch = IndexFetch::begin(&table, latest(&mgr));
    let old = fetch.fetch_tuple(RowLocator::from_parts(1, 1)).unwrap().unwrap();
    assert_eq!(old.values[flag], Datum::Boolean(true));
    assert_eq!(old.values[0], Datum::Integer(1));
    fetch.fetch_end();
}

#[test]
fn index_fetch_follows_the_directory() {
    let mgr = TxnIdManager::new();
    let (table, locators) = hundred_rows_minus_ten(&mgr);
    table.register_index(false).unwrap();
    assert!(table.has_block_directory());

    let mut fetch = IndexFetch::begin(&table, latest(&mgr));
    let slot = fetch.fetch_tuple(locators[70]).unwrap().unwrap();
    assert_eq!(slot.values, row(70));
    assert!(fetch.fetch_tuple(locators[55]).unwrap().is_none());
    assert!(fetch.fetch_tuple(RowLocator::from_parts(1, 5000)).unwrap().is_none());
    assert!(fetch.fetch_tuple(RowLocator::from_parts(9, 0)).unwrap().is_none());

    fetch.fetch_reset();
    assert!(fetch.fetch_tuple(locators[0]).unwrap().is_some());
    assert!(fetch.tuple_visible(locators[0]).unwrap());
    assert!(!fetch.tuple_visible(locators[55]).unwrap());
    assert!(!fetch.tuple_visible(RowLocator::from_parts(1, 100)).unwrap());
    assert!(fetch.total_bytes_read() > 0);
    fetch.fetch_end();
}

#[test]
fn index_only_check_needs_a_directory() {
    let mgr = TxnIdManager::new();
    let (table, locators) = hundred_rows_minus_ten(&mgr);
    let mut fetch = IndexFetch::begin(&table, latest(&mgr));
    assert!(matches!(
        fetch.tuple_visible(locators[0]),
        Err(Error::ProgrammingError(_))
    ));
    // Point lookups work without one.
    assert_eq!(fetch.fetch_tuple(locators[1]).unwrap().unwrap().values, row(1));
}

#[test]
fn bitmap_scan_over_exact_and_lossy_pages() {
    let mgr = TxnIdManager::new();
    let (table, locators) = hundred_rows_minus_ten(&mgr);
    let block = locators[0].logical_block();

    let mut scan = BitmapScan::begin(&table, latest(&mgr), &[1], &[], &[0], Interrupt::new());
    assert_eq!(scan.projection(), &[1]);
    assert_eq!(scan.projection_recheck(), &[0, 1]);

    assert!(!scan.next_block(TbmPage::exact(block, vec![])));
    assert!(scan.next_tuple().unwrap().is_none());

    assert!(scan.next_block(TbmPage::exact(block, vec![1, 2, 52, 99])));
    let exact: Vec<TupleSlot> = std::iter::from_fn(|| scan.next_tuple().unwrap()).collect();
    let rows: Vec<u64> = exact.iter().map(|s| s.locator.row_number()).collect();
    assert_eq!(rows, vec![0, 1, 98]);
    assert_eq!(exact[0].values, vec![Datum::Null, Datum::from("b0")]);

    scan.push_pages([TbmPage::lossy(block)]);
    let lossy = drain(&mut scan);
    assert_eq!(lossy.len(), 90);
    assert_eq!(lossy[0].values, row(0));
    assert_eq!(scan.state(), ScanState::Exhausted);
    scan.end();
}

/// Picks the listed blocks in order and the listed offsets in each of them.
struct FixedSource {
    blocks: Vec<u64>,
    offsets: Vec<u16>,
    next: usize,
    offset: usize,
}

impl SampleSource for FixedSource {
    fn selects_blocks(&self) -> bool {
        true
    }

    fn next_block(&mut self, nblocks: u64) -> Option<u64> {
        let block = *self.blocks.get(self.next)?;
        self.next += 1;
        self.offset = 0;
        (block < nblocks).then_some(block)
    }

    fn next_tuple(&mut self, _block: u64, max_offset: u16) -> Option<u16> {
        while let Some(&off) = self.offsets.get(self.offset) {
            self.offset += 1;
            if off <= max_offset {
                return Some(off);
            }
        }
        None
    }

    fn reset(&mut self) {
        self.next = 0;
        self.offset = 0;
    }
}

#[test]
fn sample_scan_with_block_picking_source_rewinds() {
    let mgr = TxnIdManager::new();
    let (table, _) = hundred_rows_minus_ten(&mgr);
    let source = FixedSource {
        blocks: vec![0, 0],
        offsets: vec![1, 55, 3, 500],
        next: 0,
        offset: 0,
    };
    let mut scan = SampleScan::begin(
        &table,
        latest(&mgr),
        &Projection::All,
        Box::new(source),
        Interrupt::new(),
    )
    .unwrap();
    assert_eq!(scan.nblocks(), 1);
    let rows: Vec<u64> = drain(&mut scan)
        .iter()
        .map(|s| s.locator.row_number())
        .collect();
    assert_eq!(rows, vec![0, 2, 0, 2]);
    assert_eq!(scan.rewinds(), 1);
}

#[test]
fn bernoulli_sample_scan_bounds() {
    let mgr = TxnIdManager::new();
    let (table, _) = hundred_rows_minus_ten(&mgr);
    let begin = |fraction: f64| {
        SampleScan::begin(
            &table,
            latest(&mgr),
            &Projection::Some(vec![0]),
            Box::new(BernoulliSampler::new(fraction, 9)),
            Interrupt::new(),
        )
        .unwrap()
    };
    assert_eq!(drain(&mut begin(1.0)).len(), 90);
    assert!(drain(&mut begin(0.0)).is_empty());

    let mut half = begin(0.5);
    let first = drain(&mut half);
    assert!(first.len() < 90);
    half.rescan().unwrap();
    assert_eq!(drain(&mut half), first);
}

#[test]
fn sizes_and_block_sequences() {
    let mgr = TxnIdManager::new();
    let (table, _) = hundred_rows_minus_ten(&mgr);

    let total = relation_size(&table, None);
    assert!(total > 0);
    assert_eq!(
        total,
        relation_size(&table, Some(0)) + relation_size(&table, Some(1))
    );
    assert_eq!(relation_size(&table, Some(7)), 0);

    let estimate = estimate_rel_size(&table);
    assert_eq!(estimate.tuples, 100.0);
    assert!(estimate.pages >= 1);
    assert_eq!(estimate.allvisfrac, 1.0);

    let expected = BlockSequence {
        start: segment_first_block(1),
        nblocks: 1,
    };
    assert_eq!(relation_get_block_sequences(&table), vec![expected]);
    assert_eq!(
        relation_get_block_sequence(&table, segment_first_block(1) + 3),
        expected
    );
    assert_eq!(
        relation_get_block_sequence(&table, segment_first_block(5)).nblocks,
        0
    );
}

#[test]
fn truncate_empties_the_table() {
    let mgr = TxnIdManager::new();
    let (table, _) = hundred_rows_minus_ten(&mgr);
    table.register_index(false).unwrap();
    assert!(table.pager().blob_count() > 0);
    table.nontransactional_truncate().unwrap();
    assert_eq!(table.pager().blob_count(), 0);
    assert_eq!(table.pager().stored_bytes(), 0);

    assert!(seq_scan(&table, latest(&mgr), Projection::All).is_empty());
    assert_eq!(relation_size(&table, None), 0);
    assert_eq!(estimate_rel_size(&table).pages, 0);
    assert!(table.block_directory().is_empty());
    assert_eq!(table.visibility_map().hidden_count(&latest(&mgr)), 0);

    let locators = insert_committed(&mgr, &table, (0..2).map(row));
    assert_eq!(locators[0], RowLocator::from_parts(1, 0));
    assert_eq!(seq_scan(&table, latest(&mgr), Projection::All).len(), 2);
}
