//! Scan benchmark: bulk load followed by sequential and range scans.
//!
//! What it measures
//! - `multi_insert` of 200k rows across an integer, a float and a string column into an
//!   in-memory table (MemPager).
//! - A full sequential scan of every column, and of a single column, over the loaded table.
//! - A range scan of one logical block, positioned through the block directory.
//!
//! Run:
//!   cargo bench --bench scan_bench

#![forbid(unsafe_code)]

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use aocs_storage::pager::MemPager;
use aocs_table::{
    AocsConfig, AocsTable, DmlContext, Interrupt, Projection, RangeScan, SeqScan, TableScan,
};
use aocs_transaction::{ReadView, TxnIdManager};
use aocs_types::ids::segment_first_block;
use aocs_types::{ColumnDef, ColumnType, Datum, TableId};

const TOTAL_ROWS: usize = 200_000;
const TABLE_ID: TableId = 42;

fn build_rows(start: usize, end: usize) -> Vec<Vec<Datum>> {
    (start..end)
        .map(|i| {
            vec![
                Datum::Integer((i as i64) * 7),
                Datum::Float((i as f64) * 0.71),
                Datum::from(format!("row-{i:08}")),
            ]
        })
        .collect()
}

fn new_table(mgr: &TxnIdManager) -> AocsTable<MemPager> {
    AocsTable::create(
        TABLE_ID,
        vec![
            ColumnDef::new("n", ColumnType::Integer),
            ColumnDef::new("f", ColumnType::Float),
            ColumnDef::new("s", ColumnType::Utf8),
        ],
        Arc::new(MemPager::new()),
        mgr.clone(),
        AocsConfig::default(),
    )
    .expect("table creation")
}

fn load(mgr: &TxnIdManager, table: &AocsTable<MemPager>, batch_size: usize) {
    let txn = mgr.begin_transaction();
    let mut ctx = DmlContext::new(txn);
    ctx.begin(table).expect("begin");
    let mut offset = 0;
    while offset < TOTAL_ROWS {
        let end = (offset + batch_size).min(TOTAL_ROWS);
        ctx.multi_insert(TABLE_ID, build_rows(offset, end))
            .expect("insert");
        offset = end;
    }
    ctx.end(TABLE_ID).expect("end");
    mgr.mark_committed(txn.txn_id);
}

fn bench_bulk_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_200k_rows_3_cols");
    group.sample_size(10);
    group.throughput(Throughput::Elements((TOTAL_ROWS * 3) as u64));

    for &batch_size in &[1000usize, 10_000, 50_000] {
        group.bench_function(
            BenchmarkId::from_parameter(format!("batch_size={batch_size}")),
            |b| {
                b.iter(|| {
                    let mgr = TxnIdManager::new();
                    let table = new_table(&mgr);
                    load(&mgr, &table, batch_size);
                    black_box(table.modcount());
                })
            },
        );
    }

    group.finish();
}

fn bench_scans(c: &mut Criterion) {
    let mgr = TxnIdManager::new();
    let table = new_table(&mgr);
    let batch = table
        .write_hints()
        .clamp_insert_batch_rows(table.write_hints().recommended_insert_batch_rows * 4);
    load(&mgr, &table, batch);

    let mut group = c.benchmark_group("scan_200k_rows");
    group.sample_size(10);
    group.throughput(Throughput::Elements(TOTAL_ROWS as u64));

    for (name, projection) in [
        ("all_columns", Projection::All),
        ("string_only", Projection::Some(vec![2])),
    ] {
        group.bench_function(BenchmarkId::new("seq_scan", name), |b| {
            b.iter(|| {
                let view = ReadView::Mvcc(mgr.latest_snapshot());
                let mut scan = SeqScan::begin(&table, view, &projection, Interrupt::new())
                    .expect("scan");
                let mut rows = 0usize;
                while let Some(slot) = scan.next().expect("next") {
                    black_box(&slot.values);
                    rows += 1;
                }
                scan.end();
                assert_eq!(rows, TOTAL_ROWS);
            })
        });
    }
    group.finish();

    table.register_index(false).expect("directory");
    let mut group = c.benchmark_group("range_scan_one_block");
    group.sample_size(20);
    group.bench_function("positioned", |b| {
        b.iter(|| {
            let mut scan = RangeScan::begin(
                &table,
                &Projection::All,
                Some(segment_first_block(1) + 3),
                Some(1),
                Interrupt::new(),
            )
            .expect("range scan");
            let mut rows = 0usize;
            while let Some(slot) = scan.next().expect("next") {
                black_box(&slot.values);
                rows += 1;
            }
            black_box(rows);
        })
    });
    group.finish();
}

criterion_group!(benches, bench_bulk_load, bench_scans);
criterion_main!(benches);
