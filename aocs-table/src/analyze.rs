//! Row sampling for table statistics.

use aocs_result::Result;
use aocs_storage::pager::Pager;
use aocs_transaction::ReadView;
use aocs_types::TupleSlot;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::interrupt::Interrupt;
use crate::scan::{Projection, TargetTuple, TargetTupleMap};
use crate::table::AocsTable;

/// Selection sampling (Knuth's Algorithm S): picks `target` distinct indexes out of
/// `0..total`, in ascending order, each subset equally likely.
#[derive(Debug, Clone)]
pub struct RowSampler {
    total: u64,
    target: u64,
    seen: u64,
    selected: u64,
    rng: StdRng,
}

impl RowSampler {
    pub fn new(total: u64, target: u64, seed: u64) -> Self {
        Self {
            total,
            target: target.min(total),
            seen: 0,
            selected: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn has_more(&self) -> bool {
        self.selected < self.target && self.seen < self.total
    }

    /// Next selected index, or `None` once `target` indexes were produced.
    pub fn next(&mut self) -> Option<u64> {
        while self.has_more() {
            let index = self.seen;
            let remaining = self.total - self.seen;
            let needed = self.target - self.selected;
            self.seen += 1;
            let u: f64 = self.rng.random();
            if (remaining as f64) * u < needed as f64 {
                self.selected += 1;
                return Some(index);
            }
        }
        None
    }
}

/// Rows and counts handed to the statistics collector.
#[derive(Debug, Clone, Default)]
pub struct SampleResult {
    /// Live sampled rows in locator order.
    pub rows: Vec<TupleSlot>,
    /// Sampled tuples that were live.
    pub live_rows: u64,
    /// Sampled tuples that were deleted for the view.
    pub dead_rows: u64,
    /// Estimated live rows in the whole table.
    pub total_rows: u64,
    /// Deleted rows in the whole table according to the visibility map.
    pub total_dead_rows: u64,
}

/// Sample up to `target` tuples of the table.
///
/// Sampling runs over every physically present tuple, deleted ones included, so dead rows
/// are counted where they fall. With `target` at least the table size the sample is a full
/// census.
pub fn acquire_sample_rows<P: Pager>(
    table: &AocsTable<P>,
    view: &ReadView,
    target: u64,
    seed: u64,
    interrupt: &Interrupt,
) -> Result<SampleResult> {
    let projection = Projection::All.resolve(&table.columns())?;
    let mut targets = TargetTupleMap::build(table, view, projection)?;
    let total_tuples = targets.total_tuples();
    let total_dead_rows = table.visibility_map().hidden_count(view).min(total_tuples);

    let mut sampler = RowSampler::new(total_tuples, target, seed);
    let mut result = SampleResult {
        total_rows: total_tuples - total_dead_rows,
        total_dead_rows,
        ..SampleResult::default()
    };
    while let Some(flat) = sampler.next() {
        interrupt.check()?;
        match targets.get_target_tuple(flat)? {
            TargetTuple::Live(slot) => {
                result.rows.push(slot);
                result.live_rows += 1;
            }
            TargetTuple::Dead | TargetTuple::Missing => result.dead_rows += 1,
        }
    }
    tracing::debug!(
        "[AOCS] table {} sampled {} of {total_tuples} tuples: {} live, {} dead; estimate {} live, {} dead",
        table.id(),
        result.live_rows + result.dead_rows,
        result.live_rows,
        result.dead_rows,
        result.total_rows,
        result.total_dead_rows
    );
    Ok(result)
}
