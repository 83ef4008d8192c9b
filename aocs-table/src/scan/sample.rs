use aocs_result::Result;
use aocs_storage::pager::Pager;
use aocs_transaction::ReadView;
use aocs_types::{TUPLES_PER_LOGICAL_BLOCK, TableId, TupleSlot};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Projection, ScanState, TableScan, TargetTuple, TargetTupleMap};
use crate::interrupt::Interrupt;
use crate::table::AocsTable;

/// A TABLESAMPLE method.
///
/// Blocks here are groups of [`TUPLES_PER_LOGICAL_BLOCK`] consecutive tuples of the flat
/// tuple space, not storage blocks.
pub trait SampleSource {
    /// Whether the method picks blocks itself through [`next_block`](Self::next_block).
    /// Otherwise the scan visits every block in order.
    fn selects_blocks(&self) -> bool {
        false
    }

    /// Next block to visit out of `nblocks`, or `None` when done.
    fn next_block(&mut self, _nblocks: u64) -> Option<u64> {
        None
    }

    /// Next one-based offset to return from `block`, or `None` to move on.
    fn next_tuple(&mut self, block: u64, max_offset: u16) -> Option<u16>;

    /// Called when the scan restarts.
    fn reset(&mut self) {}
}

/// Returns each tuple independently with probability `fraction`.
#[derive(Debug, Clone)]
pub struct BernoulliSampler {
    fraction: f64,
    seed: u64,
    rng: StdRng,
    block: Option<u64>,
    last: u16,
}

impl BernoulliSampler {
    pub fn new(fraction: f64, seed: u64) -> Self {
        Self {
            fraction: if fraction.is_nan() {
                0.0
            } else {
                fraction.clamp(0.0, 1.0)
            },
            seed,
            rng: StdRng::seed_from_u64(seed),
            block: None,
            last: 0,
        }
    }
}

impl SampleSource for BernoulliSampler {
    fn next_tuple(&mut self, block: u64, max_offset: u16) -> Option<u16> {
        if self.block != Some(block) {
            self.block = Some(block);
            self.last = 0;
        }
        while self.last < max_offset {
            self.last += 1;
            if self.rng.random_bool(self.fraction) {
                return Some(self.last);
            }
        }
        None
    }

    fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.block = None;
        self.last = 0;
    }
}

/// Sample scan over the flat tuple space captured at begin.
pub struct SampleScan<P: Pager> {
    source: Box<dyn SampleSource + Send>,
    targets: TargetTupleMap<P>,
    nblocks: u64,
    block: Option<u64>,
    rewinds: u64,
    state: ScanState,
    interrupt: Interrupt,
    table_id: TableId,
}

impl<P: Pager> SampleScan<P> {
    pub fn begin(
        table: &AocsTable<P>,
        view: ReadView,
        projection: &Projection,
        source: Box<dyn SampleSource + Send>,
        interrupt: Interrupt,
    ) -> Result<Self> {
        let projection = projection.resolve(&table.columns())?;
        let targets = TargetTupleMap::build(table, &view, projection)?;
        let nblocks = targets.total_tuples().div_ceil(TUPLES_PER_LOGICAL_BLOCK);
        tracing::debug!(
            "[AOCS] table {} sample scan open: {} tuples in {nblocks} blocks",
            table.id(),
            targets.total_tuples()
        );
        Ok(Self {
            source,
            targets,
            nblocks,
            block: None,
            rewinds: 0,
            state: ScanState::Open,
            interrupt,
            table_id: table.id(),
        })
    }

    pub fn nblocks(&self) -> u64 {
        self.nblocks
    }

    /// How often a block-picking source went backwards and forced a restart.
    pub fn rewinds(&self) -> u64 {
        self.rewinds
    }

    /// Advance to the next block. Returns `false` when the sample is complete.
    pub fn next_block(&mut self) -> bool {
        if self.source.selects_blocks() {
            let Some(next) = self.source.next_block(self.nblocks) else {
                return false;
            };
            if self.block.is_some_and(|current| next <= current) {
                self.rewinds += 1;
                tracing::trace!(
                    "[AOCS] table {} sample scan rewinds to block {next}",
                    self.table_id
                );
            }
            self.block = Some(next);
            return true;
        }
        let next = self.block.map_or(0, |b| b + 1);
        if next >= self.nblocks {
            return false;
        }
        self.block = Some(next);
        true
    }

    /// Next live tuple of the current block, or `None` to move to the next block.
    pub fn next_tuple(&mut self) -> Result<Option<TupleSlot>> {
        let Some(block) = self.block else {
            return Ok(None);
        };
        let first = block.saturating_mul(TUPLES_PER_LOGICAL_BLOCK);
        let remaining = self.targets.total_tuples().saturating_sub(first);
        // At most 32768, so it fits.
        let max_offset = remaining.min(TUPLES_PER_LOGICAL_BLOCK) as u16;
        if max_offset == 0 {
            return Ok(None);
        }
        loop {
            self.interrupt.check()?;
            let Some(offset) = self.source.next_tuple(block, max_offset) else {
                return Ok(None);
            };
            if offset == 0 || offset > max_offset {
                continue;
            }
            let flat = first + u64::from(offset) - 1;
            if let TargetTuple::Live(slot) = self.targets.get_target_tuple(flat)? {
                return Ok(Some(slot));
            }
        }
    }
}

impl<P: Pager> TableScan for SampleScan<P> {
    fn next(&mut self) -> Result<Option<TupleSlot>> {
        if self.state != ScanState::Open {
            return Ok(None);
        }
        loop {
            if let Some(slot) = self.next_tuple()? {
                return Ok(Some(slot));
            }
            if !self.next_block() {
                self.state = ScanState::Exhausted;
                return Ok(None);
            }
        }
    }

    fn rescan(&mut self) -> Result<()> {
        self.source.reset();
        self.block = None;
        if self.state != ScanState::Closed {
            self.state = ScanState::Open;
        }
        Ok(())
    }

    fn end(&mut self) {
        self.state = ScanState::Closed;
    }

    fn state(&self) -> ScanState {
        self.state
    }

    fn total_bytes_read(&self) -> u64 {
        self.targets.bytes_read()
    }
}
