//! The table handle shared by every session working on one relation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use aocs_directory::{BlockDirectory, VisibilityMap};
use aocs_result::{Error, Result};
use aocs_storage::pager::Pager;
use aocs_storage::segment::{SegmentCatalog, SegmentState};
use aocs_transaction::{ReadView, TxnIdManager, WriteStamp};
use aocs_types::{ColumnDef, ColumnIndex, Datum, SegmentNo, TableId};

use crate::config::AocsConfig;
use crate::write_hints::AocsWriteHints;

struct TableInner<P: Pager> {
    id: TableId,
    config: AocsConfig,
    pager: Arc<P>,
    txn_manager: TxnIdManager,
    columns: RwLock<Vec<ColumnDef>>,
    segments: RwLock<SegmentCatalog>,
    directory: BlockDirectory,
    visimap: VisibilityMap,
    /// Set once the first index exists; from then on writers maintain the directory.
    has_directory: AtomicBool,
    has_unique_index: AtomicBool,
    /// Write generation, advanced once per data-modifying statement.
    modcount: AtomicU64,
}

/// An append-only column-oriented table.
///
/// Cloning is cheap; clones share segments, block directory and visibility map.
pub struct AocsTable<P: Pager> {
    inner: Arc<TableInner<P>>,
}

impl<P: Pager> Clone for AocsTable<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Pager> std::fmt::Debug for AocsTable<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AocsTable")
            .field("id", &self.inner.id)
            .field("columns", &self.num_columns())
            .finish_non_exhaustive()
    }
}

impl<P: Pager> AocsTable<P> {
    /// Create an empty table. Segment files are created on first write.
    pub fn create(
        id: TableId,
        columns: Vec<ColumnDef>,
        pager: Arc<P>,
        txn_manager: TxnIdManager,
        config: AocsConfig,
    ) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::InvalidArgumentError(
                "a table needs at least one column".into(),
            ));
        }
        if config.max_segments == 0 {
            return Err(Error::InvalidArgumentError(
                "max_segments must be at least 1".into(),
            ));
        }
        let catalog = SegmentCatalog::new(columns.len(), config.max_segments);
        let directory = BlockDirectory::new(txn_manager.clone(), config.minipage_entries);
        let visimap = VisibilityMap::new(txn_manager.clone());
        tracing::debug!("[AOCS] created table {id} with {} columns", columns.len());
        Ok(Self {
            inner: Arc::new(TableInner {
                id,
                config,
                pager,
                txn_manager,
                columns: RwLock::new(columns),
                segments: RwLock::new(catalog),
                directory,
                visimap,
                has_directory: AtomicBool::new(false),
                has_unique_index: AtomicBool::new(false),
                modcount: AtomicU64::new(0),
            }),
        })
    }

    pub fn id(&self) -> TableId {
        self.inner.id
    }

    pub fn config(&self) -> &AocsConfig {
        &self.inner.config
    }

    pub fn write_hints(&self) -> AocsWriteHints {
        AocsWriteHints::from_config(&self.inner.config)
    }

    pub fn pager(&self) -> &Arc<P> {
        &self.inner.pager
    }

    pub fn txn_manager(&self) -> &TxnIdManager {
        &self.inner.txn_manager
    }

    pub fn block_directory(&self) -> &BlockDirectory {
        &self.inner.directory
    }

    pub fn visibility_map(&self) -> &VisibilityMap {
        &self.inner.visimap
    }

    pub fn has_block_directory(&self) -> bool {
        self.inner.has_directory.load(Ordering::Acquire)
    }

    pub fn has_unique_index(&self) -> bool {
        self.inner.has_unique_index.load(Ordering::Acquire)
    }

    pub fn modcount(&self) -> u64 {
        self.inner.modcount.load(Ordering::Acquire)
    }

    pub(crate) fn bump_modcount(&self) {
        let now = self.inner.modcount.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::trace!("[AOCS] table {} modcount -> {now}", self.inner.id);
    }

    pub fn columns(&self) -> Vec<ColumnDef> {
        self.inner
            .columns
            .read()
            .expect("column list lock poisoned")
            .clone()
    }

    pub fn num_columns(&self) -> usize {
        self.inner
            .columns
            .read()
            .expect("column list lock poisoned")
            .len()
    }

    pub fn first_non_dropped_column(&self) -> Result<ColumnIndex> {
        self.inner
            .columns
            .read()
            .expect("column list lock poisoned")
            .iter()
            .position(|c| !c.dropped)
            .ok_or_else(|| Error::Internal(format!("table {} has no live column", self.id())))
    }

    pub(crate) fn catalog(&self) -> RwLockReadGuard<'_, SegmentCatalog> {
        self.inner
            .segments
            .read()
            .expect("segment catalog lock poisoned")
    }

    pub(crate) fn catalog_mut(&self) -> RwLockWriteGuard<'_, SegmentCatalog> {
        self.inner
            .segments
            .write()
            .expect("segment catalog lock poisoned")
    }

    /// Release a writer's segment lock. Never panics, so it is safe to call from `Drop`.
    pub(crate) fn release_segment(&self, segno: SegmentNo) {
        match self.inner.segments.write() {
            Ok(mut catalog) => catalog.release_write(segno),
            Err(_) => tracing::warn!(
                "[AOCS] table {}: catalog lock poisoned, seg {segno} stays locked",
                self.inner.id
            ),
        }
    }

    /// The view segment and directory metadata are read under.
    ///
    /// Metadata must never be read with [`ReadView::Any`]: blocks left behind by aborted
    /// writers would become visible. Such readers fall back to the latest snapshot.
    pub(crate) fn metadata_view(&self, view: &ReadView) -> ReadView {
        if view.is_any() {
            ReadView::Mvcc(self.inner.txn_manager.latest_snapshot())
        } else {
            view.clone()
        }
    }

    /// Append a column. Rows stored before the call read `missing_value`.
    pub fn add_column(&self, def: ColumnDef, missing_value: Datum) -> Result<ColumnIndex> {
        if !missing_value.fits(def.ty) {
            return Err(Error::InvalidArgumentError(format!(
                "missing value {missing_value:?} does not fit column type {:?}",
                def.ty
            )));
        }
        let mut columns = self
            .inner
            .columns
            .write()
            .expect("column list lock poisoned");
        let mut catalog = self.catalog_mut();
        let index = catalog.add_column();
        columns.push(def.with_missing_value(missing_value));
        tracing::debug!("[AOCS] table {} added column {index}", self.inner.id);
        Ok(index)
    }

    /// Mark a column dropped. Its slot stays so column indexes remain stable.
    pub fn drop_column(&self, column: ColumnIndex) -> Result<()> {
        let mut columns = self
            .inner
            .columns
            .write()
            .expect("column list lock poisoned");
        if columns.iter().filter(|c| !c.dropped).count() <= 1 {
            return Err(Error::InvalidArgumentError(
                "cannot drop the last live column".into(),
            ));
        }
        let def = columns.get_mut(column).ok_or_else(|| {
            Error::InvalidArgumentError(format!("column {column} does not exist"))
        })?;
        def.dropped = true;
        Ok(())
    }

    /// Record that an index now exists on the table.
    ///
    /// The first index builds the block directory from the blocks already stored; writers
    /// maintain it from then on. A unique index additionally makes writers publish a
    /// placeholder minipage when they start.
    pub fn register_index(&self, unique: bool) -> Result<()> {
        if unique {
            self.inner.has_unique_index.store(true, Ordering::Release);
        }
        self.ensure_block_directory()?;
        Ok(())
    }

    /// Turn on directory maintenance, building the directory if it holds nothing yet.
    /// Returns whether a build ran.
    pub(crate) fn ensure_block_directory(&self) -> Result<bool> {
        self.inner.has_directory.store(true, Ordering::Release);
        if !self.inner.directory.is_empty() {
            return Ok(false);
        }
        self.build_block_directory()?;
        Ok(true)
    }

    /// Describe every stored block in the block directory.
    ///
    /// Each block keeps the version of the writer that stored it, so blocks of writers that
    /// later aborted stay invisible through the directory as well.
    pub(crate) fn build_block_directory(&self) -> Result<()> {
        let directory = &self.inner.directory;
        if !directory.is_empty() {
            return Ok(());
        }
        let catalog = self.catalog();
        let mut described = 0usize;
        for segment in catalog.segments() {
            for column in 0..segment.vp_entries() {
                let file = segment.column_file(column)?;
                for group in file.blocks().chunk_by(|a, b| a.version == b.version) {
                    let version = group[0].version;
                    let stamp = WriteStamp::new(version.created_by, version.created_cmd);
                    let mut writer = directory.writer(segment.segno(), stamp);
                    for block in group {
                        writer.insert_entry(column, block.first_row, block.file_offset, block.row_count)?;
                        described += 1;
                    }
                    writer.finish()?;
                }
            }
        }
        tracing::debug!(
            "[BLKDIR] table {}: built directory over {described} blocks",
            self.inner.id
        );
        Ok(())
    }

    /// Remove every row: segment files, block directory and visibility map.
    pub fn nontransactional_truncate(&self) -> Result<()> {
        let keys = self.catalog_mut().truncate();
        self.inner.pager.free_many(&keys)?;
        self.inner.directory.clear();
        self.inner.visimap.clear();
        self.bump_modcount();
        tracing::debug!(
            "[AOCS] table {} truncated, freed {} blocks",
            self.inner.id,
            keys.len()
        );
        Ok(())
    }

    /// Hide a compacted segment from readers and writers.
    pub fn mark_segment_awaiting_drop(&self, segno: SegmentNo) -> Result<()> {
        self.catalog_mut().mark_awaiting_drop(segno)?;
        tracing::debug!("[AOCS] table {} seg {segno} awaiting drop", self.inner.id);
        Ok(())
    }

    /// Physically drop the contents of a segment awaiting drop.
    ///
    /// The segment number stays allocated and keeps counting rows, so the rows it held
    /// become a hole no later row number reuses.
    pub fn clear_segment(&self, segno: SegmentNo) -> Result<()> {
        let keys = {
            let mut catalog = self.catalog_mut();
            if catalog.segment(segno)?.state() != SegmentState::AwaitingDrop {
                return Err(Error::ProgrammingError(format!(
                    "segment {segno} must await drop before it is cleared"
                )));
            }
            catalog.clear_segment(segno)?
        };
        self.inner.pager.free_many(&keys)?;
        self.inner.directory.remove_segment(segno);
        self.inner.visimap.remove_segment(segno);
        tracing::debug!(
            "[AOCS] table {} seg {segno} cleared, freed {} blocks",
            self.inner.id,
            keys.len()
        );
        Ok(())
    }
}
