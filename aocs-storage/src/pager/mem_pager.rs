use super::*;
use crate::types::PhysicalKey;
use aocs_result::{Error, Result};
use bytes::Bytes;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

#[derive(Default)]
struct BlobTable {
    blobs: FxHashMap<PhysicalKey, Bytes>,
    stored_bytes: u64,
}

/// Pager that keeps every column block in process memory.
///
/// Segment files of a table live here for as long as the pager does; nothing survives a
/// restart.
pub struct MemPager {
    next_key: AtomicU64,
    table: RwLock<BlobTable>,
}

impl Default for MemPager {
    fn default() -> Self {
        Self::new()
    }
}

impl MemPager {
    pub fn new() -> Self {
        Self {
            // Key 0 is never handed out so a zeroed key reads as "unset".
            next_key: AtomicU64::new(1),
            table: RwLock::new(BlobTable::default()),
        }
    }

    /// Number of blocks currently stored.
    pub fn blob_count(&self) -> usize {
        self.table
            .read()
            .expect("mem pager lock poisoned")
            .blobs
            .len()
    }

    /// Sum of the lengths of all stored blocks.
    pub fn stored_bytes(&self) -> u64 {
        self.table
            .read()
            .expect("mem pager lock poisoned")
            .stored_bytes
    }
}

impl Pager for MemPager {
    type Blob = Bytes;

    fn alloc_many(&self, n: usize) -> Result<Vec<PhysicalKey>> {
        let count = n as u64;
        let first = self
            .next_key
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                cur.checked_add(count)
            })
            .map_err(|_| Error::Internal("mem pager ran out of keys".into()))?;
        Ok((first..first + count).collect())
    }

    fn batch_put(&self, puts: &[BatchPut]) -> Result<()> {
        let mut table = self.table.write().expect("mem pager lock poisoned");
        for BatchPut::Raw { key, bytes } in puts {
            let blob = Bytes::copy_from_slice(bytes);
            table.stored_bytes += blob.len() as u64;
            if let Some(old) = table.blobs.insert(*key, blob) {
                table.stored_bytes -= old.len() as u64;
            }
        }
        Ok(())
    }

    fn batch_get(&self, gets: &[BatchGet]) -> Result<Vec<GetResult<Self::Blob>>> {
        let table = self.table.read().expect("mem pager lock poisoned");
        Ok(gets
            .iter()
            .map(|&BatchGet::Raw { key }| match table.blobs.get(&key) {
                Some(blob) => GetResult::Raw {
                    key,
                    bytes: blob.clone(),
                },
                None => GetResult::Missing { key },
            })
            .collect())
    }

    fn free_many(&self, keys: &[PhysicalKey]) -> Result<()> {
        let mut table = self.table.write().expect("mem pager lock poisoned");
        for key in keys {
            if let Some(old) = table.blobs.remove(key) {
                table.stored_bytes -= old.len() as u64;
            }
        }
        Ok(())
    }
}
