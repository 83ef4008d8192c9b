use crate::config::AocsConfig;

/// Batch sizes a bulk loader should hand to [`DmlContext::multi_insert`].
///
/// A batch of `recommended_insert_batch_rows` fills at least one block per column and
/// reserves its row numbers with a single fast-sequence allocation.
///
/// [`DmlContext::multi_insert`]: crate::dml::DmlContext::multi_insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AocsWriteHints {
    /// Rows per block a column writer aims for.
    pub block_rows: usize,
    /// Preferred number of rows to hand to one `multi_insert` call.
    pub recommended_insert_batch_rows: usize,
    /// Hard ceiling for one `multi_insert` call.
    pub max_insert_batch_rows: usize,
}

impl AocsWriteHints {
    pub fn from_config(cfg: &AocsConfig) -> Self {
        let block_rows = cfg.block_row_limit.max(1);
        let chunk = usize::try_from(cfg.fast_sequence_chunk).unwrap_or(usize::MAX);
        let recommended = block_rows.max(chunk).max(1);
        Self {
            block_rows,
            recommended_insert_batch_rows: recommended,
            max_insert_batch_rows: recommended.saturating_mul(8),
        }
    }

    /// Clamp a requested batch size to the supported envelope.
    pub fn clamp_insert_batch_rows(&self, requested_rows: usize) -> usize {
        match requested_rows {
            0 => 0,
            _ => requested_rows.min(self.max_insert_batch_rows),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_follows_block_rows() {
        let cfg = AocsConfig::default().with_block_row_limit(1000);
        let hints = AocsWriteHints::from_config(&cfg);
        assert_eq!(hints.block_rows, 1000);
        assert_eq!(hints.recommended_insert_batch_rows, 1000);
        assert!(hints.max_insert_batch_rows >= hints.recommended_insert_batch_rows);
    }

    #[test]
    fn clamp_insert_batch_rows_caps_large_values() {
        let hints = AocsWriteHints::from_config(&AocsConfig::default());
        assert_eq!(hints.clamp_insert_batch_rows(0), 0);
        let max = hints.max_insert_batch_rows;
        assert_eq!(hints.clamp_insert_batch_rows(max * 10), max);
        assert_eq!(hints.clamp_insert_batch_rows(max - 1), max - 1);
    }
}
