/// Run-time configuration of one table (no hidden constants).
#[derive(Debug, Clone)]
pub struct AocsConfig {
    /// Rows buffered per column writer before a block is flushed.
    pub block_row_limit: usize,
    /// Encoded bytes buffered per column writer before a block is flushed.
    pub block_byte_limit: usize,
    /// Entries an in-memory block directory minipage holds before it is written out.
    pub minipage_entries: usize,
    /// Row numbers reserved per sequence allocation when the caller has no better hint.
    pub fast_sequence_chunk: u64,
    /// Number of segment files the table may use.
    pub max_segments: u16,
}

impl Default for AocsConfig {
    fn default() -> Self {
        Self {
            block_row_limit: 8192,
            block_byte_limit: 1 << 20,
            minipage_entries: 161,
            fast_sequence_chunk: 100,
            max_segments: 127,
        }
    }
}

impl AocsConfig {
    pub fn with_block_row_limit(mut self, rows: usize) -> Self {
        self.block_row_limit = rows;
        self
    }

    pub fn with_minipage_entries(mut self, entries: usize) -> Self {
        self.minipage_entries = entries;
        self
    }
}
