use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use aocs_result::{Error, Result};

/// Cooperative cancellation flag polled by scan, insert and positioning loops.
///
/// Clones share the flag, so the session that owns a long-running operation can hand a
/// clone to whoever may cancel it.
#[derive(Clone, Debug, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Fail with [`Error::Interrupted`] if cancellation was requested.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_raised() {
            tracing::debug!("[AOCS] interrupt observed");
            return Err(Error::Interrupted);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let a = Interrupt::new();
        let b = a.clone();
        assert!(a.check().is_ok());
        b.raise();
        assert!(matches!(a.check(), Err(Error::Interrupted)));
        a.clear();
        assert!(b.check().is_ok());
    }
}
