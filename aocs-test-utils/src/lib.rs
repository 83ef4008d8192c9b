//! Test helpers shared by the AOCS crates.

use std::sync::Once;

use tracing_subscriber::filter::EnvFilter;

static INIT: Once = Once::new();

/// Directives used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_TEST_FILTER: &str = "warn,aocs_table=info,aocs_directory=info";

fn test_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_TEST_FILTER))
}

/// Install a `fmt` subscriber for the calling test binary. Safe to call from every test.
///
/// `RUST_LOG=debug` shows the `[AOCS]`/`[BLKDIR]`/`[VISIMAP]` lifecycle events; `trace`
/// adds per-row visibility and positioning decisions. Output goes through the test
/// writer so it is captured per test.
pub fn init_tracing_for_tests() {
    INIT.call_once(|| {
        let directives = std::env::var("RUST_LOG").ok();
        // Another harness may already own the global subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(test_filter(directives.as_deref()))
            .with_target(false)
            .with_test_writer()
            .try_init();
    });
}
