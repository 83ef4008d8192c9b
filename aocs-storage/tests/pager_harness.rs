//! Shared test harness for Pager implementations.
//!
//! Verifies for any Pager:
//! - CRUD roundtrip: after `batch_put`, keys are returned by `batch_get`;
//!   after delete, they're gone.
//! - Reopen behavior: an ephemeral pager yields an empty view after reopen.

use std::path::{Path, PathBuf};

use aocs_result::Result;
use aocs_storage::pager::{BatchGet, BatchPut, GetResult, Pager};
use aocs_storage::types::PhysicalKey;
use tempfile::TempDir;

/// Run a CRUD roundtrip on any `Pager`.
pub fn run_crud_roundtrip<P, F>(make: F)
where
    P: Pager,
    F: FnOnce(&Path) -> Result<P>,
{
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("pager.db");
    let pager = make(&path).expect("open pager");

    let ks: Vec<PhysicalKey> = pager.alloc_many(3).expect("alloc_many");
    assert_eq!(ks.len(), 3);

    pager
        .batch_put(&[
            BatchPut::Raw {
                key: ks[0],
                bytes: b"alpha".to_vec(),
            },
            BatchPut::Raw {
                key: ks[1],
                bytes: b"bravo-123".to_vec(),
            },
            BatchPut::Raw {
                key: ks[2],
                bytes: vec![0u8; 1024],
            },
        ])
        .expect("batch_put");

    let got = pager
        .batch_get(&[
            BatchGet::Raw { key: ks[0] },
            BatchGet::Raw { key: ks[1] },
            BatchGet::Raw { key: ks[2] },
        ])
        .expect("batch_get");
    let found = got
        .iter()
        .filter(|r| matches!(r, GetResult::Raw { .. }))
        .count();
    assert_eq!(found, 3, "all inserted keys should be found");

    pager.free_many(&[ks[0], ks[2]]).expect("free_many");

    let after_del = pager
        .batch_get(&[
            BatchGet::Raw { key: ks[0] },
            BatchGet::Raw { key: ks[1] },
            BatchGet::Raw { key: ks[2] },
        ])
        .expect("get after delete");
    let missing_after = after_del
        .iter()
        .filter(|r| matches!(r, GetResult::Missing { .. }))
        .count();
    assert_eq!(missing_after, 2, "two keys should be missing after delete");
    match &after_del[1] {
        GetResult::Raw { bytes, .. } => assert_eq!(bytes.as_ref(), b"bravo-123"),
        GetResult::Missing { .. } => panic!("kept key went missing"),
    }
}

/// An ephemeral pager must not see data written through an earlier handle.
pub fn run_reopen_is_ephemeral<P, Make>(make: Make)
where
    P: Pager,
    Make: Fn(&Path) -> Result<P>,
{
    let tmp = TempDir::new().expect("tempdir");
    let path: PathBuf = tmp.path().join("pager.db");

    let pager1 = make(&path).expect("open pager");
    let ks = pager1.alloc_many(2).expect("alloc");
    pager1
        .batch_put(&[
            BatchPut::Raw {
                key: ks[0],
                bytes: b"a".to_vec(),
            },
            BatchPut::Raw {
                key: ks[1],
                bytes: b"bb".to_vec(),
            },
        ])
        .expect("put");
    drop(pager1);

    let pager2 = make(&path).expect("reopen pager");
    let got = pager2
        .batch_get(&[BatchGet::Raw { key: ks[0] }, BatchGet::Raw { key: ks[1] }])
        .expect("get after reopen");
    assert!(
        got.iter().all(|r| matches!(r, GetResult::Missing { .. })),
        "mem/ephemeral pager should NOT retain data after reopen"
    );
}
