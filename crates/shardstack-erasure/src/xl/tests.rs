//! End-to-end tests for the erasure object store over real tempdir disks.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use shardstack_storage::{FileWriter, PosixBackend, StorageBackend, StorageError};

use super::XlStore;
use crate::meta::XlMeta;

const VOL: &str = "bucket";

/// Small block size so multi-block paths are exercised cheaply.
const TEST_BLOCK: usize = 1024;

async fn store(
    data: usize,
    parity: usize,
    block_size: usize,
) -> (Vec<tempfile::TempDir>, XlStore) {
    let mut dirs = Vec::new();
    let mut disks: Vec<Arc<dyn StorageBackend>> = Vec::new();
    for _ in 0..data + parity {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let backend = PosixBackend::new(dir.path())
            .await
            .unwrap_or_else(|e| panic!("backend open failed: {e}"));
        disks.push(Arc::new(backend));
        dirs.push(dir);
    }
    let store = XlStore::new(disks, data, parity)
        .unwrap_or_else(|e| panic!("store open failed: {e}"))
        .with_block_size(block_size);
    store.make_vol(VOL).await.expect("make_vol");
    (dirs, store)
}

async fn put(store: &XlStore, path: &str, data: &[u8]) {
    let mut writer = store
        .create_file(VOL, path)
        .await
        .unwrap_or_else(|e| panic!("create_file failed: {e}"));
    writer
        .append(data)
        .await
        .unwrap_or_else(|e| panic!("append failed: {e}"));
    writer
        .commit()
        .await
        .unwrap_or_else(|e| panic!("commit failed: {e}"));
}

async fn get(store: &XlStore, path: &str, offset: u64) -> Result<Vec<u8>, StorageError> {
    let mut stream = store.read_stream(VOL, path, offset).await?;
    let mut out = Vec::new();
    while let Some(item) = stream.next().await {
        out.extend_from_slice(&item?);
    }
    Ok(out)
}

/// A deterministic non-repeating byte pattern.
fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

fn shard_path(
    dirs: &[tempfile::TempDir],
    disk: usize,
    path: &str,
    file: &str,
) -> std::path::PathBuf {
    dirs[disk].path().join(VOL).join(path).join(file)
}

// ---------------------------------------------------------------------------
// Round trips
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_round_trip_single_block_object() {
    let (_dirs, store) = store(2, 1, TEST_BLOCK).await;
    let data = pattern(100);
    put(&store, "obj", &data).await;
    assert_eq!(get(&store, "obj", 0).await.expect("read"), data);
}

#[tokio::test]
async fn test_should_round_trip_multi_block_object() {
    let (_dirs, store) = store(4, 2, TEST_BLOCK).await;
    // Spans several blocks with a ragged tail.
    let data = pattern(10 * TEST_BLOCK + 17);
    put(&store, "a/big", &data).await;
    assert_eq!(get(&store, "a/big", 0).await.expect("read"), data);
}

#[tokio::test]
async fn test_should_round_trip_zero_byte_object() {
    let (_dirs, store) = store(2, 1, TEST_BLOCK).await;
    put(&store, "empty", b"").await;
    assert_eq!(get(&store, "empty", 0).await.expect("read"), b"");
    assert!(store.nslock().is_empty(), "lock must be released");
}

// ---------------------------------------------------------------------------
// Degraded reads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_read_ten_mib_with_two_shards_deleted() {
    let (dirs, store) = store(4, 2, super::ERASURE_BLOCK_SIZE).await;
    let data = vec![0xAB_u8; 10 * 1024 * 1024];
    put(&store, "big", &data).await;

    std::fs::remove_file(shard_path(&dirs, 3, "big", "part.3")).expect("remove part.3");
    std::fs::remove_file(shard_path(&dirs, 5, "big", "part.5")).expect("remove part.5");

    let read = get(&store, "big", 0).await.expect("degraded read");
    assert_eq!(read.len(), 10_485_760);
    assert!(read.iter().all(|b| *b == 0xAB));
}

#[tokio::test]
async fn test_should_recover_from_single_corrupted_shard() {
    let (dirs, store) = store(4, 2, TEST_BLOCK).await;
    let data = pattern(3 * TEST_BLOCK);
    put(&store, "obj", &data).await;

    // Flip one byte of part.1 on disk 1.
    let target = shard_path(&dirs, 1, "obj", "part.1");
    let mut shard = std::fs::read(&target).expect("read shard");
    shard[10] ^= 0xFF;
    std::fs::write(&target, shard).expect("write shard");

    assert_eq!(get(&store, "obj", 0).await.expect("repairing read"), data);
}

#[tokio::test]
async fn test_should_read_with_quorum_at_minimum() {
    // One disk loses its metadata: quorum is exactly data + 1 and that
    // disk's shard is reconstructed.
    let (dirs, store) = store(2, 2, TEST_BLOCK).await;
    let data = pattern(5000);
    put(&store, "obj", &data).await;

    std::fs::remove_file(shard_path(&dirs, 0, "obj", "file.json")).expect("remove meta");

    assert_eq!(get(&store, "obj", 0).await.expect("read"), data);
}

#[tokio::test]
async fn test_should_fail_quorum_with_data_disks_only() {
    let (dirs, store) = store(2, 2, TEST_BLOCK).await;
    put(&store, "obj", &pattern(100)).await;

    std::fs::remove_file(shard_path(&dirs, 0, "obj", "file.json")).expect("remove meta");
    std::fs::remove_file(shard_path(&dirs, 1, "obj", "file.json")).expect("remove meta");

    let result = store.read_stream(VOL, "obj", 0).await;
    assert!(matches!(
        result,
        Err(StorageError::ReadQuorum { have: 2, need: 3, .. })
    ));
}

#[tokio::test]
async fn test_should_fail_stream_beyond_parity_losses() {
    let (dirs, store) = store(4, 2, TEST_BLOCK).await;
    put(&store, "obj", &pattern(4000)).await;

    // Truncate three shards: their opens still succeed, but every block
    // read comes up short, leaving fewer than data_blocks shards.
    for disk in [0, 1, 2] {
        std::fs::write(shard_path(&dirs, disk, "obj", &format!("part.{disk}")), b"")
            .unwrap_or_else(|e| panic!("truncate part.{disk}: {e}"));
    }

    let result = get(&store, "obj", 0).await;
    assert!(matches!(result, Err(StorageError::Corrupted { .. })));
}

#[tokio::test]
async fn test_should_fail_open_when_too_few_shards_remain() {
    let (dirs, store) = store(4, 2, TEST_BLOCK).await;
    put(&store, "obj", &pattern(4000)).await;

    for disk in [0, 1, 2] {
        std::fs::remove_file(shard_path(&dirs, disk, "obj", &format!("part.{disk}")))
            .unwrap_or_else(|e| panic!("remove part.{disk}: {e}"));
    }

    let result = store.read_stream(VOL, "obj", 0).await;
    assert!(matches!(result, Err(StorageError::FileNotFound { .. })));
}

// ---------------------------------------------------------------------------
// Offsets
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_read_from_block_aligned_offset() {
    let (_dirs, store) = store(4, 2, TEST_BLOCK).await;
    let data = pattern(5 * TEST_BLOCK + 99);
    put(&store, "obj", &data).await;

    let offset = 2 * TEST_BLOCK;
    let read = get(&store, "obj", offset as u64).await.expect("read");
    assert_eq!(read, &data[offset..]);
}

#[tokio::test]
async fn test_should_return_empty_stream_at_offset_equal_size() {
    let (_dirs, store) = store(2, 1, TEST_BLOCK).await;
    let data = pattern(2 * TEST_BLOCK);
    put(&store, "obj", &data).await;

    let read = get(&store, "obj", data.len() as u64).await.expect("read");
    assert!(read.is_empty());
}

#[tokio::test]
async fn test_should_reject_unaligned_offset() {
    let (_dirs, store) = store(2, 1, TEST_BLOCK).await;
    put(&store, "obj", &pattern(4096)).await;

    let result = store.read_stream(VOL, "obj", 7).await;
    assert!(matches!(result, Err(StorageError::InvalidArgument { .. })));
}

#[tokio::test]
async fn test_should_reject_offset_beyond_size() {
    let (_dirs, store) = store(2, 1, TEST_BLOCK).await;
    put(&store, "obj", &pattern(100)).await;

    let result = store.read_stream(VOL, "obj", 10 * TEST_BLOCK as u64).await;
    assert!(matches!(result, Err(StorageError::InvalidArgument { .. })));
}

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_increment_version_on_rewrite() {
    let (_dirs, store) = store(2, 1, TEST_BLOCK).await;
    put(&store, "obj", b"one").await;
    put(&store, "obj", b"two").await;

    let meta = store
        .read_meta_on(&store.disks[0], VOL, "obj")
        .await
        .expect("read meta");
    assert_eq!(meta.version(), Some(2));
    assert_eq!(get(&store, "obj", 0).await.expect("read"), b"two");
}

#[tokio::test]
async fn test_should_ignore_stale_lower_version_disk() {
    let (dirs, store) = store(2, 2, TEST_BLOCK).await;
    put(&store, "obj", b"version one payload").await;
    put(&store, "obj", b"version two payload").await;

    // Roll disk 0 back to a stale version-1 metadata file.
    let stale = XlMeta::new(19, 1, 2, 2, "00".repeat(16));
    std::fs::write(
        shard_path(&dirs, 0, "obj", "file.json"),
        serde_json::to_vec(&stale).expect("serialize"),
    )
    .expect("write stale meta");

    // Disks 1..3 still carry version 2, which satisfies read quorum; the
    // stale disk's shard is simply reconstructed around.
    assert_eq!(
        get(&store, "obj", 0).await.expect("read"),
        b"version two payload"
    );
}

// ---------------------------------------------------------------------------
// Cancellation and locking
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_release_lock_when_consumer_drops_stream() {
    let (_dirs, store) = store(2, 1, TEST_BLOCK).await;
    let data = pattern(64 * TEST_BLOCK);
    put(&store, "obj", &data).await;

    let mut stream = store.read_stream(VOL, "obj", 0).await.expect("open read");
    let first = stream.next().await.expect("one chunk").expect("chunk ok");
    assert!(!first.is_empty());
    drop(stream);

    // The producer notices the closed pipe on its next send and releases
    // the shared lock, letting an exclusive writer through.
    let acquired = tokio::time::timeout(Duration::from_secs(2), async {
        let _w = store.nslock().wlock(VOL, "obj").await;
    })
    .await;
    assert!(acquired.is_ok(), "lock must be released after cancellation");
}

#[tokio::test]
async fn test_should_stream_full_object_without_truncation() {
    let (_dirs, store) = store(4, 2, TEST_BLOCK).await;
    let data = pattern(7 * TEST_BLOCK + 1);
    put(&store, "obj", &data).await;

    let mut stream = store.read_stream(VOL, "obj", 0).await.expect("open read");
    let mut total = 0usize;
    while let Some(item) = stream.next().await {
        total += item.expect("no stream error").len();
    }
    assert_eq!(total, data.len());
    assert!(store.nslock().is_empty());
}

// ---------------------------------------------------------------------------
// Stat / delete / absence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_stat_committed_object() {
    let (_dirs, store) = store(2, 1, TEST_BLOCK).await;
    put(&store, "a/obj", &pattern(12345)).await;

    let info = store.stat_file(VOL, "a/obj").await.expect("stat");
    assert_eq!(info.size, 12345);
}

#[tokio::test]
async fn test_should_report_missing_object() {
    let (_dirs, store) = store(2, 1, TEST_BLOCK).await;
    assert!(matches!(
        store.read_stream(VOL, "ghost", 0).await,
        Err(StorageError::FileNotFound { .. })
    ));
    assert!(matches!(
        store.stat_file(VOL, "ghost").await,
        Err(StorageError::FileNotFound { .. })
    ));
    assert!(matches!(
        store.delete_file(VOL, "ghost").await,
        Err(StorageError::FileNotFound { .. })
    ));
}

#[tokio::test]
async fn test_should_delete_object_from_all_disks() {
    let (dirs, store) = store(2, 1, TEST_BLOCK).await;
    put(&store, "a/obj", &pattern(100)).await;
    store.delete_file(VOL, "a/obj").await.expect("delete");

    assert!(matches!(
        store.stat_file(VOL, "a/obj").await,
        Err(StorageError::FileNotFound { .. })
    ));
    for (i, dir) in dirs.iter().enumerate() {
        assert!(
            !dir.path().join(VOL).join("a").exists(),
            "disk {i} should have pruned the object directory"
        );
    }
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_list_objects_with_metadata_sizes() {
    let (_dirs, store) = store(2, 2, TEST_BLOCK).await;
    put(&store, "a/x", &pattern(100)).await;
    put(&store, "a/y", &pattern(200)).await;

    let page = store
        .list_files(VOL, "a/", "", true, 10)
        .await
        .expect("list");
    let summary: Vec<_> = page.entries.iter().map(|e| (e.name.as_str(), e.size)).collect();
    assert_eq!(summary, vec![("a/x", 100), ("a/y", 200)]);
    assert!(page.eof);
}

#[tokio::test]
async fn test_should_squash_object_directories_one_level() {
    let (_dirs, store) = store(2, 1, TEST_BLOCK).await;
    put(&store, "p/q", &pattern(10)).await;
    put(&store, "p/r", &pattern(10)).await;
    put(&store, "s", &pattern(10)).await;

    let page = store
        .list_files(VOL, "", "", false, 10)
        .await
        .expect("list");
    let names: Vec<_> = page.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["p/", "s"]);
    assert!(page.entries[1].size > 0, "object entry carries its size");
}

#[tokio::test]
async fn test_should_page_one_level_listing_with_marker() {
    let (_dirs, store) = store(2, 1, TEST_BLOCK).await;
    put(&store, "p/q", &pattern(10)).await;
    put(&store, "p/r", &pattern(10)).await;
    put(&store, "s", &pattern(10)).await;

    let first = store
        .list_files(VOL, "", "", false, 1)
        .await
        .expect("first page");
    assert_eq!(first.entries[0].name, "p/");
    assert!(!first.eof);

    let second = store
        .list_files(VOL, "", "p/", false, 10)
        .await
        .expect("second page");
    let names: Vec<_> = second.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["s"]);
    assert!(second.eof);
}

#[tokio::test]
async fn test_should_continue_recursive_listing_past_object_marker() {
    let (_dirs, store) = store(2, 1, TEST_BLOCK).await;
    for name in ["a/x", "a/y", "b"] {
        put(&store, name, &pattern(10)).await;
    }

    let page = store
        .list_files(VOL, "", "a/x", true, 10)
        .await
        .expect("list");
    let names: Vec<_> = page.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["a/y", "b"]);
}

// ---------------------------------------------------------------------------
// Volumes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_should_propagate_volume_conflicts() {
    let (_dirs, store) = store(2, 1, TEST_BLOCK).await;
    assert!(matches!(
        store.make_vol(VOL).await,
        Err(StorageError::VolumeExists { .. })
    ));

    put(&store, "obj", b"x").await;
    assert!(matches!(
        store.delete_vol(VOL).await,
        Err(StorageError::VolumeNotEmpty { .. })
    ));

    store.delete_file(VOL, "obj").await.expect("delete object");
    store.delete_vol(VOL).await.expect("delete empty volume");
    assert!(matches!(
        store.stat_vol(VOL).await,
        Err(StorageError::VolumeNotFound { .. })
    ));
}

#[tokio::test]
async fn test_should_fail_create_when_volume_missing() {
    let (_dirs, store) = store(2, 1, TEST_BLOCK).await;
    let result = store.create_file("other", "obj").await;
    assert!(matches!(result, Err(StorageError::VolumeNotFound { .. })));
}

#[tokio::test]
async fn test_should_reject_mismatched_disk_count() {
    let dir = tempfile::tempdir().expect("tempdir");
    let disk: Arc<dyn StorageBackend> =
        Arc::new(PosixBackend::new(dir.path()).await.expect("backend"));
    let result = XlStore::new(vec![disk], 2, 1);
    assert!(matches!(result, Err(StorageError::InvalidArgument { .. })));
}
