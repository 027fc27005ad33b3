//! End-to-end tests for the tiered storage manager against an in-memory
//! object store.

use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{
    GetOptions, GetResult, ListResult, MultipartUpload, ObjectMeta, ObjectStore,
    PutMultipartOpts, PutOptions, PutPayload, PutResult,
};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::RsaPrivateKey;
use tierhouse_storage::{
    ChunkCacheConfig, Error, TieredStorageConfig, TieredStorageManager,
};
use tierhouse_core::{IndexType, SegmentData, SegmentMetadata};
use uuid::Uuid;

/// Delegating store that counts reads, so tests can observe how often the
/// backend is actually hit.
#[derive(Debug)]
struct CountingStore {
    inner: InMemory,
    gets: AtomicUsize,
    range_gets: AtomicUsize,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: InMemory::new(),
            gets: AtomicUsize::new(0),
            range_gets: AtomicUsize::new(0),
        }
    }
}

impl fmt::Display for CountingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CountingStore({})", self.inner)
    }
}

#[async_trait]
impl ObjectStore for CountingStore {
    async fn put_opts(
        &self,
        location: &Path,
        payload: PutPayload,
        opts: PutOptions,
    ) -> object_store::Result<PutResult> {
        self.inner.put_opts(location, payload, opts).await
    }

    async fn put_multipart_opts(
        &self,
        location: &Path,
        opts: PutMultipartOpts,
    ) -> object_store::Result<Box<dyn MultipartUpload>> {
        self.inner.put_multipart_opts(location, opts).await
    }

    async fn get_opts(
        &self,
        location: &Path,
        options: GetOptions,
    ) -> object_store::Result<GetResult> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_opts(location, options).await
    }

    async fn get_range(
        &self,
        location: &Path,
        range: Range<usize>,
    ) -> object_store::Result<Bytes> {
        self.range_gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_range(location, range).await
    }

    async fn delete(&self, location: &Path) -> object_store::Result<()> {
        self.inner.delete(location).await
    }

    fn list(&self, prefix: Option<&Path>) -> BoxStream<'_, object_store::Result<ObjectMeta>> {
        self.inner.list(prefix)
    }

    async fn list_with_delimiter(
        &self,
        prefix: Option<&Path>,
    ) -> object_store::Result<ListResult> {
        self.inner.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> object_store::Result<()> {
        self.inner.copy(from, to).await
    }

    async fn copy_if_not_exists(&self, from: &Path, to: &Path) -> object_store::Result<()> {
        self.inner.copy_if_not_exists(from, to).await
    }
}

fn segment_meta(size: u64) -> SegmentMetadata {
    SegmentMetadata {
        topic: "orders".to_string(),
        partition: 0,
        base_offset: 0,
        segment_id: Uuid::new_v4(),
        size,
    }
}

fn segment_data(log: impl Into<Bytes>) -> SegmentData {
    SegmentData {
        log: log.into(),
        offset_index: Bytes::from_static(b"offset-index"),
        time_index: Bytes::from_static(b"time-index"),
        producer_snapshot: Bytes::from_static(b"producer-snapshot"),
        transaction_index: None,
        leader_epoch_index: Bytes::from_static(b"leader-epoch"),
    }
}

fn base_config() -> TieredStorageConfig {
    TieredStorageConfig {
        chunk_size: 10,
        key_prefix: "tiered".to_string(),
        ..Default::default()
    }
}

/// Writes a fresh RSA key pair into `dir` and returns a config with
/// encryption switched on.
fn encrypted_config(dir: &std::path::Path) -> TieredStorageConfig {
    let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap();
    let public_path = dir.join("public.pem");
    let private_path = dir.join("private.pem");
    std::fs::write(
        &public_path,
        private
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap(),
    )
    .unwrap();
    let private_pem = private.to_pkcs8_pem(LineEnding::LF).unwrap();
    std::fs::write(&private_path, private_pem.as_bytes()).unwrap();

    TieredStorageConfig {
        encryption_enabled: true,
        encryption_public_key_file: Some(public_path),
        encryption_private_key_file: Some(private_path),
        ..base_config()
    }
}

const TWENTY_BYTES: &[u8] = b"01234567891011121314";

#[tokio::test]
async fn fetch_whole_segment() {
    let manager =
        TieredStorageManager::new(base_config(), Arc::new(InMemory::new())).unwrap();
    let meta = segment_meta(20);
    manager
        .copy_log_segment(&meta, &segment_data(TWENTY_BYTES))
        .await
        .unwrap();

    let fetched = manager
        .fetch_log_segment_range(&meta, 0, 19)
        .await
        .unwrap()
        .read_to_end()
        .await
        .unwrap();
    assert_eq!(fetched, TWENTY_BYTES);
}

#[tokio::test]
async fn fetch_range_crossing_chunks() {
    let manager =
        TieredStorageManager::new(base_config(), Arc::new(InMemory::new())).unwrap();
    let meta = segment_meta(20);
    manager
        .copy_log_segment(&meta, &segment_data(TWENTY_BYTES))
        .await
        .unwrap();

    // bytes [5..=14] of the original, length 10
    let fetched = manager
        .fetch_log_segment_range(&meta, 5, 14)
        .await
        .unwrap()
        .read_to_end()
        .await
        .unwrap();
    assert_eq!(fetched, &TWENTY_BYTES[5..=14]);
}

#[tokio::test]
async fn fetch_clamps_past_the_end() {
    let manager =
        TieredStorageManager::new(base_config(), Arc::new(InMemory::new())).unwrap();
    let meta = segment_meta(20);
    manager
        .copy_log_segment(&meta, &segment_data(TWENTY_BYTES))
        .await
        .unwrap();

    let fetched = manager
        .fetch_log_segment_range(&meta, 15, 1000)
        .await
        .unwrap()
        .read_to_end()
        .await
        .unwrap();
    assert_eq!(fetched, &TWENTY_BYTES[15..]);

    assert!(matches!(
        manager.fetch_log_segment_range(&meta, 20, 25).await,
        Err(Error::Core(tierhouse_core::Error::OffsetOutOfRange { .. }))
    ));
}

#[tokio::test]
async fn round_trip_for_every_transform_combination() {
    let payload: Vec<u8> = (0..255u8).cycle().take(95).collect();
    let dir = tempfile::tempdir().unwrap();

    for (compression, encryption) in
        [(false, false), (true, false), (false, true), (true, true)]
    {
        let mut config = if encryption {
            encrypted_config(dir.path())
        } else {
            base_config()
        };
        config.compression_enabled = compression;

        let manager = TieredStorageManager::new(config, Arc::new(InMemory::new())).unwrap();
        let meta = segment_meta(95);
        manager
            .copy_log_segment(&meta, &segment_data(payload.clone()))
            .await
            .unwrap();

        let full = manager
            .fetch_log_segment(&meta, 0)
            .await
            .unwrap()
            .read_to_end()
            .await
            .unwrap();
        assert_eq!(
            full, payload,
            "full read, compression={compression} encryption={encryption}"
        );

        for (from, to) in [(0, 0), (9, 10), (13, 57), (90, 94), (94, 94)] {
            let ranged = manager
                .fetch_log_segment_range(&meta, from, to)
                .await
                .unwrap()
                .read_to_end()
                .await
                .unwrap();
            assert_eq!(
                ranged,
                &payload[from as usize..=to as usize],
                "range [{from}, {to}], compression={compression} encryption={encryption}"
            );
        }
    }
}

#[tokio::test]
async fn stream_adapts_to_async_read() {
    use tokio::io::AsyncReadExt;

    let manager =
        TieredStorageManager::new(base_config(), Arc::new(InMemory::new())).unwrap();
    let meta = segment_meta(20);
    manager
        .copy_log_segment(&meta, &segment_data(TWENTY_BYTES))
        .await
        .unwrap();

    let mut reader = manager
        .fetch_log_segment(&meta, 3)
        .await
        .unwrap()
        .into_async_read();
    let mut fetched = Vec::new();
    reader.read_to_end(&mut fetched).await.unwrap();
    assert_eq!(fetched, &TWENTY_BYTES[3..]);
}

#[tokio::test]
async fn concurrent_cold_reads_hit_backend_once_per_chunk() {
    let store = Arc::new(CountingStore::new());
    let manager = TieredStorageManager::new(base_config(), store.clone()).unwrap();
    let meta = segment_meta(20);
    manager
        .copy_log_segment(&meta, &segment_data(TWENTY_BYTES))
        .await
        .unwrap();

    let manager = Arc::new(manager);
    let mut tasks = Vec::new();
    for _ in 0..2 {
        let manager = manager.clone();
        let meta = meta.clone();
        tasks.push(tokio::spawn(async move {
            manager
                .fetch_log_segment_range(&meta, 0, 9)
                .await
                .unwrap()
                .read_to_end()
                .await
                .unwrap()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), &TWENTY_BYTES[..10]);
    }

    // chunk 0 was fetched from the store exactly once, and the manifest
    // load was shared too
    assert_eq!(store.range_gets.load(Ordering::SeqCst), 1);
    assert_eq!(store.gets.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn expired_chunk_is_reloaded() {
    let store = Arc::new(CountingStore::new());
    let config = TieredStorageConfig {
        chunk_cache: ChunkCacheConfig {
            size: -1,
            retention_ms: 100,
            path: None,
        },
        ..base_config()
    };
    let manager = TieredStorageManager::new(config, store.clone()).unwrap();
    let meta = segment_meta(20);
    manager
        .copy_log_segment(&meta, &segment_data(TWENTY_BYTES))
        .await
        .unwrap();

    async fn read_first_chunk(
        manager: &TieredStorageManager,
        meta: &SegmentMetadata,
    ) -> Bytes {
        manager
            .fetch_log_segment_range(meta, 0, 9)
            .await
            .unwrap()
            .read_to_end()
            .await
            .unwrap()
    }

    assert_eq!(read_first_chunk(&manager, &meta).await, &TWENTY_BYTES[..10]);
    assert_eq!(store.range_gets.load(Ordering::SeqCst), 1);

    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    assert_eq!(read_first_chunk(&manager, &meta).await, &TWENTY_BYTES[..10]);
    assert_eq!(store.range_gets.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn prefetch_warms_the_rest_of_the_range() {
    let store = Arc::new(CountingStore::new());
    let manager = TieredStorageManager::new(base_config(), store.clone()).unwrap();
    let payload: Vec<u8> = (0..40u8).collect();
    let meta = segment_meta(40);
    manager
        .copy_log_segment(&meta, &segment_data(payload.clone()))
        .await
        .unwrap();

    let fetched = manager
        .fetch_log_segment(&meta, 0)
        .await
        .unwrap()
        .read_to_end()
        .await
        .unwrap();
    assert_eq!(fetched, payload);

    // give background prefetch tasks time to settle, then verify that
    // single-flight kept every chunk at exactly one backend load
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(store.range_gets.load(Ordering::SeqCst), 4);

    let again = manager
        .fetch_log_segment(&meta, 0)
        .await
        .unwrap()
        .read_to_end()
        .await
        .unwrap();
    assert_eq!(again, payload);
    assert_eq!(store.range_gets.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn tampered_chunk_fails_authentication() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemory::new());
    let manager =
        TieredStorageManager::new(encrypted_config(dir.path()), store.clone()).unwrap();
    let meta = segment_meta(20);
    manager
        .copy_log_segment(&meta, &segment_data(TWENTY_BYTES))
        .await
        .unwrap();

    // flip one byte inside the first stored chunk
    let log_key = format!(
        "tiered/orders-0/{:020}-{}.log",
        meta.base_offset, meta.segment_id
    );
    let path = Path::from(log_key.as_str());
    let mut stored = store.get(&path).await.unwrap().bytes().await.unwrap().to_vec();
    stored[5] ^= 0x01;
    store.put(&path, stored.into()).await.unwrap();

    let result = manager
        .fetch_log_segment_range(&meta, 0, 9)
        .await
        .unwrap()
        .read_to_end()
        .await;
    assert!(matches!(
        result,
        Err(Error::Core(tierhouse_core::Error::AuthTagInvalid))
    ));
}

#[tokio::test]
async fn heuristic_skips_already_compressed_segments() {
    // first record batch declares a compression codec in its attributes
    let mut log = vec![0u8; 30];
    log[16] = 2; // current batch magic
    log[22] = 0x02; // codec bits
    let log = Bytes::from(log);

    let store = Arc::new(InMemory::new());
    let config = TieredStorageConfig {
        compression_enabled: true,
        compression_heuristic_enabled: true,
        ..base_config()
    };
    let manager = TieredStorageManager::new(config, store.clone()).unwrap();
    let meta = segment_meta(30);
    manager
        .copy_log_segment(&meta, &segment_data(log.clone()))
        .await
        .unwrap();

    // the uploaded log object is byte-identical to the original
    let log_key = format!(
        "tiered/orders-0/{:020}-{}.log",
        meta.base_offset, meta.segment_id
    );
    let stored = store
        .get(&Path::from(log_key.as_str()))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(stored, log);

    // and the manifest records that no compression was applied
    let manifest_key = format!(
        "tiered/orders-0/{:020}-{}.rsm-manifest",
        meta.base_offset, meta.segment_id
    );
    let manifest_body = store
        .get(&Path::from(manifest_key.as_str()))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let manifest: serde_json::Value = serde_json::from_slice(&manifest_body).unwrap();
    assert_eq!(manifest["compression"], serde_json::Value::Bool(false));
    assert_eq!(manifest["type"], "v1");
}

#[tokio::test]
async fn unsniffable_segment_is_uploaded_uncompressed() {
    let store = Arc::new(InMemory::new());
    let config = TieredStorageConfig {
        compression_enabled: true,
        compression_heuristic_enabled: true,
        ..base_config()
    };
    let manager = TieredStorageManager::new(config, store.clone()).unwrap();

    // too short to hold a batch header; the sniff fails and the segment
    // goes up as-is
    let meta = segment_meta(5);
    manager
        .copy_log_segment(&meta, &segment_data(&b"short"[..]))
        .await
        .unwrap();
    let fetched = manager
        .fetch_log_segment(&meta, 0)
        .await
        .unwrap()
        .read_to_end()
        .await
        .unwrap();
    assert_eq!(fetched, &b"short"[..]);
}

#[tokio::test]
async fn missing_transaction_index_returns_none() {
    let manager =
        TieredStorageManager::new(base_config(), Arc::new(InMemory::new())).unwrap();
    let meta = segment_meta(20);
    manager
        .copy_log_segment(&meta, &segment_data(TWENTY_BYTES))
        .await
        .unwrap();

    // never uploaded: segments without aborted transactions have no
    // transaction index, and that is not an error
    assert!(manager
        .fetch_index(&meta, IndexType::Transaction)
        .await
        .unwrap()
        .is_none());

    // every other index is present
    assert_eq!(
        manager
            .fetch_index(&meta, IndexType::Offset)
            .await
            .unwrap()
            .unwrap(),
        "offset-index"
    );

    // a missing non-transaction index is an error, not a None
    let unknown = segment_meta(20);
    assert!(matches!(
        manager.fetch_index(&unknown, IndexType::Offset).await,
        Err(Error::BackendPermanent(_))
    ));
    assert!(manager
        .fetch_index(&unknown, IndexType::Transaction)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn present_transaction_index_round_trips() {
    let manager =
        TieredStorageManager::new(base_config(), Arc::new(InMemory::new())).unwrap();
    let meta = segment_meta(20);
    let mut data = segment_data(TWENTY_BYTES);
    data.transaction_index = Some(Bytes::from_static(b"txn-index"));
    manager.copy_log_segment(&meta, &data).await.unwrap();

    assert_eq!(
        manager
            .fetch_index(&meta, IndexType::Transaction)
            .await
            .unwrap()
            .unwrap(),
        "txn-index"
    );
}

#[tokio::test]
async fn delete_removes_every_object() {
    let store = Arc::new(InMemory::new());
    let manager = TieredStorageManager::new(base_config(), store.clone()).unwrap();
    let meta = segment_meta(20);
    manager
        .copy_log_segment(&meta, &segment_data(TWENTY_BYTES))
        .await
        .unwrap();

    let listed: Vec<ObjectMeta> = store.list(None).try_collect().await.unwrap();
    assert_eq!(listed.len(), 6); // log + 4 indexes + manifest

    manager.delete_log_segment_data(&meta).await.unwrap();
    let listed: Vec<ObjectMeta> = store.list(None).try_collect().await.unwrap();
    assert!(listed.is_empty());

    // deleting again is a no-op, not an error
    manager.delete_log_segment_data(&meta).await.unwrap();
}

#[tokio::test]
async fn manifest_records_index_sizes() {
    let store = Arc::new(InMemory::new());
    let manager = TieredStorageManager::new(base_config(), store.clone()).unwrap();
    let meta = segment_meta(20);
    manager
        .copy_log_segment(&meta, &segment_data(TWENTY_BYTES))
        .await
        .unwrap();

    let manifest_key = format!(
        "tiered/orders-0/{:020}-{}.rsm-manifest",
        meta.base_offset, meta.segment_id
    );
    let body = store
        .get(&Path::from(manifest_key.as_str()))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let manifest: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        manifest["segmentIndexes"]["OFFSET"],
        serde_json::json!("offset-index".len())
    );
    assert_eq!(
        manifest["segmentIndexes"]["LEADER_EPOCH"],
        serde_json::json!("leader-epoch".len())
    );
    assert!(manifest["segmentIndexes"].get("TRANSACTION").is_none());
}

#[tokio::test]
async fn close_reports_and_clears() {
    let dir = tempfile::tempdir().unwrap();
    let config = TieredStorageConfig {
        chunk_cache: ChunkCacheConfig {
            size: -1,
            retention_ms: -1,
            path: Some(dir.path().join("chunk-cache")),
        },
        ..base_config()
    };
    let manager = TieredStorageManager::new(config, Arc::new(InMemory::new())).unwrap();
    let meta = segment_meta(20);
    manager
        .copy_log_segment(&meta, &segment_data(TWENTY_BYTES))
        .await
        .unwrap();
    manager
        .fetch_log_segment(&meta, 0)
        .await
        .unwrap()
        .read_to_end()
        .await
        .unwrap();

    let stats = manager.chunk_cache_stats();
    assert_eq!(stats.load_successes, 2);

    manager.close().await;
    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("chunk-cache"))
        .unwrap()
        .collect();
    assert!(leftovers.is_empty());
}
