use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::runtime::Runtime;

use recording_splitter::container::ContainerFormat;
use recording_splitter::db::{MetadataStore, NewSegment, RecordingRow};
use recording_splitter::error::SplitError;
use recording_splitter::segmenter::{Segmenter, SegmenterError};
use recording_splitter::split::{SplitOptions, SplitOrchestrator};
use recording_splitter::storage::{BlobStore, StorageError};

// ============================================================================
// Fake collaborators
// ============================================================================

#[derive(Default)]
struct FakeStoreInner {
    rows: Vec<RecordingRow>,
    next_id: i64,
    settings: HashMap<i64, i64>,
    fail_replace: bool,
}

/// In-memory MetadataStore with the same atomicity as the real one:
/// replace_split_set applies everything or nothing.
#[derive(Default)]
struct FakeStore {
    inner: Mutex<FakeStoreInner>,
}

impl FakeStore {
    fn insert_recording(&self, row: RecordingRow) -> i64 {
        let mut inner = self.inner.lock().unwrap();
        let id = if row.id > inner.next_id { row.id } else { inner.next_id + 1 };
        inner.next_id = id;
        let mut row = row;
        row.id = id;
        inner.rows.push(row);
        id
    }

    fn set_segment_minutes(&self, owner_id: i64, minutes: i64) {
        self.inner.lock().unwrap().settings.insert(owner_id, minutes);
    }

    fn fail_next_replace(&self) {
        self.inner.lock().unwrap().fail_replace = true;
    }

    fn all_rows(&self) -> Vec<RecordingRow> {
        self.inner.lock().unwrap().rows.clone()
    }

    fn split_rows(&self, parent_provenance: &str) -> Vec<RecordingRow> {
        let prefix = format!("split-{}-part", parent_provenance);
        let mut rows: Vec<RecordingRow> = self
            .all_rows()
            .into_iter()
            .filter(|row| row.provenance_id.starts_with(&prefix))
            .collect();
        rows.sort_by(|a, b| a.provenance_id.cmp(&b.provenance_id));
        rows
    }
}

#[async_trait]
impl MetadataStore for FakeStore {
    async fn find_recording(
        &self,
        id: i64,
        owner_id: i64,
    ) -> Result<Option<RecordingRow>, SplitError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .rows
            .iter()
            .find(|row| row.id == id && row.owner_id == owner_id)
            .cloned())
    }

    async fn find_split_set(
        &self,
        parent_provenance: &str,
        owner_id: i64,
    ) -> Result<Vec<RecordingRow>, SplitError> {
        let prefix = format!("split-{}-part", parent_provenance);
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<RecordingRow> = inner
            .rows
            .iter()
            .filter(|row| row.owner_id == owner_id && row.provenance_id.starts_with(&prefix))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.provenance_id.cmp(&b.provenance_id));
        Ok(rows)
    }

    async fn segment_minutes(&self, owner_id: i64) -> Result<Option<i64>, SplitError> {
        Ok(self.inner.lock().unwrap().settings.get(&owner_id).copied())
    }

    async fn replace_split_set(
        &self,
        delete_ids: &[i64],
        rows: &[NewSegment],
    ) -> Result<Vec<i64>, SplitError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_replace {
            inner.fail_replace = false;
            return Err(SplitError::Database(sqlx::Error::PoolClosed));
        }

        inner.rows.retain(|row| !delete_ids.contains(&row.id));
        let mut ids = Vec::with_capacity(rows.len());
        for segment in rows {
            inner.next_id += 1;
            let id = inner.next_id;
            inner.rows.push(RecordingRow {
                id,
                owner_id: segment.owner_id,
                provenance_id: segment.provenance_id.clone(),
                file_name: segment.file_name.clone(),
                start_time_ms: segment.start_time_ms,
                end_time_ms: segment.end_time_ms,
                duration_ms: segment.duration_ms,
                filesize: segment.filesize,
                file_md5: segment.file_md5.clone(),
                storage_type: segment.storage_type.clone(),
                storage_path: segment.storage_path.clone(),
                trashed: false,
                name_edited: false,
            });
            ids.push(id);
        }
        Ok(ids)
    }
}

#[derive(Default)]
struct FakeBlobsInner {
    blobs: HashMap<String, Vec<u8>>,
    uploads_done: usize,
    fail_upload_number: Option<usize>,
}

/// In-memory BlobStore; can be told to fail the N-th upload (1-based).
#[derive(Default)]
struct FakeBlobs {
    inner: Mutex<FakeBlobsInner>,
}

impl FakeBlobs {
    fn put(&self, key: &str, bytes: &[u8]) {
        self.inner
            .lock()
            .unwrap()
            .blobs
            .insert(key.to_string(), bytes.to_vec());
    }

    fn fail_upload_number(&self, n: usize) {
        self.inner.lock().unwrap().fail_upload_number = Some(n);
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.lock().unwrap().blobs.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().blobs.get(key).cloned()
    }
}

#[async_trait]
impl BlobStore for FakeBlobs {
    async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.inner
            .lock()
            .unwrap()
            .blobs
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn upload(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.uploads_done += 1;
        if inner.fail_upload_number == Some(inner.uploads_done) {
            return Err(StorageError::Backend("injected upload failure".to_string()));
        }
        inner.blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner
            .lock()
            .unwrap()
            .blobs
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn storage_type(&self) -> &str {
        "local"
    }
}

/// Segmenter fake mimicking ffmpeg's observable behavior: for a source of
/// `duration_ms` it writes ceil(duration / segment) zero-padded chunk files
/// with distinct contents and returns them in order.
struct FakeSegmenter {
    duration_ms: i64,
    last_out_dir: Mutex<Option<PathBuf>>,
}

impl FakeSegmenter {
    fn new(duration_ms: i64) -> Self {
        Self {
            duration_ms,
            last_out_dir: Mutex::new(None),
        }
    }

    fn out_dir(&self) -> Option<PathBuf> {
        self.last_out_dir.lock().unwrap().clone()
    }
}

#[async_trait]
impl Segmenter for FakeSegmenter {
    async fn segment(
        &self,
        _input: &Path,
        out_dir: &Path,
        segment_seconds: u64,
        format: ContainerFormat,
    ) -> Result<Vec<PathBuf>, SegmenterError> {
        *self.last_out_dir.lock().unwrap() = Some(out_dir.to_path_buf());

        let segment_ms = segment_seconds as i64 * 1000;
        let count = (self.duration_ms + segment_ms - 1) / segment_ms;
        let mut paths = Vec::new();
        for index in 0..count {
            let path = out_dir.join(format!("chunk_{:03}.{}", index, format.extension()));
            std::fs::write(&path, format!("chunk-{}-audio-bytes", index))?;
            paths.push(path);
        }
        Ok(paths)
    }
}

/// Segmenter fake that always times out
struct TimedOutSegmenter;

#[async_trait]
impl Segmenter for TimedOutSegmenter {
    async fn segment(
        &self,
        _input: &Path,
        _out_dir: &Path,
        _segment_seconds: u64,
        _format: ContainerFormat,
    ) -> Result<Vec<PathBuf>, SegmenterError> {
        Err(SegmenterError::TimedOut {
            after: std::time::Duration::from_secs(300),
        })
    }
}

// ============================================================================
// Test setup helpers
// ============================================================================

const OWNER: i64 = 7;

fn parent_recording(duration_ms: i64) -> RecordingRow {
    RecordingRow {
        id: 0,
        owner_id: OWNER,
        provenance_id: "DEV123".to_string(),
        file_name: "meeting.mp3".to_string(),
        start_time_ms: 0,
        end_time_ms: duration_ms,
        duration_ms,
        filesize: 4096,
        file_md5: "0123456789abcdef0123456789abcdef".to_string(),
        storage_type: "local".to_string(),
        storage_path: "audio/7/meeting.mp3".to_string(),
        trashed: false,
        name_edited: false,
    }
}

struct Harness {
    store: Arc<FakeStore>,
    blobs: Arc<FakeBlobs>,
    orchestrator: SplitOrchestrator,
}

/// Wire an orchestrator around fakes, with the parent recording's source
/// blob already present in the blob store
fn harness(parent: &RecordingRow, segmenter: Arc<dyn Segmenter>) -> (Harness, i64) {
    let store = Arc::new(FakeStore::default());
    let parent_id = store.insert_recording(parent.clone());

    let blobs = Arc::new(FakeBlobs::default());
    blobs.put(&parent.storage_path, b"source-audio-bytes");

    let orchestrator = SplitOrchestrator::new(
        store.clone(),
        blobs.clone(),
        segmenter,
        SplitOptions {
            default_segment_minutes: 30,
        },
    );

    (
        Harness {
            store,
            blobs,
            orchestrator,
        },
        parent_id,
    )
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_two_hour_recording_splits_into_two_hour_parts() {
    let rt = Runtime::new().unwrap();
    let parent = parent_recording(7_200_000);
    let (h, parent_id) = harness(&parent, Arc::new(FakeSegmenter::new(7_200_000)));
    h.store.set_segment_minutes(OWNER, 60);

    let outcome = rt
        .block_on(h.orchestrator.split(parent_id, OWNER, false))
        .unwrap();
    assert_eq!(outcome.segment_count, 2);
    assert_eq!(outcome.recording_ids.len(), 2);

    let segments = h.store.split_rows("DEV123");
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].provenance_id, "split-DEV123-part001");
    assert_eq!(segments[1].provenance_id, "split-DEV123-part002");
    assert_eq!(segments[0].start_time_ms, 0);
    assert_eq!(segments[0].end_time_ms, 3_600_000);
    assert_eq!(segments[1].start_time_ms, 3_600_000);
    assert_eq!(segments[1].end_time_ms, 7_200_000);
    for segment in &segments {
        assert_eq!(
            segment.end_time_ms - segment.start_time_ms,
            segment.duration_ms
        );
        assert!(!segment.trashed);
        assert!(!segment.name_edited);
    }
}

#[test]
fn test_segment_rows_match_uploaded_blobs() {
    let rt = Runtime::new().unwrap();
    let parent = parent_recording(7_200_000);
    let (h, parent_id) = harness(&parent, Arc::new(FakeSegmenter::new(7_200_000)));
    h.store.set_segment_minutes(OWNER, 60);

    rt.block_on(h.orchestrator.split(parent_id, OWNER, false))
        .unwrap();

    for segment in h.store.split_rows("DEV123") {
        let blob = h
            .blobs
            .get(&segment.storage_path)
            .expect("row references a stored blob");
        assert_eq!(segment.filesize, blob.len() as i64);
        assert_eq!(segment.file_md5, format!("{:x}", md5::compute(&blob)));
        assert_eq!(segment.storage_type, "local");
    }

    // Derived keys keep the parent's stem and container extension
    let keys = h.blobs.keys();
    assert!(keys.contains(&"audio/7/meeting_part001.mp3".to_string()));
    assert!(keys.contains(&"audio/7/meeting_part002.mp3".to_string()));
}

#[test]
fn test_uneven_duration_partitions_with_short_final_segment() {
    let rt = Runtime::new().unwrap();
    // 100 minutes at a 45 minute preference: three segments
    let parent = parent_recording(6_000_000);
    let (h, parent_id) = harness(&parent, Arc::new(FakeSegmenter::new(6_000_000)));
    h.store.set_segment_minutes(OWNER, 45);

    let outcome = rt
        .block_on(h.orchestrator.split(parent_id, OWNER, false))
        .unwrap();
    assert_eq!(outcome.segment_count, 3);

    let segments = h.store.split_rows("DEV123");
    assert_eq!(segments[0].start_time_ms, 0);
    for pair in segments.windows(2) {
        assert_eq!(pair[0].end_time_ms, pair[1].start_time_ms);
    }
    assert_eq!(segments.last().unwrap().end_time_ms, 6_000_000);
}

#[test]
fn test_tiny_preference_clamped_to_sixty_seconds() {
    let rt = Runtime::new().unwrap();
    let parent = parent_recording(150_000);
    let (h, parent_id) = harness(&parent, Arc::new(FakeSegmenter::new(150_000)));
    h.store.set_segment_minutes(OWNER, 0);

    let outcome = rt
        .block_on(h.orchestrator.split(parent_id, OWNER, false))
        .unwrap();
    assert_eq!(outcome.segment_count, 3);

    let segments = h.store.split_rows("DEV123");
    assert_eq!(segments[0].end_time_ms, 60_000);
    assert_eq!(segments[2].start_time_ms, 120_000);
    assert_eq!(segments[2].end_time_ms, 150_000);
}

#[test]
fn test_conflict_without_force_twice_and_rows_unchanged() {
    let rt = Runtime::new().unwrap();
    let parent = parent_recording(7_200_000);
    let (h, parent_id) = harness(&parent, Arc::new(FakeSegmenter::new(7_200_000)));
    h.store.set_segment_minutes(OWNER, 60);

    rt.block_on(h.orchestrator.split(parent_id, OWNER, false))
        .unwrap();
    let rows_after_first = h.store.all_rows().len();
    let blobs_after_first = h.blobs.keys();

    for _ in 0..2 {
        let err = rt
            .block_on(h.orchestrator.split(parent_id, OWNER, false))
            .unwrap_err();
        match err {
            SplitError::Conflict { existing } => assert_eq!(existing, 2),
            other => panic!("expected Conflict, got {:?}", other),
        }
    }

    assert_eq!(h.store.all_rows().len(), rows_after_first);
    assert_eq!(h.blobs.keys(), blobs_after_first);
}

#[test]
fn test_forced_resplit_replaces_set_and_removes_old_blobs() {
    let rt = Runtime::new().unwrap();
    let parent = parent_recording(7_200_000);
    let (h, parent_id) = harness(&parent, Arc::new(FakeSegmenter::new(7_200_000)));

    // First split: 60 minute segments under keys with a .mp3 suffix
    h.store.set_segment_minutes(OWNER, 60);
    rt.block_on(h.orchestrator.split(parent_id, OWNER, false))
        .unwrap();
    let old_segments = h.store.split_rows("DEV123");
    assert_eq!(old_segments.len(), 2);
    let old_ids: Vec<i64> = old_segments.iter().map(|row| row.id).collect();

    // Re-split at 45 minutes; same derived keys get new contents, and the
    // row set must be exactly the new one
    h.store.set_segment_minutes(OWNER, 45);
    let outcome = rt
        .block_on(h.orchestrator.split(parent_id, OWNER, true))
        .unwrap();
    assert_eq!(outcome.segment_count, 3);

    let new_segments = h.store.split_rows("DEV123");
    assert_eq!(new_segments.len(), 3);
    for row in &new_segments {
        assert!(!old_ids.contains(&row.id), "old row survived forced re-split");
    }

    // Every row references a live blob, and no stale part003+ style leftovers
    for row in &new_segments {
        assert!(h.blobs.get(&row.storage_path).is_some());
    }
}

#[test]
fn test_forced_resplit_deletes_orphaned_old_keys() {
    let rt = Runtime::new().unwrap();
    // 3 hours -> three 60min parts, then forced re-split at 120min -> two
    // parts; part003's key must be deleted after commit
    let parent = parent_recording(10_800_000);
    let (h, parent_id) = harness(&parent, Arc::new(FakeSegmenter::new(10_800_000)));

    h.store.set_segment_minutes(OWNER, 60);
    rt.block_on(h.orchestrator.split(parent_id, OWNER, false))
        .unwrap();
    assert!(h.blobs.get("audio/7/meeting_part003.mp3").is_some());

    h.store.set_segment_minutes(OWNER, 120);
    rt.block_on(h.orchestrator.split(parent_id, OWNER, true))
        .unwrap();

    assert_eq!(h.store.split_rows("DEV123").len(), 2);
    assert!(h.blobs.get("audio/7/meeting_part001.mp3").is_some());
    assert!(h.blobs.get("audio/7/meeting_part002.mp3").is_some());
    assert!(
        h.blobs.get("audio/7/meeting_part003.mp3").is_none(),
        "orphaned prior-split blob survived cleanup"
    );
}

#[test]
fn test_upload_failure_rolls_back_partial_uploads() {
    let rt = Runtime::new().unwrap();
    let parent = parent_recording(7_200_000);
    let (h, parent_id) = harness(&parent, Arc::new(FakeSegmenter::new(7_200_000)));
    h.store.set_segment_minutes(OWNER, 60);

    let rows_before = h.store.all_rows().len();
    let blobs_before = h.blobs.keys();

    // First chunk uploads, second fails
    h.blobs.fail_upload_number(2);
    let err = rt
        .block_on(h.orchestrator.split(parent_id, OWNER, false))
        .unwrap_err();
    assert!(matches!(err, SplitError::Storage(_)));

    assert_eq!(h.store.all_rows().len(), rows_before, "no rows may be written");
    assert_eq!(h.blobs.keys(), blobs_before, "partial uploads must be removed");
}

#[test]
fn test_transaction_failure_rolls_back_uploaded_blobs() {
    let rt = Runtime::new().unwrap();
    let parent = parent_recording(7_200_000);
    let (h, parent_id) = harness(&parent, Arc::new(FakeSegmenter::new(7_200_000)));
    h.store.set_segment_minutes(OWNER, 60);

    let blobs_before = h.blobs.keys();
    h.store.fail_next_replace();

    let err = rt
        .block_on(h.orchestrator.split(parent_id, OWNER, false))
        .unwrap_err();
    assert!(matches!(err, SplitError::Database(_)));

    assert_eq!(h.store.split_rows("DEV123").len(), 0);
    assert_eq!(h.blobs.keys(), blobs_before, "all uploads must be compensated");
}

#[test]
fn test_too_short_recording_rejected_without_writes() {
    let rt = Runtime::new().unwrap();
    // 100 seconds at a 60 minute preference: one chunk, not splittable
    let parent = parent_recording(100_000);
    let segmenter = Arc::new(FakeSegmenter::new(100_000));
    let (h, parent_id) = harness(&parent, segmenter.clone());
    h.store.set_segment_minutes(OWNER, 60);

    let rows_before = h.store.all_rows().len();
    let blobs_before = h.blobs.keys();

    let err = rt
        .block_on(h.orchestrator.split(parent_id, OWNER, false))
        .unwrap_err();
    assert!(matches!(err, SplitError::TooShort));

    assert_eq!(h.store.all_rows().len(), rows_before);
    assert_eq!(h.blobs.keys(), blobs_before);

    // The scoped working directory is gone with the failed request
    let out_dir = segmenter.out_dir().expect("segmenter ran");
    assert!(!out_dir.exists(), "temporary working area leaked");
}

#[test]
fn test_not_found_for_foreign_owner() {
    let rt = Runtime::new().unwrap();
    let parent = parent_recording(7_200_000);
    let (h, parent_id) = harness(&parent, Arc::new(FakeSegmenter::new(7_200_000)));

    let err = rt
        .block_on(h.orchestrator.split(parent_id, OWNER + 1, false))
        .unwrap_err();
    assert!(matches!(err, SplitError::NotFound));

    let err = rt
        .block_on(h.orchestrator.split(9999, OWNER, false))
        .unwrap_err();
    assert!(matches!(err, SplitError::NotFound));
}

#[test]
fn test_segmenter_timeout_propagates_without_writes() {
    let rt = Runtime::new().unwrap();
    let parent = parent_recording(7_200_000);
    let (h, parent_id) = harness(&parent, Arc::new(TimedOutSegmenter));
    h.store.set_segment_minutes(OWNER, 60);

    let blobs_before = h.blobs.keys();
    let err = rt
        .block_on(h.orchestrator.split(parent_id, OWNER, false))
        .unwrap_err();
    match err {
        SplitError::Segmenter(SegmenterError::TimedOut { .. }) => {}
        other => panic!("expected TimedOut, got {:?}", other),
    }

    assert_eq!(h.store.split_rows("DEV123").len(), 0);
    assert_eq!(h.blobs.keys(), blobs_before);
}

#[test]
fn test_default_segment_minutes_used_without_preference() {
    let rt = Runtime::new().unwrap();
    // No per-account preference: the 30 minute default applies, so a 1 hour
    // recording yields two parts
    let parent = parent_recording(3_600_000);
    let (h, parent_id) = harness(&parent, Arc::new(FakeSegmenter::new(3_600_000)));

    let outcome = rt
        .block_on(h.orchestrator.split(parent_id, OWNER, false))
        .unwrap();
    assert_eq!(outcome.segment_count, 2);

    let segments = h.store.split_rows("DEV123");
    assert_eq!(segments[0].end_time_ms, 1_800_000);
}
