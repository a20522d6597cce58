use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};

use crate::container::ContainerFormat;
use crate::db::{MetadataStore, NewSegment, RecordingRow};
use crate::error::SplitError;
use crate::segmenter::Segmenter;
use crate::storage::BlobStore;

/// Minimum allowed segment length; shorter preferences are clamped up
pub const MIN_SEGMENT_SECONDS: i64 = 60;

/// Provenance-id prefix marking locally derived split segments. Deletion
/// eligibility and title-sync eligibility elsewhere test for this prefix,
/// so the exact format and padding width are a durable contract.
pub const SPLIT_PREFIX: &str = "split-";

/// Result of a completed split
#[derive(Debug)]
pub struct SplitOutcome {
    pub segment_count: usize,
    pub recording_ids: Vec<i64>,
}

/// Tunables injected from server configuration
#[derive(Debug, Clone)]
pub struct SplitOptions {
    /// Fallback segment length when the account has no preference
    pub default_segment_minutes: i64,
}

/// Provenance id of segment `part` (1-based) derived from `parent`
pub fn split_provenance_id(parent_provenance: &str, part: usize) -> String {
    format!("{}{}-part{:03}", SPLIT_PREFIX, parent_provenance, part)
}

/// Storage key of segment `part`, derived from the parent's key by inserting
/// a part suffix before the extension
pub fn derive_segment_key(parent_key: &str, part: usize, extension: &str) -> String {
    let stem = match parent_key.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') => stem,
        _ => parent_key,
    };
    format!("{}_part{:03}.{}", stem, part, extension)
}

/// `[start, end)` bounds for each chunk, offset from the parent's timeline.
///
/// Intermediate chunks end a full segment length after they start; the final
/// chunk's end is lifted to the parent's own end so that minor encoder drift
/// cannot truncate the reconstructed timeline below the source's true end.
fn segment_bounds(parent: &RecordingRow, segment_ms: i64, chunk_count: usize) -> Vec<(i64, i64)> {
    let mut bounds = Vec::with_capacity(chunk_count);
    for index in 0..chunk_count {
        let start = parent.start_time_ms + segment_ms * index as i64;
        let mut end = (start + segment_ms).min(parent.end_time_ms);
        if index + 1 == chunk_count {
            end = end.max(parent.end_time_ms);
        }
        bounds.push((start, end));
    }
    bounds
}

/// Controller of the segmentation pipeline.
///
/// Keeps three independently failing resources consistent: a scoped
/// temporary working directory, the blob store, and the metadata store.
/// Metadata consistency is transactional; blob consistency is best-effort
/// with compensation. No interleaving leaves a committed row pointing at a
/// deleted blob; the worst outcome of a crash is orphan blobs.
pub struct SplitOrchestrator {
    store: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    segmenter: Arc<dyn Segmenter>,
    options: SplitOptions,
}

impl SplitOrchestrator {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        segmenter: Arc<dyn Segmenter>,
        options: SplitOptions,
    ) -> Self {
        Self {
            store,
            blobs,
            segmenter,
            options,
        }
    }

    /// Split `recording_id` into contiguous segments of the account's
    /// preferred length. With `force`, an existing segment set is replaced;
    /// without it, existing segments are a conflict.
    pub async fn split(
        &self,
        recording_id: i64,
        requested_by: i64,
        force: bool,
    ) -> Result<SplitOutcome, SplitError> {
        let parent = self
            .store
            .find_recording(recording_id, requested_by)
            .await?
            .ok_or(SplitError::NotFound)?;

        let minutes = self
            .store
            .segment_minutes(requested_by)
            .await?
            .unwrap_or(self.options.default_segment_minutes);
        let segment_seconds = (minutes * 60).max(MIN_SEGMENT_SECONDS);
        let segment_ms = segment_seconds * 1000;

        // The prior-set read and the step of committing its replacement are
        // separate round-trips; two concurrent forced splits of the same
        // recording can interleave between them. The last commit wins and
        // the loser's uploads become orphan blobs.
        let existing = self
            .store
            .find_split_set(&parent.provenance_id, requested_by)
            .await?;
        if !existing.is_empty() && !force {
            return Err(SplitError::Conflict {
                existing: existing.len(),
            });
        }

        // Working area is removed on every exit path below
        let workdir = tempfile::tempdir()?;

        let format = ContainerFormat::from_key(&parent.storage_path);
        let source = self.blobs.download(&parent.storage_path).await?;
        let input_path = workdir.path().join(format!("source.{}", format.extension()));
        tokio::fs::write(&input_path, &source).await?;
        drop(source);

        let out_dir = workdir.path().join("chunks");
        tokio::fs::create_dir(&out_dir).await?;
        let chunks = self
            .segmenter
            .segment(&input_path, &out_dir, segment_seconds as u64, format)
            .await?;

        if chunks.len() < 2 {
            return Err(SplitError::TooShort);
        }
        info!(
            "Recording {}: {} chunks at {}s each",
            recording_id,
            chunks.len(),
            segment_seconds
        );

        // Upload sequentially, in segment order, tracking every key that
        // made it to the store. A failure mid-loop undoes the partial
        // uploads before anything reaches the database.
        let bounds = segment_bounds(&parent, segment_ms, chunks.len());
        let mut uploaded_keys: Vec<String> = Vec::new();
        let mut rows: Vec<NewSegment> = Vec::with_capacity(chunks.len());
        for (index, chunk_path) in chunks.iter().enumerate() {
            match self
                .stage_chunk(&parent, chunk_path, index, bounds[index], format)
                .await
            {
                Ok(row) => {
                    uploaded_keys.push(row.storage_path.clone());
                    rows.push(row);
                }
                Err(err) => {
                    self.delete_keys(&uploaded_keys).await;
                    return Err(err);
                }
            }
        }

        // One transaction swaps the segment set: prior rows out (when
        // forcing), new rows in. A failed transaction leaves no rows, so the
        // freshly uploaded blobs are compensated away too.
        let delete_ids: Vec<i64> = if force {
            existing.iter().map(|row| row.id).collect()
        } else {
            Vec::new()
        };
        let new_ids = match self.store.replace_split_set(&delete_ids, &rows).await {
            Ok(ids) => ids,
            Err(err) => {
                self.delete_keys(&uploaded_keys).await;
                return Err(err);
            }
        };

        // Prior-generation blobs are garbage once the swap is committed.
        // This runs strictly after commit: a crash here leaves orphan
        // blobs, never a row referencing a deleted blob.
        if force && !existing.is_empty() {
            let fresh: HashSet<&str> = uploaded_keys.iter().map(String::as_str).collect();
            for old in &existing {
                if fresh.contains(old.storage_path.as_str()) {
                    continue;
                }
                if let Err(err) = self.blobs.delete(&old.storage_path).await {
                    warn!(
                        "Old segment blob '{}' not deleted: {}",
                        old.storage_path, err
                    );
                }
            }
        }

        info!(
            "Recording {} split into {} segments",
            recording_id,
            new_ids.len()
        );
        Ok(SplitOutcome {
            segment_count: new_ids.len(),
            recording_ids: new_ids,
        })
    }

    /// Read one chunk, hash it, upload it, and build its row
    async fn stage_chunk(
        &self,
        parent: &RecordingRow,
        chunk_path: &Path,
        index: usize,
        (start_time_ms, end_time_ms): (i64, i64),
        format: ContainerFormat,
    ) -> Result<NewSegment, SplitError> {
        let part = index + 1;
        let bytes = tokio::fs::read(chunk_path).await?;
        let file_md5 = format!("{:x}", md5::compute(&bytes));
        let storage_path = derive_segment_key(&parent.storage_path, part, format.extension());
        let file_name = storage_path
            .rsplit('/')
            .next()
            .unwrap_or(&storage_path)
            .to_string();

        self.blobs
            .upload(&storage_path, &bytes, format.content_type())
            .await?;

        Ok(NewSegment {
            owner_id: parent.owner_id,
            provenance_id: split_provenance_id(&parent.provenance_id, part),
            file_name,
            start_time_ms,
            end_time_ms,
            duration_ms: end_time_ms - start_time_ms,
            filesize: bytes.len() as i64,
            file_md5,
            storage_type: self.blobs.storage_type().to_string(),
            storage_path,
        })
    }

    /// Best-effort compensation: remove keys this invocation uploaded.
    /// Failures are logged, never escalated; an orphan blob wastes space
    /// but corrupts nothing.
    async fn delete_keys(&self, keys: &[String]) {
        for key in keys {
            if let Err(err) = self.blobs.delete(key).await {
                warn!("Rollback: uploaded blob '{}' not deleted: {}", key, err);
            }
        }
    }
}
