use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::config::DatabaseConfig;
use crate::error::SplitError;
use crate::queries::{ddl, recordings, settings};

/// One recording row as read from the metadata store
#[derive(Debug, Clone)]
pub struct RecordingRow {
    pub id: i64,
    pub owner_id: i64,
    pub provenance_id: String,
    pub file_name: String,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub duration_ms: i64,
    pub filesize: i64,
    pub file_md5: String,
    pub storage_type: String,
    pub storage_path: String,
    pub trashed: bool,
    pub name_edited: bool,
}

/// A segment row produced by the split pipeline, not yet persisted
#[derive(Debug, Clone)]
pub struct NewSegment {
    pub owner_id: i64,
    pub provenance_id: String,
    pub file_name: String,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub duration_ms: i64,
    pub filesize: i64,
    pub file_md5: String,
    pub storage_type: String,
    pub storage_path: String,
}

/// Transactional relational store holding recording rows.
///
/// The pipeline only ever inserts new rows and deletes whole prior-segment
/// sets; existing rows are never patched.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Resolve a recording by id, scoped to its owner. Absence and
    /// non-ownership are indistinguishable.
    async fn find_recording(
        &self,
        id: i64,
        owner_id: i64,
    ) -> Result<Option<RecordingRow>, SplitError>;

    /// Rows whose provenance id marks them as split parts of the given
    /// parent, ordered by part number.
    async fn find_split_set(
        &self,
        parent_provenance: &str,
        owner_id: i64,
    ) -> Result<Vec<RecordingRow>, SplitError>;

    /// Per-account segment length preference in minutes, if set
    async fn segment_minutes(&self, owner_id: i64) -> Result<Option<i64>, SplitError>;

    /// Delete `delete_ids` and insert `rows` in one transaction, returning
    /// the generated ids in insertion order. All-or-nothing: on error the
    /// store is left untouched.
    async fn replace_split_set(
        &self,
        delete_ids: &[i64],
        rows: &[NewSegment],
    ) -> Result<Vec<i64>, SplitError>;
}

/// Open a connection pool for the configured PostgreSQL database
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.username)
        .password(&config.password)
        .database(&config.database);

    PgPoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

/// Create tables and indexes if they do not exist yet
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(&ddl::create_recordings_table())
        .execute(pool)
        .await?;
    sqlx::query(&ddl::create_recordings_owner_provenance_index())
        .execute(pool)
        .await?;
    sqlx::query(&ddl::create_user_settings_table())
        .execute(pool)
        .await?;
    Ok(())
}

fn row_to_recording(row: &PgRow) -> RecordingRow {
    RecordingRow {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        provenance_id: row.get("provenance_id"),
        file_name: row.get("file_name"),
        start_time_ms: row.get("start_time_ms"),
        end_time_ms: row.get("end_time_ms"),
        duration_ms: row.get("duration_ms"),
        filesize: row.get("filesize"),
        file_md5: row.get("file_md5"),
        storage_type: row.get("storage_type"),
        storage_path: row.get("storage_path"),
        trashed: row.get("trashed"),
        name_edited: row.get("name_edited"),
    }
}

/// PostgreSQL-backed MetadataStore
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn find_recording(
        &self,
        id: i64,
        owner_id: i64,
    ) -> Result<Option<RecordingRow>, SplitError> {
        let sql = recordings::select_by_id_and_owner(id, owner_id);
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(row_to_recording))
    }

    async fn find_split_set(
        &self,
        parent_provenance: &str,
        owner_id: i64,
    ) -> Result<Vec<RecordingRow>, SplitError> {
        let sql = recordings::select_split_set(parent_provenance, owner_id);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_recording).collect())
    }

    async fn segment_minutes(&self, owner_id: i64) -> Result<Option<i64>, SplitError> {
        let sql = settings::select_segment_minutes(owner_id);
        let minutes: Option<Option<i64>> = sqlx::query_scalar(&sql)
            .fetch_optional(&self.pool)
            .await?;
        Ok(minutes.flatten())
    }

    async fn replace_split_set(
        &self,
        delete_ids: &[i64],
        rows: &[NewSegment],
    ) -> Result<Vec<i64>, SplitError> {
        let created_at_ms = chrono::Utc::now().timestamp_millis();

        let mut tx = self.pool.begin().await?;

        // Scoped transaction: commit only if every statement succeeded
        let result = async {
            if !delete_ids.is_empty() {
                let sql = recordings::delete_by_ids(delete_ids);
                sqlx::query(&sql).execute(&mut *tx).await?;
            }
            let mut ids = Vec::with_capacity(rows.len());
            for row in rows {
                let sql = recordings::insert_segment(row, created_at_ms);
                let id: i64 = sqlx::query_scalar(&sql).fetch_one(&mut *tx).await?;
                ids.push(id);
            }
            Ok::<_, sqlx::Error>(ids)
        }
        .await;

        match result {
            Ok(ids) => {
                tx.commit().await?;
                Ok(ids)
            }
            Err(err) => {
                tx.rollback().await?;
                Err(SplitError::Database(err))
            }
        }
    }
}
