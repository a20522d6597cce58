use sea_query::{ColumnDef, Index, PostgresQueryBuilder, Table};

use crate::schema::{Recordings, UserSettings};

/// CREATE TABLE IF NOT EXISTS recordings (
///     id BIGSERIAL PRIMARY KEY,
///     owner_id BIGINT NOT NULL,
///     provenance_id TEXT NOT NULL UNIQUE,
///     file_name TEXT NOT NULL,
///     start_time_ms BIGINT NOT NULL,
///     end_time_ms BIGINT NOT NULL,
///     duration_ms BIGINT NOT NULL,
///     filesize BIGINT NOT NULL,
///     file_md5 TEXT NOT NULL,
///     storage_type TEXT NOT NULL,
///     storage_path TEXT NOT NULL UNIQUE,
///     trashed BOOLEAN NOT NULL DEFAULT FALSE,
///     name_edited BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at_ms BIGINT NOT NULL
/// )
pub fn create_recordings_table() -> String {
    Table::create()
        .table(Recordings::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(Recordings::Id)
                .big_integer()
                .primary_key()
                .auto_increment(), // Sea Query handles BIGSERIAL for PostgreSQL
        )
        .col(ColumnDef::new(Recordings::OwnerId).big_integer().not_null())
        .col(
            ColumnDef::new(Recordings::ProvenanceId)
                .string()
                .not_null()
                .unique_key(),
        )
        .col(ColumnDef::new(Recordings::FileName).string().not_null())
        .col(
            ColumnDef::new(Recordings::StartTimeMs)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(Recordings::EndTimeMs)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(Recordings::DurationMs)
                .big_integer()
                .not_null(),
        )
        .col(ColumnDef::new(Recordings::Filesize).big_integer().not_null())
        .col(ColumnDef::new(Recordings::FileMd5).string().not_null())
        .col(ColumnDef::new(Recordings::StorageType).string().not_null())
        .col(
            ColumnDef::new(Recordings::StoragePath)
                .string()
                .not_null()
                .unique_key(),
        )
        .col(
            ColumnDef::new(Recordings::Trashed)
                .boolean()
                .not_null()
                .default(false),
        )
        .col(
            ColumnDef::new(Recordings::NameEdited)
                .boolean()
                .not_null()
                .default(false),
        )
        .col(
            ColumnDef::new(Recordings::CreatedAtMs)
                .big_integer()
                .not_null(),
        )
        .to_string(PostgresQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_recordings_owner_provenance
/// ON recordings(owner_id, provenance_id)
///
/// Serves the split-set prefix lookup.
pub fn create_recordings_owner_provenance_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_recordings_owner_provenance")
        .table(Recordings::Table)
        .col(Recordings::OwnerId)
        .col(Recordings::ProvenanceId)
        .to_string(PostgresQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS user_settings (
///     owner_id BIGINT PRIMARY KEY,
///     segment_minutes BIGINT
/// )
pub fn create_user_settings_table() -> String {
    Table::create()
        .table(UserSettings::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(UserSettings::OwnerId)
                .big_integer()
                .primary_key(),
        )
        .col(ColumnDef::new(UserSettings::SegmentMinutes).big_integer())
        .to_string(PostgresQueryBuilder)
}
