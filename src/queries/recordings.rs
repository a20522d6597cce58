use sea_query::{Expr, Order, PostgresQueryBuilder, Query};

use crate::db::NewSegment;
use crate::schema::Recordings;

/// Columns fetched whenever a full recording row is needed
fn row_columns() -> [Recordings; 13] {
    [
        Recordings::Id,
        Recordings::OwnerId,
        Recordings::ProvenanceId,
        Recordings::FileName,
        Recordings::StartTimeMs,
        Recordings::EndTimeMs,
        Recordings::DurationMs,
        Recordings::Filesize,
        Recordings::FileMd5,
        Recordings::StorageType,
        Recordings::StoragePath,
        Recordings::Trashed,
        Recordings::NameEdited,
    ]
}

/// SELECT ... FROM recordings WHERE id = ? AND owner_id = ?
///
/// Existence and ownership resolve in one predicate so a caller can never
/// learn that a foreign recording exists.
pub fn select_by_id_and_owner(id: i64, owner_id: i64) -> String {
    Query::select()
        .columns(row_columns())
        .from(Recordings::Table)
        .and_where(Expr::col(Recordings::Id).eq(id))
        .and_where(Expr::col(Recordings::OwnerId).eq(owner_id))
        .to_string(PostgresQueryBuilder)
}

/// SELECT ... FROM recordings
/// WHERE provenance_id LIKE 'split-<parent>-part%' AND owner_id = ?
/// ORDER BY provenance_id
///
/// Part numbers are zero-padded, so provenance order is part order.
pub fn select_split_set(parent_provenance: &str, owner_id: i64) -> String {
    let pattern = format!("split-{}-part%", parent_provenance);
    Query::select()
        .columns(row_columns())
        .from(Recordings::Table)
        .and_where(Expr::col(Recordings::ProvenanceId).like(pattern))
        .and_where(Expr::col(Recordings::OwnerId).eq(owner_id))
        .order_by(Recordings::ProvenanceId, Order::Asc)
        .to_string(PostgresQueryBuilder)
}

/// INSERT INTO recordings (...) VALUES (...) RETURNING id
pub fn insert_segment(segment: &NewSegment, created_at_ms: i64) -> String {
    Query::insert()
        .into_table(Recordings::Table)
        .columns([
            Recordings::OwnerId,
            Recordings::ProvenanceId,
            Recordings::FileName,
            Recordings::StartTimeMs,
            Recordings::EndTimeMs,
            Recordings::DurationMs,
            Recordings::Filesize,
            Recordings::FileMd5,
            Recordings::StorageType,
            Recordings::StoragePath,
            Recordings::Trashed,
            Recordings::NameEdited,
            Recordings::CreatedAtMs,
        ])
        .values_panic([
            segment.owner_id.into(),
            segment.provenance_id.clone().into(),
            segment.file_name.clone().into(),
            segment.start_time_ms.into(),
            segment.end_time_ms.into(),
            segment.duration_ms.into(),
            segment.filesize.into(),
            segment.file_md5.clone().into(),
            segment.storage_type.clone().into(),
            segment.storage_path.clone().into(),
            false.into(),
            false.into(),
            created_at_ms.into(),
        ])
        .returning_col(Recordings::Id)
        .to_string(PostgresQueryBuilder)
}

/// DELETE FROM recordings WHERE id IN (...)
pub fn delete_by_ids(ids: &[i64]) -> String {
    Query::delete()
        .from_table(Recordings::Table)
        .and_where(Expr::col(Recordings::Id).is_in(ids.iter().copied()))
        .to_string(PostgresQueryBuilder)
}
