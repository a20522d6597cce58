use sea_query::{Expr, PostgresQueryBuilder, Query};

use crate::schema::UserSettings;

/// SELECT segment_minutes FROM user_settings WHERE owner_id = ?
pub fn select_segment_minutes(owner_id: i64) -> String {
    Query::select()
        .column(UserSettings::SegmentMinutes)
        .from(UserSettings::Table)
        .and_where(Expr::col(UserSettings::OwnerId).eq(owner_id))
        .to_string(PostgresQueryBuilder)
}
