use sea_query::Iden;

/// Recordings table - one row per stored recording, device-originated or derived
#[derive(Iden)]
pub enum Recordings {
    Table,
    Id,
    OwnerId,
    ProvenanceId,
    FileName,
    StartTimeMs,
    EndTimeMs,
    DurationMs,
    Filesize,
    FileMd5,
    StorageType,
    StoragePath,
    Trashed,
    NameEdited,
    CreatedAtMs,
}

/// User settings table - per-account preferences
#[derive(Iden)]
pub enum UserSettings {
    Table,
    OwnerId,
    SegmentMinutes,
}
