use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use syncserver_storage::{
    AppMetaData, Database, StagedUpload, StorageError, StorageResult, UploadState,
};
use syncserver_types::{DeviceId, FileGroupId, FileId, SharingGroupId, UserId};

fn now() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

fn staged(g: SharingGroupId, file_id: FileId, device_id: DeviceId, version: i64) -> StagedUpload {
    StagedUpload {
        file_id,
        device_id,
        sharing_group_id: g,
        user_id: UserId(1),
        owning_user_id: UserId(1),
        file_version: version,
        mime_type: Some("text/plain".into()),
        checksum: Some("abc".into()),
        app_meta_data: None,
        file_size_bytes: Some(3),
        state: UploadState::UploadedFile,
        actual_deletion: false,
        undelete: false,
        file_group_id: None,
        creation_date: now(),
        update_date: now(),
    }
}

fn commit(db: &Database, record: &StagedUpload) -> StorageResult<()> {
    db.transaction(|repos| repos.file_index().apply_upload(record, now()))
}

// ── Staging ──────────────────────────────────────────────────────

#[test]
fn restage_replaces_row_and_keeps_creation_date() {
    let db = Database::open_in_memory().unwrap();
    let g = SharingGroupId::new();
    let (file, device) = (FileId::new(), DeviceId::new());

    let mut record = staged(g, file, device, 0);
    record.state = UploadState::UploadingFile;
    db.transaction(|repos| repos.uploads().stage(&record)).unwrap();

    let mut again = record.clone();
    again.checksum = Some("def".into());
    again.creation_date = now() + chrono::Duration::seconds(10);
    again.update_date = now() + chrono::Duration::seconds(10);
    db.transaction(|repos| repos.uploads().stage(&again)).unwrap();

    let stored = db
        .read(|repos| repos.uploads().get(&file, &device))
        .unwrap()
        .unwrap();
    assert_eq!(stored.checksum.as_deref(), Some("def"));
    assert_eq!(stored.creation_date, now());
}

#[test]
fn rows_without_a_blob_are_not_committable() {
    let db = Database::open_in_memory().unwrap();
    let g = SharingGroupId::new();
    let device = DeviceId::new();
    let mut in_flight = staged(g, FileId::new(), device, 0);
    in_flight.state = UploadState::UploadingFile;
    let landed = staged(g, FileId::new(), device, 0);
    db.transaction(|repos| {
        repos.uploads().stage(&in_flight)?;
        repos.uploads().stage(&landed)
    })
    .unwrap();

    let committable = db
        .read(|repos| repos.uploads().list_for_sharing_group(&g))
        .unwrap();
    assert_eq!(committable.len(), 1);
    assert_eq!(committable[0].file_id, landed.file_id);
}

#[test]
fn another_devices_row_blocks_staging_the_same_file() {
    let db = Database::open_in_memory().unwrap();
    let g = SharingGroupId::new();
    let file = FileId::new();
    let (laptop, phone) = (DeviceId::new(), DeviceId::new());
    db.transaction(|repos| repos.uploads().stage(&staged(g, file, laptop, 0)))
        .unwrap();

    // The laptop may restage its own row.
    db.read(|repos| repos.uploads().ensure_not_staged_elsewhere(&file, &laptop))
        .unwrap();
    let err = db
        .read(|repos| repos.uploads().ensure_not_staged_elsewhere(&file, &phone))
        .unwrap_err();
    assert!(matches!(err, StorageError::StagedByOtherDevice { file_id, .. } if file_id == file));
    assert!(err.is_validation());

    // Other files are unaffected.
    db.read(|repos| {
        repos
            .uploads()
            .ensure_not_staged_elsewhere(&FileId::new(), &phone)
    })
    .unwrap();
}

#[test]
fn pending_rows_are_scoped_to_user_device_and_group() {
    let db = Database::open_in_memory().unwrap();
    let g = SharingGroupId::new();
    let device = DeviceId::new();
    let other_device = DeviceId::new();

    db.transaction(|repos| {
        repos.uploads().stage(&staged(g, FileId::new(), device, 0))?;
        repos.uploads().stage(&staged(g, FileId::new(), device, 0))?;
        repos.uploads().stage(&staged(g, FileId::new(), other_device, 0))?;
        repos
            .uploads()
            .stage(&staged(SharingGroupId::new(), FileId::new(), device, 0))
    })
    .unwrap();

    let mine = db
        .read(|repos| repos.uploads().list_pending(UserId(1), &device, &g))
        .unwrap();
    assert_eq!(mine.len(), 2);

    let whole_group = db
        .read(|repos| repos.uploads().list_for_sharing_group(&g))
        .unwrap();
    assert_eq!(whole_group.len(), 3);
}

#[test]
fn group_rows_come_back_in_application_order() {
    let db = Database::open_in_memory().unwrap();
    let g = SharingGroupId::new();
    let file = FileId::new();

    let mut deletion = staged(g, file, DeviceId::new(), 0);
    deletion.state = UploadState::ToDeleteFromFileIndex;
    let mut meta = staged(g, file, DeviceId::new(), 0);
    meta.state = UploadState::UploadingAppMetaData;
    let upload = staged(g, file, DeviceId::new(), 0);

    db.transaction(|repos| {
        repos.uploads().stage(&deletion)?;
        repos.uploads().stage(&meta)?;
        repos.uploads().stage(&upload)
    })
    .unwrap();

    let states: Vec<UploadState> = db
        .read(|repos| repos.uploads().list_for_sharing_group(&g))
        .unwrap()
        .into_iter()
        .map(|row| row.state)
        .collect();
    assert_eq!(
        states,
        vec![
            UploadState::UploadedFile,
            UploadState::UploadingAppMetaData,
            UploadState::ToDeleteFromFileIndex,
        ]
    );
}

#[test]
fn clear_all_for_group() {
    let db = Database::open_in_memory().unwrap();
    let g = SharingGroupId::new();
    db.transaction(|repos| {
        repos.uploads().stage(&staged(g, FileId::new(), DeviceId::new(), 0))?;
        repos.uploads().stage(&staged(g, FileId::new(), DeviceId::new(), 0))
    })
    .unwrap();

    let cleared = db
        .transaction(|repos| repos.uploads().clear_all_for(&g))
        .unwrap();
    assert_eq!(cleared, 2);
}

#[test]
fn deletion_of_unknown_file_is_rejected() {
    let db = Database::open_in_memory().unwrap();
    let record = staged(SharingGroupId::new(), FileId::new(), DeviceId::new(), 0);
    let err = db
        .transaction(|repos| repos.uploads().stage_deletion(&record))
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

#[test]
fn deletion_with_wrong_version_is_rejected() {
    let db = Database::open_in_memory().unwrap();
    let g = SharingGroupId::new();
    let file = FileId::new();
    commit(&db, &staged(g, file, DeviceId::new(), 0)).unwrap();

    let record = staged(g, file, DeviceId::new(), 3);
    let err = db
        .transaction(|repos| repos.uploads().stage_deletion(&record))
        .unwrap_err();
    assert!(matches!(err, StorageError::WrongFileVersion { expected: 0, actual: 3, .. }));
}

#[test]
fn deletion_is_staged_with_delete_state() {
    let db = Database::open_in_memory().unwrap();
    let g = SharingGroupId::new();
    let (file, device) = (FileId::new(), DeviceId::new());
    commit(&db, &staged(g, file, DeviceId::new(), 0)).unwrap();

    let record = staged(g, file, device, 0);
    db.transaction(|repos| repos.uploads().stage_deletion(&record))
        .unwrap();
    let stored = db
        .read(|repos| repos.uploads().get(&file, &device))
        .unwrap()
        .unwrap();
    assert_eq!(stored.state, UploadState::ToDeleteFromFileIndex);
}

// ── File index versioning ────────────────────────────────────────

#[test]
fn first_commit_creates_version_zero() {
    let db = Database::open_in_memory().unwrap();
    let g = SharingGroupId::new();
    let file = FileId::new();
    let mut record = staged(g, file, DeviceId::new(), 0);
    record.owning_user_id = UserId(7);
    record.user_id = UserId(9);
    commit(&db, &record).unwrap();

    let entry = db.read(|repos| repos.file_index().get(&file)).unwrap().unwrap();
    assert_eq!(entry.file_version, 0);
    assert_eq!(entry.user_id, UserId(7));
    assert_eq!(entry.mime_type, "text/plain");
    assert_eq!(entry.last_uploaded_checksum.as_deref(), Some("abc"));
    assert!(!entry.deleted);
}

#[test]
fn new_file_must_start_at_zero() {
    let db = Database::open_in_memory().unwrap();
    let record = staged(SharingGroupId::new(), FileId::new(), DeviceId::new(), 1);
    let err = commit(&db, &record).unwrap_err();
    assert!(matches!(err, StorageError::WrongFileVersion { expected: 0, actual: 1, .. }));
}

#[test]
fn new_file_needs_mime_type() {
    let db = Database::open_in_memory().unwrap();
    let mut record = staged(SharingGroupId::new(), FileId::new(), DeviceId::new(), 0);
    record.mime_type = None;
    assert!(commit(&db, &record).is_err());
}

#[test]
fn versions_advance_by_one() {
    let db = Database::open_in_memory().unwrap();
    let g = SharingGroupId::new();
    let file = FileId::new();
    commit(&db, &staged(g, file, DeviceId::new(), 0)).unwrap();

    let skip = staged(g, file, DeviceId::new(), 2);
    let err = commit(&db, &skip).unwrap_err();
    assert!(matches!(err, StorageError::WrongFileVersion { expected: 1, actual: 2, .. }));

    let device = DeviceId::new();
    let mut next = staged(g, file, device, 1);
    next.checksum = Some("v1".into());
    commit(&db, &next).unwrap();

    let entry = db.read(|repos| repos.file_index().get(&file)).unwrap().unwrap();
    assert_eq!(entry.file_version, 1);
    assert_eq!(entry.device_id, device);
    assert_eq!(entry.last_uploaded_checksum.as_deref(), Some("v1"));
}

#[test]
fn mime_type_is_fixed_at_version_zero() {
    let db = Database::open_in_memory().unwrap();
    let g = SharingGroupId::new();
    let file = FileId::new();
    commit(&db, &staged(g, file, DeviceId::new(), 0)).unwrap();

    let mut next = staged(g, file, DeviceId::new(), 1);
    next.mime_type = Some("image/png".into());
    let err = commit(&db, &next).unwrap_err();
    assert!(matches!(err, StorageError::MimeTypeMismatch { .. }));

    next.mime_type = None;
    commit(&db, &next).unwrap();
}

#[test]
fn file_group_must_match_stored_value() {
    let db = Database::open_in_memory().unwrap();
    let g = SharingGroupId::new();
    let file = FileId::new();
    let file_group = FileGroupId::new();
    let mut first = staged(g, file, DeviceId::new(), 0);
    first.file_group_id = Some(file_group);
    commit(&db, &first).unwrap();

    let mut wrong = staged(g, file, DeviceId::new(), 1);
    wrong.file_group_id = Some(FileGroupId::new());
    let err = commit(&db, &wrong).unwrap_err();
    assert!(matches!(err, StorageError::FileGroupMismatch(id) if id == file));

    let omitted = staged(g, file, DeviceId::new(), 1);
    commit(&db, &omitted).unwrap();
    let entry = db.read(|repos| repos.file_index().get(&file)).unwrap().unwrap();
    assert_eq!(entry.file_group_id, Some(file_group));
}

#[test]
fn file_in_other_group_is_rejected() {
    let db = Database::open_in_memory().unwrap();
    let file = FileId::new();
    commit(&db, &staged(SharingGroupId::new(), file, DeviceId::new(), 0)).unwrap();

    let other = SharingGroupId::new();
    let err = commit(&db, &staged(other, file, DeviceId::new(), 1)).unwrap_err();
    assert!(matches!(err, StorageError::WrongSharingGroup { .. }));

    let err = db
        .read(|repos| repos.file_index().get_in_group(&file, &other))
        .unwrap_err();
    assert!(err.is_validation());
}

// ── Deletion and undelete ────────────────────────────────────────

#[test]
fn deletion_marks_entry_and_repeats_are_noops() {
    let db = Database::open_in_memory().unwrap();
    let g = SharingGroupId::new();
    let file = FileId::new();
    commit(&db, &staged(g, file, DeviceId::new(), 0)).unwrap();

    let changed = db
        .transaction(|repos| repos.file_index().apply_deletion(&file, 0, now()))
        .unwrap();
    assert!(changed);
    let changed = db
        .transaction(|repos| repos.file_index().apply_deletion(&file, 0, now()))
        .unwrap();
    assert!(!changed);

    let entry = db.read(|repos| repos.file_index().get(&file)).unwrap().unwrap();
    assert!(entry.deleted);
}

#[test]
fn deleted_file_rejects_plain_upload_but_accepts_undelete() {
    let db = Database::open_in_memory().unwrap();
    let g = SharingGroupId::new();
    let file = FileId::new();
    commit(&db, &staged(g, file, DeviceId::new(), 0)).unwrap();
    db.transaction(|repos| repos.file_index().apply_deletion(&file, 0, now()))
        .unwrap();

    let plain = staged(g, file, DeviceId::new(), 1);
    let err = commit(&db, &plain).unwrap_err();
    assert!(matches!(err, StorageError::FileDeleted(_)));

    let mut undelete = plain.clone();
    undelete.undelete = true;
    commit(&db, &undelete).unwrap();
    let entry = db.read(|repos| repos.file_index().get(&file)).unwrap().unwrap();
    assert!(!entry.deleted);
    assert_eq!(entry.file_version, 1);
}

#[test]
fn owner_removal_marks_their_files_deleted() {
    let db = Database::open_in_memory().unwrap();
    let g = SharingGroupId::new();
    let mine = FileId::new();
    let theirs = FileId::new();
    commit(&db, &staged(g, mine, DeviceId::new(), 0)).unwrap();
    let mut other = staged(g, theirs, DeviceId::new(), 0);
    other.owning_user_id = UserId(2);
    commit(&db, &other).unwrap();

    let groups = db
        .transaction(|repos| repos.file_index().mark_deleted_for_owner(UserId(1), now()))
        .unwrap();
    assert_eq!(groups, vec![g]);

    let index = db
        .read(|repos| repos.file_index().list_for_sharing_group(&g))
        .unwrap();
    let deleted: Vec<bool> = [mine, theirs]
        .iter()
        .map(|id| index.iter().find(|e| e.file_id == *id).unwrap().deleted)
        .collect();
    assert_eq!(deleted, vec![true, false]);
}

// ── App metadata ─────────────────────────────────────────────────

#[test]
fn app_meta_data_versions_advance_by_one() {
    let db = Database::open_in_memory().unwrap();
    let g = SharingGroupId::new();
    let file = FileId::new();
    let mut first = staged(g, file, DeviceId::new(), 0);
    first.app_meta_data = Some(AppMetaData {
        version: 0,
        contents: "v0".into(),
    });
    commit(&db, &first).unwrap();

    let err = db
        .transaction(|repos| repos.file_index().apply_app_meta_data(&file, 2, "v2", now()))
        .unwrap_err();
    assert!(matches!(err, StorageError::AppMetaDataVersion { expected: 1, actual: 2, .. }));

    db.transaction(|repos| repos.file_index().apply_app_meta_data(&file, 1, "v1", now()))
        .unwrap();
    let entry = db.read(|repos| repos.file_index().get(&file)).unwrap().unwrap();
    assert_eq!(entry.app_meta_data_version, Some(1));
    assert_eq!(entry.app_meta_data.as_deref(), Some("v1"));
}

#[test]
fn first_app_meta_data_on_existing_file_is_version_zero() {
    let db = Database::open_in_memory().unwrap();
    let g = SharingGroupId::new();
    let file = FileId::new();
    commit(&db, &staged(g, file, DeviceId::new(), 0)).unwrap();

    db.transaction(|repos| repos.file_index().apply_app_meta_data(&file, 0, "first", now()))
        .unwrap();
}

#[test]
fn upload_without_meta_data_keeps_stored_value() {
    let db = Database::open_in_memory().unwrap();
    let g = SharingGroupId::new();
    let file = FileId::new();
    let mut first = staged(g, file, DeviceId::new(), 0);
    first.app_meta_data = Some(AppMetaData {
        version: 0,
        contents: "kept".into(),
    });
    commit(&db, &first).unwrap();
    commit(&db, &staged(g, file, DeviceId::new(), 1)).unwrap();

    let entry = db.read(|repos| repos.file_index().get(&file)).unwrap().unwrap();
    assert_eq!(entry.app_meta_data.as_deref(), Some("kept"));
    assert_eq!(entry.app_meta_data_version, Some(0));
}

#[test]
fn app_meta_data_on_deleted_file_is_rejected() {
    let db = Database::open_in_memory().unwrap();
    let g = SharingGroupId::new();
    let file = FileId::new();
    commit(&db, &staged(g, file, DeviceId::new(), 0)).unwrap();
    db.transaction(|repos| repos.file_index().apply_deletion(&file, 0, now()))
        .unwrap();

    let err = db
        .read(|repos| repos.file_index().validate_app_meta_data(&file, 0))
        .unwrap_err();
    assert!(matches!(err, StorageError::FileDeleted(_)));
}
