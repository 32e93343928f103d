// ==========================================
// 重复处理模式集成测试
// ==========================================
// 测试目标: SKIP / OVERWRITE 模式下的重复导入、批内重复、已归档记录冲突
// ==========================================


use compliance_import::config::config_keys;
use compliance_import::domain::record::CollisionSource;
use compliance_import::domain::types::{DuplicateMode, ImportAction, RecordKind};
use compliance_import::importer::RecordImporter;
use compliance_import::logging;
use test_helpers::{
    archive_record, count_active_records, create_test_db, create_test_importer, csv_request,
    record_archived, record_column, set_config,
};

fn notes_csv(rows: &[(&str, &str, &str, &str)]) -> String {
    let mut content = String::from("Employee Number,Training Type,Session Date,Notes\n");
    for (employee, course, date, notes) in rows {
        content.push_str(&format!("{},{},{},{}\n", employee, course, date, notes));
    }
    content
}

#[tokio::test]
async fn test_reimport_in_skip_mode_changes_nothing() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    let content = notes_csv(&[
        ("E001", "Fire Safety", "2024-03-01", "first"),
        ("E002", "First Aid", "2024-03-05", "first"),
    ]);
    let first = importer
        .import(csv_request(RecordKind::Training, DuplicateMode::Skip, &content))
        .await
        .expect("first import");
    assert_eq!(first.inserted, 2);

    let changed = notes_csv(&[
        ("E001", "Fire Safety", "2024-03-01", "second"),
        ("E002", "First Aid", "2024-03-05", "second"),
    ]);
    let second = importer
        .import(csv_request(RecordKind::Training, DuplicateMode::Skip, &changed))
        .await
        .expect("second import");

    assert_eq!(second.skipped_duplicates, 2);
    assert_eq!(second.inserted, 0);
    for (before, after) in first.outcomes.iter().zip(&second.outcomes) {
        let record_id = before.record_id.expect("record id");
        assert_eq!(after.collision, Some(CollisionSource::Existing { record_id }));
        assert_eq!(record_column(&db_path, record_id, "notes").as_deref(), Some("first"));
    }
    assert_eq!(count_active_records(&db_path, RecordKind::Training), 2);
}

#[tokio::test]
async fn test_reimport_in_overwrite_mode_updates_in_place() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    let content = notes_csv(&[
        ("E001", "Fire Safety", "2024-03-01", "first"),
        ("E002", "First Aid", "2024-03-05", "first"),
    ]);
    let first = importer
        .import(csv_request(RecordKind::Training, DuplicateMode::Skip, &content))
        .await
        .expect("first import");

    let changed = notes_csv(&[
        ("E001", "Fire Safety", "2024-03-01", "second"),
        ("E002", "First Aid", "2024-03-05", "second"),
    ]);
    let second = importer
        .import(csv_request(RecordKind::Training, DuplicateMode::Overwrite, &changed))
        .await
        .expect("second import");

    assert_eq!(second.updated, 2);
    assert_eq!(second.inserted, 0);
    for (before, after) in first.outcomes.iter().zip(&second.outcomes) {
        assert_eq!(after.action, ImportAction::Updated);
        assert_eq!(after.record_id, before.record_id);
        let record_id = after.record_id.expect("record id");
        assert_eq!(record_column(&db_path, record_id, "notes").as_deref(), Some("second"));
    }
    assert_eq!(count_active_records(&db_path, RecordKind::Training), 2);
}

#[tokio::test]
async fn test_overwrite_within_one_file_last_row_wins() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    let content = notes_csv(&[
        ("E001", "Fire Safety", "2024-03-01", "a"),
        ("E003", "First Aid", "2024-03-01", "other"),
        ("E001", "Fire Safety", "2024-03-01", "b"),
    ]);
    let report = importer
        .import(csv_request(RecordKind::Training, DuplicateMode::Overwrite, &content))
        .await
        .expect("import should succeed");

    assert_eq!(report.inserted, 2);
    assert_eq!(report.updated, 1);

    let first = report.outcome(1).expect("row 1");
    let last = report.outcome(3).expect("row 3");
    assert_eq!(last.action, ImportAction::Updated);
    assert_eq!(last.collision, Some(CollisionSource::InBatch { first_row: 1 }));
    assert_eq!(last.record_id, first.record_id);

    let record_id = last.record_id.expect("record id");
    assert_eq!(record_column(&db_path, record_id, "notes").as_deref(), Some("b"));
    assert_eq!(count_active_records(&db_path, RecordKind::Training), 2);
}

#[tokio::test]
async fn test_archived_collision_left_archived_by_default() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    let content = notes_csv(&[("E001", "Fire Safety", "2024-03-01", "old")]);
    let first = importer
        .import(csv_request(RecordKind::Training, DuplicateMode::Skip, &content))
        .await
        .expect("first import");
    let archived_id = first.outcomes[0].record_id.expect("record id");
    archive_record(&db_path, archived_id);

    let changed = notes_csv(&[("E001", "Fire Safety", "2024-03-01", "new")]);
    let report = importer
        .import(csv_request(RecordKind::Training, DuplicateMode::Overwrite, &changed))
        .await
        .expect("import should succeed");

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.action, ImportAction::Inserted);
    assert_ne!(outcome.record_id, Some(archived_id));
    assert!(record_archived(&db_path, archived_id));
    assert_eq!(record_column(&db_path, archived_id, "notes").as_deref(), Some("old"));
}

#[tokio::test]
async fn test_archived_collision_revived_when_configured() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    set_config(&db_path, config_keys::ARCHIVED_COLLISION_POLICY, "REVIVE");
    let importer = create_test_importer(&db_path);

    let content = notes_csv(&[("E001", "Fire Safety", "2024-03-01", "old")]);
    let first = importer
        .import(csv_request(RecordKind::Training, DuplicateMode::Skip, &content))
        .await
        .expect("first import");
    let archived_id = first.outcomes[0].record_id.expect("record id");
    archive_record(&db_path, archived_id);

    let changed = notes_csv(&[("E001", "Fire Safety", "2024-03-01", "new")]);
    let report = importer
        .import(csv_request(RecordKind::Training, DuplicateMode::Overwrite, &changed))
        .await
        .expect("import should succeed");

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.action, ImportAction::Updated);
    assert_eq!(outcome.record_id, Some(archived_id));
    assert!(!record_archived(&db_path, archived_id));
    assert_eq!(record_column(&db_path, archived_id, "notes").as_deref(), Some("new"));
    assert_eq!(count_active_records(&db_path, RecordKind::Training), 1);
}

#[tokio::test]
async fn test_archived_record_ignored_in_skip_mode_even_when_revive_configured() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    set_config(&db_path, config_keys::ARCHIVED_COLLISION_POLICY, "REVIVE");
    let importer = create_test_importer(&db_path);

    let content = notes_csv(&[("E001", "Fire Safety", "2024-03-01", "old")]);
    let first = importer
        .import(csv_request(RecordKind::Training, DuplicateMode::Skip, &content))
        .await
        .expect("first import");
    let archived_id = first.outcomes[0].record_id.expect("record id");
    archive_record(&db_path, archived_id);

    let report = importer
        .import(csv_request(RecordKind::Training, DuplicateMode::Skip, &content))
        .await
        .expect("import should succeed");

    assert_eq!(report.outcomes[0].action, ImportAction::Inserted);
    assert!(record_archived(&db_path, archived_id));
}
