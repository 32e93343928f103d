// ==========================================
// 合规记录导入 - 导入 Repository 实现
// ==========================================
// 职责: 实现导入相关数据访问（使用 rusqlite）
// 红线: Repository 不含业务规则，只做查询与单行写入
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::record::{ExistingRecord, ImportBatchLog, RecordTriple, RecordWrite};
use crate::domain::types::{RecordKind, ReferenceKind};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::record_import_repo::RecordImportRepository;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// IN 子句单次最多绑定的参数个数（低于 SQLite 默认上限）
const MAX_IN_PARAMS: usize = 500;

// ==========================================
// RecordImportRepositoryImpl
// ==========================================
pub struct RecordImportRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl RecordImportRepositoryImpl {
    /// 创建新的 Repository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建（与 ConfigManager 共享同一连接）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取 (原始键, id) 全集
    fn query_all<P: rusqlite::Params>(
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> RepositoryResult<Vec<(String, i64)>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 按 IN 列表分块查询 (原始键, id)
    ///
    /// sql_prefix 需以 "... IN (" 结尾，占位符由此处追加
    fn query_keys_chunked(
        conn: &Connection,
        sql_prefix: &str,
        keys: &[String],
    ) -> RepositoryResult<Vec<(String, i64)>> {
        let mut found = Vec::new();
        for chunk in keys.chunks(MAX_IN_PARAMS) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("{}{})", sql_prefix, placeholders);
            let mut stmt = conn.prepare(&sql)?;

            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                found.push(row?);
            }
        }
        Ok(found)
    }
}

/// 库中原始键按引用类别标准化后与待查键比对；同一标准化键保留先出现者
fn normalize_matches(
    kind: ReferenceKind,
    rows: Vec<(String, i64)>,
    wanted: &HashSet<&String>,
) -> HashMap<String, i64> {
    let mut found = HashMap::new();
    for (raw, id) in rows {
        let key = kind.normalize(&raw);
        if wanted.contains(&key) {
            found.entry(key).or_insert(id);
        }
    }
    found
}

#[async_trait]
impl RecordImportRepository for RecordImportRepositoryImpl {
    async fn bulk_find_references(
        &self,
        record_kind: RecordKind,
        reference_kind: ReferenceKind,
        keys: Vec<String>,
    ) -> RepositoryResult<HashMap<String, i64>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.get_conn()?;

        // 标准化统一在 Rust 侧完成（SQLite trim()/upper()/lower() 只处理空格与 ASCII）
        let wanted: HashSet<&String> = keys.iter().collect();
        let rows = match reference_kind {
            ReferenceKind::Subject => {
                let (table, column) = match record_kind {
                    RecordKind::Training => ("employee", "employee_number"),
                    RecordKind::TechnicalDeadline => ("equipment", "inventory_code"),
                };

                // 先按 IN 列表分块精确查询，未命中的键再对全部在用主体做一次标准化比对
                let prefix = format!(
                    "SELECT {col}, id FROM {table} WHERE archived = 0 AND trim({col}) IN (",
                    col = column,
                    table = table
                );
                let mut found =
                    normalize_matches(reference_kind, Self::query_keys_chunked(&conn, &prefix, &keys)?, &wanted);

                if found.len() < wanted.len() {
                    let missing: HashSet<&String> = wanted
                        .iter()
                        .copied()
                        .filter(|k| !found.contains_key(*k))
                        .collect();
                    let sql = format!("SELECT {}, id FROM {} WHERE archived = 0", column, table);
                    let all = Self::query_all(&conn, &sql, [])?;
                    for (key, id) in normalize_matches(reference_kind, all, &missing) {
                        found.entry(key).or_insert(id);
                    }
                }
                found
            }
            ReferenceKind::RecordType => {
                // 类型表规模小，整表读取
                let all = Self::query_all(
                    &conn,
                    "SELECT name, id FROM record_type WHERE record_kind = ?1 AND archived = 0",
                    params![record_kind.as_db_str()],
                )?;
                normalize_matches(reference_kind, all, &wanted)
            }
            ReferenceKind::Facility => {
                let all = Self::query_all(&conn, "SELECT code, id FROM facility", [])?;
                normalize_matches(reference_kind, all, &wanted)
            }
        };

        Ok(rows)
    }

    async fn find_by_triple(
        &self,
        record_kind: RecordKind,
        triple: RecordTriple,
    ) -> RepositoryResult<Option<ExistingRecord>> {
        let conn = self.get_conn()?;

        let existing = conn
            .query_row(
                "SELECT id, archived FROM compliance_record
                 WHERE record_kind = ?1 AND subject_id = ?2 AND type_id = ?3 AND occurrence_date = ?4
                 ORDER BY archived ASC, id DESC
                 LIMIT 1",
                params![
                    record_kind.as_db_str(),
                    triple.subject_id,
                    triple.type_id,
                    triple.occurrence_date
                ],
                |row| {
                    Ok(ExistingRecord {
                        record_id: row.get(0)?,
                        archived: row.get::<_, i64>(1)? != 0,
                    })
                },
            )
            .optional()?;

        Ok(existing)
    }

    async fn insert_record(&self, record: &RecordWrite) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO compliance_record (
                record_kind, subject_id, type_id, occurrence_date, facility_id,
                period_months, reminder_days, status, risk_category, responsible,
                notes, archived, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, ?12, ?12)
            "#,
            params![
                record.record_kind.as_db_str(),
                record.triple.subject_id,
                record.triple.type_id,
                record.triple.occurrence_date,
                record.facility_id,
                record.period_months,
                record.reminder_days,
                record.status,
                record.risk_category,
                record.responsible,
                record.notes,
                now,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    async fn update_record(
        &self,
        record_id: i64,
        record: &RecordWrite,
        unarchive: bool,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let now = Utc::now().to_rfc3339();

        let affected = conn.execute(
            r#"
            UPDATE compliance_record SET
                facility_id = ?1,
                period_months = ?2,
                reminder_days = ?3,
                status = ?4,
                risk_category = ?5,
                responsible = ?6,
                notes = ?7,
                archived = CASE WHEN ?8 THEN 0 ELSE archived END,
                updated_at = ?9
            WHERE id = ?10
            "#,
            params![
                record.facility_id,
                record.period_months,
                record.reminder_days,
                record.status,
                record.risk_category,
                record.responsible,
                record.notes,
                unarchive,
                now,
                record_id,
            ],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "compliance_record".to_string(),
                id: record_id.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_batch_log(&self, log: &ImportBatchLog) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            INSERT INTO import_batch_log (
                batch_id, record_kind, file_name, duplicate_mode, total_rows,
                inserted_rows, updated_rows, skipped_rows, failed_rows, elapsed_ms,
                report_json, config_snapshot, imported_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                log.batch_id,
                log.record_kind.as_db_str(),
                log.file_name,
                log.duplicate_mode.to_string(),
                log.total_rows,
                log.inserted_rows,
                log.updated_rows,
                log.skipped_rows,
                log.failed_rows,
                log.elapsed_ms,
                log.report_json,
                log.config_snapshot,
                log.imported_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn recent_batch_logs(&self, limit: usize) -> RepositoryResult<Vec<ImportBatchLog>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT batch_id, record_kind, file_name, duplicate_mode, total_rows,
                   inserted_rows, updated_rows, skipped_rows, failed_rows, elapsed_ms,
                   report_json, config_snapshot, imported_at
            FROM import_batch_log
            ORDER BY imported_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                [
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, i64>(8)?,
                    row.get::<_, i64>(9)?,
                ],
                row.get::<_, Option<String>>(10)?,
                row.get::<_, Option<String>>(11)?,
                row.get::<_, String>(12)?,
            ))
        })?;

        let mut logs = Vec::new();
        for row in rows {
            let (batch_id, kind, file_name, mode, counts, report_json, config_snapshot, imported_at) =
                row?;
            let field_error = |field: &str, message: String| RepositoryError::FieldValueError {
                field: field.to_string(),
                message,
            };

            logs.push(ImportBatchLog {
                batch_id,
                record_kind: kind.parse().map_err(|e| field_error("record_kind", e))?,
                file_name,
                duplicate_mode: mode.parse().map_err(|e| field_error("duplicate_mode", e))?,
                total_rows: counts[0],
                inserted_rows: counts[1],
                updated_rows: counts[2],
                skipped_rows: counts[3],
                failed_rows: counts[4],
                elapsed_ms: counts[5],
                report_json,
                config_snapshot,
                imported_at: chrono::DateTime::parse_from_rfc3339(&imported_at)
                    .map_err(|e| field_error("imported_at", e.to_string()))?
                    .with_timezone(&Utc),
            });
        }
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::domain::types::DuplicateMode;
    use chrono::NaiveDate;

    fn setup() -> (tempfile::NamedTempFile, RecordImportRepositoryImpl) {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap().to_string();
        let conn = db::open_sqlite_connection(&db_path).unwrap();
        db::init_schema(&conn).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO employee (employee_number, full_name) VALUES ('E001', 'Ann'), ('E002', 'Bo');
            INSERT INTO employee (employee_number, full_name, archived) VALUES ('E999', 'Gone', 1);
            INSERT INTO record_type (record_kind, name) VALUES ('TRAINING', 'Fire Safety');
            INSERT INTO record_type (record_kind, name) VALUES ('TECHNICAL_DEADLINE', 'Fire Safety');
            INSERT INTO facility (code, name) VALUES ('HQ1', 'Head office');
            "#,
        )
        .unwrap();
        let repo = RecordImportRepositoryImpl::from_connection(Arc::new(Mutex::new(conn)));
        (temp_file, repo)
    }

    fn write(subject_id: i64, date: NaiveDate) -> RecordWrite {
        RecordWrite {
            record_kind: RecordKind::Training,
            triple: RecordTriple {
                subject_id,
                type_id: 1,
                occurrence_date: date,
            },
            facility_id: Some(1),
            period_months: Some(12),
            reminder_days: None,
            status: "planned".to_string(),
            risk_category: None,
            responsible: Some("Trainer A".to_string()),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_bulk_find_references_per_kind() {
        let (_tmp, repo) = setup();

        let subjects = repo
            .bulk_find_references(
                RecordKind::Training,
                ReferenceKind::Subject,
                vec!["E001".to_string(), "E999".to_string(), "E404".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects.get("E001"), Some(&1));

        let types = repo
            .bulk_find_references(
                RecordKind::TechnicalDeadline,
                ReferenceKind::RecordType,
                vec!["fire safety".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(types.get("fire safety"), Some(&2));

        let facilities = repo
            .bulk_find_references(RecordKind::Training, ReferenceKind::Facility, vec!["HQ1".to_string()])
            .await
            .unwrap();
        assert_eq!(facilities.get("HQ1"), Some(&1));
    }

    #[tokio::test]
    async fn test_bulk_find_references_normalizes_non_ascii_keys() {
        let (_tmp, repo) = setup();
        {
            let conn = repo.get_conn().unwrap();
            conn.execute_batch(
                "INSERT INTO employee (employee_number, full_name) VALUES ('\tE010\u{a0}', 'Padded');
                 INSERT INTO facility (code, name) VALUES ('werk-süd', 'Süd');",
            )
            .unwrap();
        }

        let subjects = repo
            .bulk_find_references(
                RecordKind::Training,
                ReferenceKind::Subject,
                vec!["E001".to_string(), "E010".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(subjects.get("E001"), Some(&1));
        assert_eq!(subjects.get("E010"), Some(&4));

        let key = ReferenceKind::Facility.normalize(" Werk-Süd ");
        assert_eq!(key, "WERK-SÜD");
        let facilities = repo
            .bulk_find_references(RecordKind::Training, ReferenceKind::Facility, vec![key.clone()])
            .await
            .unwrap();
        assert_eq!(facilities.get(&key), Some(&2));
    }

    #[tokio::test]
    async fn test_bulk_find_references_chunks_large_key_sets() {
        let (_tmp, repo) = setup();
        let mut keys: Vec<String> = (0..1200).map(|i| format!("X{}", i)).collect();
        keys.push("E002".to_string());

        let found = repo
            .bulk_find_references(RecordKind::Training, ReferenceKind::Subject, keys)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found.get("E002"), Some(&2));
    }

    #[tokio::test]
    async fn test_insert_find_update_record() {
        let (_tmp, repo) = setup();
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let record = write(1, date);

        let id = repo.insert_record(&record).await.unwrap();
        let found = repo
            .find_by_triple(RecordKind::Training, record.triple)
            .await
            .unwrap();
        assert_eq!(found, Some(ExistingRecord { record_id: id, archived: false }));

        let err = repo.insert_record(&record).await.unwrap_err();
        assert!(err.is_unique_violation());

        let mut changed = record.clone();
        changed.status = "completed".to_string();
        repo.update_record(id, &changed, false).await.unwrap();

        let missing = repo.update_record(id + 100, &changed, false).await.unwrap_err();
        assert!(matches!(missing, RepositoryError::NotFound { .. }));

        let other_day = RecordTriple {
            occurrence_date: date.succ_opt().unwrap(),
            ..record.triple
        };
        assert!(repo
            .find_by_triple(RecordKind::Training, other_day)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_find_by_triple_prefers_active_record() {
        let (_tmp, repo) = setup();
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let record = write(2, date);

        let archived_id = repo.insert_record(&record).await.unwrap();
        {
            let conn = repo.get_conn().unwrap();
            conn.execute(
                "UPDATE compliance_record SET archived = 1 WHERE id = ?1",
                [archived_id],
            )
            .unwrap();
        }
        let found = repo
            .find_by_triple(RecordKind::Training, record.triple)
            .await
            .unwrap();
        assert_eq!(found, Some(ExistingRecord { record_id: archived_id, archived: true }));

        let active_id = repo.insert_record(&record).await.unwrap();
        let found = repo
            .find_by_triple(RecordKind::Training, record.triple)
            .await
            .unwrap();
        assert_eq!(found, Some(ExistingRecord { record_id: active_id, archived: false }));
    }

    #[tokio::test]
    async fn test_batch_log_round_trip() {
        let (_tmp, repo) = setup();
        let log = ImportBatchLog {
            batch_id: "b-1".to_string(),
            record_kind: RecordKind::TechnicalDeadline,
            file_name: Some("deadlines.xlsx".to_string()),
            duplicate_mode: DuplicateMode::Overwrite,
            total_rows: 3,
            inserted_rows: 1,
            updated_rows: 1,
            skipped_rows: 0,
            failed_rows: 1,
            elapsed_ms: 12,
            report_json: Some("{}".to_string()),
            config_snapshot: None,
            imported_at: Utc::now(),
        };
        repo.insert_batch_log(&log).await.unwrap();

        let logs = repo.recent_batch_logs(10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].batch_id, "b-1");
        assert_eq!(logs[0].record_kind, RecordKind::TechnicalDeadline);
        assert_eq!(logs[0].duplicate_mode, DuplicateMode::Overwrite);
        assert_eq!(logs[0].failed_rows, 1);
    }
}
