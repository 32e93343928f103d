// ==========================================
// 合规记录导入 - 引用解析器 (Reference Resolver)
// ==========================================
// 阶段 3: 自然键（员工号 / 类型名 / 场所代码）→ 内部 ID
// 策略: 每个引用类别恰好一次批量查询，三个类别并发发出
// 红线: 缓存仅属于本次导入；查询失败不得静默丢行
// ==========================================

use crate::domain::record::{
    MappedRow, RecordTriple, RecordWrite, ResolvedReference, RowError, RowErrorKind,
    ValidationError,
};
use crate::domain::types::{RecordKind, ReferenceKind};
use crate::importer::field_spec::{self, fields};
use crate::repository::RecordImportRepository;
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

// ==========================================
// ReferenceCache - 本次导入的引用缓存
// ==========================================
#[derive(Debug, Default)]
pub struct ReferenceCache {
    resolved: HashMap<(ReferenceKind, String), ResolvedReference>,
    lookup_failures: HashMap<ReferenceKind, String>, // 批量查询失败的类别 → 错误信息
}

impl ReferenceCache {
    /// 按原始自然键查询（内部做标准化）
    pub fn get(&self, kind: ReferenceKind, raw_key: &str) -> Option<&ResolvedReference> {
        self.resolved.get(&(kind, kind.normalize(raw_key)))
    }

    pub fn lookup_failure(&self, kind: ReferenceKind) -> Option<&str> {
        self.lookup_failures.get(&kind).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

// ==========================================
// ReferenceResolver
// ==========================================
pub struct ReferenceResolver<'a, R: ?Sized> {
    repo: &'a R,
    record_kind: RecordKind,
}

impl<'a, R> ReferenceResolver<'a, R>
where
    R: RecordImportRepository + ?Sized,
{
    pub fn new(repo: &'a R, record_kind: RecordKind) -> Self {
        Self { repo, record_kind }
    }

    /// 收集去重后的标准化自然键并批量查询
    ///
    /// # 参数
    /// - rows: 通过校验的行（未通过校验的行不参与查询）
    ///
    /// # 返回
    /// - ReferenceCache: 命中的引用 + 查询失败的类别
    pub async fn build_cache(&self, rows: &[MappedRow]) -> ReferenceCache {
        let mut keys_by_kind: Vec<(ReferenceKind, Vec<String>)> = Vec::new();
        for kind in ReferenceKind::ALL {
            let Some(field) = field_spec::reference_field(self.record_kind, kind) else {
                continue;
            };
            let keys: BTreeSet<String> = rows
                .iter()
                .filter_map(|row| row.text(field))
                .map(|raw| kind.normalize(raw))
                .filter(|key| !key.is_empty())
                .collect();
            if !keys.is_empty() {
                keys_by_kind.push((kind, keys.into_iter().collect()));
            }
        }

        let lookups = keys_by_kind.iter().map(|(kind, keys)| {
            self.repo
                .bulk_find_references(self.record_kind, *kind, keys.clone())
        });
        let results = join_all(lookups).await;

        let mut cache = ReferenceCache::default();
        for ((kind, keys), result) in keys_by_kind.into_iter().zip(results) {
            match result {
                Ok(found) => {
                    debug!(reference_kind = %kind, requested = keys.len(), found = found.len(), "引用批量查询完成");
                    for (natural_key, internal_id) in found {
                        cache.resolved.insert(
                            (kind, natural_key.clone()),
                            ResolvedReference {
                                natural_key,
                                reference_kind: kind,
                                internal_id,
                            },
                        );
                    }
                }
                Err(e) => {
                    warn!(reference_kind = %kind, error = %e, "引用批量查询失败");
                    cache.lookup_failures.insert(kind, e.to_string());
                }
            }
        }

        info!(resolved = cache.len(), failed_kinds = cache.lookup_failures.len(), "引用解析完成");
        cache
    }

    /// 将一行的自然键替换为内部 ID，生成待写入内容
    ///
    /// # 返回
    /// - Ok(RecordWrite): 全部引用命中
    /// - Err(RowError): 任一引用未命中或所属类别查询失败（列出全部问题）
    pub fn resolve_row(&self, cache: &ReferenceCache, row: &MappedRow) -> Result<RecordWrite, RowError> {
        let mut issues = Vec::new();
        let mut ids: HashMap<ReferenceKind, i64> = HashMap::new();

        for kind in ReferenceKind::ALL {
            let Some(field) = field_spec::reference_field(self.record_kind, kind) else {
                continue;
            };
            let Some(raw_key) = row.text(field) else {
                continue; // 可选引用缺省
            };

            if let Some(message) = cache.lookup_failure(kind) {
                issues.push(ValidationError::error(
                    row.row_index,
                    field,
                    format!("引用查询失败: {}", message),
                ));
            } else if let Some(resolved) = cache.get(kind, raw_key) {
                ids.insert(kind, resolved.internal_id);
            } else {
                issues.push(ValidationError::error(
                    row.row_index,
                    field,
                    format!("未找到 '{}'", raw_key.trim()),
                ));
            }
        }

        if !issues.is_empty() {
            return Err(RowError::from_issues(RowErrorKind::Reference, issues));
        }

        let date_field = field_spec::occurrence_date_field(self.record_kind);
        let (Some(&subject_id), Some(&type_id), Some(occurrence_date)) = (
            ids.get(&ReferenceKind::Subject),
            ids.get(&ReferenceKind::RecordType),
            row.date(date_field),
        ) else {
            // 必填字段已由行校验保证；到达此处说明上游不一致
            return Err(RowError::from_issues(
                RowErrorKind::Reference,
                vec![ValidationError::error(row.row_index, date_field, "唯一性三元组不完整")],
            ));
        };

        Ok(build_write(
            self.record_kind,
            row,
            RecordTriple {
                subject_id,
                type_id,
                occurrence_date,
            },
            ids.get(&ReferenceKind::Facility).copied(),
        ))
    }
}

/// MappedRow + 已解析 ID → RecordWrite
fn build_write(
    record_kind: RecordKind,
    row: &MappedRow,
    triple: RecordTriple,
    facility_id: Option<i64>,
) -> RecordWrite {
    let owned = |field: &str| row.text(field).map(str::to_string);
    let (reminder_days, risk_category, responsible) = match record_kind {
        RecordKind::Training => (None, None, owned(fields::TRAINER)),
        RecordKind::TechnicalDeadline => (
            row.integer(fields::REMINDER_DAYS),
            row.enum_code(fields::RISK_CATEGORY).map(str::to_string),
            None,
        ),
    };

    RecordWrite {
        record_kind,
        triple,
        facility_id,
        period_months: row.integer(field_spec::period_field(record_kind)),
        reminder_days,
        status: row.enum_code(fields::STATUS).unwrap_or_default().to_string(),
        risk_category,
        responsible,
        notes: owned(fields::NOTES),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{ExistingRecord, FieldValue, ImportBatchLog};
    use crate::repository::{RepositoryError, RepositoryResult};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    /// 记录每次批量查询的测试仓储
    #[derive(Default)]
    struct LookupRepo {
        calls: Mutex<Vec<(ReferenceKind, Vec<String>)>>,
        fail_kind: Option<ReferenceKind>,
    }

    #[async_trait]
    impl RecordImportRepository for LookupRepo {
        async fn bulk_find_references(
            &self,
            _record_kind: RecordKind,
            reference_kind: ReferenceKind,
            keys: Vec<String>,
        ) -> RepositoryResult<HashMap<String, i64>> {
            self.calls.lock().unwrap().push((reference_kind, keys.clone()));
            if self.fail_kind == Some(reference_kind) {
                return Err(RepositoryError::DatabaseQueryError("connection reset".to_string()));
            }
            let known: &[(&str, i64)] = match reference_kind {
                ReferenceKind::Subject => &[("E001", 1), ("E002", 2)],
                ReferenceKind::RecordType => &[("fire safety", 10)],
                ReferenceKind::Facility => &[("HQ1", 100)],
            };
            Ok(keys
                .into_iter()
                .filter_map(|k| known.iter().find(|(n, _)| *n == k).map(|(_, id)| (k, *id)))
                .collect())
        }

        async fn find_by_triple(&self, _: RecordKind, _: RecordTriple) -> RepositoryResult<Option<ExistingRecord>> {
            Ok(None)
        }

        async fn insert_record(&self, _: &RecordWrite) -> RepositoryResult<i64> {
            Ok(1)
        }

        async fn update_record(&self, _: i64, _: &RecordWrite, _: bool) -> RepositoryResult<()> {
            Ok(())
        }

        async fn insert_batch_log(&self, _: &ImportBatchLog) -> RepositoryResult<()> {
            Ok(())
        }

        async fn recent_batch_logs(&self, _: usize) -> RepositoryResult<Vec<ImportBatchLog>> {
            Ok(Vec::new())
        }
    }

    fn training_row(row_index: usize, employee: &str, training: &str, facility: Option<&str>) -> MappedRow {
        let mut row = MappedRow::new(row_index);
        row.values.insert(fields::EMPLOYEE_NUMBER, FieldValue::Text(employee.to_string()));
        row.values.insert(fields::TRAINING_TYPE, FieldValue::Text(training.to_string()));
        row.values.insert(
            fields::SESSION_DATE,
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()),
        );
        row.values.insert(fields::STATUS, FieldValue::Enum("planned".to_string()));
        if let Some(code) = facility {
            row.values.insert(fields::FACILITY_CODE, FieldValue::Text(code.to_string()));
        }
        row
    }

    #[tokio::test]
    async fn test_one_lookup_per_kind_with_normalized_distinct_keys() {
        let repo = LookupRepo::default();
        let resolver = ReferenceResolver::new(&repo, RecordKind::Training);
        let rows = vec![
            training_row(1, "E001", "Fire Safety", Some("hq1")),
            training_row(2, " E001 ", "FIRE SAFETY", None),
            training_row(3, "E002", "fire safety", Some("HQ1 ")),
        ];

        let cache = resolver.build_cache(&rows).await;

        let calls = repo.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        let subject_keys = &calls.iter().find(|(k, _)| *k == ReferenceKind::Subject).unwrap().1;
        assert_eq!(subject_keys, &vec!["E001".to_string(), "E002".to_string()]);
        let type_keys = &calls.iter().find(|(k, _)| *k == ReferenceKind::RecordType).unwrap().1;
        assert_eq!(type_keys, &vec!["fire safety".to_string()]);
        let facility_keys = &calls.iter().find(|(k, _)| *k == ReferenceKind::Facility).unwrap().1;
        assert_eq!(facility_keys, &vec!["HQ1".to_string()]);

        let write = resolver.resolve_row(&cache, &rows[1]).unwrap();
        assert_eq!(write.triple.subject_id, 1);
        assert_eq!(write.triple.type_id, 10);
        assert_eq!(write.facility_id, None);
        assert_eq!(write.status, "planned");
    }

    #[tokio::test]
    async fn test_unknown_key_fails_row() {
        let repo = LookupRepo::default();
        let resolver = ReferenceResolver::new(&repo, RecordKind::Training);
        let rows = vec![training_row(4, "E404", "Fire Safety", Some("XX9"))];

        let cache = resolver.build_cache(&rows).await;
        let err = resolver.resolve_row(&cache, &rows[0]).unwrap_err();

        assert_eq!(err.kind, RowErrorKind::Reference);
        assert_eq!(err.issues.len(), 2);
        assert!(err.message.contains("E404"));
        assert!(err.message.contains("XX9"));
    }

    #[tokio::test]
    async fn test_failed_lookup_fails_dependent_rows() {
        let repo = LookupRepo {
            fail_kind: Some(ReferenceKind::Facility),
            ..Default::default()
        };
        let resolver = ReferenceResolver::new(&repo, RecordKind::Training);
        let rows = vec![
            training_row(1, "E001", "Fire Safety", Some("HQ1")),
            training_row(2, "E002", "Fire Safety", None),
        ];

        let cache = resolver.build_cache(&rows).await;

        let err = resolver.resolve_row(&cache, &rows[0]).unwrap_err();
        assert!(err.message.contains("connection reset"));
        // 不依赖场所的行不受影响
        assert!(resolver.resolve_row(&cache, &rows[1]).is_ok());
    }

    #[tokio::test]
    async fn test_no_lookup_without_rows() {
        let repo = LookupRepo::default();
        let resolver = ReferenceResolver::new(&repo, RecordKind::TechnicalDeadline);

        let cache = resolver.build_cache(&[]).await;

        assert!(cache.is_empty());
        assert!(repo.calls.lock().unwrap().is_empty());
    }
}
