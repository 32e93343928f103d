// ==========================================
// 记录仓储 - 用于集成测试
// ==========================================
// 包装真实仓储: 记录引用查询的键，按主体 ID 注入写入失败
// ==========================================

use async_trait::async_trait;
use compliance_import::domain::record::{ExistingRecord, ImportBatchLog, RecordTriple, RecordWrite};
use compliance_import::domain::types::{RecordKind, ReferenceKind};
use compliance_import::repository::{
    RecordImportRepository, RecordImportRepositoryImpl, RepositoryError, RepositoryResult,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub struct RecordingRepo {
    inner: RecordImportRepositoryImpl,
    failing_subjects: HashSet<i64>,
    lookups: Mutex<Vec<(ReferenceKind, Vec<String>)>>,
}

impl RecordingRepo {
    pub fn new(inner: RecordImportRepositoryImpl) -> Self {
        Self {
            inner,
            failing_subjects: HashSet::new(),
            lookups: Mutex::new(Vec::new()),
        }
    }

    /// 对指定主体的写入返回数据库错误
    pub fn failing_writes_for(mut self, subject_id: i64) -> Self {
        self.failing_subjects.insert(subject_id);
        self
    }

    /// 所有引用查询中出现过的键
    pub fn looked_up_keys(&self) -> Vec<String> {
        self.lookups
            .lock()
            .expect("lookups lock poisoned")
            .iter()
            .flat_map(|(_, keys)| keys.iter().cloned())
            .collect()
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookups.lock().expect("lookups lock poisoned").len()
    }

    fn check_write(&self, write: &RecordWrite) -> RepositoryResult<()> {
        if self.failing_subjects.contains(&write.triple.subject_id) {
            return Err(RepositoryError::DatabaseQueryError("disk I/O error".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordImportRepository for RecordingRepo {
    async fn bulk_find_references(
        &self,
        record_kind: RecordKind,
        reference_kind: ReferenceKind,
        keys: Vec<String>,
    ) -> RepositoryResult<HashMap<String, i64>> {
        self.lookups
            .lock()
            .expect("lookups lock poisoned")
            .push((reference_kind, keys.clone()));
        self.inner.bulk_find_references(record_kind, reference_kind, keys).await
    }

    async fn find_by_triple(
        &self,
        record_kind: RecordKind,
        triple: RecordTriple,
    ) -> RepositoryResult<Option<ExistingRecord>> {
        self.inner.find_by_triple(record_kind, triple).await
    }

    async fn insert_record(&self, record: &RecordWrite) -> RepositoryResult<i64> {
        self.check_write(record)?;
        self.inner.insert_record(record).await
    }

    async fn update_record(
        &self,
        record_id: i64,
        record: &RecordWrite,
        unarchive: bool,
    ) -> RepositoryResult<()> {
        self.check_write(record)?;
        self.inner.update_record(record_id, record, unarchive).await
    }

    async fn insert_batch_log(&self, log: &ImportBatchLog) -> RepositoryResult<()> {
        self.inner.insert_batch_log(log).await
    }

    async fn recent_batch_logs(&self, limit: usize) -> RepositoryResult<Vec<ImportBatchLog>> {
        self.inner.recent_batch_logs(limit).await
    }
}
