// ==========================================
// 合规记录导入 - 导入 Repository Trait
// ==========================================
// 职责: 定义导入管道的数据访问接口（不包含业务逻辑）
// 红线: Repository 不含业务规则，只做查询与单行写入
// ==========================================

use crate::domain::record::{ExistingRecord, ImportBatchLog, RecordTriple, RecordWrite};
use crate::domain::types::{RecordKind, ReferenceKind};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use std::collections::HashMap;

// ==========================================
// RecordImportRepository Trait
// ==========================================
// 用途: 引用解析 / 重复检测 / 逐行写入 / 批次日志
// 实现者: RecordImportRepositoryImpl（使用 rusqlite）
#[async_trait]
pub trait RecordImportRepository: Send + Sync {
    // ===== 引用解析 =====

    /// 按自然键批量查询内部 ID（一次调用覆盖该类别的全部键）
    ///
    /// # 参数
    /// - record_kind: 记录类别（决定主体表与类型范围）
    /// - reference_kind: 引用类别
    /// - keys: 已标准化的自然键（去重）
    ///
    /// # 返回
    /// - Ok(HashMap<标准化键, 内部 ID>): 未命中的键不出现在结果中
    async fn bulk_find_references(
        &self,
        record_kind: RecordKind,
        reference_kind: ReferenceKind,
        keys: Vec<String>,
    ) -> RepositoryResult<HashMap<String, i64>>;

    // ===== 重复检测 =====

    /// 查询与三元组冲突的已有记录
    ///
    /// # 返回
    /// - Ok(Some): 优先返回未归档记录；仅存在已归档记录时返回最新的已归档记录
    /// - Ok(None): 无冲突
    async fn find_by_triple(
        &self,
        record_kind: RecordKind,
        triple: RecordTriple,
    ) -> RepositoryResult<Option<ExistingRecord>>;

    // ===== 单行写入（各行独立，无跨行事务）=====

    /// 插入新记录
    ///
    /// # 返回
    /// - Ok(i64): 新记录 ID
    /// - Err(UniqueConstraintViolation): 三元组已被占用（并发导入）
    async fn insert_record(&self, record: &RecordWrite) -> RepositoryResult<i64>;

    /// 覆盖已有记录的可变字段
    ///
    /// # 参数
    /// - record_id: 目标记录 ID
    /// - unarchive: 是否同时恢复已归档记录
    async fn update_record(
        &self,
        record_id: i64,
        record: &RecordWrite,
        unarchive: bool,
    ) -> RepositoryResult<()>;

    // ===== 批次日志 =====

    /// 写入导入批次日志
    async fn insert_batch_log(&self, log: &ImportBatchLog) -> RepositoryResult<()>;

    /// 查询最近的导入批次（按导入时间倒序）
    async fn recent_batch_logs(&self, limit: usize) -> RepositoryResult<Vec<ImportBatchLog>>;
}
