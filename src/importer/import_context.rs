// ==========================================
// 合规记录导入 - 单次导入上下文
// ==========================================
// 职责: 持有一次导入的全部中间状态（原始行 / 列映射 / 引用缓存 / 写入计划 / 结果）
// 红线: 不跨导入共享；导入结束即丢弃
// ==========================================

use crate::config::{config_keys, ConfigError, ImportConfigReader};
use crate::domain::record::RawRow;
use crate::domain::types::{ArchivedCollisionPolicy, DuplicateMode, RecordKind};
use crate::importer::column_mapper::ColumnMapping;
use crate::importer::duplicate_detector::DuplicatePlan;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::reference_resolver::ReferenceCache;
use crate::importer::report::ReportBuilder;
use std::time::Instant;

// ==========================================
// ImportSettings - 本次导入读取到的配置
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSettings {
    pub commit_window_size: usize,
    pub lookup_window_size: usize,
    pub period_anomaly_months: i64,
    pub archived_policy: ArchivedCollisionPolicy,
}

impl ImportSettings {
    /// 从配置读取器加载（开始导入时读取一次，过程中不再变化）
    pub async fn load<C>(config: &C) -> ImportResult<Self>
    where
        C: ImportConfigReader + ?Sized,
    {
        let read_error = |key: &str, e: ConfigError| {
            ImportError::ConfigReadError {
                key: key.to_string(),
                message: e.to_string(),
            }
        };

        Ok(Self {
            commit_window_size: config
                .get_commit_window_size()
                .await
                .map_err(|e| read_error(config_keys::COMMIT_WINDOW_SIZE, e))?,
            lookup_window_size: config
                .get_lookup_window_size()
                .await
                .map_err(|e| read_error(config_keys::LOOKUP_WINDOW_SIZE, e))?,
            period_anomaly_months: config
                .get_period_anomaly_months()
                .await
                .map_err(|e| read_error(config_keys::PERIOD_ANOMALY_MONTHS, e))?,
            archived_policy: config
                .get_archived_collision_policy()
                .await
                .map_err(|e| read_error(config_keys::ARCHIVED_COLLISION_POLICY, e))?,
        })
    }
}

// ==========================================
// ImportContext
// ==========================================
pub struct ImportContext {
    pub batch_id: String,
    pub record_kind: RecordKind,
    pub duplicate_mode: DuplicateMode,
    pub settings: ImportSettings,
    pub started_at: Instant,

    pub raw_rows: Vec<RawRow>,
    pub mapping: ColumnMapping,
    pub cache: ReferenceCache,
    pub plan: DuplicatePlan,
    pub report: ReportBuilder,
}

impl ImportContext {
    pub fn new(
        batch_id: String,
        duplicate_mode: DuplicateMode,
        settings: ImportSettings,
        started_at: Instant,
        raw_rows: Vec<RawRow>,
        mapping: ColumnMapping,
    ) -> Self {
        let report = ReportBuilder::new(raw_rows.iter().map(|r| r.row_index).collect());
        Self {
            batch_id,
            record_kind: mapping.record_kind,
            duplicate_mode,
            settings,
            started_at,
            raw_rows,
            mapping,
            cache: ReferenceCache::default(),
            plan: DuplicatePlan::default(),
            report,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}
