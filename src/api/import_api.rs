// ==========================================
// 合规记录导入 API
// ==========================================
// 职责: 封装导入入口，供 CLI 及上层调用
// 输出: ImportReport（每行一个结果）
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::db;
use crate::domain::record::{ImportBatchLog, ImportReport};
use crate::domain::types::{DuplicateMode, RecordKind};
use crate::importer::{ImportRequest, RecordImporter, RecordImporterImpl, SourceFormat};
use crate::repository::{RecordImportRepository, RecordImportRepositoryImpl};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

type DefaultImporter = RecordImporterImpl<RecordImportRepositoryImpl, ConfigManager>;

/// 导入API
pub struct ImportApi {
    db_path: String,
}

impl ImportApi {
    /// 创建新的ImportApi实例
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    /// 初始化数据库（建表，幂等）
    pub fn init_database(&self) -> ApiResult<()> {
        let conn = db::open_sqlite_connection(&self.db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
        db::init_schema(&conn).map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    /// 仓储与配置共享同一连接
    fn create_importer(&self) -> ApiResult<DefaultImporter> {
        let conn = db::open_sqlite_connection(&self.db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
        db::init_schema(&conn).map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        let conn = Arc::new(Mutex::new(conn));

        let config = ConfigManager::from_connection(conn.clone())
            .map_err(|e| ApiError::DatabaseConnectionError(format!("创建配置管理器失败: {}", e)))?;
        let repo = RecordImportRepositoryImpl::from_connection(conn);

        Ok(RecordImporterImpl::new(repo, config))
    }

    /// 导入文件（格式由扩展名推断）
    ///
    /// # 参数
    /// - file_path: 文件路径（.csv/.tsv/.txt/.xlsx/.xlsm/.xls/.ods）
    /// - record_kind: 记录类别
    /// - duplicate_mode: 重复处理模式
    /// - overrides: 显式列映射（标准字段名 → 源列名）
    ///
    /// # 返回
    /// - Ok(ImportReport): 导入报告（行级失败包含在报告中）
    /// - Err(ApiError): 文件无法读取、格式错误、列映射错误
    pub async fn import_file(
        &self,
        file_path: &str,
        record_kind: RecordKind,
        duplicate_mode: DuplicateMode,
        overrides: HashMap<String, String>,
    ) -> ApiResult<ImportReport> {
        let format = SourceFormat::from_file_name(file_path)?;
        let bytes = tokio::fs::read(file_path)
            .await
            .map_err(|e| ApiError::InvalidInput(format!("读取文件失败 {}: {}", file_path, e)))?;

        let file_name = Path::new(file_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file_path.to_string());

        let mut request = ImportRequest::new(record_kind, format, bytes, duplicate_mode)
            .with_file_name(file_name);
        request.overrides = overrides;

        self.import(request).await
    }

    /// 导入内存中的文件内容
    pub async fn import(&self, request: ImportRequest) -> ApiResult<ImportReport> {
        let importer = self.create_importer()?;
        let report = importer.import(request).await?;

        info!(
            batch_id = %report.batch_id,
            failed = report.failed,
            "导入API调用完成"
        );
        Ok(report)
    }

    /// 最近的导入批次
    ///
    /// # 参数
    /// - limit: 返回条数（限制在 1-100 之间）
    pub async fn list_recent_imports(&self, limit: usize) -> ApiResult<Vec<ImportBatchLog>> {
        let repo = RecordImportRepositoryImpl::new(&self.db_path)?;
        let logs = repo.recent_batch_logs(limit.clamp(1, 100)).await?;
        Ok(logs)
    }
}
