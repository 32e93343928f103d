// ==========================================
// 合规记录导入 - 核心库
// ==========================================
// 职责: 表格文件（CSV/TSV/工作簿）→ 培训记录 / 设备技术期限
// 技术栈: Rust + SQLite
// 红线: 每个数据行恰好一个结果；单行失败不影响其他行
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 记录类别与导入结果
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 导入管道
pub mod importer;

// 配置层 - 导入参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 导入接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    ArchivedCollisionPolicy, DuplicateMode, ImportAction, RecordKind, ReferenceKind,
};

// 导入结果
pub use domain::{ImportBatchLog, ImportOutcome, ImportReport, RowError, RowErrorKind};

// 导入器
pub use importer::{ImportError, ImportRequest, RecordImporter, RecordImporterImpl, SourceFormat};

// API
pub use api::{ApiError, ImportApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "合规记录导入";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
