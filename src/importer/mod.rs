// ==========================================
// 合规记录导入 - 导入层
// ==========================================
// 职责: 表格文件 → 合规记录（培训 / 技术期限）
// 支持: CSV/TSV, Excel/ODS 工作簿
// 管道: 解析 → 列映射 → 行校验 → 引用解析 → 重复检测 → 写入 → 报告
// ==========================================

// 模块声明
pub mod batch_committer;
pub mod column_mapper;
pub mod duplicate_detector;
pub mod error;
pub mod field_spec;
pub mod file_parser;
pub mod import_context;
pub mod record_importer_impl;
pub mod record_importer_trait;
pub mod reference_resolver;
pub mod report;
pub mod row_validator;

// 重导出核心类型
pub use batch_committer::BatchCommitter;
pub use column_mapper::{ColumnMapper, ColumnMapping};
pub use duplicate_detector::{DuplicateDetector, DuplicatePlan, PlannedAction};
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, ExcelParser, SourceFormat};
pub use import_context::{ImportContext, ImportSettings};
pub use record_importer_impl::RecordImporterImpl;
pub use reference_resolver::{ReferenceCache, ReferenceResolver};
pub use report::ReportBuilder;
pub use row_validator::{RowValidation, RowValidator};

// 重导出 Trait 接口
pub use record_importer_trait::{FileParser, ImportRequest, RecordImporter};
