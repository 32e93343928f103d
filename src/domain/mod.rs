// ==========================================
// 合规记录导入 - 领域模型层
// ==========================================
// 职责: 定义记录类别、管道中间形状、行结果与导入报告
// 红线: 不含数据访问逻辑
// ==========================================

pub mod record;
pub mod types;

// 重导出核心类型
pub use record::{
    CollisionSource, ExistingRecord, FieldValue, ImportBatchLog, ImportOutcome, ImportReport,
    MappedRow, ParsedSheet, RawRow, RecordTriple, RecordWrite, ResolvedReference, RowError,
    RowErrorKind, ValidationError,
};
pub use types::{
    ArchivedCollisionPolicy, DuplicateMode, ImportAction, RecordKind, ReferenceKind, Severity,
};
