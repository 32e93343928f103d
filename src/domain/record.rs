// ==========================================
// 合规记录导入 - 行 / 记录 / 报告领域模型
// ==========================================
// 用途: 导入管道各阶段之间传递的数据形状
// 红线: 除 ImportReport / ImportBatchLog 外均为单次导入内的临时对象
// ==========================================

use crate::domain::types::{DuplicateMode, ImportAction, RecordKind, ReferenceKind, Severity};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// RawRow - 原始行
// ==========================================
// row_index: 数据行在文件中的位置（从 1 开始，不含表头）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawRow {
    pub row_index: usize,
    pub cells: Vec<(String, String)>, // (源列名, 原始值)，保持列顺序
}

impl RawRow {
    pub fn new(row_index: usize, cells: Vec<(String, String)>) -> Self {
        Self { row_index, cells }
    }

    /// 按源列名取值（列名精确匹配）
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// 是否所有单元格均为空白
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, value)| value.trim().is_empty())
    }
}

/// 解析后的表: 表头（去空白、保留大小写）+ 数据行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedSheet {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

// ==========================================
// FieldValue - 标准字段的类型化取值
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    Integer(i64),
    Enum(String), // 枚举标准码（小写）
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&str> {
        match self {
            FieldValue::Enum(code) => Some(code),
            _ => None,
        }
    }
}

// ==========================================
// MappedRow - 校验通过的类型化行
// ==========================================
// 下游阶段只消费 MappedRow，不再接触原始单元格文本
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappedRow {
    pub row_index: usize,
    pub values: BTreeMap<&'static str, FieldValue>,
}

impl MappedRow {
    pub fn new(row_index: usize) -> Self {
        Self {
            row_index,
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_text)
    }

    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        self.get(field).and_then(FieldValue::as_date)
    }

    pub fn integer(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(FieldValue::as_integer)
    }

    pub fn enum_code(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_enum)
    }
}

// ==========================================
// ValidationError - 字段级校验结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub row_index: usize,
    pub field: String,
    pub message: String,
    pub severity: Severity,
}

impl ValidationError {
    pub fn error(row_index: usize, field: &str, message: impl Into<String>) -> Self {
        Self {
            row_index,
            field: field.to_string(),
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(row_index: usize, field: &str, message: impl Into<String>) -> Self {
        Self {
            row_index,
            field: field.to_string(),
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

// ==========================================
// ResolvedReference - 已解析的自然键
// ==========================================
// 仅缓存于单次导入，不落库、不跨批次复用
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedReference {
    pub natural_key: String,
    pub reference_kind: ReferenceKind,
    pub internal_id: i64,
}

// ==========================================
// RecordTriple - 唯一性三元组
// ==========================================
// 冲突当且仅当 (主体, 类型, 发生日期) 完全相同
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordTriple {
    pub subject_id: i64,
    pub type_id: i64,
    pub occurrence_date: NaiveDate,
}

/// 库中已存在的冲突记录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingRecord {
    pub record_id: i64,
    pub archived: bool,
}

// ==========================================
// RecordWrite - 待写入的记录内容
// ==========================================
// triple 以外的字段即为 OVERWRITE 模式下的可变字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordWrite {
    pub record_kind: RecordKind,
    pub triple: RecordTriple,
    pub facility_id: Option<i64>,
    pub period_months: Option<i64>,
    pub reminder_days: Option<i64>,
    pub status: String,
    pub risk_category: Option<String>,
    pub responsible: Option<String>,
    pub notes: Option<String>,
}

// ==========================================
// 行结果
// ==========================================

/// 冲突来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CollisionSource {
    InBatch { first_row: usize },  // 同文件内先出现的行
    Existing { record_id: i64 },   // 库中已有记录
    Store,                         // 写入时唯一约束拦截（并发导入）
}

/// 行级错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowErrorKind {
    Validation,
    Reference,
    Write,
}

/// 行级错误（可恢复，不中断其他行）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub kind: RowErrorKind,
    pub message: String,
    pub issues: Vec<ValidationError>, // 字段级明细（写入错误时为空）
}

impl RowError {
    /// 由字段级错误构造，消息为所有字段错误的拼接
    pub fn from_issues(kind: RowErrorKind, issues: Vec<ValidationError>) -> Self {
        let message = issues
            .iter()
            .map(|i| format!("{}: {}", i.field, i.message))
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            kind,
            message,
            issues,
        }
    }

    pub fn write(message: impl Into<String>) -> Self {
        Self {
            kind: RowErrorKind::Write,
            message: message.into(),
            issues: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub row_index: usize,
    pub action: ImportAction,
    pub error: Option<RowError>,
    pub record_id: Option<i64>,
    pub collision: Option<CollisionSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ValidationError>,
}

impl ImportOutcome {
    fn base(row_index: usize, action: ImportAction) -> Self {
        Self {
            row_index,
            action,
            error: None,
            record_id: None,
            collision: None,
            warnings: Vec::new(),
        }
    }

    pub fn inserted(row_index: usize, record_id: i64) -> Self {
        Self {
            record_id: Some(record_id),
            ..Self::base(row_index, ImportAction::Inserted)
        }
    }

    pub fn updated(row_index: usize, record_id: i64, collision: CollisionSource) -> Self {
        Self {
            record_id: Some(record_id),
            collision: Some(collision),
            ..Self::base(row_index, ImportAction::Updated)
        }
    }

    pub fn skipped(row_index: usize, collision: CollisionSource) -> Self {
        let record_id = match collision {
            CollisionSource::Existing { record_id } => Some(record_id),
            _ => None,
        };
        Self {
            record_id,
            collision: Some(collision),
            ..Self::base(row_index, ImportAction::SkippedDuplicate)
        }
    }

    pub fn failed(row_index: usize, error: RowError) -> Self {
        Self {
            error: Some(error),
            ..Self::base(row_index, ImportAction::Failed)
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<ValidationError>) -> Self {
        self.warnings = warnings;
        self
    }

    /// 面向用户的单行描述: "row N: <状态/消息>"
    pub fn display_line(&self) -> String {
        match (&self.action, &self.error, &self.collision) {
            (ImportAction::Failed, Some(err), _) => {
                format!("row {}: failed - {}", self.row_index, err.message)
            }
            (ImportAction::SkippedDuplicate, _, Some(CollisionSource::InBatch { first_row })) => {
                format!(
                    "row {}: skipped_duplicate - 与本文件第 {} 行重复",
                    self.row_index, first_row
                )
            }
            (action, _, _) => format!("row {}: {}", self.row_index, action),
        }
    }
}

// ==========================================
// ImportReport - 导入报告
// ==========================================
// 唯一返回给调用方的产物；outcomes 与原始行一一对应且保持文件顺序
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub batch_id: String,
    pub record_kind: RecordKind,
    pub duplicate_mode: DuplicateMode,
    pub total_rows: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped_duplicates: usize,
    pub failed: usize,
    pub outcomes: Vec<ImportOutcome>,
    pub elapsed_ms: u64,
}

impl ImportReport {
    /// 失败行号列表（便于仅重新上传修正后的行）
    pub fn failed_rows(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .filter(|o| o.action == ImportAction::Failed)
            .map(|o| o.row_index)
            .collect()
    }

    /// 失败行的展示文本
    pub fn error_lines(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.action == ImportAction::Failed)
            .map(ImportOutcome::display_line)
            .collect()
    }

    pub fn outcome(&self, row_index: usize) -> Option<&ImportOutcome> {
        self.outcomes.iter().find(|o| o.row_index == row_index)
    }
}

// ==========================================
// ImportBatchLog - 导入批次日志
// ==========================================
// 对齐: import_batch_log 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatchLog {
    pub batch_id: String,
    pub record_kind: RecordKind,
    pub file_name: Option<String>,
    pub duplicate_mode: DuplicateMode,
    pub total_rows: i64,
    pub inserted_rows: i64,
    pub updated_rows: i64,
    pub skipped_rows: i64,
    pub failed_rows: i64,
    pub elapsed_ms: i64,
    pub report_json: Option<String>,
    pub config_snapshot: Option<String>,
    pub imported_at: DateTime<Utc>,
}
