// ==========================================
// 合规记录导入 - 领域类型定义
// ==========================================
// 职责: 记录类别 / 引用类别 / 重复处理模式 / 行结果动作
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 记录类别 (Record Kind)
// ==========================================
// 培训记录: 主体 = 员工；技术期限: 主体 = 设备
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordKind {
    Training,          // 员工培训
    TechnicalDeadline, // 设备技术期限
}

impl RecordKind {
    /// 数据库存储值
    pub fn as_db_str(&self) -> &'static str {
        match self {
            RecordKind::Training => "TRAINING",
            RecordKind::TechnicalDeadline => "TECHNICAL_DEADLINE",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "TRAINING" | "TRAININGS" | "培训" => Ok(RecordKind::Training),
            "TECHNICAL_DEADLINE" | "DEADLINE" | "DEADLINES" | "技术期限" => {
                Ok(RecordKind::TechnicalDeadline)
            }
            other => Err(format!("未知的记录类别: {}", other)),
        }
    }
}

// ==========================================
// 引用类别 (Reference Kind)
// ==========================================
// 自然键 → 内部 ID 的三类引用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceKind {
    Subject,    // 员工号 / 设备编码
    RecordType, // 培训类型名 / 期限类型名
    Facility,   // 场所代码
}

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 3] = [
        ReferenceKind::Subject,
        ReferenceKind::RecordType,
        ReferenceKind::Facility,
    ];

    /// 自然键标准化（查询与缓存统一使用）
    ///
    /// - Subject: TRIM
    /// - RecordType: TRIM + LOWER（类型名大小写不敏感）
    /// - Facility: TRIM + UPPER
    pub fn normalize(&self, key: &str) -> String {
        let trimmed = key.trim();
        match self {
            ReferenceKind::Subject => trimmed.to_string(),
            ReferenceKind::RecordType => trimmed.to_lowercase(),
            ReferenceKind::Facility => trimmed.to_uppercase(),
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::Subject => write!(f, "SUBJECT"),
            ReferenceKind::RecordType => write!(f, "RECORD_TYPE"),
            ReferenceKind::Facility => write!(f, "FACILITY"),
        }
    }
}

// ==========================================
// 重复处理模式 (Duplicate Mode)
// ==========================================
// 整个批次统一，由调用方指定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DuplicateMode {
    Skip,      // 保留已有记录
    Overwrite, // 覆盖已有记录的可变字段
}

impl fmt::Display for DuplicateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateMode::Skip => write!(f, "SKIP"),
            DuplicateMode::Overwrite => write!(f, "OVERWRITE"),
        }
    }
}

impl FromStr for DuplicateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SKIP" => Ok(DuplicateMode::Skip),
            "OVERWRITE" => Ok(DuplicateMode::Overwrite),
            other => Err(format!("未知的重复处理模式: {}", other)),
        }
    }
}

// ==========================================
// 已归档记录冲突策略
// ==========================================
// 仅在 OVERWRITE 模式下生效；SKIP 模式始终忽略已归档记录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArchivedCollisionPolicy {
    #[default]
    LeaveArchived, // 已归档记录不可见，新插入一条
    Revive,        // 覆盖并恢复已归档记录
}

impl FromStr for ArchivedCollisionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_matches('"').to_uppercase().as_str() {
            "LEAVE_ARCHIVED" => Ok(ArchivedCollisionPolicy::LeaveArchived),
            "REVIVE" => Ok(ArchivedCollisionPolicy::Revive),
            other => Err(format!("未知的归档冲突策略: {}", other)),
        }
    }
}

// ==========================================
// 行结果动作 (Import Action)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportAction {
    Inserted,
    Updated,
    SkippedDuplicate,
    Failed,
}

impl fmt::Display for ImportAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportAction::Inserted => write!(f, "inserted"),
            ImportAction::Updated => write!(f, "updated"),
            ImportAction::SkippedDuplicate => write!(f, "skipped_duplicate"),
            ImportAction::Failed => write!(f, "failed"),
        }
    }
}

// ==========================================
// 校验级别 (Severity)
// ==========================================
// Warning 不阻断；Error 使该行失败
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}
