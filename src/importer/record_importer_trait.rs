// ==========================================
// 合规记录导入 - 导入 Trait
// ==========================================
// 职责: 定义导入入口与格式解析接口（不包含实现）
// 管道: 解析 → 列映射 → 行校验 → 引用解析 → 重复检测 → 写入 → 报告
// ==========================================

use crate::domain::record::{ImportReport, ParsedSheet};
use crate::domain::types::{DuplicateMode, RecordKind};
use crate::importer::error::ImportResult;
use crate::importer::file_parser::SourceFormat;
use async_trait::async_trait;
use std::collections::HashMap;

// ==========================================
// ImportRequest - 单次导入的输入
// ==========================================
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub record_kind: RecordKind,
    pub format: SourceFormat,
    pub bytes: Vec<u8>,
    pub duplicate_mode: DuplicateMode,
    /// 显式列映射: 标准字段名 → 源列名
    pub overrides: HashMap<String, String>,
    /// 源文件名（仅写入批次日志）
    pub file_name: Option<String>,
}

impl ImportRequest {
    pub fn new(
        record_kind: RecordKind,
        format: SourceFormat,
        bytes: Vec<u8>,
        duplicate_mode: DuplicateMode,
    ) -> Self {
        Self {
            record_kind,
            format,
            bytes,
            duplicate_mode,
            overrides: HashMap::new(),
            file_name: None,
        }
    }

    pub fn with_override(mut self, field: &str, column: &str) -> Self {
        self.overrides.insert(field.to_string(), column.to_string());
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

// ==========================================
// RecordImporter Trait
// ==========================================
// 用途: 合规记录导入主接口
// 实现者: RecordImporterImpl
#[async_trait]
pub trait RecordImporter: Send + Sync {
    /// 执行一次导入
    ///
    /// # 参数
    /// - request: 文件字节 + 格式 + 记录类别 + 重复处理模式 + 显式列映射
    ///
    /// # 返回
    /// - Ok(ImportReport): 每个数据行恰好一个结果（行级失败不影响其他行）
    /// - Err(FormatError / MappingError): 整批中止，不产生任何行结果
    async fn import(&self, request: ImportRequest) -> ImportResult<ImportReport>;
}

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 文件解析接口（阶段 0）
// 实现者: CsvParser, ExcelParser
pub trait FileParser: Send + Sync {
    /// 解析字节流为表头 + 原始行
    ///
    /// # 返回
    /// - Ok(ParsedSheet): 表头与按文件顺序排列的非空数据行
    /// - Err: 空文件 / 表头重复 / 编码错误等格式错误（无部分输出）
    fn parse_sheet(&self, bytes: &[u8]) -> ImportResult<ParsedSheet>;
}
