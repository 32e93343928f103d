// ==========================================
// 合规记录导入 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 范围: 致命错误（整批中止）；行级错误见 domain::record::RowError
// ==========================================

use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件格式错误（致命）=====
    #[error("文件为空: {0}")]
    EmptyFile(String),

    #[error("文件格式不支持: {0}（仅支持 .csv/.tsv/.txt/.xlsx/.xlsm/.xls/.ods）")]
    UnsupportedFormat(String),

    #[error("文件编码错误: 内容不是有效的 UTF-8（位置 {position}）")]
    InvalidEncoding { position: usize },

    #[error("表头重复: {0}")]
    DuplicateHeader(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    // ===== 列映射错误（致命）=====
    #[error("缺少必填字段对应的列: {}", .missing.join(", "))]
    MissingRequiredColumns { missing: Vec<String> },

    #[error("显式列映射无效 (字段 {field}): {message}")]
    InvalidOverride { field: String, message: String },

    // ===== 仓储 / 配置 =====
    #[error("数据库操作失败: {0}")]
    Repository(String),

    #[error("配置读取失败 (key: {key}): {message}")]
    ConfigReadError { key: String, message: String },

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 是否为文件格式类错误（FormatError）
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            ImportError::EmptyFile(_)
                | ImportError::UnsupportedFormat(_)
                | ImportError::InvalidEncoding { .. }
                | ImportError::DuplicateHeader(_)
                | ImportError::CsvParseError(_)
                | ImportError::ExcelParseError(_)
        )
    }

    /// 是否为列映射类错误（MappingError）
    pub fn is_mapping_error(&self) -> bool {
        matches!(
            self,
            ImportError::MissingRequiredColumns { .. } | ImportError::InvalidOverride { .. }
        )
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

// 实现 From<RepositoryError>
impl From<crate::repository::error::RepositoryError> for ImportError {
    fn from(err: crate::repository::error::RepositoryError) -> Self {
        ImportError::Repository(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
