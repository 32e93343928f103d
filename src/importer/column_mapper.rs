// ==========================================
// 合规记录导入 - 列映射器 (Column Mapper)
// ==========================================
// 阶段 1: 源表头 → 标准字段，每个文件只计算一次
// 优先级: 显式映射 > 别名精确匹配 > 别名包含匹配（均大小写不敏感）
// 红线: 一个源列最多对应一个标准字段；缺失必填字段整批失败
// ==========================================

use crate::domain::record::RawRow;
use crate::domain::types::RecordKind;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_spec::{field_specs, FieldSpec};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// 单个标准字段的映射结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    pub field: &'static str,
    pub required: bool,
    pub column: Option<String>,
}

// ==========================================
// ColumnMapping - 标准字段 → 源列
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub record_kind: RecordKind,
    bindings: Vec<ColumnBinding>, // 与字段规格表同序
}

impl ColumnMapping {
    pub fn bindings(&self) -> &[ColumnBinding] {
        &self.bindings
    }

    /// 标准字段对应的源列名
    pub fn column_for(&self, field: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|b| b.field == field)
            .and_then(|b| b.column.as_deref())
    }

    /// 按标准字段取原始单元格（未映射或源列缺失时为 None）
    pub fn cell<'a>(&self, row: &'a RawRow, field: &str) -> Option<&'a str> {
        self.column_for(field).and_then(|column| row.get(column))
    }
}

// ==========================================
// ColumnMapper
// ==========================================
pub struct ColumnMapper {
    record_kind: RecordKind,
}

impl ColumnMapper {
    pub fn new(record_kind: RecordKind) -> Self {
        Self { record_kind }
    }

    /// 计算列映射
    ///
    /// # 参数
    /// - headers: 源表头（已去空白，保留大小写）
    /// - overrides: 显式映射（标准字段名 → 源列名）
    ///
    /// # 返回
    /// - Ok(ColumnMapping)
    /// - Err(InvalidOverride): 显式映射指向不存在的字段或列
    /// - Err(MissingRequiredColumns): 列出全部未匹配的必填字段
    pub fn resolve(
        &self,
        headers: &[String],
        overrides: &HashMap<String, String>,
    ) -> ImportResult<ColumnMapping> {
        let specs = field_specs(self.record_kind);
        let mut assigned: HashMap<&'static str, String> = HashMap::new();
        let mut used: HashSet<usize> = HashSet::new();

        // 1. 显式映射
        let mut override_fields: Vec<&String> = overrides.keys().collect();
        override_fields.sort();
        for field_name in override_fields {
            let column = &overrides[field_name];
            let spec = specs
                .iter()
                .find(|s| s.name.eq_ignore_ascii_case(field_name.trim()))
                .ok_or_else(|| ImportError::InvalidOverride {
                    field: field_name.clone(),
                    message: "不是该记录类别的标准字段".to_string(),
                })?;

            let col_idx = headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(column.trim()))
                .ok_or_else(|| ImportError::InvalidOverride {
                    field: field_name.clone(),
                    message: format!("源文件中不存在列 '{}'", column),
                })?;

            if !used.insert(col_idx) {
                return Err(ImportError::InvalidOverride {
                    field: field_name.clone(),
                    message: format!("列 '{}' 已被其他字段使用", headers[col_idx]),
                });
            }
            assigned.insert(spec.name, headers[col_idx].clone());
        }

        // 2. 别名精确匹配
        for spec in specs {
            if assigned.contains_key(spec.name) {
                continue;
            }
            if let Some(col_idx) = find_column(headers, &used, spec, |h, alias| h == alias) {
                used.insert(col_idx);
                assigned.insert(spec.name, headers[col_idx].clone());
            }
        }

        // 3. 别名包含匹配
        for spec in specs {
            if assigned.contains_key(spec.name) {
                continue;
            }
            if let Some(col_idx) = find_column(headers, &used, spec, |h, alias| h.contains(alias)) {
                used.insert(col_idx);
                assigned.insert(spec.name, headers[col_idx].clone());
            }
        }

        let bindings: Vec<ColumnBinding> = specs
            .iter()
            .map(|spec| ColumnBinding {
                field: spec.name,
                required: spec.required,
                column: assigned.remove(spec.name),
            })
            .collect();

        let missing: Vec<String> = bindings
            .iter()
            .filter(|b| b.required && b.column.is_none())
            .map(|b| b.field.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ImportError::MissingRequiredColumns { missing });
        }

        for binding in &bindings {
            debug!(field = binding.field, column = ?binding.column, "列映射");
        }

        Ok(ColumnMapping {
            record_kind: self.record_kind,
            bindings,
        })
    }
}

/// 按别名顺序查找第一个未被占用的匹配列
fn find_column(
    headers: &[String],
    used: &HashSet<usize>,
    spec: &FieldSpec,
    matches: impl Fn(&str, &str) -> bool,
) -> Option<usize> {
    let lowered: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();
    spec.aliases.iter().find_map(|alias| {
        let alias = alias.to_lowercase();
        lowered
            .iter()
            .enumerate()
            .find(|(idx, header)| !used.contains(idx) && matches(header, &alias))
            .map(|(idx, _)| idx)
    })
}
