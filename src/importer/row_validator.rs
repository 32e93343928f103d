// ==========================================
// 合规记录导入 - 行校验器 (Row Validator)
// ==========================================
// 阶段 2: RawRow + ColumnMapping → MappedRow 或字段错误列表
// 规则: 必填非空 / 固定日期格式 / 非负整数 / 枚举闭集
// 红线: 一行的全部字段错误一次收集；Warning 不阻断
// ==========================================

use crate::domain::record::{FieldValue, MappedRow, RawRow, ValidationError};
use crate::domain::types::RecordKind;
use crate::importer::column_mapper::ColumnMapping;
use crate::importer::field_spec::{
    self, fields, field_specs, match_enum, EnumOption, FieldKind,
};
use chrono::{Months, NaiveDate, NaiveDateTime};

/// 可接受的日期格式（按顺序尝试）
pub const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%d/%m/%Y"];
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 默认周期异常阈值（月）
pub const DEFAULT_PERIOD_ANOMALY_MONTHS: i64 = 120;

/// 单行校验结果
#[derive(Debug, Clone, PartialEq)]
pub enum RowValidation {
    Valid {
        row: MappedRow,
        warnings: Vec<ValidationError>,
    },
    Invalid {
        errors: Vec<ValidationError>,
        warnings: Vec<ValidationError>,
    },
}

// ==========================================
// RowValidator
// ==========================================
pub struct RowValidator {
    record_kind: RecordKind,
    period_anomaly_months: i64,
}

impl RowValidator {
    pub fn new(record_kind: RecordKind, period_anomaly_months: i64) -> Self {
        Self {
            record_kind,
            period_anomaly_months,
        }
    }

    /// 校验单行
    ///
    /// # 返回
    /// - Valid: 所有必填字段均有合法值（可附带告警）
    /// - Invalid: 至少一个 Error 级别的字段问题
    pub fn validate(&self, mapping: &ColumnMapping, raw: &RawRow) -> RowValidation {
        let row_index = raw.row_index;
        let mut mapped = MappedRow::new(row_index);
        let mut errors = Vec::new();

        for spec in field_specs(self.record_kind) {
            let value = mapping
                .cell(raw, spec.name)
                .map(str::trim)
                .filter(|v| !v.is_empty());

            let Some(value) = value else {
                if spec.required {
                    errors.push(ValidationError::error(row_index, spec.name, "必填字段为空"));
                } else if let Some(code) = spec.default {
                    mapped.values.insert(spec.name, FieldValue::Enum(code.to_string()));
                }
                continue;
            };

            let typed = match spec.kind {
                FieldKind::Text => Ok(FieldValue::Text(value.to_string())),
                FieldKind::Date => parse_date(value)
                    .map(FieldValue::Date)
                    .ok_or_else(|| format!("日期格式无效: '{}'", value)),
                FieldKind::Integer => parse_non_negative_int(value).map(FieldValue::Integer),
                FieldKind::Enum(options) => match_enum(options, value)
                    .map(|code| FieldValue::Enum(code.to_string()))
                    .ok_or_else(|| {
                        format!("取值 '{}' 不在允许范围内 ({})", value, allowed_codes(options))
                    }),
            };

            match typed {
                Ok(v) => {
                    mapped.values.insert(spec.name, v);
                }
                Err(message) => errors.push(ValidationError::error(row_index, spec.name, message)),
            }
        }

        let warnings = self.collect_warnings(&mapped);

        if errors.is_empty() {
            RowValidation::Valid {
                row: mapped,
                warnings,
            }
        } else {
            RowValidation::Invalid { errors, warnings }
        }
    }

    /// 非阻断告警: 周期异常偏大 / 提醒天数超过周期
    fn collect_warnings(&self, row: &MappedRow) -> Vec<ValidationError> {
        let mut warnings = Vec::new();
        let period_field = field_spec::period_field(self.record_kind);
        let Some(period) = row.integer(period_field) else {
            return warnings;
        };

        if period > self.period_anomaly_months {
            warnings.push(ValidationError::warning(
                row.row_index,
                period_field,
                format!(
                    "周期 {} 个月超过阈值 {}，请确认是否误填为天数",
                    period, self.period_anomaly_months
                ),
            ));
        }

        if let Some(reminder) = row.integer(fields::REMINDER_DAYS) {
            let date = row.date(field_spec::occurrence_date_field(self.record_kind));
            let period_days = period_in_days(date, period);
            if reminder > period_days {
                warnings.push(ValidationError::warning(
                    row.row_index,
                    fields::REMINDER_DAYS,
                    format!("提醒天数 {} 超过周期天数 {}", reminder, period_days),
                ));
            }
        }

        warnings
    }
}

/// 周期（月）折算为天数；以发生日期向前推算，缺日期时按 30 天/月
fn period_in_days(date: Option<NaiveDate>, months: i64) -> i64 {
    let fallback = months.saturating_mul(30);
    let (Some(date), Ok(months)) = (date, u32::try_from(months)) else {
        return fallback;
    };
    date.checked_sub_months(Months::new(months))
        .map(|start| (date - start).num_days())
        .unwrap_or(fallback)
}

/// 解析日期（固定格式集合，时间部分丢弃）
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();

    // YYYYMMDD 紧凑格式
    if value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()) {
        let year = value[0..4].parse().ok()?;
        let month = value[4..6].parse().ok()?;
        let day = value[6..8].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
                .ok()
                .map(|dt| dt.date())
        })
}

/// 解析非负整数（接受表格导出的 "12.0"）
pub fn parse_non_negative_int(value: &str) -> Result<i64, String> {
    let trimmed = value.trim();
    let digits = match trimmed.split_once('.') {
        Some((whole, frac)) if !frac.is_empty() && frac.bytes().all(|b| b == b'0') => whole,
        _ => trimmed,
    };

    match digits.parse::<i64>() {
        Ok(n) if n >= 0 => Ok(n),
        Ok(_) => Err(format!("必须为非负整数: '{}'", value)),
        Err(_) => Err(format!("不是有效的整数: '{}'", value)),
    }
}

fn allowed_codes(options: &[EnumOption]) -> String {
    options
        .iter()
        .map(|o| o.code)
        .collect::<Vec<_>>()
        .join("/")
}
