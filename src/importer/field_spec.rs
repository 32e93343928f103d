// ==========================================
// 合规记录导入 - 标准字段规格表
// ==========================================
// 职责: 每个记录类别的标准字段（名称 / 必填 / 类型 / 表头别名 / 引用类别）
// 说明: 列映射与行校验共用同一份规格，模板生成亦可由此投影
// ==========================================

use crate::domain::types::{RecordKind, ReferenceKind};

/// 标准字段名常量
pub mod fields {
    pub const EMPLOYEE_NUMBER: &str = "employee_number";
    pub const TRAINING_TYPE: &str = "training_type";
    pub const SESSION_DATE: &str = "session_date";
    pub const VALIDITY_MONTHS: &str = "validity_months";
    pub const TRAINER: &str = "trainer";

    pub const EQUIPMENT_CODE: &str = "equipment_code";
    pub const DEADLINE_TYPE: &str = "deadline_type";
    pub const DUE_DATE: &str = "due_date";
    pub const PERIOD_MONTHS: &str = "period_months";
    pub const REMINDER_DAYS: &str = "reminder_days";
    pub const RISK_CATEGORY: &str = "risk_category";

    pub const FACILITY_CODE: &str = "facility_code";
    pub const STATUS: &str = "status";
    pub const NOTES: &str = "notes";
}

/// 枚举选项: 标准码 + 可接受的写法（大小写不敏感）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumOption {
    pub code: &'static str,
    pub labels: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Date,
    Integer,
    Enum(&'static [EnumOption]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub required: bool,
    pub kind: FieldKind,
    pub aliases: &'static [&'static str],
    pub reference: Option<ReferenceKind>,
    pub default: Option<&'static str>, // 可选枚举字段缺省时的标准码
}

impl FieldSpec {
    const fn new(name: &'static str, required: bool, kind: FieldKind, aliases: &'static [&'static str]) -> Self {
        Self {
            name,
            required,
            kind,
            aliases,
            reference: None,
            default: None,
        }
    }

    const fn referencing(mut self, kind: ReferenceKind) -> Self {
        self.reference = Some(kind);
        self
    }

    const fn defaulting_to(mut self, code: &'static str) -> Self {
        self.default = Some(code);
        self
    }
}

// ==========================================
// 枚举取值集合
// ==========================================

pub const TRAINING_STATUS: &[EnumOption] = &[
    EnumOption { code: "planned", labels: &["planned", "scheduled", "计划", "计划中"] },
    EnumOption { code: "completed", labels: &["completed", "done", "passed", "已完成", "完成"] },
    EnumOption { code: "cancelled", labels: &["cancelled", "canceled", "已取消", "取消"] },
];

pub const DEADLINE_STATUS: &[EnumOption] = &[
    EnumOption { code: "open", labels: &["open", "pending", "待处理", "未完成"] },
    EnumOption { code: "done", labels: &["done", "completed", "closed", "已完成", "完成"] },
    EnumOption { code: "overdue", labels: &["overdue", "expired", "已逾期", "逾期"] },
];

pub const RISK_CATEGORY: &[EnumOption] = &[
    EnumOption { code: "low", labels: &["low", "低"] },
    EnumOption { code: "medium", labels: &["medium", "med", "中"] },
    EnumOption { code: "high", labels: &["high", "高"] },
    EnumOption { code: "critical", labels: &["critical", "严重", "极高"] },
];

/// 在闭集中查找标准码
pub fn match_enum(options: &[EnumOption], raw: &str) -> Option<&'static str> {
    let needle = raw.trim().to_lowercase();
    options
        .iter()
        .find(|opt| opt.labels.iter().any(|label| label.to_lowercase() == needle))
        .map(|opt| opt.code)
}

// ==========================================
// 字段规格表
// ==========================================

const TRAINING_FIELDS: &[FieldSpec] = &[
    FieldSpec::new(
        fields::EMPLOYEE_NUMBER,
        true,
        FieldKind::Text,
        &["employee_number", "employee number", "employee no", "employee id", "personnel number", "staff number", "员工编号", "工号"],
    )
    .referencing(ReferenceKind::Subject),
    FieldSpec::new(
        fields::TRAINING_TYPE,
        true,
        FieldKind::Text,
        &["training_type", "training type", "course name", "course", "培训类型", "培训名称", "课程"],
    )
    .referencing(ReferenceKind::RecordType),
    FieldSpec::new(
        fields::SESSION_DATE,
        true,
        FieldKind::Date,
        &["session_date", "session date", "training date", "completed on", "培训日期"],
    ),
    FieldSpec::new(
        fields::VALIDITY_MONTHS,
        false,
        FieldKind::Integer,
        &["validity_months", "validity (months)", "validity", "有效期(月)", "有效期"],
    ),
    FieldSpec::new(
        fields::FACILITY_CODE,
        false,
        FieldKind::Text,
        &["facility_code", "facility code", "facility", "site", "location", "场所代码", "场所"],
    )
    .referencing(ReferenceKind::Facility),
    FieldSpec::new(fields::STATUS, false, FieldKind::Enum(TRAINING_STATUS), &["status", "state", "状态"])
        .defaulting_to("planned"),
    FieldSpec::new(fields::TRAINER, false, FieldKind::Text, &["trainer", "instructor", "培训师", "讲师"]),
    FieldSpec::new(fields::NOTES, false, FieldKind::Text, &["notes", "remarks", "comment", "备注"]),
];

const DEADLINE_FIELDS: &[FieldSpec] = &[
    FieldSpec::new(
        fields::EQUIPMENT_CODE,
        true,
        FieldKind::Text,
        &["equipment_code", "equipment code", "inventory number", "inventory code", "equipment", "asset", "设备编码", "设备编号"],
    )
    .referencing(ReferenceKind::Subject),
    FieldSpec::new(
        fields::DEADLINE_TYPE,
        true,
        FieldKind::Text,
        &["deadline_type", "deadline type", "inspection type", "check type", "期限类型", "检查类型"],
    )
    .referencing(ReferenceKind::RecordType),
    FieldSpec::new(
        fields::DUE_DATE,
        true,
        FieldKind::Date,
        &["due_date", "due date", "deadline date", "deadline", "到期日", "期限日期"],
    ),
    FieldSpec::new(
        fields::PERIOD_MONTHS,
        false,
        FieldKind::Integer,
        &["period_months", "period (months)", "interval", "period", "周期(月)", "周期"],
    ),
    FieldSpec::new(
        fields::REMINDER_DAYS,
        false,
        FieldKind::Integer,
        &["reminder_days", "reminder (days)", "reminder", "notice days", "提醒天数", "提前提醒天数"],
    ),
    FieldSpec::new(
        fields::FACILITY_CODE,
        false,
        FieldKind::Text,
        &["facility_code", "facility code", "facility", "site", "location", "场所代码", "场所"],
    )
    .referencing(ReferenceKind::Facility),
    FieldSpec::new(
        fields::RISK_CATEGORY,
        false,
        FieldKind::Enum(RISK_CATEGORY),
        &["risk_category", "risk category", "risk level", "risk", "风险类别", "风险等级"],
    ),
    FieldSpec::new(fields::STATUS, false, FieldKind::Enum(DEADLINE_STATUS), &["status", "state", "状态"])
        .defaulting_to("open"),
    FieldSpec::new(fields::NOTES, false, FieldKind::Text, &["notes", "remarks", "comment", "备注"]),
];

/// 指定记录类别的字段规格（顺序即映射优先级）
pub fn field_specs(kind: RecordKind) -> &'static [FieldSpec] {
    match kind {
        RecordKind::Training => TRAINING_FIELDS,
        RecordKind::TechnicalDeadline => DEADLINE_FIELDS,
    }
}

pub fn find_spec(kind: RecordKind, name: &str) -> Option<&'static FieldSpec> {
    field_specs(kind).iter().find(|spec| spec.name == name)
}

/// 引用指定类别的字段名
pub fn reference_field(kind: RecordKind, reference: ReferenceKind) -> Option<&'static str> {
    field_specs(kind)
        .iter()
        .find(|spec| spec.reference == Some(reference))
        .map(|spec| spec.name)
}

/// 发生日期字段名（唯一性三元组的日期分量）
pub fn occurrence_date_field(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Training => fields::SESSION_DATE,
        RecordKind::TechnicalDeadline => fields::DUE_DATE,
    }
}

/// 周期字段名（用于周期异常告警）
pub fn period_field(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Training => fields::VALIDITY_MONTHS,
        RecordKind::TechnicalDeadline => fields::PERIOD_MONTHS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_kind_has_required_triple_fields() {
        for kind in [RecordKind::Training, RecordKind::TechnicalDeadline] {
            let subject = reference_field(kind, ReferenceKind::Subject).unwrap();
            let record_type = reference_field(kind, ReferenceKind::RecordType).unwrap();
            let date = occurrence_date_field(kind);
            for name in [subject, record_type, date] {
                let spec = find_spec(kind, name).unwrap();
                assert!(spec.required, "{} 应为必填", name);
            }
        }
    }

    #[test]
    fn test_match_enum_accepts_labels_case_insensitive() {
        assert_eq!(match_enum(TRAINING_STATUS, " Completed "), Some("completed"));
        assert_eq!(match_enum(TRAINING_STATUS, "已完成"), Some("completed"));
        assert_eq!(match_enum(RISK_CATEGORY, "HIGH"), Some("high"));
        assert_eq!(match_enum(RISK_CATEGORY, "extreme"), None);
    }

    #[test]
    fn test_facility_reference_field() {
        assert_eq!(
            reference_field(RecordKind::Training, ReferenceKind::Facility),
            Some(fields::FACILITY_CODE)
        );
    }
}
