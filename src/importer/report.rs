// ==========================================
// 合规记录导入 - 结果汇总 (Result Reporter)
// ==========================================
// 阶段 6: 行结果 → ImportReport
// 红线: 每个数据行恰好一个结果；缺失或重复视为内部错误，不做静默修补
// ==========================================

use crate::domain::record::{ImportOutcome, ImportReport, ValidationError};
use crate::domain::types::{DuplicateMode, ImportAction, RecordKind};
use crate::importer::error::{ImportError, ImportResult};
use std::collections::{BTreeMap, HashMap};

pub struct ReportBuilder {
    expected_rows: Vec<usize>, // 文件顺序
    outcomes: BTreeMap<usize, ImportOutcome>,
    warnings: HashMap<usize, Vec<ValidationError>>,
    duplicates: Vec<usize>,
}

impl ReportBuilder {
    /// # 参数
    /// - expected_rows: 全部原始行号（文件顺序）
    pub fn new(expected_rows: Vec<usize>) -> Self {
        Self {
            expected_rows,
            outcomes: BTreeMap::new(),
            warnings: HashMap::new(),
            duplicates: Vec::new(),
        }
    }

    /// 登记一行的结果
    pub fn record(&mut self, outcome: ImportOutcome) {
        let row = outcome.row_index;
        if self.outcomes.insert(row, outcome).is_some() {
            self.duplicates.push(row);
        }
    }

    pub fn record_all(&mut self, outcomes: impl IntoIterator<Item = ImportOutcome>) {
        for outcome in outcomes {
            self.record(outcome);
        }
    }

    /// 登记非阻断告警（生成报告时附加到对应行）
    pub fn add_warnings(&mut self, row_index: usize, warnings: Vec<ValidationError>) {
        if !warnings.is_empty() {
            self.warnings.entry(row_index).or_default().extend(warnings);
        }
    }

    /// 生成报告
    ///
    /// # 返回
    /// - Err(InternalError): 某行没有结果、出现两次，或出现未知行号
    pub fn build(
        mut self,
        batch_id: String,
        record_kind: RecordKind,
        duplicate_mode: DuplicateMode,
        elapsed_ms: u64,
    ) -> ImportResult<ImportReport> {
        if let Some(row) = self.duplicates.first() {
            return Err(ImportError::InternalError(format!("第 {} 行产生了多个结果", row)));
        }

        let mut outcomes = Vec::with_capacity(self.expected_rows.len());
        for row in &self.expected_rows {
            let outcome = self
                .outcomes
                .remove(row)
                .ok_or_else(|| ImportError::InternalError(format!("第 {} 行没有结果", row)))?;
            let warnings = self.warnings.remove(row).unwrap_or_default();
            outcomes.push(if warnings.is_empty() {
                outcome
            } else {
                outcome.with_warnings(warnings)
            });
        }

        if let Some(row) = self.outcomes.keys().next() {
            return Err(ImportError::InternalError(format!("第 {} 行不属于本文件", row)));
        }

        let count = |action: ImportAction| outcomes.iter().filter(|o| o.action == action).count();
        let inserted = count(ImportAction::Inserted);
        let updated = count(ImportAction::Updated);
        let skipped_duplicates = count(ImportAction::SkippedDuplicate);
        let failed = count(ImportAction::Failed);

        Ok(ImportReport {
            batch_id,
            record_kind,
            duplicate_mode,
            total_rows: outcomes.len(),
            inserted,
            updated,
            skipped_duplicates,
            failed,
            outcomes,
            elapsed_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{CollisionSource, RowError};

    fn build(builder: ReportBuilder) -> ImportResult<ImportReport> {
        builder.build("b".to_string(), RecordKind::Training, DuplicateMode::Skip, 0)
    }

    #[test]
    fn test_counts_and_file_order() {
        let mut builder = ReportBuilder::new(vec![1, 2, 4, 5]);
        builder.record(ImportOutcome::inserted(5, 11));
        builder.record(ImportOutcome::failed(2, RowError::write("boom")));
        builder.record(ImportOutcome::skipped(4, CollisionSource::InBatch { first_row: 1 }));
        builder.record(ImportOutcome::inserted(1, 10));
        builder.add_warnings(5, vec![ValidationError::warning(5, "validity_months", "too long")]);

        let report = build(builder).unwrap();

        let rows: Vec<usize> = report.outcomes.iter().map(|o| o.row_index).collect();
        assert_eq!(rows, vec![1, 2, 4, 5]);
        assert_eq!(report.total_rows, 4);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped_duplicates, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.outcome(5).unwrap().warnings.len(), 1);
        assert_eq!(report.error_lines(), vec!["row 2: failed - boom".to_string()]);
    }

    #[test]
    fn test_missing_outcome_is_internal_error() {
        let mut builder = ReportBuilder::new(vec![1, 2]);
        builder.record(ImportOutcome::inserted(1, 10));

        let err = build(builder).unwrap_err();
        assert!(matches!(err, ImportError::InternalError(_)));
    }

    #[test]
    fn test_duplicate_outcome_is_internal_error() {
        let mut builder = ReportBuilder::new(vec![1]);
        builder.record(ImportOutcome::inserted(1, 10));
        builder.record(ImportOutcome::failed(1, RowError::write("again")));

        assert!(build(builder).is_err());
    }

    #[test]
    fn test_unknown_row_is_internal_error() {
        let mut builder = ReportBuilder::new(vec![1]);
        builder.record(ImportOutcome::inserted(1, 10));
        builder.record(ImportOutcome::inserted(9, 11));

        assert!(build(builder).is_err());
    }
}
