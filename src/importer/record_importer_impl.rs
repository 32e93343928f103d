// ==========================================
// 合规记录导入 - 导入器实现
// ==========================================
// 职责: 串联各阶段，从字节流到行结果报告
// 流程: 解析 → 列映射 → 行校验 → 引用解析 → 重复检测 → 写入 → 报告 → 批次日志
// 红线: 阶段严格串行；只有引用解析与写入阶段跨行批量
// ==========================================

use crate::config::ImportConfigReader;
use crate::domain::record::{
    ImportBatchLog, ImportOutcome, ImportReport, MappedRow, RowError, RowErrorKind,
};
use crate::importer::batch_committer::BatchCommitter;
use crate::importer::column_mapper::ColumnMapper;
use crate::importer::duplicate_detector::DuplicateDetector;
use crate::importer::error::ImportResult;
use crate::importer::import_context::{ImportContext, ImportSettings};
use crate::importer::record_importer_trait::{ImportRequest, RecordImporter};
use crate::importer::reference_resolver::ReferenceResolver;
use crate::importer::row_validator::{RowValidation, RowValidator};
use crate::repository::RecordImportRepository;
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// RecordImporterImpl - 合规记录导入器实现
// ==========================================
pub struct RecordImporterImpl<R, C>
where
    R: RecordImportRepository,
    C: ImportConfigReader,
{
    // 数据访问层
    repo: R,

    // 配置读取器
    config: C,
}

impl<R, C> RecordImporterImpl<R, C>
where
    R: RecordImportRepository,
    C: ImportConfigReader,
{
    /// 创建新的 RecordImporter 实例
    ///
    /// # 参数
    /// - repo: 导入数据仓储
    /// - config: 配置读取器
    pub fn new(repo: R, config: C) -> Self {
        Self { repo, config }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// 阶段 2: 逐行校验，失败行直接登记结果
    fn validate_rows(ctx: &mut ImportContext) -> Vec<MappedRow> {
        let validator = RowValidator::new(ctx.record_kind, ctx.settings.period_anomaly_months);
        let mut valid = Vec::with_capacity(ctx.raw_rows.len());

        for raw in &ctx.raw_rows {
            match validator.validate(&ctx.mapping, raw) {
                RowValidation::Valid { row, warnings } => {
                    ctx.report.add_warnings(raw.row_index, warnings);
                    valid.push(row);
                }
                RowValidation::Invalid { errors, warnings } => {
                    debug!(row = raw.row_index, errors = errors.len(), "行校验失败");
                    ctx.report.add_warnings(raw.row_index, warnings);
                    ctx.report.record(ImportOutcome::failed(
                        raw.row_index,
                        RowError::from_issues(RowErrorKind::Validation, errors),
                    ));
                }
            }
        }

        valid
    }

    /// 写入批次日志；失败只告警，不影响报告
    async fn write_batch_log(&self, report: &ImportReport, file_name: Option<String>) {
        let report_json = match serde_json::to_string(report) {
            Ok(json) => Some(json),
            Err(e) => {
                warn!(batch_id = %report.batch_id, error = %e, "报告序列化失败");
                None
            }
        };
        let config_snapshot = match self.config.config_snapshot().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(batch_id = %report.batch_id, error = %e, "配置快照获取失败");
                None
            }
        };

        let log = ImportBatchLog {
            batch_id: report.batch_id.clone(),
            record_kind: report.record_kind,
            file_name,
            duplicate_mode: report.duplicate_mode,
            total_rows: report.total_rows as i64,
            inserted_rows: report.inserted as i64,
            updated_rows: report.updated as i64,
            skipped_rows: report.skipped_duplicates as i64,
            failed_rows: report.failed as i64,
            elapsed_ms: report.elapsed_ms as i64,
            report_json,
            config_snapshot,
            imported_at: Utc::now(),
        };

        if let Err(e) = self.repo.insert_batch_log(&log).await {
            warn!(batch_id = %report.batch_id, error = %e, "批次日志写入失败");
        }
    }
}

#[async_trait::async_trait]
impl<R, C> RecordImporter for RecordImporterImpl<R, C>
where
    R: RecordImportRepository + Send + Sync,
    C: ImportConfigReader + Send + Sync,
{
    #[instrument(
        skip(self, request),
        fields(
            batch_id = tracing::field::Empty,
            record_kind = %request.record_kind,
            mode = %request.duplicate_mode
        )
    )]
    async fn import(&self, request: ImportRequest) -> ImportResult<ImportReport> {
        let started_at = Instant::now();
        let batch_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("batch_id", tracing::field::display(&batch_id));

        let ImportRequest {
            record_kind,
            format,
            bytes,
            duplicate_mode,
            overrides,
            file_name,
        } = request;

        info!(
            batch_id = %batch_id,
            file_name = file_name.as_deref().unwrap_or("-"),
            bytes = bytes.len(),
            "开始导入"
        );

        let settings = ImportSettings::load(&self.config).await?;
        debug!(?settings, "导入配置");

        // === 阶段 0: 解析文件 ===
        let sheet = format.parser().parse_sheet(&bytes).map_err(|e| {
            error!(error = %e, "文件解析失败");
            e
        })?;
        info!(rows = sheet.rows.len(), columns = sheet.headers.len(), "文件解析完成");

        // === 阶段 1: 列映射 ===
        let mapping = ColumnMapper::new(record_kind)
            .resolve(&sheet.headers, &overrides)
            .map_err(|e| {
                error!(error = %e, "列映射失败");
                e
            })?;

        let mut ctx = ImportContext::new(
            batch_id,
            duplicate_mode,
            settings,
            started_at,
            sheet.rows,
            mapping,
        );

        // === 阶段 2: 行校验 ===
        let valid_rows = Self::validate_rows(&mut ctx);
        info!(
            valid = valid_rows.len(),
            invalid = ctx.raw_rows.len() - valid_rows.len(),
            "行校验完成"
        );

        // === 阶段 3: 引用解析 ===
        let resolver = ReferenceResolver::new(&self.repo, record_kind);
        ctx.cache = resolver.build_cache(&valid_rows).await;

        let mut resolved = Vec::with_capacity(valid_rows.len());
        for row in &valid_rows {
            match resolver.resolve_row(&ctx.cache, row) {
                Ok(write) => resolved.push((row.row_index, write)),
                Err(e) => {
                    debug!(row = row.row_index, error = %e.message, "引用解析失败");
                    ctx.report.record(ImportOutcome::failed(row.row_index, e));
                }
            }
        }

        // === 阶段 4: 重复检测 ===
        let detector = DuplicateDetector::new(
            &self.repo,
            record_kind,
            duplicate_mode,
            ctx.settings.archived_policy,
            ctx.settings.lookup_window_size,
        );
        ctx.plan = detector.plan(resolved).await;
        for (row_index, err) in std::mem::take(&mut ctx.plan.failed) {
            ctx.report.record(ImportOutcome::failed(row_index, err));
        }

        // === 阶段 5: 写入 ===
        let committer = BatchCommitter::new(&self.repo, duplicate_mode, ctx.settings.commit_window_size);
        let outcomes = committer.commit(std::mem::take(&mut ctx.plan.groups)).await;
        ctx.report.record_all(outcomes);

        // === 阶段 6: 报告 ===
        let elapsed_ms = ctx.elapsed_ms();
        let report = ctx.report.build(ctx.batch_id, record_kind, duplicate_mode, elapsed_ms)?;

        info!(
            batch_id = %report.batch_id,
            total = report.total_rows,
            inserted = report.inserted,
            updated = report.updated,
            skipped = report.skipped_duplicates,
            failed = report.failed,
            elapsed_ms = report.elapsed_ms,
            "导入完成"
        );

        self.write_batch_log(&report, file_name).await;
        Ok(report)
    }
}
