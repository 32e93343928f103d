// ==========================================
// 合规记录导入 - 重复检测器 (Duplicate Detector)
// ==========================================
// 阶段 4: 按唯一性三元组分组，对照库中已有记录生成写入计划
// 冲突规则: (主体 ID, 类型 ID, 发生日期) 完全相同
// 文件内冲突: SKIP 先到先得；OVERWRITE 后到覆盖
// ==========================================

use crate::domain::record::{CollisionSource, ExistingRecord, RecordTriple, RecordWrite, RowError};
use crate::domain::types::{ArchivedCollisionPolicy, DuplicateMode, RecordKind};
use crate::repository::RecordImportRepository;
use futures::future::join_all;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// 计划动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    /// 插入新记录
    Insert,
    /// 覆盖库中已有记录
    Update {
        record_id: i64,
        unarchive: bool,
    },
    /// 库中已有记录，保持不变
    SkipExisting { record_id: i64 },
    /// 与本文件先出现的行重复，跳过（先行写入失败时改为插入）
    SkipInBatch { first_row: usize },
    /// 覆盖本分组先前写入的记录（先行写入失败时改为插入）
    UpdateInBatch { first_row: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWrite {
    pub row_index: usize,
    pub write: RecordWrite,
    pub action: PlannedAction,
}

/// 同一三元组的所有行（文件顺序）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteGroup {
    pub triple: RecordTriple,
    pub steps: Vec<PlannedWrite>,
}

// ==========================================
// DuplicatePlan - 写入计划
// ==========================================
#[derive(Debug, Default)]
pub struct DuplicatePlan {
    pub groups: Vec<WriteGroup>,          // 按组内首行的文件顺序
    pub failed: Vec<(usize, RowError)>,   // 冲突查询失败的行
}

impl DuplicatePlan {
    pub fn planned_rows(&self) -> usize {
        self.groups.iter().map(|g| g.steps.len()).sum()
    }
}

// ==========================================
// DuplicateDetector
// ==========================================
pub struct DuplicateDetector<'a, R: ?Sized> {
    repo: &'a R,
    record_kind: RecordKind,
    mode: DuplicateMode,
    archived_policy: ArchivedCollisionPolicy,
    lookup_window_size: usize,
}

impl<'a, R> DuplicateDetector<'a, R>
where
    R: RecordImportRepository + ?Sized,
{
    pub fn new(
        repo: &'a R,
        record_kind: RecordKind,
        mode: DuplicateMode,
        archived_policy: ArchivedCollisionPolicy,
        lookup_window_size: usize,
    ) -> Self {
        Self {
            repo,
            record_kind,
            mode,
            archived_policy,
            lookup_window_size: lookup_window_size.max(1),
        }
    }

    /// 生成写入计划
    ///
    /// # 参数
    /// - rows: (行号, 待写入内容)，文件顺序；仅包含引用全部解析成功的行
    ///
    /// # 说明
    /// - 每个不同三元组查询一次库中冲突，查询按窗口并发
    /// - 查询失败的三元组，其所有行记为失败
    pub async fn plan(&self, rows: Vec<(usize, RecordWrite)>) -> DuplicatePlan {
        // 按三元组分组，保留首次出现顺序
        let mut order: Vec<RecordTriple> = Vec::new();
        let mut grouped: BTreeMap<RecordTriple, Vec<(usize, RecordWrite)>> = BTreeMap::new();
        for (row_index, write) in rows {
            let entry = grouped.entry(write.triple).or_default();
            if entry.is_empty() {
                order.push(write.triple);
            }
            entry.push((row_index, write));
        }

        // 分窗口并发查询已有记录
        let mut lookups: Vec<Result<Option<ExistingRecord>, String>> = Vec::with_capacity(order.len());
        for window in order.chunks(self.lookup_window_size) {
            let futures = window
                .iter()
                .map(|triple| self.repo.find_by_triple(self.record_kind, *triple));
            for result in join_all(futures).await {
                lookups.push(result.map_err(|e| e.to_string()));
            }
        }

        let mut plan = DuplicatePlan::default();
        for (triple, lookup) in order.into_iter().zip(lookups) {
            let rows = grouped.remove(&triple).unwrap_or_default();
            match lookup {
                Ok(existing) => plan.groups.push(self.plan_group(triple, existing, rows)),
                Err(message) => {
                    warn!(?triple, error = %message, "冲突查询失败");
                    for (row_index, _) in rows {
                        plan.failed.push((row_index, RowError::write(format!("冲突查询失败: {}", message))));
                    }
                }
            }
        }

        info!(
            groups = plan.groups.len(),
            planned_rows = plan.planned_rows(),
            failed_rows = plan.failed.len(),
            mode = %self.mode,
            "重复检测完成"
        );
        plan
    }

    /// 单个三元组分组的计划
    fn plan_group(
        &self,
        triple: RecordTriple,
        existing: Option<ExistingRecord>,
        rows: Vec<(usize, RecordWrite)>,
    ) -> WriteGroup {
        let first_row = rows.first().map(|(row, _)| *row).unwrap_or_default();

        // 已归档记录是否参与冲突
        let existing = existing.filter(|rec| {
            !rec.archived
                || (self.mode == DuplicateMode::Overwrite
                    && self.archived_policy == ArchivedCollisionPolicy::Revive)
        });

        let steps = rows
            .into_iter()
            .enumerate()
            .map(|(pos, (row_index, write))| {
                let action = match (self.mode, existing, pos) {
                    (DuplicateMode::Skip, Some(rec), _) => PlannedAction::SkipExisting {
                        record_id: rec.record_id,
                    },
                    (DuplicateMode::Skip, None, 0) => PlannedAction::Insert,
                    (DuplicateMode::Skip, None, _) => PlannedAction::SkipInBatch { first_row },
                    (DuplicateMode::Overwrite, Some(rec), 0) => PlannedAction::Update {
                        record_id: rec.record_id,
                        unarchive: rec.archived,
                    },
                    (DuplicateMode::Overwrite, None, 0) => PlannedAction::Insert,
                    (DuplicateMode::Overwrite, _, _) => PlannedAction::UpdateInBatch { first_row },
                };
                debug!(row = row_index, ?action, "写入计划");
                PlannedWrite {
                    row_index,
                    write,
                    action,
                }
            })
            .collect();

        WriteGroup { triple, steps }
    }
}

/// 计划动作对应的冲突来源（用于行结果）
pub fn collision_of(action: &PlannedAction) -> Option<CollisionSource> {
    match *action {
        PlannedAction::Insert => None,
        PlannedAction::Update { record_id, .. } | PlannedAction::SkipExisting { record_id } => {
            Some(CollisionSource::Existing { record_id })
        }
        PlannedAction::SkipInBatch { first_row } | PlannedAction::UpdateInBatch { first_row } => {
            Some(CollisionSource::InBatch { first_row })
        }
    }
}
