// ==========================================
// 合规记录导入 - 批量写入器 (Batch Committer)
// ==========================================
// 阶段 5: 执行写入计划，逐行独立写入
// 并发: 同一三元组分组内按文件顺序串行；分组之间按窗口并发
// 红线: 单行失败只影响该行，已提交的行不回滚
// ==========================================

use crate::domain::record::{CollisionSource, ImportOutcome, RecordWrite, RowError};
use crate::domain::types::DuplicateMode;
use crate::importer::duplicate_detector::{collision_of, PlannedAction, PlannedWrite, WriteGroup};
use crate::repository::RecordImportRepository;
use futures::future::join_all;
use tracing::{debug, info, warn};

pub struct BatchCommitter<'a, R: ?Sized> {
    repo: &'a R,
    mode: DuplicateMode,
    window_size: usize,
}

impl<'a, R> BatchCommitter<'a, R>
where
    R: RecordImportRepository + ?Sized,
{
    pub fn new(repo: &'a R, mode: DuplicateMode, window_size: usize) -> Self {
        Self {
            repo,
            mode,
            window_size: window_size.max(1),
        }
    }

    /// 执行全部分组
    ///
    /// # 返回
    /// - 每个计划行恰好一个结果（顺序不保证，由报告阶段排序）
    pub async fn commit(&self, groups: Vec<WriteGroup>) -> Vec<ImportOutcome> {
        let mut outcomes = Vec::with_capacity(groups.iter().map(|g| g.steps.len()).sum());

        for (window_no, window) in groups.chunks(self.window_size).enumerate() {
            debug!(window = window_no, groups = window.len(), "写入窗口开始");
            let results = join_all(window.iter().map(|group| self.commit_group(group))).await;
            outcomes.extend(results.into_iter().flatten());
        }

        info!(rows = outcomes.len(), "写入阶段完成");
        outcomes
    }

    /// 分组内串行写入，跟踪该三元组当前对应的记录
    async fn commit_group(&self, group: &WriteGroup) -> Vec<ImportOutcome> {
        let mut current: Option<i64> = None;
        let mut outcomes = Vec::with_capacity(group.steps.len());

        for step in &group.steps {
            let collision = collision_of(&step.action);
            let outcome = match step.action {
                PlannedAction::Insert => self.insert(step, &mut current).await,
                PlannedAction::Update {
                    record_id,
                    unarchive,
                } => {
                    current = Some(record_id);
                    self.update(step, record_id, unarchive, collision).await
                }
                PlannedAction::SkipExisting { record_id } => {
                    current = Some(record_id);
                    ImportOutcome::skipped(step.row_index, CollisionSource::Existing { record_id })
                }
                PlannedAction::SkipInBatch { first_row } => match current {
                    Some(_) => ImportOutcome::skipped(step.row_index, CollisionSource::InBatch { first_row }),
                    None => self.insert(step, &mut current).await,
                },
                PlannedAction::UpdateInBatch { first_row } => match current {
                    Some(record_id) => {
                        self.update(step, record_id, false, Some(CollisionSource::InBatch { first_row }))
                            .await
                    }
                    None => {
                        debug!(row = step.row_index, first_row, "先行写入失败，改为插入");
                        self.insert(step, &mut current).await
                    }
                },
            };
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn insert(&self, step: &PlannedWrite, current: &mut Option<i64>) -> ImportOutcome {
        match self.repo.insert_record(&step.write).await {
            Ok(record_id) => {
                *current = Some(record_id);
                ImportOutcome::inserted(step.row_index, record_id)
            }
            Err(e) if e.is_unique_violation() => match self.mode {
                // 并发导入已写入同一三元组
                DuplicateMode::Skip => ImportOutcome::skipped(step.row_index, CollisionSource::Store),
                DuplicateMode::Overwrite => {
                    warn!(row = step.row_index, error = %e, "并发重复写入");
                    ImportOutcome::failed(step.row_index, RowError::write(format!("并发重复: {}", e)))
                }
            },
            Err(e) => {
                warn!(row = step.row_index, error = %e, "插入失败");
                ImportOutcome::failed(step.row_index, RowError::write(e.to_string()))
            }
        }
    }

    async fn update(
        &self,
        step: &PlannedWrite,
        record_id: i64,
        unarchive: bool,
        collision: Option<CollisionSource>,
    ) -> ImportOutcome {
        let write: &RecordWrite = &step.write;
        match self.repo.update_record(record_id, write, unarchive).await {
            Ok(()) => ImportOutcome::updated(
                step.row_index,
                record_id,
                collision.unwrap_or(CollisionSource::Existing { record_id }),
            ),
            Err(e) => {
                warn!(row = step.row_index, record_id, error = %e, "更新失败");
                ImportOutcome::failed(step.row_index, RowError::write(e.to_string()))
            }
        }
    }
}
