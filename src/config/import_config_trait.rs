// ==========================================
// 合规记录导入 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入管道所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::types::ArchivedCollisionPolicy;
use async_trait::async_trait;
use std::error::Error;

/// 配置读取错误（跨 await 传递，需 Send + Sync）
pub type ConfigError = Box<dyn Error + Send + Sync>;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入管道所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    // ===== 并发窗口 =====

    /// 写入阶段每个并发窗口包含的三元组分组数
    ///
    /// # 默认值
    /// - 25
    async fn get_commit_window_size(&self) -> Result<usize, ConfigError>;

    /// 重复检测阶段每个并发窗口包含的三元组查询数
    ///
    /// # 默认值
    /// - 25
    async fn get_lookup_window_size(&self) -> Result<usize, ConfigError>;

    // ===== 数据质量 =====

    /// 周期异常告警阈值（月）
    ///
    /// # 默认值
    /// - 120
    async fn get_period_anomaly_months(&self) -> Result<i64, ConfigError>;

    // ===== 重复处理 =====

    /// 与已归档记录冲突时的处理策略
    ///
    /// # 返回
    /// - LeaveArchived: 已归档记录不可见，插入新记录
    /// - Revive: OVERWRITE 模式下覆盖并恢复已归档记录
    ///
    /// # 默认值
    /// - LEAVE_ARCHIVED
    async fn get_archived_collision_policy(&self) -> Result<ArchivedCollisionPolicy, ConfigError>;

    // ===== 追溯 =====

    /// 本次导入生效配置的 JSON 快照（写入批次日志）
    async fn config_snapshot(&self) -> Result<String, ConfigError>;
}
