// ==========================================
// 合规记录导入 - 配置层
// ==========================================
// 职责: 导入阈值、并发窗口与冲突策略
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod import_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use import_config_trait::{ConfigError, ImportConfigReader};
