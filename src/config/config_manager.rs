// ==========================================
// 合规记录导入 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、写入
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::import_config_trait::{ConfigError, ImportConfigReader};
use crate::db::open_sqlite_connection;
use crate::domain::types::ArchivedCollisionPolicy;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, ConfigError> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, ConfigError> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, ConfigError> {
        Ok(self
            .get_global_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 解析数值配置；格式错误时告警并回退默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr + std::fmt::Display + Copy,
    {
        let raw = self.get_config_or_default(key, &default.to_string())?;
        Ok(raw.trim().parse::<T>().unwrap_or_else(|_| {
            tracing::warn!(config_key = key, raw_value = %raw, "配置格式错误，使用默认值");
            default
        }))
    }

    /// 获取导入相关配置的快照（JSON格式）
    ///
    /// # 返回
    /// - Ok(String): 生效值（含默认值）的 JSON 字符串，键按字典序
    ///
    /// # 用途
    /// - 写入导入批次日志，便于追溯该批次使用的阈值与策略
    pub fn get_config_snapshot(&self) -> Result<String, ConfigError> {
        let mut config_map: BTreeMap<&str, String> = BTreeMap::new();
        for (key, default) in config_keys::IMPORT_DEFAULTS {
            config_map.insert(key, self.get_config_or_default(key, default)?);
        }

        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_commit_window_size(&self) -> Result<usize, ConfigError> {
        let size = self.get_parsed_or_default(config_keys::COMMIT_WINDOW_SIZE, 25usize)?;
        Ok(size.max(1))
    }

    async fn get_lookup_window_size(&self) -> Result<usize, ConfigError> {
        let size = self.get_parsed_or_default(config_keys::LOOKUP_WINDOW_SIZE, 25usize)?;
        Ok(size.max(1))
    }

    async fn get_period_anomaly_months(&self) -> Result<i64, ConfigError> {
        self.get_parsed_or_default(config_keys::PERIOD_ANOMALY_MONTHS, 120i64)
    }

    async fn get_archived_collision_policy(&self) -> Result<ArchivedCollisionPolicy, ConfigError> {
        let raw = self.get_config_or_default(config_keys::ARCHIVED_COLLISION_POLICY, "LEAVE_ARCHIVED")?;
        Ok(raw.parse::<ArchivedCollisionPolicy>().unwrap_or_else(|e| {
            tracing::warn!(
                config_key = config_keys::ARCHIVED_COLLISION_POLICY,
                raw_value = %raw,
                error = %e,
                "归档冲突策略配置无效，使用 LEAVE_ARCHIVED"
            );
            ArchivedCollisionPolicy::LeaveArchived
        }))
    }

    async fn config_snapshot(&self) -> Result<String, ConfigError> {
        self.get_config_snapshot()
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 并发窗口
    pub const COMMIT_WINDOW_SIZE: &str = "import/commit_window_size";
    pub const LOOKUP_WINDOW_SIZE: &str = "import/lookup_window_size";

    // 数据质量
    pub const PERIOD_ANOMALY_MONTHS: &str = "import/period_anomaly_months";

    // 重复处理
    pub const ARCHIVED_COLLISION_POLICY: &str = "import/archived_collision_policy";

    /// 导入配置项及默认值（快照使用）
    pub const IMPORT_DEFAULTS: [(&str, &str); 4] = [
        (COMMIT_WINDOW_SIZE, "25"),
        (LOOKUP_WINDOW_SIZE, "25"),
        (PERIOD_ANOMALY_MONTHS, "120"),
        (ARCHIVED_COLLISION_POLICY, "LEAVE_ARCHIVED"),
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn create_manager() -> (tempfile::NamedTempFile, ConfigManager) {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap().to_string();
        let conn = db::open_sqlite_connection(&db_path).unwrap();
        db::init_schema(&conn).unwrap();
        let manager = ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap();
        (temp_file, manager)
    }

    #[tokio::test]
    async fn test_defaults_when_unset() {
        let (_tmp, manager) = create_manager();

        assert_eq!(manager.get_commit_window_size().await.unwrap(), 25);
        assert_eq!(manager.get_lookup_window_size().await.unwrap(), 25);
        assert_eq!(manager.get_period_anomaly_months().await.unwrap(), 120);
        assert_eq!(
            manager.get_archived_collision_policy().await.unwrap(),
            ArchivedCollisionPolicy::LeaveArchived
        );
    }

    #[tokio::test]
    async fn test_overrides_and_invalid_values() {
        let (_tmp, manager) = create_manager();
        manager
            .set_global_config_value(config_keys::COMMIT_WINDOW_SIZE, "4")
            .unwrap();
        manager
            .set_global_config_value(config_keys::PERIOD_ANOMALY_MONTHS, "abc")
            .unwrap();
        manager
            .set_global_config_value(config_keys::ARCHIVED_COLLISION_POLICY, "REVIVE")
            .unwrap();
        manager
            .set_global_config_value(config_keys::LOOKUP_WINDOW_SIZE, "0")
            .unwrap();

        assert_eq!(manager.get_commit_window_size().await.unwrap(), 4);
        assert_eq!(manager.get_lookup_window_size().await.unwrap(), 1);
        assert_eq!(manager.get_period_anomaly_months().await.unwrap(), 120);
        assert_eq!(
            manager.get_archived_collision_policy().await.unwrap(),
            ArchivedCollisionPolicy::Revive
        );
    }

    #[test]
    fn test_config_snapshot_contains_effective_values() {
        let (_tmp, manager) = create_manager();
        manager
            .set_global_config_value(config_keys::COMMIT_WINDOW_SIZE, "10")
            .unwrap();

        let snapshot: serde_json::Value =
            serde_json::from_str(&manager.get_config_snapshot().unwrap()).unwrap();
        assert_eq!(snapshot[config_keys::COMMIT_WINDOW_SIZE], "10");
        assert_eq!(snapshot[config_keys::ARCHIVED_COLLISION_POLICY], "LEAVE_ARCHIVED");
    }
}
