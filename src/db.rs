// ==========================================
// 合规记录导入 - SQLite 连接初始化与建表
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键 + busy_timeout）
// - 提供幂等的建表入口，CLI 与测试共用同一份 schema
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::path::PathBuf;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 默认数据库路径
///
/// 优先级: 环境变量 COMPLIANCE_IMPORT_DB_PATH > 用户数据目录 > 当前目录
pub fn default_db_path() -> String {
    if let Ok(path) = std::env::var("COMPLIANCE_IMPORT_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./compliance_records.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("compliance-import");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("compliance_records.db");
        }
    }

    path.to_string_lossy().to_string()
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 建表（幂等）
///
/// 唯一性规则: 同一记录类别下 (subject_id, type_id, occurrence_date) 在未归档记录中唯一
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS employee (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            employee_number TEXT NOT NULL UNIQUE,
            full_name TEXT,
            archived INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS equipment (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            inventory_code TEXT NOT NULL UNIQUE,
            name TEXT,
            archived INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS record_type (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_kind TEXT NOT NULL,
            name TEXT NOT NULL,
            archived INTEGER NOT NULL DEFAULT 0,
            UNIQUE (record_kind, name)
        );

        CREATE TABLE IF NOT EXISTS facility (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            name TEXT
        );

        CREATE TABLE IF NOT EXISTS compliance_record (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_kind TEXT NOT NULL,
            subject_id INTEGER NOT NULL,
            type_id INTEGER NOT NULL REFERENCES record_type(id),
            occurrence_date TEXT NOT NULL,
            facility_id INTEGER REFERENCES facility(id),
            period_months INTEGER,
            reminder_days INTEGER,
            status TEXT NOT NULL,
            risk_category TEXT,
            responsible TEXT,
            notes TEXT,
            archived INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS ux_compliance_record_triple
            ON compliance_record (record_kind, subject_id, type_id, occurrence_date)
            WHERE archived = 0;

        CREATE INDEX IF NOT EXISTS ix_compliance_record_lookup
            ON compliance_record (record_kind, subject_id, type_id, occurrence_date);

        CREATE TABLE IF NOT EXISTS import_batch_log (
            batch_id TEXT PRIMARY KEY,
            record_kind TEXT NOT NULL,
            file_name TEXT,
            duplicate_mode TEXT NOT NULL,
            total_rows INTEGER NOT NULL,
            inserted_rows INTEGER NOT NULL,
            updated_rows INTEGER NOT NULL,
            skipped_rows INTEGER NOT NULL,
            failed_rows INTEGER NOT NULL,
            elapsed_ms INTEGER NOT NULL,
            report_json TEXT,
            config_snapshot TEXT,
            imported_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);

        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_triple_unique_only_among_active_records() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO record_type (record_kind, name) VALUES ('TRAINING', 'Fire Safety');",
        )
        .unwrap();

        let insert = "INSERT INTO compliance_record
            (record_kind, subject_id, type_id, occurrence_date, status, archived, created_at, updated_at)
            VALUES ('TRAINING', 1, 1, '2024-03-15', 'planned', ?1, 'now', 'now')";

        conn.execute(insert, [1]).unwrap();
        conn.execute(insert, [0]).unwrap();
        assert!(conn.execute(insert, [0]).is_err());
    }
}
