// ==========================================
// 外勤运营平台 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、写入
// 存储: config_kv 表 (key-value + scope)
// 规则: 缺失键回落默认值；非法值报 ConfigValue
// ==========================================

use crate::config::import_config::{
    DelimiterMode, ImportConfig, DEFAULT_MAX_YEAR, DEFAULT_MIN_YEAR, DEFAULT_UTC_OFFSET_MINUTES,
};
use crate::config::import_config_trait::ImportConfigReader;
use crate::db::{configure_sqlite_connection, open_sqlite_connection};
use crate::importer::error::{EngineResult, ImportError};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// 时区偏移上限（分钟，不含）
const MAX_OFFSET_MINUTES: i32 = 24 * 60;

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
    pub fn new(db_path: &str) -> EngineResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> EngineResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| ImportError::Internal(format!("failed to acquire lock: {}", e)))?;
            configure_sqlite_connection(&guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> EngineResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| ImportError::ConfigRead {
            key: key.to_string(),
            message: format!("failed to acquire lock: {}", e),
        })?;

        conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|e| ImportError::ConfigRead {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    /// 写入 global scope 配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> EngineResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ImportError::Internal(format!("failed to acquire lock: {}", e)))?;

        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES ('global', ?1, ?2, datetime('now'))
            ON CONFLICT(scope_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, value],
        )?;
        debug!(key = key, value = value, "配置已写入");
        Ok(())
    }

    /// 列出 global scope 全部配置
    pub fn list_global_config(&self) -> EngineResult<Vec<(String, String)>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ImportError::Internal(format!("failed to acquire lock: {}", e)))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;
        let entries = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<(String, String)>, _>>()?;
        Ok(entries)
    }

    /// 读取并解析配置值，缺失时返回默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> EngineResult<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get_config_value(key)? {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<T>().map_err(|e| ImportError::ConfigValue {
                key: key.to_string(),
                value: raw.clone(),
                message: e.to_string(),
            }),
        }
    }

    fn get_positive_or_default<T>(&self, key: &str, default: T) -> EngineResult<T>
    where
        T: FromStr + PartialOrd + Default + Display + Copy,
        T::Err: Display,
    {
        let value = self.get_parsed_or_default(key, default)?;
        if value <= T::default() {
            return Err(ImportError::ConfigValue {
                key: key.to_string(),
                value: value.to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(value)
    }
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_year_window(&self) -> EngineResult<(i32, i32)> {
        let min = self.get_parsed_or_default(config_keys::IMPORT_MIN_YEAR, DEFAULT_MIN_YEAR)?;
        let max = self.get_parsed_or_default(config_keys::IMPORT_MAX_YEAR, DEFAULT_MAX_YEAR)?;
        Ok((min, max))
    }

    async fn get_utc_offset_minutes(&self) -> EngineResult<i32> {
        let minutes = self.get_parsed_or_default(
            config_keys::IMPORT_UTC_OFFSET_MINUTES,
            DEFAULT_UTC_OFFSET_MINUTES,
        )?;
        if minutes.abs() >= MAX_OFFSET_MINUTES {
            return Err(ImportError::ConfigValue {
                key: config_keys::IMPORT_UTC_OFFSET_MINUTES.to_string(),
                value: minutes.to_string(),
                message: "offset must be within ±24h".to_string(),
            });
        }
        Ok(minutes)
    }

    async fn get_delimiter_mode(&self) -> EngineResult<DelimiterMode> {
        match self.get_config_value(config_keys::IMPORT_CSV_DELIMITER)? {
            None => Ok(DelimiterMode::Auto),
            Some(raw) => DelimiterMode::parse(&raw).ok_or_else(|| ImportError::ConfigValue {
                key: config_keys::IMPORT_CSV_DELIMITER.to_string(),
                value: raw.clone(),
                message: "expected auto, ',' or ';'".to_string(),
            }),
        }
    }

    async fn get_toast_limits(&self) -> EngineResult<(usize, usize)> {
        let defaults = ImportConfig::default();
        let local = self.get_parsed_or_default(
            config_keys::IMPORT_TOAST_ERROR_LIMIT,
            defaults.toast_error_limit,
        )?;
        let server = self.get_parsed_or_default(
            config_keys::IMPORT_SERVER_TOAST_ERROR_LIMIT,
            defaults.server_toast_error_limit,
        )?;
        Ok((local, server))
    }

    async fn get_report_dir(&self) -> EngineResult<Option<PathBuf>> {
        Ok(self
            .get_config_value(config_keys::IMPORT_REPORT_DIR)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from))
    }

    async fn get_validation_chunk_size(&self) -> EngineResult<usize> {
        self.get_positive_or_default(
            config_keys::IMPORT_VALIDATION_CHUNK_SIZE,
            ImportConfig::default().validation_chunk_size,
        )
    }

    async fn get_endpoint_timeout_secs(&self) -> EngineResult<u64> {
        self.get_positive_or_default(
            config_keys::ENDPOINT_TIMEOUT_SECS,
            ImportConfig::default().endpoint_timeout_secs,
        )
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 校验规则
    pub const IMPORT_MIN_YEAR: &str = "import_min_year";
    pub const IMPORT_MAX_YEAR: &str = "import_max_year";
    pub const IMPORT_UTC_OFFSET_MINUTES: &str = "import_utc_offset_minutes";
    pub const IMPORT_CSV_DELIMITER: &str = "import_csv_delimiter";

    // 报告
    pub const IMPORT_TOAST_ERROR_LIMIT: &str = "import_toast_error_limit";
    pub const IMPORT_SERVER_TOAST_ERROR_LIMIT: &str = "import_server_toast_error_limit";
    pub const IMPORT_REPORT_DIR: &str = "import_report_dir";

    // 运行参数
    pub const IMPORT_VALIDATION_CHUNK_SIZE: &str = "import_validation_chunk_size";
    pub const ENDPOINT_TIMEOUT_SECS: &str = "endpoint_timeout_secs";

    pub const ALL: &[&str] = &[
        IMPORT_MIN_YEAR,
        IMPORT_MAX_YEAR,
        IMPORT_UTC_OFFSET_MINUTES,
        IMPORT_CSV_DELIMITER,
        IMPORT_TOAST_ERROR_LIMIT,
        IMPORT_SERVER_TOAST_ERROR_LIMIT,
        IMPORT_REPORT_DIR,
        IMPORT_VALIDATION_CHUNK_SIZE,
        ENDPOINT_TIMEOUT_SECS,
    ];
}
