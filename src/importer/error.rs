// ==========================================
// 外勤运营平台 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 行级问题（缺字段/格式/查找失败）不走 Err，
//       而是作为 ValidationError 数据进入报告
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 结构错误（整批中止）=====
    #[error("structural error: {0}")]
    Structural(String),

    // ===== 文件相关错误 =====
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("unsupported file format: {0} (expected .csv, .txt, .xlsx or .xls)")]
    UnsupportedFormat(String),

    #[error("failed to read file: {0}")]
    FileRead(String),

    #[error("failed to parse workbook: {0}")]
    WorkbookParse(String),

    #[error("failed to parse CSV: {0}")]
    CsvParse(String),

    // ===== 会话状态错误 =====
    #[error("invalid session transition: from={from} to={to}")]
    InvalidTransition { from: String, to: String },

    // ===== 外部协作方错误 =====
    #[error("bulk create endpoint failed: {0}")]
    Endpoint(String),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("serialization failed: {0}")]
    Serialization(String),

    // ===== 配置错误 =====
    #[error("failed to read config (key: {key}): {message}")]
    ConfigRead { key: String, message: String },

    #[error("invalid config value (key: {key}, value: {value}): {message}")]
    ConfigValue {
        key: String,
        value: String,
        message: String,
    },

    // ===== 通用错误 =====
    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 是否为结构错误（决定会话进入 Aborted）
    pub fn is_structural(&self) -> bool {
        matches!(self, ImportError::Structural(_))
    }
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ImportError::FileNotFound(err.to_string()),
            _ => ImportError::FileRead(err.to_string()),
        }
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParse(err.to_string())
    }
}

impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::WorkbookParse(err.to_string())
    }
}

impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::Repository(RepositoryError::from(err))
    }
}

impl From<reqwest::Error> for ImportError {
    fn from(err: reqwest::Error) -> Self {
        ImportError::Endpoint(err.to_string())
    }
}

impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        ImportError::Serialization(err.to_string())
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_flag() {
        assert!(ImportError::Structural("insufficient rows".to_string()).is_structural());
        assert!(!ImportError::Internal("x".to_string()).is_structural());
    }

    #[test]
    fn test_io_not_found_maps_to_file_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.csv");
        assert!(matches!(ImportError::from(io), ImportError::FileNotFound(_)));
    }

    #[test]
    fn test_structural_message() {
        let err = ImportError::Structural("insufficient rows".to_string());
        assert_eq!(err.to_string(), "structural error: insufficient rows");
    }
}
