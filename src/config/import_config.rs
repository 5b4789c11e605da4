// ==========================================
// 外勤运营平台 - 导入配置项
// ==========================================
// 职责: 导入引擎运行参数及默认值
// 来源: config_kv 表（ConfigManager）/ 命令行覆写
// ==========================================

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// 默认接受的年份窗口
pub const DEFAULT_MIN_YEAR: i32 = 2020;
pub const DEFAULT_MAX_YEAR: i32 = 2030;

/// 默认业务时区偏移（UTC-03:00）
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = -180;

// ==========================================
// DelimiterMode - CSV 分隔符
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelimiterMode {
    #[default]
    Auto,
    Comma,
    Semicolon,
}

impl DelimiterMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "auto" | "" => Some(DelimiterMode::Auto),
            "," | "comma" => Some(DelimiterMode::Comma),
            ";" | "semicolon" => Some(DelimiterMode::Semicolon),
            _ => None,
        }
    }
}

impl fmt::Display for DelimiterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelimiterMode::Auto => write!(f, "auto"),
            DelimiterMode::Comma => write!(f, ","),
            DelimiterMode::Semicolon => write!(f, ";"),
        }
    }
}

// ==========================================
// ImportConfig
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub min_year: i32,
    pub max_year: i32,
    pub utc_offset_minutes: i32,
    pub delimiter: DelimiterMode,
    pub toast_error_limit: usize,        // 本地错误提示条数
    pub server_toast_error_limit: usize, // 服务端错误提示条数
    pub validation_chunk_size: usize,    // 每批校验行数（批间让出执行权）
    pub endpoint_timeout_secs: u64,
    pub report_dir: Option<PathBuf>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            min_year: DEFAULT_MIN_YEAR,
            max_year: DEFAULT_MAX_YEAR,
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            delimiter: DelimiterMode::Auto,
            toast_error_limit: 3,
            server_toast_error_limit: 2,
            validation_chunk_size: 500,
            endpoint_timeout_secs: 30,
            report_dir: None,
        }
    }
}

impl ImportConfig {
    /// 业务时区偏移；越界（超过 ±24h）时回落到 UTC
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// 报告目录: 配置值 → 用户下载目录 → 当前目录
    pub fn resolved_report_dir(&self) -> PathBuf {
        self.report_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ImportConfig::default();
        assert_eq!((config.min_year, config.max_year), (2020, 2030));
        assert_eq!(config.utc_offset().local_minus_utc(), -3 * 3600);
        assert_eq!(config.toast_error_limit, 3);
        assert_eq!(config.server_toast_error_limit, 2);
    }

    #[test]
    fn test_out_of_range_offset_falls_back_to_utc() {
        let config = ImportConfig {
            utc_offset_minutes: 100_000,
            ..Default::default()
        };
        assert_eq!(config.utc_offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_delimiter_parse() {
        assert_eq!(DelimiterMode::parse(";"), Some(DelimiterMode::Semicolon));
        assert_eq!(DelimiterMode::parse("Comma"), Some(DelimiterMode::Comma));
        assert_eq!(DelimiterMode::parse("tab"), None);
    }

    #[test]
    fn test_explicit_report_dir_wins() {
        let config = ImportConfig {
            report_dir: Some(PathBuf::from("/tmp/reports")),
            ..Default::default()
        };
        assert_eq!(config.resolved_report_dir(), PathBuf::from("/tmp/reports"));
    }
}
