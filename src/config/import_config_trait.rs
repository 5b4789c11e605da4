// ==========================================
// 外勤运营平台 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::import_config::{DelimiterMode, ImportConfig};
use crate::importer::error::{EngineResult, ImportError};
use async_trait::async_trait;
use std::path::PathBuf;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入引擎所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    // ===== 校验规则 =====

    /// 获取可接受的年份窗口（闭区间）
    ///
    /// # 默认值
    /// - (2020, 2030)
    async fn get_year_window(&self) -> EngineResult<(i32, i32)>;

    /// 获取业务时区偏移（分钟，东正西负）
    ///
    /// # 默认值
    /// - -180（UTC-03:00）
    async fn get_utc_offset_minutes(&self) -> EngineResult<i32>;

    /// 获取 CSV 分隔符模式
    ///
    /// # 默认值
    /// - AUTO（按表头在 `,` 与 `;` 间检测）
    async fn get_delimiter_mode(&self) -> EngineResult<DelimiterMode>;

    // ===== 报告 =====

    /// 获取提示消息中展示的错误条数（本地, 服务端）
    ///
    /// # 默认值
    /// - (3, 2)
    async fn get_toast_limits(&self) -> EngineResult<(usize, usize)>;

    /// 获取报告输出目录（None 表示使用下载目录）
    async fn get_report_dir(&self) -> EngineResult<Option<PathBuf>>;

    // ===== 运行参数 =====

    /// 获取每批校验行数
    ///
    /// # 默认值
    /// - 500
    async fn get_validation_chunk_size(&self) -> EngineResult<usize>;

    /// 获取批量接口请求超时（秒）
    ///
    /// # 默认值
    /// - 30
    async fn get_endpoint_timeout_secs(&self) -> EngineResult<u64>;

    /// 汇总读取完整导入配置
    async fn load_import_config(&self) -> EngineResult<ImportConfig> {
        let (min_year, max_year) = self.get_year_window().await?;
        if min_year > max_year {
            return Err(ImportError::ConfigValue {
                key: "year_window".to_string(),
                value: format!("{}..{}", min_year, max_year),
                message: "min year must not exceed max year".to_string(),
            });
        }
        let (toast_error_limit, server_toast_error_limit) = self.get_toast_limits().await?;

        Ok(ImportConfig {
            min_year,
            max_year,
            utc_offset_minutes: self.get_utc_offset_minutes().await?,
            delimiter: self.get_delimiter_mode().await?,
            toast_error_limit,
            server_toast_error_limit,
            validation_chunk_size: self.get_validation_chunk_size().await?,
            endpoint_timeout_secs: self.get_endpoint_timeout_secs().await?,
            report_dir: self.get_report_dir().await?,
        })
    }
}
