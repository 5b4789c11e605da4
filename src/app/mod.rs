// ==========================================
// 外勤运营平台 - 应用层
// ==========================================
// 职责: 组装存储、配置与导入引擎，供 CLI 使用
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState, DB_PATH_ENV};
