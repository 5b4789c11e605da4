// ==========================================
// 外勤运营平台 - 批量导入对账引擎（核心库）
// ==========================================
// 技术栈: Rust + SQLite + tokio
// 系统定位: 预约/客户表格批量导入，部分成功语义，统一错误报告
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 本地存储
pub mod repository;

// 导入层 - 分词/校验/解析/提交/报告
pub mod importer;

// 配置层 - 导入配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// 应用层 - 组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    AppointmentStatus, EntityKind, ErrorKind, ImportPhase, MatchedBy, Priority, ReconcileOutcome,
    ReferenceKind,
};

// 导入结果
pub use domain::{ImportResult, ValidationError};

// 引擎
pub use importer::{ImportEngine, ImportError, ImportSession, Importer, ReportBuilder};

// 配置
pub use config::{ConfigManager, ImportConfig};

// 存储
pub use repository::SqliteStore;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "FieldOps Bulk Import";
