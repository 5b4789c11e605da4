// ==========================================
// 外勤运营平台 - 批量导入对账引擎
// ==========================================
// 职责: 表格文本 → 逐行校验与引用解析 → 一次批量提交 → 统一报告
// 支持: CSV / TXT / Excel (.xlsx/.xls)
// 实体: 预约 (appointments) / 客户 (clients)
// ==========================================

// 模块声明
pub mod column_schema;
pub mod entity_resolver;
pub mod error;
pub mod field_validator;
pub mod http_endpoint;
pub mod import_engine;
pub mod import_engine_trait;
pub mod normalizer;
pub mod reference_directory;
pub mod report;
pub mod report_sink;
pub mod row_pipeline;
pub mod session;
pub mod submission;
pub mod template;
pub mod tokenizer;

// 重导出核心类型
pub use column_schema::{BoundRow, ColumnSchema, ColumnSpec, FieldKey, FieldType};
pub use entity_resolver::{ClientMatch, EntityResolver};
pub use error::{EngineResult, ImportError};
pub use field_validator::{CheckedFields, FieldValidator};
pub use http_endpoint::HttpBulkEndpoint;
pub use import_engine::ImportEngine;
pub use normalizer::{DateParseError, Normalizer};
pub use reference_directory::ReferenceDirectory;
pub use report::{partition, Partition, ReportArtifact, ReportBuilder, Toast, ToastVariant};
pub use report_sink::{ConfirmMode, DirectorySink, MemorySink};
pub use row_pipeline::RowPipeline;
pub use session::ImportSession;
pub use submission::{SubmissionBatch, SubmissionOutcome};
pub use template::{render_appointment_export, render_client_export, render_template};
pub use tokenizer::{read_source, TokenizedFile, Tokenizer};

// 重导出 Trait 接口
pub use import_engine_trait::{BulkCreateEndpoint, Importer, LookupService, ReportSink};
