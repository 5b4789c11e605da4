// ==========================================
// 外勤运营平台 - 领域模型层
// ==========================================
// 职责: 定义导入引擎使用的实体、类型与结果结构
// 红线: 不含数据访问逻辑,不含导入流程逻辑
// ==========================================

pub mod entity;
pub mod import;
pub mod types;

// 重导出核心类型
pub use entity::{
    AddressFields, AppointmentRecord, ClientRecord, ServiceRecord, TeamRecord, TechnicianRecord,
};
pub use import::{
    AppointmentDraft, AppointmentPayload, BulkCreateResponse, ClientFields, EntityPayload,
    ImportResult, ImportRow, ItemStatus, ProcessedItem, ResolvedEntity, ValidatedEntity,
    ValidatedRow, ValidationError,
};
pub use types::{
    AppointmentStatus, EntityKind, ErrorKind, ImportPhase, MatchedBy, Priority, ReconcileOutcome,
    ReferenceKind,
};
