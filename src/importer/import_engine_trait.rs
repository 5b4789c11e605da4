// ==========================================
// 外勤运营平台 - 导入引擎 Trait
// ==========================================
// 职责: 定义导入主接口与三个外部协作方接口（不包含实现）
// - LookupService: 按键查找已存在实体
// - BulkCreateEndpoint: 批量创建，返回逐条成功/失败
// - ReportSink: 向操作员呈现结果（提示消息 / 报告下载）
// ==========================================

use crate::domain::{
    BulkCreateResponse, ClientRecord, EntityKind, EntityPayload, ImportResult, ServiceRecord,
    TeamRecord, TechnicianRecord,
};
use crate::importer::error::EngineResult;
use crate::importer::report::{ReportArtifact, Toast};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

// ==========================================
// Importer Trait
// ==========================================
// 用途: 导入主接口
// 实现者: ImportEngine
#[async_trait]
pub trait Importer: Send + Sync {
    /// 从文件导入（.csv/.txt/.xlsx/.xls）
    ///
    /// # 返回
    /// - Ok(ImportResult): 含本地与服务端错误的统一结果
    /// - Err(Structural): 文件结构不可用，整批中止
    /// - Err: 文件读取错误等
    async fn import_file(&self, path: &Path, kind: EntityKind) -> EngineResult<ImportResult>;

    /// 从已读取的文本导入
    async fn import_text(
        &self,
        source_name: &str,
        text: &str,
        kind: EntityKind,
    ) -> EngineResult<ImportResult>;
}

// ==========================================
// LookupService Trait
// ==========================================
// 用途: 引用实体精确查找（同步，校验循环内调用）
// 实现者: ReferenceDirectory
pub trait LookupService: Send + Sync {
    /// 按证件号（仅数字）精确查找客户
    fn find_client_by_tax_id(&self, tax_id: &str) -> Option<&ClientRecord>;

    /// 按名称（忽略大小写）精确查找客户
    fn find_client_by_name(&self, name: &str) -> Option<&ClientRecord>;

    fn find_service_by_name(&self, name: &str) -> Option<&ServiceRecord>;

    fn find_technician_by_name(&self, name: &str) -> Option<&TechnicianRecord>;

    fn find_team_by_name(&self, name: &str) -> Option<&TeamRecord>;
}

// ==========================================
// BulkCreateEndpoint Trait
// ==========================================
// 用途: 一次请求提交全部有效行
// 实现者: HttpBulkEndpoint, SqliteStore
#[async_trait]
pub trait BulkCreateEndpoint: Send + Sync {
    /// 批量创建
    ///
    /// # 参数
    /// - kind: 实体类型（决定集合名）
    /// - items: 规范化后的载荷（顺序即服务端 1-based 序号）
    ///
    /// # 返回
    /// - Ok(BulkCreateResponse): 计数 + 逐条明细
    /// - Err: 传输失败（整批视为失败）
    async fn bulk_create(
        &self,
        kind: EntityKind,
        items: Vec<EntityPayload>,
    ) -> EngineResult<BulkCreateResponse>;
}

// ==========================================
// ReportSink Trait
// ==========================================
// 用途: 结果呈现
// 实现者: DirectorySink, MemorySink
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// 展示简短提示
    async fn notify(&self, toast: &Toast) -> EngineResult<()>;

    /// 提供报告下载（须经确认）
    ///
    /// # 返回
    /// - Ok(Some(path)): 已写出
    /// - Ok(None): 操作员拒绝
    async fn offer_download(&self, artifact: &ReportArtifact) -> EngineResult<Option<PathBuf>>;
}
