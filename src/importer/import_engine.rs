// ==========================================
// 外勤运营平台 - 导入引擎实现
// ==========================================
// 职责: 驱动一次导入会话，从源文本到统一结果
// 流程: 分词 → 装载会话 → 逐行管道 → 划分 → 提交 → 对账 → 呈现
// 说明:
// - 结构错误整批中止（会话进入 Aborted），不产生结果
// - 行级问题进入 ImportResult，不走 Err
// - 逐行校验分块执行，块间让出执行权
// ==========================================

use crate::config::{ImportConfig, ImportConfigReader};
use crate::domain::{EntityKind, ImportResult};
use crate::importer::error::EngineResult;
use crate::importer::field_validator::FieldValidator;
use crate::importer::import_engine_trait::{BulkCreateEndpoint, Importer, LookupService, ReportSink};
use crate::importer::normalizer::Normalizer;
use crate::importer::report::{partition, ReportBuilder};
use crate::importer::row_pipeline::RowPipeline;
use crate::importer::session::ImportSession;
use crate::importer::submission::SubmissionBatch;
use crate::importer::tokenizer::{read_source, TokenizedFile, Tokenizer};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

// ==========================================
// ImportEngine - 导入引擎
// ==========================================
pub struct ImportEngine<L>
where
    L: LookupService,
{
    // 引用实体查找（会话内只读快照）
    lookup: L,

    // 批量创建端点
    endpoint: Box<dyn BulkCreateEndpoint>,

    config: ImportConfig,
}

impl<L> ImportEngine<L>
where
    L: LookupService,
{
    /// 创建导入引擎
    ///
    /// # 参数
    /// - lookup: 查找服务
    /// - endpoint: 批量创建端点
    /// - config: 导入配置
    pub fn new(lookup: L, endpoint: Box<dyn BulkCreateEndpoint>, config: ImportConfig) -> Self {
        Self {
            lookup,
            endpoint,
            config,
        }
    }

    /// 从配置读取器加载配置后创建
    pub async fn with_config_reader<C>(
        lookup: L,
        endpoint: Box<dyn BulkCreateEndpoint>,
        reader: &C,
    ) -> EngineResult<Self>
    where
        C: ImportConfigReader + ?Sized,
    {
        let config = reader.load_import_config().await?;
        debug!(config = ?config, "导入配置已加载");
        Ok(Self::new(lookup, endpoint, config))
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    pub fn tokenizer(&self) -> Tokenizer {
        Tokenizer::new(self.config.delimiter)
    }

    pub fn report_builder(&self) -> ReportBuilder {
        ReportBuilder::new(
            self.config.toast_error_limit,
            self.config.server_toast_error_limit,
        )
    }

    /// 向操作员呈现结果：提示消息；有错误或警告时提供报告下载（须确认）
    pub async fn deliver(
        &self,
        result: &ImportResult,
        sink: &dyn ReportSink,
    ) -> EngineResult<Option<PathBuf>> {
        let builder = self.report_builder();
        for toast in builder.toasts(result) {
            sink.notify(&toast).await?;
        }

        if !result.needs_report() {
            return Ok(None);
        }
        let artifact = builder.artifact(result);
        let written = sink.offer_download(&artifact).await?;
        match &written {
            Some(path) => info!(session_id = %result.session_id, path = %path.display(), "导入报告已保存"),
            None => debug!(session_id = %result.session_id, "操作员未下载报告"),
        }
        Ok(written)
    }

    #[instrument(skip(self, source), fields(session_id))]
    async fn run(
        &self,
        source_name: &str,
        source: EngineResult<TokenizedFile>,
        kind: EntityKind,
    ) -> EngineResult<ImportResult> {
        let start_time = Instant::now();
        let mut session = ImportSession::new(source_name, kind);
        let session_id = session.id();
        tracing::Span::current().record("session_id", tracing::field::display(session_id));
        info!(session_id = %session_id, source = %source_name, kind = %kind, "开始导入");

        // === 步骤 1: 装载分词结果 ===
        debug!("步骤 1: 装载分词结果");
        if let Err(err) = source.and_then(|file| session.load(file)) {
            if err.is_structural() {
                warn!(session_id = %session_id, error = %err, "文件结构不可用，导入中止");
            } else {
                error!(session_id = %session_id, error = %err, "文件读取失败");
            }
            session.abort()?;
            return Err(err);
        }
        let total = session.rows().len();
        info!(
            session_id = %session_id,
            total = total,
            header_offset = session.header_offset(),
            "文件解析完成"
        );

        // === 步骤 2: 逐行管道 ===
        debug!("步骤 2: 逐行校验与解析");
        let validator = FieldValidator::new(Normalizer::new(&self.config));
        let chunk_size = self.config.validation_chunk_size.max(1);
        let mut outcomes = Vec::with_capacity(total);
        {
            let mut pipeline = RowPipeline::new(
                session.schema(),
                session.header_offset(),
                &validator,
                &self.lookup,
            );
            for chunk in session.rows().chunks(chunk_size) {
                for row in chunk {
                    let outcome = pipeline.process(row);
                    if let Err(errors) = &outcome {
                        warn!(line = row.line, errors = errors.len(), "行被排除");
                    }
                    outcomes.push(outcome);
                }
                tokio::task::yield_now().await;
            }
        }

        // === 步骤 3: 划分 ===
        debug!("步骤 3: 划分有效/无效行");
        let split = partition(outcomes);
        info!(
            session_id = %session_id,
            total = total,
            valid = split.valid.len(),
            invalid = split.excluded,
            warnings = split.warnings.len(),
            "逐行校验完成"
        );
        let batch = SubmissionBatch::build(kind, &session.record_validation(split)?.valid)?;

        // === 步骤 4: 提交 ===
        let outcome = if batch.is_empty() {
            warn!(session_id = %session_id, "没有有效行，跳过提交");
            None
        } else {
            debug!("步骤 4: 提交批量创建");
            session.begin_submission()?;
            let outcome = batch.submit(self.endpoint.as_ref()).await;
            info!(
                session_id = %session_id,
                submitted = batch.len(),
                created = outcome.server_success,
                rejected = outcome.server_errors.len(),
                "服务端对账完成"
            );
            Some(outcome)
        };

        // === 步骤 5: 合并结果 ===
        let result = session.reconcile(outcome)?.clone();
        info!(
            session_id = %session_id,
            total = result.total_lines,
            valid = result.valid_count,
            invalid = result.error_count,
            succeeded = result.succeeded(),
            outcome = %result.outcome(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "导入完成"
        );
        Ok(result)
    }
}

#[async_trait]
impl<L> Importer for ImportEngine<L>
where
    L: LookupService,
{
    /// 从文件导入（按扩展名选择读取方式）
    async fn import_file(&self, path: &Path, kind: EntityKind) -> EngineResult<ImportResult> {
        let source_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        let source = read_source(path, &self.tokenizer()).await;
        self.run(&source_name, source, kind).await
    }

    async fn import_text(
        &self,
        source_name: &str,
        text: &str,
        kind: EntityKind,
    ) -> EngineResult<ImportResult> {
        let source = self.tokenizer().tokenize(text);
        self.run(source_name, source, kind).await
    }
}

