// ==========================================
// 外勤运营平台 - 导入会话
// ==========================================
// 状态机: Idle → Parsed → RowValidated → Submitting → Reconciled → Idle
// - RowValidated 可直接进入 Reconciled（无有效行，不发送请求）
// - 任意非终态可进入 Aborted（结构错误）
// 约束: 行数据仅在 Idle → Parsed 时装载；提交开始后会话只读
// ==========================================

use crate::domain::{EntityKind, ImportPhase, ImportResult, ImportRow, ReconcileOutcome};
use crate::importer::column_schema::ColumnSchema;
use crate::importer::error::{EngineResult, ImportError};
use crate::importer::report::Partition;
use crate::importer::submission::SubmissionOutcome;
use crate::importer::tokenizer::TokenizedFile;
use chrono::Local;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug)]
pub struct ImportSession {
    id: Uuid,
    source_name: String,
    kind: EntityKind,
    schema: &'static ColumnSchema,
    header: Vec<String>,
    header_offset: usize,
    rows: Vec<ImportRow>,
    partition: Option<Partition>,
    result: Option<ImportResult>,
    phase: ImportPhase,
}

impl ImportSession {
    pub fn new(source_name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_name: source_name.into(),
            kind,
            schema: ColumnSchema::for_kind(kind),
            header: Vec::new(),
            header_offset: 0,
            rows: Vec::new(),
            partition: None,
            result: None,
            phase: ImportPhase::Idle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn schema(&self) -> &'static ColumnSchema {
        self.schema
    }

    pub fn phase(&self) -> ImportPhase {
        self.phase
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn header_offset(&self) -> usize {
        self.header_offset
    }

    pub fn rows(&self) -> &[ImportRow] {
        &self.rows
    }

    pub fn result(&self) -> Option<&ImportResult> {
        self.result.as_ref()
    }

    fn transition(&mut self, to: ImportPhase) -> EngineResult<()> {
        let allowed = match (self.phase, to) {
            (ImportPhase::Idle, ImportPhase::Parsed)
            | (ImportPhase::Parsed, ImportPhase::RowValidated)
            | (ImportPhase::RowValidated, ImportPhase::Submitting)
            | (ImportPhase::RowValidated, ImportPhase::Reconciled(_))
            | (ImportPhase::Submitting, ImportPhase::Reconciled(_))
            | (ImportPhase::Reconciled(_), ImportPhase::Idle) => true,
            (from, ImportPhase::Aborted) => !from.is_terminal(),
            _ => false,
        };

        if !allowed {
            return Err(ImportError::InvalidTransition {
                from: self.phase.to_string(),
                to: to.to_string(),
            });
        }

        debug!(session_id = %self.id, from = %self.phase, to = %to, "会话状态迁移");
        self.phase = to;
        Ok(())
    }

    /// 装载分词结果（Idle → Parsed）；表头列数不足为结构错误
    pub fn load(&mut self, file: TokenizedFile) -> EngineResult<()> {
        if self.phase != ImportPhase::Idle {
            return Err(ImportError::InvalidTransition {
                from: self.phase.to_string(),
                to: ImportPhase::Parsed.to_string(),
            });
        }
        let offset = self.schema.header_offset(&file.header)?;
        self.transition(ImportPhase::Parsed)?;
        self.header = file.header;
        self.header_offset = offset;
        self.rows = file.rows;
        Ok(())
    }

    /// 记录逐行结果（Parsed → RowValidated）
    pub fn record_validation(&mut self, partition: Partition) -> EngineResult<&Partition> {
        self.transition(ImportPhase::RowValidated)?;
        Ok(&*self.partition.insert(partition))
    }

    pub fn partition(&self) -> Option<&Partition> {
        self.partition.as_ref()
    }

    pub fn begin_submission(&mut self) -> EngineResult<()> {
        self.transition(ImportPhase::Submitting)
    }

    /// 合并服务端结果，生成最终 ImportResult 并进入 Reconciled
    ///
    /// # 参数
    /// - outcome: None 表示未发送请求（无有效行）
    pub fn reconcile(&mut self, outcome: Option<SubmissionOutcome>) -> EngineResult<&ImportResult> {
        let partition = self.partition.as_ref().ok_or_else(|| ImportError::InvalidTransition {
            from: self.phase.to_string(),
            to: "RECONCILED".to_string(),
        })?;

        let submitted = outcome.is_some();
        let outcome = outcome.unwrap_or_default();
        let result = ImportResult {
            session_id: self.id,
            entity_kind: self.kind,
            source_name: self.source_name.clone(),
            total_lines: self.rows.len(),
            valid_count: partition.valid.len(),
            error_count: partition.excluded,
            errors: partition.errors.clone(),
            warnings: partition.warnings.clone(),
            server_success: outcome.server_success,
            server_errors: outcome.server_errors,
            submitted,
            completed_at: Local::now().naive_local(),
        };

        let verdict: ReconcileOutcome = result.outcome();
        self.transition(ImportPhase::Reconciled(verdict))?;
        Ok(&*self.result.insert(result))
    }

    pub fn abort(&mut self) -> EngineResult<()> {
        self.transition(ImportPhase::Aborted)
    }

    /// 关闭会话（Reconciled → Idle），释放行数据
    pub fn reset(&mut self) -> EngineResult<Option<ImportResult>> {
        self.transition(ImportPhase::Idle)?;
        self.header.clear();
        self.header_offset = 0;
        self.rows.clear();
        self.partition = None;
        Ok(self.result.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::tokenizer::Tokenizer;

    fn client_csv() -> String {
        let schema = ColumnSchema::for_kind(EntityKind::Client);
        format!(
            "{}\n{}\n",
            schema.header_row().join(","),
            schema.example_row().join(",")
        )
    }

    fn loaded_session() -> ImportSession {
        let mut session = ImportSession::new("clientes.csv", EntityKind::Client);
        let file = Tokenizer::default().tokenize(&client_csv()).unwrap();
        session.load(file).unwrap();
        session
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut session = loaded_session();
        assert_eq!(session.phase(), ImportPhase::Parsed);
        assert_eq!(session.rows().len(), 1);

        session.record_validation(Partition::default()).unwrap();
        session.begin_submission().unwrap();
        let result = session
            .reconcile(Some(SubmissionOutcome {
                server_success: 1,
                server_errors: vec![],
            }))
            .unwrap();
        assert_eq!(result.total_lines, 1);
        assert_eq!(
            session.phase(),
            ImportPhase::Reconciled(ReconcileOutcome::Success)
        );

        let closed = session.reset().unwrap();
        assert!(closed.is_some());
        assert!(session.rows().is_empty());
        assert_eq!(session.phase(), ImportPhase::Idle);
    }

    #[test]
    fn test_nothing_to_submit_reconciles_as_failed() {
        let mut session = loaded_session();
        session
            .record_validation(Partition {
                excluded: 1,
                ..Default::default()
            })
            .unwrap();
        let result = session.reconcile(None).unwrap();
        assert!(!result.submitted);
        assert_eq!(
            session.phase(),
            ImportPhase::Reconciled(ReconcileOutcome::Failed)
        );
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut session = ImportSession::new("x.csv", EntityKind::Client);
        let err = session.begin_submission().unwrap_err();
        assert!(matches!(err, ImportError::InvalidTransition { .. }));

        let mut session = loaded_session();
        session.record_validation(Partition::default()).unwrap();
        session.begin_submission().unwrap();
        let again = Tokenizer::default().tokenize(&client_csv()).unwrap();
        assert!(matches!(
            session.load(again),
            Err(ImportError::InvalidTransition { .. })
        ));
        assert!(matches!(
            session.record_validation(Partition::default()),
            Err(ImportError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_short_header_is_structural() {
        let mut session = ImportSession::new("x.csv", EntityKind::Client);
        let file = Tokenizer::default().tokenize("Name,Tax ID\nAna,123\n").unwrap();
        let err = session.load(file).unwrap_err();
        assert!(err.is_structural());
        assert_eq!(session.phase(), ImportPhase::Idle);
        session.abort().unwrap();
        assert!(session.abort().is_err());
    }
}
