// ==========================================
// 外勤运营平台 - 导入数据模型
// ==========================================
// 职责: 行 / 校验错误 / 解析结果 / 批量载荷 / 导入结果
// 约束:
// - 行号从 1 开始，按源文件物理行计（表头为第 1 行）
// - 一行要么进入提交批次，要么带至少一条错误被排除
// ==========================================

use crate::domain::entity::AddressFields;
use crate::domain::types::{
    AppointmentStatus, EntityKind, ErrorKind, MatchedBy, Priority, ReconcileOutcome,
    ReferenceKind,
};
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==========================================
// ImportRow - 数据行（分词后）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRow {
    pub line: usize,
    pub cells: Vec<String>,
}

impl ImportRow {
    pub fn new(line: usize, cells: Vec<String>) -> Self {
        Self { line, cells }
    }
}

// ==========================================
// ValidationError - 行级错误 / 警告
// ==========================================
// line = 0 表示无法映射到具体行的批次级错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub line: usize,
    pub field: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

impl ValidationError {
    pub fn new(
        line: usize,
        field: Option<&str>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            line,
            field: field.map(str::to_string),
            kind,
            message: message.into(),
        }
    }

    pub fn missing(line: usize, labels: &[&str]) -> Self {
        Self::new(
            line,
            Some(&labels.join(", ")),
            ErrorKind::FieldMissing,
            format!("Missing required fields: {}", labels.join(", ")),
        )
    }

    pub fn format(line: usize, field: &str, message: impl Into<String>) -> Self {
        Self::new(line, Some(field), ErrorKind::Format, message)
    }

    pub fn lookup(line: usize, field: &str, message: impl Into<String>) -> Self {
        Self::new(line, Some(field), ErrorKind::Lookup, message)
    }

    pub fn duplicate(line: usize, field: &str, message: impl Into<String>) -> Self {
        Self::new(line, Some(field), ErrorKind::Duplicate, message)
    }

    pub fn server(line: usize, message: impl Into<String>) -> Self {
        Self::new(line, None, ErrorKind::ServerValidation, message)
    }

    pub fn is_batch_level(&self) -> bool {
        self.line == 0
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_batch_level() {
            write!(f, "Batch: {}", self.message)
        } else {
            write!(f, "Line {}: {}", self.line, self.message)
        }
    }
}

// ==========================================
// ClientFields - 客户字段（亦为客户批量载荷）
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFields {
    pub name: String,
    #[serde(rename = "cpf", default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone2: Option<String>,
    #[serde(flatten)]
    pub address: AddressFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ClientFields {
    /// 内联草稿键: 有证件号用 `tax:<digits>`，否则 `name:<小写名称>`
    pub fn draft_key(&self) -> String {
        match &self.tax_id {
            Some(tax_id) => format!("tax:{}", tax_id),
            None => format!("name:{}", self.name.trim().to_lowercase()),
        }
    }
}

// ==========================================
// ResolvedEntity - 引用解析结果
// ==========================================
// id = None 表示随提交内联创建（matched_by = Created）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEntity {
    pub kind: ReferenceKind,
    pub id: Option<i64>,
    pub matched_by: MatchedBy,
    pub name: String,
    pub draft_key: Option<String>,
    pub source_fields: Option<ClientFields>,
}

impl ResolvedEntity {
    pub fn matched(kind: ReferenceKind, id: i64, name: &str, matched_by: MatchedBy) -> Self {
        Self {
            kind,
            id: Some(id),
            matched_by,
            name: name.to_string(),
            draft_key: None,
            source_fields: None,
        }
    }

    pub fn inline_client(fields: ClientFields) -> Self {
        Self {
            kind: ReferenceKind::Client,
            id: None,
            matched_by: MatchedBy::Created,
            name: fields.name.clone(),
            draft_key: Some(fields.draft_key()),
            source_fields: Some(fields),
        }
    }

    pub fn is_inline(&self) -> bool {
        self.id.is_none()
    }
}

// ==========================================
// AppointmentDraft - 通过校验的预约
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentDraft {
    pub client: ResolvedEntity,
    pub service: ResolvedEntity,
    pub technician: Option<ResolvedEntity>,
    pub team: Option<ResolvedEntity>,
    pub scheduled_at: DateTime<FixedOffset>,
    pub status: AppointmentStatus,
    pub priority: Priority,
    pub address: AddressFields,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ValidatedEntity {
    Appointment(AppointmentDraft),
    Client(ClientFields),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedRow {
    pub line: usize,
    pub entity: ValidatedEntity,
    pub warnings: Vec<ValidationError>,
}

// ==========================================
// 批量创建载荷 (Bulk Create Payload)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentPayload {
    pub client_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_data: Option<ClientFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_draft_key: Option<String>,
    pub service_id: i64,
    pub technician_id: Option<i64>,
    pub team_id: Option<i64>,
    pub scheduled_date: String, // RFC 3339 (UTC)
    pub status: AppointmentStatus,
    pub priority: Priority,
    #[serde(flatten)]
    pub address: AddressFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntityPayload {
    Appointment(AppointmentPayload),
    Client(ClientFields),
}

// ==========================================
// 批量创建响应 (Bulk Create Response)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedItem {
    pub index: usize, // 批次内 1-based 序号
    pub status: ItemStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkCreateResponse {
    #[serde(default)]
    pub success: usize,
    #[serde(default)]
    pub errors: usize,
    #[serde(default)]
    pub detailed_errors: Vec<String>,
    #[serde(default)]
    pub processed_items: Vec<ProcessedItem>,
}

// ==========================================
// ImportResult - 导入结果（报告的唯一输入）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub session_id: Uuid,
    pub entity_kind: EntityKind,
    pub source_name: String,
    pub total_lines: usize,
    pub valid_count: usize,
    pub error_count: usize, // 被排除的行数
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationError>,
    pub server_success: usize,
    pub server_errors: Vec<ValidationError>,
    pub submitted: bool,
    pub completed_at: NaiveDateTime,
}

impl ImportResult {
    /// 最终成功的行数（提交后以服务端为准）
    pub fn succeeded(&self) -> usize {
        if self.submitted {
            self.server_success
        } else {
            0
        }
    }

    /// 成功率（百分比）
    pub fn success_rate(&self) -> f64 {
        if self.total_lines == 0 {
            return 0.0;
        }
        self.succeeded() as f64 / self.total_lines as f64 * 100.0
    }

    pub fn has_problems(&self) -> bool {
        !self.errors.is_empty() || !self.server_errors.is_empty()
    }

    /// 有错误或警告时提供报告下载
    pub fn needs_report(&self) -> bool {
        self.has_problems() || !self.warnings.is_empty()
    }

    pub fn outcome(&self) -> ReconcileOutcome {
        match self.succeeded() {
            0 => ReconcileOutcome::Failed,
            n if n == self.total_lines && !self.has_problems() => ReconcileOutcome::Success,
            _ => ReconcileOutcome::Partial,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_result(total: usize, valid: usize, server_success: usize) -> ImportResult {
        let errors = (0..total - valid)
            .map(|i| ValidationError::missing(i + 2, &["Service"]))
            .collect();
        ImportResult {
            session_id: Uuid::new_v4(),
            entity_kind: EntityKind::Appointment,
            source_name: "agenda.csv".to_string(),
            total_lines: total,
            valid_count: valid,
            error_count: total - valid,
            errors,
            warnings: vec![],
            server_success,
            server_errors: vec![],
            submitted: valid > 0,
            completed_at: NaiveDate::from_ymd_opt(2025, 3, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(sample_result(3, 3, 3).outcome(), ReconcileOutcome::Success);
        assert_eq!(sample_result(3, 2, 2).outcome(), ReconcileOutcome::Partial);
        assert_eq!(sample_result(3, 0, 0).outcome(), ReconcileOutcome::Failed);
    }

    #[test]
    fn test_warnings_alone_need_a_report() {
        let mut result = sample_result(2, 2, 2);
        assert!(!result.needs_report());

        result.warnings.push(ValidationError::lookup(
            3,
            "Technician/Team",
            "Technician or team \"Fulano\" not found; left unassigned",
        ));
        assert!(result.needs_report());
        assert_eq!(result.outcome(), ReconcileOutcome::Success);
    }

    #[test]
    fn test_success_rate() {
        let result = sample_result(4, 3, 3);
        assert!((result.success_rate() - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_draft_key_prefers_tax_id() {
        let mut fields = ClientFields {
            name: "Maria Souza".to_string(),
            ..Default::default()
        };
        assert_eq!(fields.draft_key(), "name:maria souza");
        fields.tax_id = Some("12345678909".to_string());
        assert_eq!(fields.draft_key(), "tax:12345678909");
    }

    #[test]
    fn test_client_payload_uses_wire_names() {
        let fields = ClientFields {
            name: "Maria".to_string(),
            tax_id: Some("12345678909".to_string()),
            address: AddressFields {
                postal_code: "01234-567".to_string(),
                street: "Rua A".to_string(),
                number: "10".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json["cpf"], "12345678909");
        assert_eq!(json["cep"], "01234-567");
        assert_eq!(json["numero"], "10");
        assert!(json.get("email").is_none());
    }

    #[test]
    fn test_response_tolerates_missing_processed_items() {
        let raw = r#"{"success":1,"errors":1,"detailedErrors":["Item 2: boom"]}"#;
        let response: BulkCreateResponse = serde_json::from_str(raw).unwrap();
        assert!(response.processed_items.is_empty());
        assert_eq!(response.detailed_errors.len(), 1);
    }
}
