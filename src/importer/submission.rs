// ==========================================
// 外勤运营平台 - 提交批次与服务端对账
// ==========================================
// 职责:
// - 全部有效行一次请求提交
// - 同一内联草稿仅首次携带客户数据，其余仅携带 draft_key
// - 服务端逐条结果按 1-based 序号映射回源文件行号
// 回退: 无 processedItems 时解析 detailedErrors 的 "Item N:" 前缀
// ==========================================

use crate::domain::{
    AppointmentDraft, AppointmentPayload, BulkCreateResponse, EntityKind, EntityPayload,
    ItemStatus, ValidatedEntity, ValidatedRow, ValidationError,
};
use crate::importer::error::{EngineResult, ImportError};
use crate::importer::import_engine_trait::BulkCreateEndpoint;
use chrono::Utc;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, error, info};

static ITEM_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*item\s+(\d+)\s*:\s*(.*)$").expect("valid item prefix regex")
});

/// 拆分 "Item N: message" → (N, message)
pub fn split_item_prefix(raw: &str) -> (Option<usize>, String) {
    match ITEM_PREFIX.captures(raw) {
        Some(caps) => (
            caps.get(1).and_then(|m| m.as_str().parse().ok()),
            caps.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
        ),
        None => (None, raw.trim().to_string()),
    }
}

// ==========================================
// SubmissionOutcome - 对账结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionOutcome {
    pub server_success: usize,
    pub server_errors: Vec<ValidationError>,
}

// ==========================================
// SubmissionBatch
// ==========================================
#[derive(Debug, Clone)]
pub struct SubmissionBatch {
    pub kind: EntityKind,
    pub lines: Vec<usize>, // lines[i] ↔ 服务端序号 i + 1
    pub payloads: Vec<EntityPayload>,
}

impl SubmissionBatch {
    pub fn build(kind: EntityKind, rows: &[ValidatedRow]) -> EngineResult<Self> {
        let mut lines = Vec::with_capacity(rows.len());
        let mut payloads = Vec::with_capacity(rows.len());
        let mut sent_drafts: HashSet<String> = HashSet::new();

        for row in rows {
            let payload = match &row.entity {
                ValidatedEntity::Appointment(draft) => EntityPayload::Appointment(
                    appointment_payload(row.line, draft, &mut sent_drafts)?,
                ),
                ValidatedEntity::Client(fields) => EntityPayload::Client(fields.clone()),
            };
            lines.push(row.line);
            payloads.push(payload);
        }

        debug!(kind = %kind, items = payloads.len(), drafts = sent_drafts.len(), "提交批次已组装");
        Ok(Self {
            kind,
            lines,
            payloads,
        })
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// 发送并对账；传输失败时每个已提交行都记一条服务端错误
    pub async fn submit(&self, endpoint: &dyn BulkCreateEndpoint) -> SubmissionOutcome {
        if self.is_empty() {
            return SubmissionOutcome::default();
        }

        info!(kind = %self.kind, items = self.len(), "提交批量创建请求");
        match endpoint.bulk_create(self.kind, self.payloads.clone()).await {
            Ok(response) => self.reconcile(&response),
            Err(err) => {
                error!(kind = %self.kind, items = self.len(), error = %err, "批量创建请求失败");
                self.transport_failure(&err)
            }
        }
    }

    /// 将服务端响应合并为行级错误
    pub fn reconcile(&self, response: &BulkCreateResponse) -> SubmissionOutcome {
        let mut server_errors = Vec::new();

        let server_success = if !response.processed_items.is_empty() {
            for item in &response.processed_items {
                if item.status != ItemStatus::Error {
                    continue;
                }
                let raw = item.error.as_deref().unwrap_or("Rejected by server");
                let (_, message) = split_item_prefix(raw);
                server_errors.push(ValidationError::server(self.line_for(item.index), message));
            }
            response
                .processed_items
                .iter()
                .filter(|item| item.status == ItemStatus::Success)
                .count()
        } else {
            for raw in &response.detailed_errors {
                let (index, message) = split_item_prefix(raw);
                let line = index.map(|i| self.line_for(i)).unwrap_or(0);
                server_errors.push(ValidationError::server(line, message));
            }
            response.success
        };

        // 服务端报告的失败数多于明细
        if response.errors > server_errors.len() {
            server_errors.push(ValidationError::server(
                0,
                format!(
                    "{} items were rejected without details",
                    response.errors - server_errors.len()
                ),
            ));
        }

        server_errors.sort_by_key(|e| e.line);
        SubmissionOutcome {
            server_success: server_success.min(self.len()),
            server_errors,
        }
    }

    fn transport_failure(&self, err: &ImportError) -> SubmissionOutcome {
        SubmissionOutcome {
            server_success: 0,
            server_errors: self
                .lines
                .iter()
                .map(|&line| ValidationError::server(line, format!("Submission failed: {}", err)))
                .collect(),
        }
    }

    /// 1-based 序号 → 行号；越界为批次级（0）
    fn line_for(&self, index: usize) -> usize {
        index
            .checked_sub(1)
            .and_then(|i| self.lines.get(i))
            .copied()
            .unwrap_or(0)
    }
}

fn appointment_payload(
    line: usize,
    draft: &AppointmentDraft,
    sent_drafts: &mut HashSet<String>,
) -> EngineResult<AppointmentPayload> {
    let service_id = draft.service.id.ok_or_else(|| {
        ImportError::Internal(format!("line {}: service reference has no id", line))
    })?;

    let (client_data, client_draft_key) = match (&draft.client.draft_key, draft.client.id) {
        (Some(key), None) => {
            let first = sent_drafts.insert(key.clone());
            let data = if first {
                draft.client.source_fields.clone()
            } else {
                None
            };
            (data, Some(key.clone()))
        }
        _ => (None, None),
    };

    Ok(AppointmentPayload {
        client_id: draft.client.id,
        client_data,
        client_draft_key,
        service_id,
        technician_id: draft.technician.as_ref().and_then(|t| t.id),
        team_id: draft.team.as_ref().and_then(|t| t.id),
        scheduled_date: draft.scheduled_at.with_timezone(&Utc).to_rfc3339(),
        status: draft.status,
        priority: draft.priority,
        address: draft.address.clone(),
        notes: draft.notes.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AddressFields, AppointmentStatus, ClientFields, MatchedBy, Priority, ProcessedItem,
        ReferenceKind, ResolvedEntity,
    };
    use chrono::{FixedOffset, TimeZone};

    fn appointment(line: usize, client: ResolvedEntity) -> ValidatedRow {
        let offset = FixedOffset::west_opt(3 * 3600).unwrap();
        ValidatedRow {
            line,
            entity: ValidatedEntity::Appointment(AppointmentDraft {
                client,
                service: ResolvedEntity::matched(ReferenceKind::Service, 7, "Instalação", MatchedBy::Name),
                technician: None,
                team: None,
                scheduled_at: offset.with_ymd_and_hms(2025, 3, 15, 9, 0, 0).unwrap(),
                status: AppointmentStatus::Scheduled,
                priority: Priority::Normal,
                address: AddressFields::default(),
                notes: None,
            }),
            warnings: vec![],
        }
    }

    fn inline(name: &str, tax_id: &str) -> ResolvedEntity {
        ResolvedEntity::inline_client(ClientFields {
            name: name.to_string(),
            tax_id: Some(tax_id.to_string()),
            ..Default::default()
        })
    }

    fn batch_of(lines: &[usize]) -> SubmissionBatch {
        let rows: Vec<_> = lines
            .iter()
            .map(|&l| appointment(l, ResolvedEntity::matched(ReferenceKind::Client, 1, "Ana", MatchedBy::Key)))
            .collect();
        SubmissionBatch::build(EntityKind::Appointment, &rows).unwrap()
    }

    #[test]
    fn test_draft_data_sent_once() {
        let draft = inline("Bruno", "98765432100");
        let rows = vec![appointment(2, draft.clone()), appointment(4, draft)];
        let batch = SubmissionBatch::build(EntityKind::Appointment, &rows).unwrap();

        let payloads: Vec<&AppointmentPayload> = batch
            .payloads
            .iter()
            .map(|p| match p {
                EntityPayload::Appointment(a) => a,
                EntityPayload::Client(_) => panic!("unexpected client payload"),
            })
            .collect();
        assert!(payloads[0].client_data.is_some());
        assert!(payloads[1].client_data.is_none());
        assert_eq!(payloads[1].client_draft_key.as_deref(), Some("tax:98765432100"));
        assert_eq!(batch.lines, vec![2, 4]);
    }

    #[test]
    fn test_scheduled_date_is_utc() {
        let batch = batch_of(&[2]);
        let EntityPayload::Appointment(payload) = &batch.payloads[0] else {
            panic!("unexpected payload");
        };
        assert_eq!(payload.scheduled_date, "2025-03-15T12:00:00+00:00");
    }

    #[test]
    fn test_processed_items_map_to_lines() {
        let batch = batch_of(&[2, 5, 9]);
        let response = BulkCreateResponse {
            success: 2,
            errors: 1,
            detailed_errors: vec!["Item 2: Client not found".to_string()],
            processed_items: vec![
                ProcessedItem { index: 1, status: ItemStatus::Success, error: None, data: None },
                ProcessedItem {
                    index: 2,
                    status: ItemStatus::Error,
                    error: Some("Item 2: Client not found".to_string()),
                    data: None,
                },
                ProcessedItem { index: 3, status: ItemStatus::Success, error: None, data: None },
            ],
        };

        let outcome = batch.reconcile(&response);
        assert_eq!(outcome.server_success, 2);
        assert_eq!(outcome.server_errors.len(), 1);
        assert_eq!(outcome.server_errors[0].line, 5);
        assert_eq!(outcome.server_errors[0].message, "Client not found");
    }

    #[test]
    fn test_detailed_errors_fallback() {
        let batch = batch_of(&[2, 3]);
        let response = BulkCreateResponse {
            success: 1,
            errors: 2,
            detailed_errors: vec!["Item 2: invalid date".to_string(), "quota exceeded".to_string()],
            processed_items: vec![],
        };

        let outcome = batch.reconcile(&response);
        assert_eq!(outcome.server_success, 1);
        assert_eq!(outcome.server_errors[0].line, 0);
        assert!(outcome.server_errors[0].is_batch_level());
        assert_eq!(outcome.server_errors[1].line, 3);
        assert_eq!(outcome.server_errors[1].message, "invalid date");
    }

    #[test]
    fn test_missing_details_become_batch_error() {
        let batch = batch_of(&[2, 3]);
        let response = BulkCreateResponse {
            success: 0,
            errors: 2,
            ..Default::default()
        };
        let outcome = batch.reconcile(&response);
        assert_eq!(outcome.server_errors.len(), 1);
        assert!(outcome.server_errors[0].message.contains("2 items"));
    }

    #[test]
    fn test_split_item_prefix() {
        assert_eq!(split_item_prefix("Item 12: boom"), (Some(12), "boom".to_string()));
        assert_eq!(split_item_prefix("boom"), (None, "boom".to_string()));
    }
}
