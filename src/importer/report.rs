// ==========================================
// 外勤运营平台 - 汇总与报告生成
// ==========================================
// 职责:
// - 将逐行结果划分为有效/无效
// - 生成简短提示（前 N 条错误 + “还有 N 条”）
// - 生成完整文本报告与 JSON 报告
// 约束: 报告内容只由 ImportResult 决定
// ==========================================

use crate::domain::{EntityKind, ImportResult, ReconcileOutcome, ValidatedRow, ValidationError};
use crate::importer::column_schema::ColumnSchema;
use crate::importer::error::EngineResult;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

// ==========================================
// Partition - 划分结果
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub valid: Vec<ValidatedRow>,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationError>,
    pub excluded: usize,
}

/// 按行结果划分（保持源文件顺序）
pub fn partition<I>(outcomes: I) -> Partition
where
    I: IntoIterator<Item = Result<ValidatedRow, Vec<ValidationError>>>,
{
    let mut out = Partition::default();
    for outcome in outcomes {
        match outcome {
            Ok(row) => {
                out.warnings.extend(row.warnings.iter().cloned());
                out.valid.push(row);
            }
            Err(errors) => {
                out.excluded += 1;
                out.errors.extend(errors);
            }
        }
    }
    out
}

// ==========================================
// Toast - 简短提示
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastVariant {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub variant: ToastVariant,
    pub title: String,
    pub body: String,
}

// ==========================================
// ReportArtifact - 可下载报告
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifact {
    pub file_name: String,
    pub contents: String,
}

fn truncated(errors: &[ValidationError], limit: usize, noun: &str) -> String {
    let mut lines: Vec<String> = errors.iter().take(limit).map(|e| e.to_string()).collect();
    if errors.len() > limit {
        lines.push(format!("... and {} more {}", errors.len() - limit, noun));
    }
    lines.join("\n")
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "{}", title);
    let _ = writeln!(out, "{}", "-".repeat(title.chars().count()));
}

fn numbered(out: &mut String, errors: &[ValidationError]) {
    for (i, error) in errors.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, error);
    }
    let _ = writeln!(out);
}

fn correction_tips(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Appointment => &[
            "Fill every required column: Client name, Phone 1, Service, Date/time, Postal code, Street, Number",
            "Postal codes use the format XXXXX-XXX (the hyphen is optional)",
            "Dates use YYYY-MM-DD HH:MM or DD/MM/YYYY HH:MM",
            "Service names must match a registered service (case is ignored)",
            "Status accepts Agendado, Em Andamento, Concluído or Cancelado",
            "Priority accepts Normal, Alta or Urgente",
            "The street number must contain digits only",
            "Clients are matched by Tax ID first, then by name; unknown clients are created automatically",
        ],
        EntityKind::Client => &[
            "Fill every required column: Name, Postal code, Street, Number",
            "Postal codes use the format XXXXX-XXX (the hyphen is optional)",
            "Tax IDs must have 11 digits (individual) or 14 digits (company)",
            "Each Tax ID may appear only once and must not belong to a registered client",
            "The street number must contain digits only",
        ],
    }
}

// ==========================================
// ReportBuilder
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct ReportBuilder {
    toast_limit: usize,
    server_toast_limit: usize,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new(3, 2)
    }
}

impl ReportBuilder {
    pub fn new(toast_limit: usize, server_toast_limit: usize) -> Self {
        Self {
            toast_limit,
            server_toast_limit,
        }
    }

    /// 提示消息: 本地错误 → 服务端错误 → 总结
    pub fn toasts(&self, result: &ImportResult) -> Vec<Toast> {
        let mut toasts = Vec::new();
        let collection = result.entity_kind.collection();

        if !result.errors.is_empty() {
            toasts.push(Toast {
                variant: ToastVariant::Warning,
                title: format!(
                    "{} of {} rows have errors",
                    result.error_count, result.total_lines
                ),
                body: truncated(&result.errors, self.toast_limit, "errors"),
            });
        }

        if !result.server_errors.is_empty() {
            toasts.push(Toast {
                variant: ToastVariant::Error,
                title: format!("{} {} rejected by the server", result.server_errors.len(), collection),
                body: truncated(&result.server_errors, self.server_toast_limit, "server errors"),
            });
        }

        let summary = if result.submitted {
            format!(
                "{} of {} {} imported ({:.1}%)",
                result.server_success,
                result.total_lines,
                collection,
                result.success_rate()
            )
        } else {
            format!("No valid {} to import", collection)
        };
        let (variant, title) = match result.outcome() {
            ReconcileOutcome::Success => (ToastVariant::Success, "Import completed"),
            ReconcileOutcome::Partial => {
                (ToastVariant::Warning, "Import partially completed")
            }
            ReconcileOutcome::Failed => (ToastVariant::Error, "Import failed"),
        };
        toasts.push(Toast {
            variant,
            title: title.to_string(),
            body: summary,
        });

        toasts
    }

    /// 完整文本报告
    pub fn render_text(&self, result: &ImportResult) -> String {
        let schema = ColumnSchema::for_kind(result.entity_kind);
        let mut out = String::new();

        let title = format!(
            "IMPORT REPORT - {}",
            result.entity_kind.collection().to_uppercase()
        );
        let _ = writeln!(out, "{}", title);
        let _ = writeln!(out, "{}", "=".repeat(title.chars().count()));
        let _ = writeln!(out, "Session: {}", result.session_id);
        let _ = writeln!(out, "Source: {}", result.source_name);
        let _ = writeln!(
            out,
            "Completed at: {}",
            result.completed_at.format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(out);

        section(&mut out, "SUMMARY");
        let _ = writeln!(out, "Total data rows: {}", result.total_lines);
        let _ = writeln!(out, "Valid rows: {}", result.valid_count);
        let _ = writeln!(out, "Rows with errors: {}", result.error_count);
        let _ = writeln!(out, "Submitted: {}", if result.submitted { "yes" } else { "no" });
        if result.submitted {
            let _ = writeln!(out, "Created: {}", result.server_success);
            let _ = writeln!(out, "Rejected by server: {}", result.server_errors.len());
        }
        let _ = writeln!(out, "Success rate: {:.1}%", result.success_rate());
        let _ = writeln!(out, "Outcome: {}", result.outcome());
        let _ = writeln!(out);

        if !result.errors.is_empty() {
            section(&mut out, &format!("ERRORS ({})", result.errors.len()));
            numbered(&mut out, &result.errors);
        }
        if !result.server_errors.is_empty() {
            section(&mut out, &format!("SERVER ERRORS ({})", result.server_errors.len()));
            numbered(&mut out, &result.server_errors);
        }
        if !result.warnings.is_empty() {
            section(&mut out, &format!("WARNINGS ({})", result.warnings.len()));
            numbered(&mut out, &result.warnings);
        }

        section(&mut out, "CORRECTION TIPS");
        for tip in correction_tips(result.entity_kind) {
            let _ = writeln!(out, "- {}", tip);
        }
        let _ = writeln!(out);

        section(&mut out, "COLUMN ORDER");
        for line in schema.contract_lines() {
            let _ = writeln!(out, "{}", line);
        }

        out
    }

    /// 机器可读报告
    pub fn render_json(&self, result: &ImportResult) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(result)?)
    }

    pub fn file_name(&self, result: &ImportResult) -> String {
        format!(
            "import_report_{}.txt",
            result.completed_at.format("%Y-%m-%d_%H%M%S")
        )
    }

    pub fn artifact(&self, result: &ImportResult) -> ReportArtifact {
        ReportArtifact {
            file_name: self.file_name(result),
            contents: self.render_text(result),
        }
    }
}
