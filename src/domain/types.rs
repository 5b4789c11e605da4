// ==========================================
// 外勤运营平台 - 领域类型定义
// ==========================================
// 职责: 导入引擎使用的枚举（实体类型/状态/优先级/错误分类/会话阶段）
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 导入实体类型 (Entity Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Appointment,
    Client,
}

impl EntityKind {
    /// 批量接口中的集合名（URL 路径段 / 请求体键）
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Appointment => "appointments",
            EntityKind::Client => "clients",
        }
    }

    /// 从命令行 / 配置文本解析
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "appointment" | "appointments" | "agendamento" | "agendamentos" => {
                Some(EntityKind::Appointment)
            }
            "client" | "clients" | "cliente" | "clientes" => Some(EntityKind::Client),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Appointment => write!(f, "appointment"),
            EntityKind::Client => write!(f, "client"),
        }
    }
}

// ==========================================
// 预约状态 (Appointment Status)
// ==========================================
// 规范值与后端一致: scheduled / in_progress / completed / cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 4] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::InProgress,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    /// 面向操作员的显示文本（导出使用，可被重新导入）
    pub fn display_text(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "Agendado",
            AppointmentStatus::InProgress => "Em Andamento",
            AppointmentStatus::Completed => "Concluído",
            AppointmentStatus::Cancelled => "Cancelado",
        }
    }

    pub fn from_canonical(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == raw)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 优先级 (Priority)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Normal, Priority::High, Priority::Urgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn display_text(&self) -> &'static str {
        match self {
            Priority::Normal => "Normal",
            Priority::High => "Alta",
            Priority::Urgent => "Urgente",
        }
    }

    pub fn from_canonical(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == raw)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 引用实体类型 (Reference Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Client,
    Service,
    Technician,
    Team,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::Client => write!(f, "client"),
            ReferenceKind::Service => write!(f, "service"),
            ReferenceKind::Technician => write!(f, "technician"),
            ReferenceKind::Team => write!(f, "team"),
        }
    }
}

// ==========================================
// 匹配方式 (Matched By)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchedBy {
    Key,     // 证件号精确匹配
    Name,    // 名称（忽略大小写）匹配
    Created, // 随提交一起创建
}

// ==========================================
// 行级错误分类 (Error Kind)
// ==========================================
// 结构错误不在此列: 它走 ImportError::Structural 并中止整批
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FieldMissing,
    Format,
    Lookup,
    Duplicate,
    ServerValidation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::FieldMissing => write!(f, "FIELD_MISSING"),
            ErrorKind::Format => write!(f, "FORMAT"),
            ErrorKind::Lookup => write!(f, "LOOKUP"),
            ErrorKind::Duplicate => write!(f, "DUPLICATE"),
            ErrorKind::ServerValidation => write!(f, "SERVER_VALIDATION"),
        }
    }
}

// ==========================================
// 对账结果 (Reconcile Outcome)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconcileOutcome {
    Success,
    Partial,
    Failed,
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileOutcome::Success => write!(f, "SUCCESS"),
            ReconcileOutcome::Partial => write!(f, "PARTIAL"),
            ReconcileOutcome::Failed => write!(f, "FAILED"),
        }
    }
}

// ==========================================
// 导入会话阶段 (Import Phase)
// ==========================================
// Idle → Parsed → RowValidated → Submitting → Reconciled → Idle
// 终态: Aborted（结构错误）/ Reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportPhase {
    Idle,
    Parsed,
    RowValidated,
    Submitting,
    Reconciled(ReconcileOutcome),
    Aborted,
}

impl ImportPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportPhase::Reconciled(_) | ImportPhase::Aborted)
    }
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportPhase::Idle => write!(f, "IDLE"),
            ImportPhase::Parsed => write!(f, "PARSED"),
            ImportPhase::RowValidated => write!(f, "ROW_VALIDATED"),
            ImportPhase::Submitting => write!(f, "SUBMITTING"),
            ImportPhase::Reconciled(outcome) => write!(f, "RECONCILED({})", outcome),
            ImportPhase::Aborted => write!(f, "ABORTED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_parse() {
        assert_eq!(EntityKind::parse("Appointment"), Some(EntityKind::Appointment));
        assert_eq!(EntityKind::parse("clientes"), Some(EntityKind::Client));
        assert_eq!(EntityKind::parse("vehicle"), None);
    }

    #[test]
    fn test_status_serde_matches_canonical() {
        let json = serde_json::to_string(&AppointmentStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert_eq!(
            AppointmentStatus::from_canonical("cancelled"),
            Some(AppointmentStatus::Cancelled)
        );
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(
            ImportPhase::Reconciled(ReconcileOutcome::Partial).to_string(),
            "RECONCILED(PARTIAL)"
        );
        assert!(ImportPhase::Aborted.is_terminal());
        assert!(!ImportPhase::Submitting.is_terminal());
    }
}
