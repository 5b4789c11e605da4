// ==========================================
// 外勤运营平台 - 已存储实体
// ==========================================
// 职责: 查找服务 / 本地存储返回的实体记录
// 说明: 地址字段在线上格式中沿用后端字段名（cep/logradouro/...）
// ==========================================

use crate::domain::types::{AppointmentStatus, Priority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// AddressFields - 地址字段组
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressFields {
    #[serde(rename = "cep")]
    pub postal_code: String,
    #[serde(rename = "logradouro")]
    pub street: String,
    #[serde(rename = "numero")]
    pub number: String,
    #[serde(rename = "complemento", default, skip_serializing_if = "Option::is_none")]
    pub complement: Option<String>,
    #[serde(rename = "bairro", default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(rename = "cidade", default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

// ==========================================
// ClientRecord - 客户
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: i64,
    pub name: String,
    pub tax_id: Option<String>, // 仅数字
    pub email: Option<String>,
    pub phone1: Option<String>,
    pub phone2: Option<String>,
    pub address: AddressFields,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: i64,
    pub name: String,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnicianRecord {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub id: i64,
    pub name: String,
}

// ==========================================
// AppointmentRecord - 预约（导出使用）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRecord {
    pub id: i64,
    pub client_id: i64,
    pub service_id: i64,
    pub technician_id: Option<i64>,
    pub team_id: Option<i64>,
    pub scheduled_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub priority: Priority,
    pub address: AddressFields,
    pub notes: Option<String>,
}
