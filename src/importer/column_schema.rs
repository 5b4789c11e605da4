// ==========================================
// 外勤运营平台 - 列定义（Column Schema）
// ==========================================
// 职责: 每种导入实体的声明式列定义
//       (列序号 → 字段键 / 标签 / 类型 / 是否必填 / 模板示例值)
// 约束: 列顺序即契约，表头文字仅作提示
// ==========================================

use crate::domain::{EntityKind, ImportRow, ReferenceKind};
use crate::importer::error::{EngineResult, ImportError};
use std::collections::HashMap;

// ==========================================
// FieldKey - 字段键
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    ClientName,
    TaxId,
    Email,
    Phone1,
    Phone2,
    Service,
    Assignee, // 技术员或团队
    ScheduledAt,
    Status,
    Priority,
    PostalCode,
    District,
    City,
    Street,
    Number,
    Complement,
    Notes,
}

// ==========================================
// FieldType - 字段类型（决定校验/规范化规则）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    TaxId,
    PostalCode,
    StreetNumber,
    DateTime,
    Status,
    Priority,
    Reference(ReferenceKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub index: usize,
    pub key: FieldKey,
    pub label: &'static str,
    pub field_type: FieldType,
    pub required: bool,
    pub example: &'static str,
}

impl ColumnSpec {
    const fn new(
        index: usize,
        key: FieldKey,
        label: &'static str,
        field_type: FieldType,
        required: bool,
        example: &'static str,
    ) -> Self {
        Self {
            index,
            key,
            label,
            field_type,
            required,
            example,
        }
    }
}

// ==========================================
// 预约导入（17 列）
// ==========================================
static APPOINTMENT_COLUMNS: [ColumnSpec; 17] = [
    ColumnSpec::new(0, FieldKey::ClientName, "Client name", FieldType::Reference(ReferenceKind::Client), true, "Maria Souza"),
    ColumnSpec::new(1, FieldKey::TaxId, "Tax ID", FieldType::TaxId, false, "123.456.789-09"),
    ColumnSpec::new(2, FieldKey::Email, "Email", FieldType::Text, false, "maria.souza@email.com"),
    ColumnSpec::new(3, FieldKey::Phone1, "Phone 1", FieldType::Text, true, "(11) 98765-4321"),
    ColumnSpec::new(4, FieldKey::Phone2, "Phone 2", FieldType::Text, false, "(11) 3456-7890"),
    ColumnSpec::new(5, FieldKey::Service, "Service", FieldType::Reference(ReferenceKind::Service), true, "Instalação"),
    ColumnSpec::new(6, FieldKey::Assignee, "Technician/Team", FieldType::Reference(ReferenceKind::Technician), false, "João Silva"),
    ColumnSpec::new(7, FieldKey::ScheduledAt, "Date/time", FieldType::DateTime, true, "2025-03-15 09:00"),
    ColumnSpec::new(8, FieldKey::Status, "Status", FieldType::Status, false, "Agendado"),
    ColumnSpec::new(9, FieldKey::Priority, "Priority", FieldType::Priority, false, "Normal"),
    ColumnSpec::new(10, FieldKey::PostalCode, "Postal code", FieldType::PostalCode, true, "01234-567"),
    ColumnSpec::new(11, FieldKey::District, "District", FieldType::Text, false, "Centro"),
    ColumnSpec::new(12, FieldKey::City, "City", FieldType::Text, false, "São Paulo"),
    ColumnSpec::new(13, FieldKey::Street, "Street", FieldType::Text, true, "Rua das Flores"),
    ColumnSpec::new(14, FieldKey::Number, "Number", FieldType::StreetNumber, true, "123"),
    ColumnSpec::new(15, FieldKey::Complement, "Complement", FieldType::Text, false, "Apto 45"),
    ColumnSpec::new(16, FieldKey::Notes, "Notes", FieldType::Text, false, "Levar escada"),
];

// ==========================================
// 客户导入（12 列）
// ==========================================
static CLIENT_COLUMNS: [ColumnSpec; 12] = [
    ColumnSpec::new(0, FieldKey::ClientName, "Name", FieldType::Text, true, "Maria Souza"),
    ColumnSpec::new(1, FieldKey::TaxId, "Tax ID", FieldType::TaxId, false, "123.456.789-09"),
    ColumnSpec::new(2, FieldKey::Email, "Email", FieldType::Text, false, "maria.souza@email.com"),
    ColumnSpec::new(3, FieldKey::Phone1, "Phone 1", FieldType::Text, false, "(11) 98765-4321"),
    ColumnSpec::new(4, FieldKey::PostalCode, "Postal code", FieldType::PostalCode, true, "01234-567"),
    ColumnSpec::new(5, FieldKey::District, "District", FieldType::Text, false, "Centro"),
    ColumnSpec::new(6, FieldKey::City, "City", FieldType::Text, false, "São Paulo"),
    ColumnSpec::new(7, FieldKey::Street, "Street", FieldType::Text, true, "Rua das Flores"),
    ColumnSpec::new(8, FieldKey::Number, "Number", FieldType::StreetNumber, true, "123"),
    ColumnSpec::new(9, FieldKey::Phone2, "Phone 2", FieldType::Text, false, "(11) 3456-7890"),
    ColumnSpec::new(10, FieldKey::Complement, "Complement", FieldType::Text, false, "Apto 45"),
    ColumnSpec::new(11, FieldKey::Notes, "Notes", FieldType::Text, false, "Cliente preferencial"),
];

static APPOINTMENT_SCHEMA: ColumnSchema = ColumnSchema {
    kind: EntityKind::Appointment,
    columns: &APPOINTMENT_COLUMNS,
};

static CLIENT_SCHEMA: ColumnSchema = ColumnSchema {
    kind: EntityKind::Client,
    columns: &CLIENT_COLUMNS,
};

/// 导出文件额外的首列标签
pub const EXPORT_ID_LABEL: &str = "ID";

// ==========================================
// ColumnSchema
// ==========================================
#[derive(Debug)]
pub struct ColumnSchema {
    pub kind: EntityKind,
    pub columns: &'static [ColumnSpec],
}

impl ColumnSchema {
    pub fn for_kind(kind: EntityKind) -> &'static ColumnSchema {
        match kind {
            EntityKind::Appointment => &APPOINTMENT_SCHEMA,
            EntityKind::Client => &CLIENT_SCHEMA,
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn spec(&self, key: FieldKey) -> Option<&'static ColumnSpec> {
        self.columns.iter().find(|c| c.key == key)
    }

    /// 字段标签（不在本 schema 中的字段返回空串）
    pub fn label(&self, key: FieldKey) -> &'static str {
        self.spec(key).map(|c| c.label).unwrap_or("")
    }

    pub fn header_row(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.label).collect()
    }

    pub fn example_row(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.example).collect()
    }

    pub fn required_columns(&self) -> impl Iterator<Item = &'static ColumnSpec> {
        self.columns.iter().filter(|c| c.required)
    }

    /// 校验表头列数，返回数据列起始偏移
    ///
    /// - 列数不足 → 结构错误
    /// - 恰好多出一列且首列为 `ID`（导出文件）→ 偏移 1
    pub fn header_offset(&self, header: &[String]) -> EngineResult<usize> {
        if header.len() < self.len() {
            return Err(ImportError::Structural(format!(
                "header has {} columns but {} import requires {}",
                header.len(),
                self.kind,
                self.len()
            )));
        }

        let leading_id = header
            .first()
            .map(|h| h.eq_ignore_ascii_case(EXPORT_ID_LABEL))
            .unwrap_or(false);
        if header.len() == self.len() + 1 && leading_id {
            Ok(1)
        } else {
            Ok(0)
        }
    }

    /// 按列序号绑定字段值（短行补空，多余单元格忽略）
    pub fn bind(&self, row: &ImportRow, offset: usize) -> BoundRow {
        let values = self
            .columns
            .iter()
            .map(|c| {
                let value = row.cells.get(offset + c.index).cloned().unwrap_or_default();
                (c.key, value)
            })
            .collect();

        BoundRow {
            line: row.line,
            values,
        }
    }

    /// 列契约说明（报告末尾附带）
    pub fn contract_lines(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| {
                if c.required {
                    format!("{}. {} (required)", c.index + 1, c.label)
                } else {
                    format!("{}. {}", c.index + 1, c.label)
                }
            })
            .collect()
    }
}

// ==========================================
// BoundRow - 已绑定字段键的数据行
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundRow {
    pub line: usize,
    values: HashMap<FieldKey, String>,
}

impl BoundRow {
    /// 非空值（空串视为缺失）
    pub fn text(&self, key: FieldKey) -> Option<&str> {
        self.values
            .get(&key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn owned(&self, key: FieldKey) -> Option<String> {
        self.text(key).map(str::to_string)
    }

    /// 以已存储记录的值覆盖行内值
    pub fn overlay(&mut self, key: FieldKey, value: Option<&str>) {
        self.values
            .insert(key, value.map(str::to_string).unwrap_or_default());
    }
}
