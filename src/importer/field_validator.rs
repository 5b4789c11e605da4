// ==========================================
// 外勤运营平台 - 字段校验器
// ==========================================
// 职责: 按列定义对单行做必填校验与格式校验
// 规则:
// - 缺失的必填字段合并为一条消息，列出全部标签
// - 格式错误逐字段报告，消息包含字段名与原始值
// - 空状态默认 scheduled，空优先级默认 normal
// ==========================================

use crate::domain::{AppointmentStatus, Priority, ValidationError};
use crate::importer::column_schema::{BoundRow, ColumnSchema, FieldType};
use crate::importer::normalizer::Normalizer;
use chrono::{DateTime, FixedOffset};

// ==========================================
// CheckedFields - 通过格式校验的类型化字段
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedFields {
    pub tax_id: Option<String>, // 仅数字
    pub scheduled_at: Option<DateTime<FixedOffset>>,
    pub status: AppointmentStatus,
    pub priority: Priority,
}

impl Default for CheckedFields {
    fn default() -> Self {
        Self {
            tax_id: None,
            scheduled_at: None,
            status: AppointmentStatus::Scheduled,
            priority: Priority::Normal,
        }
    }
}

pub struct FieldValidator {
    normalizer: Normalizer,
}

impl FieldValidator {
    pub fn new(normalizer: Normalizer) -> Self {
        Self { normalizer }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// 必填校验（合并为单条 FieldMissing 错误）
    pub fn check_required(&self, schema: &ColumnSchema, row: &BoundRow) -> Option<ValidationError> {
        let missing: Vec<&str> = schema
            .required_columns()
            .filter(|c| row.text(c.key).is_none())
            .map(|c| c.label)
            .collect();

        if missing.is_empty() {
            None
        } else {
            Some(ValidationError::missing(row.line, &missing))
        }
    }

    /// 格式校验与规范化（仅校验非空字段）
    pub fn check_formats(
        &self,
        schema: &ColumnSchema,
        row: &BoundRow,
    ) -> Result<CheckedFields, Vec<ValidationError>> {
        let mut checked = CheckedFields::default();
        let mut errors = Vec::new();

        for column in schema.columns {
            let Some(raw) = row.text(column.key) else {
                continue;
            };

            let outcome = match column.field_type {
                FieldType::TaxId => self.normalizer.tax_id(raw).map(|v| {
                    checked.tax_id = Some(v);
                }),
                FieldType::PostalCode => self.normalizer.postal_code(raw).map(|_| ()),
                FieldType::StreetNumber => self.normalizer.street_number(raw).map(|_| ()),
                FieldType::DateTime => match self.normalizer.parse_datetime(raw) {
                    Ok(value) => {
                        checked.scheduled_at = Some(value);
                        Ok(())
                    }
                    Err(err) => Err(self.normalizer.date_error_message(raw, &err)),
                },
                FieldType::Status => self.normalizer.status(raw).map(|v| {
                    checked.status = v;
                }),
                FieldType::Priority => self.normalizer.priority(raw).map(|v| {
                    checked.priority = v;
                }),
                FieldType::Text | FieldType::Reference(_) => Ok(()),
            };

            if let Err(message) = outcome {
                errors.push(ValidationError::format(row.line, column.label, message));
            }
        }

        if errors.is_empty() {
            Ok(checked)
        } else {
            Err(errors)
        }
    }

    /// 必填 + 格式，收集全部错误
    pub fn validate(
        &self,
        schema: &ColumnSchema,
        row: &BoundRow,
    ) -> Result<CheckedFields, Vec<ValidationError>> {
        let missing = self.check_required(schema, row);
        match (missing, self.check_formats(schema, row)) {
            (None, Ok(checked)) => Ok(checked),
            (None, Err(errors)) => Err(errors),
            (Some(missing), Ok(_)) => Err(vec![missing]),
            (Some(missing), Err(mut errors)) => {
                errors.insert(0, missing);
                Err(errors)
            }
        }
    }
}
