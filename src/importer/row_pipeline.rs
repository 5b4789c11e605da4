// ==========================================
// 外勤运营平台 - 行处理管道
// ==========================================
// 职责: 单行 → Result<ValidatedRow, Vec<ValidationError>>
// 顺序: 绑定列 → 解析客户（可补全/覆盖字段）→ 必填与格式校验
//       → 服务/技术员/团队查找 → 组装
// 说明:
// - 证件号命中已存在客户时，以存储记录的名称与地址为准
// - 名称命中或复用草稿时，仅补全行内缺失字段
// - 技术员/团队未命中仅产生警告，不排除该行
// ==========================================

use crate::domain::{
    AddressFields, AppointmentDraft, ClientFields, ClientRecord, EntityKind, ImportRow,
    MatchedBy, ReferenceKind, ValidatedEntity, ValidatedRow, ValidationError,
};
use crate::importer::column_schema::{BoundRow, ColumnSchema, FieldKey};
use crate::importer::entity_resolver::{ClientMatch, EntityResolver};
use crate::importer::field_validator::FieldValidator;
use crate::importer::import_engine_trait::LookupService;
use tracing::debug;

/// 内联创建客户的备注
const INLINE_CLIENT_NOTE: &str = "Created automatically by bulk appointment import";

pub struct RowPipeline<'a> {
    schema: &'static ColumnSchema,
    offset: usize,
    validator: &'a FieldValidator,
    resolver: EntityResolver<'a>,
}

impl<'a> RowPipeline<'a> {
    pub fn new(
        schema: &'static ColumnSchema,
        offset: usize,
        validator: &'a FieldValidator,
        lookup: &'a dyn LookupService,
    ) -> Self {
        Self {
            schema,
            offset,
            validator,
            resolver: EntityResolver::new(lookup),
        }
    }

    pub fn process(&mut self, row: &ImportRow) -> Result<ValidatedRow, Vec<ValidationError>> {
        let bound = self.schema.bind(row, self.offset);
        match self.schema.kind {
            EntityKind::Appointment => self.process_appointment(bound),
            EntityKind::Client => self.process_client(bound),
        }
    }

    fn normalized_tax_id(&self, row: &BoundRow) -> Option<String> {
        row.text(FieldKey::TaxId)
            .and_then(|raw| self.validator.normalizer().tax_id(raw).ok())
    }

    // ==========================================
    // 预约行
    // ==========================================
    fn process_appointment(
        &mut self,
        mut row: BoundRow,
    ) -> Result<ValidatedRow, Vec<ValidationError>> {
        let line = row.line;

        // 客户解析先于校验：已存在客户的数据可满足必填字段
        let tax_id = self.normalized_tax_id(&row);
        let client_match = self
            .resolver
            .resolve_client(tax_id.as_deref(), row.text(FieldKey::ClientName));
        match &client_match {
            ClientMatch::Existing { entity, record } if entity.matched_by == MatchedBy::Key => {
                debug!(line = line, client_id = record.id, "证件号命中，使用存储的客户名称与地址");
                apply_stored_client(&mut row, record, true);
            }
            ClientMatch::Existing { record, .. } => apply_stored_client(&mut row, record, false),
            ClientMatch::Draft(entity) => {
                if let Some(fields) = &entity.source_fields {
                    fill_from_draft(&mut row, fields);
                }
            }
            ClientMatch::Unmatched => {}
        }

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let checked = match self.validator.validate(self.schema, &row) {
            Ok(checked) => Some(checked),
            Err(found) => {
                errors.extend(found);
                None
            }
        };

        let service_label = self.schema.label(FieldKey::Service);
        let service = row.text(FieldKey::Service).and_then(|name| {
            let resolved = self.resolver.resolve_service(name);
            if resolved.is_none() {
                errors.push(ValidationError::lookup(
                    line,
                    service_label,
                    format!("Service \"{}\" not found", name),
                ));
            }
            resolved
        });

        let assignee_label = self.schema.label(FieldKey::Assignee);
        let assignee = row.text(FieldKey::Assignee).and_then(|name| {
            let resolved = self.resolver.resolve_assignee(name);
            if resolved.is_none() {
                warnings.push(ValidationError::lookup(
                    line,
                    assignee_label,
                    format!(
                        "Technician or team \"{}\" not found; appointment left unassigned",
                        name
                    ),
                ));
            }
            resolved
        });

        let (checked, service) = match (checked, service) {
            (Some(checked), Some(service)) if errors.is_empty() => (checked, service),
            _ => return Err(errors),
        };
        let Some(scheduled_at) = checked.scheduled_at else {
            let label = self.schema.label(FieldKey::ScheduledAt);
            return Err(vec![ValidationError::missing(line, &[label])]);
        };

        let client = match client_match {
            ClientMatch::Existing { entity, .. } | ClientMatch::Draft(entity) => entity,
            ClientMatch::Unmatched => {
                let mut fields = client_fields(&row, checked.tax_id.clone());
                fields.notes = Some(INLINE_CLIENT_NOTE.to_string());
                self.resolver.register_draft(fields)
            }
        };

        let (technician, team) = match assignee {
            Some(a) if a.kind == ReferenceKind::Team => (None, Some(a)),
            Some(a) => (Some(a), None),
            None => (None, None),
        };

        Ok(ValidatedRow {
            line,
            entity: ValidatedEntity::Appointment(AppointmentDraft {
                client,
                service,
                technician,
                team,
                scheduled_at,
                status: checked.status,
                priority: checked.priority,
                address: address_fields(&row),
                notes: row.owned(FieldKey::Notes),
            }),
            warnings,
        })
    }

    // ==========================================
    // 客户行
    // ==========================================
    fn process_client(&mut self, row: BoundRow) -> Result<ValidatedRow, Vec<ValidationError>> {
        let line = row.line;
        let mut errors = Vec::new();

        let checked = match self.validator.validate(self.schema, &row) {
            Ok(checked) => Some(checked),
            Err(found) => {
                errors.extend(found);
                None
            }
        };

        let tax_id = self.normalized_tax_id(&row);
        if let Some(tax_id) = &tax_id {
            let label = self.schema.label(FieldKey::TaxId);
            if let Some(duplicate) = self.resolver.check_client_duplicate(tax_id, line, label) {
                errors.push(duplicate);
            }
        }

        match checked {
            Some(checked) if errors.is_empty() => {
                if let Some(tax_id) = &checked.tax_id {
                    self.resolver.mark_client_seen(tax_id, line);
                }
                let mut fields = client_fields(&row, checked.tax_id);
                fields.notes = row.owned(FieldKey::Notes);
                Ok(ValidatedRow {
                    line,
                    entity: ValidatedEntity::Client(fields),
                    warnings: Vec::new(),
                })
            }
            _ => Err(errors),
        }
    }
}

// ==========================================
// 字段组装辅助
// ==========================================

fn address_fields(row: &BoundRow) -> AddressFields {
    AddressFields {
        postal_code: row.owned(FieldKey::PostalCode).unwrap_or_default(),
        street: row.owned(FieldKey::Street).unwrap_or_default(),
        number: row.owned(FieldKey::Number).unwrap_or_default(),
        complement: row.owned(FieldKey::Complement),
        district: row.owned(FieldKey::District),
        city: row.owned(FieldKey::City),
    }
}

fn client_fields(row: &BoundRow, tax_id: Option<String>) -> ClientFields {
    ClientFields {
        name: row.owned(FieldKey::ClientName).unwrap_or_default(),
        tax_id,
        email: row.owned(FieldKey::Email),
        phone1: row.owned(FieldKey::Phone1),
        phone2: row.owned(FieldKey::Phone2),
        address: address_fields(row),
        notes: None,
    }
}

/// 用存储的客户记录补全（override = true 时覆盖名称与地址）
fn apply_stored_client(row: &mut BoundRow, record: &ClientRecord, override_row: bool) {
    let identity = [
        (FieldKey::ClientName, Some(record.name.as_str())),
        (FieldKey::PostalCode, Some(record.address.postal_code.as_str())),
        (FieldKey::Street, Some(record.address.street.as_str())),
        (FieldKey::Number, Some(record.address.number.as_str())),
        (FieldKey::Complement, record.address.complement.as_deref()),
        (FieldKey::District, record.address.district.as_deref()),
        (FieldKey::City, record.address.city.as_deref()),
    ];
    for (key, value) in identity {
        if override_row || row.text(key).is_none() {
            row.overlay(key, value);
        }
    }

    let contact = [
        (FieldKey::Email, record.email.as_deref()),
        (FieldKey::Phone1, record.phone1.as_deref()),
        (FieldKey::Phone2, record.phone2.as_deref()),
    ];
    for (key, value) in contact {
        if row.text(key).is_none() {
            row.overlay(key, value);
        }
    }
}

fn fill_from_draft(row: &mut BoundRow, fields: &ClientFields) {
    let values = [
        (FieldKey::Email, fields.email.as_deref()),
        (FieldKey::Phone1, fields.phone1.as_deref()),
        (FieldKey::Phone2, fields.phone2.as_deref()),
        (FieldKey::PostalCode, Some(fields.address.postal_code.as_str())),
        (FieldKey::Street, Some(fields.address.street.as_str())),
        (FieldKey::Number, Some(fields.address.number.as_str())),
    ];
    for (key, value) in values {
        if row.text(key).is_none() {
            row.overlay(key, value);
        }
    }
}
