// ==========================================
// 外勤运营平台 - 模板与导出
// ==========================================
// 模板: 表头 + 一行完整示例，列顺序与导入一致
// 导出: 同一表头与列顺序；预约导出带前置 ID 列
// 格式: 全部单元格加引号；状态/优先级输出葡语显示文本；
//       日期输出 DD/MM/YYYY HH:MM（按配置时区）
// ==========================================

use crate::domain::{AppointmentRecord, ClientRecord, EntityKind};
use crate::importer::column_schema::{ColumnSchema, EXPORT_ID_LABEL};
use crate::importer::error::{EngineResult, ImportError};
use crate::importer::reference_directory::ReferenceDirectory;
use chrono::FixedOffset;
use csv::{QuoteStyle, WriterBuilder};

fn write_csv<I, R>(records: I) -> EngineResult<String>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator,
    R::Item: AsRef<[u8]>,
{
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());
    for record in records {
        writer.write_record(record)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ImportError::Internal(format!("failed to flush CSV writer: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| ImportError::Internal(e.to_string()))
}

fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

/// 导入模板
pub fn render_template(kind: EntityKind) -> EngineResult<String> {
    let schema = ColumnSchema::for_kind(kind);
    write_csv([schema.header_row(), schema.example_row()])
}

/// 客户导出（列顺序与客户导入一致）
pub fn render_client_export(clients: &[ClientRecord]) -> EngineResult<String> {
    let header = ColumnSchema::for_kind(EntityKind::Client)
        .header_row()
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let rows = clients.iter().map(|c| {
        vec![
            c.name.clone(),
            opt(&c.tax_id),
            opt(&c.email),
            opt(&c.phone1),
            c.address.postal_code.clone(),
            opt(&c.address.district),
            opt(&c.address.city),
            c.address.street.clone(),
            c.address.number.clone(),
            opt(&c.phone2),
            opt(&c.address.complement),
            opt(&c.notes),
        ]
    });

    write_csv(std::iter::once(header).chain(rows))
}

/// 预约导出（前置 ID 列，可直接重新导入）
pub fn render_appointment_export(
    appointments: &[AppointmentRecord],
    directory: &ReferenceDirectory,
    offset: FixedOffset,
) -> EngineResult<String> {
    let mut header = vec![EXPORT_ID_LABEL.to_string()];
    header.extend(
        ColumnSchema::for_kind(EntityKind::Appointment)
            .header_row()
            .into_iter()
            .map(str::to_string),
    );

    let rows = appointments.iter().map(|a| {
        let client = directory.client(a.client_id);
        let client_field = |f: fn(&ClientRecord) -> &Option<String>| {
            client.map(|c| opt(f(c))).unwrap_or_default()
        };
        let assignee = a
            .technician_id
            .and_then(|id| directory.technician(id).map(|t| t.name.clone()))
            .or_else(|| {
                a.team_id
                    .and_then(|id| directory.team(id).map(|t| t.name.clone()))
            })
            .unwrap_or_default();

        vec![
            a.id.to_string(),
            client.map(|c| c.name.clone()).unwrap_or_default(),
            client_field(|c| &c.tax_id),
            client_field(|c| &c.email),
            client_field(|c| &c.phone1),
            client_field(|c| &c.phone2),
            directory
                .service(a.service_id)
                .map(|s| s.name.clone())
                .unwrap_or_default(),
            assignee,
            a.scheduled_at
                .with_timezone(&offset)
                .format("%d/%m/%Y %H:%M")
                .to_string(),
            a.status.display_text().to_string(),
            a.priority.display_text().to_string(),
            a.address.postal_code.clone(),
            opt(&a.address.district),
            opt(&a.address.city),
            a.address.street.clone(),
            a.address.number.clone(),
            opt(&a.address.complement),
            opt(&a.notes),
        ]
    });

    write_csv(std::iter::once(header).chain(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AddressFields, AppointmentStatus, Priority, ServiceRecord, TeamRecord};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_template_has_header_and_example() {
        let text = render_template(EntityKind::Appointment).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("\"Client name\",\"Tax ID\""));
        assert!(lines[1].contains("\"Instalação\""));
    }

    #[test]
    fn test_appointment_export_layout() {
        let client = ClientRecord {
            id: 1,
            name: "Ana Lima".to_string(),
            tax_id: Some("12345678909".to_string()),
            email: None,
            phone1: Some("(81) 99999-0000".to_string()),
            phone2: None,
            address: AddressFields::default(),
            notes: None,
        };
        let directory = ReferenceDirectory::new(
            vec![client],
            vec![ServiceRecord {
                id: 3,
                name: "Instalação".to_string(),
                duration_minutes: 60,
            }],
            vec![],
            vec![TeamRecord {
                id: 9,
                name: "Equipe Sul".to_string(),
            }],
        );
        let appointment = AppointmentRecord {
            id: 42,
            client_id: 1,
            service_id: 3,
            technician_id: None,
            team_id: Some(9),
            scheduled_at: Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap(),
            status: AppointmentStatus::Completed,
            priority: Priority::High,
            address: AddressFields {
                postal_code: "50000-000".to_string(),
                street: "Rua do Sol".to_string(),
                number: "10".to_string(),
                ..Default::default()
            },
            notes: None,
        };

        let offset = FixedOffset::west_opt(3 * 3600).unwrap();
        let text = render_appointment_export(&[appointment], &directory, offset).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("\"ID\",\"Client name\""));
        assert!(lines[1].starts_with("\"42\",\"Ana Lima\",\"12345678909\""));
        assert!(lines[1].contains("\"Equipe Sul\",\"15/03/2025 09:00\",\"Concluído\",\"Alta\""));
    }
}
