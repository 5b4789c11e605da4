// ==========================================
// 外勤运营平台 - SQLite 本地存储
// ==========================================
// 职责:
// - 引用实体读写（客户/服务/技术员/团队/预约）
// - 加载 ReferenceDirectory 作为查找服务快照
// - 实现 BulkCreateEndpoint：逐条独立事务，返回逐条结果
// 规则（预约）:
// - 携带 clientData 的条目先创建草稿客户，再创建预约（同一事务）
// - 同一 draft_key 的后续条目复用已创建的客户
// 红线: 不含导入校验逻辑
// ==========================================

use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::{
    AddressFields, AppointmentPayload, AppointmentRecord, AppointmentStatus, BulkCreateResponse,
    ClientFields, ClientRecord, EntityKind, EntityPayload, ItemStatus, Priority, ProcessedItem,
    ServiceRecord, TeamRecord, TechnicianRecord,
};
use crate::importer::error::EngineResult;
use crate::importer::import_engine_trait::BulkCreateEndpoint;
use crate::importer::reference_directory::ReferenceDirectory;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

const CLIENT_COLUMNS: &str = "id, name, tax_id, email, phone1, phone2, postal_code, street, \
                              number, complement, district, city, notes";

fn map_client(row: &Row) -> rusqlite::Result<ClientRecord> {
    Ok(ClientRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        tax_id: row.get(2)?,
        email: row.get(3)?,
        phone1: row.get(4)?,
        phone2: row.get(5)?,
        address: AddressFields {
            postal_code: row.get(6)?,
            street: row.get(7)?,
            number: row.get(8)?,
            complement: row.get(9)?,
            district: row.get(10)?,
            city: row.get(11)?,
        },
        notes: row.get(12)?,
    })
}

// ==========================================
// SeedSummary - 演示数据写入统计
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub services: usize,
    pub technicians: usize,
    pub teams: usize,
    pub clients: usize,
}

// ==========================================
// SqliteStore
// ==========================================
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// 打开（必要时创建）数据库并初始化 schema
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn open(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 复用已有连接（与 ConfigManager 共享）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            init_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ===== 写入 =====

    pub fn insert_client(&self, fields: &ClientFields) -> RepositoryResult<i64> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let id = insert_client_tx(&tx, fields)?;
        tx.commit()?;
        Ok(id)
    }

    pub fn insert_service(&self, name: &str, duration_minutes: i64) -> RepositoryResult<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO services (name, duration_minutes) VALUES (?1, ?2)",
            params![name, duration_minutes],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_technician(&self, name: &str) -> RepositoryResult<i64> {
        let conn = self.lock()?;
        conn.execute("INSERT INTO technicians (name) VALUES (?1)", params![name])?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_team(&self, name: &str) -> RepositoryResult<i64> {
        let conn = self.lock()?;
        conn.execute("INSERT INTO teams (name) VALUES (?1)", params![name])?;
        Ok(conn.last_insert_rowid())
    }

    // ===== 查询 =====

    pub fn list_clients(&self) -> RepositoryResult<Vec<ClientRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM clients ORDER BY id",
            CLIENT_COLUMNS
        ))?;
        let clients = stmt
            .query_map([], map_client)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(clients)
    }

    pub fn list_services(&self) -> RepositoryResult<Vec<ServiceRecord>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, name, duration_minutes FROM services ORDER BY id")?;
        let services = stmt
            .query_map([], |row| {
                Ok(ServiceRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    duration_minutes: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(services)
    }

    pub fn list_technicians(&self) -> RepositoryResult<Vec<TechnicianRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, name FROM technicians ORDER BY id")?;
        let technicians = stmt
            .query_map([], |row| {
                Ok(TechnicianRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(technicians)
    }

    pub fn list_teams(&self) -> RepositoryResult<Vec<TeamRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, name FROM teams ORDER BY id")?;
        let teams = stmt
            .query_map([], |row| {
                Ok(TeamRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(teams)
    }

    pub fn list_appointments(&self) -> RepositoryResult<Vec<AppointmentRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, client_id, service_id, technician_id, team_id, scheduled_date,
                   status, priority, postal_code, street, number, complement,
                   district, city, notes
            FROM appointments
            ORDER BY id
            "#,
        )?;

        // 先读原始值，再做枚举/日期转换
        type RawAppointment = (AppointmentRecord, String, String, String);
        let raw: Vec<RawAppointment> = stmt
            .query_map([], |row| {
                let record = AppointmentRecord {
                    id: row.get(0)?,
                    client_id: row.get(1)?,
                    service_id: row.get(2)?,
                    technician_id: row.get(3)?,
                    team_id: row.get(4)?,
                    scheduled_at: DateTime::<Utc>::MIN_UTC,
                    status: AppointmentStatus::Scheduled,
                    priority: Priority::Normal,
                    address: AddressFields {
                        postal_code: row.get(8)?,
                        street: row.get(9)?,
                        number: row.get(10)?,
                        complement: row.get(11)?,
                        district: row.get(12)?,
                        city: row.get(13)?,
                    },
                    notes: row.get(14)?,
                };
                Ok((record, row.get(5)?, row.get(6)?, row.get(7)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(mut record, scheduled, status, priority)| -> RepositoryResult<AppointmentRecord> {
                record.scheduled_at = DateTime::parse_from_rfc3339(&scheduled)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| RepositoryError::FieldValueError {
                        field: "scheduled_date".to_string(),
                        message: format!("{} ({})", e, scheduled),
                    })?;
                record.status = AppointmentStatus::from_canonical(&status).ok_or_else(|| {
                    RepositoryError::FieldValueError {
                        field: "status".to_string(),
                        message: status.clone(),
                    }
                })?;
                record.priority = Priority::from_canonical(&priority).ok_or_else(|| {
                    RepositoryError::FieldValueError {
                        field: "priority".to_string(),
                        message: priority.clone(),
                    }
                })?;
                Ok(record)
            })
            .collect()
    }

    /// 加载查找服务快照
    pub fn load_directory(&self) -> RepositoryResult<ReferenceDirectory> {
        let directory = ReferenceDirectory::new(
            self.list_clients()?,
            self.list_services()?,
            self.list_technicians()?,
            self.list_teams()?,
        );
        debug!(
            clients = directory.clients().len(),
            services = directory.services().len(),
            "引用目录已加载"
        );
        Ok(directory)
    }

    /// 写入演示数据（各表为空时才写入）
    pub fn seed_demo(&self) -> RepositoryResult<SeedSummary> {
        let mut summary = SeedSummary::default();
        let count = |table: &str| -> RepositoryResult<i64> {
            let conn = self.lock()?;
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
            Ok(n)
        };

        if count("services")? == 0 {
            for (name, minutes) in [
                ("Instalação", 120),
                ("Manutenção", 90),
                ("Visita técnica", 60),
                ("Limpeza", 60),
            ] {
                self.insert_service(name, minutes)?;
                summary.services += 1;
            }
        }
        if count("technicians")? == 0 {
            for name in ["João Silva", "Carla Mendes", "Rafael Costa"] {
                self.insert_technician(name)?;
                summary.technicians += 1;
            }
        }
        if count("teams")? == 0 {
            for name in ["Equipe Norte", "Equipe Sul"] {
                self.insert_team(name)?;
                summary.teams += 1;
            }
        }
        if count("clients")? == 0 {
            let demo = [
                ("Ana Lima", Some("52998224725"), "50030-230", "Rua do Sol", "10", "Recife"),
                ("Condomínio Solar", Some("11222333000181"), "01310-100", "Avenida Paulista", "1578", "São Paulo"),
                ("Pedro Alves", None, "30130-010", "Rua da Bahia", "845", "Belo Horizonte"),
            ];
            for (name, tax_id, postal_code, street, number, city) in demo {
                self.insert_client(&ClientFields {
                    name: name.to_string(),
                    tax_id: tax_id.map(str::to_string),
                    phone1: Some("(11) 90000-0000".to_string()),
                    address: AddressFields {
                        postal_code: postal_code.to_string(),
                        street: street.to_string(),
                        number: number.to_string(),
                        city: Some(city.to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                })?;
                summary.clients += 1;
            }
        }

        info!(?summary, "演示数据写入完成");
        Ok(summary)
    }

    // ===== 批量创建 =====

    fn bulk_create_blocking(
        &self,
        kind: EntityKind,
        items: &[EntityPayload],
    ) -> RepositoryResult<BulkCreateResponse> {
        let mut conn = self.lock()?;
        let mut response = BulkCreateResponse::default();
        let mut draft_clients: HashMap<String, i64> = HashMap::new();

        for (pos, item) in items.iter().enumerate() {
            let index = pos + 1;
            let tx = conn.transaction()?;

            let outcome = match item {
                EntityPayload::Appointment(payload) => {
                    create_appointment_tx(&tx, payload, &draft_clients)
                }
                EntityPayload::Client(fields) => insert_client_tx(&tx, fields).map(|id| (id, None)),
            };

            match outcome {
                Ok((id, created_client)) => {
                    tx.commit()?;
                    if let Some((key, client_id)) = created_client {
                        draft_clients.insert(key, client_id);
                    }
                    response.success += 1;
                    response.processed_items.push(ProcessedItem {
                        index,
                        status: ItemStatus::Success,
                        error: None,
                        data: Some(serde_json::json!({ "id": id })),
                    });
                }
                Err(err) => {
                    // tx 未提交，drop 时回滚
                    drop(tx);
                    let message = format!("Item {}: {}", index, describe(&err, item));
                    warn!(kind = %kind, index = index, error = %err, "条目创建失败");
                    response.errors += 1;
                    response.detailed_errors.push(message.clone());
                    response.processed_items.push(ProcessedItem {
                        index,
                        status: ItemStatus::Error,
                        error: Some(message),
                        data: None,
                    });
                }
            }
        }

        info!(
            kind = %kind,
            success = response.success,
            errors = response.errors,
            "本地批量创建完成"
        );
        Ok(response)
    }
}

#[async_trait]
impl BulkCreateEndpoint for SqliteStore {
    async fn bulk_create(
        &self,
        kind: EntityKind,
        items: Vec<EntityPayload>,
    ) -> EngineResult<BulkCreateResponse> {
        Ok(self.bulk_create_blocking(kind, &items)?)
    }
}

// ==========================================
// 事务内操作
// ==========================================

fn insert_client_tx(tx: &Transaction, fields: &ClientFields) -> RepositoryResult<i64> {
    tx.execute(
        r#"
        INSERT INTO clients (
            name, tax_id, email, phone1, phone2, postal_code, street, number,
            complement, district, city, notes
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        params![
            fields.name,
            fields.tax_id,
            fields.email,
            fields.phone1,
            fields.phone2,
            fields.address.postal_code,
            fields.address.street,
            fields.address.number,
            fields.address.complement,
            fields.address.district,
            fields.address.city,
            fields.notes,
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

fn exists(tx: &Transaction, table: &str, id: i64) -> RepositoryResult<bool> {
    Ok(tx
        .query_row(
            &format!("SELECT 1 FROM {} WHERE id = ?1", table),
            params![id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn require(tx: &Transaction, table: &str, entity: &str, id: i64) -> RepositoryResult<()> {
    if exists(tx, table, id)? {
        Ok(())
    } else {
        Err(RepositoryError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        })
    }
}

/// 解析预约的客户 id；返回值第二项为本条新建的草稿客户
fn resolve_client_tx(
    tx: &Transaction,
    payload: &AppointmentPayload,
    draft_clients: &HashMap<String, i64>,
) -> RepositoryResult<(i64, Option<(String, i64)>)> {
    if let Some(id) = payload.client_id {
        require(tx, "clients", "Client", id)?;
        return Ok((id, None));
    }

    if let Some(id) = payload
        .client_draft_key
        .as_ref()
        .and_then(|key| draft_clients.get(key))
    {
        return Ok((*id, None));
    }

    let fields = payload.client_data.as_ref().ok_or_else(|| RepositoryError::FieldValueError {
        field: "clientData".to_string(),
        message: format!(
            "client draft {} was not created",
            payload.client_draft_key.as_deref().unwrap_or("(none)")
        ),
    })?;

    // 证件号已存在时复用存储的客户
    let existing: Option<i64> = match &fields.tax_id {
        Some(tax_id) => tx
            .query_row(
                "SELECT id FROM clients WHERE tax_id = ?1",
                params![tax_id],
                |r| r.get(0),
            )
            .optional()?,
        None => None,
    };
    let client_id = match existing {
        Some(id) => id,
        None => insert_client_tx(tx, fields)?,
    };

    let key = payload
        .client_draft_key
        .clone()
        .unwrap_or_else(|| fields.draft_key());
    Ok((client_id, Some((key, client_id))))
}

fn create_appointment_tx(
    tx: &Transaction,
    payload: &AppointmentPayload,
    draft_clients: &HashMap<String, i64>,
) -> RepositoryResult<(i64, Option<(String, i64)>)> {
    let (client_id, created) = resolve_client_tx(tx, payload, draft_clients)?;
    require(tx, "services", "Service", payload.service_id)?;
    if let Some(id) = payload.technician_id {
        require(tx, "technicians", "Technician", id)?;
    }
    if let Some(id) = payload.team_id {
        require(tx, "teams", "Team", id)?;
    }
    DateTime::parse_from_rfc3339(&payload.scheduled_date).map_err(|e| {
        RepositoryError::FieldValueError {
            field: "scheduledDate".to_string(),
            message: e.to_string(),
        }
    })?;

    tx.execute(
        r#"
        INSERT INTO appointments (
            client_id, service_id, technician_id, team_id, scheduled_date,
            status, priority, postal_code, street, number, complement,
            district, city, notes
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
        params![
            client_id,
            payload.service_id,
            payload.technician_id,
            payload.team_id,
            payload.scheduled_date,
            payload.status.as_str(),
            payload.priority.as_str(),
            payload.address.postal_code,
            payload.address.street,
            payload.address.number,
            payload.address.complement,
            payload.address.district,
            payload.address.city,
            payload.notes,
        ],
    )?;
    Ok((tx.last_insert_rowid(), created))
}

/// 面向操作员的失败原因
fn describe(err: &RepositoryError, item: &EntityPayload) -> String {
    match err {
        RepositoryError::UniqueConstraintViolation(_) => {
            let tax_id = match item {
                EntityPayload::Client(fields) => fields.tax_id.clone(),
                EntityPayload::Appointment(payload) => {
                    payload.client_data.as_ref().and_then(|c| c.tax_id.clone())
                }
            };
            match tax_id {
                Some(tax_id) => format!("Tax ID {} is already registered", tax_id),
                None => "Record already exists".to_string(),
            }
        }
        RepositoryError::NotFound { entity, id } => format!("{} {} not found", entity, id),
        RepositoryError::FieldValueError { field, message } => {
            format!("Invalid {}: {}", field, message)
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::NamedTempFile, SqliteStore) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = SqliteStore::open(file.path().to_str().unwrap()).unwrap();
        (file, store)
    }

    fn client(name: &str, tax_id: Option<&str>) -> ClientFields {
        ClientFields {
            name: name.to_string(),
            tax_id: tax_id.map(str::to_string),
            address: AddressFields {
                postal_code: "01234-567".to_string(),
                street: "Rua A".to_string(),
                number: "1".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_seed_is_idempotent() {
        let (_file, store) = store();
        let first = store.seed_demo().unwrap();
        assert_eq!(first.services, 4);
        assert_eq!(store.seed_demo().unwrap(), SeedSummary::default());
        assert_eq!(store.list_services().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_bulk_create_clients_reports_duplicates_per_item() {
        let (_file, store) = store();
        store.insert_client(&client("Ana", Some("12345678909"))).unwrap();

        let response = store
            .bulk_create(
                EntityKind::Client,
                vec![
                    EntityPayload::Client(client("Bia", Some("98765432100"))),
                    EntityPayload::Client(client("Ana 2", Some("12345678909"))),
                ],
            )
            .await
            .unwrap();

        assert_eq!(response.success, 1);
        assert_eq!(response.errors, 1);
        assert_eq!(response.processed_items[1].status, ItemStatus::Error);
        assert_eq!(
            response.detailed_errors[0],
            "Item 2: Tax ID 12345678909 is already registered"
        );
        assert_eq!(store.list_clients().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_draft_client_created_once() {
        let (_file, store) = store();
        let service_id = store.insert_service("Instalação", 60).unwrap();
        let draft = client("Caio", Some("11122233344"));

        let payload = |client_data: Option<ClientFields>| AppointmentPayload {
            client_id: None,
            client_data,
            client_draft_key: Some("tax:11122233344".to_string()),
            service_id,
            technician_id: None,
            team_id: None,
            scheduled_date: "2025-03-15T12:00:00+00:00".to_string(),
            status: AppointmentStatus::Scheduled,
            priority: Priority::Normal,
            address: draft.address.clone(),
            notes: None,
        };

        let response = store
            .bulk_create(
                EntityKind::Appointment,
                vec![
                    EntityPayload::Appointment(payload(Some(draft.clone()))),
                    EntityPayload::Appointment(payload(None)),
                ],
            )
            .await
            .unwrap();

        assert_eq!(response.success, 2);
        assert_eq!(store.list_clients().unwrap().len(), 1);
        let appointments = store.list_appointments().unwrap();
        assert_eq!(appointments.len(), 2);
        assert_eq!(appointments[0].client_id, appointments[1].client_id);
    }

    #[tokio::test]
    async fn test_failed_item_rolls_back() {
        let (_file, store) = store();
        let response = store
            .bulk_create(
                EntityKind::Appointment,
                vec![EntityPayload::Appointment(AppointmentPayload {
                    client_id: None,
                    client_data: Some(client("Davi", None)),
                    client_draft_key: Some("name:davi".to_string()),
                    service_id: 99,
                    technician_id: None,
                    team_id: None,
                    scheduled_date: "2025-03-15T12:00:00+00:00".to_string(),
                    status: AppointmentStatus::Scheduled,
                    priority: Priority::Normal,
                    address: AddressFields::default(),
                    notes: None,
                })],
            )
            .await
            .unwrap();

        assert_eq!(response.errors, 1);
        assert_eq!(response.detailed_errors[0], "Item 1: Service 99 not found");
        assert!(store.list_clients().unwrap().is_empty());
    }
}
