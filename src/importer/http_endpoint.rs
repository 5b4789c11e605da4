// ==========================================
// 外勤运营平台 - HTTP 远端服务（查找 + 批量创建）
// ==========================================
// 查找: GET {base}/api/{clients|services|technicians|teams}
//       客户接口返回数组；其余为分页 { items, pagination }
// 创建: POST {base}/api/{appointments|clients}/import
//       body = { "<collection>": [payload, ...] }
// 响应: { success, errors, detailedErrors, processedItems }
// 内联客户草稿:
// - 远端只认 clientId / clientData，不认 clientDraftKey
// - 先经 /api/clients/import 创建去重后的草稿，再以返回的 id 提交预约
// - 草稿创建失败的预约不发送，直接记为失败条目
// ==========================================

use crate::domain::{
    AddressFields, AppointmentPayload, BulkCreateResponse, ClientFields, ClientRecord,
    EntityKind, EntityPayload, ItemStatus, ProcessedItem, ServiceRecord, TeamRecord,
    TechnicianRecord,
};
use crate::importer::error::{EngineResult, ImportError};
use crate::importer::import_engine_trait::BulkCreateEndpoint;
use crate::importer::reference_directory::ReferenceDirectory;
use crate::importer::submission::split_item_prefix;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// 分页接口单页条数（服务端上限 50）
const PAGE_SIZE: u32 = 50;

pub struct HttpBulkEndpoint {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBulkEndpoint {
    /// # 参数
    /// - base_url: 服务根地址，例如 `http://localhost:5000`
    /// - timeout_secs: 请求超时
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Bearer 令牌
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn url_for(&self, kind: EntityKind) -> String {
        format!("{}/api/{}/import", self.base_url, kind.collection())
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    // ==========================================
    // 查找服务: 从远端加载引用目录快照
    // ==========================================

    /// 加载远端客户、服务、技术员与团队
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn load_directory(&self) -> EngineResult<ReferenceDirectory> {
        let clients: Vec<RemoteClient> = self.fetch_all("clients", false).await?;
        let services: Vec<RemoteService> = self.fetch_all("services", true).await?;
        let technicians: Vec<RemoteNamed> = self.fetch_all("technicians", true).await?;
        let teams: Vec<RemoteNamed> = self.fetch_all("teams", true).await?;

        info!(
            clients = clients.len(),
            services = services.len(),
            technicians = technicians.len(),
            teams = teams.len(),
            "远端引用目录已加载"
        );

        Ok(ReferenceDirectory::new(
            clients.into_iter().map(RemoteClient::into_record).collect(),
            services
                .into_iter()
                .map(|s| ServiceRecord {
                    id: s.id,
                    name: s.name,
                    duration_minutes: s.duration,
                })
                .collect(),
            technicians
                .into_iter()
                .map(|t| TechnicianRecord { id: t.id, name: t.name })
                .collect(),
            teams
                .into_iter()
                .map(|t| TeamRecord { id: t.id, name: t.name })
                .collect(),
        ))
    }

    /// 逐页读取，直到最后一页；数组响应视为单页
    ///
    /// # 参数
    /// - paged: 是否携带分页参数（客户接口不带参数时返回全部）
    async fn fetch_all<T: DeserializeOwned>(
        &self,
        collection: &str,
        paged: bool,
    ) -> EngineResult<Vec<T>> {
        let url = format!("{}/api/{}", self.base_url, collection);
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            let mut request = self.client.get(&url);
            if paged {
                request = request.query(&[("page", page), ("pageSize", PAGE_SIZE)]);
            }
            let response = self.authorize(request).send().await?;
            let status = response.status();
            let text = response.text().await?;
            if !status.is_success() {
                return Err(ImportError::Endpoint(format!(
                    "{} returned {}: {}",
                    url,
                    status.as_u16(),
                    text.chars().take(500).collect::<String>()
                )));
            }

            match serde_json::from_str::<Listing<T>>(&text)? {
                Listing::Plain(all) => {
                    items.extend(all);
                    break;
                }
                Listing::Paged(body) => {
                    let total_pages = body.pagination.map(|p| p.total_pages).unwrap_or(1);
                    let empty = body.items.is_empty();
                    items.extend(body.items);
                    if !paged || empty || page >= total_pages {
                        break;
                    }
                    page += 1;
                }
            }
        }

        debug!(url = %url, items = items.len(), pages = page, "GET 列表完成");
        Ok(items)
    }

    // ==========================================
    // 批量创建
    // ==========================================

    async fn post_batch(
        &self,
        kind: EntityKind,
        items: &[EntityPayload],
    ) -> EngineResult<BulkCreateResponse> {
        let url = self.url_for(kind);
        let body = serde_json::json!({ (kind.collection()): items });
        debug!(url = %url, items = items.len(), "POST 批量创建");

        let request = self.client.post(&url).json(&body);
        let response = self.authorize(request).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            return Ok(serde_json::from_str(&text)?);
        }

        match serde_json::from_str::<BulkCreateResponse>(&text) {
            Ok(parsed) if !parsed.processed_items.is_empty() || !parsed.detailed_errors.is_empty() => {
                warn!(status = status.as_u16(), "服务端返回错误状态，但包含逐条结果");
                Ok(parsed)
            }
            _ => Err(ImportError::Endpoint(format!(
                "{} returned {}: {}",
                url,
                status.as_u16(),
                text.chars().take(500).collect::<String>()
            ))),
        }
    }

    /// 预约批次: 先创建内联客户草稿，替换为远端 id 后再提交
    async fn create_appointments(&self, items: Vec<EntityPayload>) -> EngineResult<BulkCreateResponse> {
        let drafts = collect_drafts(&items);
        let resolution = if drafts.is_empty() {
            DraftResolution::default()
        } else {
            info!(drafts = drafts.len(), "先行创建内联客户草稿");
            let payloads: Vec<EntityPayload> = drafts
                .iter()
                .map(|(_, fields)| EntityPayload::Client(fields.clone()))
                .collect();
            let response = self.post_batch(EntityKind::Client, &payloads).await?;
            DraftResolution::from_response(&drafts, &response)
        };

        let plan = resolution.apply(items);
        if plan.payloads.is_empty() {
            return Ok(plan.merge(BulkCreateResponse::default()));
        }
        let response = self.post_batch(EntityKind::Appointment, &plan.payloads).await?;
        Ok(plan.merge(response))
    }
}

#[async_trait]
impl BulkCreateEndpoint for HttpBulkEndpoint {
    async fn bulk_create(
        &self,
        kind: EntityKind,
        items: Vec<EntityPayload>,
    ) -> EngineResult<BulkCreateResponse> {
        match kind {
            EntityKind::Client => self.post_batch(kind, &items).await,
            EntityKind::Appointment => self.create_appointments(items).await,
        }
    }
}

// ==========================================
// 远端列表的线上格式
// ==========================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Plain(Vec<T>),
    Paged(Page<T>),
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    items: Vec<T>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct RemoteClient {
    id: i64,
    name: String,
    #[serde(default)]
    cpf: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone1: Option<String>,
    #[serde(default)]
    phone2: Option<String>,
    #[serde(default)]
    cep: Option<String>,
    #[serde(default)]
    logradouro: Option<String>,
    #[serde(default)]
    numero: Option<String>,
    #[serde(default)]
    complemento: Option<String>,
    #[serde(default)]
    bairro: Option<String>,
    #[serde(default)]
    cidade: Option<String>,
    #[serde(default)]
    observacoes: Option<String>,
}

impl RemoteClient {
    /// 证件号统一为仅数字，与本地索引键一致
    fn into_record(self) -> ClientRecord {
        let tax_id = self
            .cpf
            .map(|raw| raw.chars().filter(char::is_ascii_digit).collect::<String>())
            .filter(|digits| !digits.is_empty());
        ClientRecord {
            id: self.id,
            name: self.name,
            tax_id,
            email: self.email,
            phone1: self.phone1,
            phone2: self.phone2,
            address: AddressFields {
                postal_code: self.cep.unwrap_or_default(),
                street: self.logradouro.unwrap_or_default(),
                number: self.numero.unwrap_or_default(),
                complement: self.complemento,
                district: self.bairro,
                city: self.cidade,
            },
            notes: self.observacoes,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemoteService {
    id: i64,
    name: String,
    #[serde(default)]
    duration: i64,
}

#[derive(Debug, Deserialize)]
struct RemoteNamed {
    id: i64,
    name: String,
}

// ==========================================
// 内联草稿: 收集 → 创建结果 → 重写预约批次 → 合并响应
// ==========================================

/// 批次中携带 clientData 的草稿（按 draft_key 去重，保持首次出现顺序）
fn collect_drafts(items: &[EntityPayload]) -> Vec<(String, ClientFields)> {
    let mut drafts: Vec<(String, ClientFields)> = Vec::new();
    for item in items {
        if let EntityPayload::Appointment(AppointmentPayload {
            client_id: None,
            client_data: Some(fields),
            client_draft_key,
            ..
        }) = item
        {
            let key = client_draft_key.clone().unwrap_or_else(|| fields.draft_key());
            if !drafts.iter().any(|(k, _)| *k == key) {
                drafts.push((key, fields.clone()));
            }
        }
    }
    drafts
}

#[derive(Debug, Default)]
struct DraftResolution {
    ids: HashMap<String, i64>,
    failures: HashMap<String, String>,
}

impl DraftResolution {
    fn from_response(drafts: &[(String, ClientFields)], response: &BulkCreateResponse) -> Self {
        let mut resolution = Self::default();
        let key_at = |index: usize| index.checked_sub(1).and_then(|i| drafts.get(i)).map(|(k, _)| k.clone());

        for item in &response.processed_items {
            let Some(key) = key_at(item.index) else { continue };
            match item.status {
                ItemStatus::Success => {
                    let id = item
                        .data
                        .as_ref()
                        .and_then(|data| data.get("id"))
                        .and_then(serde_json::Value::as_i64);
                    match id {
                        Some(id) => {
                            resolution.ids.insert(key, id);
                        }
                        None => {
                            resolution
                                .failures
                                .insert(key, "server returned no client id".to_string());
                        }
                    }
                }
                ItemStatus::Error => {
                    let raw = item.error.as_deref().unwrap_or("rejected by server");
                    resolution.failures.insert(key, split_item_prefix(raw).1);
                }
            }
        }

        for raw in &response.detailed_errors {
            let (index, message) = split_item_prefix(raw);
            if let Some(key) = index.and_then(key_at) {
                resolution.failures.entry(key).or_insert(message);
            }
        }

        for (key, _) in drafts {
            if !resolution.ids.contains_key(key) {
                resolution
                    .failures
                    .entry(key.clone())
                    .or_insert_with(|| "no result returned for client".to_string());
            }
        }

        debug!(created = resolution.ids.len(), failed = resolution.failures.len(), "内联客户草稿已处理");
        resolution
    }

    /// 以远端 id 替换草稿引用；草稿失败的条目不发送
    fn apply(&self, items: Vec<EntityPayload>) -> SubmissionPlan {
        let total = items.len();
        let mut plan = SubmissionPlan {
            total,
            sent_index: Vec::with_capacity(total),
            payloads: Vec::with_capacity(total),
            rejected: Vec::new(),
        };

        for (pos, item) in items.into_iter().enumerate() {
            let index = pos + 1;
            let item = match item {
                EntityPayload::Appointment(mut payload) => {
                    if payload.client_id.is_none() {
                        let key = payload
                            .client_draft_key
                            .clone()
                            .or_else(|| payload.client_data.as_ref().map(ClientFields::draft_key));
                        if let Some(key) = key {
                            match self.ids.get(&key) {
                                Some(&id) => payload.client_id = Some(id),
                                None => {
                                    let reason = self
                                        .failures
                                        .get(&key)
                                        .map(String::as_str)
                                        .unwrap_or("not created");
                                    plan.rejected.push(ProcessedItem {
                                        index,
                                        status: ItemStatus::Error,
                                        error: Some(format!(
                                            "client draft {} was not created: {}",
                                            key, reason
                                        )),
                                        data: None,
                                    });
                                    continue;
                                }
                            }
                        }
                    }
                    payload.client_data = None;
                    payload.client_draft_key = None;
                    EntityPayload::Appointment(payload)
                }
                other => other,
            };
            plan.sent_index.push(index);
            plan.payloads.push(item);
        }
        plan
    }
}

#[derive(Debug)]
struct SubmissionPlan {
    total: usize,
    sent_index: Vec<usize>, // sent_index[i] = 原批次 1-based 序号
    payloads: Vec<EntityPayload>,
    rejected: Vec<ProcessedItem>,
}

impl SubmissionPlan {
    fn original_index(&self, sent: usize) -> usize {
        sent.checked_sub(1)
            .and_then(|i| self.sent_index.get(i))
            .copied()
            .unwrap_or(0)
    }

    /// 将远端响应的序号换回原批次序号，并并入本地拒绝的条目
    fn merge(self, response: BulkCreateResponse) -> BulkCreateResponse {
        let rejected_count = self.rejected.len();
        let detailed_errors: Vec<String> = response
            .detailed_errors
            .iter()
            .map(|raw| match split_item_prefix(raw) {
                (Some(sent), message) => format!("Item {}: {}", self.original_index(sent), message),
                (None, message) => message,
            })
            .collect();

        let processed_path = !response.processed_items.is_empty() || self.payloads.is_empty();
        let mut merged = BulkCreateResponse {
            success: response.success,
            errors: response.errors + rejected_count,
            detailed_errors,
            processed_items: Vec::new(),
        };

        if processed_path {
            let mut processed: Vec<ProcessedItem> = response
                .processed_items
                .into_iter()
                .map(|mut item| {
                    item.index = self.original_index(item.index);
                    item
                })
                .collect();
            processed.extend(self.rejected);
            processed.sort_by_key(|item| item.index);
            merged.processed_items = processed;
        } else {
            merged.detailed_errors.extend(self.rejected.into_iter().map(|item| {
                format!("Item {}: {}", item.index, item.error.unwrap_or_default())
            }));
        }

        debug!(total = self.total, rejected = rejected_count, "远端响应已合并");
        merged
    }
}
