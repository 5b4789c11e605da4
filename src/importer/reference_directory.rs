// ==========================================
// 外勤运营平台 - 引用实体目录（查找服务快照）
// ==========================================
// 职责: 以内存索引提供按键查找
// - 客户: 证件号（仅数字）精确匹配 / 名称忽略大小写精确匹配
// - 服务/技术员/团队: 名称忽略大小写精确匹配
// 说明: 同名记录以先加载者为准
// ==========================================

use crate::domain::{ClientRecord, ServiceRecord, TeamRecord, TechnicianRecord};
use crate::importer::import_engine_trait::LookupService;
use std::collections::HashMap;

/// 名称索引键
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn index_by<T>(items: &[T], key: impl Fn(&T) -> Option<String>) -> HashMap<String, usize> {
    let mut index = HashMap::new();
    for (pos, item) in items.iter().enumerate() {
        if let Some(k) = key(item) {
            index.entry(k).or_insert(pos);
        }
    }
    index
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceDirectory {
    clients: Vec<ClientRecord>,
    services: Vec<ServiceRecord>,
    technicians: Vec<TechnicianRecord>,
    teams: Vec<TeamRecord>,
    client_by_tax_id: HashMap<String, usize>,
    client_by_name: HashMap<String, usize>,
    service_by_name: HashMap<String, usize>,
    technician_by_name: HashMap<String, usize>,
    team_by_name: HashMap<String, usize>,
}

impl ReferenceDirectory {
    pub fn new(
        clients: Vec<ClientRecord>,
        services: Vec<ServiceRecord>,
        technicians: Vec<TechnicianRecord>,
        teams: Vec<TeamRecord>,
    ) -> Self {
        let client_by_tax_id = index_by(&clients, |c| c.tax_id.clone());
        let client_by_name = index_by(&clients, |c| Some(name_key(&c.name)));
        let service_by_name = index_by(&services, |s| Some(name_key(&s.name)));
        let technician_by_name = index_by(&technicians, |t| Some(name_key(&t.name)));
        let team_by_name = index_by(&teams, |t| Some(name_key(&t.name)));

        Self {
            clients,
            services,
            technicians,
            teams,
            client_by_tax_id,
            client_by_name,
            service_by_name,
            technician_by_name,
            team_by_name,
        }
    }

    pub fn clients(&self) -> &[ClientRecord] {
        &self.clients
    }

    pub fn services(&self) -> &[ServiceRecord] {
        &self.services
    }

    // ===== 按 id 查找（导出渲染使用）=====

    pub fn client(&self, id: i64) -> Option<&ClientRecord> {
        self.clients.iter().find(|c| c.id == id)
    }

    pub fn service(&self, id: i64) -> Option<&ServiceRecord> {
        self.services.iter().find(|s| s.id == id)
    }

    pub fn technician(&self, id: i64) -> Option<&TechnicianRecord> {
        self.technicians.iter().find(|t| t.id == id)
    }

    pub fn team(&self, id: i64) -> Option<&TeamRecord> {
        self.teams.iter().find(|t| t.id == id)
    }
}

impl LookupService for ReferenceDirectory {
    fn find_client_by_tax_id(&self, tax_id: &str) -> Option<&ClientRecord> {
        self.client_by_tax_id
            .get(tax_id)
            .and_then(|&i| self.clients.get(i))
    }

    fn find_client_by_name(&self, name: &str) -> Option<&ClientRecord> {
        self.client_by_name
            .get(&name_key(name))
            .and_then(|&i| self.clients.get(i))
    }

    fn find_service_by_name(&self, name: &str) -> Option<&ServiceRecord> {
        self.service_by_name
            .get(&name_key(name))
            .and_then(|&i| self.services.get(i))
    }

    fn find_technician_by_name(&self, name: &str) -> Option<&TechnicianRecord> {
        self.technician_by_name
            .get(&name_key(name))
            .and_then(|&i| self.technicians.get(i))
    }

    fn find_team_by_name(&self, name: &str) -> Option<&TeamRecord> {
        self.team_by_name
            .get(&name_key(name))
            .and_then(|&i| self.teams.get(i))
    }
}
