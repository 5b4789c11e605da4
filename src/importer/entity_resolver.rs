// ==========================================
// 外勤运营平台 - 引用解析器
// ==========================================
// 职责: 将引用列映射到已存在实体；无匹配时标记内联创建
// 优先级:
// - 客户: 证件号精确匹配 → 名称匹配 → 内联草稿
// - 服务: 名称匹配，缺失为硬错误
// - 技术员/团队: 名称匹配，技术员优先；缺失为警告
// 会话缓存: 同一键在一次会话内总是解析为同一实体
// ==========================================

use crate::domain::{
    ClientFields, ClientRecord, MatchedBy, ReferenceKind, ResolvedEntity, ValidationError,
};
use crate::importer::import_engine_trait::LookupService;
use crate::importer::reference_directory::name_key;
use std::collections::HashMap;
use tracing::debug;

// ==========================================
// ClientMatch - 客户解析结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMatch {
    /// 已存在客户（附带其存储记录）
    Existing {
        entity: ResolvedEntity,
        record: ClientRecord,
    },
    /// 本会话先前已通过校验的内联草稿
    Draft(ResolvedEntity),
    /// 无匹配，由调用方在校验通过后登记草稿
    Unmatched,
}

/// 会话缓存键（与 ClientFields::draft_key 一致）
fn client_key(tax_id: Option<&str>, name: Option<&str>) -> Option<String> {
    match (tax_id, name) {
        (Some(tax_id), _) => Some(format!("tax:{}", tax_id)),
        (None, Some(name)) => Some(format!("name:{}", name_key(name))),
        (None, None) => None,
    }
}

pub struct EntityResolver<'a> {
    lookup: &'a dyn LookupService,
    client_cache: HashMap<String, ClientMatch>,
    seen_tax_ids: HashMap<String, usize>, // 客户导入: 证件号 → 首次出现行号
}

impl<'a> EntityResolver<'a> {
    pub fn new(lookup: &'a dyn LookupService) -> Self {
        Self {
            lookup,
            client_cache: HashMap::new(),
            seen_tax_ids: HashMap::new(),
        }
    }

    /// 解析客户引用
    ///
    /// # 参数
    /// - tax_id: 规范化后的证件号（仅数字）
    /// - name: 行内客户名称
    pub fn resolve_client(&mut self, tax_id: Option<&str>, name: Option<&str>) -> ClientMatch {
        let Some(key) = client_key(tax_id, name) else {
            return ClientMatch::Unmatched;
        };

        if let Some(cached) = self.client_cache.get(&key) {
            return cached.clone();
        }

        let by_key = tax_id
            .and_then(|t| self.lookup.find_client_by_tax_id(t))
            .map(|record| (record, MatchedBy::Key));
        let found = by_key.or_else(|| {
            name.and_then(|n| self.lookup.find_client_by_name(n))
                .map(|record| (record, MatchedBy::Name))
        });

        match found {
            Some((record, matched_by)) => {
                debug!(key = %key, client_id = record.id, matched_by = ?matched_by, "客户已匹配");
                let resolved = ClientMatch::Existing {
                    entity: ResolvedEntity::matched(
                        ReferenceKind::Client,
                        record.id,
                        &record.name,
                        matched_by,
                    ),
                    record: record.clone(),
                };
                self.client_cache.insert(key, resolved.clone());
                resolved
            }
            None => ClientMatch::Unmatched,
        }
    }

    /// 登记通过校验的内联草稿；同键后续行复用该草稿
    pub fn register_draft(&mut self, fields: ClientFields) -> ResolvedEntity {
        let key = fields.draft_key();
        if let Some(ClientMatch::Draft(existing)) = self.client_cache.get(&key) {
            return existing.clone();
        }

        let entity = ResolvedEntity::inline_client(fields);
        debug!(draft_key = %key, "登记内联客户草稿");
        self.client_cache.insert(key, ClientMatch::Draft(entity.clone()));
        entity
    }

    pub fn resolve_service(&self, name: &str) -> Option<ResolvedEntity> {
        self.lookup.find_service_by_name(name).map(|s| {
            ResolvedEntity::matched(ReferenceKind::Service, s.id, &s.name, MatchedBy::Name)
        })
    }

    /// 技术员优先，其次团队
    pub fn resolve_assignee(&self, name: &str) -> Option<ResolvedEntity> {
        if let Some(t) = self.lookup.find_technician_by_name(name) {
            return Some(ResolvedEntity::matched(
                ReferenceKind::Technician,
                t.id,
                &t.name,
                MatchedBy::Name,
            ));
        }
        self.lookup.find_team_by_name(name).map(|t| {
            ResolvedEntity::matched(ReferenceKind::Team, t.id, &t.name, MatchedBy::Name)
        })
    }

    /// 客户导入的证件号重复检测（已存储 / 同文件先前行）
    pub fn check_client_duplicate(
        &self,
        tax_id: &str,
        line: usize,
        field: &str,
    ) -> Option<ValidationError> {
        if let Some(existing) = self.lookup.find_client_by_tax_id(tax_id) {
            return Some(ValidationError::duplicate(
                line,
                field,
                format!(
                    "Tax ID {} is already registered (client \"{}\")",
                    tax_id, existing.name
                ),
            ));
        }

        self.seen_tax_ids.get(tax_id).map(|first_line| {
            ValidationError::duplicate(
                line,
                field,
                format!("Tax ID {} already appears on line {}", tax_id, first_line),
            )
        })
    }

    /// 记录有效行的证件号（仅首次出现生效）
    pub fn mark_client_seen(&mut self, tax_id: &str, line: usize) {
        self.seen_tax_ids.entry(tax_id.to_string()).or_insert(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AddressFields, ServiceRecord, TeamRecord, TechnicianRecord};
    use crate::importer::reference_directory::ReferenceDirectory;

    fn directory() -> ReferenceDirectory {
        ReferenceDirectory::new(
            vec![ClientRecord {
                id: 1,
                name: "Ana Lima".to_string(),
                tax_id: Some("12345678909".to_string()),
                email: None,
                phone1: Some("(81) 99999-0000".to_string()),
                phone2: None,
                address: AddressFields {
                    postal_code: "50000-000".to_string(),
                    street: "Rua do Sol".to_string(),
                    number: "10".to_string(),
                    ..Default::default()
                },
                notes: None,
            }],
            vec![ServiceRecord {
                id: 10,
                name: "Manutenção".to_string(),
                duration_minutes: 90,
            }],
            vec![TechnicianRecord {
                id: 20,
                name: "Norte".to_string(),
            }],
            vec![TeamRecord {
                id: 30,
                name: "Norte".to_string(),
            }, TeamRecord {
                id: 31,
                name: "Equipe Sul".to_string(),
            }],
        )
    }

    #[test]
    fn test_tax_id_match_wins() {
        let dir = directory();
        let mut resolver = EntityResolver::new(&dir);
        match resolver.resolve_client(Some("12345678909"), Some("Outro Nome")) {
            ClientMatch::Existing { entity, record } => {
                assert_eq!(entity.id, Some(1));
                assert_eq!(entity.matched_by, MatchedBy::Key);
                assert_eq!(record.name, "Ana Lima");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_name_fallback() {
        let dir = directory();
        let mut resolver = EntityResolver::new(&dir);
        match resolver.resolve_client(None, Some("ANA LIMA")) {
            ClientMatch::Existing { entity, .. } => assert_eq!(entity.matched_by, MatchedBy::Name),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let dir = directory();
        let mut resolver = EntityResolver::new(&dir);
        let first = resolver.resolve_client(Some("12345678909"), None);
        let second = resolver.resolve_client(Some("12345678909"), Some("Ana Lima"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_inline_draft_is_reused() {
        let dir = directory();
        let mut resolver = EntityResolver::new(&dir);
        assert_eq!(
            resolver.resolve_client(Some("98765432100"), Some("Bruno")),
            ClientMatch::Unmatched
        );

        let fields = ClientFields {
            name: "Bruno".to_string(),
            tax_id: Some("98765432100".to_string()),
            ..Default::default()
        };
        let draft = resolver.register_draft(fields);
        assert!(draft.is_inline());
        assert_eq!(draft.draft_key.as_deref(), Some("tax:98765432100"));

        match resolver.resolve_client(Some("98765432100"), Some("Bruno B.")) {
            ClientMatch::Draft(again) => assert_eq!(again, draft),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_technician_wins_tie_break() {
        let dir = directory();
        let resolver = EntityResolver::new(&dir);
        let assignee = resolver.resolve_assignee("norte").unwrap();
        assert_eq!(assignee.kind, ReferenceKind::Technician);
        assert_eq!(assignee.id, Some(20));

        let team = resolver.resolve_assignee("Equipe Sul").unwrap();
        assert_eq!(team.kind, ReferenceKind::Team);
        assert!(resolver.resolve_assignee("Ninguém").is_none());
    }

    #[test]
    fn test_service_lookup() {
        let dir = directory();
        let resolver = EntityResolver::new(&dir);
        assert_eq!(resolver.resolve_service("manutenção").unwrap().id, Some(10));
        assert!(resolver.resolve_service("Pintura").is_none());
    }

    #[test]
    fn test_client_duplicates() {
        let dir = directory();
        let mut resolver = EntityResolver::new(&dir);

        let stored = resolver.check_client_duplicate("12345678909", 2, "Tax ID").unwrap();
        assert!(stored.message.contains("already registered"));

        assert!(resolver.check_client_duplicate("11122233344", 3, "Tax ID").is_none());
        resolver.mark_client_seen("11122233344", 3);
        let repeat = resolver.check_client_duplicate("11122233344", 5, "Tax ID").unwrap();
        assert!(repeat.message.contains("line 3"));
    }
}
