// ==========================================
// 外勤运营平台 - 应用状态
// ==========================================
// 职责: 组装本地存储、配置管理器与导入引擎
// 说明: 指定远端端点时查找与创建都走远端；否则都走本地 SQLite 存储
// ==========================================

use crate::config::{ConfigManager, ImportConfig, ImportConfigReader};
use crate::domain::EntityKind;
use crate::importer::error::EngineResult;
use crate::importer::http_endpoint::HttpBulkEndpoint;
use crate::importer::import_engine::ImportEngine;
use crate::importer::import_engine_trait::BulkCreateEndpoint;
use crate::importer::reference_directory::ReferenceDirectory;
use crate::importer::template::{render_appointment_export, render_client_export};
use crate::repository::SqliteStore;
use std::path::PathBuf;
use tracing::info;

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "FIELDOPS_DB_PATH";

pub struct AppState {
    pub db_path: String,
    pub store: SqliteStore,
    pub config_manager: ConfigManager,
}

impl AppState {
    /// # 参数
    /// - db_path: 数据库文件路径（不存在时创建并建表）
    pub fn new(db_path: String) -> EngineResult<Self> {
        let store = SqliteStore::open(&db_path)?;
        let config_manager = ConfigManager::from_connection(store.connection())?;
        info!(db_path = %db_path, "本地存储已打开");
        Ok(Self {
            db_path,
            store,
            config_manager,
        })
    }

    pub async fn load_config(&self) -> EngineResult<ImportConfig> {
        self.config_manager.load_import_config().await
    }

    /// 组装导入引擎
    ///
    /// # 参数
    /// - endpoint_url: 远端服务根地址；None 时查找与写入都使用本地存储
    /// - token: 远端 Bearer 令牌
    pub async fn build_engine(
        &self,
        endpoint_url: Option<&str>,
        token: Option<String>,
    ) -> EngineResult<ImportEngine<ReferenceDirectory>> {
        let config = self.load_config().await?;

        // 查找与创建必须来自同一后端，引用 id 才有效
        let (directory, endpoint): (ReferenceDirectory, Box<dyn BulkCreateEndpoint>) =
            match endpoint_url {
                Some(url) => {
                    info!(url = %url, "使用远端服务（查找 + 批量创建）");
                    let mut http = HttpBulkEndpoint::new(url, config.endpoint_timeout_secs)?;
                    if let Some(token) = token {
                        http = http.with_token(token);
                    }
                    (http.load_directory().await?, Box::new(http) as Box<dyn BulkCreateEndpoint>)
                }
                None => (
                    self.store.load_directory()?,
                    Box::new(SqliteStore::from_connection(self.store.connection())?)
                        as Box<dyn BulkCreateEndpoint>,
                ),
            };

        Ok(ImportEngine::new(directory, endpoint, config))
    }

    /// 导出全部数据（列顺序与导入一致）
    pub async fn export(&self, kind: EntityKind) -> EngineResult<String> {
        match kind {
            EntityKind::Client => render_client_export(&self.store.list_clients()?),
            EntityKind::Appointment => {
                let config = self.load_config().await?;
                render_appointment_export(
                    &self.store.list_appointments()?,
                    &self.store.load_directory()?,
                    config.utc_offset(),
                )
            }
        }
    }
}

/// 默认数据库路径: 环境变量 → 用户数据目录 → 当前目录
pub fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./fieldops.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("fieldops-import");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("fieldops.db");
        }
    }
    path.to_string_lossy().to_string()
}
