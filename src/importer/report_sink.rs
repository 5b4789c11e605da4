// ==========================================
// 外勤运营平台 - 报告呈现
// ==========================================
// 实现:
// - DirectorySink: 提示与确认输出到 stderr，报告写入目录（须确认）
//   stdout 只留给机器可读输出（--json）
// - MemorySink: 记录全部提示与报告（测试与嵌入使用）
// 约束: 未经确认不写文件
// ==========================================

use crate::importer::error::EngineResult;
use crate::importer::import_engine_trait::ReportSink;
use crate::importer::report::{ReportArtifact, Toast, ToastVariant};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

// ==========================================
// ConfirmMode - 下载确认方式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmMode {
    /// 预先确认（CLI --yes）
    AssumeYes,
    /// 终端交互确认
    Prompt,
    /// 始终拒绝
    Decline,
}

pub struct DirectorySink {
    dir: PathBuf,
    confirm: ConfirmMode,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>, confirm: ConfirmMode) -> Self {
        Self {
            dir: dir.into(),
            confirm,
        }
    }

    async fn confirmed(&self, target: &std::path::Path) -> EngineResult<bool> {
        match self.confirm {
            ConfirmMode::AssumeYes => Ok(true),
            ConfirmMode::Decline => Ok(false),
            ConfirmMode::Prompt => {
                let mut stderr = tokio::io::stderr();
                stderr
                    .write_all(format!("Save import report to {}? [y/N] ", target.display()).as_bytes())
                    .await?;
                stderr.flush().await?;

                let mut answer = String::new();
                BufReader::new(tokio::io::stdin())
                    .read_line(&mut answer)
                    .await?;
                Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes" | "s" | "sim"))
            }
        }
    }
}

#[async_trait]
impl ReportSink for DirectorySink {
    async fn notify(&self, toast: &Toast) -> EngineResult<()> {
        match toast.variant {
            ToastVariant::Success => info!(title = %toast.title, "{}", toast.body),
            ToastVariant::Warning | ToastVariant::Error => {
                warn!(title = %toast.title, "{}", toast.body)
            }
        }
        let mut stderr = tokio::io::stderr();
        stderr
            .write_all(format!("{}\n{}\n\n", toast.title, toast.body).as_bytes())
            .await?;
        stderr.flush().await?;
        Ok(())
    }

    async fn offer_download(&self, artifact: &ReportArtifact) -> EngineResult<Option<PathBuf>> {
        let target = self.dir.join(&artifact.file_name);
        if !self.confirmed(&target).await? {
            return Ok(None);
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&target, artifact.contents.as_bytes()).await?;
        Ok(Some(target))
    }
}

// ==========================================
// MemorySink
// ==========================================
#[derive(Debug, Clone)]
pub struct MemorySink {
    accept: bool,
    toasts: Arc<Mutex<Vec<Toast>>>,
    offered: Arc<Mutex<Vec<ReportArtifact>>>,
}

impl MemorySink {
    /// accept: 是否确认下载
    pub fn new(accept: bool) -> Self {
        Self {
            accept,
            toasts: Arc::new(Mutex::new(Vec::new())),
            offered: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn offered(&self) -> Vec<ReportArtifact> {
        self.offered.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReportSink for MemorySink {
    async fn notify(&self, toast: &Toast) -> EngineResult<()> {
        if let Ok(mut toasts) = self.toasts.lock() {
            toasts.push(toast.clone());
        }
        Ok(())
    }

    async fn offer_download(&self, artifact: &ReportArtifact) -> EngineResult<Option<PathBuf>> {
        if let Ok(mut offered) = self.offered.lock() {
            offered.push(artifact.clone());
        }
        Ok(self.accept.then(|| PathBuf::from(&artifact.file_name)))
    }
}
