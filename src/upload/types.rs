use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;
use crate::client::NormalizedResponse;
use crate::config::UploadSettings;
use crate::errors::{Error, Result};
use super::validation::UploadPolicy;

/// 上传任务唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 上传状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum JobStatus {
    /// 等待中（在队列中）
    Pending,
    /// 上传中
    Uploading,
    /// 已完成
    Completed,
    /// 失败
    Error,
    /// 已取消
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error | JobStatus::Cancelled)
    }

    pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
        use JobStatus::{Cancelled, Completed, Error, Pending, Uploading};

        matches!(
            (from, to),
            (Pending, Uploading)
                | (Pending, Cancelled)
                | (Uploading, Completed)
                | (Uploading, Error)
                | (Uploading, Cancelled)
        )
    }
}

/// 待上传的文件
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let name = name.into();
        let content_type = guess_content_type(&name).to_string();

        Self {
            name,
            content_type,
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::validation(format!("Invalid file name: {}", path.display())))?
            .to_string();

        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(Error::validation(format!("Not a file: {}", path.display())));
        }

        let bytes = tokio::fs::read(path).await?;
        Ok(Self::new(name, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// 小写扩展名
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

fn guess_content_type(name: &str) -> &'static str {
    let extension = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("doc") => "application/msword",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("xls") => "application/vnd.ms-excel",
        Some("pptx") => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        Some("ppt") => "application/vnd.ms-powerpoint",
        Some("txt") | Some("md") => "text/plain",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// 单个上传任务的选项
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// 上传超时，超时按传输错误处理；`None` 时用调度器的 `upload_timeout`
    pub timeout: Option<Duration>,
    /// 额外的表单字段
    pub fields: HashMap<String, String>,
    /// 额外的请求头
    pub headers: HashMap<String, String>,
    /// 文件所在的表单字段名
    pub field_name: String,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            fields: HashMap::new(),
            headers: HashMap::new(),
            field_name: "file".to_string(),
        }
    }
}

impl UploadOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// 调度器配置
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 最大并发上传数
    pub max_concurrent: usize,
    /// 未单独指定超时的任务使用的上传超时
    pub upload_timeout: Duration,
    /// 提交前的文件校验
    pub policy: UploadPolicy,
    /// 命令队列容量
    pub command_buffer: usize,
    /// 事件广播容量
    pub event_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            upload_timeout: Duration::from_secs(300), // 5 分钟
            policy: UploadPolicy::default(),
            command_buffer: 100,
            // 最大缓存 256 个事件
            event_buffer: 256,
        }
    }
}

impl From<&UploadSettings> for SchedulerConfig {
    fn from(settings: &UploadSettings) -> Self {
        Self {
            max_concurrent: settings.max_concurrent,
            upload_timeout: settings.timeout,
            policy: UploadPolicy::from(settings),
            ..Self::default()
        }
    }
}

/// 任务快照，只读
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub file_name: String,
    pub file_size: u64,
    pub endpoint: String,
    pub status: JobStatus,
    /// 0-100
    pub progress: u8,
    pub bytes_sent: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// 任务进入队列
    Queued {
        id: JobId,
    },

    /// 状态变更
    StateChanged {
        id: JobId,
        old_status: JobStatus,
        new_status: JobStatus,
    },

    /// 进度更新
    Progress {
        id: JobId,
        progress: u8,
        bytes_sent: u64,
        total_bytes: u64,
    },

    /// 任务完成
    Completed {
        id: JobId,
    },

    /// 任务失败
    Failed {
        id: JobId,
        error: String,
    },

    /// 任务取消
    Cancelled {
        id: JobId,
    },
}

pub(crate) type Completion = oneshot::Sender<Result<NormalizedResponse>>;

/// 调度器命令
pub(crate) enum SchedulerCommand {
    /// 提交上传任务
    Submit {
        id: JobId,
        file: UploadFile,
        endpoint: String,
        options: UploadOptions,
        completion: Completion,
        reply: oneshot::Sender<Result<()>>,
    },

    /// 取消
    Cancel {
        id: JobId,
        reply: oneshot::Sender<Result<()>>,
    },

    /// 获取任务信息
    GetJob {
        id: JobId,
        reply: oneshot::Sender<Option<JobSnapshot>>,
    },

    /// 获取所有任务
    ListJobs {
        reply: oneshot::Sender<Vec<JobSnapshot>>,
    },

    /// 停止接收新任务，拒绝排队中的任务
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

// 静态断言确保类型是 Send 的
const _: () = {
    fn assert_send<T: Send>() {}
    fn assert_types() {
        assert_send::<UploadFile>();
        assert_send::<UploadEvent>();
        assert_send::<JobSnapshot>();
    }
};
