use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("HTTP error {status}: {status_text}")]
    Http {
        status: u16,
        status_text: String,
    },

    #[error("Response parse error: {0}")]
    ResponseParse(String),

    #[error("Request rejected by backend: {0}")]
    Rejected(String),

    #[error("Upload was cancelled")]
    Cancelled,

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Scheduler shut down")]
    SchedulerShutdown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// 错误类别，调用方无需匹配具体载荷即可分支处理
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Timeout,
    Transport,
    Http,
    ResponseParse,
    Rejected,
    Cancelled,
    JobNotFound,
    SchedulerShutdown,
    Io,
    Config,
    Internal,
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn http(status: u16, status_text: impl Into<String>) -> Self {
        Self::Http {
            status,
            status_text: status_text.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::ResponseParse(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Transport(_) | Error::Connection(_) => ErrorKind::Transport,
            Error::Http { .. } => ErrorKind::Http,
            Error::ResponseParse(_) => ErrorKind::ResponseParse,
            Error::Rejected(_) => ErrorKind::Rejected,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::JobNotFound(_) => ErrorKind::JobNotFound,
            Error::SchedulerShutdown => ErrorKind::SchedulerShutdown,
            Error::Io(_) => ErrorKind::Io,
            Error::Config(_) => ErrorKind::Config,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// 是否值得再试一次：超时、连接失败和非 2xx 状态码
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Timeout | ErrorKind::Transport | ErrorKind::Http
        )
    }
}

/// Error alias
pub type Result<T, E = Error> = std::result::Result<T, E>;
