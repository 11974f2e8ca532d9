pub mod api;
pub mod client;
pub mod config;
pub mod errors;
pub mod upload;

// 重新导出核心类型
pub use api::{unwrap_envelope, Backend, DownloadFormat, Resource};
pub use client::{
    HttpTransport,
    NormalizedResponse,
    ReqwestTransport,
    RequestClient,
    RequestConfig,
};
pub use config::Config;
pub use errors::{Error, ErrorKind, Result};
pub use upload::{
    JobId,
    JobSnapshot,
    JobStatus,
    SchedulerConfig,
    SchedulerHandle,
    UploadEvent,
    UploadFile,
    UploadHandle,
    UploadOptions,
    UploadScheduler,
};
