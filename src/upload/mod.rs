mod handle;
mod scheduler;
mod types;
mod validation;
mod worker;

pub use handle::UploadHandle;
pub use scheduler::{SchedulerHandle, UploadScheduler};
pub use types::{
    JobId,
    JobSnapshot,
    JobStatus,
    SchedulerConfig,
    UploadEvent,
    UploadFile,
    UploadOptions,
};
pub use validation::UploadPolicy;
