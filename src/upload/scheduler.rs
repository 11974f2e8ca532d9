use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use url::Url;
use crate::client::HttpTransport;
use crate::errors::{Error, Result};
use super::handle::UploadHandle;
use super::types::{
    JobId,
    JobSnapshot,
    SchedulerCommand,
    SchedulerConfig,
    UploadEvent,
    UploadFile,
    UploadOptions,
};
use super::validation::UploadPolicy;
use super::worker::SchedulerWorker;

/// 上传调度器，可克隆，所有克隆共享同一个 worker
#[derive(Clone)]
pub struct UploadScheduler {
    command_tx: mpsc::Sender<SchedulerCommand>,
    event_tx: broadcast::Sender<UploadEvent>,
    policy: Arc<UploadPolicy>,
}

/// 调度器句柄 - 包含调度器和 worker 任务
pub struct SchedulerHandle {
    pub scheduler: UploadScheduler,
    pub worker_handle: JoinHandle<()>,
}

impl SchedulerHandle {
    /// 拒绝排队中的任务，等待进行中的上传结束
    pub async fn shutdown(self) -> Result<()> {
        // worker 已经退出时这里会失败，直接等待 join 即可
        let _ = self.scheduler.shutdown().await;
        drop(self.scheduler);
        self.worker_handle
            .await
            .map_err(|err| Error::Internal(format!("Worker panic: {}", err)))
    }
}

impl UploadScheduler {
    pub fn new(transport: Arc<dyn HttpTransport>, config: SchedulerConfig) -> SchedulerHandle {
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (event_tx, _) = broadcast::channel(config.event_buffer.max(1));

        let worker_handle = tokio::spawn(SchedulerWorker::run(
            transport,
            config.max_concurrent,
            config.upload_timeout,
            command_rx,
            event_tx.clone(),
        ));

        let scheduler = Self {
            command_tx,
            event_tx,
            policy: Arc::new(config.policy),
        };

        SchedulerHandle {
            scheduler,
            worker_handle,
        }
    }

    /// 提交上传任务
    ///
    /// 校验失败时直接返回 `Error::Validation`，不会发起网络请求；
    /// 否则任务进入队列，立即返回完成句柄。
    pub async fn submit(&self, file: UploadFile, endpoint: &str, options: UploadOptions) -> Result<UploadHandle> {
        self.policy.check(&file, endpoint)?;
        let endpoint = Url::parse(endpoint.trim())
            .map_err(|err| Error::validation(format!("Invalid upload endpoint '{}': {}", endpoint, err)))?;

        let id = JobId::new();
        let (completion_tx, completion_rx) = oneshot::channel();
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(SchedulerCommand::Submit {
                id,
                file,
                endpoint: endpoint.to_string(),
                options,
                completion: completion_tx,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::SchedulerShutdown)?;

        reply_rx.await.map_err(|_| Error::SchedulerShutdown)??;

        Ok(UploadHandle::new(id, completion_rx, self.command_tx.downgrade()))
    }

    /// Cancel upload
    pub async fn cancel(&self, id: JobId) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(SchedulerCommand::Cancel { id, reply: reply_tx })
            .await
            .map_err(|_| Error::SchedulerShutdown)?;

        reply_rx.await.map_err(|_| Error::SchedulerShutdown)?
    }

    /// Get job, `None` once it has settled
    pub async fn get_job(&self, id: JobId) -> Result<Option<JobSnapshot>> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(SchedulerCommand::GetJob { id, reply: reply_tx })
            .await
            .map_err(|_| Error::SchedulerShutdown)?;

        reply_rx.await.map_err(|_| Error::SchedulerShutdown)
    }

    /// 按提交顺序列出未结算的任务
    pub async fn list_jobs(&self) -> Result<Vec<JobSnapshot>> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(SchedulerCommand::ListJobs { reply: reply_tx })
            .await
            .map_err(|_| Error::SchedulerShutdown)?;

        reply_rx.await.map_err(|_| Error::SchedulerShutdown)
    }

    pub async fn shutdown(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(SchedulerCommand::Shutdown { reply: reply_tx })
            .await
            .map_err(|_| Error::SchedulerShutdown)?;

        reply_rx.await.map_err(|_| Error::SchedulerShutdown)
    }

    /// 订阅事件
    ///
    /// 注意：
    /// - 如果接收速度跟不上发送速度，可能会丢失事件（lagged error）
    /// - 每个订阅者都会收到完整的事件副本
    pub fn subscribe_events(&self) -> broadcast::Receiver<UploadEvent> {
        self.event_tx.subscribe()
    }
}
