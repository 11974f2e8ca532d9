use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use crate::client::NormalizedResponse;
use crate::errors::{Error, Result};
use super::types::{JobId, SchedulerCommand};

/// `submit()` 返回的完成句柄，恰好结算一次
///
/// 作为 future 等待时得到上传结果；调度器关闭时得到 `Error::SchedulerShutdown`。
pub struct UploadHandle {
    id: JobId,
    completion: oneshot::Receiver<Result<NormalizedResponse>>,
    // 弱引用，句柄不会让 worker 保持存活
    command_tx: mpsc::WeakSender<SchedulerCommand>,
}

impl UploadHandle {
    pub(crate) fn new(
        id: JobId,
        completion: oneshot::Receiver<Result<NormalizedResponse>>,
        command_tx: mpsc::WeakSender<SchedulerCommand>,
    ) -> Self {
        Self {
            id,
            completion,
            command_tx,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// Cancel this upload
    pub async fn cancel(&self) -> Result<()> {
        let command_tx = self.command_tx.upgrade().ok_or(Error::SchedulerShutdown)?;
        let (reply_tx, reply_rx) = oneshot::channel();

        command_tx
            .send(SchedulerCommand::Cancel {
                id: self.id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::SchedulerShutdown)?;

        reply_rx.await.map_err(|_| Error::SchedulerShutdown)?
    }
}

impl Future for UploadHandle {
    type Output = Result<NormalizedResponse>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.completion).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::SchedulerShutdown)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for UploadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadHandle").field("id", &self.id).finish()
    }
}
