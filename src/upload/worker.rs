use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use crate::client::{normalize, HttpTransport, NormalizedResponse, ProgressCallback, TransferProgress, UploadRequest};
use crate::errors::{Error, Result};
use super::types::{
    Completion,
    JobId,
    JobSnapshot,
    JobStatus,
    SchedulerCommand,
    UploadEvent,
    UploadFile,
    UploadOptions,
};

/// 上传任务回报给 worker 的内部事件
enum WorkerEvent {
    Progress {
        id: JobId,
        progress: TransferProgress,
    },
    Finished {
        id: JobId,
        result: Result<NormalizedResponse>,
    },
}

struct JobEntry {
    /// 提交顺序，用于 list
    seq: u64,
    snapshot: JobSnapshot,
    /// 开始上传时取走
    file: Option<UploadFile>,
    options: UploadOptions,
    /// 结算时取走，保证只结算一次
    completion: Option<Completion>,
}

/// 唯一持有任务状态的 actor：排队、并发控制、结算都在这里完成
pub(crate) struct SchedulerWorker {
    transport: Arc<dyn HttpTransport>,
    max_concurrent: usize,
    upload_timeout: Duration,
    jobs: HashMap<JobId, JobEntry>,
    pending: VecDeque<JobId>,
    active: HashMap<JobId, CancellationToken>,
    next_seq: u64,
    closing: bool,

    event_tx: broadcast::Sender<UploadEvent>,
    inner_tx: mpsc::UnboundedSender<WorkerEvent>,
    inner_rx: mpsc::UnboundedReceiver<WorkerEvent>,
}

impl SchedulerWorker {
    pub(crate) async fn run(
        transport: Arc<dyn HttpTransport>,
        max_concurrent: usize,
        upload_timeout: Duration,
        mut command_rx: mpsc::Receiver<SchedulerCommand>,
        event_tx: broadcast::Sender<UploadEvent>,
    ) {
        let (inner_tx, inner_rx) = mpsc::unbounded_channel();
        let mut worker = Self {
            transport,
            max_concurrent: max_concurrent.max(1),
            upload_timeout,
            jobs: HashMap::new(),
            pending: VecDeque::new(),
            active: HashMap::new(),
            next_seq: 0,
            closing: false,
            event_tx,
            inner_tx,
            inner_rx,
        };

        let mut commands_open = true;

        // 主事件循环
        loop {
            tokio::select! {
                command = command_rx.recv(), if commands_open => {
                    match command {
                        Some(command) => worker.handle_command(command),
                        None => {
                            // 所有 UploadScheduler 都已释放
                            commands_open = false;
                            worker.begin_shutdown();
                        }
                    }
                }
                Some(event) = worker.inner_rx.recv() => {
                    worker.handle_event(event);
                }
            }

            worker.drain_queue();

            if worker.closing && worker.active.is_empty() {
                break;
            }
        }

        tracing::debug!("Upload scheduler worker stopped");
    }

    fn handle_command(&mut self, command: SchedulerCommand) {
        match command {
            SchedulerCommand::Submit { id, file, endpoint, options, completion, reply } => {
                let result = self.enqueue(id, file, endpoint, options, completion);
                let _ = reply.send(result);
            }
            SchedulerCommand::Cancel { id, reply } => {
                let result = self.cancel(id);
                let _ = reply.send(result);
            }
            SchedulerCommand::GetJob { id, reply } => {
                let job = self.jobs.get(&id).map(|entry| entry.snapshot.clone());
                let _ = reply.send(job);
            }
            SchedulerCommand::ListJobs { reply } => {
                let mut entries: Vec<_> = self.jobs.values().collect();
                entries.sort_by_key(|entry| entry.seq);
                let jobs = entries
                    .into_iter()
                    .map(|entry| entry.snapshot.clone())
                    .collect();
                let _ = reply.send(jobs);
            }
            SchedulerCommand::Shutdown { reply } => {
                self.begin_shutdown();
                let _ = reply.send(());
            }
        }
    }

    fn enqueue(
        &mut self,
        id: JobId,
        file: UploadFile,
        endpoint: String,
        options: UploadOptions,
        completion: Completion,
    ) -> Result<()> {
        if self.closing {
            return Err(Error::SchedulerShutdown);
        }

        let snapshot = JobSnapshot {
            id,
            file_name: file.name.clone(),
            file_size: file.size(),
            endpoint,
            status: JobStatus::Pending,
            progress: 0,
            bytes_sent: 0,
            created_at: chrono::Utc::now(),
            started_at: None,
        };

        tracing::info!(job = %id, file = %snapshot.file_name, size = snapshot.file_size, "Upload queued");

        self.jobs.insert(id, JobEntry {
            seq: self.next_seq,
            snapshot,
            file: Some(file),
            options,
            completion: Some(completion),
        });
        self.next_seq += 1;
        self.pending.push_back(id);

        let _ = self.event_tx.send(UploadEvent::Queued { id });
        Ok(())
    }

    fn cancel(&mut self, id: JobId) -> Result<()> {
        let status = self
            .jobs
            .get(&id)
            .map(|entry| entry.snapshot.status)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;

        match status {
            JobStatus::Pending => {
                self.pending.retain(|pending| *pending != id);
                self.settle(id, JobStatus::Cancelled, Err(Error::Cancelled));
                Ok(())
            }
            JobStatus::Uploading => {
                // 任务退出前仍占用并发名额，结算在 Finished 事件里完成
                if let Some(token) = self.active.get(&id) {
                    token.cancel();
                }
                Ok(())
            }
            _ => Err(Error::JobNotFound(id.to_string())),
        }
    }

    fn begin_shutdown(&mut self) {
        if self.closing {
            return;
        }

        self.closing = true;
        tracing::info!(pending = self.pending.len(), active = self.active.len(), "Upload scheduler shutting down");

        while let Some(id) = self.pending.pop_front() {
            self.settle(id, JobStatus::Cancelled, Err(Error::SchedulerShutdown));
        }
    }

    fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Progress { id, progress } => {
                let Some(entry) = self.jobs.get_mut(&id) else {
                    return;
                };
                if entry.snapshot.status != JobStatus::Uploading {
                    return;
                }

                // 进度只增不减
                let percentage = progress.percentage().max(entry.snapshot.progress);
                let bytes_sent = progress.bytes_sent.max(entry.snapshot.bytes_sent);
                if percentage == entry.snapshot.progress && bytes_sent == entry.snapshot.bytes_sent {
                    return;
                }

                entry.snapshot.progress = percentage;
                entry.snapshot.bytes_sent = bytes_sent;
                let _ = self.event_tx.send(UploadEvent::Progress {
                    id,
                    progress: percentage,
                    bytes_sent,
                    total_bytes: progress.total_bytes,
                });
            }
            WorkerEvent::Finished { id, result } => {
                self.active.remove(&id);

                let status = match &result {
                    Ok(_) => JobStatus::Completed,
                    Err(Error::Cancelled) => JobStatus::Cancelled,
                    Err(_) => JobStatus::Error,
                };
                self.settle(id, status, result);
            }
        }
    }

    /// 只要 active 有空位且队列非空，就按 FIFO 启动下一个
    fn drain_queue(&mut self) {
        while self.active.len() < self.max_concurrent {
            let Some(id) = self.pending.pop_front() else {
                break;
            };
            self.start_upload(id);
        }
    }

    fn start_upload(&mut self, id: JobId) {
        let Some(entry) = self.jobs.get_mut(&id) else {
            return;
        };
        let Some(file) = entry.file.take() else {
            return;
        };

        let request = UploadRequest {
            url: entry.snapshot.endpoint.clone(),
            file,
            field_name: entry.options.field_name.clone(),
            fields: entry.options.fields.clone(),
            headers: entry.options.headers.clone(),
        };
        let timeout = entry.options.timeout.unwrap_or(self.upload_timeout);

        entry.snapshot.status = JobStatus::Uploading;
        entry.snapshot.started_at = Some(chrono::Utc::now());

        let token = CancellationToken::new();
        self.active.insert(id, token.clone());
        self.emit_state_change(id, JobStatus::Pending, JobStatus::Uploading);
        tracing::info!(job = %id, url = %request.url, active = self.active.len(), "Upload started");

        let join_handle = tokio::spawn(execute_upload(
            self.transport.clone(),
            id,
            request,
            timeout,
            token,
            self.inner_tx.clone(),
        ));

        // 上传任务 panic 时也要结算
        let inner_tx = self.inner_tx.clone();
        tokio::spawn(async move {
            let result = join_handle
                .await
                .unwrap_or_else(|err| Err(Error::Internal(format!("Upload task panicked: {}", err))));
            let _ = inner_tx.send(WorkerEvent::Finished { id, result });
        });
    }

    /// 终态结算：更新状态、广播事件、回复句柄，并从所有表中移除
    fn settle(&mut self, id: JobId, status: JobStatus, result: Result<NormalizedResponse>) {
        let Some(mut entry) = self.jobs.remove(&id) else {
            return;
        };

        let old_status = entry.snapshot.status;
        debug_assert!(status.is_terminal() && JobStatus::can_transition(old_status, status));

        if result.is_ok() && entry.snapshot.progress < 100 {
            let _ = self.event_tx.send(UploadEvent::Progress {
                id,
                progress: 100,
                bytes_sent: entry.snapshot.file_size,
                total_bytes: entry.snapshot.file_size,
            });
        }
        self.emit_state_change(id, old_status, status);

        let file_name = &entry.snapshot.file_name;
        match &result {
            Ok(_) => {
                tracing::info!(job = %id, file = %file_name, "Upload completed");
                let _ = self.event_tx.send(UploadEvent::Completed { id });
            }
            Err(err) if status == JobStatus::Cancelled => {
                tracing::info!(job = %id, file = %file_name, reason = %err, "Upload cancelled");
                let _ = self.event_tx.send(UploadEvent::Cancelled { id });
            }
            Err(err) => {
                tracing::warn!(job = %id, file = %file_name, "Upload failed: {}", err);
                let _ = self.event_tx.send(UploadEvent::Failed {
                    id,
                    error: err.to_string(),
                });
            }
        }

        if let Some(completion) = entry.completion.take() {
            let _ = completion.send(result);
        }
    }

    fn emit_state_change(&self, id: JobId, old_status: JobStatus, new_status: JobStatus) {
        let _ = self.event_tx.send(UploadEvent::StateChanged {
            id,
            old_status,
            new_status,
        });
    }
}

async fn execute_upload(
    transport: Arc<dyn HttpTransport>,
    id: JobId,
    request: UploadRequest,
    timeout: Duration,
    token: CancellationToken,
    inner_tx: mpsc::UnboundedSender<WorkerEvent>,
) -> Result<NormalizedResponse> {
    let progress: ProgressCallback = Arc::new(move |progress| {
        let _ = inner_tx.send(WorkerEvent::Progress { id, progress });
    });

    let upload = tokio::time::timeout(timeout, transport.upload(request, progress));

    tokio::select! {
        _ = token.cancelled() => Err(Error::Cancelled),
        result = upload => match result {
            Ok(response) => response.and_then(normalize),
            Err(_) => Err(Error::Timeout(timeout)),
        },
    }
}
