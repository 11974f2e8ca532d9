use std::sync::Arc;
use anyhow::Context;
use futures_util::future::join_all;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use docpipe::{
    Backend,
    Config,
    HttpTransport,
    NormalizedResponse,
    ReqwestTransport,
    RequestClient,
    SchedulerConfig,
    UploadEvent,
    UploadFile,
    UploadOptions,
    UploadScheduler,
};

/// 读取全部文件，任何一个失败都直接返回
async fn read_files(paths: &[String]) -> anyhow::Result<Vec<(&String, UploadFile)>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let file = UploadFile::from_path(path)
            .await
            .with_context(|| format!("Failed to read file: {}", path))?;
        files.push((path, file));
    }
    Ok(files)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        anyhow::bail!("Usage: docpipe <file>...");
    }

    let config = Config::load_default().context("Failed to load config")?;

    // 先读完所有文件再提交
    let files = read_files(&paths).await?;

    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new()?);
    let client = RequestClient::from_settings(transport.clone(), &config.client)
        .context("Invalid client settings")?;
    let scheduler_handle = UploadScheduler::new(transport, SchedulerConfig::from(&config.upload));
    let backend = Backend::new(client, scheduler_handle.scheduler.clone(), config.endpoints.clone());

    let mut events = scheduler_handle.scheduler.subscribe_events();
    let event_logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(UploadEvent::Progress { id, progress, .. }) => {
                    tracing::debug!(job = %id, "{}%", progress);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Event receiver lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut failed = 0;
    let mut handles = Vec::new();
    for (path, file) in files {
        match backend.upload_document(file, UploadOptions::default()).await {
            Ok(handle) => handles.push((path, handle)),
            Err(err) => {
                failed += 1;
                tracing::error!(file = %path, "Failed to submit: {}", err);
            }
        }
    }

    let (submitted, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    let results = join_all(handles).await;

    for (path, result) in submitted.iter().zip(results) {
        match result {
            Ok(NormalizedResponse::Json(value)) => {
                tracing::info!(file = %path, response = %value, "Uploaded");
            }
            Ok(NormalizedResponse::Binary(payload)) => {
                tracing::info!(file = %path, content_type = %payload.content_type, size = payload.bytes.len(), "Uploaded");
            }
            Err(err) => {
                failed += 1;
                tracing::error!(file = %path, "Upload failed: {}", err);
            }
        }
    }

    drop(backend);
    scheduler_handle.shutdown().await?;
    let _ = event_logger.await;

    if failed > 0 {
        anyhow::bail!("{} of {} uploads failed", failed, paths.len());
    }

    Ok(())
}
