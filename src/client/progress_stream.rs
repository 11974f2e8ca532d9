use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;

/// 已发送字节 / 总字节
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_sent: u64,
    pub total_bytes: u64,
}

impl TransferProgress {
    /// 0-100，总大小为 0 时视为完成
    pub fn percentage(&self) -> u8 {
        if self.total_bytes == 0 {
            return 100;
        }

        let sent = self.bytes_sent.min(self.total_bytes);
        (sent * 100 / self.total_bytes) as u8
    }
}

pub type ProgressCallback = Arc<dyn Fn(TransferProgress) + Send + Sync>;

pin_project! {
    /// 包装请求体，每读出一块就回调一次进度
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        bytes_sent: u64,
        total_bytes: u64,
        callback: ProgressCallback,
    }
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, total_bytes: u64, callback: ProgressCallback) -> Self {
        Self {
            inner,
            bytes_sent: 0,
            total_bytes,
            callback,
        }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>,
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !chunk.is_empty() {
                    *this.bytes_sent += chunk.len() as u64;
                    (this.callback)(TransferProgress {
                        bytes_sent: *this.bytes_sent,
                        total_bytes: *this.total_bytes,
                    });
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }
}

/// 按固定大小切块，供 `ProgressStream` 使用
pub fn chunked(bytes: Bytes, chunk_size: usize) -> impl Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static {
    let chunk_size = chunk_size.max(1);
    let mut chunks: Vec<std::io::Result<Bytes>> = Vec::with_capacity(bytes.len() / chunk_size + 1);
    let mut offset = 0;
    while offset < bytes.len() {
        let end = (offset + chunk_size).min(bytes.len());
        chunks.push(Ok(bytes.slice(offset..end)));
        offset = end;
    }

    futures::stream::iter(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_progress_reports_every_chunk() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let callback: ProgressCallback = {
            let reports = reports.clone();
            Arc::new(move |progress| reports.lock().unwrap().push(progress.bytes_sent))
        };

        let data = Bytes::from(vec![7u8; 10]);
        let stream = ProgressStream::new(chunked(data, 4), 10, callback);
        let collected: Vec<_> = stream.collect().await;

        assert_eq!(collected.len(), 3);
        assert_eq!(*reports.lock().unwrap(), vec![4, 8, 10]);
    }

    #[test]
    fn test_percentage() {
        let progress = TransferProgress { bytes_sent: 50, total_bytes: 200 };
        assert_eq!(progress.percentage(), 25);

        let empty = TransferProgress { bytes_sent: 0, total_bytes: 0 };
        assert_eq!(empty.percentage(), 100);
    }
}
