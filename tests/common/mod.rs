#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use docpipe::client::{
    HttpTransport,
    ProgressCallback,
    TransferProgress,
    TransportRequest,
    TransportResponse,
    UploadRequest,
};
use docpipe::{Error, Result};

pub fn json_response(status: u16, body: &str) -> TransportResponse {
    let mut headers = HashMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());

    TransportResponse {
        status,
        status_text: if status < 300 { "OK" } else { "Internal Server Error" }.to_string(),
        headers,
        body: Bytes::from(body.to_string()),
    }
}

pub type Gate = oneshot::Sender<Result<TransportResponse>>;

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 上传桩：按文件名挂起，直到测试释放对应的 gate
///
/// 没有 gate 的文件立即成功；每次开始上传都会把文件名发到 `started` 通道。
pub struct GatedTransport {
    gates: Mutex<HashMap<String, oneshot::Receiver<Result<TransportResponse>>>>,
    progress_steps: Mutex<HashMap<String, Vec<u64>>>,
    started_tx: mpsc::UnboundedSender<String>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    uploads: AtomicUsize,
}

impl GatedTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (started_tx, started_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            gates: Mutex::new(HashMap::new()),
            progress_steps: Mutex::new(HashMap::new()),
            started_tx,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            uploads: AtomicUsize::new(0),
        });

        (transport, started_rx)
    }

    pub fn gate(&self, name: &str) -> Gate {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(name.to_string(), rx);
        tx
    }

    /// 上传开始时依次报告的已发送字节数
    pub fn script_progress(&self, name: &str, steps: Vec<u64>) {
        self.progress_steps.lock().unwrap().insert(name.to_string(), steps);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for GatedTransport {
    async fn send(&self, _request: TransportRequest) -> Result<TransportResponse> {
        Err(Error::Connection("send is not scripted".to_string()))
    }

    async fn upload(&self, request: UploadRequest, progress: ProgressCallback) -> Result<TransportResponse> {
        let name = request.file.name.clone();
        let total_bytes = request.file.size();
        let gate = self.gates.lock().unwrap().remove(&name);
        let steps = self.progress_steps.lock().unwrap().remove(&name).unwrap_or_default();

        self.uploads.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        for bytes_sent in steps {
            progress(TransferProgress { bytes_sent, total_bytes });
        }
        let _ = self.started_tx.send(name.clone());

        match gate {
            Some(gate) => gate
                .await
                .unwrap_or_else(|_| Err(Error::Connection("gate dropped".to_string()))),
            None => Ok(json_response(200, &format!(r#"{{"upload_id":"{}"}}"#, name))),
        }
    }
}

/// 极简 HTTP 服务：每个连接按顺序返回一条预设响应，并记录收到的请求
pub async fn spawn_http_server(responses: Vec<String>) -> (String, JoinHandle<Vec<Vec<u8>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for response in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            requests.push(request);
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        }
        requests
    });

    (base_url, handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Vec<u8> {
    let mut data = Vec::new();
    let mut buffer = [0u8; 8192];

    let header_end = loop {
        let n = socket.read(&mut buffer).await.unwrap();
        if n == 0 {
            return data;
        }
        data.extend_from_slice(&buffer[..n]);
        if let Some(pos) = find(&data, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&data[..header_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok());
    let chunked = head.contains("transfer-encoding: chunked");

    loop {
        let body = &data[header_end..];
        let done = match content_length {
            Some(length) => body.len() >= length,
            None if chunked => body.ends_with(b"0\r\n\r\n"),
            None => true,
        };
        if done {
            break;
        }

        let n = socket.read(&mut buffer).await.unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buffer[..n]);
    }

    data
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

pub fn http_response(status_line: &str, headers: &[(&str, &str)], body: &[u8]) -> String {
    let mut response = format!("HTTP/1.1 {}\r\n", status_line);
    for (name, value) in headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str(&format!("content-length: {}\r\nconnection: close\r\n\r\n", body.len()));
    response.push_str(&String::from_utf8_lossy(body));
    response
}
