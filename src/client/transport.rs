use std::collections::HashMap;
use std::time::Duration;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Method};
use crate::errors::{Error, Result};
use crate::upload::UploadFile;
use super::progress_stream::{chunked, ProgressCallback, ProgressStream};

/// 上传请求体分块大小
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// 发往传输层的单次请求
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
}

/// multipart 文件上传
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub url: String,
    pub file: UploadFile,
    /// 文件所在的表单字段名
    pub field_name: String,
    pub fields: HashMap<String, String>,
    pub headers: HashMap<String, String>,
}

/// 传输层返回的原始响应，header 名统一为小写
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 底层 HTTP 传输，生产环境用 reqwest，测试里替换为桩
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// 普通请求
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;

    /// 文件上传，发送过程中通过 `progress` 报告进度
    async fn upload(&self, request: UploadRequest, progress: ProgressCallback) -> Result<TransportResponse>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .tcp_nodelay(true)
            .build()?;

        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn build_headers(headers: &HashMap<String, String>) -> Result<HeaderMap> {
        let mut header_map = HeaderMap::new();
        for (key, value) in headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|err| Error::validation(format!("Invalid header name '{}': {}", key, err)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| Error::validation(format!("Invalid header value for '{}': {}", key, err)))?;
            header_map.insert(name, value);
        }

        Ok(header_map)
    }

    async fn into_transport_response(response: reqwest::Response) -> Result<TransportResponse> {
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let headers = Self::build_headers(&request.headers)?;
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(headers);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        Self::into_transport_response(response).await
    }

    async fn upload(&self, request: UploadRequest, progress: ProgressCallback) -> Result<TransportResponse> {
        // multipart 的 Content-Type 由 reqwest 生成，这里不能覆盖
        let mut headers = request.headers;
        headers.retain(|name, _| !name.eq_ignore_ascii_case("content-type"));
        let headers = Self::build_headers(&headers)?;

        let file = request.file;
        let total_bytes = file.size();
        let stream = ProgressStream::new(
            chunked(file.bytes, UPLOAD_CHUNK_SIZE),
            total_bytes,
            progress,
        );

        let part = Part::stream_with_length(Body::wrap_stream(stream), total_bytes)
            .file_name(file.name)
            .mime_str(&file.content_type)
            .map_err(|err| Error::validation(format!("Invalid content type: {}", err)))?;

        let mut form = Form::new().part(request.field_name, part);
        for (key, value) in request.fields {
            form = form.text(key, value);
        }

        let response = self
            .client
            .post(&request.url)
            .headers(headers)
            .multipart(form)
            .send()
            .await?;

        Self::into_transport_response(response).await
    }
}
