use std::collections::HashMap;
use std::time::Duration;
use bytes::Bytes;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use crate::errors::{Error, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1_000);
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// 单次请求的描述，每次调用 `request()` 时重新构造
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub method: Method,
    /// 与默认的 `Content-Type: application/json` 合并，调用方的值优先
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    /// 单次尝试的超时
    pub timeout: Duration,
    /// 最多尝试次数，0 按 1 次处理
    pub retries: u32,
    /// 线性退避基数，第 n 次失败后等待 `retry_delay * n`
    pub retry_delay: Duration,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HashMap::new(),
            body: None,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RequestConfig {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post() -> Self {
        Self {
            method: Method::POST,
            ..Self::default()
        }
    }

    pub fn post_json<T: Serialize + ?Sized>(body: &T) -> Result<Self> {
        let body = serde_json::to_vec(body)
            .map_err(|err| Error::validation(format!("Failed to serialize body: {}", err)))?;

        Ok(Self::post().body(body))
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// 默认头与调用方头合并后的结果
    pub fn merged_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string());

        for (name, value) in &self.headers {
            // header 名大小写不敏感，覆盖默认值时要先移除
            headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
            headers.insert(name.clone(), value.clone());
        }

        headers
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.retries.max(1)
    }
}

/// 二进制响应的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Office 文档
    Document,
    Binary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryPayload {
    pub kind: PayloadKind,
    pub bytes: Bytes,
    pub content_type: String,
    pub filename: String,
}

/// 按 `Content-Type` 归一化后的响应
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedResponse {
    Json(Value),
    Binary(BinaryPayload),
}

impl NormalizedResponse {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            NormalizedResponse::Json(value) => Some(value),
            NormalizedResponse::Binary(_) => None,
        }
    }

    pub fn into_json(self) -> Result<Value> {
        match self {
            NormalizedResponse::Json(value) => Ok(value),
            NormalizedResponse::Binary(payload) => Err(Error::parse(format!(
                "Expected JSON response, got '{}'",
                payload.content_type
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_header_overrides_default() {
        let config = RequestConfig::get()
            .header("content-type", "text/plain")
            .header("Authorization", "Bearer token");

        let headers = config.merged_headers();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("content-type").map(String::as_str), Some("text/plain"));
        assert!(!headers.contains_key("Content-Type"));
    }

    #[test]
    fn test_zero_retries_means_single_attempt() {
        assert_eq!(RequestConfig::get().retries(0).attempts(), 1);
        assert_eq!(RequestConfig::get().attempts(), 3);
    }

    #[test]
    fn test_post_json_body() {
        let config = RequestConfig::post_json(&serde_json::json!({ "upload_id": "abc" })).unwrap();
        assert_eq!(config.method, Method::POST);
        assert_eq!(config.body.unwrap(), Bytes::from_static(br#"{"upload_id":"abc"}"#));
    }
}
