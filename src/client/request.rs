use std::sync::Arc;
use serde::Serialize;
use serde_json::Value;
use url::Url;
use crate::config::ClientSettings;
use crate::errors::{Error, Result};
use super::normalize::normalize;
use super::retry::{retry_with_policy, RetryPolicy};
use super::transport::{HttpTransport, TransportRequest};
use super::types::{NormalizedResponse, RequestConfig};

/// 带超时与重试的请求客户端
#[derive(Clone)]
pub struct RequestClient {
    transport: Arc<dyn HttpTransport>,
    base_url: Option<Url>,
    defaults: RequestConfig,
}

impl RequestClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            base_url: None,
            defaults: RequestConfig::default(),
        }
    }

    pub fn from_settings(transport: Arc<dyn HttpTransport>, settings: &ClientSettings) -> Result<Self> {
        let defaults = RequestConfig::get()
            .timeout(settings.timeout)
            .retries(settings.retries)
            .retry_delay(settings.retry_delay);

        Ok(Self::new(transport)
            .with_base_url(&settings.base_url)?
            .with_defaults(defaults))
    }

    /// 相对路径的 endpoint 基于 `base_url` 解析
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        let url = Url::parse(base_url)
            .map_err(|err| Error::validation(format!("Invalid base url '{}': {}", base_url, err)))?;
        self.base_url = Some(url);
        Ok(self)
    }

    pub fn with_defaults(mut self, defaults: RequestConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// 客户端默认的请求配置，用作构造单次请求的起点
    pub fn config(&self) -> RequestConfig {
        self.defaults.clone()
    }

    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        self.transport.clone()
    }

    pub fn resolve(&self, endpoint: &str) -> Result<Url> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(Error::validation("Endpoint must not be empty"));
        }

        match Url::parse(endpoint) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.base_url.as_ref().ok_or_else(|| {
                    Error::validation(format!("Relative endpoint '{}' without base url", endpoint))
                })?;
                base.join(endpoint)
                    .map_err(|err| Error::validation(format!("Invalid endpoint '{}': {}", endpoint, err)))
            }
            Err(err) => Err(Error::validation(format!("Invalid endpoint '{}': {}", endpoint, err))),
        }
    }

    /// 发送请求：每次尝试都受 `config.timeout` 约束，失败后线性退避重试，
    /// 全部失败时返回最后一次的错误
    pub async fn request(&self, endpoint: &str, config: RequestConfig) -> Result<NormalizedResponse> {
        let url = self.resolve(endpoint)?;
        let headers = config.merged_headers();
        let timeout = config.timeout;
        let policy = RetryPolicy::linear(config.attempts(), config.retry_delay);

        retry_with_policy(&policy, |attempt| {
            let transport = self.transport.clone();
            let request = TransportRequest {
                method: config.method.clone(),
                url: url.to_string(),
                headers: headers.clone(),
                body: config.body.clone(),
            };

            async move {
                tracing::debug!(attempt, method = %request.method, url = %request.url, "Sending request");

                // 超时后丢弃 future，即中止这次尝试
                let response = match tokio::time::timeout(timeout, transport.send(request)).await {
                    Ok(response) => response?,
                    Err(_) => return Err(Error::Timeout(timeout)),
                };

                normalize(response)
            }
        }).await
    }

    pub async fn get_json(&self, endpoint: &str) -> Result<Value> {
        self.request(endpoint, self.config()).await?.into_json()
    }

    pub async fn post_json<T: Serialize + ?Sized>(&self, endpoint: &str, body: &T) -> Result<Value> {
        let payload = serde_json::to_vec(body)
            .map_err(|err| Error::validation(format!("Failed to serialize body: {}", err)))?;
        let config = self.config().method(reqwest::Method::POST).body(payload);

        self.request(endpoint, config).await?.into_json()
    }
}
