//! 后端接口的薄封装：上传、处理、下载链接、模板与历史记录

use serde::Serialize;
use serde_json::Value;
use url::Url;
use crate::client::{NormalizedResponse, RequestClient};
use crate::config::Endpoints;
use crate::errors::{Error, Result};
use crate::upload::{UploadFile, UploadHandle, UploadOptions, UploadScheduler};

/// 下载格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadFormat {
    Txt,
    Docx,
}

impl DownloadFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadFormat::Txt => "txt",
            DownloadFormat::Docx => "docx",
        }
    }
}

/// 支持列表/创建的资源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Templates,
    History,
}

/// 拆开 `{success, data, error}` 信封
///
/// `success == false` 时返回 `Error::Rejected`；有 `data` 时只返回 `data`；
/// 不是信封格式的 JSON 原样返回。
pub fn unwrap_envelope(response: NormalizedResponse) -> Result<Value> {
    let value = response.into_json()?;

    let Some(success) = value.get("success").and_then(Value::as_bool) else {
        return Ok(value);
    };

    if !success {
        let message = value
            .get("error")
            .or_else(|| value.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("request rejected")
            .to_string();
        return Err(Error::Rejected(message));
    }

    match value {
        Value::Object(mut object) => Ok(object.remove("data").unwrap_or(Value::Object(object))),
        other => Ok(other),
    }
}

/// 后端服务
#[derive(Clone)]
pub struct Backend {
    client: RequestClient,
    scheduler: UploadScheduler,
    endpoints: Endpoints,
}

impl Backend {
    pub fn new(client: RequestClient, scheduler: UploadScheduler, endpoints: Endpoints) -> Self {
        Self {
            client,
            scheduler,
            endpoints,
        }
    }

    pub fn client(&self) -> &RequestClient {
        &self.client
    }

    pub fn scheduler(&self) -> &UploadScheduler {
        &self.scheduler
    }

    /// 上传文档，`fields` 作为额外表单字段
    pub async fn upload_document(&self, file: UploadFile, options: UploadOptions) -> Result<UploadHandle> {
        let url = self.client.resolve(&self.endpoints.upload)?;
        self.scheduler.submit(file, url.as_str(), options).await
    }

    /// 提交处理请求，结果中可能带有 `task_id`
    pub async fn process<T: Serialize + ?Sized>(&self, body: &T) -> Result<Value> {
        let response = self.send_json(&self.endpoints.process, body).await?;
        unwrap_envelope(response)
    }

    pub async fn list(&self, resource: Resource) -> Result<Value> {
        let response = self
            .client
            .request(self.resource_path(resource), self.client.config())
            .await?;
        unwrap_envelope(response)
    }

    pub async fn create<T: Serialize + ?Sized>(&self, resource: Resource, body: &T) -> Result<Value> {
        let response = self.send_json(self.resource_path(resource), body).await?;
        unwrap_envelope(response)
    }

    /// 下载链接，由调用方直接打开，不经过 RequestClient
    pub fn download_url(&self, task_id: &str, format: DownloadFormat) -> Result<Url> {
        if task_id.trim().is_empty() {
            return Err(Error::validation("Task id must not be empty"));
        }

        let mut url = self.client.resolve(&self.endpoints.download)?;
        url.query_pairs_mut()
            .append_pair("task_id", task_id)
            .append_pair("format", format.as_str());

        Ok(url)
    }

    fn resource_path(&self, resource: Resource) -> &str {
        match resource {
            Resource::Templates => &self.endpoints.templates,
            Resource::History => &self.endpoints.history,
        }
    }

    async fn send_json<T: Serialize + ?Sized>(&self, endpoint: &str, body: &T) -> Result<NormalizedResponse> {
        let payload = serde_json::to_vec(body)
            .map_err(|err| Error::validation(format!("Failed to serialize body: {}", err)))?;
        let config = self
            .client
            .config()
            .method(reqwest::Method::POST)
            .body(payload);

        self.client.request(endpoint, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_success_with_data() {
        let value = unwrap_envelope(NormalizedResponse::Json(json!({
            "success": true,
            "data": { "task_id": "t-1" }
        }))).unwrap();
        assert_eq!(value, json!({ "task_id": "t-1" }));
    }

    #[test]
    fn test_unwrap_success_without_data() {
        let value = unwrap_envelope(NormalizedResponse::Json(json!({
            "success": true,
            "templates": []
        }))).unwrap();
        assert_eq!(value, json!({ "success": true, "templates": [] }));
    }

    #[test]
    fn test_unwrap_failure() {
        let err = unwrap_envelope(NormalizedResponse::Json(json!({
            "success": false,
            "error": "unsupported document"
        }))).unwrap_err();

        match err {
            Error::Rejected(message) => assert_eq!(message, "unsupported document"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_plain_json_passes_through() {
        let value = unwrap_envelope(NormalizedResponse::Json(json!({ "upload_id": "u-9" }))).unwrap();
        assert_eq!(value, json!({ "upload_id": "u-9" }));
    }
}
