use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::errors::{Error, Result};

/// 默认配置文件
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// 覆盖配置文件路径的环境变量
pub const CONFIG_ENV: &str = "DOCPIPE_CONFIG";

// Durations are stored as milliseconds in the config file
pub(crate) mod duration_ms {
    use std::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub client: ClientSettings,
    pub upload: UploadSettings,
    pub endpoints: Endpoints,
}

/// RequestClient 相关配置
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct ClientSettings {
    /// 后端地址，相对路径的 endpoint 基于它拼接
    pub base_url: String,
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    pub retries: u32,
    #[serde(rename = "retry_delay_ms", with = "duration_ms")]
    pub retry_delay: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            timeout: Duration::from_millis(30_000),
            retries: 3,
            retry_delay: Duration::from_millis(1_000),
        }
    }
}

/// UploadScheduler 相关配置
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct UploadSettings {
    /// 最大并发上传数
    pub max_concurrent: usize,
    /// 单个上传任务超时
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    /// 允许的扩展名（小写，不带点），为空表示不限制
    pub allowed_extensions: Vec<String>,
    /// 单文件大小上限（字节）
    pub max_file_size: Option<u64>,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            timeout: Duration::from_secs(300),
            allowed_extensions: vec![
                "doc".to_string(),
                "docx".to_string(),
                "txt".to_string(),
            ],
            max_file_size: Some(50 * 1024 * 1024), // 50MB
        }
    }
}

/// 后端接口路径
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct Endpoints {
    pub upload: String,
    pub process: String,
    pub download: String,
    pub templates: String,
    pub history: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            upload: "/api/upload".to_string(),
            process: "/api/process".to_string(),
            download: "/api/download".to_string(),
            templates: "/api/templates".to_string(),
            history: "/api/history".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path)?;
        Self::parse(&config_str)
            .map_err(|err| Error::Config(format!("{}: {}", path.display(), err)))
    }

    pub fn parse(config_str: &str) -> Result<Config> {
        toml::from_str(config_str).map_err(|err| Error::Config(err.to_string()))
    }

    /// 读取 `DOCPIPE_CONFIG` 指定的文件，否则读取 `config.toml`；文件不存在时使用默认值
    pub fn load_default() -> Result<Config> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        if Path::new(&path).exists() {
            Self::load(path)
        } else {
            Ok(Config::default())
        }
    }
}
